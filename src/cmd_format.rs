//! The `format` command creates a filesystem on an image file or device.

use fatvol::disk::get_disk_size;
use fatvol::error;
use fatvol::prompt::prompt;
use fatvol::Filesystem;
use std::env::ArgsOs;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::exit;

/// The default block size in bytes, used when `--block-size` is not given.
const DEFAULT_BLOCK_SIZE: u32 = 1024;

/// Structure storing command line arguments.
struct Args {
    /// Path to the image file or device to format.
    image_path: Option<PathBuf>,
    /// Requested image size in bytes. If not given, derived from the
    /// existing file or device's size.
    size: Option<u64>,
    /// Block size in bytes.
    block_size: u32,
    /// If true, print command line help.
    help: bool,
}

impl Default for Args {
    fn default() -> Self {
        Self { image_path: None, size: None, block_size: DEFAULT_BLOCK_SIZE, help: false }
    }
}

fn print_usage() {
    eprintln!("Usage: fatvol format <image> [size[K|M|G]] [--block-size=N]");
    eprintln!();
    eprintln!("Options:");
    eprintln!(" -h, --help:        print usage");
    eprintln!(" --block-size=N:    block size in bytes (default {DEFAULT_BLOCK_SIZE})");
    eprintln!(" size:              image size; suffix K/M/G for KiB/MiB/GiB");
    eprintln!("                    if omitted, the size of an existing file or device is used");
}

fn parse_size(s: &str) -> Option<u64> {
    let last = s.chars().last()?;
    let (digits, mul) = match last {
        'K' | 'k' => (&s[..s.len() - 1], 1024u64),
        'M' | 'm' => (&s[..s.len() - 1], 1024 * 1024),
        'G' | 'g' => (&s[..s.len() - 1], 1024 * 1024 * 1024),
        _ => (s, 1),
    };
    digits.parse::<u64>().ok().map(|n| n * mul)
}

fn parse_args(args: ArgsOs) -> Args {
    let mut res = Args::default();
    for arg in args {
        let Some(s) = arg.to_str() else {
            if res.image_path.is_none() {
                res.image_path = Some(PathBuf::from(arg));
            }
            continue;
        };
        if s == "-h" || s == "--help" {
            res.help = true;
        } else if let Some(n) = s.strip_prefix("--block-size=") {
            res.block_size = n.parse().unwrap_or(DEFAULT_BLOCK_SIZE);
        } else if res.image_path.is_some() && res.size.is_none() {
            res.size = parse_size(s);
        } else if res.image_path.is_none() {
            res.image_path = Some(PathBuf::from(s));
        }
    }
    res
}

pub fn main(bin: &str, args: ArgsOs) {
    let args = parse_args(args);
    if args.help {
        print_usage();
        return;
    }
    let image_path = args.image_path.unwrap_or_else(|| {
        print_usage();
        exit(1);
    });

    if Filesystem::open(&image_path).is_ok() {
        println!("{} already contains a filesystem", image_path.display());
        let confirm = prompt("Proceed and overwrite? (y/N) ", false)
            .map(|s| s.eq_ignore_ascii_case("y"))
            .unwrap_or(false);
        if !confirm {
            eprintln!("Abort.");
            exit(1);
        }
    }

    let size = args.size.unwrap_or_else(|| {
        let dev = OpenOptions::new().read(true).open(&image_path).unwrap_or_else(|e| {
            error(bin, format_args!("{}: {e}", image_path.display()));
        });
        get_disk_size(&dev).unwrap_or_else(|e| {
            error(bin, format_args!("{}: {e}", image_path.display()));
        })
    });

    let block_count = (size / args.block_size as u64) as u32;
    let fs = Filesystem::format(&image_path, block_count, args.block_size)
        .unwrap_or_else(|e| error(bin, format_args!("failed to format: {e}")));
    fs.close().unwrap_or_else(|e| error(bin, format_args!("failed to close: {e}")));

    println!(
        "formatted {} ({} blocks of {} bytes)",
        image_path.display(),
        block_count,
        args.block_size
    );
}
