//! The `mount` command hands an opened filesystem off to a userspace
//! collaborator (e.g. a FUSE bridge). Mounting itself is outside this
//! crate's scope; this command validates the image and reports what it
//! would do.

use fatvol::Filesystem;
use std::env::ArgsOs;
use std::path::PathBuf;
use std::process::exit;

fn print_usage() {
    eprintln!("Usage: fatvol mount <image> <mountpoint>");
}

pub fn main(bin: &str, args: ArgsOs) {
    let args: Vec<_> = args.collect();
    let [image, mountpoint] = &args[..] else {
        print_usage();
        exit(1);
    };
    let image_path = PathBuf::from(image);
    let fs = Filesystem::open(&image_path).unwrap_or_else(|e| {
        fatvol::error(bin, format_args!("{}: {e}", image_path.display()));
    });
    fs.close().unwrap_or_else(|e| fatvol::error(bin, format_args!("{e}")));
    eprintln!(
        "{}: {} is a valid image; mounting it at {} requires a userspace-filesystem bridge, which is not built into this binary",
        bin,
        image_path.display(),
        PathBuf::from(mountpoint).display(),
    );
    exit(1);
}
