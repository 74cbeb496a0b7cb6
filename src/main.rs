//! Command-line driver: `format`, `mount`, `help`, `version`.

mod cmd_format;
mod cmd_mount;

use fatvol::error;
use std::env;
use std::process::exit;

fn print_usage() {
    eprintln!("Usage: fatvol <command> [options]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  format <image> [size[K|M|G]] [--block-size=N]   create a filesystem");
    eprintln!("  mount <image> <mountpoint>                      mount a filesystem");
    eprintln!("  help                                            print this message");
    eprintln!("  version                                         print the version");
}

fn print_version() {
    println!("fatvol {}", env!("CARGO_PKG_VERSION"));
}

fn main() {
    let mut args = env::args_os();
    let bin = args
        .next()
        .and_then(|s| s.into_string().ok())
        .unwrap_or_else(|| "fatvol".to_owned());
    let Some(cmd) = args.next().and_then(|s| s.into_string().ok()) else {
        print_usage();
        exit(1);
    };
    match cmd.as_str() {
        "format" => cmd_format::main(&bin, args),
        "mount" => cmd_mount::main(&bin, args),
        "help" | "-h" | "--help" => print_usage(),
        "version" | "-v" | "--version" => print_version(),
        _ => error(&bin, format_args!("unknown command `{cmd}`")),
    }
}
