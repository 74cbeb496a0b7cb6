//! Core of a single-volume FAT-style filesystem: a File Allocation Table
//! over a flat image file, with directory entries and byte-addressable
//! object storage built on top of it.

use std::env::ArgsOs;
use std::fmt;
use std::path::PathBuf;
use std::process::exit;
use std::env;

pub mod addr;
pub mod block;
pub mod disk;
pub mod entry;
pub mod error;
pub mod image;
pub mod object;
pub mod prompt;
pub mod util;

pub use error::Error;
pub use object::Filesystem;

/// Returns the command's name along with an iterator over the command's arguments.
pub fn args() -> (String, ArgsOs) {
    let mut args = env::args_os();
    let bin = args
        .next()
        .map(PathBuf::from)
        .and_then(|p| {
            p.file_name()
                .and_then(|name| name.to_str())
                .map(str::to_owned)
        })
        .unwrap_or_else(|| {
            error("fatvol", "missing binary name");
        });
    (bin, args)
}

/// Writes an error to stderr, then exits.
pub fn error<M: fmt::Display>(bin: &str, msg: M) -> ! {
    eprintln!("{bin}: error: {msg}");
    exit(1);
}
