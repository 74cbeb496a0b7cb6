//! Error taxonomy shared by every layer of the filesystem core.

use std::fmt;
use std::io;

/// An error produced by the filesystem core.
#[derive(Debug)]
pub enum Error {
    /// A path component does not exist.
    NotFound,
    /// An operation expected a directory but found something else.
    NotADirectory,
    /// An operation expected a non-directory but found a directory.
    IsADirectory,
    /// A directory was not empty when an operation required it to be.
    NotEmpty,
    /// A name exceeded the maximum length an entry record can store.
    NameTooLong,
    /// The FAT has no free block, or a chain ended before a requested range
    /// could be satisfied.
    OutOfSpace,
    /// An argument is invalid for the operation (bad offset, bad address, ...).
    InvalidArgument,
    /// The underlying image could not be read or written.
    Io(io::Error),
    /// An on-disk structure failed a consistency check (bad magic, a FAT walk
    /// hit a block it should never have reached, ...).
    Corruption(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "no such file or directory"),
            Self::NotADirectory => write!(f, "not a directory"),
            Self::IsADirectory => write!(f, "is a directory"),
            Self::NotEmpty => write!(f, "directory not empty"),
            Self::NameTooLong => write!(f, "name too long"),
            Self::OutOfSpace => write!(f, "no space left on device"),
            Self::InvalidArgument => write!(f, "invalid argument"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Corruption(what) => write!(f, "corrupted filesystem: {what}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// A `Result` specialised to [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
