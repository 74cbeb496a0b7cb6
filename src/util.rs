//! Miscellaneous utility functions shared across the filesystem core.

use std::fmt;
use std::mem::size_of;
use std::slice;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// Returns the current timestamp since the Unix epoch, in seconds.
pub fn get_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock panic")
        .as_secs()
}

/// Divides `n` by `d`, rounding up.
pub fn ceil_division(n: u32, d: u32) -> u32 {
    n.div_ceil(d)
}

/// Performs the log2 operation on the given integer.
///
/// If the result is undefined (`n == 0`), the function returns `None`.
pub fn log2(n: u64) -> Option<u64> {
    let num_bits = (size_of::<u64>() * 8) as u64;
    let n = num_bits - n.leading_zeros() as u64;
    if n > 0 {
        Some(n - 1)
    } else {
        None
    }
}

/// Returns a read-only byte view over `val`'s representation.
///
/// # Safety
/// `T` must have no padding bytes that could expose uninitialised memory, and
/// must be valid for any bit pattern observers might read back (guaranteed by
/// `#[repr(C, packed)]` structs of plain integers used for on-disk records).
pub unsafe fn as_bytes<T>(val: &T) -> &[u8] {
    unsafe { slice::from_raw_parts(val as *const T as *const u8, size_of::<T>()) }
}

/// Returns a mutable byte view over `val`'s representation. See [`as_bytes`].
pub unsafe fn as_bytes_mut<T>(val: &mut T) -> &mut [u8] {
    unsafe { slice::from_raw_parts_mut(val as *mut T as *mut u8, size_of::<T>()) }
}

/// A number of bytes, formatted with a binary unit suffix.
pub struct ByteSize(pub u64);

impl fmt::Display for ByteSize {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut order = log2(self.0).unwrap_or(0) / log2(1024).unwrap();
        let suffix = match order {
            0 => "bytes",
            1 => "KiB",
            2 => "MiB",
            3 => "GiB",
            4 => "TiB",
            _ => {
                order = 0;
                "bytes"
            }
        };
        let unit = 1024u64.pow(order as u32);
        write!(fmt, "{} {}", self.0 / unit, suffix)
    }
}
