//! The Addressing layer: turns an object's `(start_block, size)` plus a
//! logical byte offset into block-crossing reads and writes.
//!
//! Growth always prepends a new block at the head of the chain (see
//! [`crate::block::alloc`]), so the chain read forward from `start_block`
//! visits the most-recently-grown block first. This layer fixes the
//! convention that logical offset `0` is the *tail* of the chain (the first
//! block ever allocated) and logical offset `size - 1` is the *head*
//! (`start_block` itself): the block covering `[k * block_size, (k+1) *
//! block_size)` sits `num_blocks - 1 - k` hops from `start_block`.

use crate::block;
use crate::error::Error;
use crate::error::Result;
use crate::image::Image;
use crate::util::ceil_division;

/// A resolved position inside an object's byte stream: a block id and the
/// in-block offset of the byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Address {
    pub block: u32,
    pub offset: u32,
}

fn num_blocks(size: u32, block_size: u32) -> u32 {
    ceil_division(size, block_size)
}

/// Resolves logical byte `offset` within an object of `size` bytes whose
/// chain begins at `start_block`. `offset` must be strictly less than
/// `size`.
pub fn seek(image: &mut Image, start_block: u32, size: u32, offset: u32) -> Result<Address> {
    if offset >= size {
        return Err(Error::InvalidArgument);
    }
    let block_size = image.superblock().block_size;
    let total = num_blocks(size, block_size);
    let logical_index = offset / block_size;
    let depth = total - 1 - logical_index;
    let mut b = start_block;
    for _ in 0..depth {
        b = block::next(image, b)?;
        if !block::is_valid(b) {
            return Err(Error::Corruption("FAT chain ended early"));
        }
    }
    Ok(Address {
        block: b,
        offset: offset % block_size,
    })
}

/// Reads up to `buf.len()` bytes of the object's logical stream starting at
/// `offset`, stopping early (and returning the short count) if the chain
/// ends before the buffer is filled. Returns the number of bytes
/// transferred.
pub fn read(
    image: &mut Image,
    start_block: u32,
    size: u32,
    offset: u32,
    buf: &mut [u8],
) -> Result<usize> {
    access(image, start_block, size, offset, buf.len() as u32, |image, block, in_off, len, pos| {
        let block_size = image.superblock().block_size as usize;
        let mut scratch = vec![0u8; block_size];
        image.block_read(block, &mut scratch)?;
        buf[pos..pos + len].copy_from_slice(&scratch[in_off..in_off + len]);
        Ok(())
    })
}

/// Writes `buf` into the object's logical stream starting at `offset`. The
/// object must already be large enough (`offset + buf.len() <= size`); the
/// Entry layer is responsible for growing storage beforehand.
pub fn write(
    image: &mut Image,
    start_block: u32,
    size: u32,
    offset: u32,
    buf: &[u8],
) -> Result<usize> {
    access(image, start_block, size, offset, buf.len() as u32, |image, block, in_off, len, pos| {
        let block_size = image.superblock().block_size as usize;
        if len == block_size {
            image.block_write(block, &buf[pos..pos + len])?;
        } else {
            let mut scratch = vec![0u8; block_size];
            image.block_read(block, &mut scratch)?;
            scratch[in_off..in_off + len].copy_from_slice(&buf[pos..pos + len]);
            image.block_write(block, &scratch)?;
        }
        Ok(())
    })
}

/// Drives a block-crossing access over `[offset, offset + n)`, visiting
/// blocks from the highest offset touched down to the lowest (the order the
/// chain naturally yields under the prepend convention) and invoking `op`
/// with `(image, block, in_block_offset, len, buf_pos)`, where `buf_pos` is
/// the chunk's position relative to `offset` (*not* the order blocks are
/// visited in) so out-of-order block visitation never scrambles the
/// caller's buffer.
fn access(
    image: &mut Image,
    start_block: u32,
    size: u32,
    offset: u32,
    n: u32,
    mut op: impl FnMut(&mut Image, u32, usize, usize, usize) -> Result<()>,
) -> Result<usize> {
    if n == 0 || offset >= size {
        return Ok(0);
    }
    let block_size = image.superblock().block_size;
    let end = (offset + n).min(size);
    if end <= offset {
        return Ok(0);
    }
    let total = num_blocks(size, block_size);
    let first_index = offset / block_size;
    let last_index = (end - 1) / block_size;

    let start_depth = total - 1 - last_index;
    let mut block = start_block;
    for _ in 0..start_depth {
        block = block::next(image, block)?;
        if !block::is_valid(block) {
            return Err(Error::Corruption("FAT chain ended early"));
        }
    }

    let mut transferred = 0usize;
    let mut cur_index = last_index;
    loop {
        let block_start = cur_index * block_size;
        let lo = offset.max(block_start);
        let hi = end.min(block_start + block_size);
        let len = (hi - lo) as usize;
        let in_off = (lo - block_start) as usize;
        let buf_pos = (lo - offset) as usize;
        op(image, block, in_off, len, buf_pos)?;
        transferred += len;
        if cur_index == first_index {
            break;
        }
        block = block::next(image, block)?;
        if !block::is_valid(block) {
            break;
        }
        cur_index -= 1;
    }
    Ok(transferred)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::image::Superblock;
    use crate::image::MAGIC;
    use std::env::temp_dir;
    use std::fs;

    fn fresh_image(name: &str, block_count: u32, block_size: u32) -> (Image, std::path::PathBuf) {
        let mut path = temp_dir();
        path.push(format!("fatvol-addr-test-{name}-{}", std::process::id()));
        let _ = fs::remove_file(&path);
        let fat_block_count = Superblock::fat_blocks_for(block_count, block_size);
        let sb = Superblock {
            magic: MAGIC,
            block_count,
            fat_block_count,
            block_size,
            root_block: 1 + fat_block_count,
        };
        let mut img = Image::open(&path).unwrap();
        img.format(sb).unwrap();
        (img, path)
    }

    /// Grows a chain by prepending `blocks.len()` blocks in order, returning
    /// the resulting head (`start_block`). `blocks[0]` ends up at the tail
    /// (covering the lowest offsets), matching what `entry_alloc` would do
    /// for sequential growth.
    fn build_chain(image: &mut Image, blocks: usize) -> u32 {
        let mut head = block::BLOCK_LAST;
        for _ in 0..blocks {
            head = block::alloc(image, head).unwrap();
        }
        head
    }

    #[test]
    fn single_block_roundtrip() {
        let (mut img, path) = fresh_image("single", 8, 32);
        let start = build_chain(&mut img, 1);
        let data: Vec<u8> = (0..10).collect();
        write(&mut img, start, 10, 0, &data).unwrap();
        let mut out = vec![0u8; 10];
        let n = read(&mut img, start, 10, 0, &mut out).unwrap();
        assert_eq!(n, 10);
        assert_eq!(out, data);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn cross_block_roundtrip() {
        let (mut img, path) = fresh_image("cross", 8, 16);
        // Two blocks, 28 bytes total: crosses the 16-byte boundary.
        let start = build_chain(&mut img, 2);
        let size = 28u32;
        let data: Vec<u8> = (0..size as u8).collect();
        write(&mut img, start, size, 0, &data).unwrap();
        let mut out = vec![0u8; size as usize];
        let n = read(&mut img, start, size, 0, &mut out).unwrap();
        assert_eq!(n, size as usize);
        assert_eq!(out, data);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn partial_span_within_second_block() {
        let (mut img, path) = fresh_image("partial", 8, 16);
        let start = build_chain(&mut img, 2);
        let size = 32u32;
        let data: Vec<u8> = (0..size as u8).collect();
        write(&mut img, start, size, 0, &data).unwrap();

        // Read only the last byte of the first block through the first byte
        // of the second block.
        let mut out = vec![0u8; 2];
        let n = read(&mut img, start, size, 15, &mut out).unwrap();
        assert_eq!(n, 2);
        assert_eq!(out, &data[15..17]);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn exact_multiple_of_block_size() {
        let (mut img, path) = fresh_image("multiple", 8, 16);
        let start = build_chain(&mut img, 3);
        let size = 48u32;
        let data: Vec<u8> = (0..=255u8).cycle().take(size as usize).collect();
        write(&mut img, start, size, 0, &data).unwrap();
        let mut out = vec![0u8; size as usize];
        let n = read(&mut img, start, size, 0, &mut out).unwrap();
        assert_eq!(n, size as usize);
        assert_eq!(out, data);
        fs::remove_file(&path).unwrap();
    }
}
