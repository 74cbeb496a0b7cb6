//! The Image layer: opens, formats, and performs block-indexed I/O on the
//! backing file.

use crate::block::BLOCK_LAST;
use crate::error::Error;
use crate::error::Result;
use crate::util::as_bytes;
use crate::util::as_bytes_mut;
use std::fs::File;
use std::fs::OpenOptions;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::io::Write;
use std::mem::size_of;
use std::path::Path;

/// The filesystem's magic number, written to the superblock at format time.
pub const MAGIC: u32 = 0x2345beef;

/// The block index holding the superblock.
pub const BLOCK_SUPERBLOCK: u32 = 0;
/// The block index at which the FAT begins.
pub const BLOCK_FAT: u32 = 1;

/// The on-disk superblock record.
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct Superblock {
    /// Identifies a formatted image.
    pub magic: u32,
    /// Total number of blocks in the image.
    pub block_count: u32,
    /// Number of blocks occupied by the FAT.
    pub fat_block_count: u32,
    /// Size of a block, in bytes.
    pub block_size: u32,
    /// Block id of the root directory's initial storage.
    pub root_block: u32,
}

impl Superblock {
    /// Computes the number of FAT blocks needed to index `block_count` blocks
    /// of `block_size` bytes, each holding a 4-byte block id.
    pub fn fat_blocks_for(block_count: u32, block_size: u32) -> u32 {
        let entries_per_block = block_size / size_of::<u32>() as u32;
        crate::util::ceil_division(block_count, entries_per_block)
    }
}

/// A handle on an open filesystem image.
pub struct Image {
    file: File,
    superblock: Superblock,
}

impl Image {
    /// Opens the image at `path`, creating it if it does not exist.
    ///
    /// If the file already held a formatted image, the superblock is read
    /// back and cached. Otherwise the cached superblock is zeroed until
    /// [`Self::format`] is called.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let mut superblock = Superblock {
            magic: 0,
            block_count: 0,
            fat_block_count: 0,
            block_size: 0,
            root_block: 0,
        };
        let len = file.metadata()?.len();
        if len as usize >= size_of::<Superblock>() {
            file.seek(SeekFrom::Start(0))?;
            file.read_exact(unsafe { as_bytes_mut(&mut superblock) })?;
        }
        Ok(Self { file, superblock })
    }

    /// Formats the image according to `superblock`: zero-fills the entire
    /// image, writes the superblock, initialises the FAT, and writes the
    /// root directory's own entry record.
    pub fn format(&mut self, superblock: Superblock) -> Result<()> {
        self.superblock = superblock;
        let block_size = superblock.block_size as usize;
        let zero = vec![0u8; block_size];
        for b in 0..superblock.block_count {
            self.block_write_raw(b, &zero)?;
        }
        let sb_block = {
            let mut buf = zero.clone();
            buf[..size_of::<Superblock>()].copy_from_slice(unsafe { as_bytes(&superblock) });
            buf
        };
        self.block_write_raw(BLOCK_SUPERBLOCK, &sb_block)?;

        let entries_per_block = block_size as u32 / size_of::<u32>() as u32;
        let mut fat_buf = vec![0u8; block_size];
        for fat_block in 0..superblock.fat_block_count {
            for slot in 0..entries_per_block {
                let b = fat_block * entries_per_block + slot;
                if b >= superblock.block_count {
                    break;
                }
                let value = if b == superblock.root_block {
                    BLOCK_LAST
                } else if b < 1 + superblock.fat_block_count {
                    crate::block::BLOCK_INVALID
                } else {
                    crate::block::BLOCK_FREE
                };
                let off = slot as usize * size_of::<u32>();
                fat_buf[off..off + size_of::<u32>()].copy_from_slice(&value.to_le_bytes());
            }
            self.block_write_raw(BLOCK_FAT + fat_block, &fat_buf)?;
        }
        Ok(())
    }

    /// Closes the image, flushing any buffered writes.
    pub fn close(mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }

    /// Returns a read-only view of the cached superblock.
    pub fn superblock(&self) -> &Superblock {
        &self.superblock
    }

    fn block_valid(&self, block: u32) -> bool {
        block < self.superblock.block_count
    }

    /// Reads the entire contents of `block` into `buf`, which must be
    /// exactly `block_size` bytes.
    pub fn block_read(&mut self, block: u32, buf: &mut [u8]) -> Result<()> {
        if !self.block_valid(block) {
            return Err(Error::InvalidArgument);
        }
        self.block_read_raw(block, buf)
    }

    /// Writes the entire contents of `buf`, which must be exactly
    /// `block_size` bytes, to `block`.
    pub fn block_write(&mut self, block: u32, buf: &[u8]) -> Result<()> {
        if !self.block_valid(block) {
            return Err(Error::InvalidArgument);
        }
        self.block_write_raw(block, buf)
    }

    fn block_read_raw(&mut self, block: u32, buf: &mut [u8]) -> Result<()> {
        let block_size = self.superblock.block_size as u64;
        self.file.seek(SeekFrom::Start(block as u64 * block_size))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    fn block_write_raw(&mut self, block: u32, buf: &[u8]) -> Result<()> {
        let block_size = self.superblock.block_size as u64;
        self.file.seek(SeekFrom::Start(block as u64 * block_size))?;
        self.file.write_all(buf)?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::env::temp_dir;
    use std::fs;

    fn temp_path(name: &str) -> std::path::PathBuf {
        let mut p = temp_dir();
        p.push(format!("fatvol-image-test-{name}-{}", std::process::id()));
        p
    }

    #[test]
    fn format_then_reopen_superblock() {
        let path = temp_path("format");
        let _ = fs::remove_file(&path);

        let block_size = 64u32;
        let block_count = 8u32;
        let fat_block_count = Superblock::fat_blocks_for(block_count, block_size);
        let sb = Superblock {
            magic: MAGIC,
            block_count,
            fat_block_count,
            block_size,
            root_block: 1 + fat_block_count,
        };
        {
            let mut img = Image::open(&path).unwrap();
            img.format(sb).unwrap();
            img.close().unwrap();
        }
        let img = Image::open(&path).unwrap();
        let got = img.superblock();
        assert_eq!(got.magic, MAGIC);
        assert_eq!(got.block_count, block_count);
        assert_eq!(got.root_block, 1 + fat_block_count);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn block_write_read_roundtrip() {
        let path = temp_path("rw");
        let _ = fs::remove_file(&path);

        let block_size = 32u32;
        let block_count = 4u32;
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

        let data = vec![0xAB; block_size as usize];
        img.block_write(3, &data).unwrap();
        let mut readback = vec![0u8; block_size as usize];
        img.block_read(3, &mut readback).unwrap();
        assert_eq!(data, readback);

        img.close().unwrap();
        fs::remove_file(&path).unwrap();
    }
}
