//! The Filesystem facade: the API surface a userspace-filesystem bridge
//! would call into (get-attributes, make-dir, make-file, read/write,
//! enumerate-dir, remove, rename, truncate, set-times, change-mode).

use crate::addr;
use crate::entry;
use crate::entry::Entry;
use crate::entry::Place;
use crate::error::Error;
use crate::error::Result;
use crate::image::Image;
use crate::image::Superblock;
use crate::image::MAGIC;
use crate::util::as_bytes_mut;
use crate::util::get_timestamp;
use std::mem::size_of;
use std::path::Path;

/// Default permission bits given to a freshly-formatted root directory.
const ROOT_MODE: u32 = entry::MODE_DIR | 0o755;

/// An open filesystem: a backing image plus the operations a collaborator
/// needs to drive it.
pub struct Filesystem {
    image: Image,
}

impl Filesystem {
    /// Opens an already-formatted image at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let image = Image::open(path)?;
        if image.superblock().magic != MAGIC {
            return Err(Error::Corruption("bad superblock magic"));
        }
        Ok(Self { image })
    }

    /// Formats a new image at `path` with `block_count` blocks of
    /// `block_size` bytes each, then opens it.
    pub fn format(path: &Path, block_count: u32, block_size: u32) -> Result<Self> {
        let fat_block_count = Superblock::fat_blocks_for(block_count, block_size);
        let root_block = 1 + fat_block_count;
        if root_block >= block_count {
            return Err(Error::InvalidArgument);
        }
        let sb = Superblock {
            magic: MAGIC,
            block_count,
            fat_block_count,
            block_size,
            root_block,
        };
        let mut image = Image::open(path)?;
        image.format(sb)?;

        let mut root = Entry::new("/", ROOT_MODE)?;
        // The root's own record is the sole occupant of its chain's first
        // (and, at format time, only) slot; `grow` would allocate a block
        // that `format` already reserved as `root_block`, so write directly.
        // `start_block` must point at that reserved block: the FAT already
        // marks it `LAST`, so the chain is the single block `[root_block]`.
        root.start_block = root_block;
        root.size = size_of::<Entry>() as u32;
        let mut buf = vec![0u8; block_size as usize];
        image.block_read(root_block, &mut buf)?;
        buf[..size_of::<Entry>()].copy_from_slice(unsafe { crate::util::as_bytes(&root) });
        image.block_write(root_block, &buf)?;

        Ok(Self { image })
    }

    /// Closes the image, flushing any buffered writes.
    pub fn close(self) -> Result<()> {
        self.image.close()
    }

    /// Reads the root's own self-record directly from its permanent home at
    /// `(root_block, 0)`. Valid regardless of how large the root directory
    /// has grown, because growth only ever prepends new blocks ahead of
    /// `root_block`, which remains the chain's tail forever.
    fn read_root(&mut self) -> Result<Entry> {
        let root_block = self.image.superblock().root_block;
        let block_size = self.image.superblock().block_size as usize;
        let mut scratch = vec![0u8; block_size];
        self.image.block_read(root_block, &mut scratch)?;
        let mut ent: Entry = unsafe { std::mem::zeroed() };
        unsafe { as_bytes_mut(&mut ent) }.copy_from_slice(&scratch[..size_of::<Entry>()]);
        Ok(ent)
    }

    /// Returns metadata for the object at `path`.
    pub fn get_attr(&mut self, path: &str) -> Result<Entry> {
        let root = self.read_root()?;
        entry::resolve(&mut self.image, &root, path)
    }

    /// Opens `path`, returning its metadata. Fails if it does not exist.
    pub fn open_path(&mut self, path: &str) -> Result<Entry> {
        self.get_attr(path)
    }

    fn create(&mut self, path: &str, mode: u32) -> Result<()> {
        let root = self.read_root()?;
        let (parent_path, name) = entry::split_parent(path)?;
        let (mut parent, place) = entry::resolve_place(&mut self.image, &root, &parent_path)?;
        if !parent.is_dir() {
            return Err(Error::NotADirectory);
        }
        let child = Entry::new(&name, mode)?;
        entry::append_child(&mut self.image, &mut parent, place, &child)?;
        Ok(())
    }

    /// Creates an empty directory at `path`.
    pub fn make_dir(&mut self, path: &str, perm: u32) -> Result<()> {
        self.create(path, entry::MODE_DIR | (perm & !entry::MODE_TYPE_MASK))
    }

    /// Creates an empty regular file at `path`.
    pub fn make_file(&mut self, path: &str, perm: u32) -> Result<()> {
        self.create(path, entry::MODE_FILE | (perm & !entry::MODE_TYPE_MASK))
    }

    /// Reads up to `buf.len()` bytes from `path` starting at `offset`, and
    /// refreshes its access time. Returns the number of bytes read.
    pub fn read_at(&mut self, path: &str, offset: u32, buf: &mut [u8]) -> Result<usize> {
        let root = self.read_root()?;
        let (mut ent, place) = entry::resolve_place(&mut self.image, &root, path)?;
        if ent.is_dir() {
            return Err(Error::IsADirectory);
        }
        if offset >= ent.size {
            return Ok(0);
        }
        let n = addr::read(&mut self.image, ent.start_block, ent.size, offset, buf)?;
        ent.access_time = get_timestamp();
        entry::persist(&mut self.image, place, &ent)?;
        Ok(n)
    }

    /// Writes `buf` to `path` starting at `offset`, growing the file if
    /// necessary, and refreshes its access and modify times. Returns the
    /// number of bytes written.
    pub fn write_at(&mut self, path: &str, offset: u32, buf: &[u8]) -> Result<usize> {
        let root = self.read_root()?;
        let (mut ent, place) = entry::resolve_place(&mut self.image, &root, path)?;
        if ent.is_dir() {
            return Err(Error::IsADirectory);
        }
        let end = offset.checked_add(buf.len() as u32).ok_or(Error::InvalidArgument)?;
        if end > ent.size {
            entry::grow(&mut self.image, &mut ent, end - ent.size)?;
        }
        let n = addr::write(&mut self.image, ent.start_block, ent.size, offset, buf)?;
        ent.modify_time = get_timestamp();
        ent.access_time = ent.modify_time;
        entry::persist(&mut self.image, place, &ent)?;
        Ok(n)
    }

    /// Invokes `visitor` once per child of the directory at `path`.
    pub fn readdir(&mut self, path: &str, mut visitor: impl FnMut(&Entry)) -> Result<()> {
        let root = self.read_root()?;
        let (dir, place) = entry::resolve_place(&mut self.image, &root, path)?;
        if !dir.is_dir() {
            return Err(Error::NotADirectory);
        }
        let is_root = matches!(place, Place::Root);
        entry::for_each(&mut self.image, dir.start_block, dir.size, is_root, |_, ent| {
            visitor(ent);
            Ok(())
        })
    }

    /// Removes the object at `path`. Directories must be empty.
    pub fn remove(&mut self, path: &str) -> Result<()> {
        let root = self.read_root()?;
        let (parent_path, name) = entry::split_parent(path)?;
        let (mut parent, place) = entry::resolve_place(&mut self.image, &root, &parent_path)?;
        if !parent.is_dir() {
            return Err(Error::NotADirectory);
        }
        let skip_first = matches!(place, Place::Root);
        let (index, target) = entry::find_child(
            &mut self.image,
            parent.start_block,
            parent.size,
            skip_first,
            &name,
        )?
        .ok_or(Error::NotFound)?;
        if target.is_dir() && target.size != 0 {
            return Err(Error::NotEmpty);
        }
        if !target.is_dir() && target.size != 0 {
            let mut t = target;
            entry::shrink(&mut self.image, &mut t, t.size)?;
        }
        entry::remove_child(&mut self.image, &mut parent, place, index)
    }

    /// Moves `old` to `new`, preserving its data chain without relocating
    /// it. If `new` already exists, it is removed first, subject to the
    /// same type-compatibility and emptiness rules as [`Self::remove`].
    pub fn rename(&mut self, old: &str, new: &str) -> Result<()> {
        let root = self.read_root()?;
        let src = entry::resolve(&mut self.image, &root, old)?;

        if let Ok(target) = entry::resolve(&mut self.image, &root, new) {
            if target.is_dir() && !src.is_dir() {
                return Err(Error::NotADirectory);
            }
            if !target.is_dir() && src.is_dir() {
                return Err(Error::IsADirectory);
            }
            if target.is_dir() && target.size != 0 {
                return Err(Error::NotEmpty);
            }
            self.remove(new)?;
        }

        let (new_parent_path, new_name) = entry::split_parent(new)?;
        let root = self.read_root()?;
        let (mut new_parent, new_place) =
            entry::resolve_place(&mut self.image, &root, &new_parent_path)?;
        if !new_parent.is_dir() {
            return Err(Error::NotADirectory);
        }
        let mut payload = src;
        payload.set_name(&new_name)?;
        entry::append_child(&mut self.image, &mut new_parent, new_place, &payload)?;

        let (old_parent_path, old_name) = entry::split_parent(old)?;
        let root = self.read_root()?;
        let (mut old_parent, old_place) =
            entry::resolve_place(&mut self.image, &root, &old_parent_path)?;
        let skip_first = matches!(old_place, Place::Root);
        let (old_index, _) = entry::find_child(
            &mut self.image,
            old_parent.start_block,
            old_parent.size,
            skip_first,
            &old_name,
        )?
        .ok_or(Error::Corruption("rename source vanished"))?;
        entry::remove_child(&mut self.image, &mut old_parent, old_place, old_index)
    }

    /// Grows or shrinks the file at `path` to exactly `size` bytes.
    pub fn truncate(&mut self, path: &str, size: u32) -> Result<()> {
        let root = self.read_root()?;
        let (mut ent, place) = entry::resolve_place(&mut self.image, &root, path)?;
        if ent.is_dir() {
            return Err(Error::IsADirectory);
        }
        match size.cmp(&ent.size) {
            std::cmp::Ordering::Greater => entry::grow(&mut self.image, &mut ent, size - ent.size)?,
            std::cmp::Ordering::Less => entry::shrink(&mut self.image, &mut ent, ent.size - size)?,
            std::cmp::Ordering::Equal => return Ok(()),
        }
        entry::persist(&mut self.image, place, &ent)
    }

    /// Sets the access and modification times of `path`.
    pub fn set_times(&mut self, path: &str, atime: u64, mtime: u64) -> Result<()> {
        let root = self.read_root()?;
        let (mut ent, place) = entry::resolve_place(&mut self.image, &root, path)?;
        ent.access_time = atime;
        ent.modify_time = mtime;
        entry::persist(&mut self.image, place, &ent)
    }

    /// Changes the permission bits of `path`, preserving its object kind.
    pub fn chmod(&mut self, path: &str, perm: u32) -> Result<()> {
        let root = self.read_root()?;
        let (mut ent, place) = entry::resolve_place(&mut self.image, &root, path)?;
        ent.mode = (ent.mode & entry::MODE_TYPE_MASK) | (perm & !entry::MODE_TYPE_MASK);
        entry::persist(&mut self.image, place, &ent)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::env::temp_dir;
    use std::fs;

    fn fresh_fs(name: &str) -> (Filesystem, std::path::PathBuf) {
        let mut path = temp_dir();
        path.push(format!("fatvol-object-test-{name}-{}", std::process::id()));
        let _ = fs::remove_file(&path);
        let fs = Filesystem::format(&path, 64, 1024).unwrap();
        (fs, path)
    }

    #[test]
    fn format_open_close() {
        let (fs, path) = fresh_fs("s1");
        fs.close().unwrap();
        let mut fs = Filesystem::open(&path).unwrap();
        let root = fs.get_attr("/").unwrap();
        assert!(root.is_dir());
        assert_eq!(root.size, size_of::<Entry>() as u32);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn single_file_roundtrip_across_reopen() {
        let (mut fs, path) = fresh_fs("s2");
        fs.make_file("/a", 0o644).unwrap();
        let data: Vec<u8> = (0..3000).map(|i| (i % 251) as u8).collect();
        fs.write_at("/a", 0, &data).unwrap();
        let mut out = vec![0u8; data.len()];
        let n = fs.read_at("/a", 0, &mut out).unwrap();
        assert_eq!(n, data.len());
        assert_eq!(out, data);
        fs.close().unwrap();

        let mut fs = Filesystem::open(&path).unwrap();
        let mut out2 = vec![0u8; data.len()];
        fs.read_at("/a", 0, &mut out2).unwrap();
        assert_eq!(out2, data);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn directory_enumeration() {
        let (mut fs, path) = fresh_fs("s3");
        fs.make_file("/x", 0o644).unwrap();
        fs.make_file("/y", 0o644).unwrap();
        fs.make_file("/z", 0o644).unwrap();
        let mut names: Vec<String> = Vec::new();
        fs.readdir("/", |ent| names.push(ent.name().to_owned())).unwrap();
        names.sort();
        assert_eq!(names, vec!["x", "y", "z"]);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn swap_delete_preserves_siblings() {
        let (mut fs, path) = fresh_fs("s4");
        fs.make_file("/x", 0o644).unwrap();
        fs.make_file("/y", 0o644).unwrap();
        fs.make_file("/z", 0o644).unwrap();
        fs.remove("/y").unwrap();
        let mut names: Vec<String> = Vec::new();
        fs.readdir("/", |ent| names.push(ent.name().to_owned())).unwrap();
        names.sort();
        assert_eq!(names, vec!["x", "z"]);
        fs.make_file("/w", 0o644).unwrap();
        names.clear();
        fs.readdir("/", |ent| names.push(ent.name().to_owned())).unwrap();
        names.sort();
        assert_eq!(names, vec!["w", "x", "z"]);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn rename_across_directories_moves_data() {
        let (mut fs, path) = fresh_fs("s5");
        fs.make_dir("/d1", 0o755).unwrap();
        fs.make_dir("/d2", 0o755).unwrap();
        fs.make_file("/d1/f", 0o644).unwrap();
        let data = vec![0xABu8; 500];
        fs.write_at("/d1/f", 0, &data).unwrap();

        fs.rename("/d1/f", "/d2/g").unwrap();
        assert!(matches!(fs.get_attr("/d1/f"), Err(Error::NotFound)));
        let mut out = vec![0u8; 500];
        fs.read_at("/d2/g", 0, &mut out).unwrap();
        assert_eq!(out, data);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn truncate_down_frees_blocks() {
        let (mut fs, path) = fresh_fs("s6");
        fs.make_file("/big", 0o644).unwrap();
        let data = vec![0x11u8; 3000];
        fs.write_at("/big", 0, &data).unwrap();
        fs.truncate("/big", 10).unwrap();
        let attr = fs.get_attr("/big").unwrap();
        assert_eq!(attr.size, 10);
        let mut out = vec![0u8; 10];
        fs.read_at("/big", 0, &mut out).unwrap();
        assert_eq!(out, &data[..10]);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn fill_to_exhaustion() {
        let mut path = temp_dir();
        path.push(format!("fatvol-object-test-exhaust-{}", std::process::id()));
        let _ = fs::remove_file(&path);
        // block_count=4, block_size=1024: superblock(0) + fat(1) + root(2),
        // exactly one data block remains free.
        let mut fs = Filesystem::format(&path, 4, 1024).unwrap();
        fs.make_file("/big", 0o644).unwrap();
        let data = vec![0x7Eu8; 1025];
        let err = fs.write_at("/big", 0, &data);
        assert!(matches!(err, Err(Error::OutOfSpace)));
        let attr = fs.get_attr("/big").unwrap();
        assert!(attr.size == 0 || attr.size == 1024);
        fs::remove_file(&path).unwrap();
    }
}
