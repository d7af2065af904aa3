//! A minimal read-only filesystem (`spec.md` §6 "minfs"): one metadata
//! block holding a fixed table of name/lba/size records, plus `readdir` and
//! `getattr` supplementing the original's `mount`/`lookup`/`read` floor
//! (`SPEC_FULL.md`'s module correspondence table).
//!
//! Grounded on `fs1.c`'s `fs1_inode_t`/`fs1_volume_t`: `fs1_mount` reads
//! block 0 as the whole metadata table and pins it with `page_set_lock`;
//! `fs1_lookup` linearly scans entries by name; `fs1_read` walks the LBA
//! range an entry covers, one block at a time. Root (`ino == 0`) is
//! synthesized as a directory, matching `fs1_new_inode`'s special case for
//! inode 0.
//!
//! [`FileSystemOps::read`] is not given the backing device, only the
//! `fs_data` `mount` attached — unlike `fs1_read`, which keeps `sb->bdev`
//! around and re-reads blocks on demand. Since this filesystem is read-only
//! and every file here is small by construction (`spec.md` §6), `mount`
//! instead reads each file's bytes once, up front, into an owned buffer;
//! `read` and `readdir` never touch the device again.

use core::any::Any;

use alloc::string::String;
use alloc::vec::Vec;

use bytemuck::{Pod, Zeroable};

use crate::blockio::CachedPage;
use crate::config::{MINFS_MAX_FILES, PAGE_SIZE};
use crate::vfs::fs::{
    DirEntry, Error, FileSystemOps, FsData, InodeInfo, MountContext, MountOutcome, Result,
};
use crate::vfs::inode::{FileType, InodeNumber, Mode};
use crate::vfs::mount::MountId;

const NAME_LEN: usize = 24;
const RECORD_LEN: usize = 32;

const _: () = assert!(core::mem::size_of::<RawEntry>() == RECORD_LEN);
const _: () = assert!(RECORD_LEN * MINFS_MAX_FILES == PAGE_SIZE);

/// One on-disk metadata record, packed so that `MINFS_MAX_FILES` of them
/// fill exactly one block (`fs1_inode_t`). A record whose `name` is all
/// zero bytes denotes an unused slot.
#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct RawEntry {
    name: [u8; NAME_LEN],
    lba: u32,
    size: u32,
}

fn entry_name(e: &RawEntry) -> &str {
    let end = e.name.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
    core::str::from_utf8(&e.name[..end]).unwrap_or("")
}

fn is_free(e: &RawEntry) -> bool {
    e.name.iter().all(|&b| b == 0)
}

fn entries(meta: &CachedPage) -> &[RawEntry] {
    // SAFETY: `meta` was pinned at mount time and is never released, so
    // this page's contents remain valid and stable for the filesystem's
    // lifetime.
    unsafe { core::slice::from_raw_parts(meta.addr.cast::<RawEntry>(), MINFS_MAX_FILES) }
}

/// Filesystem-private state retained from `mount`: the pinned metadata page
/// (read for names/sizes by `lookup`/`readdir`) and each file's contents,
/// read once up front (see the module doc comment).
struct Superblock {
    meta: CachedPage,
    files: Vec<Option<Vec<u8>>>,
}

// SAFETY: `meta.addr` points into page-allocator-owned memory that outlives
// the mount, and `files` holds only owned, already-`Send + Sync` buffers;
// nothing here is mutated after `mount` returns.
unsafe impl Send for Superblock {}
unsafe impl Sync for Superblock {}

fn read_file_bytes(ctx: &MountContext<'_>, entry: &RawEntry) -> Result<Vec<u8>> {
    let size = entry.size as usize;
    let block_size = ctx.bdev.logical_block_size().max(1);
    let mut data = alloc::vec![0u8; size];
    let mut done = 0;
    let mut lba = u64::from(entry.lba);
    while done < size {
        let page = ctx.cache.get(ctx.bdev, lba).map_err(|_| Error::Io)?;
        let chunk = (size - done).min(block_size);
        // SAFETY: `page.addr` is valid for `block_size` bytes for as long
        // as the reference is held, which ends at `release` just below.
        unsafe {
            core::ptr::copy_nonoverlapping(page.addr, data[done..done + chunk].as_mut_ptr(), chunk);
        }
        ctx.cache.release(page);
        done += chunk;
        lba += 1;
    }
    Ok(data)
}

/// The minimal read-only filesystem type (`spec.md` §6).
#[derive(Default)]
pub struct MinFs;

impl MinFs {
    fn superblock(fs_data: Option<&FsData>) -> &Superblock {
        (fs_data.expect("minfs always attaches a superblock") as &dyn Any)
            .downcast_ref::<Superblock>()
            .expect("minfs fs_data is always a Superblock")
    }
}

impl FileSystemOps for MinFs {
    fn name(&self) -> &'static str {
        "minfs"
    }

    fn mount(&self, ctx: &MountContext<'_>, mount: MountId) -> Result<MountOutcome> {
        let meta = ctx.cache.get(ctx.bdev, 0).map_err(|_| Error::Io)?;
        ctx.cache.pin(meta);

        // Slot 0 is reserved for the synthetic root directory (`ino == 0`)
        // regardless of what its record holds; only slots 1.. are files.
        let mut files = Vec::with_capacity(MINFS_MAX_FILES);
        for (idx, entry) in entries(&meta).iter().enumerate() {
            if idx == 0 || is_free(entry) {
                files.push(None);
            } else {
                files.push(Some(read_file_bytes(ctx, entry)?));
            }
        }

        let root = InodeInfo {
            mount,
            ino: 0,
            size: ctx.bdev.logical_block_size() as u64,
            mode: Mode::new(FileType::Directory, 0o755),
        };
        Ok(MountOutcome {
            root,
            fs_data: Some(alloc::sync::Arc::new(Superblock { meta, files })),
        })
    }

    fn lookup(&self, fs_data: Option<&FsData>, dir: &InodeInfo, name: &str) -> Result<InodeInfo> {
        if dir.ino != 0 || !dir.mode.is_dir() {
            return Err(Error::NotFound);
        }
        let sb = Self::superblock(fs_data);
        let (idx, entry) = entries(&sb.meta)
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, e)| !is_free(e) && entry_name(e) == name)
            .ok_or(Error::NotFound)?;
        Ok(InodeInfo {
            mount: dir.mount,
            ino: idx as InodeNumber,
            size: u64::from(entry.size),
            mode: Mode::new(FileType::Regular, 0o644),
        })
    }

    fn read(
        &self,
        fs_data: Option<&FsData>,
        inode: &InodeInfo,
        offset: u64,
        buf: &mut [u8],
    ) -> Result<usize> {
        if inode.ino == 0 {
            return Err(Error::NotSupported);
        }
        let sb = Self::superblock(fs_data);
        let idx = inode.ino as usize;
        let data = sb
            .files
            .get(idx)
            .and_then(Option::as_ref)
            .ok_or(Error::NotFound)?;
        let offset = offset as usize;
        if offset >= data.len() {
            return Ok(0);
        }
        let n = (data.len() - offset).min(buf.len());
        buf[..n].copy_from_slice(&data[offset..offset + n]);
        Ok(n)
    }

    fn readdir(&self, fs_data: Option<&FsData>, dir: &InodeInfo, offset: u64) -> Result<DirEntry> {
        if dir.ino != 0 || !dir.mode.is_dir() {
            return Err(Error::NotFound);
        }
        let sb = Self::superblock(fs_data);
        let mut seen = 0u64;
        for (idx, entry) in entries(&sb.meta).iter().enumerate().skip(1) {
            if is_free(entry) {
                continue;
            }
            if seen == offset {
                return Ok(DirEntry {
                    name: String::from(entry_name(entry)),
                    ino: idx as InodeNumber,
                    mode: Mode::new(FileType::Regular, 0o644),
                });
            }
            seen += 1;
        }
        Err(Error::NotFound)
    }
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;
    use crate::blockio::BlockIoCache;
    use crate::memory::page::PageAllocator;
    use std::alloc::Layout;

    struct Disk {
        blocks: Vec<[u8; PAGE_SIZE]>,
    }

    impl crate::blockio::BlockDevice for Disk {
        fn minor(&self) -> u8 {
            0
        }
        fn logical_block_size(&self) -> usize {
            PAGE_SIZE
        }
        fn read(&self, lba: u64, buf: &mut [u8]) -> core::result::Result<(), crate::blockio::Error> {
            buf.copy_from_slice(&self.blocks[lba as usize]);
            Ok(())
        }
        fn write(&self, _lba: u64, _buf: &[u8]) -> core::result::Result<(), crate::blockio::Error> {
            Err(crate::blockio::Error::ReadOnly)
        }
    }

    fn new_pages() -> PageAllocator<8> {
        let layout = Layout::from_size_align(8 * PAGE_SIZE, PAGE_SIZE).unwrap();
        let mem = unsafe { std::alloc::alloc_zeroed(layout) };
        unsafe { PageAllocator::<8>::new(mem, 8) }
    }

    fn disk_with_one_file() -> Disk {
        let mut blocks = alloc::vec![[0u8; PAGE_SIZE]; 2];
        // Slot 0 is the reserved root directory; a single `hello.txt`
        // record lives in slot 1 of the metadata block.
        const SLOT: usize = RECORD_LEN; // slot 1
        blocks[0][SLOT..SLOT + 9].copy_from_slice(b"hello.txt");
        blocks[0][SLOT + 24..SLOT + 28].copy_from_slice(&1u32.to_ne_bytes());
        blocks[0][SLOT + 28..SLOT + 32].copy_from_slice(&5u32.to_ne_bytes());
        blocks[1][..5].copy_from_slice(b"hello");
        Disk { blocks }
    }

    #[test]
    fn mount_lookup_read_and_readdir_round_trip() {
        let pages = new_pages();
        let cache = BlockIoCache::new(&pages);
        let disk = disk_with_one_file();
        let ctx = MountContext {
            bdev: &disk,
            cache: &cache,
        };

        let fs = MinFs;
        let outcome = fs.mount(&ctx, 0).unwrap();
        assert!(outcome.root.mode.is_dir());

        let fs_data = outcome.fs_data.as_deref();
        let file = fs.lookup(fs_data, &outcome.root, "hello.txt").unwrap();
        assert_eq!(file.ino, 1); // matches the on-disk slot, not slot + 1
        assert_eq!(file.size, 5);
        assert!(!file.mode.is_dir());

        let mut buf = [0u8; 5];
        assert_eq!(fs.read(fs_data, &file, 0, &mut buf).unwrap(), 5);
        assert_eq!(&buf, b"hello");
        assert_eq!(fs.read(fs_data, &file, 5, &mut buf).unwrap(), 0);

        let dirent = fs.readdir(fs_data, &outcome.root, 0).unwrap();
        assert_eq!(dirent.name, "hello.txt");
        assert_eq!(dirent.ino, file.ino);
        assert_eq!(
            fs.readdir(fs_data, &outcome.root, 1).unwrap_err(),
            Error::NotFound
        );
    }

    #[test]
    fn lookup_of_missing_name_is_not_found() {
        let pages = new_pages();
        let cache = BlockIoCache::new(&pages);
        let disk = disk_with_one_file();
        let ctx = MountContext {
            bdev: &disk,
            cache: &cache,
        };
        let fs = MinFs;
        let outcome = fs.mount(&ctx, 0).unwrap();
        assert_eq!(
            fs.lookup(outcome.fs_data.as_deref(), &outcome.root, "nope").unwrap_err(),
            Error::NotFound
        );
    }
}
