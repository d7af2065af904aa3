//! The filesystem operations interface (`spec.md` §4.9): the function table
//! every pluggable filesystem type implements.
//!
//! Grounded on `vfs.h`'s `fs_ops_s`: `{mount, unmount, lookup, read, write,
//! create, mkdir, evict, unlink, readdir, getattr, setattr}`. Unsupported
//! operations default to [`Error::NotSupported`] (`ENOSYS`), matching
//! `spec.md`'s "a read-only minimal filesystem implements only `mount`,
//! `lookup`, and `read`".

use core::any::Any;

use alloc::string::String;
use alloc::sync::Arc;

use crate::blockio::{BlockDevice, PageCache};
use crate::errno::Errno;
use crate::vfs::inode::{InodeNumber, Mode};
use crate::vfs::mount::MountId;

/// Errors a filesystem operation can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, snafu::Snafu)]
pub enum Error {
    /// The operation is not implemented by this filesystem type.
    NotSupported,
    /// No such file, directory, or entry.
    NotFound,
    /// An I/O error occurred reading the backing device.
    Io,
    /// The on-disk structure is corrupt in a way the filesystem cannot
    /// recover from (promoted to panic by callers per `spec.md` §7's fatal
    /// policy where named, otherwise surfaced here for a syscall-visible
    /// `EIO`).
    Corrupt,
    /// The requested entry already exists.
    Exists,
    /// No space remains to create a new entry.
    NoSpace,
}

impl Error {
    /// The syscall-visible errno for this condition.
    #[must_use]
    pub fn errno(self) -> Errno {
        match self {
            Error::NotSupported => Errno::NoSys,
            Error::NotFound => Errno::NoEnt,
            Error::Io | Error::Corrupt => Errno::Io,
            Error::Exists => Errno::Exist,
            Error::NoSpace => Errno::NoSpc,
        }
    }
}

/// Result type for filesystem operations.
pub type Result<T> = core::result::Result<T, Error>;

/// A filesystem-agnostic, by-value description of an inode, as handed
/// between the VFS core and a [`FileSystemOps`] implementor. The cache's
/// own bookkeeping (refcount, LRU link) lives in
/// [`crate::vfs::inode::CachedInode`], not here.
#[derive(Debug, Clone, Copy)]
pub struct InodeInfo {
    /// Mount this inode belongs to.
    pub mount: MountId,
    /// Inode number, unique within its superblock.
    pub ino: InodeNumber,
    /// Size in bytes.
    pub size: u64,
    /// Type and permission bits.
    pub mode: Mode,
}

/// A directory entry returned by `readdir`.
#[derive(Debug, Clone)]
pub struct DirEntry {
    /// The entry's name.
    pub name: String,
    /// The inode it names.
    pub ino: InodeNumber,
    /// Its type/permission bits.
    pub mode: Mode,
}

/// Filesystem-private, opaque state attached to a superblock or inode, the
/// Rust-idiomatic analogue of the C `void *fs_data`/`void *i_data` pointers
/// (`spec.md` §3). A filesystem implementation downcasts with
/// [`Any::downcast_ref`].
pub type FsData = dyn Any + Send + Sync;

/// What a filesystem type's `mount` is given: the backing device and the
/// page cache it may use to read metadata through (`spec.md` §4.8's
/// `page_set_lock` pinning a superblock's metadata page).
pub struct MountContext<'a> {
    /// The block device backing this mount.
    pub bdev: &'a dyn BlockDevice,
    /// The shared block I/O cache.
    pub cache: &'a dyn PageCache,
}

/// What a successful `mount` produces: the root inode and any filesystem
/// private state to retain for subsequent operations (`spec.md` §4.9:
/// "`sb->root` and `sb->fs_data`").
pub struct MountOutcome {
    /// The mounted filesystem's root inode.
    pub root: InodeInfo,
    /// Opaque filesystem-private state, retained for the lifetime of the
    /// mount and passed back into every subsequent operation.
    pub fs_data: Option<Arc<FsData>>,
}

/// The pluggable filesystem-type interface (`spec.md` §4.9).
///
/// `mount` is given a fresh [`MountId`]/superblock context by the VFS core;
/// every other operation receives the `fs_data` produced by `mount` (or
/// `None` if the filesystem declined to keep any) so it is never required to
/// keep global state of its own.
pub trait FileSystemOps: Send + Sync {
    /// This filesystem type's registry name (`spec.md` §4.9 "Registry").
    fn name(&self) -> &'static str;

    /// Reads whatever on-disk structure this filesystem needs to locate its
    /// root inode, populating `sb->root`/`sb->fs_data`.
    fn mount(&self, ctx: &MountContext<'_>, mount: MountId) -> Result<MountOutcome>;

    /// Releases any filesystem-private state. Called both on a normal
    /// `umount` and to roll back a mount that ran out of mount-table slots
    /// (`spec.md` §4.9).
    fn unmount(&self, _fs_data: Option<&FsData>) -> Result<()> {
        Ok(())
    }

    /// Resolves one path component `name` within directory `dir`.
    fn lookup(&self, fs_data: Option<&FsData>, dir: &InodeInfo, name: &str) -> Result<InodeInfo>;

    /// Reads up to `buf.len()` bytes starting at `offset`, returning the
    /// number of bytes actually read (0 at end-of-file).
    fn read(
        &self,
        fs_data: Option<&FsData>,
        inode: &InodeInfo,
        offset: u64,
        buf: &mut [u8],
    ) -> Result<usize>;

    /// Writes `buf` starting at `offset`, returning the number of bytes
    /// written.
    fn write(
        &self,
        _fs_data: Option<&FsData>,
        _inode: &InodeInfo,
        _offset: u64,
        _buf: &[u8],
    ) -> Result<usize> {
        Err(Error::NotSupported)
    }

    /// Creates a new regular file named `name` in `dir`.
    fn create(&self, _fs_data: Option<&FsData>, _dir: &InodeInfo, _name: &str) -> Result<InodeInfo> {
        Err(Error::NotSupported)
    }

    /// Creates a new directory named `name` in `dir`.
    fn mkdir(&self, _fs_data: Option<&FsData>, _dir: &InodeInfo, _name: &str) -> Result<InodeInfo> {
        Err(Error::NotSupported)
    }

    /// Called when the inode cache evicts `inode` to make room for another,
    /// so the filesystem can free any private data it attached (`spec.md`
    /// §4.9's inode cache eviction).
    fn evict(&self, _fs_data: Option<&FsData>, _inode: &InodeInfo) {}

    /// Removes the entry named `name` from `dir`.
    fn unlink(&self, _fs_data: Option<&FsData>, _dir: &InodeInfo, _name: &str) -> Result<()> {
        Err(Error::NotSupported)
    }

    /// Returns the directory entry at `offset` (an opaque cursor position
    /// the VFS core advances by one on success, `spec.md` §4.9 `readdir`).
    fn readdir(&self, _fs_data: Option<&FsData>, _dir: &InodeInfo, _offset: u64) -> Result<DirEntry> {
        Err(Error::NotSupported)
    }

    /// Returns the current attributes of `inode`, re-reading them from disk
    /// if this filesystem does not keep them resident.
    fn getattr(&self, _fs_data: Option<&FsData>, inode: &InodeInfo) -> Result<InodeInfo> {
        Ok(*inode)
    }

    /// Updates `inode`'s attributes.
    fn setattr(&self, _fs_data: Option<&FsData>, _inode: &InodeInfo, _mode: Mode) -> Result<()> {
        Err(Error::NotSupported)
    }
}

/// A shared filesystem-type implementor, as stored in the
/// [`crate::vfs::registry::FsRegistry`].
pub type FsOps = Arc<dyn FileSystemOps>;
