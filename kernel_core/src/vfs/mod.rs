//! The virtual file system core (C9, `spec.md` §4.9): filesystem-type
//! registry, mount table, inode cache and path resolution, all behind one
//! lock.
//!
//! `spec.md` §5: "The VFS inode cache and mount table must be protected by a
//! single VFS lock" — grounded on `vfs.c`, which serializes the whole VFS
//! under one spinlock rather than locking the registry, mount table and
//! inode cache independently.

pub mod file;
pub mod fs;
pub mod inode;
pub mod minfs;
pub mod mount;
pub mod registry;

use crate::blockio::{BlockDevice, PageCache};
use crate::errno::Errno;
use file::{FileHandle, Whence};
use fs::{DirEntry, FsOps, InodeInfo, MountContext};
use inode::{InodeCache, InodeNumber};
use mount::{MountId, MountTable};
use registry::FsRegistry;

/// Errors surfaced by the VFS core, unifying the per-layer error types named
/// in [`fs::Error`], [`mount::Error`], [`registry::Error`] and
/// [`inode::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A filesystem operation failed.
    Fs(fs::Error),
    /// A mount table operation failed.
    Mount(mount::Error),
    /// A registry operation failed.
    Registry(registry::Error),
    /// A path component was empty where a name was required (e.g. a bare
    /// `/` passed where a relative lookup needs `base`).
    InvalidPath,
    /// A relative path was given without a base inode, or an absolute path
    /// was given with one (`spec.md` §4.9 `resolve`).
    BadBase,
}

impl Error {
    /// The syscall-visible errno for this condition.
    #[must_use]
    pub fn errno(self) -> Errno {
        match self {
            Error::Fs(e) => e.errno(),
            Error::Mount(e) => e.errno(),
            Error::Registry(e) => e.errno(),
            Error::InvalidPath | Error::BadBase => Errno::Inval,
        }
    }
}

impl From<fs::Error> for Error {
    fn from(e: fs::Error) -> Self {
        Error::Fs(e)
    }
}
impl From<mount::Error> for Error {
    fn from(e: mount::Error) -> Self {
        Error::Mount(e)
    }
}
impl From<registry::Error> for Error {
    fn from(e: registry::Error) -> Self {
        Error::Registry(e)
    }
}

/// Result type for VFS operations.
pub type Result<T> = core::result::Result<T, Error>;

struct Inner<const MAX_TYPES: usize, const MAX_MOUNTS: usize, const MAX_INODES: usize> {
    registry: FsRegistry<MAX_TYPES>,
    mounts: MountTable<MAX_MOUNTS>,
    inodes: InodeCache<MAX_INODES>,
}

/// The virtual file system: registry, mounts and inode cache under a single
/// lock (`spec.md` §5).
pub struct Vfs<const MAX_TYPES: usize, const MAX_MOUNTS: usize, const MAX_INODES: usize> {
    inner: spin::Mutex<Inner<MAX_TYPES, MAX_MOUNTS, MAX_INODES>>,
}

impl<const MAX_TYPES: usize, const MAX_MOUNTS: usize, const MAX_INODES: usize>
    Vfs<MAX_TYPES, MAX_MOUNTS, MAX_INODES>
{
    /// Creates an empty VFS core: no filesystem types registered, no
    /// mounts, no cached inodes.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: spin::Mutex::new(Inner {
                registry: FsRegistry::new(),
                mounts: MountTable::new(),
                inodes: InodeCache::new(),
            }),
        }
    }

    /// Registers a filesystem type (`spec.md` §4.9 "Registry").
    ///
    /// # Errors
    /// [`registry::Error::Exists`] if its name is already taken,
    /// [`registry::Error::Full`] if the registry has no free slot.
    pub fn register_fs(&self, fs: FsOps) -> Result<()> {
        self.inner.lock().registry.register(fs).map_err(Into::into)
    }

    /// Mounts the filesystem type named `fs_name` as the root filesystem
    /// (`spec.md` §4.11's boot sequence).
    ///
    /// # Errors
    /// [`registry::Error::NotFound`] if no such filesystem type is
    /// registered; whatever the filesystem type's own `mount` returns.
    pub fn mount_root(
        &self,
        fs_name: &str,
        bdev: &dyn BlockDevice,
        cache: &dyn PageCache,
    ) -> Result<()> {
        let mut inner = self.inner.lock();
        let fs = inner.registry.lookup(fs_name).ok_or(registry::Error::NotFound)?;
        let outcome = fs.mount(&MountContext { bdev, cache }, 0)?;
        inner.mounts.mount_root(fs, outcome.root, outcome.fs_data);
        Ok(())
    }

    /// Mounts the filesystem type named `fs_name` at `path`, over the inode
    /// at `mount_point` (which must already have been resolved — `spec.md`
    /// §4.9 "Mount table": "for nested mounts, the path must already
    /// exist").
    ///
    /// Rolls the filesystem-specific mount back via `unmount` if no mount
    /// table slot remains once it succeeds.
    ///
    /// # Errors
    /// Propagates registry lookup failure, the filesystem's own `mount`
    /// error, or [`mount::Error::Full`].
    pub fn mount(
        &self,
        fs_name: &str,
        bdev: &dyn BlockDevice,
        cache: &dyn PageCache,
        mount_point: InodeInfo,
        path: &str,
    ) -> Result<MountId> {
        let mut inner = self.inner.lock();
        let fs = inner.registry.lookup(fs_name).ok_or(registry::Error::NotFound)?;
        // The VFS lock is held across both calls, so the slot this mount
        // will land in cannot be taken by another mount in between.
        let id = inner.mounts.next_free_slot().ok_or(mount::Error::Full)?;
        let outcome = fs.mount(&MountContext { bdev, cache }, id)?;
        match inner.mounts.mount(
            fs.clone(),
            outcome.root,
            outcome.fs_data.clone(),
            mount_point,
            path,
        ) {
            Ok(id) => Ok(id),
            Err(e) => {
                let _ = fs.unmount(outcome.fs_data.as_deref());
                Err(e.into())
            }
        }
    }

    /// Finds the mount whose path is the longest bounded prefix of `path`
    /// (`spec.md` §4.9 "Mount resolution").
    ///
    /// # Errors
    /// [`mount::Error::NotFound`] if no mount (not even the root) matches,
    /// or `path` is not absolute.
    pub fn resolve_mount(&self, path: &str) -> Result<MountId> {
        self.inner
            .lock()
            .mounts
            .resolve_mount(path)
            .ok_or(mount::Error::NotFound.into())
    }

    /// Unmounts the filesystem at `id` (`spec.md` §4.9 `umount`).
    ///
    /// # Errors
    /// [`mount::Error::RootMount`] for the root mount,
    /// [`mount::Error::NotFound`] if `id` names no active mount.
    pub fn unmount(&self, id: MountId) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.inodes.has_inode_in_mount(id) {
            return Err(Error::Mount(mount::Error::Busy));
        }
        let entry = inner.mounts.unmount(id)?;
        entry.fs.unmount(entry.fs_data.as_deref())?;
        Ok(())
    }

    fn lookup_in(
        inner: &Inner<MAX_TYPES, MAX_MOUNTS, MAX_INODES>,
        mount: MountId,
        dir: &InodeInfo,
        name: &str,
    ) -> Result<InodeInfo> {
        let entry = inner.mounts.get(mount).ok_or(mount::Error::NotFound)?;
        entry
            .fs
            .lookup(entry.fs_data.as_deref(), dir, name)
            .map_err(Into::into)
    }

    /// Resolves `path` to an inode (`spec.md` §4.9 "Path resolution").
    ///
    /// For an absolute path (`path` starts with `/`), `base` must be `None`
    /// and resolution starts from the mount [`MountTable::resolve_mount`]
    /// finds for `path` — the longest registered mount path that bounds it
    /// — rather than unconditionally the root mount, so a path under a
    /// nested mount resolves directly against that mount's own root
    /// (`vfs.c`'s `vfs_resolve`: `sb = vfs_mount_resolve(path)`). For a
    /// relative path, `base` must be `Some`. Empty components and `.` are
    /// skipped; after every step, a mount-point match switches to the
    /// mounted filesystem's root.
    ///
    /// # Errors
    /// [`Error::BadBase`] if `base`'s presence doesn't match the path's
    /// absoluteness; otherwise whatever `lookup` on a path component
    /// returns.
    pub fn resolve(&self, base: Option<InodeInfo>, path: &str) -> Result<InodeInfo> {
        let inner = self.inner.lock();
        let absolute = path.starts_with('/');
        if absolute != base.is_none() {
            return Err(Error::BadBase);
        }

        let (mut mount, mut dir, remaining) = if absolute {
            let found = inner.mounts.resolve_mount(path).ok_or(mount::Error::NotFound)?;
            let entry = inner.mounts.get(found).ok_or(mount::Error::NotFound)?;
            let mount_path = entry.path.as_str();
            let remaining = if mount_path == "/" {
                path
            } else {
                &path[mount_path.len()..]
            };
            (found, entry.root, remaining)
        } else {
            let base = base.unwrap();
            (base.mount, base, path)
        };

        for component in remaining.split('/') {
            if component.is_empty() || component == "." {
                continue;
            }
            let next = Self::lookup_in(&inner, mount, &dir, component)?;
            if let Some(new_mount) = inner.mounts.mounted_over(&next) {
                let entry = inner.mounts.get(new_mount).ok_or(mount::Error::NotFound)?;
                mount = new_mount;
                dir = entry.root;
            } else {
                dir = next;
            }
        }
        Ok(dir)
    }

    /// Opens `path` (`spec.md` §4.9 `open`), resolving it relative to
    /// `base` exactly as [`Vfs::resolve`], then taking a cache reference on
    /// the resulting inode.
    ///
    /// # Panics
    /// If the inode cache is full with no evictable victim (`spec.md` §7:
    /// insertion with no LRU victim is fatal).
    pub fn open(&self, base: Option<InodeInfo>, path: &str) -> Result<FileHandle> {
        let info = self.resolve(base, path)?;
        let mut inner = self.inner.lock();
        if let Some(cached) = inner.inodes.get(info.mount, info.ino) {
            return Ok(FileHandle::new(cached.info));
        }
        let (_, evicted) = inner
            .inodes
            .insert(info)
            .expect("inode cache has no evictable victim");
        if let Some(victim) = evicted {
            let entry = inner
                .mounts
                .get(victim.info.mount)
                .expect("evicted inode names a live mount");
            entry.fs.evict(entry.fs_data.as_deref(), &victim.info);
        }
        Ok(FileHandle::new(info))
    }

    /// Closes `file` (`spec.md` §4.9 `close`), releasing its inode cache
    /// reference.
    pub fn close(&self, file: FileHandle) {
        self.inner
            .lock()
            .inodes
            .release(file.inode.mount, file.inode.ino);
    }

    /// Reads into `buf` at `file`'s current offset, advancing it by the
    /// number of bytes actually read (`spec.md` §4.9 `read`).
    ///
    /// # Errors
    /// Whatever the owning filesystem's `read` returns.
    pub fn read(&self, file: &mut FileHandle, buf: &mut [u8]) -> Result<usize> {
        let inner = self.inner.lock();
        let entry = inner.mounts.get(file.inode.mount).ok_or(mount::Error::NotFound)?;
        let n = entry
            .fs
            .read(entry.fs_data.as_deref(), &file.inode, file.offset, buf)?;
        file.offset += n as u64;
        Ok(n)
    }

    /// Updates `file`'s offset per `whence`/`delta` (`spec.md` §4.9
    /// `seek`).
    pub fn seek(&self, file: &mut FileHandle, whence: Whence, delta: i64) -> u64 {
        file.offset = file.seek_target(whence, delta);
        file.offset
    }

    /// Returns the directory entry at `file`'s current offset and advances
    /// it by one on success (`spec.md` §4.9 `readdir`).
    ///
    /// # Errors
    /// Whatever the owning filesystem's `readdir` returns (typically
    /// [`fs::Error::NotFound`] once every entry has been consumed).
    pub fn readdir(&self, file: &mut FileHandle) -> Result<DirEntry> {
        let inner = self.inner.lock();
        let entry = inner.mounts.get(file.inode.mount).ok_or(mount::Error::NotFound)?;
        let dirent = entry
            .fs
            .readdir(entry.fs_data.as_deref(), &file.inode, file.offset)?;
        file.offset += 1;
        Ok(dirent)
    }

    /// Re-reads `inode`'s attributes from its owning filesystem
    /// (`spec.md` §4.9 `getattr`).
    ///
    /// # Errors
    /// Whatever the owning filesystem's `getattr` returns.
    pub fn getattr(&self, inode: &InodeInfo) -> Result<InodeInfo> {
        let inner = self.inner.lock();
        let entry = inner.mounts.get(inode.mount).ok_or(mount::Error::NotFound)?;
        entry
            .fs
            .getattr(entry.fs_data.as_deref(), inode)
            .map_err(Into::into)
    }
}

impl<const MAX_TYPES: usize, const MAX_MOUNTS: usize, const MAX_INODES: usize> Default
    for Vfs<MAX_TYPES, MAX_MOUNTS, MAX_INODES>
{
    fn default() -> Self {
        Self::new()
    }
}

/// Splits a path into its parent directory and final component, the way
/// `create`/`mkdir`/`unlink` callers need (`spec.md` §4.9 names these
/// operations on a `(dir, name)` pair, not a whole path).
#[must_use]
pub fn split_parent(path: &str) -> (&str, &str) {
    match path.rsplit_once('/') {
        Some((parent, name)) => (if parent.is_empty() { "/" } else { parent }, name),
        None => ("", path),
    }
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;
    use crate::vfs::fs::{FileSystemOps, MountOutcome};
    use crate::vfs::inode::{FileType, Mode};
    use crate::vfs::mount::MountId as Mid;
    use alloc::sync::Arc;

    /// A filesystem holding a tiny fixed tree: `/` (dir, ino 1) containing
    /// `hello` (regular, ino 2) whose contents are a fixed byte string.
    struct TinyFs;
    impl FileSystemOps for TinyFs {
        fn name(&self) -> &'static str {
            "tiny"
        }
        fn mount(&self, _ctx: &MountContext<'_>, mount: Mid) -> fs::Result<MountOutcome> {
            Ok(MountOutcome {
                root: InodeInfo {
                    mount,
                    ino: 1,
                    size: 0,
                    mode: Mode::new(FileType::Directory, 0o755),
                },
                fs_data: None,
            })
        }
        fn lookup(
            &self,
            _fs_data: Option<&fs::FsData>,
            dir: &InodeInfo,
            name: &str,
        ) -> fs::Result<InodeInfo> {
            if dir.ino == 1 && name == "hello" {
                Ok(InodeInfo {
                    mount: dir.mount,
                    ino: 2,
                    size: 13,
                    mode: Mode::new(FileType::Regular, 0o644),
                })
            } else {
                Err(fs::Error::NotFound)
            }
        }
        fn read(
            &self,
            _fs_data: Option<&fs::FsData>,
            inode: &InodeInfo,
            offset: u64,
            buf: &mut [u8],
        ) -> fs::Result<usize> {
            const CONTENTS: &[u8] = b"hello, world!";
            if inode.ino != 2 {
                return Err(fs::Error::NotFound);
            }
            let offset = offset as usize;
            if offset >= CONTENTS.len() {
                return Ok(0);
            }
            let n = buf.len().min(CONTENTS.len() - offset);
            buf[..n].copy_from_slice(&CONTENTS[offset..offset + n]);
            Ok(n)
        }
    }

    struct NullBlockDevice;
    impl BlockDevice for NullBlockDevice {
        fn minor(&self) -> u8 {
            0
        }
        fn logical_block_size(&self) -> usize {
            512
        }
        fn read(&self, _lba: u64, _buf: &mut [u8]) -> core::result::Result<(), crate::blockio::Error> {
            Ok(())
        }
        fn write(&self, _lba: u64, _buf: &[u8]) -> core::result::Result<(), crate::blockio::Error> {
            Err(crate::blockio::Error::ReadOnly)
        }
    }

    fn mount_tiny_root() -> Vfs<2, 4, 4> {
        let vfs: Vfs<2, 4, 4> = Vfs::new();
        vfs.register_fs(Arc::new(TinyFs)).unwrap();
        let bdev = NullBlockDevice;
        let cache = crate::blockio::MockPageCache::new();
        vfs.mount_root("tiny", &bdev, &cache).unwrap();
        vfs
    }

    #[test]
    fn resolve_absolute_path_through_lookup() {
        let vfs = mount_tiny_root();
        let info = vfs.resolve(None, "/hello").unwrap();
        assert_eq!(info.ino, 2);
    }

    #[test]
    fn relative_path_requires_a_base() {
        let vfs = mount_tiny_root();
        assert_eq!(vfs.resolve(None, "hello"), Err(Error::BadBase));
    }

    #[test]
    fn open_read_close_round_trip() {
        let vfs = mount_tiny_root();
        let mut file = vfs.open(None, "/hello").unwrap();
        let mut buf = [0u8; 32];
        let n = vfs.read(&mut file, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello, world!");
        assert_eq!(file.offset, 13);
        vfs.close(file);
    }

    #[test]
    fn seek_end_then_read_reads_nothing() {
        let vfs = mount_tiny_root();
        let mut file = vfs.open(None, "/hello").unwrap();
        vfs.seek(&mut file, Whence::End, 0);
        let mut buf = [0u8; 8];
        assert_eq!(vfs.read(&mut file, &mut buf).unwrap(), 0);
    }

    #[test]
    fn missing_entry_is_not_found() {
        let vfs = mount_tiny_root();
        assert_eq!(
            vfs.resolve(None, "/nope"),
            Err(Error::Fs(fs::Error::NotFound))
        );
    }

    #[test]
    fn split_parent_handles_root_and_nested() {
        assert_eq!(split_parent("/a"), ("/", "a"));
        assert_eq!(split_parent("/a/b"), ("/a", "b"));
        assert_eq!(split_parent("a"), ("", "a"));
    }
}
