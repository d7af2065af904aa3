//! The mount table (`spec.md` §3 Mount, §4.9 "mount"/"unmount").
//!
//! Grounded on `vfs.h`'s `struct vfs_mount_s` and the fixed `fs_mount_table`
//! array in `vfs.c`: a small, statically sized table of active mounts rather
//! than a dynamically allocated list.

use alloc::string::String;
use alloc::sync::Arc;

use crate::errno::Errno;
use crate::vfs::fs::{FsData, FsOps, InodeInfo};

/// Identifies one active mount. Indexes into a [`MountTable`]; `0` is always
/// the root mount (`spec.md` §4.9: "the root mount never unmounts").
pub type MountId = u32;

/// One entry in the mount table.
#[derive(Clone)]
pub struct MountEntry {
    /// The filesystem type implementing this mount.
    pub fs: FsOps,
    /// The mounted filesystem's root inode.
    pub root: InodeInfo,
    /// Opaque filesystem-private state retained across calls.
    pub fs_data: Option<Arc<FsData>>,
    /// The inode this mount is attached over (`None` for the root mount,
    /// which is not mounted over anything).
    pub mounted_on: Option<InodeInfo>,
    /// The absolute path this filesystem is mounted at (`spec.md` §3 "Mount
    /// entry: {mount path string, ...}"), matched against by
    /// [`MountTable::resolve_mount`]. Always `"/"` for the root mount.
    pub path: String,
}

/// Errors from mount table operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, snafu::Snafu)]
pub enum Error {
    /// The mount table has no free slot.
    Full,
    /// No mount matches the requested id.
    NotFound,
    /// The root mount (id 0) cannot be unmounted.
    RootMount,
    /// The mount still has inodes referenced from the cache.
    Busy,
}

impl Error {
    /// The syscall-visible errno for this condition.
    #[must_use]
    pub fn errno(self) -> Errno {
        match self {
            Error::Full => Errno::NoMem,
            Error::NotFound => Errno::NoEnt,
            Error::RootMount => Errno::Perm,
            Error::Busy => Errno::Busy,
        }
    }
}

/// Result type for mount table operations.
pub type Result<T> = core::result::Result<T, Error>;

/// The fixed-size table of active mounts (`spec.md` §4.9).
///
/// `MAX_MOUNTS` bounds how many filesystems can be mounted simultaneously;
/// slot `0` is reserved for the root mount and is populated by
/// [`MountTable::mount_root`] before any other mount is attempted.
pub struct MountTable<const MAX_MOUNTS: usize> {
    slots: [Option<MountEntry>; MAX_MOUNTS],
}

const NONE_ENTRY: Option<MountEntry> = None;

impl<const MAX_MOUNTS: usize> MountTable<MAX_MOUNTS> {
    /// Creates an empty mount table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: [NONE_ENTRY; MAX_MOUNTS],
        }
    }

    /// Installs the root mount at id 0 (`spec.md` §4.11's boot sequence:
    /// "mount the root filesystem before starting init").
    ///
    /// # Panics
    /// If the root mount is already populated.
    pub fn mount_root(&mut self, fs: FsOps, root: InodeInfo, fs_data: Option<Arc<FsData>>) {
        assert!(self.slots[0].is_none(), "root filesystem already mounted");
        self.slots[0] = Some(MountEntry {
            fs,
            root,
            fs_data,
            mounted_on: None,
            path: String::from("/"),
        });
    }

    /// The slot a subsequent [`MountTable::mount`] would use, without
    /// reserving it. Lets a caller learn the [`MountId`] a filesystem's
    /// `mount` hook will be stamped with before that hook runs, while the
    /// VFS-wide lock held across both calls rules out another mount racing
    /// for the same slot.
    #[must_use]
    pub fn next_free_slot(&self) -> Option<MountId> {
        self.slots[1..]
            .iter()
            .position(Option::is_none)
            .map(|i| (i + 1) as MountId)
    }

    /// Mounts a filesystem over `mounted_on`, registering it under `path`
    /// for later [`MountTable::resolve_mount`] lookups, and returning its
    /// new [`MountId`].
    ///
    /// # Errors
    /// [`Error::Full`] if every non-root slot is occupied.
    pub fn mount(
        &mut self,
        fs: FsOps,
        root: InodeInfo,
        fs_data: Option<Arc<FsData>>,
        mounted_on: InodeInfo,
        path: &str,
    ) -> Result<MountId> {
        let idx = self.slots[1..]
            .iter()
            .position(Option::is_none)
            .map(|i| i + 1)
            .ok_or(Error::Full)?;
        self.slots[idx] = Some(MountEntry {
            fs,
            root,
            fs_data,
            mounted_on: Some(mounted_on),
            path: String::from(path),
        });
        Ok(idx as MountId)
    }

    /// Removes the mount at `id`.
    ///
    /// # Errors
    /// [`Error::RootMount`] for `id == 0`; [`Error::NotFound`] if no mount
    /// occupies `id`.
    pub fn unmount(&mut self, id: MountId) -> Result<MountEntry> {
        if id == 0 {
            return Err(Error::RootMount);
        }
        let slot = self
            .slots
            .get_mut(id as usize)
            .ok_or(Error::NotFound)?;
        slot.take().ok_or(Error::NotFound)
    }

    /// Looks up the mount at `id`.
    #[must_use]
    pub fn get(&self, id: MountId) -> Option<&MountEntry> {
        self.slots.get(id as usize)?.as_ref()
    }

    /// Finds the mount (other than the root) attached over `inode`, if any
    /// — used when path resolution crosses a mount point (`spec.md` §4.9
    /// `lookup`: "if the looked-up inode is itself a mount point, resolve
    /// through to the mounted filesystem's root").
    #[must_use]
    pub fn mounted_over(&self, inode: &InodeInfo) -> Option<MountId> {
        self.slots.iter().enumerate().find_map(|(idx, e)| {
            let e = e.as_ref()?;
            let over = e.mounted_on.as_ref()?;
            (over.mount == inode.mount && over.ino == inode.ino).then_some(idx as MountId)
        })
    }

    /// Finds the mount whose path is the longest prefix of `path` bounded
    /// by a `/` or the end of the string (`spec.md` §4.9 "Mount
    /// resolution"), grounded on `vfs.c`'s `vfs_mount_resolve`
    /// (`best_sb`/`best_len`, `strncmp(path, mnt, len) == 0`). `path` must
    /// be absolute.
    ///
    /// The root mount's path is always `"/"`, which is itself the
    /// separator every absolute path already starts with, so it is always
    /// a bounded match; other mounts only match when `path` continues past
    /// their registered path with another `/` or ends exactly there, which
    /// is what lets a deeper mount (e.g. `/mnt`) outrank the root for a
    /// path underneath it while leaving paths outside it to the root.
    #[must_use]
    pub fn resolve_mount(&self, path: &str) -> Option<MountId> {
        if !path.starts_with('/') {
            return None;
        }
        let mut best: Option<(MountId, usize)> = None;
        for (idx, slot) in self.slots.iter().enumerate() {
            let Some(entry) = slot else { continue };
            let mnt = entry.path.as_str();
            let len = mnt.len();
            let bounded =
                mnt == "/" || path.len() == len || path.as_bytes().get(len) == Some(&b'/');
            if !path.starts_with(mnt) || !bounded {
                continue;
            }
            if best.map_or(true, |(_, best_len)| len > best_len) {
                best = Some((idx as MountId, len));
            }
        }
        best.map(|(id, _)| id)
    }
}

impl<const MAX_MOUNTS: usize> Default for MountTable<MAX_MOUNTS> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;
    use crate::vfs::fs::{MountContext, MountOutcome};
    use crate::vfs::inode::{FileType, Mode};

    struct StubFs;
    impl crate::vfs::fs::FileSystemOps for StubFs {
        fn name(&self) -> &'static str {
            "stub"
        }
        fn mount(&self, _ctx: &MountContext<'_>, mount: MountId) -> crate::vfs::fs::Result<MountOutcome> {
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
            _fs_data: Option<&crate::vfs::fs::FsData>,
            _dir: &InodeInfo,
            _name: &str,
        ) -> crate::vfs::fs::Result<InodeInfo> {
            Err(crate::vfs::fs::Error::NotFound)
        }
        fn read(
            &self,
            _fs_data: Option<&crate::vfs::fs::FsData>,
            _inode: &InodeInfo,
            _offset: u64,
            _buf: &mut [u8],
        ) -> crate::vfs::fs::Result<usize> {
            Ok(0)
        }
    }
    fn root_info(mount: MountId) -> InodeInfo {
        InodeInfo {
            mount,
            ino: 1,
            size: 0,
            mode: Mode::new(FileType::Directory, 0o755),
        }
    }

    #[test]
    fn root_mount_occupies_slot_zero() {
        let mut table: MountTable<4> = MountTable::new();
        table.mount_root(Arc::new(StubFs), root_info(0), None);
        assert!(table.get(0).is_some());
    }

    #[test]
    fn unmounting_root_is_an_error() {
        let mut table: MountTable<4> = MountTable::new();
        table.mount_root(Arc::new(StubFs), root_info(0), None);
        assert_eq!(table.unmount(0), Err(Error::RootMount));
    }

    #[test]
    fn mount_table_full_is_an_error() {
        let mut table: MountTable<2> = MountTable::new();
        table.mount_root(Arc::new(StubFs), root_info(0), None);
        let mount_point = root_info(0);
        table
            .mount(Arc::new(StubFs), root_info(1), None, mount_point, "/mnt")
            .unwrap();
        let mount_point2 = root_info(0);
        assert_eq!(
            table.mount(Arc::new(StubFs), root_info(2), None, mount_point2, "/mnt2"),
            Err(Error::Full)
        );
    }

    #[test]
    fn mounted_over_finds_the_attach_point() {
        let mut table: MountTable<4> = MountTable::new();
        table.mount_root(Arc::new(StubFs), root_info(0), None);
        let attach = InodeInfo {
            mount: 0,
            ino: 7,
            size: 0,
            mode: Mode::new(FileType::Directory, 0o755),
        };
        let id = table
            .mount(Arc::new(StubFs), root_info(1), None, attach, "/mnt")
            .unwrap();
        assert_eq!(table.mounted_over(&attach), Some(id));
    }

    #[test]
    fn resolve_mount_picks_the_longest_bounded_prefix() {
        let mut table: MountTable<4> = MountTable::new();
        table.mount_root(Arc::new(StubFs), root_info(0), None);
        let attach = InodeInfo {
            mount: 0,
            ino: 7,
            size: 0,
            mode: Mode::new(FileType::Directory, 0o755),
        };
        let b = table
            .mount(Arc::new(StubFs), root_info(1), None, attach, "/mnt")
            .unwrap();
        assert_eq!(table.resolve_mount("/mnt/x"), Some(b));
        assert_eq!(table.resolve_mount("/mnt"), Some(b));
        assert_eq!(table.resolve_mount("/x"), Some(0));
        assert_eq!(table.resolve_mount("/"), Some(0));
        assert_eq!(table.resolve_mount("/mntx"), Some(0));
    }
}
