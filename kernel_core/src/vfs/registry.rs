//! The filesystem-type registry (`spec.md` §4.9 "Registry"): maps a
//! filesystem type's name to its [`FileSystemOps`] implementor, so `mount`
//! can be given a name (e.g. `"minfs"`) rather than a concrete type.
//!
//! Grounded on `vfs.c`'s `fs_type_register`/`fs_type_lookup`, backed here by
//! a fixed array instead of an intrusive list, matching the rest of this
//! kernel's index-handle idiom.

use crate::errno::Errno;
use crate::vfs::fs::FsOps;

/// Errors from registry operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, snafu::Snafu)]
pub enum Error {
    /// The registry has no free slot.
    Full,
    /// No filesystem type is registered under the requested name.
    NotFound,
    /// A filesystem type is already registered under this name.
    Exists,
}

impl Error {
    /// The syscall-visible errno for this condition.
    #[must_use]
    pub fn errno(self) -> Errno {
        match self {
            Error::Full => Errno::NoMem,
            Error::NotFound => Errno::NoEnt,
            Error::Exists => Errno::Exist,
        }
    }
}

/// Result type for registry operations.
pub type Result<T> = core::result::Result<T, Error>;

/// The fixed-size table of registered filesystem types.
pub struct FsRegistry<const MAX_TYPES: usize> {
    slots: [Option<FsOps>; MAX_TYPES],
}

const NONE_FS: Option<FsOps> = None;

impl<const MAX_TYPES: usize> FsRegistry<MAX_TYPES> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: [NONE_FS; MAX_TYPES],
        }
    }

    /// Registers `fs` under its own [`FileSystemOps::name`].
    ///
    /// # Errors
    /// [`Error::Exists`] if a type is already registered under that name;
    /// [`Error::Full`] if the registry has no free slot.
    pub fn register(&mut self, fs: FsOps) -> Result<()> {
        if self.lookup(fs.name()).is_some() {
            return Err(Error::Exists);
        }
        let idx = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(Error::Full)?;
        self.slots[idx] = Some(fs);
        Ok(())
    }

    /// Finds the filesystem type registered under `name`.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<FsOps> {
        self.slots
            .iter()
            .flatten()
            .find(|fs| fs.name() == name)
            .cloned()
    }
}

impl<const MAX_TYPES: usize> Default for FsRegistry<MAX_TYPES> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;
    use crate::vfs::fs::{FileSystemOps, InodeInfo, MountContext, MountOutcome};
    use crate::vfs::inode::{FileType, Mode};
    use crate::vfs::mount::MountId;
    use alloc::sync::Arc;

    struct NamedFs(&'static str);
    impl FileSystemOps for NamedFs {
        fn name(&self) -> &'static str {
            self.0
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

    #[test]
    fn register_then_lookup_by_name() {
        let mut reg: FsRegistry<4> = FsRegistry::new();
        reg.register(Arc::new(NamedFs("minfs"))).unwrap();
        assert!(reg.lookup("minfs").is_some());
        assert!(reg.lookup("other").is_none());
    }

    #[test]
    fn duplicate_name_is_an_error() {
        let mut reg: FsRegistry<4> = FsRegistry::new();
        reg.register(Arc::new(NamedFs("minfs"))).unwrap();
        assert_eq!(reg.register(Arc::new(NamedFs("minfs"))), Err(Error::Exists));
    }

    #[test]
    fn registry_full_is_an_error() {
        let mut reg: FsRegistry<1> = FsRegistry::new();
        reg.register(Arc::new(NamedFs("a"))).unwrap();
        assert_eq!(reg.register(Arc::new(NamedFs("b"))), Err(Error::Full));
    }
}
