//! Open file handles (`spec.md` §3 "File handle", §4.9 "Files").
//!
//! Grounded on `vfs.h`'s `struct vfs_file_s`: `{inode, offset, fs-private
//! cursor}`. The fs-private cursor (e.g. a directory's `readdir` position)
//! is folded into `offset` here, matching `spec.md`'s "`readdir` ...
//! incrementing the offset on success".

use crate::vfs::fs::InodeInfo;
use crate::vfs::mount::MountId;

/// The origin a [`crate::vfs::Vfs::seek`] offset is relative to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    /// Relative to the start of the file.
    Set,
    /// Relative to the current offset.
    Cur,
    /// Relative to the end of the file.
    End,
}

/// An open file (`spec.md` §4.9 `open`): the inode it names plus a cursor.
#[derive(Debug, Clone, Copy)]
pub struct FileHandle {
    /// The inode this handle was opened against.
    pub inode: InodeInfo,
    /// Current byte offset (or `readdir` cursor).
    pub offset: u64,
}

impl FileHandle {
    /// Creates a handle at offset 0, as `open` does.
    #[must_use]
    pub fn new(inode: InodeInfo) -> Self {
        Self { inode, offset: 0 }
    }

    /// The mount this handle's inode belongs to.
    #[must_use]
    pub fn mount(&self) -> MountId {
        self.inode.mount
    }

    /// Computes a new offset from `whence`/`delta`, per `spec.md`'s
    /// `seek`'s `SET`/`CUR`/`END`. Negative results saturate at zero.
    #[must_use]
    pub fn seek_target(&self, whence: Whence, delta: i64) -> u64 {
        let base = match whence {
            Whence::Set => 0,
            Whence::Cur => self.offset as i64,
            Whence::End => self.inode.size as i64,
        };
        base.saturating_add(delta).max(0) as u64
    }
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;
    use crate::vfs::inode::{FileType, Mode};

    fn handle(size: u64, offset: u64) -> FileHandle {
        FileHandle {
            inode: InodeInfo {
                mount: 0,
                ino: 1,
                size,
                mode: Mode::new(FileType::Regular, 0o644),
            },
            offset,
        }
    }

    #[test]
    fn seek_set_is_absolute() {
        assert_eq!(handle(100, 10).seek_target(Whence::Set, 42), 42);
    }

    #[test]
    fn seek_cur_is_relative_to_offset() {
        assert_eq!(handle(100, 10).seek_target(Whence::Cur, 5), 15);
    }

    #[test]
    fn seek_end_is_relative_to_size() {
        assert_eq!(handle(100, 10).seek_target(Whence::End, -10), 90);
    }

    #[test]
    fn negative_result_saturates_at_zero() {
        assert_eq!(handle(100, 10).seek_target(Whence::Set, -5), 0);
    }
}
