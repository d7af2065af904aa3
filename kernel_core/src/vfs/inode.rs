//! In-memory inode representation and the VFS inode cache with LRU eviction
//! (`spec.md` §3 Inode, §4.9 "Inode cache").
//!
//! Grounded on `vfs.h`'s `struct vfs_inode_s` and `vfs_icache.c`'s fixed-size
//! cache keyed by `(mount-id, inode number)`. The LRU order is kept as an
//! index-linked circular list over a fixed arena (`spec.md` §9's design
//! note), not an intrusive pointer list.

use crate::errno::Errno;
use crate::vfs::fs::InodeInfo;
use crate::vfs::mount::MountId;

/// An inode number, unique within its superblock.
pub type InodeNumber = u64;

/// File type bits, mirroring `vfs_stat.h`'s `S_IFREG`/`S_IFDIR` layout
/// (`spec.md` §9 supplemented detail: the distilled spec names "mode
/// (type+permissions)" without defining the encoding).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum FileType {
    /// A regular file.
    Regular = 0o100_000,
    /// A directory.
    Directory = 0o040_000,
}

/// An inode's type and permission bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mode(u16);

impl Mode {
    /// Construct a mode from a file type and a `rwx`-style permission mask
    /// (the low 9 bits).
    #[must_use]
    pub const fn new(ty: FileType, perm: u16) -> Self {
        Mode((ty as u16) | (perm & 0o777))
    }

    /// The file type encoded in this mode.
    #[must_use]
    pub fn file_type(self) -> FileType {
        if self.0 & 0o170_000 == FileType::Directory as u16 {
            FileType::Directory
        } else {
            FileType::Regular
        }
    }

    /// Whether this mode names a directory.
    #[must_use]
    pub fn is_dir(self) -> bool {
        self.file_type() == FileType::Directory
    }

    /// The raw encoded value.
    #[must_use]
    pub fn bits(self) -> u16 {
        self.0
    }
}

/// Flags kept on a cached inode (`spec.md` §3 "flags (dirty/pinned/deleted/
/// locked)").
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InodeFlags {
    /// Metadata differs from what `evict` would write back (this read-only
    /// core never sets it, kept for interface completeness).
    pub dirty: bool,
    /// Pinned against LRU eviction regardless of refcount.
    pub pinned: bool,
    /// Marked for removal once the last reference drops.
    pub deleted: bool,
    /// Exclusive access in progress (e.g. during a multi-step `lookup`).
    pub locked: bool,
}

/// One resident inode cache entry: [`InodeInfo`] plus cache bookkeeping.
#[derive(Debug, Clone, Copy)]
pub struct CachedInode {
    /// The filesystem-agnostic inode description.
    pub info: InodeInfo,
    /// Live reference count. `spec.md` invariant: `refcount == 0 ⇔` the
    /// slot is linked into the LRU list.
    pub refcount: u32,
    /// Flags named in `spec.md` §3.
    pub flags: InodeFlags,
}

#[derive(Clone, Copy)]
struct Slot {
    inode: Option<CachedInode>,
    /// Index of the previous entry in the circular LRU list (only
    /// meaningful while `refcount == 0`).
    lru_prev: usize,
    /// Index of the next entry in the circular LRU list.
    lru_next: usize,
}

/// Errors from inode cache operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, snafu::Snafu)]
pub enum Error {
    /// The cache is full and has no LRU victim to evict (every slot is
    /// pinned or referenced) — `spec.md` §7 names this fatal.
    NoVictim,
    /// No resident inode matches the requested key.
    NotFound,
}

impl Error {
    /// The syscall-visible errno for this condition.
    #[must_use]
    pub fn errno(self) -> Errno {
        match self {
            Error::NoVictim => Errno::NoMem,
            Error::NotFound => Errno::NoEnt,
        }
    }
}

/// Result type for inode cache operations.
pub type Result<T> = core::result::Result<T, Error>;

/// A victim chosen for eviction: its cache key and the private state the
/// caller must hand to the owning filesystem's `evict` before reuse.
#[derive(Debug, Clone, Copy)]
pub struct Evicted {
    /// The evicted inode's description, for the filesystem's `evict` hook.
    pub info: InodeInfo,
}

/// The VFS inode cache: a fixed arena of [`CachedInode`]s keyed by
/// `(mount, ino)`, with free (refcount-0) entries kept on a circular LRU
/// list in eviction order (`spec.md` §4.9).
pub struct InodeCache<const MAX_INODES: usize> {
    slots: [Slot; MAX_INODES],
    /// Index of the least-recently-released entry (the next eviction
    /// victim), or `MAX_INODES` if the LRU list is empty.
    lru_head: usize,
    len: usize,
}

const EMPTY_SLOT: Slot = Slot {
    inode: None,
    lru_prev: 0,
    lru_next: 0,
};

impl<const MAX_INODES: usize> InodeCache<MAX_INODES> {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: [EMPTY_SLOT; MAX_INODES],
            lru_head: MAX_INODES,
            len: 0,
        }
    }

    fn find_index(&self, mount: MountId, ino: InodeNumber) -> Option<usize> {
        self.slots.iter().position(|s| {
            s.inode
                .is_some_and(|c| c.info.mount == mount && c.info.ino == ino)
        })
    }

    fn unlink_lru(&mut self, idx: usize) {
        let (prev, next) = (self.slots[idx].lru_prev, self.slots[idx].lru_next);
        if next == idx {
            // Sole entry.
            self.lru_head = MAX_INODES;
        } else {
            self.slots[prev].lru_next = next;
            self.slots[next].lru_prev = prev;
            if self.lru_head == idx {
                self.lru_head = next;
            }
        }
    }

    fn link_lru_tail(&mut self, idx: usize) {
        if self.lru_head == MAX_INODES {
            self.lru_head = idx;
            self.slots[idx].lru_prev = idx;
            self.slots[idx].lru_next = idx;
        } else {
            let head = self.lru_head;
            let tail = self.slots[head].lru_prev;
            self.slots[tail].lru_next = idx;
            self.slots[idx].lru_prev = tail;
            self.slots[idx].lru_next = head;
            self.slots[head].lru_prev = idx;
        }
    }

    /// Looks up `(mount, ino)`, incrementing its refcount and detaching it
    /// from the LRU list if this is the first live reference (`spec.md`
    /// §4.9's `get`). Returns `None` if not resident.
    pub fn get(&mut self, mount: MountId, ino: InodeNumber) -> Option<CachedInode> {
        let idx = self.find_index(mount, ino)?;
        if self.slots[idx].inode.unwrap().refcount == 0 {
            self.unlink_lru(idx);
        }
        let inode = self.slots[idx].inode.as_mut().unwrap();
        inode.refcount += 1;
        Some(*inode)
    }

    /// Inserts a freshly looked-up inode, evicting the LRU victim if the
    /// cache is full. The new entry starts with `refcount == 1` (`spec.md`
    /// §3: "Creating an inode initializes refcount to 1 for its cache
    /// membership").
    ///
    /// # Errors
    /// [`Error::NoVictim`] if the cache is full and nothing is evictable
    /// (every slot pinned or referenced) — `spec.md` §7 treats this as
    /// fatal; callers should `panic!` on this variant rather than surface it
    /// to a syscall.
    pub fn insert(&mut self, info: InodeInfo) -> Result<(usize, Option<Evicted>)> {
        let free_idx = self.slots.iter().position(|s| s.inode.is_none());
        let (idx, evicted) = if let Some(idx) = free_idx {
            (idx, None)
        } else {
            let victim = self.lru_head;
            if victim == MAX_INODES {
                return Err(Error::NoVictim);
            }
            let victim_info = self.slots[victim].inode.unwrap().info;
            self.unlink_lru(victim);
            self.slots[victim].inode = None;
            (victim, Some(Evicted { info: victim_info }))
        };

        self.slots[idx].inode = Some(CachedInode {
            info,
            refcount: 1,
            flags: InodeFlags::default(),
        });
        self.len += if evicted.is_some() { 0 } else { 1 };
        Ok((idx, evicted))
    }

    /// Releases a reference (`spec.md` §4.9's `release`): decrements
    /// refcount, reattaching the entry to the LRU tail once it hits zero.
    ///
    /// # Panics
    /// If the refcount is already zero — `spec.md` §4.9: "`refcount == 0`
    /// on release while already zero is fatal".
    pub fn release(&mut self, mount: MountId, ino: InodeNumber) {
        let idx = self
            .find_index(mount, ino)
            .expect("release of an inode not in the cache");
        let inode = self.slots[idx].inode.as_mut().unwrap();
        assert!(inode.refcount > 0, "inode refcount underflow on release");
        inode.refcount -= 1;
        if inode.refcount == 0 {
            self.link_lru_tail(idx);
        }
    }

    /// A read-only snapshot of the cached inode at `(mount, ino)`, without
    /// touching its refcount or LRU position.
    #[must_use]
    pub fn peek(&self, mount: MountId, ino: InodeNumber) -> Option<CachedInode> {
        let idx = self.find_index(mount, ino)?;
        self.slots[idx].inode
    }

    /// Whether any inode from `mount` is still resident, referenced or not
    /// (an unmount must not proceed while one exists, `spec.md` §4.9).
    #[must_use]
    pub fn has_inode_in_mount(&self, mount: MountId) -> bool {
        self.slots
            .iter()
            .any(|s| s.inode.is_some_and(|c| c.info.mount == mount))
    }

    /// Number of resident inodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the cache holds no inodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<const MAX_INODES: usize> Default for InodeCache<MAX_INODES> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;
    use crate::vfs::inode::{FileType, Mode};

    fn info(mount: MountId, ino: InodeNumber) -> InodeInfo {
        InodeInfo {
            mount,
            ino,
            size: 0,
            mode: Mode::new(FileType::Regular, 0o644),
        }
    }

    #[test]
    fn insert_then_get_round_trips_and_refcounts() {
        let mut cache: InodeCache<4> = InodeCache::new();
        let (idx, evicted) = cache.insert(info(0, 3)).unwrap();
        assert!(evicted.is_none());
        let _ = idx;
        let c = cache.get(0, 3).unwrap();
        assert_eq!(c.refcount, 2);
        cache.release(0, 3);
        cache.release(0, 3);
        let peek = cache.peek(0, 3).unwrap();
        assert_eq!(peek.refcount, 0);
    }

    #[test]
    #[should_panic(expected = "underflow")]
    fn double_release_is_fatal() {
        let mut cache: InodeCache<4> = InodeCache::new();
        cache.insert(info(0, 1)).unwrap();
        cache.release(0, 1);
        cache.release(0, 1);
    }

    #[test]
    fn lru_evicts_first_released_when_full() {
        let mut cache: InodeCache<2> = InodeCache::new();
        cache.insert(info(0, 1)).unwrap();
        cache.insert(info(0, 2)).unwrap();
        cache.release(0, 1);
        cache.release(0, 2);
        // 1 released before 2, so 1 is the LRU victim.
        let (_, evicted) = cache.insert(info(0, 3)).unwrap();
        assert_eq!(evicted.unwrap().info.ino, 1);
        assert!(cache.peek(0, 1).is_none());
        assert!(cache.peek(0, 2).is_some());
    }

    #[test]
    fn full_cache_with_no_victim_is_an_error() {
        let mut cache: InodeCache<1> = InodeCache::new();
        cache.insert(info(0, 1)).unwrap(); // refcount 1, not evictable
        assert_eq!(cache.insert(info(0, 2)), Err(Error::NoVictim));
    }

    #[test]
    fn mode_encodes_file_type() {
        let dir = Mode::new(FileType::Directory, 0o755);
        assert!(dir.is_dir());
        let reg = Mode::new(FileType::Regular, 0o644);
        assert!(!reg.is_dir());
    }
}
