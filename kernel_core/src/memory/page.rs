//! Page allocator (C1): hands out 4 KiB physical pages from a contiguous
//! kernel-managed range and tracks one descriptor per page.
//!
//! Grounded on `kmemkernel.c`'s `Page[]` array and `PAGEINDEX` accessor
//! macros: each page is either free, carved into a slab of fixed-size
//! objects, or pinned into the block-device page cache. The allocator keeps
//! a single free list of whole pages (index 0 of the slab size classes in
//! `spec.md` terms) behind one spinlock, per the "single lock protecting a
//! statically initialized structure" design note.

use spin::Mutex;

use crate::config::PAGE_SIZE;

/// An index into the page descriptor table. Cheap to copy, used instead of
/// raw pointers throughout the allocator and its clients (the slab
/// allocator, the block I/O cache).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PageIndex(u32);

impl PageIndex {
    fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// What a page is currently being used for.
///
/// A page descriptor holds exactly one of these at a time; switching roles
/// (e.g. a block-cache page being evicted and reused as a slab page) always
/// goes through [`PageAllocator::page_free`] and a fresh [`PageAllocator::page_alloc`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageRole {
    /// On the free list, not owned by anyone.
    Free,
    /// Carved into fixed-size objects by the slab allocator.
    Slab {
        /// Object size for this page, in cache lines. `0` means the whole
        /// page is one allocation (routed directly through C1).
        lines: u16,
        /// Number of objects from this page currently in use.
        nbused: u16,
    },
    /// Backing a block device's logical block in the page cache.
    BlockCache {
        /// Contents differ from the on-device copy and must be flushed
        /// before eviction.
        dirty: bool,
        /// Pinned against eviction (used for filesystem metadata pages).
        locked: bool,
        /// Contents have been filled in from the device.
        valid: bool,
        /// Owning block device's minor number.
        bdev: u8,
        /// Number of live references (via `blockio_get`/`blockio_release`).
        refcount: u8,
        /// Logical block address this page caches.
        lba: u64,
    },
}

impl Default for PageRole {
    fn default() -> Self {
        PageRole::Free
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Descriptor {
    role: PageRole,
    next_free: Option<PageIndex>,
}

struct Inner<const MAX_PAGES: usize> {
    descriptors: [Descriptor; MAX_PAGES],
    free_head: Option<PageIndex>,
    num_pages: usize,
}

/// Allocates and describes whole physical pages from a fixed-capacity,
/// compile-time-bounded range.
///
/// `MAX_PAGES` bounds the descriptor table; [`PageAllocator::new`] is told
/// the actual number of pages backing the managed range (computed at boot
/// from the linker symbols for kernel-data-end and top-of-managed-memory),
/// which may be smaller.
pub struct PageAllocator<const MAX_PAGES: usize> {
    inner: Mutex<Inner<MAX_PAGES>>,
    base: *mut u8,
}

unsafe impl<const MAX_PAGES: usize> Send for PageAllocator<MAX_PAGES> {}
unsafe impl<const MAX_PAGES: usize> Sync for PageAllocator<MAX_PAGES> {}

/// Errors that can result from page allocator operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, snafu::Snafu)]
pub enum Error {
    /// No whole pages remain on the free list.
    OutOfMemory,
    /// The pointer or index does not name a page managed by this allocator.
    UnknownPage,
}

/// Result type for page allocator operations.
pub type Result<T> = core::result::Result<T, Error>;

impl<const MAX_PAGES: usize> PageAllocator<MAX_PAGES> {
    /// Creates an allocator managing `num_pages` pages starting at `base`,
    /// which must be page aligned. All pages start on the free list.
    ///
    /// # Safety
    /// `base` must point to `num_pages * PAGE_SIZE` bytes of memory that are
    /// valid to read and write for the lifetime of the allocator and not
    /// used by anything else.
    pub unsafe fn new(base: *mut u8, num_pages: usize) -> Self {
        assert!(num_pages <= MAX_PAGES);
        assert!(base.is_aligned_to(PAGE_SIZE));

        let mut descriptors = [Descriptor::default(); MAX_PAGES];
        let mut free_head = None;
        // Link pages in descending order so that index 0 ends up at the
        // head; irrelevant for correctness but keeps the free list in
        // address order, which is pleasant when debugging a dump.
        for i in (0..num_pages).rev() {
            descriptors[i].next_free = free_head;
            free_head = Some(PageIndex(i as u32));
        }

        Self {
            inner: Mutex::new(Inner {
                descriptors,
                free_head,
                num_pages,
            }),
            base,
        }
    }

    /// The size in bytes of one page.
    #[must_use]
    pub fn page_size(&self) -> usize {
        PAGE_SIZE
    }

    /// Number of pages under management.
    #[must_use]
    pub fn num_pages(&self) -> usize {
        self.inner.lock().num_pages
    }

    /// The base address of a page, given its index.
    #[must_use]
    pub fn page_addr(&self, idx: PageIndex) -> *mut u8 {
        unsafe { self.base.add(idx.as_usize() * PAGE_SIZE) }
    }

    /// The index of the page containing `addr`, if it lies within the
    /// managed range.
    #[must_use]
    pub fn index_of(&self, addr: *const u8) -> Option<PageIndex> {
        let inner = self.inner.lock();
        let offset = (addr as usize).checked_sub(self.base as usize)?;
        let idx = offset / PAGE_SIZE;
        if idx < inner.num_pages {
            Some(PageIndex(idx as u32))
        } else {
            None
        }
    }

    /// Removes and returns the head of the free list, leaving its role
    /// [`PageRole::Free`] for the caller to overwrite.
    ///
    /// # Errors
    /// [`Error::OutOfMemory`] if no whole page is free.
    pub fn page_alloc(&self) -> Result<PageIndex> {
        let mut inner = self.inner.lock();
        let idx = inner.free_head.ok_or(Error::OutOfMemory)?;
        let next = inner.descriptors[idx.as_usize()].next_free;
        inner.free_head = next;
        inner.descriptors[idx.as_usize()] = Descriptor {
            role: PageRole::Free,
            next_free: None,
        };
        Ok(idx)
    }

    /// Returns a page to the free list, regardless of its previous role.
    pub fn page_free(&self, idx: PageIndex) {
        let mut inner = self.inner.lock();
        assert!(idx.as_usize() < inner.num_pages, "freeing unknown page");
        inner.descriptors[idx.as_usize()] = Descriptor {
            role: PageRole::Free,
            next_free: inner.free_head,
        };
        inner.free_head = Some(idx);
    }

    /// Iterates the indices of every page under management, ascending.
    ///
    /// Used by the block I/O cache (C8) to scan for a page already caching a
    /// given device/LBA, since the page descriptor is the sole place that
    /// mapping is recorded (`spec.md` §3).
    pub fn iter_indices(&self) -> impl Iterator<Item = PageIndex> + '_ {
        (0..self.num_pages()).map(|i| PageIndex(i as u32))
    }

    /// Reads the current role of a page.
    #[must_use]
    pub fn role(&self, idx: PageIndex) -> PageRole {
        self.inner.lock().descriptors[idx.as_usize()].role
    }

    /// Installs a new role for a page. Used by the slab allocator to tag a
    /// freshly carved page and by the block I/O layer to install a cache
    /// entry.
    pub fn set_role(&self, idx: PageIndex, role: PageRole) {
        self.inner.lock().descriptors[idx.as_usize()].role = role;
    }

    /// Applies `f` to the block-cache fields of `idx`'s descriptor.
    ///
    /// # Panics
    /// If the page is not currently in [`PageRole::BlockCache`] role.
    fn with_block_cache<R>(&self, idx: PageIndex, f: impl FnOnce(&mut PageRole) -> R) -> R {
        let mut inner = self.inner.lock();
        let role = &mut inner.descriptors[idx.as_usize()].role;
        assert!(
            matches!(role, PageRole::BlockCache { .. }),
            "page {idx:?} is not a block-cache page"
        );
        f(role)
    }

    /// Sets the `valid` bit of a block-cache page.
    pub fn set_valid(&self, idx: PageIndex) {
        self.with_block_cache(idx, |r| {
            if let PageRole::BlockCache { valid, .. } = r {
                *valid = true;
            }
        });
    }

    /// Clears the `valid` bit of a block-cache page.
    pub fn clear_valid(&self, idx: PageIndex) {
        self.with_block_cache(idx, |r| {
            if let PageRole::BlockCache { valid, .. } = r {
                *valid = false;
            }
        });
    }

    /// Whether the `valid` bit is set on a block-cache page.
    #[must_use]
    pub fn is_valid(&self, idx: PageIndex) -> bool {
        self.with_block_cache(idx, |r| matches!(r, PageRole::BlockCache { valid: true, .. }))
    }

    /// Sets the `locked` (eviction-pinned) bit of a block-cache page.
    pub fn set_locked(&self, idx: PageIndex) {
        self.with_block_cache(idx, |r| {
            if let PageRole::BlockCache { locked, .. } = r {
                *locked = true;
            }
        });
    }

    /// Clears the `locked` bit of a block-cache page.
    pub fn clear_locked(&self, idx: PageIndex) {
        self.with_block_cache(idx, |r| {
            if let PageRole::BlockCache { locked, .. } = r {
                *locked = false;
            }
        });
    }

    /// Whether the `locked` bit is set on a block-cache page.
    #[must_use]
    pub fn is_locked(&self, idx: PageIndex) -> bool {
        self.with_block_cache(idx, |r| matches!(r, PageRole::BlockCache { locked: true, .. }))
    }

    /// Sets the `dirty` bit of a block-cache page.
    pub fn set_dirty(&self, idx: PageIndex) {
        self.with_block_cache(idx, |r| {
            if let PageRole::BlockCache { dirty, .. } = r {
                *dirty = true;
            }
        });
    }

    /// Clears the `dirty` bit of a block-cache page.
    pub fn clear_dirty(&self, idx: PageIndex) {
        self.with_block_cache(idx, |r| {
            if let PageRole::BlockCache { dirty, .. } = r {
                *dirty = false;
            }
        });
    }

    /// Whether the `dirty` bit is set on a block-cache page.
    #[must_use]
    pub fn is_dirty(&self, idx: PageIndex) -> bool {
        self.with_block_cache(idx, |r| matches!(r, PageRole::BlockCache { dirty: true, .. }))
    }

    /// Increments a block-cache page's refcount.
    ///
    /// # Panics
    /// If the refcount is already saturated at 255 — `spec.md` names this a
    /// fatal overflow rather than a recoverable error.
    pub fn inc_refcount(&self, idx: PageIndex) {
        self.with_block_cache(idx, |r| {
            if let PageRole::BlockCache { refcount, .. } = r {
                *refcount = refcount
                    .checked_add(1)
                    .expect("page refcount overflowed 255");
            }
        });
    }

    /// Decrements a block-cache page's refcount.
    ///
    /// # Panics
    /// If the refcount is already zero.
    pub fn dec_refcount(&self, idx: PageIndex) {
        self.with_block_cache(idx, |r| {
            if let PageRole::BlockCache { refcount, .. } = r {
                *refcount = refcount
                    .checked_sub(1)
                    .expect("page refcount underflowed below 0");
            }
        });
    }

    /// Reads a block-cache page's current refcount.
    #[must_use]
    pub fn refcount(&self, idx: PageIndex) -> u8 {
        self.with_block_cache(idx, |r| match r {
            PageRole::BlockCache { refcount, .. } => *refcount,
            _ => unreachable!(),
        })
    }

    /// Tags a block-cache page with the device and LBA it caches.
    pub fn set_lba(&self, idx: PageIndex, bdev: u8, lba: u64) {
        self.with_block_cache(idx, |r| {
            if let PageRole::BlockCache {
                bdev: b, lba: l, ..
            } = r
            {
                *b = bdev;
                *l = lba;
            }
        });
    }

    /// Reads the device and LBA a block-cache page caches.
    #[must_use]
    pub fn get_lba(&self, idx: PageIndex) -> (u8, u64) {
        self.with_block_cache(idx, |r| match r {
            PageRole::BlockCache { bdev, lba, .. } => (*bdev, *lba),
            _ => unreachable!(),
        })
    }
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;
    use std::alloc::Layout;

    /// Allocates a backing region with `std`'s allocator and leaks it for
    /// the duration of the test process; the custom page-alignment this
    /// allocator requires doesn't round-trip through `Vec`/`Box`'s `Drop`.
    fn new_allocator(num_pages: usize) -> PageAllocator<64> {
        let layout = Layout::from_size_align(num_pages * PAGE_SIZE, PAGE_SIZE).unwrap();
        let mem = unsafe { std::alloc::alloc_zeroed(layout) };
        assert!(!mem.is_null());
        unsafe { PageAllocator::<64>::new(mem, num_pages) }
    }

    #[test]
    fn alloc_then_free_returns_to_free_list() {
        let pa = new_allocator(4);
        let idx = pa.page_alloc().unwrap();
        assert_eq!(pa.role(idx), PageRole::Free);
        pa.page_free(idx);
        let idx2 = pa.page_alloc().unwrap();
        assert_eq!(idx, idx2);
    }

    #[test]
    fn exhausting_free_list_is_out_of_memory() {
        let pa = new_allocator(2);
        let _a = pa.page_alloc().unwrap();
        let _b = pa.page_alloc().unwrap();
        assert_eq!(pa.page_alloc(), Err(Error::OutOfMemory));
    }

    #[test]
    fn page_addr_and_index_of_round_trip() {
        let pa = new_allocator(4);
        let idx = pa.page_alloc().unwrap();
        let addr = pa.page_addr(idx);
        assert_eq!(pa.index_of(addr), Some(idx));
    }

    #[test]
    fn block_cache_accessors() {
        let pa = new_allocator(4);
        let idx = pa.page_alloc().unwrap();
        pa.set_role(
            idx,
            PageRole::BlockCache {
                dirty: false,
                locked: false,
                valid: false,
                bdev: 0,
                refcount: 0,
                lba: 0,
            },
        );
        pa.set_lba(idx, 2, 42);
        assert_eq!(pa.get_lba(idx), (2, 42));
        pa.set_valid(idx);
        assert!(pa.is_valid(idx));
        pa.inc_refcount(idx);
        pa.inc_refcount(idx);
        assert_eq!(pa.refcount(idx), 2);
        pa.dec_refcount(idx);
        assert_eq!(pa.refcount(idx), 1);
        pa.set_locked(idx);
        assert!(pa.is_locked(idx));
        pa.set_dirty(idx);
        assert!(pa.is_dirty(idx));
        pa.clear_dirty(idx);
        assert!(!pa.is_dirty(idx));
    }

    #[test]
    #[should_panic(expected = "refcount overflowed")]
    fn refcount_overflow_is_fatal() {
        let pa = new_allocator(4);
        let idx = pa.page_alloc().unwrap();
        pa.set_role(
            idx,
            PageRole::BlockCache {
                dirty: false,
                locked: false,
                valid: false,
                bdev: 0,
                refcount: 255,
                lba: 0,
            },
        );
        pa.inc_refcount(idx);
    }
}
