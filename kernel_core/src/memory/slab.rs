//! Slab allocator (C2): sub-page allocation in cache-line-multiple units,
//! carved out of pages drawn from [`super::page::PageAllocator`]. Doubles
//! as the crate's [`GlobalAlloc`].
//!
//! Grounded on `kmemkernel.c`'s `kmalloc`/`kfree`/`Slab[]` free-list-array
//! design: object size is rounded up to a whole number `k` of cache lines,
//! and one intrusive free list is kept per `k`. An empty list at `k` draws a
//! fresh page from C1, slices it into `⌊PageSize / (k×L)⌋` equal chunks, and
//! chains them; a page whose last live object is freed is unlinked from
//! list `k` in its entirety and returned to C1.

use core::alloc::{GlobalAlloc, Layout};
use core::ptr::NonNull;

use spin::Mutex;

use crate::config::{KernelConfig, PAGE_SIZE};
use crate::memory::page::{PageAllocator, PageRole};

#[repr(C)]
struct FreeNode {
    next: Option<NonNull<FreeNode>>,
}

struct Inner<const MAX_PAGES: usize, const MAX_CLASSES: usize> {
    free_lists: [Option<NonNull<FreeNode>>; MAX_CLASSES],
}

unsafe impl<const MAX_PAGES: usize, const MAX_CLASSES: usize> Send
    for Inner<MAX_PAGES, MAX_CLASSES>
{
}

/// A slab allocator providing `kmalloc`/`kcalloc`/`kfree`/`kstrdup` on top of
/// a page allocator, and usable directly as `#[global_allocator]`.
///
/// `MAX_CLASSES` bounds the number of cache-line size classes, i.e. the
/// number of objects that fit in one page at the minimum cache line size
/// (`PAGE_SIZE / MIN_CACHE_LINE_SIZE`).
pub struct SlabAllocator<'pa, const MAX_PAGES: usize, const MAX_CLASSES: usize = 256> {
    pages: &'pa PageAllocator<MAX_PAGES>,
    line_size: usize,
    inner: Mutex<Inner<MAX_PAGES, MAX_CLASSES>>,
}

impl<'pa, const MAX_PAGES: usize, const MAX_CLASSES: usize>
    SlabAllocator<'pa, MAX_PAGES, MAX_CLASSES>
{
    /// Creates a slab allocator drawing pages from `pages`, using the cache
    /// line size named by `config`.
    #[must_use]
    pub fn new(pages: &'pa PageAllocator<MAX_PAGES>, config: &KernelConfig) -> Self {
        assert!(config.max_line_slab() <= MAX_CLASSES);
        Self {
            pages,
            line_size: config.cache_line_size(),
            inner: Mutex::new(Inner {
                free_lists: [None; MAX_CLASSES],
            }),
        }
    }

    /// Size class index for a request of `n` bytes: `⌈n / line_size⌉`.
    ///
    /// # Panics
    /// If `n` is larger than one page — `spec.md` names this fatal.
    fn size_class(&self, n: usize) -> usize {
        assert!(n <= PAGE_SIZE, "kmalloc request {n} exceeds page size");
        n.div_ceil(self.line_size)
    }

    /// Draws a fresh page and slices it into free chunks of size class `k`,
    /// chaining them onto `inner.free_lists[k]`. Returns the page's base.
    fn refill(
        &self,
        inner: &mut Inner<MAX_PAGES, MAX_CLASSES>,
        k: usize,
    ) -> core::result::Result<(), ()> {
        let idx = self.pages.page_alloc().map_err(|_| ())?;
        self.pages.set_role(
            idx,
            PageRole::Slab {
                lines: k as u16,
                nbused: 0,
            },
        );
        let base = self.pages.page_addr(idx);
        let chunk_size = k * self.line_size;
        let num_chunks = PAGE_SIZE / chunk_size;

        for i in 0..num_chunks {
            unsafe {
                let chunk = base.add(i * chunk_size).cast::<FreeNode>();
                chunk.write(FreeNode {
                    next: inner.free_lists[k],
                });
                inner.free_lists[k] = NonNull::new(chunk);
            }
        }
        Ok(())
    }

    /// Allocates `n` zeroed bytes, aligned to the cache line size.
    ///
    /// # Panics
    /// If `n` exceeds one page, or if allocation otherwise fails — `kmalloc`
    /// has no graceful out-of-memory path in this design.
    #[must_use]
    pub fn kmalloc(&self, n: usize) -> *mut u8 {
        if n == 0 {
            return core::ptr::null_mut();
        }
        let k = self.size_class(n);

        if k * self.line_size == PAGE_SIZE {
            // Routes directly to a whole page (size class 0 in spec.md terms).
            let idx = self
                .pages
                .page_alloc()
                .expect("kmalloc(PAGE_SIZE) on exhausted page free list is fatal");
            self.pages.set_role(
                idx,
                PageRole::Slab {
                    lines: 0,
                    nbused: 1,
                },
            );
            let ptr = self.pages.page_addr(idx);
            unsafe { ptr.write_bytes(0, PAGE_SIZE) };
            return ptr;
        }

        let mut inner = self.inner.lock();
        if inner.free_lists[k].is_none() {
            self.refill(&mut inner, k)
                .expect("kmalloc: page allocator exhausted, fatal");
        }

        let node = inner.free_lists[k].expect("refill populated the free list");
        inner.free_lists[k] = unsafe { node.as_ref().next };

        let page_idx = self
            .pages
            .index_of(node.as_ptr().cast())
            .expect("slab object must belong to a managed page");
        if let PageRole::Slab { nbused, .. } = self.pages.role(page_idx) {
            self.pages.set_role(
                page_idx,
                PageRole::Slab {
                    lines: k as u16,
                    nbused: nbused + 1,
                },
            );
        }

        let ptr = node.as_ptr().cast::<u8>();
        unsafe { ptr.write_bytes(0, k * self.line_size) };
        ptr
    }

    /// Allocates `count * size` zeroed bytes, rejecting overflow.
    ///
    /// # Panics
    /// If `count * size` would overflow, or exceed one page (same fatal
    /// policy as `kmalloc`).
    #[must_use]
    pub fn kcalloc(&self, count: usize, size: usize) -> *mut u8 {
        let total = count
            .checked_mul(size)
            .expect("kcalloc: size computation overflowed");
        self.kmalloc(total)
    }

    /// Allocates a copy of the NUL-free byte string `s`, with a NUL
    /// terminator appended, mirroring `kstrdup`'s `strlen(s)+1` sizing.
    #[must_use]
    pub fn kstrdup(&self, s: &[u8]) -> *mut u8 {
        let ptr = self.kmalloc(s.len() + 1);
        unsafe {
            core::ptr::copy_nonoverlapping(s.as_ptr(), ptr, s.len());
            *ptr.add(s.len()) = 0;
        }
        ptr
    }

    /// Frees an object previously returned by `kmalloc`/`kcalloc`/`kstrdup`.
    ///
    /// # Safety
    /// `ptr` must have come from this allocator and not already be freed.
    pub unsafe fn kfree(&self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }
        let page_idx = self
            .pages
            .index_of(ptr)
            .expect("kfree: pointer not from a managed page");

        let PageRole::Slab { lines: k, nbused } = self.pages.role(page_idx) else {
            panic!("kfree: pointer's page is not a slab page");
        };

        if k == 0 {
            // Whole-page allocation: return the page directly.
            self.pages.page_free(page_idx);
            return;
        }

        let mut inner = self.inner.lock();
        let node = ptr.cast::<FreeNode>();
        node.write(FreeNode {
            next: inner.free_lists[k as usize],
        });
        inner.free_lists[k as usize] = NonNull::new(node);

        let nbused = nbused - 1;
        if nbused == 0 {
            // Last live object in this page: unlink every free chunk that
            // belongs to it and return the page whole.
            let base = self.pages.page_addr(page_idx) as usize;
            let page_end = base + PAGE_SIZE;

            let mut cursor: &mut Option<NonNull<FreeNode>> = &mut inner.free_lists[k as usize];
            loop {
                let Some(n) = *cursor else { break };
                let addr = n.as_ptr() as usize;
                if addr >= base && addr < page_end {
                    *cursor = unsafe { n.as_ref().next };
                    // `cursor` now already points at the following entry.
                } else {
                    cursor = unsafe { &mut (*n.as_ptr()).next };
                }
            }
            drop(inner);
            self.pages.set_role(page_idx, PageRole::Free);
            self.pages.page_free(page_idx);
        } else {
            self.pages.set_role(
                page_idx,
                PageRole::Slab {
                    lines: k,
                    nbused,
                },
            );
        }
    }
}

unsafe impl<const MAX_PAGES: usize, const MAX_CLASSES: usize> GlobalAlloc
    for SlabAllocator<'_, MAX_PAGES, MAX_CLASSES>
{
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        assert!(
            layout.align() <= self.line_size,
            "allocation alignment {} exceeds cache line size {}",
            layout.align(),
            self.line_size
        );
        self.kmalloc(layout.size())
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        self.kfree(ptr);
    }
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;
    use std::alloc::Layout as StdLayout;
    use std::vec::Vec;

    fn new_page_allocator(num_pages: usize) -> PageAllocator<64> {
        let layout = StdLayout::from_size_align(num_pages * PAGE_SIZE, PAGE_SIZE).unwrap();
        let mem = unsafe { std::alloc::alloc_zeroed(layout) };
        assert!(!mem.is_null());
        unsafe { PageAllocator::<64>::new(mem, num_pages) }
    }

    #[test]
    fn kmalloc_is_zeroed_and_aligned() {
        let pages = new_page_allocator(8);
        let cfg = KernelConfig::default();
        let slab: SlabAllocator<'_, 64> = SlabAllocator::new(&pages, &cfg);

        let ptr = slab.kmalloc(40);
        assert!(!ptr.is_null());
        assert_eq!((ptr as usize) % cfg.cache_line_size(), 0);
        let bytes = unsafe { core::slice::from_raw_parts(ptr, 40) };
        assert!(bytes.iter().all(|&b| b == 0));
        unsafe { slab.kfree(ptr) };
    }

    #[test]
    fn alloc_free_roundtrip_returns_page() {
        let pages = new_page_allocator(4);
        let cfg = KernelConfig::default();
        let slab: SlabAllocator<'_, 64> = SlabAllocator::new(&pages, &cfg);

        let before = pages.page_alloc().unwrap();
        pages.page_free(before);

        let ptr = slab.kmalloc(32);
        unsafe { slab.kfree(ptr) };

        // The page drawn to service the allocation should be back on the
        // free list, so we can allocate all 4 pages again.
        let mut got = Vec::new();
        for _ in 0..4 {
            got.push(pages.page_alloc().unwrap());
        }
        assert_eq!(pages.page_alloc(), Err(crate::memory::page::Error::OutOfMemory));
    }

    #[test]
    fn kcalloc_checks_overflow() {
        let pages = new_page_allocator(4);
        let cfg = KernelConfig::default();
        let slab: SlabAllocator<'_, 64> = SlabAllocator::new(&pages, &cfg);
        let ptr = slab.kcalloc(4, 8);
        assert!(!ptr.is_null());
        unsafe { slab.kfree(ptr) };
    }

    #[test]
    #[should_panic(expected = "overflowed")]
    fn kcalloc_overflow_is_fatal() {
        let pages = new_page_allocator(4);
        let cfg = KernelConfig::default();
        let slab: SlabAllocator<'_, 64> = SlabAllocator::new(&pages, &cfg);
        slab.kcalloc(usize::MAX, 2);
    }

    #[test]
    fn kstrdup_copies_and_terminates() {
        let pages = new_page_allocator(4);
        let cfg = KernelConfig::default();
        let slab: SlabAllocator<'_, 64> = SlabAllocator::new(&pages, &cfg);
        let ptr = slab.kstrdup(b"hello");
        let s = unsafe { core::slice::from_raw_parts(ptr, 6) };
        assert_eq!(s, b"hello\0");
        unsafe { slab.kfree(ptr) };
    }

    #[test]
    fn whole_page_allocation_round_trips() {
        let pages = new_page_allocator(4);
        let cfg = KernelConfig::default();
        let slab: SlabAllocator<'_, 64> = SlabAllocator::new(&pages, &cfg);
        let ptr = slab.kmalloc(PAGE_SIZE);
        assert!(!ptr.is_null());
        unsafe { slab.kfree(ptr) };
        // All 4 pages should be free again.
        for _ in 0..4 {
            pages.page_alloc().unwrap();
        }
    }
}
