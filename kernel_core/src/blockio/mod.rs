//! Block I/O and the page cache (C8): bridges the slab-page cache to block
//! devices.
//!
//! Grounded on `kblockio.c`: `blockio_get`/`blockio_release` look up or
//! install a kernel page caching one logical block of a device, backed by
//! the same [`crate::memory::page::PageAllocator`] descriptors the slab
//! allocator uses (`spec.md` §4.8). This version is read-only and never
//! flushes a dirty page, per `spec.md` §4.8's explicit statement of scope.

pub mod device;

use crate::config::PAGE_SIZE;
use crate::errno::Errno;
use crate::memory::page::{PageAllocator, PageIndex, PageRole};

/// What the block I/O layer needs from a concrete block device driver
/// (`spec.md` §4.8/§6): reading one logical block, and the logical block
/// size the driver has probed.
///
/// Registers, op codes and status values are named in
/// [`device::Registers`]; the actual MMIO access lives in the `kernel`
/// binary crate's driver, which implements this trait.
#[cfg_attr(test, mockall::automock)]
pub trait BlockDevice {
    /// This device's minor number.
    fn minor(&self) -> u8;

    /// Size in bytes of one logical block.
    fn logical_block_size(&self) -> usize;

    /// Reads logical block `lba` into `buf`, which must be exactly
    /// [`BlockDevice::logical_block_size`] bytes.
    ///
    /// # Errors
    /// [`Error::Io`] on a hardware read error (`READ_ERROR`/`ERROR` status,
    /// `spec.md` §6).
    fn read(&self, lba: u64, buf: &mut [u8]) -> core::result::Result<(), Error>;

    /// Writes `buf` (exactly one logical block) to logical block `lba`.
    ///
    /// # Errors
    /// [`Error::Io`] on a hardware write error, [`Error::ReadOnly`] if this
    /// device does not support writes (the minimal on-disk filesystem is
    /// read-only, `spec.md` §6).
    fn write(&self, lba: u64, buf: &[u8]) -> core::result::Result<(), Error>;
}

/// Errors surfaced by the block I/O layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, snafu::Snafu)]
pub enum Error {
    /// The underlying device reported a hardware error.
    Io,
    /// The device does not support writes.
    ReadOnly,
    /// The page allocator has no free page to install a new cache entry.
    OutOfMemory,
}

impl Error {
    /// The syscall-visible errno for this condition.
    #[must_use]
    pub fn errno(self) -> Errno {
        match self {
            Error::Io => Errno::Io,
            Error::ReadOnly => Errno::Perm,
            Error::OutOfMemory => Errno::NoMem,
        }
    }
}

/// Result type for block I/O operations.
pub type Result<T> = core::result::Result<T, Error>;

/// A block-cache page handle: the page index plus the address its contents
/// live at, handed back to callers of [`BlockIoCache::get`].
#[derive(Debug, Clone, Copy)]
pub struct CachedPage {
    /// The underlying page's index.
    pub index: PageIndex,
    /// Base address of the page's contents.
    pub addr: *mut u8,
}

/// The LBA→page cache bridging [`PageAllocator`] descriptors to block
/// devices (`spec.md` §4.8).
///
/// `MAX_PAGES` must match the page allocator it is built over (the cache has
/// no bookkeeping of its own beyond the descriptors; it scans them).
pub struct BlockIoCache<'pa, const MAX_PAGES: usize> {
    pages: &'pa PageAllocator<MAX_PAGES>,
    /// Serializes the get/install sequence so two callers racing on the same
    /// miss cannot both install a page for the same (dev, lba).
    install_lock: spin::Mutex<()>,
}

impl<'pa, const MAX_PAGES: usize> BlockIoCache<'pa, MAX_PAGES> {
    /// Creates a cache over `pages`.
    #[must_use]
    pub fn new(pages: &'pa PageAllocator<MAX_PAGES>) -> Self {
        Self {
            pages,
            install_lock: spin::Mutex::new(()),
        }
    }

    fn find_cached(&self, minor: u8, lba: u64) -> Option<PageIndex> {
        self.pages.iter_indices().find(|&idx| {
            matches!(
                self.pages.role(idx),
                PageRole::BlockCache { bdev, lba: l, valid: true, .. } if bdev == minor && l == lba
            )
        })
    }

    /// Looks up (or installs) the cached page for `lba` on `dev`
    /// (`blockio_get`), incrementing its refcount.
    ///
    /// On a miss, draws a fresh page from the page allocator and fills it
    /// with one logical block read from `dev`.
    ///
    /// # Errors
    /// [`Error::OutOfMemory`] if the page allocator is exhausted;
    /// [`Error::Io`] if the device read fails.
    pub fn get(&self, dev: &impl BlockDevice, lba: u64) -> Result<CachedPage> {
        let _guard = self.install_lock.lock();

        if let Some(idx) = self.find_cached(dev.minor(), lba) {
            self.pages.inc_refcount(idx);
            return Ok(CachedPage {
                index: idx,
                addr: self.pages.page_addr(idx),
            });
        }

        let idx = self
            .pages
            .page_alloc()
            .map_err(|_| Error::OutOfMemory)?;
        self.pages.set_role(
            idx,
            PageRole::BlockCache {
                dirty: false,
                locked: false,
                valid: false,
                bdev: dev.minor(),
                refcount: 1,
                lba,
            },
        );

        let addr = self.pages.page_addr(idx);
        debug_assert!(dev.logical_block_size() <= PAGE_SIZE);
        // Reads invalidate the destination cache lines before issuing to
        // hardware (`spec.md` §4.8); the actual cache-line invalidation is a
        // platform intrinsic performed by the `kernel` binary crate's driver
        // wrapper around `BlockDevice::read`, not by this portable layer.
        let buf = unsafe {
            core::slice::from_raw_parts_mut(addr, dev.logical_block_size())
        };
        if let Err(e) = dev.read(lba, buf) {
            self.pages.page_free(idx);
            return Err(e);
        }
        self.pages.set_valid(idx);

        Ok(CachedPage { index: idx, addr })
    }

    /// Releases a reference obtained from [`BlockIoCache::get`]
    /// (`blockio_release`).
    ///
    /// # Panics
    /// If the refcount is already zero — an impossible page state
    /// (`spec.md` §7).
    pub fn release(&self, page: CachedPage) {
        self.pages.dec_refcount(page.index);
    }

    /// Pins a page against eviction (`page_set_lock`), used by a
    /// superblock's metadata page.
    pub fn pin(&self, page: CachedPage) {
        self.pages.set_locked(page.index);
    }
}

/// An object-safe view of [`BlockIoCache`], so the VFS layer can hold a
/// `&dyn PageCache` without being generic over `MAX_PAGES` itself.
#[cfg_attr(test, mockall::automock)]
pub trait PageCache {
    /// See [`BlockIoCache::get`].
    fn get(&self, dev: &dyn BlockDevice, lba: u64) -> Result<CachedPage>;
    /// See [`BlockIoCache::release`].
    fn release(&self, page: CachedPage);
    /// See [`BlockIoCache::pin`].
    fn pin(&self, page: CachedPage);
}

impl<const MAX_PAGES: usize> PageCache for BlockIoCache<'_, MAX_PAGES> {
    fn get(&self, dev: &dyn BlockDevice, lba: u64) -> Result<CachedPage> {
        BlockIoCache::get(self, dev, lba)
    }
    fn release(&self, page: CachedPage) {
        BlockIoCache::release(self, page);
    }
    fn pin(&self, page: CachedPage) {
        BlockIoCache::pin(self, page);
    }
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;
    use std::alloc::Layout;

    fn new_pages(num_pages: usize) -> PageAllocator<64> {
        let layout = Layout::from_size_align(num_pages * PAGE_SIZE, PAGE_SIZE).unwrap();
        let mem = unsafe { std::alloc::alloc_zeroed(layout) };
        assert!(!mem.is_null());
        unsafe { PageAllocator::<64>::new(mem, num_pages) }
    }

    fn dev_with_block(minor: u8, block: &'static [u8]) -> MockBlockDevice {
        let mut dev = MockBlockDevice::new();
        dev.expect_minor().return_const(minor);
        dev.expect_logical_block_size().return_const(block.len());
        dev.expect_read().returning(move |_, buf| {
            buf.copy_from_slice(block);
            Ok(())
        });
        dev
    }

    #[test]
    fn miss_then_hit_increments_refcount_once() {
        let pages = new_pages(4);
        let cache = BlockIoCache::new(&pages);
        let dev = dev_with_block(0, b"hello block!!!!");

        let a = cache.get(&dev, 3).unwrap();
        assert_eq!(pages.refcount(a.index), 1);
        let b = cache.get(&dev, 3).unwrap();
        assert_eq!(a.index, b.index);
        assert_eq!(pages.refcount(a.index), 2);

        cache.release(a);
        cache.release(b);
        assert_eq!(pages.refcount(a.index), 0);
    }

    #[test]
    fn distinct_lbas_get_distinct_pages() {
        let pages = new_pages(4);
        let cache = BlockIoCache::new(&pages);
        let dev = dev_with_block(0, b"0123456789abcdef");

        let a = cache.get(&dev, 1).unwrap();
        let b = cache.get(&dev, 2).unwrap();
        assert_ne!(a.index, b.index);
    }

    #[test]
    fn io_error_on_miss_does_not_leak_the_page() {
        let pages = new_pages(2);
        let cache = BlockIoCache::new(&pages);
        let mut dev = MockBlockDevice::new();
        dev.expect_minor().return_const(0u8);
        dev.expect_logical_block_size().return_const(16usize);
        dev.expect_read().returning(|_, _| Err(Error::Io));

        assert_eq!(cache.get(&dev, 0), Err(Error::Io));
        // The page must have been returned to the free list, not leaked.
        let _a = pages.page_alloc().unwrap();
        let _b = pages.page_alloc().unwrap();
    }
}
