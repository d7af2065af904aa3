//! Compile/boot-time tunables for the kernel core.
//!
//! The original C kernel hard-codes most of these as macros (`PAGE_SIZE`,
//! `THREAD_MAX`, `USTACK_SIZE`, ...). Here they are gathered into a single
//! struct that `kernel_core::boot::boot` takes as a parameter, so that unit
//! tests can exercise the allocator/scheduler with small values instead of
//! the real platform's.

/// Size in bytes of one physical page. Fixed at 4 KiB by the platform.
pub const PAGE_SIZE: usize = 4096;

/// Minimum cache line size in bytes; the true platform value is rounded up to
/// this if smaller (`spec.md` §4.2).
pub const MIN_CACHE_LINE_SIZE: usize = 16;

/// Maximum number of inode records held by the on-disk minimal filesystem's
/// superblock (`spec.md` §6).
pub const MINFS_MAX_FILES: usize = 128;

/// Runtime configuration for one kernel instance.
#[derive(Debug, Clone, Copy)]
pub struct KernelConfig {
    /// Hardware cache line size in bytes, as read from the `cachelinesize()`
    /// HAL intrinsic, before rounding up to [`MIN_CACHE_LINE_SIZE`].
    pub raw_cache_line_size: usize,
    /// Maximum number of simultaneously existing threads.
    pub thread_max: usize,
    /// Size in bytes of each user stack handed out by the user-stack pool.
    pub ustack_size: usize,
    /// Maximum number of simultaneous mount table entries.
    pub mount_max: usize,
    /// Maximum number of resident inodes in the VFS inode cache.
    pub inode_cache_capacity: usize,
    /// Number of hardware cycles between timer interrupts.
    pub quantum: u64,
    /// Number of IRQ lines supported by the platform's interrupt controller.
    pub irq_lines: usize,
}

impl KernelConfig {
    /// The cache line size actually used by the slab allocator: the hardware
    /// value rounded up to [`MIN_CACHE_LINE_SIZE`].
    #[must_use]
    pub fn cache_line_size(&self) -> usize {
        self.raw_cache_line_size.max(MIN_CACHE_LINE_SIZE)
    }

    /// Number of object slots in one page when sliced at `cache_line_size()`
    /// granularity.
    #[must_use]
    pub fn max_line_slab(&self) -> usize {
        PAGE_SIZE / self.cache_line_size()
    }
}

impl Default for KernelConfig {
    /// Defaults matching the reference `almo1` platform: a 16-byte cache
    /// line, 64 threads, 64 KiB user stacks, 16 mounts, a 256-entry inode
    /// cache and a 1,000,000-cycle quantum.
    fn default() -> Self {
        Self {
            raw_cache_line_size: 16,
            thread_max: 64,
            ustack_size: 64 * 1024,
            mount_max: 16,
            inode_cache_capacity: 256,
            quantum: 1_000_000,
            irq_lines: 32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_line_size_is_rounded_up() {
        let mut cfg = KernelConfig::default();
        cfg.raw_cache_line_size = 4;
        assert_eq!(cfg.cache_line_size(), MIN_CACHE_LINE_SIZE);
        cfg.raw_cache_line_size = 32;
        assert_eq!(cfg.cache_line_size(), 32);
    }

    #[test]
    fn max_line_slab_divides_page_size() {
        let cfg = KernelConfig::default();
        assert_eq!(cfg.max_line_slab(), PAGE_SIZE / cfg.cache_line_size());
    }
}
