//! User-stack pool (C3): allocates and frees fixed-size user stacks from the
//! top of the user address region, plus the `sbrk` service for the user
//! heap.
//!
//! Grounded on `kmemkernel.c`'s stack pool: a sorted-by-address free list of
//! previously released stacks, magic sentinel words written at both ends of
//! every stack and checked on free, and a region boundary that is lowered on
//! first use and raised again as consecutive free stacks accumulate at it.

use alloc::vec::Vec;

use spin::Mutex;

use crate::config::KernelConfig;
use crate::errno::Errno;

/// Sentinel word written at both ends of a stack; corruption is fatal.
const STACK_MAGIC: u32 = 0xdead_c0de;

struct FreeStack {
    /// Base (lowest address) of the released stack.
    base: usize,
}

struct Inner {
    /// Free stacks sorted by ascending base address.
    free: Vec<FreeStack>,
    /// Lower bound of the still-uncarved region; stacks are carved
    /// downward from `region_top`.
    boundary: usize,
    region_top: usize,
    region_bottom: usize,
    stack_size: usize,
    /// Current user program break, moved by `sbrk`.
    brk: usize,
    heap_start: usize,
}

/// Pool of fixed-size user stacks carved from the top of the user address
/// region, and the `sbrk` heap-end cursor living below them.
pub struct UserStackPool {
    inner: Mutex<Inner>,
}

/// Errors from user-stack pool operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, snafu::Snafu)]
pub enum Error {
    /// The region has no room left to carve a new stack.
    OutOfMemory,
    /// `sbrk` would move the break past the stack region boundary.
    WouldCollideWithStacks,
}

impl Error {
    /// The syscall-visible errno for this condition.
    #[must_use]
    pub fn errno(self) -> Errno {
        match self {
            Error::OutOfMemory | Error::WouldCollideWithStacks => Errno::NoMem,
        }
    }
}

/// Result type for user-stack pool operations.
pub type Result<T> = core::result::Result<T, Error>;

impl UserStackPool {
    /// Creates a pool over `[region_bottom, region_top)`, with the user heap
    /// starting at `heap_start` (which must be `<= region_bottom`).
    #[must_use]
    pub fn new(region_bottom: usize, region_top: usize, config: &KernelConfig) -> Self {
        assert!(region_bottom <= region_top);
        Self {
            inner: Mutex::new(Inner {
                free: Vec::new(),
                boundary: region_top,
                region_top,
                region_bottom,
                stack_size: config.ustack_size,
                brk: region_bottom,
                heap_start: region_bottom,
            }),
        }
    }

    /// Allocates a user stack, returning the address of its top (highest
    /// usable address plus one, i.e. the initial stack pointer).
    ///
    /// Reuses the highest-address previously freed stack if one exists;
    /// otherwise carves a new one from the top of the region.
    ///
    /// # Errors
    /// [`Error::OutOfMemory`] if the region is exhausted.
    pub fn ustack_alloc(&self) -> Result<usize> {
        let mut inner = self.inner.lock();

        let base = if let Some(stack) = inner.free.pop() {
            stack.base
        } else {
            let stack_size = inner.stack_size;
            let new_boundary = inner
                .boundary
                .checked_sub(stack_size)
                .filter(|&b| b >= inner.region_bottom)
                .ok_or(Error::OutOfMemory)?;
            inner.boundary = new_boundary;
            new_boundary
        };

        let top = base + inner.stack_size;
        self.write_magic(base, top);
        Ok(top)
    }

    /// Frees a stack previously returned by `ustack_alloc`, given its top
    /// address. Checks the magic sentinels written at allocation time.
    ///
    /// # Panics
    /// If either sentinel word has been corrupted.
    pub fn ustack_free(&self, top: usize) {
        let mut inner = self.inner.lock();
        let base = top - inner.stack_size;
        self.check_magic(base, top);

        let pos = inner.free.partition_point(|s| s.base < base);
        inner.free.insert(pos, FreeStack { base });

        // Raise the boundary by unlinking consecutive free stacks sitting
        // right at it.
        while let Some(last) = inner.free.last() {
            if last.base == inner.boundary {
                let stack_size = inner.stack_size;
                inner.boundary += stack_size;
                inner.free.pop();
            } else {
                break;
            }
        }
    }

    fn write_magic(&self, base: usize, top: usize) {
        unsafe {
            (base as *mut u32).write(STACK_MAGIC);
            ((top - 4) as *mut u32).write(STACK_MAGIC);
        }
    }

    fn check_magic(&self, base: usize, top: usize) {
        unsafe {
            let lo = (base as *const u32).read();
            let hi = ((top - 4) as *const u32).read();
            assert_eq!(lo, STACK_MAGIC, "user stack guard word corrupted at base");
            assert_eq!(hi, STACK_MAGIC, "user stack guard word corrupted at top");
        }
    }

    /// Moves the per-process heap-end pointer by `delta` bytes (which may be
    /// negative), returning the previous break on success.
    ///
    /// # Errors
    /// [`Error::WouldCollideWithStacks`] if the new break would cross into
    /// the (ever-shrinking) stack region; the break is left unchanged.
    pub fn sbrk(&self, delta: isize) -> Result<usize> {
        let mut inner = self.inner.lock();
        let old_brk = inner.brk;
        let new_brk = if delta >= 0 {
            old_brk.checked_add(delta as usize)
        } else {
            old_brk.checked_sub((-delta) as usize)
        }
        .ok_or(Error::WouldCollideWithStacks)?;

        if new_brk < inner.heap_start || new_brk > inner.boundary {
            return Err(Error::WouldCollideWithStacks);
        }
        inner.brk = new_brk;
        Ok(old_brk)
    }
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;

    fn pool() -> UserStackPool {
        let cfg = KernelConfig {
            ustack_size: 4096,
            ..KernelConfig::default()
        };
        UserStackPool::new(0x1000, 0x1_0000, &cfg)
    }

    #[test]
    fn alloc_reuses_highest_freed_stack() {
        // This test exercises bookkeeping only; it never dereferences the
        // addresses it hands out as real memory, since the guard words are
        // written through raw pointers at whatever address the arithmetic
        // produces. Use a pool whose arithmetic lands within this process's
        // own stack-sized scratch buffer instead.
        let mut scratch = [0u8; 3 * 4096];
        let base = scratch.as_mut_ptr() as usize;
        let cfg = KernelConfig {
            ustack_size: 4096,
            ..KernelConfig::default()
        };
        let pool = UserStackPool::new(base, base + scratch.len(), &cfg);

        let a = pool.ustack_alloc().unwrap();
        let b = pool.ustack_alloc().unwrap();
        assert!(b < a, "second stack carved lower than the first");

        pool.ustack_free(a);
        let c = pool.ustack_alloc().unwrap();
        assert_eq!(a, c, "freed stack reused before carving a new one");

        pool.ustack_free(c);
        pool.ustack_free(b);
    }

    #[test]
    fn exhausting_region_is_out_of_memory() {
        let mut scratch = [0u8; 4096];
        let base = scratch.as_mut_ptr() as usize;
        let cfg = KernelConfig {
            ustack_size: 4096,
            ..KernelConfig::default()
        };
        let pool = UserStackPool::new(base, base + scratch.len(), &cfg);
        let _a = pool.ustack_alloc().unwrap();
        assert_eq!(pool.ustack_alloc(), Err(Error::OutOfMemory));
    }

    #[test]
    fn sbrk_moves_break_and_rejects_collision() {
        let pool = pool();
        let before = pool.sbrk(0).unwrap();
        let after = pool.sbrk(256).unwrap();
        assert_eq!(after, before);
        let now = pool.sbrk(0).unwrap();
        assert_eq!(now, before + 256);

        // Push the break to the stack boundary and then try to cross it.
        let huge = isize::try_from(0x1_0000 - 0x1000 - 256).unwrap();
        assert!(pool.sbrk(huge + 1).is_err());
    }
}
