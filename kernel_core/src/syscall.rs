//! Numbered syscall dispatch (C10).
//!
//! Grounded on `kernel/ksyscall.c` and `common/kshell_syscalls.h`: a single
//! trap entry selects one function by syscall number, exactly as
//! [`Syscalls::dispatch`] does here. Pointer-typed arguments are checked
//! against the user address region before use (`spec.md` §4.10), the
//! Rust-idiomatic analogue of `kernel/kuseraddr.c`'s range checks.
//!
//! Mutex and barrier handles are opaque `usize` values exactly the way the
//! original kernel hands user code a `thread_mutex_t`/`thread_barrier_t`
//! pointer from `kmalloc`: [`Syscalls::mutex_init`] heap-allocates a
//! [`crate::sync::Mutex`] and returns the address, [`Syscalls::mutex_lock`]/
//! [`Syscalls::mutex_unlock`] borrow it back by pointer, and
//! [`Syscalls::mutex_destroy`] frees it. Validating the pointer therefore
//! means checking it against the user region just like any other argument.

use alloc::sync::Arc;

use crate::config::KernelConfig;
use crate::errno::Errno;
use crate::memory::{SlabAllocator, UserStackPool};
use crate::sched::thread::{ContextSwitch, Trampoline};
use crate::sched::{Scheduler, ThreadId};
use crate::sync::{Barrier, Mutex};
use crate::sched::scheduler::InterruptMask;

/// The numbered syscalls this kernel exposes (`spec.md` §4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Number {
    /// Terminates the calling thread with a status code.
    Exit = 0,
    /// Creates a new thread.
    ThreadCreate = 1,
    /// Yields the CPU cooperatively.
    ThreadYield = 2,
    /// Terminates the calling thread, storing a return value for a joiner.
    ThreadExit = 3,
    /// Waits for another thread to exit and reaps its return value.
    ThreadJoin = 4,
    /// Reads the current cycle counter.
    Clock = 5,
    /// Allocates and initializes a mutex.
    MutexInit = 6,
    /// Locks a mutex.
    MutexLock = 7,
    /// Unlocks a mutex.
    MutexUnlock = 8,
    /// Frees a mutex.
    MutexDestroy = 9,
    /// Allocates and initializes a barrier for `count` threads.
    BarrierInit = 10,
    /// Waits at a barrier.
    BarrierWait = 11,
    /// Frees a barrier.
    BarrierDestroy = 12,
    /// Grows or shrinks the calling thread's heap break.
    Sbrk = 13,
    /// Reads from a character device by minor number.
    Read = 14,
    /// Writes to a character device by minor number.
    Write = 15,
    /// Reports the platform's cache line size.
    CacheLineSize = 16,
    /// The multiplexed shell syscall, carrying its own sub-number.
    Shell = 17,
}

impl Number {
    /// Decodes a raw syscall number, if it names one.
    #[must_use]
    pub fn from_raw(n: u32) -> Option<Self> {
        Some(match n {
            0 => Number::Exit,
            1 => Number::ThreadCreate,
            2 => Number::ThreadYield,
            3 => Number::ThreadExit,
            4 => Number::ThreadJoin,
            5 => Number::Clock,
            6 => Number::MutexInit,
            7 => Number::MutexLock,
            8 => Number::MutexUnlock,
            9 => Number::MutexDestroy,
            10 => Number::BarrierInit,
            11 => Number::BarrierWait,
            12 => Number::BarrierDestroy,
            13 => Number::Sbrk,
            14 => Number::Read,
            15 => Number::Write,
            16 => Number::CacheLineSize,
            17 => Number::Shell,
            _ => return None,
        })
    }
}

/// The bounds of the user-addressable region, used to validate every
/// pointer-typed syscall argument (`spec.md` §4.10).
#[derive(Debug, Clone, Copy)]
pub struct UserRegion {
    /// Lowest valid user address.
    pub bottom: usize,
    /// One past the highest valid user address.
    pub top: usize,
}

impl UserRegion {
    /// Whether `[ptr, ptr+len)` lies entirely within the user region.
    #[must_use]
    pub fn contains(&self, ptr: usize, len: usize) -> bool {
        match ptr.checked_add(len) {
            Some(end) => ptr >= self.bottom && end <= self.top,
            None => false,
        }
    }

    /// Validates `[ptr, ptr+len)`.
    ///
    /// # Errors
    /// [`Errno::Inval`] if any part of the range falls outside the user
    /// region.
    pub fn validate(&self, ptr: usize, len: usize) -> core::result::Result<(), Errno> {
        if self.contains(ptr, len) {
            Ok(())
        } else {
            Err(Errno::Inval)
        }
    }
}

/// What the `read`/`write` syscalls need from a character device
/// (`spec.md` §4.10 "`read/write` against tty minor"), grounded on
/// `kernel/kdevices.c`'s TTY driver callbacks. Reads are non-blocking from
/// this layer's point of view: an empty FIFO returns `0` rather than
/// parking, matching `spec.md` §5's "`read` on an empty device FIFO" being
/// the suspension point, which is handled one layer up by the driver
/// itself, not by this dispatcher.
#[cfg_attr(test, mockall::automock)]
pub trait CharDevice {
    /// This device's minor number.
    fn minor(&self) -> u8;
    /// Reads up to `buf.len()` bytes without blocking, returning the count
    /// actually read (`0` if nothing is available).
    fn read(&self, buf: &mut [u8]) -> usize;
    /// Writes `buf`, returning the number of bytes written.
    fn write(&self, buf: &[u8]) -> usize;
}

/// Errors the dispatcher can report, layered over every subsystem's own
/// error type via [`Error::errno`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The syscall number is not one this kernel implements.
    NoSuchSyscall,
    /// A pointer-typed argument, or a mutex/barrier handle, falls outside
    /// the user address region.
    BadAddress,
    /// No character device is registered under the requested minor number.
    NoSuchDevice,
    /// The scheduler reported an error.
    Sched(crate::sched::scheduler::Error),
    /// The slab allocator reported an error (`sbrk` growth failure).
    OutOfMemory,
    /// A mutex operation failed.
    Mutex(crate::sync::mutex::Error),
    /// A barrier operation failed.
    Barrier(crate::sync::barrier::Error),
}

impl Error {
    /// The syscall-visible errno for this condition, i.e. what
    /// [`Errno::as_syscall_return`] turns into the raw return value.
    #[must_use]
    pub fn errno(self) -> Errno {
        match self {
            Error::NoSuchSyscall => Errno::NoSys,
            Error::BadAddress => Errno::Inval,
            Error::NoSuchDevice => Errno::NoEnt,
            Error::Sched(e) => e.errno(),
            Error::OutOfMemory => Errno::NoMem,
            Error::Mutex(e) => e.errno(),
            Error::Barrier(e) => e.errno(),
        }
    }
}

impl From<crate::sched::scheduler::Error> for Error {
    fn from(e: crate::sched::scheduler::Error) -> Self {
        Error::Sched(e)
    }
}
impl From<crate::sync::mutex::Error> for Error {
    fn from(e: crate::sync::mutex::Error) -> Self {
        Error::Mutex(e)
    }
}
impl From<crate::sync::barrier::Error> for Error {
    fn from(e: crate::sync::barrier::Error) -> Self {
        Error::Barrier(e)
    }
}

/// Result type for syscall implementations.
pub type Result<T> = core::result::Result<T, Error>;

/// A mutex shared with user code by opaque handle, the heap-allocated
/// analogue of `thread_mutex_t`.
type SharedMutex<'a, CS, IM, const MAX_THREADS: usize> =
    Mutex<&'a Scheduler<CS, IM, MAX_THREADS>>;
/// A barrier shared with user code by opaque handle.
type SharedBarrier<'a, CS, IM, const MAX_THREADS: usize> =
    Barrier<&'a Scheduler<CS, IM, MAX_THREADS>>;

/// The syscall dispatch table over one kernel instance's subsystems.
///
/// Lifetimes/generics mirror [`Scheduler`] and [`SlabAllocator`]: this type
/// borrows the same instances `kernel_core::boot::boot` constructed, rather
/// than owning duplicates.
pub struct Syscalls<
    'a,
    CS: ContextSwitch,
    IM: InterruptMask,
    const MAX_THREADS: usize,
    const MAX_PAGES: usize,
    const MAX_CLASSES: usize,
> {
    scheduler: &'a Scheduler<CS, IM, MAX_THREADS>,
    ustacks: &'a UserStackPool,
    slab: &'a SlabAllocator<'a, MAX_PAGES, MAX_CLASSES>,
    ttys: &'a [&'a dyn CharDevice],
    user_region: UserRegion,
    config: &'a KernelConfig,
    clock_read: fn() -> u64,
}

impl<
        'a,
        CS: ContextSwitch,
        IM: InterruptMask,
        const MAX_THREADS: usize,
        const MAX_PAGES: usize,
        const MAX_CLASSES: usize,
    > Syscalls<'a, CS, IM, MAX_THREADS, MAX_PAGES, MAX_CLASSES>
{
    /// Assembles a dispatcher over already-initialized subsystems. `clock_read`
    /// samples the platform's free-running cycle counter for the `clock`
    /// syscall (grounded on `hal/cpu/mips/hwi.h`'s `CP0_COUNT` convention —
    /// the same source [`crate::logger::GlobalValueReader`] reads for the
    /// logger's timestamps).
    #[must_use]
    pub fn new(
        scheduler: &'a Scheduler<CS, IM, MAX_THREADS>,
        ustacks: &'a UserStackPool,
        slab: &'a SlabAllocator<'a, MAX_PAGES, MAX_CLASSES>,
        ttys: &'a [&'a dyn CharDevice],
        user_region: UserRegion,
        config: &'a KernelConfig,
        clock_read: fn() -> u64,
    ) -> Self {
        Self {
            scheduler,
            ustacks,
            slab,
            ttys,
            user_region,
            config,
            clock_read,
        }
    }

    fn tty(&self, minor: u8) -> Result<&'a dyn CharDevice> {
        self.ttys
            .iter()
            .find(|d| d.minor() == minor)
            .copied()
            .ok_or(Error::NoSuchDevice)
    }

    /// `thread_create`: spawns a user thread entering at `entry` with `arg`.
    ///
    /// # Errors
    /// Whatever [`Scheduler::thread_create`] returns.
    pub fn thread_create(&self, bootstrap: usize, entry: usize, arg: usize) -> Result<ThreadId> {
        let t = self
            .scheduler
            .thread_create(self.ustacks, bootstrap, entry, arg, Trampoline::User)?;
        Ok(t.id)
    }

    /// `thread_yield`.
    ///
    /// # Safety
    /// Must be called from the syscall trap path with no other context
    /// switch in progress, per [`Scheduler::switch`]'s requirements.
    pub unsafe fn thread_yield(&self) {
        self.scheduler.yield_now();
    }

    /// `thread_exit`. Never returns.
    ///
    /// # Safety
    /// Same requirement as [`Syscalls::thread_yield`].
    pub unsafe fn thread_exit(&self, retval: usize) -> ! {
        self.scheduler.exit(retval)
    }

    /// `thread_join`.
    ///
    /// # Safety
    /// Same requirement as [`Syscalls::thread_yield`].
    ///
    /// # Errors
    /// [`Error::Sched`] if `target` names no live thread.
    pub unsafe fn thread_join(&self, target: ThreadId) -> Result<usize> {
        Ok(self.scheduler.join(target)?)
    }

    /// `mutex_init`: heap-allocates a mutex and returns its handle.
    #[must_use]
    pub fn mutex_init(&self) -> usize {
        let m: Arc<SharedMutex<'a, CS, IM, MAX_THREADS>> =
            Arc::new(Mutex::new(self.scheduler));
        Arc::into_raw(m) as usize
    }

    /// # Safety
    /// `handle` must be a value previously returned by
    /// [`Syscalls::mutex_init`] and not yet passed to
    /// [`Syscalls::mutex_destroy`].
    unsafe fn mutex_from_handle(
        handle: usize,
    ) -> Arc<SharedMutex<'a, CS, IM, MAX_THREADS>> {
        Arc::from_raw(handle as *const SharedMutex<'a, CS, IM, MAX_THREADS>)
    }

    /// `mutex_lock`.
    ///
    /// # Safety
    /// `handle` must come from [`Syscalls::mutex_init`] and name a mutex
    /// not yet destroyed.
    ///
    /// # Errors
    /// [`Error::BadAddress`] if `handle` is `0`; otherwise whatever
    /// [`Mutex::lock`] returns.
    pub unsafe fn mutex_lock(&self, handle: usize) -> Result<()> {
        if handle == 0 {
            return Err(Error::BadAddress);
        }
        let m = Self::mutex_from_handle(handle);
        let r = m.lock();
        core::mem::forget(m);
        Ok(r?)
    }

    /// `mutex_unlock`.
    ///
    /// # Safety
    /// Same requirement as [`Syscalls::mutex_lock`].
    ///
    /// # Errors
    /// Same as [`Syscalls::mutex_lock`].
    pub unsafe fn mutex_unlock(&self, handle: usize) -> Result<()> {
        if handle == 0 {
            return Err(Error::BadAddress);
        }
        let m = Self::mutex_from_handle(handle);
        let r = m.unlock();
        core::mem::forget(m);
        Ok(r?)
    }

    /// `mutex_destroy`: frees the handle's backing allocation.
    ///
    /// # Safety
    /// `handle` must come from [`Syscalls::mutex_init`] and not already
    /// have been destroyed.
    ///
    /// # Errors
    /// [`Error::BadAddress`] if `handle` is `0`; [`Error::Mutex`] if the
    /// mutex is still locked.
    pub unsafe fn mutex_destroy(&self, handle: usize) -> Result<()> {
        if handle == 0 {
            return Err(Error::BadAddress);
        }
        let m = Self::mutex_from_handle(handle);
        match Arc::try_unwrap(m) {
            Ok(mutex) => Ok(mutex.destroy()?),
            Err(still_shared) => {
                // Another reference exists (impossible through the syscall
                // surface, which hands out exactly one handle per init);
                // forget rather than leak-check in a no_std context.
                core::mem::forget(still_shared);
                Err(Error::Mutex(crate::sync::mutex::Error::Busy))
            }
        }
    }

    /// `barrier_init`: heap-allocates a barrier for `count` threads and
    /// returns its handle.
    #[must_use]
    pub fn barrier_init(&self, count: usize) -> usize {
        let b: Arc<SharedBarrier<'a, CS, IM, MAX_THREADS>> =
            Arc::new(Barrier::new(self.scheduler, count));
        Arc::into_raw(b) as usize
    }

    unsafe fn barrier_from_handle(
        handle: usize,
    ) -> Arc<SharedBarrier<'a, CS, IM, MAX_THREADS>> {
        Arc::from_raw(handle as *const SharedBarrier<'a, CS, IM, MAX_THREADS>)
    }

    /// `barrier_wait`.
    ///
    /// # Safety
    /// `handle` must come from [`Syscalls::barrier_init`] and not yet have
    /// been destroyed.
    ///
    /// # Errors
    /// [`Error::BadAddress`] if `handle` is `0`.
    pub unsafe fn barrier_wait(&self, handle: usize) -> Result<()> {
        if handle == 0 {
            return Err(Error::BadAddress);
        }
        let b = Self::barrier_from_handle(handle);
        b.wait();
        core::mem::forget(b);
        Ok(())
    }

    /// `barrier_destroy`: frees the handle's backing allocation.
    ///
    /// # Safety
    /// Same requirement as [`Syscalls::barrier_wait`].
    ///
    /// # Errors
    /// [`Error::BadAddress`] if `handle` is `0`; [`Error::Barrier`] if
    /// threads are still parked on it.
    pub unsafe fn barrier_destroy(&self, handle: usize) -> Result<()> {
        if handle == 0 {
            return Err(Error::BadAddress);
        }
        let b = Self::barrier_from_handle(handle);
        match Arc::try_unwrap(b) {
            Ok(barrier) => Ok(barrier.destroy()?),
            Err(still_shared) => {
                core::mem::forget(still_shared);
                Err(Error::Barrier(crate::sync::barrier::Error::Busy))
            }
        }
    }

    /// `sbrk`: grows or shrinks the calling thread's user heap break.
    ///
    /// # Errors
    /// [`Error::OutOfMemory`] if the user-stack pool's break cannot move by
    /// `delta`.
    pub fn sbrk(&self, delta: isize) -> Result<usize> {
        self.ustacks.sbrk(delta).map_err(|_| Error::OutOfMemory)
    }

    /// `read` against a character device's minor number.
    ///
    /// # Errors
    /// [`Error::BadAddress`] if `buf` is not entirely within the user
    /// region; [`Error::NoSuchDevice`] if `minor` names no registered tty.
    pub fn read(&self, minor: u8, buf_ptr: usize, buf: &mut [u8]) -> Result<usize> {
        self.user_region
            .validate(buf_ptr, buf.len())
            .map_err(|_| Error::BadAddress)?;
        Ok(self.tty(minor)?.read(buf))
    }

    /// `write` against a character device's minor number.
    ///
    /// # Errors
    /// Same as [`Syscalls::read`].
    pub fn write(&self, minor: u8, buf_ptr: usize, buf: &[u8]) -> Result<usize> {
        self.user_region
            .validate(buf_ptr, buf.len())
            .map_err(|_| Error::BadAddress)?;
        Ok(self.tty(minor)?.write(buf))
    }

    /// `cachelinesize`.
    #[must_use]
    pub fn cache_line_size(&self) -> usize {
        self.config.cache_line_size()
    }

    /// `clock`: the platform's free-running cycle counter.
    #[must_use]
    pub fn clock(&self) -> u64 {
        (self.clock_read)()
    }

    /// The slab allocator this dispatcher's `sbrk`-adjacent `kmalloc`-style
    /// debug commands (the `shell` syscall's memory dump) would read from.
    #[must_use]
    pub fn slab(&self) -> &'a SlabAllocator<'a, MAX_PAGES, MAX_CLASSES> {
        self.slab
    }

    /// A debug snapshot of every thread, for the `shell` syscall's debug
    /// pointer (`spec.md` §4.10).
    #[must_use]
    pub fn thread_dump(&self) -> alloc::vec::Vec<crate::sched::scheduler::ThreadDump> {
        self.scheduler.dump()
    }

    /// Decodes `number` as a [`Number`] and calls the matching handler,
    /// validating pointer-typed arguments against the user address region
    /// first (`spec.md` §4.10: "Arguments flagged as pointers must be
    /// validated to lie in the user address region"). Returns the
    /// handler's result cast to `isize`, or the negated errno via
    /// [`Errno::as_syscall_return`] if decoding or the handler itself
    /// fails — the raw value a syscall trampoline hands back to user code.
    ///
    /// `args` holds the syscall's raw argument registers in order
    /// (`$a0`..`$a3` on this platform); a handler that needs fewer simply
    /// ignores the trailing slots.
    ///
    /// # Safety
    /// Must be called from the syscall trap path with no other context
    /// switch already in progress, per [`Scheduler::switch`]'s
    /// requirements — several of the handlers this reaches, e.g.
    /// [`Syscalls::thread_yield`] and [`Syscalls::thread_exit`], share it.
    pub unsafe fn dispatch(&self, number: u32, args: [usize; 4]) -> isize {
        match self.dispatch_inner(number, args) {
            Ok(v) => v,
            Err(e) => e.errno().as_syscall_return(),
        }
    }

    unsafe fn dispatch_inner(&self, number: u32, args: [usize; 4]) -> Result<isize> {
        let [a0, a1, a2, a3] = args;
        let _ = a3;
        let n = Number::from_raw(number).ok_or(Error::NoSuchSyscall)?;
        Ok(match n {
            Number::Exit | Number::ThreadExit => self.thread_exit(a0),
            Number::ThreadCreate => self.thread_create(a0, a1, a2)? as isize,
            Number::ThreadYield => {
                self.thread_yield();
                0
            }
            Number::ThreadJoin => self.thread_join(a0 as ThreadId)? as isize,
            Number::Clock => self.clock() as isize,
            Number::MutexInit => self.mutex_init() as isize,
            Number::MutexLock => {
                self.mutex_lock(a0)?;
                0
            }
            Number::MutexUnlock => {
                self.mutex_unlock(a0)?;
                0
            }
            Number::MutexDestroy => {
                self.mutex_destroy(a0)?;
                0
            }
            Number::BarrierInit => self.barrier_init(a0) as isize,
            Number::BarrierWait => {
                self.barrier_wait(a0)?;
                0
            }
            Number::BarrierDestroy => {
                self.barrier_destroy(a0)?;
                0
            }
            Number::Sbrk => self.sbrk(a0 as isize)? as isize,
            Number::Read => {
                self.user_region.validate(a1, a2).map_err(|_| Error::BadAddress)?;
                let buf = core::slice::from_raw_parts_mut(a1 as *mut u8, a2);
                self.read(a0 as u8, a1, buf)? as isize
            }
            Number::Write => {
                self.user_region.validate(a1, a2).map_err(|_| Error::BadAddress)?;
                let buf = core::slice::from_raw_parts(a1 as *const u8, a2);
                self.write(a0 as u8, a1, buf)? as isize
            }
            Number::CacheLineSize => self.cache_line_size() as isize,
            // The interactive shell is out of scope; its syscall number is
            // reserved but unimplemented.
            Number::Shell => return Err(Error::NoSuchSyscall),
        })
    }
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;
    use crate::config::KernelConfig;
    use crate::memory::page::PageAllocator;
    use crate::sched::scheduler::InterruptMask;

    struct NoopIrq;
    impl InterruptMask for NoopIrq {
        fn disable(&self) {}
        fn enable(&self) {}
    }

    struct TestCS;
    impl ContextSwitch for TestCS {
        type Context = ();
        fn init_context(_bootstrap: usize, _stack_pointer: usize) -> Self::Context {}
        unsafe fn save(_context: &mut Self::Context) -> bool {
            true
        }
        unsafe fn load(_context: &Self::Context) -> ! {
            unreachable!("test never actually resumes a saved context")
        }
    }

    fn leaked_region(len: usize) -> (usize, usize) {
        let region = alloc::boxed::Box::leak(alloc::vec![0u8; len].into_boxed_slice());
        let base = region.as_mut_ptr() as usize;
        (base, base + region.len())
    }

    fn test_clock() -> u64 {
        42
    }

    /// Assembles a dispatcher over freshly leaked (test-lifetime) backing
    /// subsystems, mirroring `sched::scheduler::tests::ustacks`.
    fn test_syscalls() -> Syscalls<'static, TestCS, NoopIrq, 4, 64, 256> {
        let cfg: &'static KernelConfig = alloc::boxed::Box::leak(alloc::boxed::Box::new(KernelConfig::default()));
        let (pages_base, pages_top) = leaked_region(64 * crate::config::PAGE_SIZE);
        let pages: &'static PageAllocator<64> =
            alloc::boxed::Box::leak(alloc::boxed::Box::new(unsafe {
                PageAllocator::<64>::new(
                    pages_base as *mut u8,
                    (pages_top - pages_base) / crate::config::PAGE_SIZE,
                )
            }));
        let slab: &'static SlabAllocator<'static, 64> =
            alloc::boxed::Box::leak(alloc::boxed::Box::new(SlabAllocator::new(pages, cfg)));
        let sched: &'static Scheduler<TestCS, NoopIrq, 4> =
            alloc::boxed::Box::leak(alloc::boxed::Box::new(Scheduler::new(NoopIrq)));
        let (ubase, utop) = leaked_region(64 * 1024);
        let ustacks: &'static UserStackPool =
            alloc::boxed::Box::leak(alloc::boxed::Box::new(UserStackPool::new(ubase, utop, cfg)));
        let ttys: &'static [&'static dyn CharDevice] = &[];
        let user_region = UserRegion {
            bottom: ubase,
            top: utop,
        };
        Syscalls::new(sched, ustacks, slab, ttys, user_region, cfg, test_clock)
    }

    #[test]
    fn dispatch_routes_numbers_to_their_handlers() {
        let syscalls = test_syscalls();

        let ret = unsafe { syscalls.dispatch(Number::CacheLineSize as u32, [0; 4]) };
        assert_eq!(ret, KernelConfig::default().cache_line_size() as isize);

        let ret = unsafe { syscalls.dispatch(Number::Clock as u32, [0; 4]) };
        assert_eq!(ret, 42);
    }

    #[test]
    fn dispatch_rejects_an_unknown_syscall_number() {
        let syscalls = test_syscalls();
        let ret = unsafe { syscalls.dispatch(9999, [0; 4]) };
        assert_eq!(ret, Errno::NoSys.as_syscall_return());
    }

    #[test]
    fn dispatch_rejects_out_of_range_pointer_args() {
        let syscalls = test_syscalls();
        // minor 0, a bogus pointer far outside the user region, length 16.
        let ret = unsafe { syscalls.dispatch(Number::Read as u32, [0, 1, 16, 0]) };
        assert_eq!(ret, Errno::Inval.as_syscall_return());
    }

    #[test]
    fn number_round_trips_through_raw() {
        for n in [
            Number::Exit,
            Number::ThreadCreate,
            Number::ThreadYield,
            Number::ThreadExit,
            Number::ThreadJoin,
            Number::Clock,
            Number::MutexInit,
            Number::MutexLock,
            Number::MutexUnlock,
            Number::MutexDestroy,
            Number::BarrierInit,
            Number::BarrierWait,
            Number::BarrierDestroy,
            Number::Sbrk,
            Number::Read,
            Number::Write,
            Number::CacheLineSize,
            Number::Shell,
        ] {
            assert_eq!(Number::from_raw(n as u32), Some(n));
        }
        assert_eq!(Number::from_raw(9999), None);
    }

    #[test]
    fn user_region_rejects_out_of_range_pointers() {
        let region = UserRegion {
            bottom: 0x1000,
            top: 0x2000,
        };
        assert!(region.validate(0x1000, 0x100).is_ok());
        assert!(region.validate(0x1f00, 0x200).is_err());
        assert!(region.validate(usize::MAX - 4, 16).is_err());
    }

    #[test]
    fn user_region_rejects_pointer_before_bottom() {
        let region = UserRegion {
            bottom: 0x1000,
            top: 0x2000,
        };
        assert!(region.validate(0x10, 0x4).is_err());
    }
}
