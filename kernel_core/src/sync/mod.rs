//! Synchronization primitives built on the scheduler's wait/notify race
//! (C7): a mutex with FIFO handoff, and a barrier.
//!
//! Grounded on `ksynchro.c`'s `thread_mutex_*`/`thread_barrier_*` API.
//! Spinlocks themselves are assumed HAL-provided (`spec.md` §4.7); here they
//! are `spin::Mutex`, matching every other lock in this crate.

pub mod barrier;
pub mod mutex;

pub use barrier::Barrier;
pub use mutex::Mutex;

use crate::sched::ThreadId;

/// What a mutex or barrier needs from the scheduler: the current thread's
/// id, and the wait/notify race-free handoff of `spec.md` §4.6. Kept
/// separate from [`crate::sched::Scheduler`]'s full interface so this
/// module's tests can mock just this much, the way the teacher mocks
/// `Scheduler`/`Switcher` independently of the rest of the kernel.
#[cfg_attr(test, mockall::automock)]
pub trait WaitNotify {
    /// The id of the thread currently calling in.
    fn current_id(&self) -> ThreadId;

    /// Parks the current thread (`thread_wait`): see
    /// [`crate::sched::Scheduler::wait`] for the exact race contract.
    ///
    /// # Safety
    /// Must only be called from a context where a context switch away from
    /// the caller is legal (i.e. not while holding a spinlock other than the
    /// one being released right before this call).
    unsafe fn wait(&self);

    /// Wakes `target` (`thread_notify`).
    fn notify(&self, target: ThreadId);
}

impl<T: WaitNotify + ?Sized> WaitNotify for &T {
    fn current_id(&self) -> ThreadId {
        (**self).current_id()
    }

    unsafe fn wait(&self) {
        (**self).wait();
    }

    fn notify(&self, target: ThreadId) {
        (**self).notify(target);
    }
}

impl<T: WaitNotify + ?Sized> WaitNotify for alloc::sync::Arc<T> {
    fn current_id(&self) -> ThreadId {
        (**self).current_id()
    }

    unsafe fn wait(&self) {
        (**self).wait();
    }

    fn notify(&self, target: ThreadId) {
        (**self).notify(target);
    }
}
