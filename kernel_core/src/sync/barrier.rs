//! A reusable thread barrier (C7).
//!
//! Grounded on `ksynchro.c`'s `thread_barrier_s`/`thread_barrier_wait`: a
//! fixed `expected` count and a `waiting` counter under a spinlock. The
//! thread that brings `waiting` up to `expected` wakes every other waiter
//! and resets the counter to zero without itself going to sleep; every
//! other arrival appends itself to the wait list and parks.

use alloc::collections::VecDeque;

use crate::errno::Errno;
use crate::sched::ThreadId;
use crate::sync::WaitNotify;

struct Inner {
    expected: usize,
    waiting: usize,
    wait: VecDeque<ThreadId>,
}

/// A barrier that releases all waiters together once `expected` threads have
/// called [`Barrier::wait`].
pub struct Barrier<WN> {
    wn: WN,
    inner: spin::Mutex<Inner>,
}

/// Errors from barrier operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, snafu::Snafu)]
pub enum Error {
    /// `destroy` (or a reinitializing `new`) was attempted while threads were
    /// still parked on the barrier.
    Busy,
}

impl Error {
    /// The syscall-visible errno for this condition.
    #[must_use]
    pub fn errno(self) -> Errno {
        match self {
            Error::Busy => Errno::Busy,
        }
    }
}

/// Result type for barrier operations.
pub type Result<T> = core::result::Result<T, Error>;

impl<WN: WaitNotify> Barrier<WN> {
    /// Creates a barrier that releases every `expected`-th arrival.
    #[must_use]
    pub fn new(wn: WN, expected: usize) -> Self {
        Self {
            wn,
            inner: spin::Mutex::new(Inner {
                expected,
                waiting: 0,
                wait: VecDeque::new(),
            }),
        }
    }

    /// Blocks until `expected` threads (across all callers sharing this
    /// barrier) have called `wait`, then releases them all together. The
    /// thread that completes the count returns immediately without parking.
    pub fn wait(&self) {
        let current = self.wn.current_id();
        let mut inner = self.inner.lock();
        inner.waiting += 1;
        if inner.waiting == inner.expected {
            inner.waiting = 0;
            let woken: alloc::vec::Vec<ThreadId> = inner.wait.drain(..).collect();
            drop(inner);
            for id in woken {
                self.wn.notify(id);
            }
            return;
        }
        inner.wait.push_back(current);
        drop(inner);
        // SAFETY: the spinlock is released before parking; the last arrival
        // wakes every entry in `wait` before returning.
        unsafe {
            self.wn.wait();
        }
    }

    /// Rejects destruction while threads remain parked on the barrier
    /// (`thread_barrier_destroy`'s `EBUSY` check).
    ///
    /// # Errors
    /// [`Error::Busy`] if any thread is currently waiting.
    pub fn destroy(self) -> Result<()> {
        if self.inner.lock().waiting != 0 {
            return Err(Error::Busy);
        }
        Ok(())
    }
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;
    use crate::sync::MockWaitNotify;

    #[test]
    fn last_arrival_releases_without_waiting_and_notifies_others() {
        let mut wn = MockWaitNotify::new();
        wn.expect_current_id().return_const(3u32);
        wn.expect_notify().withf(|&t| t == 1 || t == 2).returning(|_| ());
        // The last arrival must never call wait().
        wn.expect_wait().times(0).returning(|| ());
        let b = Barrier::new(wn, 3);

        {
            let mut inner = b.inner.lock();
            inner.waiting = 2;
            inner.wait.push_back(1);
            inner.wait.push_back(2);
        }
        b.wait();

        let inner = b.inner.lock();
        assert_eq!(inner.waiting, 0);
        assert!(inner.wait.is_empty());
    }

    #[test]
    fn non_final_arrival_parks() {
        let mut wn = MockWaitNotify::new();
        wn.expect_current_id().return_const(1u32);
        wn.expect_wait().times(1).returning(|| ());
        let b: Barrier<MockWaitNotify> = Barrier::new(wn, 2);

        b.wait();
        let inner = b.inner.lock();
        assert_eq!(inner.waiting, 1);
        assert_eq!(inner.wait.len(), 1);
    }

    #[test]
    fn destroy_rejects_busy_barrier() {
        let b: Barrier<MockWaitNotify> = Barrier::new(MockWaitNotify::new(), 2);
        b.inner.lock().waiting = 1;
        assert_eq!(b.destroy(), Err(Error::Busy));
    }
}
