//! A kernel mutex with FIFO wait-list handoff (C7).
//!
//! Grounded on `ksynchro.c`'s `thread_mutex_s`/`thread_mutex_lock`/
//! `thread_mutex_unlock`: a spinlock-protected `busy` flag plus owner and a
//! wait list. `lock` on an already-busy mutex appends the caller to the wait
//! list and parks; `unlock` hands the mutex directly to the head of the wait
//! list (transferring ownership before waking it) rather than simply
//! clearing `busy`, so a lock release is always paired with exactly one
//! winner.

use alloc::collections::VecDeque;

use crate::errno::Errno;
use crate::sched::ThreadId;
use crate::sync::WaitNotify;

struct Inner {
    busy: bool,
    owner: Option<ThreadId>,
    wait: VecDeque<ThreadId>,
}

/// A mutual-exclusion lock, parking waiters on the scheduler rather than
/// spinning.
pub struct Mutex<WN> {
    wn: WN,
    inner: spin::Mutex<Inner>,
}

/// Errors from mutex operations (`ksynchro.c`'s `thread_mutex_lock`/`unlock`
/// error returns).
#[derive(Debug, Clone, Copy, PartialEq, Eq, snafu::Snafu)]
pub enum Error {
    /// The calling thread already owns this mutex.
    WouldDeadlock,
    /// `unlock` called on a mutex that is not currently locked.
    NotLocked,
    /// `unlock` called by a thread other than the current owner.
    NotOwner,
    /// `destroy` called while the mutex is still held.
    Busy,
}

impl Error {
    /// The syscall-visible errno for this condition.
    #[must_use]
    pub fn errno(self) -> Errno {
        match self {
            Error::WouldDeadlock => Errno::DeadLk,
            Error::NotLocked => Errno::Inval,
            Error::NotOwner => Errno::Perm,
            Error::Busy => Errno::Busy,
        }
    }
}

/// Result type for mutex operations.
pub type Result<T> = core::result::Result<T, Error>;

impl<WN: WaitNotify> Mutex<WN> {
    /// Creates an unlocked mutex.
    #[must_use]
    pub fn new(wn: WN) -> Self {
        Self {
            wn,
            inner: spin::Mutex::new(Inner {
                busy: false,
                owner: None,
                wait: VecDeque::new(),
            }),
        }
    }

    /// Acquires the mutex, parking the calling thread if it is already held.
    ///
    /// # Errors
    /// [`Error::WouldDeadlock`] if the calling thread already owns this
    /// mutex.
    pub fn lock(&self) -> Result<()> {
        let current = self.wn.current_id();
        loop {
            let mut inner = self.inner.lock();
            if inner.owner == Some(current) {
                return Err(Error::WouldDeadlock);
            }
            if !inner.busy {
                inner.busy = true;
                inner.owner = Some(current);
                return Ok(());
            }
            inner.wait.push_back(current);
            drop(inner);
            // SAFETY: the spinlock above is released before waiting, and
            // `unlock` wakes us only after installing us as the new owner.
            unsafe {
                self.wn.wait();
            }
            // We may have been woken spuriously by a notify meant to settle
            // the scheduler race rather than hand us the mutex; only treat
            // this as success if we are actually the recorded owner.
            if self.inner.lock().owner == Some(current) {
                return Ok(());
            }
        }
    }

    /// Releases the mutex, handing it directly to the next waiter (if any).
    ///
    /// # Errors
    /// [`Error::NotLocked`] if the mutex is not currently held, or
    /// [`Error::NotOwner`] if the calling thread does not hold it.
    pub fn unlock(&self) -> Result<()> {
        let current = self.wn.current_id();
        let mut inner = self.inner.lock();
        if !inner.busy {
            return Err(Error::NotLocked);
        }
        if inner.owner != Some(current) {
            return Err(Error::NotOwner);
        }
        if let Some(next) = inner.wait.pop_front() {
            inner.owner = Some(next);
            drop(inner);
            self.wn.notify(next);
        } else {
            inner.busy = false;
            inner.owner = None;
        }
        Ok(())
    }

    /// Consumes the mutex, rejecting destruction while it is held
    /// (`thread_mutex_destroy`'s `EBUSY` check).
    ///
    /// # Errors
    /// [`Error::Busy`] if the mutex is currently locked.
    pub fn destroy(self) -> Result<()> {
        if self.inner.lock().busy {
            return Err(Error::Busy);
        }
        Ok(())
    }
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;
    use crate::sync::MockWaitNotify;

    fn wn_for(id: ThreadId) -> MockWaitNotify {
        let mut wn = MockWaitNotify::new();
        wn.expect_current_id().returning(move || id);
        wn
    }

    #[test]
    fn lock_then_unlock_round_trips() {
        let m = Mutex::new(wn_for(1));
        m.lock().unwrap();
        m.unlock().unwrap();
    }

    #[test]
    fn relocking_same_thread_is_deadlock() {
        let m = Mutex::new(wn_for(1));
        m.lock().unwrap();
        assert_eq!(m.lock(), Err(Error::WouldDeadlock));
    }

    #[test]
    fn unlock_while_free_is_einval() {
        let m = Mutex::new(wn_for(1));
        assert_eq!(m.unlock(), Err(Error::NotLocked));
    }

    #[test]
    fn unlock_by_non_owner_is_eperm() {
        // Owner is thread 1; a mock reporting thread 2 tries to unlock.
        let mut wn = MockWaitNotify::new();
        wn.expect_current_id().return_const(1u32);
        let m = Mutex::new(wn);
        m.lock().unwrap();

        let mut other = MockWaitNotify::new();
        other.expect_current_id().return_const(2u32);
        let m2 = Mutex { wn: other, inner: m.inner };
        assert_eq!(m2.unlock(), Err(Error::NotOwner));
    }

    #[test]
    fn unlock_with_waiter_transfers_ownership_without_clearing_busy() {
        let mut wn = MockWaitNotify::new();
        wn.expect_current_id().return_const(1u32);
        wn.expect_wait().returning(|| ());
        wn.expect_notify().withf(|&t| t == 2).returning(|_| ());
        let m = Mutex::new(wn);

        m.lock().unwrap();
        {
            let mut inner = m.inner.lock();
            inner.wait.push_back(2);
        }
        m.unlock().unwrap();

        let inner = m.inner.lock();
        assert!(inner.busy);
        assert_eq!(inner.owner, Some(2));
    }

    #[test]
    fn destroying_a_locked_mutex_is_busy() {
        let m = Mutex::new(wn_for(1));
        m.lock().unwrap();
        assert_eq!(m.destroy(), Err(Error::Busy));
    }

    #[test]
    fn destroying_a_free_mutex_succeeds() {
        let m = Mutex::new(wn_for(1));
        assert_eq!(m.destroy(), Ok(()));
    }
}
