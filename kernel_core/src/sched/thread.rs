//! A single thread of control (C6 data model).
//!
//! Grounded on `kthread.h`'s `struct thread_s`: the fields below are exactly
//! the ones named there, minus the embedded kernel stack and page placement,
//! which are a property of *where* the `kernel` binary crate allocates a
//! `Thread` from (a whole page drawn from [`crate::memory::PageAllocator`]),
//! not of the portable state machine modeled here.

use spin::Mutex;

use crate::errno::Errno;

/// A thread identifier: its index into the scheduler table.
pub type ThreadId = u32;

/// Lifecycle state of a thread (`spec.md` §3 Thread).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Currently executing on some CPU.
    Running,
    /// Runnable, waiting for `elect` to choose it.
    Ready,
    /// Blocked on a resource (mutex, barrier, join, device read).
    Wait,
    /// Has called `exit` but not yet been joined.
    Zombie,
    /// Has been joined; eligible for reuse of its table slot.
    Dead,
}

/// Where a newly created thread's initial context should transfer control:
/// straight into kernel code, or across the user/kernel boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trampoline {
    /// `launch` stays in kernel mode and calls the entry function directly.
    Kernel,
    /// `launch` crosses into user mode before calling the entry function.
    User,
}

/// Fields protected by the thread's own spinlock: exactly the ones the
/// wait/notify race (`spec.md` §4.6) and `join`/`exit` need to update
/// atomically with respect to a notifier running on another CPU.
pub struct Guarded {
    /// Current lifecycle state.
    pub state: ThreadState,
    /// The thread that has called `join` on us, if any.
    pub join: Option<ThreadId>,
    /// Value passed to `exit`, readable by our joiner once we are `Zombie`.
    pub retval: usize,
}

/// A thread of execution. `Ctx` is the architecture-specific saved register
/// context, opaque to this module and manipulated only through
/// [`ContextSwitch`].
pub struct Thread<Ctx> {
    /// This thread's index into the scheduler table.
    pub id: ThreadId,
    /// Base (lowest) address of this thread's user stack.
    pub ustack_base: usize,
    /// End (one past highest usable address) of this thread's user stack.
    pub ustack_end: usize,
    /// Address of the per-thread `errno` word, the first word of the user
    /// stack (`spec.md` §3).
    pub errno_location: usize,
    /// Entry function pointer (the user/kernel function this thread runs),
    /// stored as a raw address since its calling convention depends on
    /// `trampoline`.
    pub entry: usize,
    /// Argument passed to `entry`.
    pub arg: usize,
    /// How `launch` should invoke `entry`.
    pub trampoline: Trampoline,
    /// Saved register context, installed at creation time with a return
    /// address of `bootstrap` and swapped in/out by [`ContextSwitch`].
    pub context: Ctx,
    /// Fields requiring the thread lock to read or mutate.
    guarded: Mutex<Guarded>,
}

impl<Ctx> Thread<Ctx> {
    /// Creates a new thread in the `Ready` state with the given context,
    /// already initialized by the caller (normally via [`ContextSwitch`]) to
    /// resume at `bootstrap` with `errno_location` as its stack pointer.
    pub fn new(
        id: ThreadId,
        ustack_base: usize,
        ustack_end: usize,
        errno_location: usize,
        entry: usize,
        arg: usize,
        trampoline: Trampoline,
        context: Ctx,
    ) -> Self {
        Self {
            id,
            ustack_base,
            ustack_end,
            errno_location,
            entry,
            arg,
            trampoline,
            context,
            guarded: Mutex::new(Guarded {
                state: ThreadState::Ready,
                join: None,
                retval: 0,
            }),
        }
    }

    /// The thread's current state.
    #[must_use]
    pub fn state(&self) -> ThreadState {
        self.guarded.lock().state
    }

    /// Unconditionally sets the thread's state. Used by `elect`/`yield`/
    /// `exit`/`join`, which are the only callers allowed to move a thread
    /// between states outside the wait/notify race window.
    pub fn set_state(&self, state: ThreadState) {
        self.guarded.lock().state = state;
    }

    /// The wait/notify race-free transition to `Wait` (`spec.md` §4.6):
    /// only takes effect if the thread is still `Running`, i.e. no
    /// [`Thread::notify`] has raced ahead of us. Returns the state that
    /// resulted, so the caller can decide whether a context switch is
    /// actually necessary.
    #[must_use]
    pub fn wait(&self) -> ThreadState {
        let mut g = self.guarded.lock();
        if g.state == ThreadState::Running {
            g.state = ThreadState::Wait;
        }
        g.state
    }

    /// The other half of the race: unconditionally marks the thread
    /// `Ready`, whether it is still `Running` (notify arrived first) or
    /// already `Wait` (notify arrived second).
    pub fn notify(&self) {
        self.guarded.lock().state = ThreadState::Ready;
    }

    /// Records `retval` and transitions to `Zombie`, returning the joiner to
    /// wake (if one had already registered) under the single lock acquire
    /// `spec.md` requires to avoid the exit/join race.
    #[must_use]
    pub fn exit(&self, retval: usize) -> Option<ThreadId> {
        let mut g = self.guarded.lock();
        g.retval = retval;
        g.state = ThreadState::Zombie;
        g.join
    }

    /// Registers `joiner` as waiting for us and reports whether we are
    /// already `Zombie` (in which case the caller must not wait), under one
    /// lock acquire matching `thread_join`'s critical section.
    #[must_use]
    pub fn register_joiner(&self, joiner: ThreadId) -> bool {
        let mut g = self.guarded.lock();
        g.join = Some(joiner);
        g.state == ThreadState::Zombie
    }

    /// The value stored by a prior `exit`, and transitions to `Dead`
    /// (`thread_join`'s final step).
    #[must_use]
    pub fn reap(&self) -> usize {
        let mut g = self.guarded.lock();
        g.state = ThreadState::Dead;
        g.retval
    }

    /// A read-only snapshot of `(retval, join)`, for debug dumps
    /// (`sched_dump`); does not mutate state.
    #[must_use]
    pub fn debug_snapshot(&self) -> (usize, Option<ThreadId>) {
        let g = self.guarded.lock();
        (g.retval, g.join)
    }
}

/// Errors surfaced by thread-lifecycle operations that are not promoted to a
/// panic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, snafu::Snafu)]
pub enum Error {
    /// `join` named a thread id with no live thread in that slot.
    NoSuchThread,
}

impl Error {
    /// The syscall-visible errno for this condition.
    #[must_use]
    pub fn errno(self) -> Errno {
        match self {
            Error::NoSuchThread => Errno::Srch,
        }
    }
}

/// Architecture-specific context save/restore, the one piece of this module
/// that cannot be ordinary Rust (`spec.md` §9 "Coroutine-style control
/// flow"): `save` returns twice, once immediately (truthy) when called, and
/// once more (falsy) when some later `load` of the same context resumes this
/// thread. `load` never returns to its caller.
///
/// Implemented by the `kernel` binary crate with a handwritten trampoline;
/// exercised here through `mockall` the way the teacher mocks `Switcher`.
#[cfg_attr(test, mockall::automock)]
pub trait ContextSwitch {
    /// The saved register context type for this architecture.
    type Context;

    /// Builds the initial context for a new thread: `bootstrap` is the
    /// return address, `stack_pointer` the initial stack pointer.
    fn init_context(bootstrap: usize, stack_pointer: usize) -> Self::Context;

    /// Saves the current register state into `context`.
    ///
    /// # Safety
    /// Must only be called from the scheduler's `switch` path.
    ///
    /// # Returns
    /// `true` the first time it returns (the thread is being suspended),
    /// `false` the second time (some `load` of this context resumed it).
    unsafe fn save(context: &mut Self::Context) -> bool;

    /// Restores `context` and resumes it; never returns.
    ///
    /// # Safety
    /// Must only be called from the scheduler's `switch` path, immediately
    /// after a truthy [`ContextSwitch::save`] of the outgoing thread.
    unsafe fn load(context: &Self::Context) -> !;
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;

    fn new_thread(id: ThreadId) -> Thread<()> {
        Thread::new(id, 0x1000, 0x2000, 0x1ffc, 0, 0, Trampoline::Kernel, ())
    }

    #[test]
    fn new_thread_is_ready() {
        let t = new_thread(0);
        assert_eq!(t.state(), ThreadState::Ready);
    }

    #[test]
    fn wait_only_applies_from_running() {
        let t = new_thread(0);
        t.set_state(ThreadState::Running);
        assert_eq!(t.wait(), ThreadState::Wait);
    }

    #[test]
    fn notify_before_wait_wins_the_race() {
        // spec.md §4.6: if notify() lands between the decision to wait and
        // the wait() state store, the thread must end up READY, not stuck
        // in WAIT forever.
        let t = new_thread(0);
        t.set_state(ThreadState::Running);
        t.notify(); // races ahead
        assert_eq!(t.wait(), ThreadState::Ready);
    }

    #[test]
    fn exit_then_join_reports_retval_and_goes_dead() {
        let t = new_thread(0);
        t.set_state(ThreadState::Running);
        let joiner = t.exit(42);
        assert_eq!(joiner, None);
        assert_eq!(t.state(), ThreadState::Zombie);
        assert_eq!(t.reap(), 42);
        assert_eq!(t.state(), ThreadState::Dead);
    }

    #[test]
    fn register_joiner_reports_whether_already_zombie() {
        let t = new_thread(0);
        t.set_state(ThreadState::Running);
        assert!(!t.register_joiner(7));
        t.exit(1);
        // a second joiner arriving after exit sees Zombie immediately
        assert!(t.register_joiner(8));
    }
}
