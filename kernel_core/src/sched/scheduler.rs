//! Scheduler table, election and the cooperative/preemptive switch path
//! (C6). Grounded on `kthread.c`'s `sched_elect`/`sched_switch` and
//! `thread_yield`/`thread_exit`/`thread_join`.

use alloc::sync::Arc;

use spin::Mutex;

use crate::errno::Errno;
use crate::memory::UserStackPool;
use crate::sched::thread::{ContextSwitch, Error as ThreadError, Thread, ThreadId, ThreadState, Trampoline};

/// Something that can tell the scheduler whether interrupts are currently
/// masked, and mask/unmask them: the idle loop in `elect`'s second pass
/// enables interrupts while it busy-waits for a `Ready` thread, per
/// `spec.md` §4.6, and disables them again before returning.
#[cfg_attr(test, mockall::automock)]
pub trait InterruptMask {
    /// Disables interrupt delivery on the current CPU.
    fn disable(&self);
    /// Enables interrupt delivery on the current CPU.
    fn enable(&self);
}

/// Errors surfaced by the scheduler that are not promoted to a panic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, snafu::Snafu)]
pub enum Error {
    /// The thread table has no free slot for a new thread.
    TooManyThreads,
    /// `join` named an id with no thread in the table.
    NoSuchThread,
}

impl Error {
    /// The syscall-visible errno for this condition.
    #[must_use]
    pub fn errno(self) -> Errno {
        match self {
            Error::TooManyThreads => Errno::Again,
            Error::NoSuchThread => Errno::Srch,
        }
    }
}

impl From<ThreadError> for Error {
    fn from(e: ThreadError) -> Self {
        match e {
            ThreadError::NoSuchThread => Error::NoSuchThread,
        }
    }
}

/// Result type for scheduler operations.
pub type Result<T> = core::result::Result<T, Error>;

/// One slot's worth of debug information, returned by [`Scheduler::dump`]
/// (`spec.md` §4.10's `shell` debug pointer), grounded on `sched_dump`.
#[derive(Debug, Clone, Copy)]
pub struct ThreadDump {
    /// The thread's id.
    pub id: ThreadId,
    /// Its current state.
    pub state: ThreadState,
    /// Its stored return value, meaningful once `Zombie` or `Dead`.
    pub retval: usize,
    /// The thread (if any) currently joined to it.
    pub join: Option<ThreadId>,
}

/// The thread table and the election/switch machinery over it.
///
/// `MAX_THREADS` bounds the fixed table (`spec.md` §3 "Scheduler table: a
/// fixed array of thread pointers indexed by thread-id"); `CS` is the
/// architecture's context save/restore mechanism.
pub struct Scheduler<CS: ContextSwitch, IM: InterruptMask, const MAX_THREADS: usize> {
    table: Mutex<[Option<Arc<Thread<CS::Context>>>; MAX_THREADS]>,
    current: Mutex<ThreadId>,
    irq: IM,
}

impl<CS: ContextSwitch, IM: InterruptMask, const MAX_THREADS: usize> Scheduler<CS, IM, MAX_THREADS> {
    /// Creates an empty scheduler over the given interrupt mask mechanism.
    /// The caller must insert an initial thread (e.g. via
    /// [`Scheduler::thread_create`]) before calling [`Scheduler::switch`].
    #[must_use]
    pub fn new(irq: IM) -> Self {
        Self {
            table: Mutex::new([const { None }; MAX_THREADS]),
            current: Mutex::new(0),
            irq,
        }
    }

    /// Allocates a user stack from `ustacks`, builds an initial context with
    /// `bootstrap` as entry point and the errno word as stack pointer, and
    /// inserts the new thread into the first free table slot
    /// (`thread_create`, `spec.md` §4.6).
    ///
    /// # Errors
    /// [`Error::TooManyThreads`] if the table has no free slot.
    pub fn thread_create(
        &self,
        ustacks: &UserStackPool,
        bootstrap: usize,
        entry: usize,
        arg: usize,
        trampoline: Trampoline,
    ) -> Result<Arc<Thread<CS::Context>>> {
        let ustack_top = ustacks
            .ustack_alloc()
            .map_err(|_| Error::TooManyThreads)?;
        let ustack_base = ustack_top; // top is the highest address + 1
        let errno_location = ustack_top - core::mem::size_of::<usize>();
        let ustack_end = errno_location;

        let mut table = self.table.lock();
        let id = table
            .iter()
            .position(Option::is_none)
            .ok_or(Error::TooManyThreads)? as ThreadId;

        let context = CS::init_context(bootstrap, errno_location);
        let thread = Arc::new(Thread::new(
            id,
            ustack_base,
            ustack_end,
            errno_location,
            entry,
            arg,
            trampoline,
            context,
        ));
        table[id as usize] = Some(thread.clone());
        Ok(thread)
    }

    /// Removes a `Dead` thread's table slot, freeing its id for reuse.
    pub fn reap_slot(&self, id: ThreadId) {
        self.table.lock()[id as usize] = None;
    }

    /// The currently running thread's id on this (single-CPU model's) CPU.
    #[must_use]
    pub fn current_id(&self) -> ThreadId {
        *self.current.lock()
    }

    /// The currently running thread.
    ///
    /// # Panics
    /// If the current id names an empty slot — an impossible scheduler
    /// state, per `spec.md` §7's fatal-condition policy.
    #[must_use]
    pub fn current(&self) -> Arc<Thread<CS::Context>> {
        let id = self.current_id();
        self.table.lock()[id as usize]
            .clone()
            .expect("current thread id names an empty table slot")
    }

    /// Chooses the next thread to run (`sched_elect`): one pass over the
    /// table starting just after the current thread with interrupts
    /// disabled, looking for a `Ready` thread; if none is found, interrupts
    /// are enabled and the scan continues until one appears, then interrupts
    /// are disabled again.
    ///
    /// Calling this from a preemption ISR is guaranteed to terminate on the
    /// first pass, since the preempted thread is itself `Ready` by then.
    pub fn elect(&self) -> ThreadId {
        let start = self.current_id();

        if let Some(id) = self.scan_once(start) {
            return id;
        }

        self.irq.enable();
        let id = loop {
            if let Some(id) = self.scan_once(start) {
                break id;
            }
        };
        self.irq.disable();
        id
    }

    fn scan_once(&self, start: ThreadId) -> Option<ThreadId> {
        let table = self.table.lock();
        let n = MAX_THREADS as ThreadId;
        let mut th = (start + 1) % n;
        loop {
            if let Some(t) = &table[th as usize] {
                if t.state() == ThreadState::Ready {
                    return Some(th);
                }
            }
            th = (th + 1) % n;
            if th == start {
                return None;
            }
        }
    }

    /// The cooperative/preemptive switch primitive (`sched_switch`): elects
    /// a target, and if it differs from the current thread, saves the
    /// current context and (on first return from save) loads the target's
    /// context. On the thread's later resumption, marks it `Running` and
    /// returns.
    ///
    /// # Safety
    /// Must be called with the current thread's context still live on the
    /// stack `save` will capture, i.e. from the scheduler's own call sites
    /// (`yield_`, `exit`, `wait`, `join`), never re-entrantly.
    pub unsafe fn switch(&self) {
        let target = self.elect();
        let current_id = self.current_id();

        if target != current_id {
            let current = self.current();
            let target_thread = self.table.lock()[target as usize]
                .clone()
                .expect("elect returned an empty slot");

            let resuming = {
                let ctx = &current.context as *const CS::Context as *mut CS::Context;
                CS::save(&mut *ctx)
            };
            if resuming {
                *self.current.lock() = target;
                CS::load(&target_thread.context);
            }
        }
        self.current().set_state(ThreadState::Running);
    }

    /// `thread_yield`: marks the current thread `Ready` and switches.
    ///
    /// # Safety
    /// Same requirements as [`Scheduler::switch`].
    pub unsafe fn yield_now(&self) {
        self.current().set_state(ThreadState::Ready);
        self.switch();
    }

    /// `thread_exit`: stores `retval`, marks the current thread `Zombie`,
    /// wakes a registered joiner if any, and switches away for good. Never
    /// returns.
    ///
    /// # Safety
    /// Same requirements as [`Scheduler::switch`].
    pub unsafe fn exit(&self, retval: usize) -> ! {
        let current = self.current();
        if let Some(joiner) = current.exit(retval) {
            if let Some(j) = self.table.lock()[joiner as usize].clone() {
                j.notify();
            }
        }
        self.switch();
        unreachable!("switch must not return to an exited thread");
    }

    /// `thread_join`: waits (if necessary) for `target` to become `Zombie`,
    /// then reaps its return value and marks it `Dead`.
    ///
    /// # Safety
    /// Same requirements as [`Scheduler::switch`].
    ///
    /// # Errors
    /// [`Error::NoSuchThread`] if `target` names an empty table slot.
    pub unsafe fn join(&self, target: ThreadId) -> Result<usize> {
        let target_thread = self.table.lock()[target as usize]
            .clone()
            .ok_or(Error::NoSuchThread)?;

        let current_id = self.current_id();
        let already_zombie = target_thread.register_joiner(current_id);
        if !already_zombie {
            self.current().set_state(ThreadState::Wait);
            self.switch();
        }
        Ok(target_thread.reap())
    }

    /// The wait/notify race-free primitives underlying [`crate::sync`]
    /// (`thread_wait`/`thread_notify`). `wait` switches away if the state
    /// transition actually left the thread `Wait`; if a racing `notify`
    /// already marked it `Ready`, the switch still runs (so the thread loses
    /// the current quantum) but will find the thread immediately electable.
    ///
    /// # Safety
    /// Same requirements as [`Scheduler::switch`].
    pub unsafe fn wait(&self) {
        self.current().wait();
        self.switch();
    }

    /// Marks `target` `Ready` regardless of its current state
    /// (`thread_notify`).
    pub fn notify(&self, target: ThreadId) {
        if let Some(t) = self.table.lock()[target as usize].clone() {
            t.notify();
        }
    }

    /// A debug snapshot of every occupied table slot, for the `shell`
    /// syscall's debug pointer.
    #[must_use]
    pub fn dump(&self) -> alloc::vec::Vec<ThreadDump> {
        self.table
            .lock()
            .iter()
            .filter_map(|slot| {
                slot.as_ref().map(|t| {
                    let (retval, join) = t.debug_snapshot();
                    ThreadDump {
                        id: t.id,
                        state: t.state(),
                        retval,
                        join,
                    }
                })
            })
            .collect()
    }
}

impl<CS: ContextSwitch, IM: InterruptMask + Default, const MAX_THREADS: usize> Default
    for Scheduler<CS, IM, MAX_THREADS>
{
    fn default() -> Self {
        Self::new(IM::default())
    }
}

impl<CS: ContextSwitch, IM: InterruptMask, const MAX_THREADS: usize> crate::sync::WaitNotify
    for Scheduler<CS, IM, MAX_THREADS>
{
    fn current_id(&self) -> ThreadId {
        self.current_id()
    }

    unsafe fn wait(&self) {
        self.wait();
    }

    fn notify(&self, target: ThreadId) {
        self.notify(target);
    }
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;
    use crate::config::KernelConfig;

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

    fn ustacks() -> UserStackPool {
        let cfg = KernelConfig {
            ustack_size: 4096,
            ..KernelConfig::default()
        };
        // A generous scratch region; leaked deliberately for test lifetime.
        let region = alloc::boxed::Box::leak(alloc::boxed::Box::new([0u8; 64 * 1024]));
        let base = region.as_mut_ptr() as usize;
        UserStackPool::new(base, base + region.len(), &cfg)
    }

    #[test]
    fn thread_create_inserts_ready_thread() {
        let sched: Scheduler<TestCS, NoopIrq, 4> = Scheduler::new(NoopIrq);
        let stacks = ustacks();
        let t = sched
            .thread_create(&stacks, 0x1000, 0x2000, 0, Trampoline::Kernel)
            .unwrap();
        assert_eq!(t.state(), ThreadState::Ready);
    }

    #[test]
    fn elect_finds_the_only_ready_thread() {
        let sched: Scheduler<TestCS, NoopIrq, 4> = Scheduler::new(NoopIrq);
        let stacks = ustacks();
        let t = sched
            .thread_create(&stacks, 0x1000, 0x2000, 0, Trampoline::Kernel)
            .unwrap();
        let chosen = sched.elect();
        assert_eq!(chosen, t.id);
    }

    #[test]
    fn table_full_is_too_many_threads() {
        let sched: Scheduler<TestCS, NoopIrq, 2> = Scheduler::new(NoopIrq);
        let stacks = ustacks();
        sched
            .thread_create(&stacks, 0, 0, 0, Trampoline::Kernel)
            .unwrap();
        sched
            .thread_create(&stacks, 0, 0, 0, Trampoline::Kernel)
            .unwrap();
        assert_eq!(
            sched
                .thread_create(&stacks, 0, 0, 0, Trampoline::Kernel)
                .unwrap_err(),
            Error::TooManyThreads
        );
    }

    #[test]
    fn join_on_already_zombie_thread_does_not_wait() {
        let sched: Scheduler<TestCS, NoopIrq, 4> = Scheduler::new(NoopIrq);
        let stacks = ustacks();
        let target = sched
            .thread_create(&stacks, 0, 0, 0, Trampoline::Kernel)
            .unwrap();
        target.set_state(ThreadState::Zombie);
        let retval = target.exit(99);
        assert!(retval.is_none());

        // current_id defaults to 0; make target distinct and join it
        // directly via the thread API rather than switching (no real CPU
        // context to resume in this test).
        let already_zombie = target.register_joiner(0);
        assert!(already_zombie);
        assert_eq!(target.reap(), 99);
        assert_eq!(target.state(), ThreadState::Dead);
    }
}
