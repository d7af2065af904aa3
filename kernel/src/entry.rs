//! First-run trampoline for a newly created thread (`spec.md` §4.6
//! "`bootstrap`"/"`launch`"), and the user-mode entry path `thread_create`
//! hands off to.
//!
//! [`ContextSwitch::init_context`] plants `bootstrap`'s address as the saved
//! `$ra` of a thread that has never run; the first `load` of that context
//! jumps here instead of returning from a real `save`. `bootstrap` marks the
//! thread `Running` (the scheduler created it `Ready` and never itself flips
//! a thread to `Running` outside of `switch`) and falls through to `launch`,
//! which dispatches on the thread's [`Trampoline`] and never returns: kernel
//! threads call their entry point directly and exit with its return value,
//! user threads drop to user mode at `entry` with `arg` in the calling
//! convention's first argument register.

use kernel_core::sched::thread::Trampoline;

use crate::platform::cp0;

/// Entered by [`crate::platform::mips_switch::mips32_context_load`] the first
/// time a thread's context is loaded. Never returns.
///
/// # Safety
/// Must only be reached by loading a context [`ContextSwitch::init_context`]
/// produced with this function's address as `bootstrap`.
#[no_mangle]
pub unsafe extern "C" fn bootstrap() -> ! {
    let scheduler = crate::scheduler();
    let current = scheduler.current();
    current.set_state(kernel_core::sched::thread::ThreadState::Running);
    launch(current.entry, current.arg, current.trampoline)
}

/// Dispatches a freshly-scheduled thread to its entry point. Never returns.
fn launch(entry: usize, arg: usize, trampoline: Trampoline) -> ! {
    match trampoline {
        Trampoline::Kernel => {
            let f: extern "C" fn(usize) -> usize = unsafe { core::mem::transmute(entry) };
            let retval = f(arg);
            unsafe { crate::scheduler().exit(retval) }
        }
        Trampoline::User => unsafe { enter_user_mode(entry, arg) },
    }
}

/// Drops to user mode at `entry`, with `arg` in `$a0` and an `eret` off the
/// exception stack the context switch left us on.
///
/// [`Mips32Switch::init_context`] cannot itself tell a user thread's status
/// preset from a kernel thread's (it is never told the thread's
/// [`Trampoline`]), so it always presets `UM=0`; this function sets the
/// [`cp0::Status`] `UM` bit itself, matching `thread_context_init`'s
/// `0x413` vs `kthread_context_init`'s `0x403` in `hal/cpu/mips/threadc.c`
/// (the two differ only in that bit).
///
/// # Safety
/// `entry` must be a valid user-mode instruction address and `arg` must be
/// whatever value the caller intends the new thread to see in its first
/// argument register; this function does not, and cannot, validate either.
unsafe fn enter_user_mode(entry: usize, arg: usize) -> ! {
    let mut status = cp0::read_status();
    status.set_um(true);
    cp0::write_status(status);
    core::arch::asm!(
        "mtc0 {entry}, $14",   // CP0 EPC <- entry
        "move $a0, {arg}",
        "eret",
        entry = in(reg) entry,
        arg = in(reg) arg,
        options(noreturn),
    );
}
