//! MIPS32 exception entry: the Rust half of `start.S`'s
//! `mips_exception_vector` stub.
//!
//! The stub saves every caller-saved register onto the interrupted thread's
//! own kernel stack (the same stack [`kernel_core::sched::thread::Thread`]'s
//! embedded page provides) and calls [`mips_trap_dispatch`] with the CP0
//! `Cause`/`EPC` registers and a pointer to that spilled frame. An interrupt
//! (`ExcCode == 0`) is routed to [`crate::handle_interrupt`], which asks the
//! IRQ router to find and call the registered driver ISR (`spec.md` §4.5) —
//! for the timer, that ISR calls
//! [`kernel_core::sched::Scheduler::yield_now`], which may itself switch to
//! a different thread's context without this function, or the assembly stub
//! that called it, ever returning normally; the next time this thread is
//! elected, it resumes here exactly as if the call to [`handle_interrupt`]
//! had returned, because the switch restored this thread's own `$sp` along
//! with its other callee-saved registers. A syscall (`ExcCode == 8`, the
//! `syscall` instruction) is routed to [`crate::syscalls`]'s
//! [`kernel_core::syscall::Syscalls::dispatch`] (`spec.md` §4.10), reading
//! the syscall number and up to four arguments out of the frame's spilled
//! `$v0`/`$a0`-`$a3` exactly as user code placed them before trapping, and
//! writing the return value back into the frame's `$v0` slot so it is
//! restored into the live register on `eret`. Any other exception code is a
//! fault this kernel does not attempt to recover from.

use crate::platform::cp0::Cause;

/// Offsets, in words, of `$v0`/`$a0`-`$a3` within the frame
/// `mips_exception_vector` spills to the stack before calling here.
const FRAME_V0: usize = 1;
const FRAME_A0: usize = 3;
const FRAME_A1: usize = 4;
const FRAME_A2: usize = 5;
const FRAME_A3: usize = 6;

/// Called from `mips_exception_vector` with the raw CP0 `Cause`/`EPC`
/// register values sampled at entry and a pointer to the spilled register
/// frame. Returns the EPC the assembly stub should resume at: `epc`
/// unchanged for an interrupt, `epc + 4` for a syscall (so the trapping
/// `syscall` instruction itself is not re-executed).
///
/// # Safety
/// Must only be called from `start.S`'s exception vector, with the
/// interrupted context's caller-saved registers already spilled to `frame`.
#[no_mangle]
pub unsafe extern "C" fn mips_trap_dispatch(cause: u32, epc: u32, frame: *mut u32) -> u32 {
    let cause = Cause(cause);
    let exc_code = cause.exc_code();
    if exc_code.is_interrupt() {
        crate::handle_interrupt();
        epc
    } else if exc_code.is_system_call() {
        let number = *frame.add(FRAME_V0);
        let args = [
            *frame.add(FRAME_A0) as usize,
            *frame.add(FRAME_A1) as usize,
            *frame.add(FRAME_A2) as usize,
            *frame.add(FRAME_A3) as usize,
        ];
        let ret = crate::syscalls().dispatch(number, args);
        *frame.add(FRAME_V0) = ret as u32;
        epc + 4
    } else {
        panic!("unhandled MIPS32 exception: {exc_code:?} cause={cause:?} epc={epc:#x}");
    }
}
