//! MIPS32 context switch and interrupt masking: the one piece of the
//! scheduler that cannot be ordinary Rust (`spec.md` §9 "Coroutine-style
//! control flow").
//!
//! Grounded on `hal/cpu/mips/threadc.c`'s `thread_context_init` (status
//! register presets, return address and stack pointer) and `hal/hcpu.h`'s
//! `thread_context_save`/`thread_context_load` contract: `save` returns `1`
//! the first time it is called and, later, some other thread's `load` of the
//! same context makes it appear to return `0` a second time, by restoring
//! the callee-saved registers — including `$ra` — it stashed on the first
//! call and jumping to them. The asm trampolines only move registers in and
//! out of memory; everything else is ordinary Rust.

use kernel_core::sched::scheduler::InterruptMask;
use kernel_core::sched::thread::ContextSwitch;

/// A MIPS32 thread's saved register context: the eight callee-saved `$s`
/// registers, `$gp`, `$fp`, `$ra`, `$sp`, and the CP0 status register
/// (`$12`), in the order the asm trampolines below read and write them.
#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct Context {
    callee_saved: [u32; 10],
    ra: u32,
    sp: u32,
    status: u32,
}

const OFFSET_RA: usize = 10 * 4;
const OFFSET_SP: usize = 11 * 4;
const OFFSET_STATUS: usize = 12 * 4;
const _: () = assert!(core::mem::size_of::<Context>() == OFFSET_STATUS + 4);

/// CP0 status register preset for a freshly created thread: `IE=1` (global
/// interrupt enable), `EXL=1` (the bootstrap path returns as if from an
/// exception, matching `eret`'s expectations), `HWI0` unmasked. Whether the
/// thread ends up in user or kernel mode is decided by `launch`, not by this
/// preset, since [`ContextSwitch::init_context`] is not told the thread's
/// [`kernel_core::sched::thread::Trampoline`].
const INITIAL_STATUS: u32 = 0x403;

core::arch::global_asm!(
    ".set noreorder",
    ".global mips32_context_save",
    ".type mips32_context_save, @function",
    "mips32_context_save:",
    "    sw   $s0, 0($a0)",
    "    sw   $s1, 4($a0)",
    "    sw   $s2, 8($a0)",
    "    sw   $s3, 12($a0)",
    "    sw   $s4, 16($a0)",
    "    sw   $s5, 20($a0)",
    "    sw   $s6, 24($a0)",
    "    sw   $s7, 28($a0)",
    "    sw   $gp, 32($a0)",
    "    sw   $fp, 36($a0)",
    "    sw   $ra, 40($a0)",
    "    sw   $sp, 44($a0)",
    "    mfc0 $t0, $12",
    "    sw   $t0, 48($a0)",
    "    li   $v0, 1",
    "    jr   $ra",
    "    nop",
    ".global mips32_context_load",
    ".type mips32_context_load, @function",
    "mips32_context_load:",
    "    lw   $s0, 0($a0)",
    "    lw   $s1, 4($a0)",
    "    lw   $s2, 8($a0)",
    "    lw   $s3, 12($a0)",
    "    lw   $s4, 16($a0)",
    "    lw   $s5, 20($a0)",
    "    lw   $s6, 24($a0)",
    "    lw   $s7, 28($a0)",
    "    lw   $gp, 32($a0)",
    "    lw   $fp, 36($a0)",
    "    lw   $ra, 40($a0)",
    "    lw   $sp, 44($a0)",
    "    lw   $t0, 48($a0)",
    "    mtc0 $t0, $12",
    "    li   $v0, 0",
    "    jr   $ra",
    "    nop",
    ".set reorder",
);

extern "C" {
    /// Stashes the caller's callee-saved registers into `*ctx` and returns
    /// `1`. Implemented in `global_asm!` above.
    fn mips32_context_save(ctx: *mut Context) -> i32;
    /// Restores `*ctx` and jumps to its saved `$ra`, making that jump look
    /// like a second, `0`-valued return from the matching
    /// `mips32_context_save` call (or, for a thread that has never run,
    /// jumping to [`ContextSwitch::init_context`]'s `bootstrap` instead).
    fn mips32_context_load(ctx: *const Context) -> !;
}

/// The MIPS32 [`ContextSwitch`] implementation.
pub struct Mips32Switch;

impl ContextSwitch for Mips32Switch {
    type Context = Context;

    fn init_context(bootstrap: usize, stack_pointer: usize) -> Self::Context {
        Context {
            callee_saved: [0; 10],
            ra: bootstrap as u32,
            sp: stack_pointer as u32,
            status: INITIAL_STATUS,
        }
    }

    unsafe fn save(context: &mut Self::Context) -> bool {
        mips32_context_save(context) != 0
    }

    unsafe fn load(context: &Self::Context) -> ! {
        mips32_context_load(context)
    }
}

/// The MIPS32 [`InterruptMask`] implementation: CP0 status register `IE`
/// bit, toggled with the `di`/`ei` pseudo-instructions.
pub struct Mips32InterruptMask;

impl InterruptMask for Mips32InterruptMask {
    fn disable(&self) {
        unsafe {
            core::arch::asm!("di");
        }
    }

    fn enable(&self) {
        unsafe {
            core::arch::asm!("ei");
        }
    }
}
