//! CP0 `Cause` and `Status` register bit layouts.
//!
//! Modeled the way the teacher's `ExceptionSyndromeRegister` models the
//! ARM64 ESR (`exception/mod.rs`) and its `TimerControlRegister` models
//! `CNTP_CTL_EL0` (`timer.rs`): a `bitfield!` wrapper over the raw register
//! value, read with `mfc0`/written with `mtc0` around the small bit of raw
//! asm that must stay raw.

bitfield::bitfield! {
    /// The CP0 `Cause` register (`mfc0 $13`), sampled at every exception
    /// entry to decide what trapped.
    pub struct Cause(u32);
    impl Debug;
    u8;
    pub bd, _: 31;
    u8, into ExcCode, pub exc_code, _: 6, 2;
}

/// The five-bit `ExcCode` field of [`Cause`]: which exception class
/// trapped, the MIPS32 analogue of the teacher's `ExceptionClass`.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ExcCode(u8);

impl From<u8> for ExcCode {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

impl ExcCode {
    /// `Int`: a hardware interrupt, not a fault or a syscall.
    #[inline]
    pub fn is_interrupt(&self) -> bool {
        self.0 == 0
    }

    /// `Sys`: the `syscall` instruction.
    #[inline]
    pub fn is_system_call(&self) -> bool {
        self.0 == 8
    }
}

impl core::fmt::Debug for ExcCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

bitfield::bitfield! {
    /// The CP0 `Status` register (`mfc0`/`mtc0 $12`): global interrupt
    /// enable, exception level, and the `UM` bit that decides whether
    /// `eret` drops into user or kernel mode.
    pub struct Status(u32);
    impl Debug;
    u8;
    pub ie, _: 0;
    pub exl, _: 1;
    pub um, set_um: 4;
}

/// Reads the live CP0 `Status` register.
#[inline]
pub fn read_status() -> Status {
    let value: u32;
    unsafe {
        core::arch::asm!("mfc0 {0}, $12", out(reg) value);
    }
    Status(value)
}

/// Writes `status` to the live CP0 `Status` register.
///
/// # Safety
/// The caller must be prepared for whatever the new interrupt-enable,
/// exception-level and user-mode bits imply for the instructions that
/// follow.
#[inline]
pub unsafe fn write_status(status: Status) {
    core::arch::asm!("mtc0 {0}, $12", in(reg) status.0);
}
