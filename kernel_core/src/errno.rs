//! Kernel-wide error numbers.
//!
//! These mirror the error kinds named in the system design: every syscall
//! returns either a non-negative success value or the negation of one of
//! these as an `isize`, and every fallible kernel-internal operation that is
//! not promoted to a panic returns one of these wrapped in a module-specific
//! error enum.

use core::fmt;

/// A kernel error number.
///
/// The numeric values are chosen to match the classic UNIX `errno.h` values
/// that the C sources this kernel is modeled on use, so that a user program's
/// `errno` observes the same numbers it would under the original kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Errno {
    /// Operation not permitted (wrong owner, etc).
    Perm = 1,
    /// No such file or directory / inode / mount entry.
    NoEnt = 2,
    /// I/O error.
    Io = 5,
    /// No such process or thread.
    Srch = 3,
    /// Interrupted operation.
    Intr = 4,
    /// Try again / not enough resources right now.
    Again = 11,
    /// Out of memory.
    NoMem = 12,
    /// Resource busy.
    Busy = 16,
    /// Entry already exists.
    Exist = 17,
    /// Invalid argument.
    Inval = 22,
    /// No space left on device.
    NoSpc = 28,
    /// Value out of representable range.
    Range = 34,
    /// Resource deadlock would occur.
    DeadLk = 35,
    /// Function not implemented.
    NoSys = 38,
}

impl Errno {
    /// The raw numeric value of this error, as would be stored in `errno`.
    #[must_use]
    pub const fn code(self) -> i32 {
        self as i32
    }

    /// The value a syscall should return to report this error: the negated
    /// code, so that callers can test `retval < 0` for failure.
    #[must_use]
    pub const fn as_syscall_return(self) -> isize {
        -(self.code() as isize)
    }

    /// A short human readable message, used by the panic/dump paths.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Errno::Perm => "operation not permitted",
            Errno::NoEnt => "no such file or directory",
            Errno::Io => "input/output error",
            Errno::Srch => "no such process",
            Errno::Intr => "interrupted",
            Errno::Again => "resource temporarily unavailable",
            Errno::NoMem => "out of memory",
            Errno::Busy => "device or resource busy",
            Errno::Exist => "entry already exists",
            Errno::Inval => "invalid argument",
            Errno::NoSpc => "no space left",
            Errno::Range => "result out of range",
            Errno::DeadLk => "resource deadlock avoided",
            Errno::NoSys => "function not implemented",
        }
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

#[cfg(test)]
mod tests {
    use super::Errno;

    #[test]
    fn syscall_return_is_negative_of_code() {
        assert_eq!(Errno::Inval.as_syscall_return(), -22);
        assert_eq!(Errno::Busy.as_syscall_return(), -16);
    }

    #[test]
    fn every_errno_has_a_message() {
        for e in [
            Errno::Perm,
            Errno::NoEnt,
            Errno::Io,
            Errno::Srch,
            Errno::Intr,
            Errno::Again,
            Errno::NoMem,
            Errno::Busy,
            Errno::Exist,
            Errno::Inval,
            Errno::NoSpc,
            Errno::Range,
            Errno::DeadLk,
            Errno::NoSys,
        ] {
            assert!(!e.message().is_empty());
        }
    }
}
