//! Block device MMIO register layout (`spec.md` §6), grounded on
//! `src/soft/hal/devices/blockdev/soclib-bd.c`.
//!
//! Only the layout and the enumerations are modeled here; actual volatile
//! register access is behind [`super::BlockDevice`] so the cache can be
//! exercised against a mock, the way the teacher keeps `uart`/`timer` behind
//! traits in `kernel_core` and puts the real MMIO driver in the `kernel`
//! binary crate.

/// Register offsets (in 32-bit words) from a block device's MMIO base.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    /// Buffer pointer for the pending transaction.
    BufferAddr = 0,
    /// Physical block address to transfer at.
    PhysicalBlockAddr = 1,
    /// Number of physical blocks to transfer.
    BlockCount = 2,
    /// Operation code; writing this register starts the transaction.
    Op = 3,
    /// Transaction status.
    Status = 4,
    /// IRQ enable.
    IrqEnable = 5,
    /// Disk size, in physical blocks.
    Size = 6,
    /// Physical block size, in bytes.
    BlockSize = 7,
}

impl Register {
    /// Byte offset of this register from the device's MMIO base.
    #[must_use]
    pub const fn byte_offset(self) -> usize {
        (self as u32 as usize) * core::mem::size_of::<u32>()
    }
}

/// Operation codes written to [`Register::Op`] to start a transaction.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// No operation pending.
    Noop = 0,
    /// Read physical blocks into the buffer.
    Read = 1,
    /// Write physical blocks from the buffer.
    Write = 2,
}

/// Status values read from [`Register::Status`].
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// No transaction in progress.
    Idle = 0,
    /// A transaction is in progress.
    Busy = 1,
    /// The last read completed successfully.
    ReadSuccess = 2,
    /// The last write completed successfully.
    WriteSuccess = 3,
    /// The last read failed.
    ReadError = 4,
    /// The last write failed.
    WriteError = 5,
    /// A generic error occurred.
    Error = 6,
}

impl Status {
    /// Decodes a raw register value into a [`Status`], if it names one.
    #[must_use]
    pub fn from_raw(v: u32) -> Option<Self> {
        Some(match v {
            0 => Status::Idle,
            1 => Status::Busy,
            2 => Status::ReadSuccess,
            3 => Status::WriteSuccess,
            4 => Status::ReadError,
            5 => Status::WriteError,
            6 => Status::Error,
            _ => return None,
        })
    }

    /// Whether this status reports a failed transaction.
    #[must_use]
    pub fn is_error(self) -> bool {
        matches!(self, Status::ReadError | Status::WriteError | Status::Error)
    }
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;

    #[test]
    fn register_offsets_are_word_sized_and_ordered() {
        assert_eq!(Register::BufferAddr.byte_offset(), 0);
        assert_eq!(Register::PhysicalBlockAddr.byte_offset(), 4);
        assert_eq!(Register::BlockSize.byte_offset(), 28);
    }

    #[test]
    fn status_round_trips_through_raw() {
        for s in [
            Status::Idle,
            Status::Busy,
            Status::ReadSuccess,
            Status::WriteSuccess,
            Status::ReadError,
            Status::WriteError,
            Status::Error,
        ] {
            assert_eq!(Status::from_raw(s as u32), Some(s));
        }
        assert_eq!(Status::from_raw(99), None);
    }

    #[test]
    fn error_statuses_are_flagged() {
        assert!(Status::ReadError.is_error());
        assert!(Status::WriteError.is_error());
        assert!(Status::Error.is_error());
        assert!(!Status::ReadSuccess.is_error());
    }
}
