//! `soclib,bd` driver: [`BlockDevice`] for the block device register
//! protocol named in `kernel_core::blockio::device` (`spec.md` §6).
//!
//! Grounded on `hal/devices/blockdev/soclib-bd.c`'s `soclib_bd_read`/
//! `soclib_bd_write`: write the buffer pointer, physical block address and
//! physical block count, then the op code (which starts the transaction),
//! and poll `status` until it leaves `BUSY`. The logical-to-physical block
//! ratio (`ppb`) is probed once from the device's reported physical block
//! size at construction time, exactly as `soclib_bd_init` computes it.

use kernel_core::blockio::device::{Op, Register, Status};
use kernel_core::blockio::{BlockDevice, Error};

/// One `soclib,bd` channel, fixed at a logical block size chosen by the
/// kernel (`spec.md` §3 Block device: "Logical blocks are whole multiples of
/// the hardware physical block").
pub struct SoclibBd {
    base: *mut u32,
    minor: u8,
    logical_block_size: usize,
    /// Physical blocks per logical block (`soclib_bd_init`'s `ppb`).
    ppb: u32,
}

unsafe impl Send for SoclibBd {}
unsafe impl Sync for SoclibBd {}

impl SoclibBd {
    /// Probes the device at `base` and fixes its logical block size.
    ///
    /// # Panics
    /// If `logical_block_size` is not a whole multiple of the device's
    /// reported physical block size.
    #[must_use]
    pub fn new(base: usize, minor: u8, logical_block_size: usize) -> Self {
        let base = base as *mut u32;
        let physical_block_size =
            unsafe { base.byte_add(Register::BlockSize.byte_offset()).read_volatile() };
        assert!(physical_block_size > 0, "block device reports zero block size");
        assert!(
            logical_block_size % physical_block_size as usize == 0,
            "logical block size must be a multiple of the physical block size"
        );
        let ppb = (logical_block_size / physical_block_size as usize) as u32;
        Self {
            base,
            minor,
            logical_block_size,
            ppb,
        }
    }

    fn reg(&self, r: Register) -> *mut u32 {
        unsafe { self.base.byte_add(r.byte_offset()) }
    }

    fn wait_while_busy(&self) -> Status {
        loop {
            let raw = unsafe { self.reg(Register::Status).read_volatile() };
            match Status::from_raw(raw) {
                Some(Status::Busy) => continue,
                Some(s) => return s,
                None => return Status::Error,
            }
        }
    }

    fn transact(&self, lba: u64, buf: *mut u8, op: Op) -> core::result::Result<(), Error> {
        unsafe {
            self.reg(Register::BufferAddr).write_volatile(buf as u32);
            self.reg(Register::PhysicalBlockAddr)
                .write_volatile(lba as u32 * self.ppb);
            self.reg(Register::BlockCount).write_volatile(self.ppb);
            self.reg(Register::Op).write_volatile(op as u32);
        }
        let status = self.wait_while_busy();
        if status.is_error() {
            Err(Error::Io)
        } else {
            Ok(())
        }
    }
}

impl BlockDevice for SoclibBd {
    fn minor(&self) -> u8 {
        self.minor
    }

    fn logical_block_size(&self) -> usize {
        self.logical_block_size
    }

    fn read(&self, lba: u64, buf: &mut [u8]) -> core::result::Result<(), Error> {
        debug_assert_eq!(buf.len(), self.logical_block_size);
        self.transact(lba, buf.as_mut_ptr(), Op::Read)
    }

    fn write(&self, lba: u64, buf: &[u8]) -> core::result::Result<(), Error> {
        debug_assert_eq!(buf.len(), self.logical_block_size);
        self.transact(lba, buf.as_ptr().cast_mut(), Op::Write)
    }
}

/// Acknowledges a `soclib,bd` IRQ by reading the status register, lowering
/// the interrupt line (`soclib_bd_isr`).
pub fn acknowledge_irq(base: usize) {
    let regs = base as *mut u32;
    unsafe {
        let _ = regs
            .byte_add(Register::Status.byte_offset())
            .read_volatile();
    }
}
