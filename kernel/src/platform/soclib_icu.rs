//! `soclib,icu` driver: [`InterruptController`] for the priority interrupt
//! controller the IRQ router asks to pick a pending line (`spec.md` §4.5).
//!
//! Grounded on SoCLib's `vci_icu` component: a single `IT_VECTOR` register
//! returns the index of the highest-priority currently asserted input, or an
//! all-ones sentinel when nothing is pending.

use kernel_core::device::irq::InterruptController;

const REG_IT_VECTOR: usize = 0;
const NO_IRQ: u32 = u32::MAX;

/// The platform's interrupt controller.
pub struct SoclibIcu {
    base: *mut u32,
}

unsafe impl Send for SoclibIcu {}
unsafe impl Sync for SoclibIcu {}

impl SoclibIcu {
    /// Wraps the ICU discovered at `base`.
    #[must_use]
    pub fn new(base: usize) -> Self {
        Self {
            base: base as *mut u32,
        }
    }
}

impl InterruptController for SoclibIcu {
    fn pending(&self) -> Option<u32> {
        let v = unsafe { self.base.add(REG_IT_VECTOR).read_volatile() };
        if v == NO_IRQ {
            None
        } else {
            Some(v)
        }
    }
}
