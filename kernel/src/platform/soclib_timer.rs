//! `soclib,timer` driver: arms the periodic tick that drives preemption
//! (`spec.md` §4.11 "scheduler with a periodic tick from a timer device").
//!
//! Grounded on SoCLib's `vci_timer` register pair: writing `PERIOD` both sets
//! the countdown value in cycles and (re)starts it; any write to `RESETIRQ`
//! acknowledges the pending interrupt and lets the countdown restart from
//! `PERIOD`.

const REG_PERIOD: usize = 0;
const REG_RESETIRQ: usize = 1;

/// One `soclib,timer` channel.
pub struct SoclibTimer {
    base: *mut u32,
}

unsafe impl Send for SoclibTimer {}
unsafe impl Sync for SoclibTimer {}

impl SoclibTimer {
    /// Wraps the timer discovered at `base`.
    #[must_use]
    pub fn new(base: usize) -> Self {
        Self {
            base: base as *mut u32,
        }
    }

    /// Arms the timer to raise its interrupt every `quantum` cycles
    /// (`KernelConfig::quantum`).
    pub fn arm(&self, quantum: u64) {
        unsafe {
            self.base
                .add(REG_PERIOD)
                .write_volatile(quantum as u32);
        }
    }

    /// Acknowledges the pending tick interrupt, restarting the countdown.
    pub fn acknowledge(&self) {
        unsafe {
            self.base.add(REG_RESETIRQ).write_volatile(0);
        }
    }
}
