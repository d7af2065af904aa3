//! IRQ routing (C5): maps each IRQ line to an ISR and a driver cookie.
//!
//! Grounded on `kirq.c`'s fixed-size vector of `(isr, cookie)` pairs indexed
//! by IRQ line. The low-level trap handler asks the per-CPU
//! [`InterruptController`] for the highest-priority pending line, then
//! dispatches to the registered callback. An unregistered line is a kernel
//! panic naming the offending line, per `spec.md` §4.5/§7.

/// A driver's interrupt service routine: takes an opaque cookie chosen at
/// registration time and performs whatever device-specific acknowledgement
/// and work the interrupt requires.
pub type Isr = fn(cookie: usize);

/// Something that can report which IRQ line is the highest-priority pending
/// one, and be told to acknowledge a line once serviced
/// (`spec.md` §4.5: "acknowledged by the driver-specific ISR", but the
/// controller itself must still be asked which line fired).
#[cfg_attr(test, mockall::automock)]
pub trait InterruptController {
    /// Returns the highest-priority currently pending IRQ line, if any.
    fn pending(&self) -> Option<u32>;
}

#[derive(Clone, Copy)]
struct Entry {
    isr: Isr,
    cookie: usize,
}

/// A fixed-size table mapping IRQ line number to `(isr, cookie)`.
///
/// `MAX_LINES` bounds the table to the platform's interrupt controller's
/// number of lines (`spec.md` §6's `reg`/`interrupts` properties never name a
/// line at or past this bound on a conforming device tree).
pub struct IrqRouter<const MAX_LINES: usize> {
    table: spin::Mutex<[Option<Entry>; MAX_LINES]>,
}

impl<const MAX_LINES: usize> IrqRouter<MAX_LINES> {
    /// Creates a router with every line unregistered.
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: spin::Mutex::new([None; MAX_LINES]),
        }
    }

    /// Registers (or overwrites) the handler for `irq` (`register_interrupt`).
    ///
    /// # Panics
    /// If `irq` is not a valid line index for this platform — `spec.md` §7
    /// names an impossible IRQ line as fatal.
    pub fn register(&self, irq: u32, isr: Isr, cookie: usize) {
        let mut table = self.table.lock();
        let slot = table
            .get_mut(irq as usize)
            .unwrap_or_else(|| panic!("register_interrupt: impossible IRQ line {irq}"));
        *slot = Some(Entry { isr, cookie });
    }

    /// Dispatches the highest-priority pending line reported by `controller`
    /// to its registered ISR.
    ///
    /// # Panics
    /// If the controller reports a line with no registered ISR, or a line
    /// index out of range — both are the "impossible IRQ line" fatal
    /// condition of `spec.md` §7.
    pub fn dispatch(&self, controller: &impl InterruptController) {
        let Some(irq) = controller.pending() else {
            return;
        };
        let entry = {
            let table = self.table.lock();
            *table
                .get(irq as usize)
                .unwrap_or_else(|| panic!("unregistered IRQ line {irq}"))
        };
        let entry = entry.unwrap_or_else(|| panic!("unregistered IRQ line {irq}"));
        (entry.isr)(entry.cookie);
    }
}

impl<const MAX_LINES: usize> Default for IrqRouter<MAX_LINES> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicUsize, Ordering};

    static HITS: AtomicUsize = AtomicUsize::new(0);

    fn isr(cookie: usize) {
        HITS.fetch_add(cookie, Ordering::Relaxed);
    }

    #[test]
    fn dispatch_calls_registered_isr_with_its_cookie() {
        HITS.store(0, Ordering::Relaxed);
        let router: IrqRouter<8> = IrqRouter::new();
        router.register(3, isr, 42);

        let mut ctl = MockInterruptController::new();
        ctl.expect_pending().returning(|| Some(3));
        router.dispatch(&ctl);

        assert_eq!(HITS.load(Ordering::Relaxed), 42);
    }

    #[test]
    fn no_pending_line_dispatches_nothing() {
        HITS.store(0, Ordering::Relaxed);
        let router: IrqRouter<8> = IrqRouter::new();
        router.register(0, isr, 1);

        let mut ctl = MockInterruptController::new();
        ctl.expect_pending().returning(|| None);
        router.dispatch(&ctl);

        assert_eq!(HITS.load(Ordering::Relaxed), 0);
    }

    #[test]
    #[should_panic(expected = "unregistered IRQ line")]
    fn unregistered_line_panics() {
        let router: IrqRouter<8> = IrqRouter::new();
        let mut ctl = MockInterruptController::new();
        ctl.expect_pending().returning(|| Some(5));
        router.dispatch(&ctl);
    }

    #[test]
    #[should_panic(expected = "impossible IRQ line")]
    fn registering_out_of_range_line_panics() {
        let router: IrqRouter<4> = IrqRouter::new();
        router.register(10, isr, 0);
    }
}
