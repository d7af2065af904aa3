//! Device discovery (C4) and interrupt routing (C5).
//!
//! Grounded on `kdev.h`'s generic device list (`dev_alloc`/`dev_free`/
//! `dev_get`/`dev_next_minor`) and `kirq.c`'s per-line ISR table, with the
//! device-tree walk of `spec.md` §6 driving registration at boot.

pub mod irq;
pub mod registry;

pub use irq::IrqRouter;
pub use registry::{DeviceData, DeviceRegistry, DeviceTag};
