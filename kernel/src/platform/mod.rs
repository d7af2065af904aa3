//! Platform glue for the `soclib`-based MIPS32 teaching board: the concrete
//! MMIO drivers and the architecture-specific context switch that
//! `kernel_core`'s traits (`BlockDevice`, `CharDevice`, `InterruptController`,
//! `ContextSwitch`, `InterruptMask`) are implemented against here, in the
//! binary crate, since they need linker symbols and raw register access
//! `kernel_core` deliberately stays free of.

pub mod bss;
pub mod cp0;
pub mod mips_switch;
pub mod soclib_bd;
pub mod soclib_icu;
pub mod soclib_timer;
pub mod soclib_uart;
