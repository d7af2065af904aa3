//! The ko6 kernel core: memory management, scheduling, synchronization, device
//! discovery, block I/O and the virtual file system for a small multi-core
//! MIPS32-like teaching platform. See `SPEC_FULL.md` at the workspace root.
#![no_std]
#![deny(missing_docs)]

extern crate alloc;

#[cfg(all(test, not(target_os = "none")))]
#[macro_use]
extern crate std;

pub mod blockio;
pub mod boot;
pub mod config;
pub mod device;
pub mod errno;
pub mod logger;
pub mod memory;
pub mod platform;
pub mod sched;
pub mod sync;
pub mod syscall;
pub mod vfs;

#[cfg(test)]
mod tests {
    use std::prelude::rust_2021::*;

    #[test]
    fn it_works() {
        println!("hello from kernel_core tests");
        assert_eq!(2 + 2, 4);
    }
}
