//! Kernel boot sequence (C11): device discovery from the flattened device
//! tree, in the fixed order `spec.md` §4.11 requires.
//!
//! Grounded on `hal/soc/almo1-mips/soc.c` (and its RISC-V sibling
//! `hal/soc/qemu-virt-riscv/soc.c`): `soc_icu_init`/`soc_tty_init`/
//! `soc_dma_init`/`soc_bd_init`/`soc_timer_init` each do one full
//! `fdt_node_offset_by_compatible` scan of the blob, in that order, and for
//! every matching node read its `reg` and `interrupts` properties, allocate
//! a generic device entry and hand the base address to the driver. This
//! module owns the compatible-string classification and the discovery walk;
//! the page/slab/user-stack-pool setup that precedes it and the driver
//! construction, scheduler tick arming, root mount and init-thread creation
//! that follow it are assembled by `kernel::main`, since they need the
//! linker symbols and concrete MMIO drivers only the binary crate has
//! (`spec.md` §4.11's full order: page allocator → slab → user-stack pool →
//! device registry → scheduler → VFS core → mount root → init thread →
//! load context).

use byteorder::{BigEndian, ByteOrder as _};

use crate::device::{DeviceData, DeviceRegistry, DeviceTag};
use crate::platform::device_tree::{iter::NodePropertyIter, DeviceTree, StringList, Value};

/// Errors from the device discovery walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, snafu::Snafu)]
pub enum Error {
    /// The device registry ran out of slots partway through discovery.
    RegistryFull,
}

/// Result type for boot operations.
pub type Result<T> = core::result::Result<T, Error>;

/// The order `spec.md` §4.11 mandates devices are brought up in: "ICUs
/// first, then TTYs, then DMA, then block devices, timers last".
pub const DISCOVERY_ORDER: [DeviceTag; 5] = [
    DeviceTag::Icu,
    DeviceTag::Char,
    DeviceTag::Dma,
    DeviceTag::Block,
    DeviceTag::Timer,
];

/// Classifies a node's `compatible` string list against the known device
/// families (`spec.md` §6), including the RISC-V analogues the distillation
/// kept alongside the `soclib,*` ones.
#[must_use]
pub fn classify_compatible(list: &StringList) -> Option<DeviceTag> {
    const ICU: [&[u8]; 2] = [b"soclib,icu", b"riscv,plic0"];
    const CHAR: [&[u8]; 2] = [b"soclib,tty", b"ns16550a"];
    const TIMER: [&[u8]; 2] = [b"soclib,timer", b"sifive,clint0"];
    const DMA: [&[u8]; 1] = [b"soclib,dma"];
    const BLOCK: [&[u8]; 1] = [b"soclib,bd"];

    if ICU.iter().copied().any(|c| list.contains(c)) {
        Some(DeviceTag::Icu)
    } else if CHAR.iter().copied().any(|c| list.contains(c)) {
        Some(DeviceTag::Char)
    } else if TIMER.iter().copied().any(|c| list.contains(c)) {
        Some(DeviceTag::Timer)
    } else if DMA.iter().copied().any(|c| list.contains(c)) {
        Some(DeviceTag::Dma)
    } else if BLOCK.iter().copied().any(|c| list.contains(c)) {
        Some(DeviceTag::Block)
    } else {
        None
    }
}

/// A node's `compatible` tag, `reg` base address and (if present)
/// `interrupts` line, extracted in one pass over its properties.
struct NodeFields {
    tag: DeviceTag,
    base: usize,
    irq: Option<u32>,
}

fn node_fields(props: NodePropertyIter<'_>) -> Option<NodeFields> {
    let mut tag = None;
    let mut base = None;
    let mut irq = None;
    for (name, value) in props {
        match (name, value) {
            (b"compatible", Value::Strings(list)) => tag = classify_compatible(&list),
            (b"reg", Value::Registers(regs)) => base = regs.iter().next().map(|(addr, _)| addr),
            (b"interrupts", Value::Bytes(data)) if data.len() >= 4 => {
                irq = Some(BigEndian::read_u32(data));
            }
            _ => {}
        }
    }
    Some(NodeFields {
        tag: tag?,
        base: base?,
        irq,
    })
}

/// Walks the device tree once per tag in [`DISCOVERY_ORDER`] and registers
/// every matching node into `registry`, exactly mirroring `soc.c`'s
/// sequence of whole-tree scans (`spec.md` §4.11).
///
/// # Errors
/// [`Error::RegistryFull`] if a matching device is found after the registry
/// has no free slot remaining.
pub fn discover_devices<const MAX_DEVICES: usize>(
    dt: &DeviceTree,
    registry: &DeviceRegistry<MAX_DEVICES>,
) -> Result<()> {
    for &wanted in &DISCOVERY_ORDER {
        for (_name, props) in dt.iter_all_nodes() {
            let Some(fields) = node_fields(props) else {
                continue;
            };
            if fields.tag != wanted {
                continue;
            }
            let data = match fields.tag {
                DeviceTag::Block => DeviceData::Block {
                    base: fields.base,
                    logical_block_size: 0,
                },
                DeviceTag::Char => DeviceData::Char { base: fields.base },
                DeviceTag::Timer => DeviceData::Timer { base: fields.base },
                DeviceTag::Icu => DeviceData::Icu { base: fields.base },
                DeviceTag::Dma => DeviceData::Dma { base: fields.base },
            };
            let minor = registry
                .register(fields.tag, fields.irq, data)
                .map_err(|_| Error::RegistryFull)?;
            log::info!(
                "discovered {:?} minor {} at {:#x} (irq {:?})",
                fields.tag,
                minor,
                fields.base,
                fields.irq
            );
        }
    }
    Ok(())
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;

    fn strings(data: &[u8]) -> StringList<'_> {
        StringList { data }
    }

    #[test]
    fn classifies_soclib_compatibles() {
        assert_eq!(
            classify_compatible(&strings(b"soclib,icu\0")),
            Some(DeviceTag::Icu)
        );
        assert_eq!(
            classify_compatible(&strings(b"soclib,tty\0")),
            Some(DeviceTag::Char)
        );
        assert_eq!(
            classify_compatible(&strings(b"soclib,timer\0")),
            Some(DeviceTag::Timer)
        );
        assert_eq!(
            classify_compatible(&strings(b"soclib,dma\0")),
            Some(DeviceTag::Dma)
        );
        assert_eq!(
            classify_compatible(&strings(b"soclib,bd\0")),
            Some(DeviceTag::Block)
        );
    }

    #[test]
    fn classifies_riscv_analogues() {
        assert_eq!(
            classify_compatible(&strings(b"riscv,plic0\0")),
            Some(DeviceTag::Icu)
        );
        assert_eq!(
            classify_compatible(&strings(b"ns16550a\0")),
            Some(DeviceTag::Char)
        );
        assert_eq!(
            classify_compatible(&strings(b"sifive,clint0\0")),
            Some(DeviceTag::Timer)
        );
    }

    #[test]
    fn unknown_compatible_is_not_classified() {
        assert_eq!(classify_compatible(&strings(b"vendor,widget\0")), None);
    }

    #[test]
    fn discovery_order_matches_spec() {
        assert_eq!(
            DISCOVERY_ORDER,
            [
                DeviceTag::Icu,
                DeviceTag::Char,
                DeviceTag::Dma,
                DeviceTag::Block,
                DeviceTag::Timer,
            ]
        );
    }
}
