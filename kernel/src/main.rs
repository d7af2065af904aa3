#![no_std]
#![no_main]

extern crate alloc;

mod entry;
mod platform;
mod trap;

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::alloc::{GlobalAlloc, Layout};

use log::{debug, info};
use spin::once::Once;

use kernel_core::blockio::BlockIoCache;
use kernel_core::config::{KernelConfig, PAGE_SIZE};
use kernel_core::device::irq::InterruptController;
use kernel_core::device::{DeviceData, DeviceRegistry, DeviceTag, IrqRouter};
use kernel_core::logger::{GlobalValueReader, GlobalValues, Logger};
use kernel_core::memory::{PageAllocator, SlabAllocator, UserStackPool};
use kernel_core::platform::device_tree::{DeviceTree, Value};
use kernel_core::sched::thread::{ContextSwitch, Trampoline};
use kernel_core::sched::Scheduler;
use kernel_core::syscall::{CharDevice, Syscalls, UserRegion};
use kernel_core::vfs::minfs::MinFs;
use kernel_core::vfs::Vfs;

use platform::mips_switch::{Mips32InterruptMask, Mips32Switch};
use platform::soclib_bd::SoclibBd;
use platform::soclib_icu::SoclibIcu;
use platform::soclib_timer::SoclibTimer;
use platform::soclib_uart::SoclibUart;

core::arch::global_asm!(include_str!("./start.S"));

/// Generic bounds for the fixed-capacity `kernel_core` tables, sized for
/// the reference `almo1`/`soclib` platform this binary targets (`spec.md`
/// §4.11, `kernel_core::config::KernelConfig::default`).
const MAX_THREADS: usize = 64;
const MAX_PAGES: usize = 16384; // 64 MiB at PAGE_SIZE
const MAX_CLASSES: usize = 256;
const MAX_DEVICES: usize = 32;
const MAX_MOUNTS: usize = 16;
const MAX_INODES: usize = 256;
const MAX_TYPES: usize = 4;
const IRQ_LINES: usize = 32;

/// The concrete scheduler type this platform's `ContextSwitch`/
/// `InterruptMask` implementations instantiate.
pub type PlatformScheduler = Scheduler<Mips32Switch, Mips32InterruptMask, MAX_THREADS>;

static PAGE_ALLOCATOR: Once<PageAllocator<MAX_PAGES>> = Once::new();
static SLAB: Once<SlabAllocator<'static, MAX_PAGES, MAX_CLASSES>> = Once::new();
static USTACKS: Once<UserStackPool> = Once::new();
static DEVICES: Once<DeviceRegistry<MAX_DEVICES>> = Once::new();
static IRQS: Once<IrqRouter<IRQ_LINES>> = Once::new();
static SCHEDULER: Once<PlatformScheduler> = Once::new();
static VFS: Once<Vfs<MAX_TYPES, MAX_MOUNTS, MAX_INODES>> = Once::new();
static CONFIG: Once<KernelConfig> = Once::new();

static ICU: Once<SoclibIcu> = Once::new();
static TIMER: Once<SoclibTimer> = Once::new();
static BLOCK_DEV: Once<SoclibBd> = Once::new();
static BLOCK_CACHE: Once<BlockIoCache<'static, MAX_PAGES>> = Once::new();
static TTYS: Once<Vec<SoclibUart>> = Once::new();
static TTY_REFS: Once<&'static [&'static dyn CharDevice]> = Once::new();

type PlatformSyscalls = Syscalls<
    'static,
    Mips32Switch,
    Mips32InterruptMask,
    MAX_THREADS,
    MAX_PAGES,
    MAX_CLASSES,
>;
static SYSCALLS: Once<PlatformSyscalls> = Once::new();

/// The global Rust heap: forwards to [`SLAB`] once it exists. A separate
/// unit type rather than implementing `GlobalAlloc` on `SlabAllocator`
/// directly, since the slab allocator itself cannot be constructed until
/// the memory region is known from the device tree, long after this static
/// must already be registered.
struct GlobalSlab;

unsafe impl GlobalAlloc for GlobalSlab {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        SLAB.wait().alloc(layout)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        SLAB.wait().dealloc(ptr, layout)
    }
}

#[global_allocator]
static ALLOCATOR: GlobalSlab = GlobalSlab;

/// Returns the scheduler, for use by [`entry::bootstrap`] and the trap
/// dispatcher, both of which run long after boot has initialized it.
///
/// # Panics
/// If called before [`kmain`] has initialized the scheduler.
pub fn scheduler() -> &'static PlatformScheduler {
    SCHEDULER.wait()
}

/// Returns the syscall dispatcher, for use by the trap path.
///
/// # Panics
/// If called before [`kmain`] has initialized it.
pub fn syscalls() -> &'static PlatformSyscalls {
    SYSCALLS.wait()
}

/// Reads the free-running cycle counter and this core's id for the logger
/// and the `clock` syscall, grounded on `hal/cpu/mips/hwi.h`'s `CP0_COUNT`
/// convention (the timer channel runs off the same counter).
struct SystemGlobalValueReader;

impl GlobalValueReader for SystemGlobalValueReader {
    fn read() -> GlobalValues {
        let mut counter: u32;
        unsafe {
            core::arch::asm!("mfc0 {0}, $9", out(reg) counter);
        }
        GlobalValues {
            core_id: 0,
            timer_counter: u64::from(counter),
        }
    }
}

static LOGGER: Once<Logger<SoclibUart, SystemGlobalValueReader>> = Once::new();

fn find_memory_region(dt: &DeviceTree) -> (usize, usize) {
    for (name, props) in dt.iter_all_nodes() {
        if !name.starts_with(b"memory") {
            continue;
        }
        for (pname, value) in props {
            if pname == b"reg" {
                if let Value::Registers(regs) = value {
                    if let Some((addr, size)) = regs.iter().next() {
                        return (addr, size);
                    }
                }
            }
        }
    }
    panic!("device tree has no memory node");
}

fn round_up(v: usize, to: usize) -> usize {
    (v + to - 1) & !(to - 1)
}

/// Locates the device of `tag` discovered first (lowest minor) in
/// `registry`, if any.
fn first_of(registry: &DeviceRegistry<MAX_DEVICES>, tag: DeviceTag) -> Option<DeviceData> {
    let mut found = None;
    registry.for_each(tag, |entry| {
        if found.is_none() {
            found = Some(entry.data);
        }
    });
    found
}

/// Entered from `start.S` once the stack is set up, with `$a0` carrying the
/// address of the flattened device tree blob the bootloader placed in
/// memory. Brings up C1 through C11 in the order `spec.md` §4.11 mandates
/// and loads the init thread's context. Never returns.
#[no_mangle]
pub extern "C" fn kmain(device_tree_blob: *mut u8) -> ! {
    unsafe {
        platform::bss::zero_bss_section();
    }

    let dt = unsafe { DeviceTree::from_memory(device_tree_blob) };
    let config = *CONFIG.call_once(KernelConfig::default);

    // C1: page allocator, over the region above the kernel image and the
    // device tree blob, per `kmemkernel.c`'s convention of handing whatever
    // is left after the static image to the page pool.
    let (mem_base, mem_size) = find_memory_region(&dt);
    let kernel_end = unsafe { platform::bss::kernel_end() };
    let dt_end = device_tree_blob as usize + dt.size_of_blob();
    let pool_base = round_up(kernel_end.max(dt_end), PAGE_SIZE);
    let pool_end = mem_base + mem_size;
    let num_pages = (pool_end - pool_base) / PAGE_SIZE;

    let pages = PAGE_ALLOCATOR
        .call_once(|| unsafe { PageAllocator::new(pool_base as *mut u8, num_pages) });

    // C2: slab allocator, also the global heap from this point on.
    SLAB.call_once(|| SlabAllocator::new(pages, &config));

    // C3: user-stack pool, carved from the top of the same region (a flat
    // physical address space, per `spec.md`'s "no process model" scope).
    let user_region_bottom = pool_base;
    let user_region_top = pool_end;
    USTACKS.call_once(|| UserStackPool::new(user_region_bottom, user_region_top, &config));

    // C4: device registry, populated by one pass per tag over the tree.
    let registry = DEVICES.call_once(DeviceRegistry::new);
    kernel_core::boot::discover_devices(&dt, registry).expect("device discovery");

    let icu_base = first_of(registry, DeviceTag::Icu)
        .map(|d| d.base())
        .expect("no icu found");
    ICU.call_once(|| SoclibIcu::new(icu_base));

    let mut ttys = Vec::new();
    registry.for_each(DeviceTag::Char, |entry| {
        ttys.push(SoclibUart::new(entry.data.base(), entry.minor as u8));
    });
    let ttys = TTYS.call_once(|| ttys);

    // Bring up logging as soon as a tty exists, the same point `soc.c`'s
    // discovery order makes one available (TTYs come right after the ICU).
    let console_base = first_of(registry, DeviceTag::Char).map(|d| d.base()).unwrap_or(0);
    log::set_max_level(log::LevelFilter::max());
    log::set_logger(
        LOGGER.call_once(|| Logger::new(SoclibUart::new(console_base, 0), log::LevelFilter::max())) as _,
    )
    .expect("install logger");

    info!(
        "\x1b[1mko6\x1b[0m v{} (git: {}@{})",
        env!("CARGO_PKG_VERSION"),
        env!("VERGEN_GIT_BRANCH"),
        env!("VERGEN_GIT_SHA"),
    );
    debug!("Build timestamp: {}", env!("VERGEN_BUILD_TIMESTAMP"));
    debug!(
        "memory region {mem_base:#x}..{:#x}, page pool {pool_base:#x}..{pool_end:#x} ({num_pages} pages)",
        mem_base + mem_size
    );

    let tty_refs: Vec<&'static dyn CharDevice> =
        ttys.iter().map(|t| t as &dyn CharDevice).collect();
    let tty_refs = TTY_REFS.call_once(|| Vec::leak(tty_refs) as &'static [&'static dyn CharDevice]);

    let timer_base = first_of(registry, DeviceTag::Timer)
        .map(|d| d.base())
        .expect("no timer found");
    let timer = TIMER.call_once(|| SoclibTimer::new(timer_base));

    let block_data = first_of(registry, DeviceTag::Block).expect("no block device found");
    let block_dev = BLOCK_DEV.call_once(|| SoclibBd::new(block_data.base(), 0, 512));
    let block_cache = BLOCK_CACHE.call_once(|| BlockIoCache::new(pages));

    // C5: interrupt routing. The timer tick preempts via the scheduler;
    // the block device's completion interrupt only needs acknowledging,
    // since `BlockIoCache` polls for completion synchronously (`spec.md`
    // §3's "busy-wait for completion" block device model).
    let irqs: &IrqRouter<IRQ_LINES> = IRQS.call_once(IrqRouter::new);
    if let Some(irq) = registry.get(DeviceTag::Timer, 0).and_then(|d| d.irq) {
        irqs.register(irq, timer_isr, 0);
    }
    if let Some(irq) = registry.get(DeviceTag::Block, 0).and_then(|d| d.irq) {
        irqs.register(irq, block_isr, block_data.base());
    }

    // C6: scheduler, armed to preempt every `quantum` cycles.
    let scheduler = SCHEDULER.call_once(|| Scheduler::new(Mips32InterruptMask));
    timer.arm(config.quantum);

    // C9: VFS core, root mounted on block device minor 0.
    let vfs = VFS.call_once(Vfs::new);
    vfs.register_fs(Arc::new(MinFs) as Arc<dyn kernel_core::vfs::fs::FileSystemOps>)
        .expect("register minfs");
    vfs.mount_root("minfs", block_dev, block_cache)
        .expect("mount root filesystem");

    // C10: syscall dispatcher, over the subsystems just assembled.
    let ustacks = USTACKS.wait();
    let user_region = UserRegion {
        bottom: user_region_bottom,
        top: user_region_top,
    };
    SYSCALLS.call_once(|| {
        Syscalls::new(
            scheduler,
            ustacks,
            SLAB.wait(),
            tty_refs,
            user_region,
            CONFIG.wait(),
            syscall_clock,
        )
    });

    // C11: create the init thread and load its context. Never returns.
    let init = scheduler
        .thread_create(
            ustacks,
            entry::bootstrap as usize,
            init_thread as usize,
            0,
            Trampoline::Kernel,
        )
        .expect("create init thread");

    info!("booted, starting init thread {}", init.id);

    unsafe { Mips32Switch::load(&init.context) }
}

/// The init thread's entry point. `spec.md` explicitly scopes out the
/// interactive shell and the ELF loader; this just confirms the root
/// filesystem is reachable and hands off by exiting, leaving the rest of
/// the table to whatever threads a real user program would create.
extern "C" fn init_thread(_arg: usize) -> usize {
    let vfs = VFS.wait();
    match vfs.open(None, "/") {
        Ok(_) => info!("root filesystem mounted"),
        Err(e) => info!("root filesystem lookup failed: {e:?}"),
    }
    0
}

/// The `clock` syscall's cycle-counter source: the same `CP0_COUNT` read
/// the logger uses, without the core id [`SystemGlobalValueReader`] also
/// bundles.
fn syscall_clock() -> u64 {
    let counter: u32;
    unsafe {
        core::arch::asm!("mfc0 {0}, $9", out(reg) counter);
    }
    u64::from(counter)
}

/// Timer tick ISR: acknowledges the interrupt and preempts the current
/// thread.
fn timer_isr(_cookie: usize) {
    TIMER.wait().acknowledge();
    unsafe { scheduler().yield_now() };
}

/// Block device completion ISR: just acknowledges, since
/// [`kernel_core::blockio::BlockIoCache`] polls status synchronously rather
/// than waiting on the interrupt.
fn block_isr(cookie: usize) {
    platform::soclib_bd::acknowledge_irq(cookie);
}

/// Services a pending interrupt, dispatching through [`IRQS`] to whichever
/// ISR `kmain` registered for the line [`ICU`] reports pending. Called from
/// `start.S`'s exception vector.
///
/// # Safety
/// Must only be called from the interrupt entry path with the previous
/// context already safely stashed.
#[no_mangle]
pub unsafe extern "C" fn handle_interrupt() {
    IRQS.wait().dispatch(ICU.wait());
}

#[panic_handler]
pub fn panic_handler(info: &core::panic::PanicInfo) -> ! {
    log::error!("panic: {info}");
    #[allow(clippy::empty_loop)]
    loop {}
}
