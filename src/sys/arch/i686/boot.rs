//! Boot — from the multiboot entry to the first timer tick
//!
//! Urutan:
//!   1. read the multiboot info (paging is still off, low memory visible)
//!   2. heap, GDT/TSS, PIC, IDT
//!   3. mount the boot filesystem module
//!   4. build the kernel object, load its directory, turn paging on
//!   5. PIT + RTC, interrupts on, idle until tick 0 starts the first shell

use super::machine::I686;
use super::multiboot::{self, BootInfo};
use super::{clk, context, gdt, heap, idt, pic};
use crate::sys::config::BootConfig;
use crate::sys::fs::BootFs;
use crate::sys::kernel::{Kernel, KernelStorage};
use crate::sys::log;
use crate::sys::mem::{BIG_PAGE_SIZE, KERNEL_BASE};
use crate::sys::sync::IrqMutex;

use core::ptr::addr_of_mut;
use spin::Once;
use x86::controlregs::{cr0, cr0_write, cr4, cr4_write, Cr0, Cr4};

pub type KernelLock = IrqMutex<Kernel<'static, I686>>;

static KERNEL: Once<KernelLock> = Once::new();

/// Page directories and kernel stacks, inside the kernel's 4 MiB page
static mut STORAGE: KernelStorage = KernelStorage::new();

/// The kernel object. Only valid once `start` has built it.
pub fn kernel() -> &'static KernelLock {
    match KERNEL.get() {
        Some(k) => k,
        None => panic!("kernel used before boot finished"),
    }
}

/// Called from `_start` with the registers the loader left us
pub fn start(magic: u32, info: u32) -> ! {
    klog!("Tern v{}", crate::VERSION);

    let info = match unsafe { multiboot::parse(magic, info) } {
        Ok(info) => info,
        Err(e) => panic!("boot: {}", e),
    };
    // the command line lives in low memory; copy it out before paging
    let config = BootConfig::parse(info.cmdline);
    log::set_level(config.log_level);

    heap::init();
    gdt::init();
    pic::init();
    idt::init();
    klog!("GDT, IDT, PIC ready");

    let fs = mount(&info);

    KERNEL.call_once(|| {
        // STORAGE is borrowed exactly once, here
        let storage = unsafe { &mut *addr_of_mut!(STORAGE) };
        let machine = unsafe { I686::new() };
        IrqMutex::new(Kernel::new(machine, storage, fs, config))
    });
    enable_paging();

    clk::init_rtc();
    clk::init_timer(config.tick_hz);

    klog!("waiting for the first tick");
    loop {
        context::idle();
    }
}

fn mount(info: &BootInfo) -> BootFs<'static> {
    let start = info.module_start;
    let end = info.module_end;
    let page = KERNEL_BASE..KERNEL_BASE + BIG_PAGE_SIZE;
    if start > end || !page.contains(&start) || end > page.end {
        panic!("boot: filesystem module {:#x}..{:#x} is outside the kernel page", start, end);
    }

    let image = unsafe { core::slice::from_raw_parts(start as *const u8, (end - start) as usize) };
    match BootFs::mount(image) {
        Ok(fs) => fs,
        Err(e) => panic!("boot: cannot mount filesystem: {}", e),
    }
}

/// CR3 already holds the kernel directory
fn enable_paging() {
    unsafe {
        cr4_write(cr4() | Cr4::CR4_ENABLE_PSE | Cr4::CR4_ENABLE_GLOBAL_PAGES);
        cr0_write(cr0() | Cr0::CR0_ENABLE_PAGING);
    }
    klog!("paging on");
}
