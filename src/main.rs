#![no_std]
#![no_main]

use core::panic::PanicInfo;
use tern::sys::arch::{boot, i686::multiboot};
use tern::{hlt_loop, kerror};

const BOOT_STACK_SIZE: usize = 16 * 1024;

#[used]
#[link_section = ".multiboot"]
static MULTIBOOT_HEADER: [u32; 3] = [
    multiboot::HEADER_MAGIC,
    multiboot::HEADER_FLAGS,
    multiboot::HEADER_CHECKSUM,
];

#[repr(C, align(16))]
struct BootStack([u8; BOOT_STACK_SIZE]);

/// Stack until the first process runs; abandoned after that
static mut BOOT_STACK: BootStack = BootStack([0; BOOT_STACK_SIZE]);

/// Loader entry: EAX = multiboot magic, EBX = info pointer
#[unsafe(naked)]
#[unsafe(no_mangle)]
pub unsafe extern "C" fn _start() -> ! {
    core::arch::naked_asm!(
        "lea esp, [{stack} + {size}]",
        "xor ebp, ebp",
        "push ebx",
        "push eax",
        "call {main}",
        "2:",
        "hlt",
        "jmp 2b",
        stack = sym BOOT_STACK,
        size = const BOOT_STACK_SIZE,
        main = sym kernel_main,
    );
}

extern "C" fn kernel_main(magic: u32, info: u32) -> ! {
    boot::start(magic, info)
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    if let Some(loc) = info.location() {
        kerror!("PANIC at {}:{}:{}: {}", loc.file(), loc.line(), loc.column(), info.message());
    } else {
        kerror!("PANIC: {}", info.message());
    }
    hlt_loop();
}
