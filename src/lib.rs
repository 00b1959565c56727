//! Tern — a 32-bit x86 teaching kernel
//!
//! Struktur:
//!   sys/mem/     — two-level paging, one address space per process
//!   sys/proc/    — process records, descriptor tables, scheduler, execute/halt
//!   sys/syscall/ — `int 0x80` dispatch
//!   sys/fs/      — read-only boot filesystem
//!   sys/arch/    — i686 glue (GDT, IDT, PIC, context switch), `baremetal` only
//!
//! Everything outside `sys::arch` is plain Rust over a [`sys::machine::Machine`]
//! and builds (and is tested) on the host.

#![cfg_attr(not(test), no_std)]

#[cfg(all(feature = "baremetal", not(target_arch = "x86")))]
compile_error!("the `baremetal` feature needs an i686 target");

// ---------------------------------------------------------------------------
// Kernel log macros
// ---------------------------------------------------------------------------

/// Informational kernel message
#[macro_export]
macro_rules! klog {
    ($($arg:tt)*) => {
        $crate::sys::log::write($crate::sys::log::Level::Info, format_args!($($arg)*))
    };
}

/// Something went wrong but the kernel keeps going
#[macro_export]
macro_rules! kwarn {
    ($($arg:tt)*) => {
        $crate::sys::log::write($crate::sys::log::Level::Warn, format_args!($($arg)*))
    };
}

/// Fatal or near-fatal condition
#[macro_export]
macro_rules! kerror {
    ($($arg:tt)*) => {
        $crate::sys::log::write($crate::sys::log::Level::Error, format_args!($($arg)*))
    };
}

pub mod sys;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Mask interrupts and halt the CPU forever
#[cfg(all(feature = "baremetal", target_arch = "x86"))]
pub fn hlt_loop() -> ! {
    unsafe { x86::irq::disable(); }
    loop {
        unsafe { x86::halt(); }
    }
}
