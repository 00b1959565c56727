//! sys — Tern kernel subsystems
//!
//! Struktur:
//!   mem/     — address spaces: page directories, big pages, translation
//!   proc/    — process management: pcb, fd, sched, process (execute/halt)
//!   syscall/ — syscall numbers and dispatcher
//!   fs/      — read-only boot filesystem
//!   arch/    — i686: gdt, idt, pic, clocks, context switch (bare metal only)

pub mod config;
pub mod fs;
pub mod kernel;
pub mod log;
pub mod machine;
pub mod mem;
pub mod proc;
pub mod rtc;
pub mod sync;
pub mod syscall;
pub mod terminal;

#[cfg(all(feature = "baremetal", target_arch = "x86"))]
pub mod arch;

// Short paths for the pieces everybody uses
pub use kernel::{Kernel, KernelStorage};
pub use machine::Machine;
pub use proc::process;
pub use proc::sched;
