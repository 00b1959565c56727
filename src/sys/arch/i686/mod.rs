//! i686 — 32-bit protected mode glue for the portable kernel core

pub mod boot;
pub mod clk;
pub mod context;
pub mod gdt;
pub mod heap;
pub mod idt;
pub mod machine;
pub mod multiboot;
pub mod pic;
pub mod serial;
