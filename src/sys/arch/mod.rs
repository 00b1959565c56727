//! arch — i686 hardware layer, only built with the `baremetal` feature
//!
//! Berisi semua yang menyentuh register dan port secara langsung:
//!   - GDT + TSS, IDT dan interrupt stubs
//!   - PIC 8259, PIT, CMOS RTC
//!   - context switch (naked asm)
//!   - serial log (COM1)
//!   - boot: multiboot entry, paging on, the global kernel object

pub mod i686;

pub use i686::{boot, serial};
