//! Machine — the narrow hardware seam of the kernel core
//!
//! The core (paging, scheduler, execute/halt, drivers) never touches
//! registers itself. Everything it needs from the CPU goes through this
//! trait: loading CR3, the ring-0 stack in the TSS, and access to the two
//! kinds of memory the kernel writes into on behalf of others (the user
//! big page of the active directory and text-mode video frames).
//!
//! The actual stack transplantation (saving/restoring ESP/EBP, `iret`
//! into ring 3) lives in `sys::arch::i686::context` and is driven by the
//! outcomes the core returns.

use crate::sys::mem::PhysAddr;

pub trait Machine {
    /// Load a page directory into CR3 (flushes the TLB)
    fn load_directory(&mut self, directory: PhysAddr);

    /// Invalidate one TLB entry after an in-place mapping change
    fn flush_page(&mut self, virt: u32);

    /// Ring-0 stack used on the next ring 3 → ring 0 transition (TSS.esp0)
    fn set_kernel_stack(&mut self, top: usize);

    /// The 4 MiB user page of the directory that is loaded right now
    fn user_page(&mut self) -> &mut [u8];

    /// One 4 KiB text-mode frame (the VGA page or a terminal backing page)
    fn video_frame(&mut self, frame: PhysAddr) -> &mut [u16];

    /// Move the hardware cursor of the VGA page
    fn set_cursor(&mut self, offset: usize);
}

// ---------------------------------------------------------------------------
// MockMachine — host stand-in used by the unit tests
// ---------------------------------------------------------------------------
