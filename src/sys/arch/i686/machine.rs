//! I686 — the real `Machine`: CR3, INVLPG, TSS and identity-mapped memory

use super::gdt;
use crate::sys::machine::Machine;
use crate::sys::mem::{PhysAddr, PAGE_SIZE, USER_PAGE, USER_PAGE_SIZE};
use x86::io::outb;

/// 80 x 25 cells plus the unused tail of the 4 KiB frame
const FRAME_CELLS: usize = PAGE_SIZE as usize / 2;

const CRTC_ADDR: u16 = 0x3D4;
const CRTC_DATA: u16 = 0x3D5;
const CURSOR_HIGH: u8 = 0x0E;
const CURSOR_LOW:  u8 = 0x0F;

pub struct I686 {
    _private: (),
}

impl I686 {
    /// Only one instance may exist: it hands out `&mut` into fixed
    /// physical memory.
    pub(super) unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl Machine for I686 {
    fn load_directory(&mut self, directory: PhysAddr) {
        unsafe { x86::controlregs::cr3_write(directory as u64); }
    }

    fn flush_page(&mut self, virt: u32) {
        unsafe { x86::tlb::flush(virt as usize); }
    }

    fn set_kernel_stack(&mut self, top: usize) {
        gdt::set_esp0(top);
    }

    fn user_page(&mut self) -> &mut [u8] {
        // mapped in every process directory; only called with one loaded
        unsafe { core::slice::from_raw_parts_mut(USER_PAGE as *mut u8, USER_PAGE_SIZE as usize) }
    }

    fn video_frame(&mut self, frame: PhysAddr) -> &mut [u16] {
        // video frames are identity mapped in every directory
        unsafe { core::slice::from_raw_parts_mut(frame as *mut u16, FRAME_CELLS) }
    }

    fn set_cursor(&mut self, offset: usize) {
        unsafe {
            outb(CRTC_ADDR, CURSOR_HIGH);
            outb(CRTC_DATA, (offset >> 8) as u8);
            outb(CRTC_ADDR, CURSOR_LOW);
            outb(CRTC_DATA, offset as u8);
        }
    }
}
