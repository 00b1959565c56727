//! Memory layout Tern
//!
//! Physical:
//!   0x000B_8000          VGA text page
//!   0x000B_9000..BC000   backing pages of terminal 0..2
//!   0x0040_0000          kernel (4 MiB big page, identity)
//!   0x0080_0000 + n*4M   user frame of process slot n
//!
//! Virtual, per process:
//!   0x0000_0000  PDE 0   shared low table (video pages only)
//!   0x0040_0000  PDE 1   kernel
//!   0x0800_0000  PDE 32  user big page, image loaded at 0x0804_8000
//!   0x0840_0000  PDE 33  vidmap page (only after `vidmap`)

pub mod paging;

pub use paging::{AddressSpaces, PagingError, Space};

pub type PhysAddr = u32;

pub const PAGE_SIZE:      u32 = 4096;
pub const BIG_PAGE_SIZE:  u32 = 4 << 20;
pub const TABLE_ENTRIES:  usize = 1024;

pub const KERNEL_BASE:    u32 = 0x0040_0000;
pub const USER_FRAME_BASE: PhysAddr = 0x0080_0000;

pub const USER_PAGE:      u32 = 0x0800_0000;
pub const USER_PAGE_SIZE: u32 = BIG_PAGE_SIZE;
pub const IMAGE_ADDR:     u32 = 0x0804_8000;
pub const USER_STACK_TOP: u32 = USER_PAGE + USER_PAGE_SIZE - 4;
pub const VIDMAP_ADDR:    u32 = USER_PAGE + USER_PAGE_SIZE;

pub const VGA_FRAME:      PhysAddr = 0x000B_8000;

/// Off-screen copy of terminal `t`
pub const fn backing_frame(terminal: usize) -> PhysAddr {
    VGA_FRAME + PAGE_SIZE * (terminal as u32 + 1)
}

/// Is `[addr, addr + len)` fully inside the user big page?
pub fn in_user_page(addr: u32, len: usize) -> bool {
    let start = addr as u64;
    let end = start + len as u64;
    start >= USER_PAGE as u64 && end <= (USER_PAGE + USER_PAGE_SIZE) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_range_check() {
        assert!(in_user_page(IMAGE_ADDR, 100));
        assert!(in_user_page(USER_STACK_TOP, 4));
        assert!(!in_user_page(USER_STACK_TOP, 5));
        assert!(!in_user_page(0, 1));
        assert!(!in_user_page(USER_PAGE - 1, 2));
        assert_eq!(backing_frame(2), 0xBB000);
    }
}
