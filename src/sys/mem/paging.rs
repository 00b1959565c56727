//! Paging — two-level i686 page directories, satu per proses
//!
//! A fixed pool of `MAX_PROCESSES` directories plus the base kernel
//! directory. Every directory shares the kernel mappings (PDE 0 and 1);
//! a process directory adds its own 4 MiB user big page at PDE 32.
//!
//! Tables live inside this struct, and the kernel is identity mapped, so
//! the address of a table is also its physical address.

use super::{
    PhysAddr, BIG_PAGE_SIZE, KERNEL_BASE, PAGE_SIZE, TABLE_ENTRIES, USER_FRAME_BASE, USER_PAGE,
    VGA_FRAME, VIDMAP_ADDR, backing_frame,
};
use crate::sys::machine::Machine;
use crate::sys::proc::{Pid, MAX_PROCESSES};
use crate::sys::terminal::TERMINALS;

use bit_field::BitField;
use core::fmt;

// ---------------------------------------------------------------------------
// Entry
// ---------------------------------------------------------------------------

const PRESENT:  usize = 0;
const WRITABLE: usize = 1;
const USER:     usize = 2;
const HUGE:     usize = 7;
const GLOBAL:   usize = 8;

const TABLE_ADDR_MASK: u32 = 0xFFFF_F000;
const BIG_ADDR_MASK:   u32 = 0xFFC0_0000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    Supervisor,
    User,
}

/// One 32-bit directory or table entry
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct Entry(u32);

impl Entry {
    pub const fn empty() -> Self {
        Entry(0)
    }

    /// Directory entry pointing at a 4 KiB-page table
    pub fn table(table: PhysAddr, access: Access) -> Self {
        Self::build(table & TABLE_ADDR_MASK, access, false, false)
    }

    /// Directory entry mapping a 4 MiB page
    pub fn big_page(frame: PhysAddr, access: Access, global: bool) -> Self {
        Self::build(frame & BIG_ADDR_MASK, access, true, global)
    }

    /// Table entry mapping a 4 KiB page
    pub fn page(frame: PhysAddr, access: Access) -> Self {
        Self::build(frame & TABLE_ADDR_MASK, access, false, false)
    }

    fn build(addr: u32, access: Access, huge: bool, global: bool) -> Self {
        let mut bits = addr;
        bits.set_bit(PRESENT, true)
            .set_bit(WRITABLE, true)
            .set_bit(USER, access == Access::User)
            .set_bit(HUGE, huge)
            .set_bit(GLOBAL, global);
        Entry(bits)
    }

    pub fn is_present(self) -> bool { self.0.get_bit(PRESENT) }
    pub fn is_huge(self) -> bool    { self.0.get_bit(HUGE) }
    pub fn is_user(self) -> bool    { self.0.get_bit(USER) }
    pub fn is_global(self) -> bool  { self.0.get_bit(GLOBAL) }

    pub fn addr(self) -> PhysAddr {
        if self.is_huge() { self.0 & BIG_ADDR_MASK } else { self.0 & TABLE_ADDR_MASK }
    }

    pub fn bits(self) -> u32 { self.0 }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Entry({:#010x})", self.0)
    }
}

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

#[repr(C, align(4096))]
pub struct PageTable {
    pub entries: [Entry; TABLE_ENTRIES],
}

/// Same layout, different level
pub type PageDirectory = PageTable;

const EMPTY_TABLE: PageTable = PageTable { entries: [Entry::empty(); TABLE_ENTRIES] };

impl PageTable {
    fn clear(&mut self) {
        self.entries = [Entry::empty(); TABLE_ENTRIES];
    }

    pub fn phys_addr(&self) -> PhysAddr {
        self as *const _ as usize as PhysAddr
    }
}

pub const fn pde_index(virt: u32) -> usize { (virt >> 22) as usize }
pub const fn pte_index(virt: u32) -> usize { ((virt >> 12) & 0x3FF) as usize }

const LOW_PDE:    usize = 0;
const KERNEL_PDE: usize = pde_index(KERNEL_BASE);
const USER_PDE:   usize = pde_index(USER_PAGE);
const VIDMAP_PDE: usize = pde_index(VIDMAP_ADDR);

/// Physical frame backing the user page of slot `pid`
pub const fn user_frame(pid: Pid) -> PhysAddr {
    USER_FRAME_BASE + BIG_PAGE_SIZE * pid as u32
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PagingError {
    /// Every directory slot is taken
    Exhausted,
    /// Slot was not allocated
    AlreadyFree(Pid),
}

impl fmt::Display for PagingError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PagingError::Exhausted      => write!(f, "no free address space"),
            PagingError::AlreadyFree(p) => write!(f, "address space {} is not allocated", p),
        }
    }
}

// ---------------------------------------------------------------------------
// AddressSpaces — pool of page directories
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Space {
    Kernel,
    Process(Pid),
}

#[repr(C)]
pub struct AddressSpaces {
    kernel:    PageDirectory,
    dirs:      [PageDirectory; MAX_PROCESSES],
    low:       PageTable,
    vidmap:    PageTable,
    in_use:    [bool; MAX_PROCESSES],
    active:    Space,
}

impl AddressSpaces {
    pub const fn new() -> Self {
        Self {
            kernel: EMPTY_TABLE,
            dirs:   [EMPTY_TABLE; MAX_PROCESSES],
            low:    EMPTY_TABLE,
            vidmap: EMPTY_TABLE,
            in_use: [false; MAX_PROCESSES],
            active: Space::Kernel,
        }
    }

    /// Build the shared kernel mappings. Does not load anything.
    pub fn init(&mut self) {
        self.low.clear();
        let video = core::iter::once(VGA_FRAME).chain((0..TERMINALS).map(backing_frame));
        for frame in video {
            self.low.entries[pte_index(frame)] = Entry::page(frame, Access::Supervisor);
        }

        self.vidmap.clear();
        self.vidmap.entries[0] = Entry::page(VGA_FRAME, Access::User);

        self.kernel.clear();
        self.kernel.entries[LOW_PDE] = Entry::table(self.low.phys_addr(), Access::Supervisor);
        self.kernel.entries[KERNEL_PDE] = Entry::big_page(KERNEL_BASE, Access::Supervisor, true);

        for dir in self.dirs.iter_mut() {
            dir.clear();
        }
        self.in_use = [false; MAX_PROCESSES];
        self.active = Space::Kernel;
    }

    /// Take the first free slot and build its directory
    pub fn allocate(&mut self) -> Result<Pid, PagingError> {
        let pid = self.in_use.iter().position(|used| !used).ok_or(PagingError::Exhausted)?;

        let kernel_low = self.kernel.entries[LOW_PDE];
        let kernel_big = self.kernel.entries[KERNEL_PDE];

        let dir = &mut self.dirs[pid];
        dir.clear();
        dir.entries[LOW_PDE] = kernel_low;
        dir.entries[KERNEL_PDE] = kernel_big;
        dir.entries[USER_PDE] = Entry::big_page(user_frame(pid), Access::User, false);

        self.in_use[pid] = true;
        Ok(pid)
    }

    /// Wipe a directory and return its slot to the pool.
    /// The caller must have switched away from it first.
    pub fn deallocate(&mut self, pid: Pid) -> Result<(), PagingError> {
        if !self.is_allocated(pid) {
            return Err(PagingError::AlreadyFree(pid));
        }
        self.dirs[pid].clear();
        self.in_use[pid] = false;
        if self.active == Space::Process(pid) {
            self.active = Space::Kernel;
        }
        Ok(())
    }

    /// Load `space` into CR3
    pub fn activate(&mut self, space: Space, machine: &mut impl Machine) {
        let phys = match space {
            Space::Kernel => self.kernel.phys_addr(),
            Space::Process(pid) => {
                assert!(self.is_allocated(pid), "activating free address space {}", pid);
                self.dirs[pid].phys_addr()
            }
        };
        machine.load_directory(phys);
        self.active = space;
    }

    pub fn active(&self) -> Space {
        self.active
    }

    pub fn is_allocated(&self, pid: Pid) -> bool {
        pid < MAX_PROCESSES && self.in_use[pid]
    }

    pub fn directory_phys(&self, space: Space) -> PhysAddr {
        self.directory(space).phys_addr()
    }

    /// Give `pid` the vidmap page at `VIDMAP_ADDR`
    pub fn map_vidmap(&mut self, pid: Pid, machine: &mut impl Machine) {
        assert!(self.is_allocated(pid), "vidmap on free address space {}", pid);
        let table = self.vidmap.phys_addr();
        self.dirs[pid].entries[VIDMAP_PDE] = Entry::table(table, Access::User);
        if self.active == Space::Process(pid) {
            machine.flush_page(VIDMAP_ADDR);
        }
    }

    /// Retarget the shared vidmap page at a video frame
    pub fn point_vidmap(&mut self, frame: PhysAddr, machine: &mut impl Machine) {
        let entry = Entry::page(frame, Access::User);
        if self.vidmap.entries[0] != entry {
            self.vidmap.entries[0] = entry;
            machine.flush_page(VIDMAP_ADDR);
        }
    }

    /// Walk the active directory by hand. Diagnostics only.
    pub fn translate(&self, virt: u32) -> Option<PhysAddr> {
        let pde = self.directory(self.active).entries[pde_index(virt)];
        if !pde.is_present() {
            return None;
        }
        if pde.is_huge() {
            return Some(pde.addr() | (virt & (BIG_PAGE_SIZE - 1)));
        }

        let table = self.table_at(pde.addr())?;
        let pte = table.entries[pte_index(virt)];
        if !pte.is_present() {
            return None;
        }
        Some(pte.addr() | (virt & (PAGE_SIZE - 1)))
    }

    pub fn entry(&self, space: Space, index: usize) -> Entry {
        self.directory(space).entries[index]
    }

    fn directory(&self, space: Space) -> &PageDirectory {
        match space {
            Space::Kernel => &self.kernel,
            Space::Process(pid) => &self.dirs[pid],
        }
    }

    /// Only two second-level tables exist; find which one a PDE names
    fn table_at(&self, phys: PhysAddr) -> Option<&PageTable> {
        [&self.low, &self.vidmap].into_iter().find(|t| t.phys_addr() == phys)
    }
}

impl Default for AddressSpaces {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sys::machine::mock::MockMachine;
    use crate::sys::mem::{IMAGE_ADDR, USER_STACK_TOP};
    use std::boxed::Box;

    fn spaces() -> Box<AddressSpaces> {
        let mut s = Box::new(AddressSpaces::new());
        s.init();
        s
    }

    #[test]
    fn entry_bits() {
        let e = Entry::big_page(0x0040_0000, Access::Supervisor, true);
        assert_eq!(e.bits(), 0x0040_0183);
        let p = Entry::page(0xB8000, Access::Supervisor);
        assert_eq!(p.bits(), 0xB8003);
        assert!(Entry::big_page(user_frame(1), Access::User, false).is_user());
    }

    #[test]
    fn pool_exhausts_after_max_processes() {
        let mut s = spaces();
        let mut ids = std::vec::Vec::new();
        for _ in 0..MAX_PROCESSES {
            ids.push(s.allocate().unwrap());
        }
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), MAX_PROCESSES);
        assert_eq!(s.allocate(), Err(PagingError::Exhausted));
    }

    #[test]
    fn freed_slot_is_reused_clean() {
        let mut m = MockMachine::default();
        let mut s = spaces();
        let a = s.allocate().unwrap();
        let _b = s.allocate().unwrap();
        s.map_vidmap(a, &mut m);
        assert!(s.entry(Space::Process(a), VIDMAP_PDE).is_present());

        s.deallocate(a).unwrap();
        assert_eq!(s.deallocate(a), Err(PagingError::AlreadyFree(a)));
        assert_eq!(s.allocate().unwrap(), a);

        // only kernel + user mappings, no vidmap left over
        let present: std::vec::Vec<usize> = (0..TABLE_ENTRIES)
            .filter(|&i| s.entry(Space::Process(a), i).is_present())
            .collect();
        assert_eq!(present, [LOW_PDE, KERNEL_PDE, USER_PDE]);
    }

    #[test]
    fn process_sees_kernel_and_own_user_page() {
        let mut m = MockMachine::default();
        let mut s = spaces();
        let a = s.allocate().unwrap();
        let b = s.allocate().unwrap();

        s.activate(Space::Process(b), &mut m);
        assert_eq!(m.directory, Some(s.directory_phys(Space::Process(b))));
        assert_eq!(s.translate(0x0040_1234), Some(0x0040_1234));
        assert_eq!(s.translate(0xB8010), Some(0xB8010));
        assert_eq!(s.translate(IMAGE_ADDR), Some(user_frame(b) + 0x48000));
        assert_eq!(s.translate(USER_STACK_TOP), Some(user_frame(b) + BIG_PAGE_SIZE - 4));
        assert_eq!(s.translate(0x1000), None);
        assert_eq!(s.translate(VIDMAP_ADDR), None);

        s.activate(Space::Process(a), &mut m);
        assert_eq!(s.translate(IMAGE_ADDR), Some(user_frame(a) + 0x48000));

        s.activate(Space::Kernel, &mut m);
        assert_eq!(s.translate(IMAGE_ADDR), None);
        assert_eq!(s.translate(0x0050_0000), Some(0x0050_0000));
    }

    #[test]
    fn vidmap_follows_point() {
        let mut m = MockMachine::default();
        let mut s = spaces();
        let a = s.allocate().unwrap();
        s.activate(Space::Process(a), &mut m);
        s.map_vidmap(a, &mut m);
        assert_eq!(s.translate(VIDMAP_ADDR + 8), Some(VGA_FRAME + 8));

        s.point_vidmap(backing_frame(1), &mut m);
        assert_eq!(s.translate(VIDMAP_ADDR), Some(backing_frame(1)));
        assert_eq!(m.flushes, [VIDMAP_ADDR, VIDMAP_ADDR]);
    }

    #[test]
    #[should_panic]
    fn activating_free_slot_panics() {
        let mut m = MockMachine::default();
        let mut s = spaces();
        s.activate(Space::Process(3), &mut m);
    }
}
