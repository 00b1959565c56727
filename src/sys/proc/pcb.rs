//! PCB — process records inside the kernel stack blocks
//!
//! Each process slot is one 8 KiB block: the kernel stack grows down from
//! the record sitting at the top of the block. The record of slot `pid`
//! is therefore found from the pid alone, and the kernel stack top handed
//! to the TSS is the record's own address.

use super::fd::FdTable;
use super::{Pid, MAX_PROCESSES};
use crate::sys::fs::FILENAME_MAX;

use core::mem::size_of;

pub const KERNEL_STACK_SIZE: usize = 8 * 1024;
/// Longest argument string `execute` accepts
pub const ARGS_MAX: usize = 127;

/// Where a process was suspended inside the kernel
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(C)]
pub struct KernelContext {
    pub esp: usize,
    pub ebp: usize,
}

impl KernelContext {
    pub const ZERO: Self = Self { esp: 0, ebp: 0 };
}

#[derive(Clone, Copy, Debug)]
#[repr(C)]
pub struct Pcb {
    pub pid:       Pid,
    /// `None` for the base shell of a terminal
    pub parent:    Option<Pid>,
    pub terminal:  usize,
    /// Where `execute` left the parent; used by the parent's record only
    pub exec_ctx:  KernelContext,
    /// Where the scheduler preempted this process
    pub sched_ctx: KernelContext,
    pub files:     FdTable,
    pub vidmap:    bool,
    pub live:      bool,
    name:          [u8; FILENAME_MAX],
    name_len:      usize,
    args:          [u8; ARGS_MAX],
    args_len:      usize,
}

impl Pcb {
    pub const EMPTY: Self = Self {
        pid:       0,
        parent:    None,
        terminal:  0,
        exec_ctx:  KernelContext::ZERO,
        sched_ctx: KernelContext::ZERO,
        files:     FdTable::EMPTY,
        vidmap:    false,
        live:      false,
        name:      [0; FILENAME_MAX],
        name_len:  0,
        args:      [0; ARGS_MAX],
        args_len:  0,
    };

    pub fn new(pid: Pid, parent: Option<Pid>, terminal: usize, name: &[u8], args: &[u8]) -> Self {
        let mut pcb = Self {
            pid,
            parent,
            terminal,
            files: FdTable::with_std(),
            live: true,
            ..Self::EMPTY
        };
        let n = name.len().min(FILENAME_MAX);
        pcb.name[..n].copy_from_slice(&name[..n]);
        pcb.name_len = n;
        let n = args.len().min(ARGS_MAX);
        pcb.args[..n].copy_from_slice(&args[..n]);
        pcb.args_len = n;
        pcb
    }

    pub fn name(&self) -> &[u8] { &self.name[..self.name_len] }
    pub fn args(&self) -> &[u8] { &self.args[..self.args_len] }

    pub fn name_str(&self) -> &str {
        core::str::from_utf8(self.name()).unwrap_or("?")
    }
}

// ---------------------------------------------------------------------------
// ProcessSlot & ProcessTable
// ---------------------------------------------------------------------------

#[repr(C, align(8192))]
pub struct ProcessSlot {
    #[allow(dead_code)]
    stack: [u8; KERNEL_STACK_SIZE - size_of::<Pcb>()],
    pcb:   Pcb,
}

const _: () = assert!(size_of::<ProcessSlot>() == KERNEL_STACK_SIZE);

const EMPTY_SLOT: ProcessSlot = ProcessSlot {
    stack: [0; KERNEL_STACK_SIZE - size_of::<Pcb>()],
    pcb:   Pcb::EMPTY,
};

#[repr(C)]
pub struct ProcessTable {
    slots: [ProcessSlot; MAX_PROCESSES],
}

impl ProcessTable {
    pub const fn new() -> Self {
        Self { slots: [EMPTY_SLOT; MAX_PROCESSES] }
    }

    /// Record of slot `pid`, live or not
    pub fn record_for(&self, pid: Pid) -> &Pcb {
        &self.slots[pid].pcb
    }

    pub fn record_for_mut(&mut self, pid: Pid) -> &mut Pcb {
        &mut self.slots[pid].pcb
    }

    /// Record of a running process. A dead slot or a pid mismatch here
    /// means the process bookkeeping is corrupt.
    pub fn live(&mut self, pid: Pid) -> &mut Pcb {
        let pcb = &mut self.slots[pid].pcb;
        assert!(pcb.live, "pid {} has no live record", pid);
        assert_eq!(pcb.pid, pid, "record of slot {} claims pid {}", pid, pcb.pid);
        pcb
    }

    pub fn install(&mut self, pcb: Pcb) {
        self.slots[pcb.pid].pcb = pcb;
    }

    pub fn clear(&mut self, pid: Pid) {
        self.slots[pid].pcb = Pcb::EMPTY;
    }

    /// Initial ESP0 for `pid`: just below its record
    pub fn kernel_stack_top(&self, pid: Pid) -> usize {
        &self.slots[pid].pcb as *const Pcb as usize
    }

    pub fn context_ptr(&mut self, pid: Pid, which: Saved) -> *mut KernelContext {
        let pcb = &mut self.slots[pid].pcb;
        match which {
            Saved::Exec  => &mut pcb.exec_ctx,
            Saved::Sched => &mut pcb.sched_ctx,
        }
    }
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Saved {
    Exec,
    Sched,
}
