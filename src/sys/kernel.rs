//! Kernel — all mutable kernel state in one object
//!
//! Created once at boot and afterwards only touched under the global
//! `IrqMutex` (see `sys::arch::i686::boot`). The large, address-sensitive
//! parts (page directories, kernel stacks) live in `KernelStorage`, which
//! is a static on bare metal and a heap box in tests.
//!
//! Behaviour is split over several files as `impl Kernel` blocks:
//!   proc/process.rs  execute, halt, faults
//!   proc/sched.rs    timer tick
//!   syscall/mod.rs   syscall dispatch

use crate::sys::config::BootConfig;
use crate::sys::fs::BootFs;
use crate::sys::machine::Machine;
use crate::sys::mem::{in_user_page, AddressSpaces, Space, USER_PAGE};
use crate::sys::proc::pcb::{KernelContext, ProcessTable, Saved};
use crate::sys::proc::sched::Scheduler;
use crate::sys::proc::Pid;
use crate::sys::rtc::Rtc;
use crate::sys::terminal::Terminals;

use core::fmt;

pub struct KernelStorage {
    pub spaces: AddressSpaces,
    pub procs:  ProcessTable,
}

impl KernelStorage {
    pub const fn new() -> Self {
        Self { spaces: AddressSpaces::new(), procs: ProcessTable::new() }
    }
}

impl Default for KernelStorage {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Kernel<'k, M: Machine> {
    pub(crate) machine: M,
    pub(crate) spaces:  &'k mut AddressSpaces,
    pub(crate) procs:   &'k mut ProcessTable,
    pub(crate) sched:   Scheduler,
    pub(crate) terms:   Terminals,
    pub(crate) rtc:     Rtc,
    pub(crate) fs:      BootFs<'k>,
    pub(crate) config:  BootConfig,
}

/// User pointer outside the user page (or null)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BadPointer(pub u32);

impl fmt::Display for BadPointer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "bad user pointer {:#010x}", self.0)
    }
}

impl<'k, M: Machine> Kernel<'k, M> {
    pub fn new(mut machine: M, storage: &'k mut KernelStorage, fs: BootFs<'k>, config: BootConfig) -> Self {
        let KernelStorage { spaces, procs } = storage;
        spaces.init();
        spaces.activate(Space::Kernel, &mut machine);

        let mut terms = Terminals::new();
        terms.init(&mut machine);

        klog!("kernel: shell '{}', {} Hz tick",
            core::str::from_utf8(config.shell()).unwrap_or("?"), config.tick_hz);

        Self {
            machine,
            spaces,
            procs,
            sched: Scheduler::new(),
            terms,
            rtc: Rtc::new(),
            fs,
            config,
        }
    }

    pub fn config(&self) -> &BootConfig { &self.config }
    pub fn machine(&self) -> &M { &self.machine }
    pub fn spaces(&self) -> &AddressSpaces { &*self.spaces }
    pub fn procs(&self) -> &ProcessTable { &*self.procs }
    pub fn scheduler(&self) -> &Scheduler { &self.sched }
    pub fn terminals(&self) -> &Terminals { &self.terms }

    /// Process on the CPU, if the bootstrap has launched one
    pub fn current_pid(&self) -> Option<Pid> {
        self.sched.current()
    }

    pub fn kernel_stack_top(&self, pid: Pid) -> usize {
        self.procs.kernel_stack_top(pid)
    }

    /// Address the arch glue saves ESP/EBP into after the lock is gone.
    /// Records live in `KernelStorage`, which never moves.
    pub fn context_ptr(&mut self, pid: Pid, which: Saved) -> *mut KernelContext {
        self.procs.context_ptr(pid, which)
    }

    pub fn saved_context(&self, pid: Pid, which: Saved) -> KernelContext {
        let pcb = self.procs.record_for(pid);
        match which {
            Saved::Exec  => pcb.exec_ctx,
            Saved::Sched => pcb.sched_ctx,
        }
    }

    // -----------------------------------------------------------------------
    // Interrupt entry points (besides the timer, see sched.rs)
    // -----------------------------------------------------------------------

    pub fn on_rtc_tick(&mut self) {
        self.rtc.tick();
    }

    pub fn on_scancode(&mut self, scancode: u8) {
        if self.terms.on_scancode(scancode, &mut self.machine).is_some() {
            // the running process may have its vidmap page on the old screen
            let frame = self.terms.frame_of(self.terms.running());
            self.spaces.point_vidmap(frame, &mut self.machine);
        }
    }

    /// Kernel-side print on a terminal (boot banner, fault messages)
    pub fn print(&mut self, terminal: usize, text: &[u8]) {
        self.terms.write(terminal, text, &mut self.machine);
    }

    // -----------------------------------------------------------------------
    // User memory — only valid while the caller's directory is loaded
    // -----------------------------------------------------------------------

    pub fn copy_from_user(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), BadPointer> {
        let off = user_offset(addr, buf.len())?;
        buf.copy_from_slice(&self.machine.user_page()[off..off + buf.len()]);
        Ok(())
    }

    pub fn copy_to_user(&mut self, addr: u32, data: &[u8]) -> Result<(), BadPointer> {
        let off = user_offset(addr, data.len())?;
        self.machine.user_page()[off..off + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Copy a NUL-terminated string into `buf`; returns its length.
    /// Fails when no NUL shows up within `buf.len()` bytes.
    pub fn read_user_str(&mut self, addr: u32, buf: &mut [u8]) -> Result<usize, BadPointer> {
        let off = user_offset(addr, 1)?;
        let page = self.machine.user_page();
        let avail = (page.len() - off).min(buf.len());
        let src = &page[off..off + avail];
        let len = src.iter().position(|&b| b == 0).ok_or(BadPointer(addr))?;
        buf[..len].copy_from_slice(&src[..len]);
        Ok(len)
    }
}

fn user_offset(addr: u32, len: usize) -> Result<usize, BadPointer> {
    if in_user_page(addr, len) {
        Ok((addr - USER_PAGE) as usize)
    } else {
        Err(BadPointer(addr))
    }
}

// ---------------------------------------------------------------------------
// Test rig
// ---------------------------------------------------------------------------
