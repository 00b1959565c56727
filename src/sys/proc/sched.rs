//! Scheduler Tern — round robin over the three terminals
//!
//! Cara kerja:
//!   - IRQ 0 (timer) masuk ke `Kernel::tick`
//!   - tick 0, 1, 2: start one base shell per terminal (bootstrap)
//!   - after that: save the running process, move to the next terminal,
//!     switch address space / vidmap / ESP0, resume that terminal's process
//!
//! Every terminal has exactly one scheduled process: the newest one in its
//! execute chain. Parents waiting in `execute` are never scheduled.

use super::process::Launch;
use super::Pid;
use crate::sys::kernel::Kernel;
use crate::sys::machine::Machine;
use crate::sys::mem::Space;
use crate::sys::terminal::TERMINALS;

pub const BOOTSTRAP_TICKS: u64 = TERMINALS as u64;

/// What the timer glue has to do after `tick`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickAction {
    /// Save into `save` (if any) and start a fresh base shell
    Bootstrap { save: Option<Pid>, launch: Launch },
    /// Save into `from`, continue `to`
    Switch { from: Pid, to: Pid },
}

pub struct Scheduler {
    slots:   [Option<Pid>; TERMINALS],
    running: usize,
    ticks:   u64,
}

impl Scheduler {
    pub const fn new() -> Self {
        Self { slots: [None; TERMINALS], running: 0, ticks: 0 }
    }

    /// Process scheduled on the running terminal
    pub fn current(&self) -> Option<Pid> {
        self.slots[self.running]
    }

    pub fn slot(&self, terminal: usize) -> Option<Pid> {
        self.slots[terminal]
    }

    pub fn set_slot(&mut self, terminal: usize, pid: Pid) {
        self.slots[terminal] = Some(pid);
    }

    pub fn running(&self) -> usize {
        self.running
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn booted(&self) -> bool {
        self.ticks >= BOOTSTRAP_TICKS
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl<'k, M: Machine> Kernel<'k, M> {
    /// Timer interrupt. The glue does the register work described by the
    /// returned action.
    pub fn tick(&mut self) -> TickAction {
        let n = self.sched.ticks;
        self.sched.ticks += 1;
        let cur = self.sched.running;
        let save = self.sched.slots[cur];

        if n < BOOTSTRAP_TICKS {
            let terminal = n as usize;
            self.enter_terminal(terminal);

            let config = self.config;
            let launch = match self.execute(None, terminal, config.shell()) {
                Ok(launch) => launch,
                Err(e) => panic!("terminal {}: cannot start shell: {}", terminal, e),
            };
            return TickAction::Bootstrap { save, launch };
        }

        let from = match save {
            Some(pid) => pid,
            None => panic!("terminal {} has nothing scheduled", cur),
        };
        let next = (cur + 1) % TERMINALS;
        let to = match self.sched.slots[next] {
            Some(pid) => pid,
            None => panic!("scheduling empty terminal {}", next),
        };
        assert!(self.procs.record_for(to).live, "scheduling dead pid {}", to);

        self.spaces.activate(Space::Process(to), &mut self.machine);
        self.enter_terminal(next);
        self.machine.set_kernel_stack(self.procs.kernel_stack_top(to));

        TickAction::Switch { from, to }
    }

    /// Make `terminal` the running one: its input buffer and its screen
    /// behind the vidmap page
    fn enter_terminal(&mut self, terminal: usize) {
        self.sched.running = terminal;
        self.terms.set_running(terminal);
        let frame = self.terms.frame_of(terminal);
        self.spaces.point_vidmap(frame, &mut self.machine);
    }
}
