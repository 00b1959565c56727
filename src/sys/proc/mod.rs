//! proc — process management
//!
//! Berisi semua komponen yang berhubungan dengan manajemen proses:
//!   - pcb:     process records, one per slot, at the top of the kernel stack
//!   - fd:      per-process descriptor table and the driver kinds behind it
//!   - process: execute / halt
//!   - sched:   round robin over the three terminals

pub mod fd;
pub mod pcb;
pub mod process;
pub mod sched;

/// Process id == slot index in the process table and in the directory pool
pub type Pid = usize;

pub const MAX_PROCESSES: usize = 6;
