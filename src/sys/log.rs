//! Log — sink behind `klog!`, `kwarn!`, `kerror!`
//!
//! Bare metal: COM1 (uart_16550). Host tests: stderr. Anything else: dropped.

use core::fmt;
use core::sync::atomic::{AtomicU8, Ordering};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Level {
    Error = 0,
    Warn  = 1,
    Info  = 2,
}

impl Level {
    fn tag(self) -> &'static str {
        match self {
            Level::Error => "[ERR ]",
            Level::Warn  => "[WARN]",
            Level::Info  => "[ OK ]",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "error" => Some(Level::Error),
            "warn"  => Some(Level::Warn),
            "info"  => Some(Level::Info),
            _       => None,
        }
    }
}

static MAX_LEVEL: AtomicU8 = AtomicU8::new(Level::Info as u8);

/// Messages above `level` are dropped
pub fn set_level(level: Level) {
    MAX_LEVEL.store(level as u8, Ordering::Relaxed);
}

pub fn enabled(level: Level) -> bool {
    level as u8 <= MAX_LEVEL.load(Ordering::Relaxed)
}

pub fn write(level: Level, args: fmt::Arguments) {
    if !enabled(level) {
        return;
    }
    emit(level.tag(), args);
}

#[cfg(all(feature = "baremetal", target_arch = "x86", not(test)))]
fn emit(tag: &str, args: fmt::Arguments) {
    crate::sys::arch::serial::print_line(tag, args);
}

#[cfg(test)]
fn emit(tag: &str, args: fmt::Arguments) {
    std::eprintln!("{} {}", tag, args);
}

#[cfg(not(any(test, all(feature = "baremetal", target_arch = "x86"))))]
fn emit(_tag: &str, _args: fmt::Arguments) {}
