//! RTC — virtualised periodic interrupt
//!
//! The hardware runs at a fixed 1024 Hz. Every open `rtc` descriptor has
//! its own virtual rate; a read waits until the next multiple of its
//! interval in hardware ticks.

use core::fmt;

pub const HW_RATE:      u32 = 1024;
pub const DEFAULT_RATE: u32 = 2;
pub const MIN_RATE:     u32 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RtcError {
    BadRate(u32),
    /// Rate must be passed as exactly four bytes
    BadLength(usize),
}

impl fmt::Display for RtcError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RtcError::BadRate(r)   => write!(f, "rtc rate {} is not a power of two in {}..={}", r, MIN_RATE, HW_RATE),
            RtcError::BadLength(n) => write!(f, "rtc rate needs 4 bytes, got {}", n),
        }
    }
}

pub fn validate_rate(rate: u32) -> Result<u32, RtcError> {
    if rate.is_power_of_two() && (MIN_RATE..=HW_RATE).contains(&rate) {
        Ok(rate)
    } else {
        Err(RtcError::BadRate(rate))
    }
}

/// Hardware ticks between two virtual ticks at `rate`
pub fn interval(rate: u32) -> u64 {
    (HW_RATE / rate) as u64
}

/// Hardware tick counter, advanced from IRQ 8
#[derive(Default)]
pub struct Rtc {
    ticks: u64,
}

impl Rtc {
    pub const fn new() -> Self {
        Self { ticks: 0 }
    }

    pub fn tick(&mut self) {
        self.ticks += 1;
    }

    pub fn now(&self) -> u64 {
        self.ticks
    }

    /// First virtual tick boundary strictly after now
    pub fn next_deadline(&self, rate: u32) -> u64 {
        let step = interval(rate);
        (self.ticks / step + 1) * step
    }
}
