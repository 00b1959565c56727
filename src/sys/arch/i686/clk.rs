//! Clock — PIT (scheduler tick) dan CMOS RTC (virtual RTC devices)
//!
//! PIT channel 0 drives IRQ 0 at the boot-configured rate. The RTC runs
//! its periodic interrupt at a fixed 1024 Hz on IRQ 8; the per-process
//! rates are derived from that in `sys::rtc`.

use super::pic;
use crate::sys::rtc::HW_RATE;
use x86::io::{inb, outb};

pub const TIMER_IRQ: u8 = 0;
pub const RTC_IRQ:   u8 = 8;

// ---------------------------------------------------------------------------
// PIT Timer (IRQ 0)
// ---------------------------------------------------------------------------

const PIT_FREQUENCY: u32 = 1_193_182;
const PIT_CMD:  u16 = 0x43;
const PIT_CH0:  u16 = 0x40;

/// Channel 0, lobyte/hibyte, mode 3 (square wave)
const PIT_MODE: u8 = 0x36;

pub fn init_timer(hz: u32) {
    let divisor = (PIT_FREQUENCY / hz).min(u16::MAX as u32) as u16;
    unsafe {
        outb(PIT_CMD, PIT_MODE);
        outb(PIT_CH0, divisor as u8);
        outb(PIT_CH0, (divisor >> 8) as u8);
    }
    pic::unmask_irq(TIMER_IRQ);
    klog!("PIT: {} Hz", hz);
}

// ---------------------------------------------------------------------------
// CMOS RTC (IRQ 8)
// ---------------------------------------------------------------------------

const CMOS_ADDR: u16 = 0x70;
const CMOS_DATA: u16 = 0x71;

/// Bit 7 of the address port keeps NMIs off while we program the chip
const NMI_OFF: u8 = 0x80;
const REG_A: u8 = 0x0A;
const REG_B: u8 = 0x0B;
const REG_C: u8 = 0x0C;

/// Periodic interrupt enable in register B
const PIE: u8 = 0x40;

fn cmos_read(reg: u8) -> u8 {
    unsafe {
        outb(CMOS_ADDR, NMI_OFF | reg);
        inb(CMOS_DATA)
    }
}

fn cmos_write(reg: u8, value: u8) {
    unsafe {
        outb(CMOS_ADDR, NMI_OFF | reg);
        outb(CMOS_DATA, value);
    }
}

/// Rate selector for register A: frequency = 32768 >> (rs - 1)
const fn rate_select(hz: u32) -> u8 {
    (16 - hz.trailing_zeros()) as u8
}

pub fn init_rtc() {
    let b = cmos_read(REG_B);
    cmos_write(REG_B, b | PIE);

    let a = cmos_read(REG_A);
    cmos_write(REG_A, (a & 0xF0) | rate_select(HW_RATE));

    // a pending interrupt from before we took over would block IRQ 8
    rtc_ack();
    pic::unmask_irq(RTC_IRQ);
    klog!("RTC: {} Hz periodic interrupt", HW_RATE);
}

/// Read register C; the RTC raises no further interrupts until this happens
pub fn rtc_ack() {
    cmos_read(REG_C);
}
