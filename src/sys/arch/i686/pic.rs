//! PIC — Programmable Interrupt Controller (Intel 8259)
//!
//! Dua PIC dirangkai (master + slave). IRQ 0-7 → vektor 0x20-0x27,
//! IRQ 8-15 → 0x28-0x2F. Everything starts masked; drivers unmask the
//! lines they handle.

use x86::io::{inb, outb};

pub const PRIMARY_VECTOR_OFFSET:   u8 = 0x20;
pub const SECONDARY_VECTOR_OFFSET: u8 = 0x28;

const PRIMARY_PIC_PORT:   u16 = 0x20;
const SECONDARY_PIC_PORT: u16 = 0xA0;

/// IRQ line of the slave on the master
const CASCADE_IRQ: u8 = 2;

const ICW1_INIT: u8 = 0x11;
const ICW4_8086: u8 = 0x01;
const EOI:       u8 = 0x20;

struct Pic(u16);

impl Pic {
    const CMD_PORT:  u16 = 0;
    const DATA_PORT: u16 = 1;

    unsafe fn write_cmd(&self, cmd: u8) {
        unsafe { outb(self.0 + Self::CMD_PORT, cmd); }
    }

    unsafe fn write_data(&self, data: u8) {
        unsafe { outb(self.0 + Self::DATA_PORT, data); }
    }

    unsafe fn read_data(&self) -> u8 {
        unsafe { inb(self.0 + Self::DATA_PORT) }
    }
}

/// Write to an unused port; gives old PICs time between ICWs
fn io_delay() {
    unsafe { outb(0x80, 0); }
}

/// Remap both PICs and mask every line except the cascade
pub fn init() {
    let primary = Pic(PRIMARY_PIC_PORT);
    let secondary = Pic(SECONDARY_PIC_PORT);

    unsafe {
        primary.write_cmd(ICW1_INIT);
        io_delay();
        secondary.write_cmd(ICW1_INIT);
        io_delay();

        primary.write_data(PRIMARY_VECTOR_OFFSET);
        io_delay();
        secondary.write_data(SECONDARY_VECTOR_OFFSET);
        io_delay();

        primary.write_data(1 << CASCADE_IRQ);
        io_delay();
        secondary.write_data(CASCADE_IRQ);
        io_delay();

        primary.write_data(ICW4_8086);
        io_delay();
        secondary.write_data(ICW4_8086);
        io_delay();

        primary.write_data(!(1 << CASCADE_IRQ));
        secondary.write_data(0xFF);
    }
}

fn pic_for(irq: u8) -> (Pic, u8) {
    assert!(irq < 16);
    if irq < 8 {
        (Pic(PRIMARY_PIC_PORT), irq)
    } else {
        (Pic(SECONDARY_PIC_PORT), irq - 8)
    }
}

pub fn unmask_irq(irq: u8) {
    let (pic, line) = pic_for(irq);
    unsafe {
        let mask = pic.read_data();
        pic.write_data(mask & !(1 << line));
    }
}

pub fn send_eoi(irq: u8) {
    unsafe {
        if irq >= 8 {
            Pic(SECONDARY_PIC_PORT).write_cmd(EOI);
        }
        Pic(PRIMARY_PIC_PORT).write_cmd(EOI);
    }
}

/// IDT vector of an IRQ line
pub const fn irq_vector(irq: u8) -> u8 {
    PRIMARY_VECTOR_OFFSET + irq
}
