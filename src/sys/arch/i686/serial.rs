//! Serial — COM1 sink for the kernel log

use crate::sys::sync::IrqMutex;
use core::fmt::{self, Write};
use lazy_static::lazy_static;
use uart_16550::SerialPort;

const COM1: u16 = 0x3F8;

lazy_static! {
    static ref SERIAL: IrqMutex<SerialPort> = {
        let mut port = unsafe { SerialPort::new(COM1) };
        port.init();
        IrqMutex::new(port)
    };
}

/// One log line: `<tag> <message>\n`
pub fn print_line(tag: &str, args: fmt::Arguments) {
    let mut port = SERIAL.lock();
    // COM1 has nowhere to report its own failure
    let _ = writeln!(port, "{} {}", tag, args);
}
