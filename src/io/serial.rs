/*
 * COM1 output for kernel logs. The boot stage leaves the UART usable, so
 * this only waits for the transmit register and writes.
 * References:
 * https://wiki.osdev.org/Serial_Ports
 */

use crate::config::SERIAL_PORT;
use crate::io::isr::{insb, outb};
use core::fmt::Write;
use spin::{Lazy, Mutex};

const LINE_STATUS: u16 = SERIAL_PORT + 5;
const TRANSMIT_EMPTY: u8 = 1 << 5;

pub static SERIAL_WRITER: Lazy<Mutex<SerialWriter>> =
    Lazy::new(|| Mutex::new(SerialWriter { port: SERIAL_PORT }));

pub struct SerialWriter {
    port: u16,
}

impl SerialWriter {
    fn write_byte(&mut self, byte: u8) {
        // Safety: COM1 belongs to the kernel logger
        unsafe {
            while insb(LINE_STATUS) & TRANSMIT_EMPTY == 0 {}
            outb(self.port, byte);
        }
    }
}

impl Write for SerialWriter {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        for c in s.chars() {
            self.write_char(c)?;
        }
        Ok(())
    }

    fn write_char(&mut self, c: char) -> core::fmt::Result {
        if c == '\n' {
            self.write_byte(b'\r');
        }
        self.write_byte(if c.is_ascii() { c as u8 } else { b'?' });
        Ok(())
    }
}
