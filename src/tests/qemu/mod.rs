use crate::config::QEMU_EXIT_PORT;
use crate::io::isr::outb;

/*
 * Needs `-device isa-debug-exit,iobase=0xf4,iosize=0x04`. QEMU exits with
 * (code << 1) | 1.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum QemuExitCode {
    Success = 0x10,
    Failed = 0x11,
}

pub fn exit_qemu(exit_code: QemuExitCode) -> ! {
    unsafe {
        outb(QEMU_EXIT_PORT, exit_code as u8);
    }
    unreachable!()
}
