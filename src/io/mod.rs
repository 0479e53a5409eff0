pub mod isr;
pub mod serial;

use core::fmt::Arguments;

use self::serial::SERIAL_WRITER;

#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => ($crate::io::_print(format_args!($($arg)*)));
}

#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => ($crate::print!("{}\n", format_args!($($arg)*)));
}

#[doc(hidden)]
pub fn _print(args: Arguments) {
    use core::fmt::Write;
    SERIAL_WRITER
        .lock()
        .write_fmt(args)
        .expect("Failed to write to serial");
}
