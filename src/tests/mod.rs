mod gdt_test;
pub mod qemu;
use crate::kernel_init;
use crate::println;
use crate::tests::gdt_test::gdt_test;
use qemu::{exit_qemu, QemuExitCode};

pub fn test_main() -> ! {
    let selectors = kernel_init();

    println!("Begin tests...");
    gdt_test(selectors).unwrap();
    exit_qemu(QemuExitCode::Success);
}

pub fn on_panic() -> ! {
    exit_qemu(QemuExitCode::Failed);
}
