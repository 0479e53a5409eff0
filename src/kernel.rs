#![cfg_attr(not(test), no_std)]
#![cfg_attr(not(test), no_main)]

mod config;
mod cpu;
mod gdt;
mod io;
mod status;
mod task;
#[cfg(not(test))]
mod boot;
#[cfg(all(feature = "integration", not(test)))]
mod tests;
extern crate bilge;
extern crate spin;
extern crate static_assertions;
extern crate volatile;

#[cfg(not(test))]
use crate::cpu::{disable_interrupts, halt};
#[cfg(not(test))]
use crate::gdt::Selectors;
#[cfg(not(test))]
use core::panic::PanicInfo;

#[cfg(not(test))]
#[panic_handler]
fn panic(panic_info: &PanicInfo) -> ! {
    unsafe { disable_interrupts() };
    println!("Kernel Panic! :( \n");
    println!("Message: {}", panic_info.message());

    if let Some(location) = panic_info.location() {
        println!("Location: Panic occurred in file '{}' at line {}", location.file(), location.line());
    } else {
        println!("Location: Unknown");
    }

    #[cfg(feature = "integration")]
    tests::on_panic();

    #[cfg(not(feature = "integration"))]
    halt();
}

/// Everything that has to happen before interrupts may be turned on.
#[cfg(not(test))]
pub fn kernel_init() -> &'static Selectors {
    let selectors = gdt::init();
    println!(
        "GDT/TSS ready: code selector {:#x}, tss selector {:#x}",
        u16::from(selectors.code),
        u16::from(selectors.tss)
    );
    selectors
}

#[cfg(not(test))]
#[no_mangle]
pub extern "C" fn kernel_main() -> ! {
    #[cfg(feature = "integration")]
    tests::test_main();

    #[cfg(not(feature = "integration"))]
    {
        kernel_init();
        // No IDT is installed here, so interrupts stay masked
        halt();
    }
}
