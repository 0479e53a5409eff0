use crate::config::{GDT_SIZE_BYTES, GDT_TSS_OFFSET};
use crate::cpu;
use crate::gdt::{self, load, Selectors};
use crate::println;
use crate::status::ErrorCode;
use crate::task::tss::{self, IstIndex, TSS};
use core::convert::TryFrom;

macro_rules! log {
    ($($arg:tt)*) => {
        println!("[gdt_test] {}", format_args!($($arg)*));
    };
}

pub fn gdt_test(selectors: &Selectors) -> Result<(), ErrorCode> {
    let table = gdt::installed_table().ok_or(ErrorCode::NotPresent)?;

    log!("Checking interrupts are still masked...");
    assert!(!cpu::interrupts_enabled());

    log!("Reading back GDTR...");
    let gdtr = load::store_gdt();
    assert_eq!(gdtr.base(), table as *const gdt::GlobalDescriptorTable as u64);
    assert_eq!(gdtr.size_bytes(), GDT_SIZE_BYTES);

    log!("Reading back TR...");
    let tr = load::store_task_register();
    assert_eq!(tr, selectors.tss);
    assert_eq!(u16::from(tr), GDT_TSS_OFFSET);

    log!("Checking descriptors...");
    assert!(table.as_bytes()[..8].iter().all(|byte| *byte == 0));
    assert!(table.code().access().present());
    assert!(table.code().flags().long_mode());
    // ltr flips the TSS type from available (0b1001) to busy (0b1011)
    assert!(table.live_tss().access().readable());
    table.verify(&TSS.lock())?;

    log!("Swapping IST7 and back...");
    let ist7 = IstIndex::try_from(7)?;
    let original = TSS.lock().interrupt_stack(ist7);
    unsafe { tss::update_interrupt_stack(ist7, original - 0x10) };
    assert_eq!(TSS.lock().interrupt_stack(ist7), original - 0x10);
    unsafe { tss::update_interrupt_stack(ist7, original) };
    assert_eq!(TSS.lock().interrupt_stack(ist7), original);

    log!("Successfully tested GDT/TSS");
    Ok(())
}
