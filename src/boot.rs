/*
 * Symbols handed over by the assembly boot stage (boot.asm / linker.ld)
 */

use crate::config::TOTAL_IST_ENTRIES;
use crate::gdt::load::DescriptorTablePointer;
use core::ptr::addr_of;

#[allow(non_upper_case_globals)]
extern "C" {
    /// The GDTR operand the boot stage loaded before jumping to long mode.
    #[link_name = "gdt64.descriptor"]
    static bootstrap_gdt_descriptor: DescriptorTablePointer;

    // One past the end of each interrupt stack. Only the addresses matter.
    static ist1_top: u8;
    static ist2_top: u8;
    static ist3_top: u8;
    static ist4_top: u8;
    static ist5_top: u8;
    static ist6_top: u8;
    static ist7_top: u8;
}

pub fn bootstrap_gdt() -> DescriptorTablePointer {
    // Safety: written once by the boot stage, read-only afterwards
    unsafe { bootstrap_gdt_descriptor }
}

pub fn interrupt_stack_tops() -> [u64; TOTAL_IST_ENTRIES] {
    // Safety: address-of only, the stacks are never read here
    unsafe {
        [
            addr_of!(ist1_top) as u64,
            addr_of!(ist2_top) as u64,
            addr_of!(ist3_top) as u64,
            addr_of!(ist4_top) as u64,
            addr_of!(ist5_top) as u64,
            addr_of!(ist6_top) as u64,
            addr_of!(ist7_top) as u64,
        ]
    }
}
