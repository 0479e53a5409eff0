/*
 * Interrupt Stack Table. The TSS has exactly seven slots, ist1..ist7.
 * See https://wiki.osdev.org/Task_State_Segment
 */
pub const TOTAL_IST_ENTRIES: usize = 7;
pub const TOTAL_PRIVILEGE_STACKS: usize = 3;

/*
 * GDT layout: null, 64-bit kernel code, TSS (two slots)
 */
pub const GDT_NULL_OFFSET: u16 = 0x00;
pub const GDT_KERNEL_CODE_OFFSET: u16 = 0x08;
pub const GDT_TSS_OFFSET: u16 = 0x10;
pub const GDT_SIZE_BYTES: usize = 32;

pub const TSS_SIZE_BYTES: usize = 104;

pub const SERIAL_PORT: u16 = 0x3f8;
pub const QEMU_EXIT_PORT: u16 = 0xf4;
