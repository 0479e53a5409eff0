/*
 * lgdt/ltr and their readback counterparts
 * References:
 * https://wiki.osdev.org/GDT_Tutorial
 * https://www.felixcloutier.com/x86/ltr
 */

use super::GlobalDescriptorTable;
use bilge::prelude::*;
use core::arch::asm;
use core::mem::size_of;
use spin::Mutex;
use static_assertions::const_assert_eq;

/// The last table handed to `lgdt`. The CPU copies the operand, but it is
/// kept around so there is a single record of what is installed.
static GDTR: Mutex<DescriptorTablePointer> = Mutex::new(DescriptorTablePointer::new(0, 0));

#[repr(C, packed(2))]
#[derive(Clone, Copy)]
pub struct DescriptorTablePointer {
    limit: u16, // Size of descriptor table -1
    base: u64,  // Base address of the table
}

const_assert_eq!(size_of::<DescriptorTablePointer>(), 10);

impl DescriptorTablePointer {
    pub const fn new(limit: u16, base: u64) -> Self {
        Self { limit, base }
    }

    pub const fn limit(&self) -> u16 {
        self.limit
    }

    pub const fn base(&self) -> u64 {
        self.base
    }

    pub const fn size_bytes(&self) -> usize {
        self.limit as usize + 1
    }
}

impl core::fmt::Debug for DescriptorTablePointer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let (limit, base) = (self.limit, self.base);
        f.debug_struct("DescriptorTablePointer")
            .field("limit", &limit)
            .field("base", &format_args!("{:#x}", base))
            .finish()
    }
}

/**
 *  Segment Selector Layout:
 *  0-1: Requested Privilege Level
 *  2: Table Indicator (0 = GDT)
 *  3-15: Descriptor Index
 */
#[bitsize(16)]
#[derive(FromBits, DebugBits, Clone, Copy, PartialEq)]
pub struct SegmentSelector {
    pub rpl: u2,
    pub ldt: bool,
    pub index: u13,
}

impl SegmentSelector {
    /// Selector for the GDT descriptor starting `offset` bytes into the table.
    pub fn from_offset(offset: u16, rpl: u2) -> Self {
        Self::new(rpl, false, u13::new(offset >> 3))
    }

    pub fn offset(&self) -> u16 {
        self.index().value() << 3
    }
}

/// Proof that a table is installed in GDTR. `ltr` is only reachable
/// through this, so the TSS selector always indexes the new table.
pub struct InstalledGdt {
    table: &'static GlobalDescriptorTable,
}

impl InstalledGdt {
    pub fn table(&self) -> &'static GlobalDescriptorTable {
        self.table
    }

    /// SAFETY:
    ///
    /// The TSS descriptor must describe a valid, permanently resident TSS. A
    /// TSS can only be loaded once; a second `ltr` on a busy TSS faults.
    pub unsafe fn load_task_register(&self) -> SegmentSelector {
        let selector = self.table.tss_selector();
        ltr(selector);
        selector
    }
}

/// Installs `table` in GDTR.
///
/// SAFETY:
///
/// The table must hold valid descriptors for every selector currently in a
/// segment register, otherwise the next segment load or interrupt faults.
pub unsafe fn load_gdt(table: &'static GlobalDescriptorTable) -> InstalledGdt {
    let mut gdtr = GDTR.lock();
    *gdtr = table.pointer();
    lgdt(&gdtr);
    InstalledGdt { table }
}

unsafe fn lgdt(gdtr: &DescriptorTablePointer) {
    asm! {
        "lgdt [{0}]",
        in(reg) gdtr,
        options(readonly, nostack, preserves_flags)
    }
}

// Not nomem: the CPU sets the busy bit in the TSS descriptor
unsafe fn ltr(selector: SegmentSelector) {
    asm! {
        "ltr {0:x}",
        in(reg) u16::from(selector),
        options(nostack, preserves_flags)
    }
}

pub fn store_gdt() -> DescriptorTablePointer {
    let mut gdtr = DescriptorTablePointer::new(0, 0);
    unsafe {
        asm! {
            "sgdt [{0}]",
            in(reg) &mut gdtr,
            options(nostack, preserves_flags)
        }
    }
    gdtr
}

pub fn store_task_register() -> SegmentSelector {
    let selector: u16;
    unsafe {
        asm! {
            "str {0:x}",
            out(reg) selector,
            options(nomem, nostack, preserves_flags)
        }
    }
    SegmentSelector::from(selector)
}
