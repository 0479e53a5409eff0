/*
 * 64-bit GDT Implementation
 * References:
 * https://wiki.osdev.org/Global_Descriptor_Table
 * https://wiki.osdev.org/GDT_Tutorial
 *
 * The boot stage already runs on a minimal GDT (null + code). The kernel
 * copies it into its own table and appends the TSS descriptor, which needs
 * two slots in long mode.
 */

pub mod bootstrap;
pub mod descriptor;
pub mod load;

use crate::{
    config::{
        GDT_KERNEL_CODE_OFFSET, GDT_NULL_OFFSET, GDT_SIZE_BYTES, GDT_TSS_OFFSET,
        TOTAL_IST_ENTRIES, TSS_SIZE_BYTES,
    },
    status::ErrorCode,
    task::tss::{setup_tss, TaskStateSegment},
};
use bilge::prelude::*;
use core::convert::TryFrom;
use core::mem::{offset_of, size_of};
use core::ptr;
use descriptor::{SegmentDescriptor, SystemSegmentDescriptor};
use load::{DescriptorTablePointer, SegmentSelector};
use static_assertions::const_assert_eq;

#[cfg(not(test))]
use crate::{boot, println, task::tss::TSS};
#[cfg(not(test))]
use spin::Once;

#[cfg(not(test))]
macro_rules! log {
    ($($arg:tt)*) => {
        println!("[gdt] {}", format_args!($($arg)*));
    };
}

#[cfg(not(test))]
static GDT: Once<GlobalDescriptorTable> = Once::new();
#[cfg(not(test))]
static SELECTORS: Once<Selectors> = Once::new();

#[repr(C, align(8))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalDescriptorTable {
    null: SegmentDescriptor,
    code: SegmentDescriptor,
    tss: SystemSegmentDescriptor,
}

const_assert_eq!(size_of::<GlobalDescriptorTable>(), GDT_SIZE_BYTES);
const_assert_eq!(offset_of!(GlobalDescriptorTable, null), GDT_NULL_OFFSET as usize);
const_assert_eq!(offset_of!(GlobalDescriptorTable, code), GDT_KERNEL_CODE_OFFSET as usize);
const_assert_eq!(offset_of!(GlobalDescriptorTable, tss), GDT_TSS_OFFSET as usize);

#[derive(Debug, Clone, Copy)]
pub struct Selectors {
    pub code: SegmentSelector,
    pub tss: SegmentSelector,
}

impl GlobalDescriptorTable {
    pub const fn zeroed() -> Self {
        Self {
            null: SegmentDescriptor::NULL,
            code: SegmentDescriptor::NULL,
            tss: SystemSegmentDescriptor::NULL,
        }
    }

    pub fn as_bytes(&self) -> &[u8; GDT_SIZE_BYTES] {
        // Safety: repr(C) over byte arrays, size asserted above
        unsafe { &*(self as *const Self as *const [u8; GDT_SIZE_BYTES]) }
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8; GDT_SIZE_BYTES] {
        // Safety: every byte pattern is a valid descriptor
        unsafe { &mut *(self as *mut Self as *mut [u8; GDT_SIZE_BYTES]) }
    }

    pub fn code(&self) -> &SegmentDescriptor {
        &self.code
    }

    pub fn tss(&self) -> &SystemSegmentDescriptor {
        &self.tss
    }

    /// The TSS descriptor as it is in memory right now. `ltr` marks it busy
    /// behind the compiler's back, so this goes through a volatile read.
    pub fn live_tss(&self) -> SystemSegmentDescriptor {
        // Safety: the field is a valid, aligned descriptor
        unsafe { ptr::read_volatile(&self.tss) }
    }

    /// Points the TSS descriptor at the TSS living at `tss_address`.
    pub fn set_tss(&mut self, tss_address: u64) -> Result<(), ErrorCode> {
        let limit = u32::try_from(TSS_SIZE_BYTES - 1)?;
        self.tss = SystemSegmentDescriptor::available_tss(tss_address, limit)?;
        Ok(())
    }

    pub fn code_selector(&self) -> SegmentSelector {
        SegmentSelector::from_offset(GDT_KERNEL_CODE_OFFSET, u2::new(0))
    }

    pub fn tss_selector(&self) -> SegmentSelector {
        SegmentSelector::from_offset(offset_of!(Self, tss) as u16, u2::new(0))
    }

    /// The `lgdt` operand for this table.
    pub fn pointer(&self) -> DescriptorTablePointer {
        DescriptorTablePointer::new((size_of::<Self>() - 1) as u16, self as *const Self as u64)
    }

    /// Checks everything the CPU will trip over before it gets the chance.
    pub fn verify(&self, tss: &TaskStateSegment) -> Result<(), ErrorCode> {
        if !self.null.is_null() {
            return Err(ErrorCode::BadDescriptor);
        }

        let code = self.code.access();
        if !code.present() {
            return Err(ErrorCode::NotPresent);
        }
        if !code.executable() || !code.not_sys() || !self.code.flags().long_mode() {
            return Err(ErrorCode::BadDescriptor);
        }

        let tss_descriptor = self.live_tss();
        let access = tss_descriptor.access();
        if !access.present() {
            return Err(ErrorCode::NotPresent);
        }
        if access.not_sys()
            || !access.executable()
            || !access.accessed()
            || !tss_descriptor.reserved_is_zero()
            || tss_descriptor.limit() as usize != TSS_SIZE_BYTES - 1
            || tss_descriptor.base() != tss as *const TaskStateSegment as u64
        {
            return Err(ErrorCode::BadDescriptor);
        }

        tss.verify()
    }
}

/// Seeds `gdt` from the bootstrap table, rebuilds the static TSS and points
/// the TSS descriptor at it. Returns the TSS address.
///
/// SAFETY:
///
/// Same as `bootstrap::copy_bootstrap_gdt`.
pub unsafe fn build_gdt(
    gdt: &mut GlobalDescriptorTable,
    bootstrap_gdt: &DescriptorTablePointer,
    stack_tops: &[u64; TOTAL_IST_ENTRIES],
) -> Result<u64, ErrorCode> {
    bootstrap::copy_bootstrap_gdt(gdt, bootstrap_gdt)?;
    let tss_address = setup_tss(stack_tops)?;
    gdt.set_tss(tss_address)?;
    Ok(tss_address)
}

/// Builds and installs the kernel GDT and TSS. Runs once; later calls
/// return the selectors from the first.
///
/// Must be called before interrupts are enabled.
#[cfg(not(test))]
pub fn init() -> &'static Selectors {
    SELECTORS.call_once(|| {
        let bootstrap_gdt = boot::bootstrap_gdt();
        let stack_tops = boot::interrupt_stack_tops();
        log!(
            "Bootstrap GDT at {:#x}, {} bytes",
            bootstrap_gdt.base(),
            bootstrap_gdt.size_bytes()
        );

        let gdt = GDT.call_once(|| {
            let mut gdt = GlobalDescriptorTable::zeroed();
            // Safety: the boot stage's table stays mapped and is not ours
            unsafe { build_gdt(&mut gdt, &bootstrap_gdt, &stack_tops) }
                .expect("Failed to build GDT");
            gdt
        });
        gdt.verify(&TSS.lock()).expect("Invalid GDT/TSS layout");
        log!("TSS descriptor: {:?}", gdt.tss());

        // Safety: the code descriptor sits at the same offset as in the
        // bootstrap table, so CS stays valid
        let installed = unsafe { load::load_gdt(gdt) };
        log!("Loaded GDT: {:?}", gdt.pointer());

        // Safety: verified above, and this is the only ltr
        let tss = unsafe { installed.load_task_register() };
        log!("Loaded TSS selector {:#x}", u16::from(tss));

        Selectors {
            code: installed.table().code_selector(),
            tss,
        }
    })
}

/// The table `init` installed, if it has run.
#[cfg(not(test))]
pub fn installed_table() -> Option<&'static GlobalDescriptorTable> {
    GDT.get()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::tss::TSS;

    const KERNEL_CODE: u64 = 0x00af_9a00_0000_ffff;
    const STACK_TOPS: [u64; TOTAL_IST_ENTRIES] = [
        0x0010_4000,
        0x0010_8000,
        0x0010_c000,
        0x0011_0000,
        0x0011_4000,
        0x0011_8000,
        0x0011_c000,
    ];

    fn bootstrap_table() -> [u8; 16] {
        let mut table = [0u8; 16];
        table[8..].copy_from_slice(&KERNEL_CODE.to_le_bytes());
        table
    }

    #[test]
    fn layout() {
        let gdt = GlobalDescriptorTable::zeroed();
        let gdtr = gdt.pointer();

        assert_eq!(size_of::<GlobalDescriptorTable>(), 32);
        assert_eq!(gdtr.limit(), 31);
        assert_eq!(gdtr.base(), &gdt as *const GlobalDescriptorTable as u64);
        assert_eq!(u16::from(gdt.code_selector()), 0x08);
        assert_eq!(u16::from(gdt.tss_selector()), 0x10);
    }

    #[test]
    fn builds_from_bootstrap_table() {
        let source = bootstrap_table();
        let bootstrap = DescriptorTablePointer::new(15, source.as_ptr() as u64);

        let mut gdt = GlobalDescriptorTable::zeroed();
        let tss_address = unsafe { build_gdt(&mut gdt, &bootstrap, &STACK_TOPS) }.unwrap();

        let bytes = gdt.as_bytes();
        assert!(bytes[..8].iter().all(|byte| *byte == 0));
        assert_eq!(&bytes[8..16], &source[8..]);
        assert_eq!(gdt.tss().base(), tss_address);
        assert_eq!(gdt.tss().limit(), 103);
        assert!(!gdt.tss().access().not_sys());
        assert!(gdt.tss().access().present());

        let tss = TSS.lock();
        assert_eq!(&*tss as *const TaskStateSegment as u64, tss_address);
        assert_eq!(gdt.verify(&tss), Ok(()));
    }

    #[test]
    fn set_tss_is_idempotent() {
        let mut gdt = GlobalDescriptorTable::zeroed();
        gdt.set_tss(0xffff_8000_0020_0000).unwrap();
        let first = gdt.clone();
        gdt.set_tss(0xffff_8000_0020_0000).unwrap();

        assert_eq!(gdt, first);
    }

    #[test]
    fn verify_catches_wrong_tss() {
        let source = bootstrap_table();
        let mut gdt = GlobalDescriptorTable::zeroed();
        unsafe {
            bootstrap::copy_bootstrap_gdt(
                &mut gdt,
                &DescriptorTablePointer::new(15, source.as_ptr() as u64),
            )
            .unwrap()
        };

        let tss = TaskStateSegment::with_interrupt_stacks(&STACK_TOPS).unwrap();
        assert_eq!(gdt.verify(&tss), Err(ErrorCode::NotPresent));

        gdt.set_tss(0x1000).unwrap();
        assert_eq!(gdt.verify(&tss), Err(ErrorCode::BadDescriptor));

        gdt.set_tss(&tss as *const TaskStateSegment as u64).unwrap();
        assert_eq!(gdt.verify(&tss), Ok(()));
    }

    #[test]
    fn busy_tss_still_verifies() {
        let tss = TaskStateSegment::with_interrupt_stacks(&STACK_TOPS).unwrap();
        let mut gdt = GlobalDescriptorTable::zeroed();
        gdt.as_bytes_mut()[8..16].copy_from_slice(&KERNEL_CODE.to_le_bytes());
        gdt.set_tss(&tss as *const TaskStateSegment as u64).unwrap();
        assert!(!gdt.live_tss().access().readable());

        // What ltr does: type 0b1001 becomes 0b1011, bit 41 of the descriptor
        gdt.as_bytes_mut()[GDT_TSS_OFFSET as usize + 5] |= 1 << 1;

        assert!(gdt.live_tss().access().readable());
        assert!(gdt.live_tss().access().present());
        assert_eq!(gdt.verify(&tss), Ok(()));
    }

    #[test]
    fn verify_rejects_non_long_mode_code() {
        // 32-bit code segment: D set, L clear
        let mut source = [0u8; 16];
        source[8..].copy_from_slice(&0x00cf_9a00_0000_ffffu64.to_le_bytes());
        let mut gdt = GlobalDescriptorTable::zeroed();
        unsafe {
            bootstrap::copy_bootstrap_gdt(
                &mut gdt,
                &DescriptorTablePointer::new(15, source.as_ptr() as u64),
            )
            .unwrap()
        };

        let tss = TaskStateSegment::with_interrupt_stacks(&STACK_TOPS).unwrap();
        gdt.set_tss(&tss as *const TaskStateSegment as u64).unwrap();
        assert_eq!(gdt.verify(&tss), Err(ErrorCode::BadDescriptor));
    }
}
