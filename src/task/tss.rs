/*
 * 64-bit TSS Implementation
 * References:
 * https://wiki.osdev.org/Task_State_Segment
 */

use crate::{
    config::{TOTAL_IST_ENTRIES, TOTAL_PRIVILEGE_STACKS, TSS_SIZE_BYTES},
    cpu::without_interrupts,
    status::ErrorCode,
};
use core::convert::TryFrom;
use core::mem::size_of;
use spin::Mutex;
use static_assertions::const_assert_eq;
use volatile::Volatile;

/**
 *  x86_64 TSS Layout (byte offsets):
 *  0-3: Reserved (0)
 *  4-27: RSP0, RSP1, RSP2
 *  28-35: Reserved (0)
 *  36-91: IST1 - IST7
 *  92-99: Reserved (0)
 *  100-101: Reserved (0)
 *  102-103: I/O Map Base Address
 */
const RSP_OFFSET: usize = 4;
const IST_OFFSET: usize = 36;
const IO_MAP_BASE_OFFSET: usize = 102;
const RESERVED_RANGES: [(usize, usize); 4] = [(0, 4), (28, 36), (92, 100), (100, 102)];

/// The one TSS of this processor. Its address ends up in the GDT, so it is
/// never moved; everything else only touches it through the functions below.
pub static TSS: Mutex<TaskStateSegment> = Mutex::new(TaskStateSegment::zeroed());

#[repr(C, align(8))]
#[derive(Clone, PartialEq, Eq)]
pub struct TaskStateSegment {
    bytes: [u8; TSS_SIZE_BYTES],
}

const_assert_eq!(size_of::<TaskStateSegment>(), TSS_SIZE_BYTES);

/// A slot in the interrupt stack table, 1 through 7. An IDT gate's IST
/// field holds this number; 0 there means "no stack switch".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IstIndex(u8);

impl IstIndex {
    pub fn all() -> impl Iterator<Item = IstIndex> {
        (1..=TOTAL_IST_ENTRIES as u8).map(IstIndex)
    }

    pub const fn value(self) -> u8 {
        self.0
    }

    const fn offset(self) -> usize {
        IST_OFFSET + (self.0 as usize - 1) * size_of::<u64>()
    }
}

impl TryFrom<u8> for IstIndex {
    type Error = ErrorCode;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1..=7 => Ok(Self(value)),
            _ => Err(ErrorCode::InvArg),
        }
    }
}

impl TaskStateSegment {
    pub const fn zeroed() -> Self {
        Self {
            bytes: [0; TSS_SIZE_BYTES],
        }
    }

    /// A TSS that only switches stacks through the IST. RSP0-2 stay zero
    /// and the I/O map base points past the end, so there is no bitmap.
    pub fn with_interrupt_stacks(stack_tops: &[u64; TOTAL_IST_ENTRIES]) -> Result<Self, ErrorCode> {
        let mut tss = Self::zeroed();
        for (index, top) in IstIndex::all().zip(stack_tops.iter()) {
            tss.set_interrupt_stack(index, *top);
        }
        tss.set_io_map_base(u16::try_from(TSS_SIZE_BYTES)?);
        Ok(tss)
    }

    pub fn as_bytes(&self) -> &[u8; TSS_SIZE_BYTES] {
        &self.bytes
    }

    fn read_u64(&self, offset: usize) -> u64 {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&self.bytes[offset..offset + 8]);
        u64::from_le_bytes(raw)
    }

    fn write_u64(&mut self, offset: usize, value: u64) {
        self.bytes[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
    }

    pub fn privilege_stack(&self, level: usize) -> Result<u64, ErrorCode> {
        if level >= TOTAL_PRIVILEGE_STACKS {
            return Err(ErrorCode::InvArg);
        }
        Ok(self.read_u64(RSP_OFFSET + level * size_of::<u64>()))
    }

    pub fn interrupt_stack(&self, index: IstIndex) -> u64 {
        self.read_u64(index.offset())
    }

    pub fn set_interrupt_stack(&mut self, index: IstIndex, top: u64) {
        self.write_u64(index.offset(), top);
    }

    /// Same as `set_interrupt_stack`, but as a single volatile store the
    /// CPU can observe. Used on the live TSS.
    pub fn store_interrupt_stack(&mut self, index: IstIndex, top: u64) {
        let offset = index.offset();
        // Safety: in bounds, and Volatile<[u8; 8]> has alignment 1 so the
        // misaligned slot is fine
        let slot = unsafe {
            &mut *(self.bytes[offset..offset + 8].as_mut_ptr() as *mut Volatile<[u8; 8]>)
        };
        slot.write(top.to_le_bytes());
    }

    pub fn io_map_base(&self) -> u16 {
        u16::from_le_bytes([
            self.bytes[IO_MAP_BASE_OFFSET],
            self.bytes[IO_MAP_BASE_OFFSET + 1],
        ])
    }

    pub fn set_io_map_base(&mut self, base: u16) {
        self.bytes[IO_MAP_BASE_OFFSET..IO_MAP_BASE_OFFSET + 2].copy_from_slice(&base.to_le_bytes());
    }

    pub fn reserved_is_zero(&self) -> bool {
        RESERVED_RANGES
            .iter()
            .all(|&(start, end)| self.bytes[start..end].iter().all(|byte| *byte == 0))
    }

    /// Every IST slot is set and no two slots share a stack.
    pub fn verify(&self) -> Result<(), ErrorCode> {
        for (i, index) in IstIndex::all().enumerate() {
            let top = self.interrupt_stack(index);
            if top == 0 {
                return Err(ErrorCode::NotPresent);
            }
            if IstIndex::all()
                .skip(i + 1)
                .any(|other| self.interrupt_stack(other) == top)
            {
                return Err(ErrorCode::BadDescriptor);
            }
        }

        if usize::from(self.io_map_base()) != TSS_SIZE_BYTES || !self.reserved_is_zero() {
            return Err(ErrorCode::BadDescriptor);
        }
        Ok(())
    }
}

/// Zeroes the static TSS and fills in the interrupt stacks. Returns the
/// address the GDT has to point at.
pub fn setup_tss(stack_tops: &[u64; TOTAL_IST_ENTRIES]) -> Result<u64, ErrorCode> {
    let mut tss = TSS.lock();
    *tss = TaskStateSegment::with_interrupt_stacks(stack_tops)?;
    Ok(&*tss as *const TaskStateSegment as u64)
}

/// Points one IST slot of the live TSS at a new stack.
///
/// SAFETY:
///
/// `top` has to be the end of a mapped, otherwise unused stack. The CPU may
/// switch to it on the next interrupt routed through `index`.
pub unsafe fn update_interrupt_stack(index: IstIndex, top: u64) {
    without_interrupts(|| TSS.lock().store_interrupt_stack(index, top));
}
