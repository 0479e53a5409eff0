/*
 * 64-bit segment descriptors
 * References:
 * https://wiki.osdev.org/Global_Descriptor_Table#Segment_Descriptor
 * https://wiki.osdev.org/Global_Descriptor_Table#Long_Mode_System_Segment_Descriptor
 *
 * Descriptors are kept as raw little-endian bytes. Limit and base are split
 * by hand; the access byte and the flags byte are bilge bitfields.
 */

use crate::status::ErrorCode;
use bilge::prelude::*;
use core::fmt;
use core::mem::size_of;
use static_assertions::const_assert_eq;

pub const MAX_SEGMENT_LIMIT: u32 = 0xF_FFFF;

const LIMIT_LOW: usize = 0;
const BASE_LOW: usize = 2;
const BASE_MID: usize = 4;
const ACCESS: usize = 5;
const FLAGS: usize = 6;
const BASE_HIGH: usize = 7;

// Offsets into the upper 8 bytes of a system descriptor
const BASE_UPPER: usize = 0;
const RESERVED: usize = 4;

#[bitsize(8)]
#[derive(FromBits, DebugBits, Clone, Copy, PartialEq)]
pub struct GdtAccess {
    pub accessed: bool,
    pub readable: bool,
    pub conforming: bool,
    pub executable: bool,
    pub not_sys: bool,
    pub dpl: u2,
    pub present: bool,
}

#[bitsize(8)]
#[derive(FromBits, DebugBits, Clone, Copy, PartialEq)]
pub struct GdtFlags {
    pub limit_high: u4,
    pub available: bool,
    pub long_mode: bool,
    pub default_op_size: bool,
    pub granularity: bool,
}

/// Splits a 20-bit segment limit into its low 16 and high 4 bits.
pub fn encode_limit(limit: u32) -> Result<(u16, u4), ErrorCode> {
    if limit > MAX_SEGMENT_LIMIT {
        return Err(ErrorCode::OutOfBounds);
    }
    let low = (limit & 0xffff) as u16;
    let high = u4::new(((limit >> 16) & 0xf) as u8);
    Ok((low, high))
}

pub fn decode_limit(low: u16, high: u4) -> u32 {
    (low as u32) | ((high.value() as u32) << 16)
}

/// The four pieces a base address is scattered into: bits 0-15, 16-23,
/// 24-31 and, for system descriptors only, 32-63.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaseParts {
    pub low: u16,
    pub mid: u8,
    pub high: u8,
    pub upper: u32,
}

impl BaseParts {
    pub const fn split(base: u64) -> Self {
        Self {
            low: (base & 0xffff) as u16,
            mid: ((base >> 16) & 0xff) as u8,
            high: ((base >> 24) & 0xff) as u8,
            upper: ((base >> 32) & 0xffff_ffff) as u32,
        }
    }

    pub const fn join(self) -> u64 {
        (self.low as u64)
            | ((self.mid as u64) << 16)
            | ((self.high as u64) << 24)
            | ((self.upper as u64) << 32)
    }
}

/// A legacy 8 byte code/data descriptor. Base and limit are ignored by the
/// CPU in long mode but still have to be consistent.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SegmentDescriptor([u8; 8]);

const_assert_eq!(size_of::<SegmentDescriptor>(), 8);

impl SegmentDescriptor {
    pub const NULL: Self = Self([0; 8]);

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw.to_le_bytes())
    }

    pub const fn to_raw(&self) -> u64 {
        u64::from_le_bytes(self.0)
    }

    pub const fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }

    pub fn is_null(&self) -> bool {
        self.0 == [0; 8]
    }

    pub fn limit(&self) -> u32 {
        let low = u16::from_le_bytes([self.0[LIMIT_LOW], self.0[LIMIT_LOW + 1]]);
        decode_limit(low, self.flags().limit_high())
    }

    pub fn set_limit(&mut self, limit: u32) -> Result<(), ErrorCode> {
        let (low, high) = encode_limit(limit)?;
        self.0[LIMIT_LOW..LIMIT_LOW + 2].copy_from_slice(&low.to_le_bytes());
        let mut flags = self.flags();
        flags.set_limit_high(high);
        self.set_flags(flags);
        Ok(())
    }

    fn base_parts(&self) -> BaseParts {
        BaseParts {
            low: u16::from_le_bytes([self.0[BASE_LOW], self.0[BASE_LOW + 1]]),
            mid: self.0[BASE_MID],
            high: self.0[BASE_HIGH],
            upper: 0,
        }
    }

    fn set_base_parts(&mut self, parts: BaseParts) {
        self.0[BASE_LOW..BASE_LOW + 2].copy_from_slice(&parts.low.to_le_bytes());
        self.0[BASE_MID] = parts.mid;
        self.0[BASE_HIGH] = parts.high;
    }

    pub fn base(&self) -> u32 {
        self.base_parts().join() as u32
    }

    pub fn set_base(&mut self, base: u32) {
        self.set_base_parts(BaseParts::split(base as u64));
    }

    pub fn access(&self) -> GdtAccess {
        GdtAccess::from(self.0[ACCESS])
    }

    pub fn set_access(&mut self, access: GdtAccess) {
        self.0[ACCESS] = u8::from(access);
    }

    pub fn flags(&self) -> GdtFlags {
        GdtFlags::from(self.0[FLAGS])
    }

    /// Overwrites the whole flags byte, including limit bits 16-19.
    pub fn set_flags(&mut self, flags: GdtFlags) {
        self.0[FLAGS] = u8::from(flags);
    }
}

impl fmt::Debug for SegmentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SegmentDescriptor({:#018x})", self.to_raw())
    }
}

/// A 16 byte long mode system descriptor (TSS/LDT). The legacy layout holds
/// the low 32 bits of the base, the extension holds the rest.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SystemSegmentDescriptor {
    low: SegmentDescriptor,
    high: [u8; 8],
}

const_assert_eq!(size_of::<SystemSegmentDescriptor>(), 16);

impl SystemSegmentDescriptor {
    pub const NULL: Self = Self {
        low: SegmentDescriptor::NULL,
        high: [0; 8],
    };

    /// Descriptor for an available 64-bit TSS (type 0b1001) at `base`.
    pub fn available_tss(base: u64, limit: u32) -> Result<Self, ErrorCode> {
        let mut descriptor = Self::NULL;
        descriptor.set_limit(limit)?;
        descriptor.set_base(base);

        let mut access = GdtAccess::from(0u8);
        access.set_accessed(true);
        access.set_executable(true);
        access.set_present(true);
        descriptor.set_access(access);

        Ok(descriptor)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        // Safety: repr(C) over two byte arrays, no padding (size asserted above)
        unsafe { &*(self as *const Self as *const [u8; 16]) }
    }

    pub fn limit(&self) -> u32 {
        self.low.limit()
    }

    pub fn set_limit(&mut self, limit: u32) -> Result<(), ErrorCode> {
        self.low.set_limit(limit)
    }

    pub fn base(&self) -> u64 {
        let upper = u32::from_le_bytes([
            self.high[BASE_UPPER],
            self.high[BASE_UPPER + 1],
            self.high[BASE_UPPER + 2],
            self.high[BASE_UPPER + 3],
        ]);
        BaseParts {
            upper,
            ..self.low.base_parts()
        }
        .join()
    }

    pub fn set_base(&mut self, base: u64) {
        let parts = BaseParts::split(base);
        self.low.set_base_parts(parts);
        self.high[BASE_UPPER..BASE_UPPER + 4].copy_from_slice(&parts.upper.to_le_bytes());
    }

    pub fn access(&self) -> GdtAccess {
        self.low.access()
    }

    pub fn set_access(&mut self, access: GdtAccess) {
        self.low.set_access(access);
    }

    pub fn flags(&self) -> GdtFlags {
        self.low.flags()
    }

    pub fn reserved_is_zero(&self) -> bool {
        self.high[RESERVED..].iter().all(|byte| *byte == 0)
    }
}

impl fmt::Debug for SystemSegmentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SystemSegmentDescriptor({:#018x}, {:#018x})",
            u64::from_le_bytes(self.high),
            self.low.to_raw()
        )
    }
}
