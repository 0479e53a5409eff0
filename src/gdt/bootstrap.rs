use super::{load::DescriptorTablePointer, GlobalDescriptorTable};
use crate::config::GDT_SIZE_BYTES;
use crate::status::ErrorCode;
use core::ptr;

/// Copies the table the boot stage loaded (null + code segment) over the
/// start of `gdt`. Whatever lies past the bootstrap table is left alone.
///
/// SAFETY:
///
/// `bootstrap.base()` must point to `bootstrap.size_bytes()` readable bytes
/// that do not overlap `gdt`.
pub unsafe fn copy_bootstrap_gdt(
    gdt: &mut GlobalDescriptorTable,
    bootstrap: &DescriptorTablePointer,
) -> Result<(), ErrorCode> {
    let len = bootstrap.size_bytes();
    if len > GDT_SIZE_BYTES {
        return Err(ErrorCode::OutOfBounds);
    }

    ptr::copy_nonoverlapping(
        bootstrap.base() as *const u8,
        gdt.as_bytes_mut().as_mut_ptr(),
        len,
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_exactly_the_bootstrap_bytes() {
        let mut source = [0u8; 16];
        source[8..].copy_from_slice(&0x00af_9a00_0000_ffffu64.to_le_bytes());
        let bootstrap = DescriptorTablePointer::new(15, source.as_ptr() as u64);

        let mut gdt = GlobalDescriptorTable::zeroed();
        gdt.as_bytes_mut()[16..].fill(0xaa);
        unsafe { copy_bootstrap_gdt(&mut gdt, &bootstrap).unwrap() };

        assert_eq!(&gdt.as_bytes()[..16], &source);
        assert!(gdt.as_bytes()[16..].iter().all(|byte| *byte == 0xaa));
    }

    #[test]
    fn full_size_bootstrap_table_fits() {
        let mut source = [0u8; 32];
        source[8..].fill(0x5a);
        let bootstrap = DescriptorTablePointer::new(31, source.as_ptr() as u64);

        let mut gdt = GlobalDescriptorTable::zeroed();
        unsafe { copy_bootstrap_gdt(&mut gdt, &bootstrap).unwrap() };

        assert_eq!(gdt.as_bytes(), &source);
    }

    #[test]
    fn one_byte_too_many_is_rejected() {
        let source = [0u8; 33];
        let bootstrap = DescriptorTablePointer::new(32, source.as_ptr() as u64);

        let mut gdt = GlobalDescriptorTable::zeroed();
        let res = unsafe { copy_bootstrap_gdt(&mut gdt, &bootstrap) };

        assert_eq!(res, Err(ErrorCode::OutOfBounds));
    }

    #[test]
    fn oversized_bootstrap_table_is_rejected() {
        let source = [0u8; 40];
        let bootstrap = DescriptorTablePointer::new(39, source.as_ptr() as u64);

        let mut gdt = GlobalDescriptorTable::zeroed();
        let res = unsafe { copy_bootstrap_gdt(&mut gdt, &bootstrap) };

        assert_eq!(res, Err(ErrorCode::OutOfBounds));
        assert!(gdt.as_bytes().iter().all(|byte| *byte == 0));
    }
}
