use core::arch::asm;

/// SAFETY:
///
/// Reading some ports has side effects on the device behind them
#[inline(always)]
pub unsafe fn insb(port: u16) -> u8 {
    let res: u8;
    asm!(
        "in al, dx",
        out("al") res,
        in("dx") port,
        options(nomem, nostack, preserves_flags)
    );
    res
}

/// SAFETY:
///
/// The caller owns the device behind `port`
#[inline(always)]
pub unsafe fn outb(port: u16, value: u8) {
    asm!(
        "out dx, al",
        in("dx") port,
        in("al") value,
        options(nomem, nostack, preserves_flags)
    );
}
