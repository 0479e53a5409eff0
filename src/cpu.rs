use core::arch::asm;

const RFLAGS_INTERRUPT_FLAG: u64 = 1 << 9;

/// SAFETY:
///
/// If initializers aren't setup properly, interrupts will cause unexpected behavior
pub unsafe fn enable_interrupts() {
    asm! {
        "sti",
        options(nomem, nostack)
    }
}

/// SAFETY:
///
/// Ensure that this is properly re-enabled or else most hardware won't work
pub unsafe fn disable_interrupts() {
    asm! {
        "cli",
        options(nomem, nostack)
    }
}

pub fn interrupts_enabled() -> bool {
    let rflags: u64;
    unsafe {
        asm! {
            "pushfq",
            "pop {}",
            out(reg) rflags,
            options(nomem, preserves_flags)
        }
    }
    rflags & RFLAGS_INTERRUPT_FLAG != 0
}

/// Runs `f` with interrupts masked and restores the previous state after.
pub fn without_interrupts<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    let enabled = interrupts_enabled();
    if enabled {
        // Safety: restored below
        unsafe { disable_interrupts() };
    }

    let ret = f();

    if enabled {
        // Safety: they were on when we got here
        unsafe { enable_interrupts() };
    }
    ret
}

pub fn halt() -> ! {
    loop {
        unsafe {
            asm! {
                "hlt",
                options(nomem, nostack, preserves_flags)
            }
        }
    }
}
