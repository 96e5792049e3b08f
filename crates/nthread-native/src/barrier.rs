//! Full memory barrier.

/// Full bidirectional fence: neither the compiler nor the CPU moves a load or
/// store across it in either direction.
#[inline]
pub fn mem_barrier() {
    #[cfg(any(
        target_arch = "x86_64",
        all(target_arch = "x86", target_feature = "sse2")
    ))]
    // SAFETY: `mfence` takes no operands and only orders memory accesses.
    unsafe {
        core::arch::asm!("mfence", options(nostack, preserves_flags));
    }

    #[cfg(target_arch = "aarch64")]
    // SAFETY: `dmb ish` takes no operands and only orders memory accesses.
    unsafe {
        core::arch::asm!("dmb ish", options(nostack, preserves_flags));
    }

    #[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
    // SAFETY: `fence` takes no register operands and only orders memory and I/O accesses.
    unsafe {
        core::arch::asm!("fence iorw, iorw", options(nostack, preserves_flags));
    }

    #[cfg(not(any(
        target_arch = "x86_64",
        all(target_arch = "x86", target_feature = "sse2"),
        target_arch = "aarch64",
        target_arch = "riscv32",
        target_arch = "riscv64"
    )))]
    core::sync::atomic::fence(core::sync::atomic::Ordering::SeqCst);
}
