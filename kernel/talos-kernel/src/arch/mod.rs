//! AArch64 arch-primitive layer: exception handling, the interrupt
//! controller, PSCI-based multicore bring-up, and the per-PE spin table.

pub mod gic;
pub mod psci;
pub mod trap;
pub mod uaccess;

use core::sync::atomic::{AtomicU64, Ordering};

use talos_core::id::PeId;

/// Number of entries in the boot spin table, one per PE the kernel could
/// ever bring up.
pub const SPIN_TABLE_ENTRIES: usize = talos_core::pls::MAX_PES;

/// Boot-stack-top spin table: secondary PEs poll their own entry after PSCI
/// `CPU_ON` and jump into the kernel once it becomes non-zero.
static SPIN_TABLE: [AtomicU64; SPIN_TABLE_ENTRIES] = {
    const ZERO: AtomicU64 = AtomicU64::new(0);
    [ZERO; SPIN_TABLE_ENTRIES]
};

/// Publishes the boot-stack top for `pe`, releasing it to start executing.
pub fn release_pe(pe: PeId, boot_stack_top: u64) {
    SPIN_TABLE[pe.as_usize()].store(boot_stack_top, Ordering::Release);
    talos_intrinsics::sev();
}

/// Polls this PE's spin-table entry, returning the boot stack top once set.
pub fn wait_for_release(pe: PeId) -> u64 {
    loop {
        let val = SPIN_TABLE[pe.as_usize()].load(Ordering::Acquire);
        if val != 0 {
            return val;
        }
        talos_intrinsics::wfi();
    }
}

/// Per-PE architectural bring-up: FP/SIMD, vector table, GIC CPU interface.
///
/// # Safety
///
/// Must run once per PE, early, with interrupts masked.
pub unsafe fn cpu_init(gic: &gic::Gic, pe_index: usize) {
    unsafe {
        talos_intrinsics::enable_fpen();
        trap::install();
        gic.init_this_pe(pe_index, crate::config::DEFAULT_IRQ_PRIORITY);
    }
}

/// Installs `ttbr0` as this PE's address space if it differs from what is
/// already loaded, called by the scheduler on every thread switch, before
/// the trap-exit assembly restores registers into the new thread.
///
/// With the MMU disabled in this revision every process shares `ttbr0 == 0`,
/// so the read-compare always short-circuits before the write — the call
/// site is what a future per-process address space needs, not the write
/// itself.
///
/// # Safety
///
/// Must run with interrupts masked, as part of the trap-exit sequence, and
/// `ttbr0` must be a valid translation table base for the current VMSA
/// configuration (or `0`, meaning none).
pub unsafe fn switch_table(ttbr0: u64) {
    if talos_intrinsics::read_ttbr0_el1() == ttbr0 {
        return;
    }
    unsafe { talos_intrinsics::write_ttbr0_el1(ttbr0) };
}

/// Masks all maskable exceptions on the current PE (`DAIFSet, #0xf`).
#[inline]
pub fn disable_irqs() {
    unsafe {
        core::arch::asm!("msr DAIFSet, #0xf", options(nomem, nostack));
    }
}

/// Stops every PE, used on an unrecoverable kernel fault. Never returns.
pub fn stop_cores() -> ! {
    disable_irqs();
    loop {
        talos_intrinsics::wfi();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spin_table_starts_all_zero() {
        assert_eq!(SPIN_TABLE[0].load(Ordering::Relaxed), 0);
        assert_eq!(SPIN_TABLE[SPIN_TABLE_ENTRIES - 1].load(Ordering::Relaxed), 0);
    }

    #[test]
    fn release_pe_then_wait_for_release_returns_stack_top() {
        release_pe(PeId::new(3), 0xdead_beef);
        assert_eq!(wait_for_release(PeId::new(3)), 0xdead_beef);
    }

    #[test]
    fn switch_table_short_circuits_on_matching_table() {
        // Host fallback `read_ttbr0_el1` always returns 0; switching to 0
        // must not reach the (unimplemented on host) write path.
        unsafe { switch_table(0) };
    }
}
