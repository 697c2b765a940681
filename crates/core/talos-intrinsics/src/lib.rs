//! Raw AArch64 register and instruction wrappers.
//!
//! A zero-dependency leaf crate: every function here is a thin `unsafe`
//! wrapper around a single instruction or short instruction sequence, with
//! no policy attached. Callers (`talos-kernel::arch::aarch64`) build the
//! actual arch-primitive contract on top of these.

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

/// Reads `MPIDR_EL1`, the multiprocessor affinity register.
#[cfg(target_arch = "aarch64")]
#[inline]
pub fn read_mpidr_el1() -> u64 {
    let val: u64;
    unsafe {
        core::arch::asm!("mrs {}, mpidr_el1", out(reg) val, options(nomem, nostack, preserves_flags));
    }
    val
}

/// Reads `MIDR_EL1`, the main id register (implementer/part number/revision).
#[cfg(target_arch = "aarch64")]
#[inline]
pub fn read_midr_el1() -> u64 {
    let val: u64;
    unsafe {
        core::arch::asm!("mrs {}, midr_el1", out(reg) val, options(nomem, nostack, preserves_flags));
    }
    val
}

/// Reads `CurrentEL`, shifted down to a plain `0..=3` exception level.
#[cfg(target_arch = "aarch64")]
#[inline]
pub fn read_current_el() -> u32 {
    let val: u64;
    unsafe {
        core::arch::asm!("mrs {}, CurrentEL", out(reg) val, options(nomem, nostack, preserves_flags));
    }
    ((val >> 2) & 0x3) as u32
}

/// Sets the FPEN bits (20:21) of `CPACR_EL1`, unmasking FP/SIMD traps to EL1.
///
/// # Safety
///
/// Must only be run at EL1, and only once FP/SIMD register state for the
/// calling context has somewhere valid to live (the trap frame reserves
/// space for it).
#[cfg(target_arch = "aarch64")]
#[inline]
pub unsafe fn enable_fpen() {
    unsafe {
        core::arch::asm!(
            "mrs {tmp}, cpacr_el1",
            "orr {tmp}, {tmp}, #(0x3 << 20)",
            "msr cpacr_el1, {tmp}",
            "isb",
            tmp = out(reg) _,
            options(nostack, preserves_flags),
        );
    }
}

/// Executes `wfi` (wait-for-interrupt).
#[cfg(target_arch = "aarch64")]
#[inline]
pub fn wfi() {
    unsafe {
        core::arch::asm!("wfi", options(nomem, nostack, preserves_flags));
    }
}

/// Executes `sev` (send-event), waking any PE parked in `wfe`.
#[cfg(target_arch = "aarch64")]
#[inline]
pub fn sev() {
    unsafe {
        core::arch::asm!("sev", options(nomem, nostack, preserves_flags));
    }
}

/// Full data and instruction synchronization barrier (`dsb sy` + `isb`).
///
/// Used around interrupt-controller register writes and around
/// cross-PE-visible thread-state transitions.
#[cfg(target_arch = "aarch64")]
#[inline]
pub fn full_barrier() {
    unsafe {
        core::arch::asm!("dsb sy", "isb", options(nostack, preserves_flags));
    }
}

/// Issues `hvc #0` with the given PSCI function id and up to three
/// arguments, returning `x0`.
///
/// # Safety
///
/// The caller is responsible for passing a valid PSCI function id; some
/// calls (e.g. `SYSTEM_OFF`) never return.
#[cfg(target_arch = "aarch64")]
#[inline]
pub unsafe fn hvc_call(function_id: u64, arg1: u64, arg2: u64, arg3: u64) -> i64 {
    let ret: i64;
    unsafe {
        core::arch::asm!(
            "hvc #0",
            inout("x0") function_id => ret,
            in("x1") arg1,
            in("x2") arg2,
            in("x3") arg3,
            options(nostack),
        );
    }
    ret
}

/// Loads `VBAR_EL1` with the physical/virtual address of a 2KiB-aligned
/// exception vector table.
///
/// # Safety
///
/// `table` must point at a valid, correctly laid out vector table for the
/// remaining lifetime of EL1 code on this PE.
#[cfg(target_arch = "aarch64")]
#[inline]
pub unsafe fn write_vbar_el1(table: u64) {
    unsafe {
        core::arch::asm!("msr vbar_el1, {}", "isb", in(reg) table, options(nostack, preserves_flags));
    }
}

/// Reads `TTBR0_EL1`, the user (lower half) translation table base.
#[cfg(target_arch = "aarch64")]
#[inline]
pub fn read_ttbr0_el1() -> u64 {
    let val: u64;
    unsafe {
        core::arch::asm!("mrs {}, ttbr0_el1", out(reg) val, options(nomem, nostack, preserves_flags));
    }
    val
}

/// Writes `TTBR0_EL1` and performs the barrier sequence required before the
/// new mapping is guaranteed visible to subsequent instruction fetches.
///
/// # Safety
///
/// `ttbr0` must be a physical address of a valid, correctly formatted
/// translation table for the current VMSA configuration.
#[cfg(target_arch = "aarch64")]
#[inline]
pub unsafe fn write_ttbr0_el1(ttbr0: u64) {
    unsafe {
        core::arch::asm!(
            "msr ttbr0_el1, {}",
            "dsb ish",
            "isb",
            in(reg) ttbr0,
            options(nostack, preserves_flags),
        );
    }
}

/// Reads `SP_EL0`, the EL0 (user) stack pointer shadow register.
#[cfg(target_arch = "aarch64")]
#[inline]
pub fn read_sp_el0() -> u64 {
    let val: u64;
    unsafe {
        core::arch::asm!("mrs {}, sp_el0", out(reg) val, options(nomem, nostack, preserves_flags));
    }
    val
}

/// Writes `SP_EL0`.
#[cfg(target_arch = "aarch64")]
#[inline]
pub fn write_sp_el0(sp: u64) {
    unsafe {
        core::arch::asm!("msr sp_el0, {}", in(reg) sp, options(nomem, nostack, preserves_flags));
    }
}

/// Enables the GICv3 system register CPU interface (`ICC_SRE_EL1.SRE`).
///
/// # Safety
///
/// Must be called once per PE before touching any other `ICC_*_EL1`
/// register.
#[cfg(target_arch = "aarch64")]
#[inline]
pub unsafe fn enable_icc_sre_el1() {
    unsafe {
        core::arch::asm!(
            "mrs {tmp}, S3_0_C12_C12_5",
            "orr {tmp}, {tmp}, #1",
            "msr S3_0_C12_C12_5, {tmp}",
            "isb",
            tmp = out(reg) _,
            options(nostack, preserves_flags),
        );
    }
}

/// Reads `CNTFRQ_EL0`, the generic timer's tick frequency in Hz.
#[cfg(target_arch = "aarch64")]
#[inline]
pub fn read_cntfrq_el0() -> u64 {
    let val: u64;
    unsafe {
        core::arch::asm!("mrs {}, cntfrq_el0", out(reg) val, options(nomem, nostack, preserves_flags));
    }
    val
}

/// Reads `CNTPCT_EL0`, the physical timer's free-running counter.
#[cfg(target_arch = "aarch64")]
#[inline]
pub fn read_cntpct_el0() -> u64 {
    let val: u64;
    unsafe {
        core::arch::asm!("mrs {}, cntpct_el0", out(reg) val, options(nomem, nostack, preserves_flags));
    }
    val
}

/// Sets the physical timer's down-counter (`CNTP_TVAL_EL0`), in timer ticks.
#[cfg(target_arch = "aarch64")]
#[inline]
pub fn set_cntp_tval_el0(ticks: u32) {
    unsafe {
        core::arch::asm!("msr cntp_tval_el0, {}", in(reg) (ticks as u64), options(nomem, nostack, preserves_flags));
    }
}

/// Enables or masks the physical timer (`CNTP_CTL_EL0`: bit 0 enable, bit 1 mask).
#[cfg(target_arch = "aarch64")]
#[inline]
pub fn set_cntp_ctl_el0(enabled: bool, masked: bool) {
    let val: u64 = (enabled as u64) | ((masked as u64) << 1);
    unsafe {
        core::arch::asm!("msr cntp_ctl_el0, {}", in(reg) val, options(nomem, nostack, preserves_flags));
    }
}

// ── Host fallbacks, so talos-core/talos-kernel's pure-logic modules that
// happen to pull this crate in stay `cargo test`-able off-target. ──────────

#[cfg(not(target_arch = "aarch64"))]
#[inline]
pub fn read_mpidr_el1() -> u64 {
    0
}

#[cfg(not(target_arch = "aarch64"))]
#[inline]
pub fn read_midr_el1() -> u64 {
    0
}

#[cfg(not(target_arch = "aarch64"))]
#[inline]
pub fn read_current_el() -> u32 {
    1
}

#[cfg(not(target_arch = "aarch64"))]
#[inline]
pub unsafe fn enable_fpen() {}

#[cfg(not(target_arch = "aarch64"))]
#[inline]
pub fn wfi() {}

#[cfg(not(target_arch = "aarch64"))]
#[inline]
pub fn sev() {}

#[cfg(not(target_arch = "aarch64"))]
#[inline]
pub fn full_barrier() {
    core::sync::atomic::fence(core::sync::atomic::Ordering::SeqCst);
}

#[cfg(not(target_arch = "aarch64"))]
#[inline]
pub unsafe fn hvc_call(_function_id: u64, _arg1: u64, _arg2: u64, _arg3: u64) -> i64 {
    0
}

#[cfg(not(target_arch = "aarch64"))]
#[inline]
pub unsafe fn write_vbar_el1(_table: u64) {}

#[cfg(not(target_arch = "aarch64"))]
#[inline]
pub fn read_ttbr0_el1() -> u64 {
    0
}

#[cfg(not(target_arch = "aarch64"))]
#[inline]
pub unsafe fn write_ttbr0_el1(_ttbr0: u64) {}

#[cfg(not(target_arch = "aarch64"))]
#[inline]
pub fn read_sp_el0() -> u64 {
    0
}

#[cfg(not(target_arch = "aarch64"))]
#[inline]
pub fn write_sp_el0(_sp: u64) {}

#[cfg(not(target_arch = "aarch64"))]
#[inline]
pub unsafe fn enable_icc_sre_el1() {}

#[cfg(not(target_arch = "aarch64"))]
#[inline]
pub fn read_cntfrq_el0() -> u64 {
    1_000_000_000
}

#[cfg(not(target_arch = "aarch64"))]
#[inline]
pub fn read_cntpct_el0() -> u64 {
    0
}

#[cfg(not(target_arch = "aarch64"))]
#[inline]
pub fn set_cntp_tval_el0(_ticks: u32) {}

#[cfg(not(target_arch = "aarch64"))]
#[inline]
pub fn set_cntp_ctl_el0(_enabled: bool, _masked: bool) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_fallback_mpidr_is_zero() {
        assert_eq!(read_mpidr_el1(), 0);
    }

    #[test]
    fn host_fallback_current_el_is_one() {
        assert_eq!(read_current_el(), 1);
    }

    #[test]
    fn host_fallback_hvc_call_is_noop() {
        let ret = unsafe { hvc_call(0x8400_0008, 0, 0, 0) };
        assert_eq!(ret, 0);
    }
}
