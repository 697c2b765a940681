//! PSCI (Power State Coordination Interface) calls for multicore bring-up
//! and shutdown, issued via `HVC` (see the external-interfaces contract).

const PSCI_CPU_ON: u64 = 0xc400_0003;
const PSCI_SYSTEM_OFF: u64 = 0x8400_0008;

/// PSCI return codes (subset used by this kernel).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PsciError {
    /// `target_pe` is already on, or already coming up.
    AlreadyOn,
    /// The call failed for a reason this kernel does not distinguish.
    Denied,
}

/// Starts a secondary PE at `entry`, passing `context_id` to it.
///
/// `target_pe` is the PSCI "MPIDR-style" target id; this kernel's topology
/// uses a flat `Aff0` scheme, so `target_pe` is the same as [`PeId`].
///
/// [`PeId`]: talos_core::id::PeId
pub fn cpu_on(target_pe: u64, entry: u64, context_id: u64) -> Result<(), PsciError> {
    // SAFETY: PSCI_CPU_ON is a well-known, non-destructive function id.
    let ret = unsafe { talos_intrinsics::hvc_call(PSCI_CPU_ON, target_pe, entry, context_id) };
    match ret {
        0 => Ok(()),
        -4 => Err(PsciError::AlreadyOn),
        _ => Err(PsciError::Denied),
    }
}

/// Powers off the whole system. Never returns on success.
pub fn poweroff() -> ! {
    // SAFETY: PSCI_SYSTEM_OFF does not return; if the call is somehow
    // rejected we fall through to a spin loop instead of undefined behavior.
    unsafe {
        talos_intrinsics::hvc_call(PSCI_SYSTEM_OFF, 0, 0, 0);
    }
    loop {
        talos_intrinsics::wfi();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_on_host_fallback_reports_success() {
        // The host fallback `hvc_call` always returns 0.
        assert_eq!(cpu_on(1, 0x4000_0000, 0), Ok(()));
    }
}
