//! Per-PE local storage primitives.
//!
//! [`PerPe`] is a fixed-size array indexed by the running processing
//! element's id, giving each PE its own slot without a lock. [`current_pe_id`]
//! reads `MPIDR_EL1.Aff0`, the affinity field PSCI and the GIC agree on as the
//! PE's identity.

use crate::id::PeId;

/// Maximum number of processing elements this kernel can track.
pub const MAX_PES: usize = 256;

/// A per-PE slot array.
///
/// `T` must be `Sync`-free to access: callers reach their own slot through
/// [`PerPe::get`], and another PE's slot through [`PerPe::get_for`] only when
/// they know external synchronization (e.g. during bring-up, before the
/// target PE is running) makes that safe.
pub struct PerPe<T> {
    data: [T; MAX_PES],
}

impl<T> PerPe<T> {
    /// Creates a new per-PE array from a const initializer.
    pub const fn new(data: [T; MAX_PES]) -> Self {
        Self { data }
    }

    /// Returns the slot for the calling PE.
    ///
    /// Falls back to slot 0 if the PE id is out of range, which should only
    /// happen before per-PE bring-up is complete.
    pub fn get(&self) -> &T {
        let id = current_pe_id().as_usize();
        if id < MAX_PES {
            &self.data[id]
        } else {
            &self.data[0]
        }
    }

    /// Returns the slot for a specific PE.
    ///
    /// # Panics
    ///
    /// Panics if `pe_id` is out of range.
    pub fn get_for(&self, pe_id: PeId) -> &T {
        &self.data[pe_id.as_usize()]
    }
}

// SAFETY: each slot is only mutated through interior mutability types (locks,
// atomics, `RacyCell`) that are themselves `Sync`; the array indexing never
// aliases across PEs under normal operation.
unsafe impl<T: Sync> Sync for PerPe<T> {}
unsafe impl<T: Send> Send for PerPe<T> {}

/// Returns the id of the PE executing this code.
///
/// Reads `MPIDR_EL1` and masks to `Aff0`, matching the affinity field used by
/// PSCI `CPU_ON` and by the GIC redistributor lookup.
#[cfg(all(target_os = "none", target_arch = "aarch64"))]
#[inline]
pub fn current_pe_id() -> PeId {
    let mpidr: u64;
    unsafe {
        core::arch::asm!("mrs {}, mpidr_el1", out(reg) mpidr, options(nomem, nostack, preserves_flags));
    }
    PeId::new((mpidr & 0xff) as u32)
}

/// Host fallback: always PE 0.
#[cfg(not(all(target_os = "none", target_arch = "aarch64")))]
#[inline]
pub fn current_pe_id() -> PeId {
    PeId::new(0)
}

/// What the trap entry path found waiting for it when it was invoked.
///
/// Set by the exception vector stub before calling into Rust and consulted
/// when deciding whether an incoming IRQ must be deferred (see
/// [`IrqCause::Syscall`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqCause {
    /// Not currently inside a trap handler.
    None,
    /// Inside the `svc #0` entry path; IRQs must be deferred to preserve
    /// syscall atomicity.
    Syscall,
    /// Inside a top-level IRQ handler.
    Irq,
    /// Draining the deferred-IRQ bitmap after a syscall completed.
    DeferredIrq,
}

/// The kind of fault a thread has told the kernel it might take next.
///
/// Populated by `copy_from_user`/`copy_to_user` before touching user memory
/// and consulted by the synchronous-exception handler: a same-EL data abort
/// with a matching expectation is a recoverable fault (the faulting
/// instruction is skipped by resuming at `recover_ip`), not a kernel panic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// A user-memory access may fault; recover by returning `-EFAULT`.
    UserAccess,
}

/// A single-slot fault expectation, set immediately before an operation that
/// might fault and cleared immediately after.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultExpectation {
    /// What kind of fault is expected.
    pub kind: FaultKind,
    /// Instruction pointer to resume at if the expected fault occurs.
    pub recover_ip: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_pe_id_host_fallback_is_zero() {
        assert_eq!(current_pe_id(), PeId::new(0));
    }

    #[test]
    fn per_pe_get_for_indexes_by_id() {
        let mut data = [0u32; MAX_PES];
        data[5] = 42;
        let per_pe = PerPe::new(data);
        assert_eq!(*per_pe.get_for(PeId::new(5)), 42);
        assert_eq!(*per_pe.get_for(PeId::new(0)), 0);
    }

    #[test]
    fn per_pe_get_uses_current_pe_fallback() {
        let per_pe = PerPe::new([7u32; MAX_PES]);
        assert_eq!(*per_pe.get(), 7);
    }

    #[test]
    #[should_panic]
    fn per_pe_get_for_out_of_range_panics() {
        let per_pe = PerPe::new([0u32; MAX_PES]);
        let _ = per_pe.get_for(PeId::new(MAX_PES as u32));
    }
}
