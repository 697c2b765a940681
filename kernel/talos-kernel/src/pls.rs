//! Concrete per-PE local storage.
//!
//! Built on [`talos_core::pls::PerPe`], populated once at boot (see
//! [`init`]) before any secondary PE is released, so every later access is a
//! plain read of an already-initialized slot.

extern crate alloc;

use talos_core::cell::RacyCell;
use talos_core::id::{PeId, Tid};
use talos_core::pls::{current_pe_id, FaultExpectation, IrqCause, PerPe};
use talos_core::sync::IrqSpinLock;

use crate::sched::FairScheduler;

/// Everything the kernel tracks per PE: the running thread, the deferred-IRQ
/// state machine, the recoverable-fault slot, and this PE's run queue.
pub struct Pls {
    /// This PE's id.
    pub id: PeId,
    /// The thread currently executing on this PE, if any.
    current_thread: RacyCell<Option<Tid>>,
    /// SGIs/PPIs that arrived while a syscall or another IRQ was already
    /// being handled, queued for replay once that handling completes.
    pending_irq_bitmap: RacyCell<u64>,
    /// What this PE is currently doing, for the deferred-IRQ protocol.
    irq_cause: RacyCell<IrqCause>,
    /// This PE's ready queue/scheduler. A leaf lock: code holding it must
    /// not block or take another lock a trap handler could be holding.
    pub run_queue: IrqSpinLock<FairScheduler>,
    /// The single in-flight recoverable-fault expectation, if a
    /// `copy_to_user`/`copy_from_user` is currently in its risky window.
    current_fault_expectation: RacyCell<Option<FaultExpectation>>,
}

impl Pls {
    fn new(id: PeId) -> Self {
        Self {
            id,
            current_thread: RacyCell::new(None),
            pending_irq_bitmap: RacyCell::new(0),
            irq_cause: RacyCell::new(IrqCause::None),
            run_queue: IrqSpinLock::new(FairScheduler::new()),
            current_fault_expectation: RacyCell::new(None),
        }
    }

    /// The thread currently running on this PE.
    pub fn current_thread(&self) -> Option<Tid> {
        // SAFETY: only the owning PE ever writes `current_thread`.
        unsafe { *self.current_thread.get() }
    }

    /// Sets the thread currently running on this PE.
    pub fn set_current_thread(&self, tid: Option<Tid>) {
        // SAFETY: only the owning PE ever writes `current_thread`.
        unsafe { *self.current_thread.get() = tid };
    }

    /// Current deferred-IRQ state.
    pub fn irq_cause(&self) -> IrqCause {
        // SAFETY: only the owning PE ever writes `irq_cause`.
        unsafe { *self.irq_cause.get() }
    }

    /// Transitions the deferred-IRQ state.
    pub fn set_irq_cause(&self, cause: IrqCause) {
        // SAFETY: only the owning PE ever writes `irq_cause`.
        unsafe { *self.irq_cause.get() = cause };
    }

    /// Marks `irq` pending for replay once the current handling completes.
    pub fn mark_irq_pending(&self, irq: u32) {
        // SAFETY: only the owning PE ever writes `pending_irq_bitmap`.
        unsafe { *self.pending_irq_bitmap.get() |= 1u64 << (irq & 63) };
    }

    /// Drains and returns the pending-IRQ bitmap, clearing it.
    pub fn take_pending_irqs(&self) -> u64 {
        // SAFETY: only the owning PE ever writes `pending_irq_bitmap`.
        unsafe {
            let bits = *self.pending_irq_bitmap.get();
            *self.pending_irq_bitmap.get() = 0;
            bits
        }
    }

    /// Installs a fault expectation before a risky user-memory access.
    pub fn set_fault_expectation(&self, expectation: Option<FaultExpectation>) {
        // SAFETY: only the owning PE ever writes this slot.
        unsafe { *self.current_fault_expectation.get() = expectation };
    }

    /// Takes (clearing) the current fault expectation, if any.
    pub fn take_fault_expectation(&self) -> Option<FaultExpectation> {
        // SAFETY: only the owning PE ever writes this slot.
        unsafe { (*self.current_fault_expectation.get()).take() }
    }
}

static PLS: RacyCell<Option<PerPe<Pls>>> = RacyCell::new(None);

/// Builds the per-PE table. Must run once, on the boot PE, before any
/// secondary PE is released or any interrupt is unmasked.
///
/// # Safety
///
/// Must not run concurrently with any call to [`get`]/[`get_for`].
pub unsafe fn init() {
    let table = PerPe::new(core::array::from_fn(|i| Pls::new(PeId::new(i as u32))));
    unsafe { *PLS.get() = Some(table) };
}

/// Returns the calling PE's local storage.
pub fn get() -> &'static Pls {
    // SAFETY: `init` has already run by the time any PE reaches this point.
    unsafe { (*PLS.get()).as_ref().expect("pls::init not called").get() }
}

/// Returns the local storage for a specific PE (used by the cross-PE
/// lock-mutate-SGI wakeup protocol).
pub fn get_for(id: PeId) -> &'static Pls {
    // SAFETY: `init` has already run by the time any PE reaches this point.
    unsafe {
        (*PLS.get())
            .as_ref()
            .expect("pls::init not called")
            .get_for(id)
    }
}

/// Convenience: the calling PE's id, without going through [`get`].
pub fn current_id() -> PeId {
    current_pe_id()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pls_starts_with_no_current_thread() {
        let pe = Pls::new(PeId::new(0));
        assert_eq!(pe.current_thread(), None);
    }

    #[test]
    fn pending_irq_bitmap_accumulates_and_drains() {
        let pe = Pls::new(PeId::new(0));
        pe.mark_irq_pending(3);
        pe.mark_irq_pending(5);
        let bits = pe.take_pending_irqs();
        assert_eq!(bits, (1 << 3) | (1 << 5));
        assert_eq!(pe.take_pending_irqs(), 0);
    }

    #[test]
    fn fault_expectation_round_trips_and_clears() {
        use talos_core::pls::FaultKind;
        let pe = Pls::new(PeId::new(0));
        assert_eq!(pe.take_fault_expectation(), None);
        pe.set_fault_expectation(Some(FaultExpectation {
            kind: FaultKind::UserAccess,
            recover_ip: 0x4000,
        }));
        let got = pe.take_fault_expectation().unwrap();
        assert_eq!(got.recover_ip, 0x4000);
        assert_eq!(pe.take_fault_expectation(), None);
    }
}
