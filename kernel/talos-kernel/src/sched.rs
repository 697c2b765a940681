//! Scheduler glue: wires [`talos_core::sched::FairScheduler`] into the trap
//! exit path, the timer IRQ, and SGI-based cross-PE wakeups.
//!
//! The reschedule protocol is entirely expressed through return values:
//! every handler below that might cause a switch returns the `u64` that the
//! assembly epilogue in [`crate::arch::trap`] either ignores (`0`, stay on
//! this stack) or uses to overwrite `sp` (switch to another thread's own
//! saved frame).

pub use talos_core::sched::FairScheduler;

use talos_core::pls::IrqCause;
use talos_core::sched::{SchedClass, TickDecision};

use crate::arch::gic;
use crate::arch::trap::TrapFrame;
use crate::config::{SGI_RESCHEDULE, TIMER_IRQ, TIMER_RELOAD_TICKS};
use crate::pls::Pls;

/// Picks the next ready thread for this PE and returns the stack pointer the
/// trap epilogue should switch to (`0` if nothing else is ready, or the
/// current thread is the only runnable one).
pub fn reschedule(frame: &TrapFrame) -> u64 {
    let pls = crate::pls::get();
    let outgoing = pls.current_thread();
    if let Some(tid) = outgoing {
        crate::proc::save_frame_for(tid, frame);
    }

    let mut rq = pls.run_queue.lock();
    if !rq.has_ready() {
        return 0;
    }
    let Some(next) = rq.pick_next() else {
        return 0;
    };
    drop(rq);

    if Some(next) == outgoing {
        return 0;
    }

    if let Some(tid) = outgoing {
        if crate::proc::thread_state(tid) == Some(talos_core::task::ThreadState::Running) {
            pls.run_queue
                .lock()
                .enqueue_thread(talos_core::task::Priority::Normal, tid);
        }
    }

    pls.set_current_thread(Some(next));
    // SAFETY: runs synchronously inside the trap handler, before the asm
    // epilogue restores registers and erets into `next`'s frame.
    unsafe { crate::arch::switch_table(crate::proc::vm_table_for(next).unwrap_or(0)) };
    crate::proc::resume_sp_for(next).unwrap_or(0)
}

/// Voluntarily ends the current thread's quantum (`sched_yield`).
pub fn yield_current() {
    crate::pls::get().run_queue.lock().yield_current();
}

/// Moves `tid` to the front of this PE's ready queue and ends the current
/// thread's quantum, so the next reschedule favors `tid`. A targeted handoff
/// used by callers that need a specific runnable thread to go next, distinct
/// from the sibling-redirect semantics of `thread_preempt`
/// (see [`crate::proc::preempt_thread`]).
pub fn yield_to(tid: talos_core::id::Tid) {
    let pls = crate::pls::get();
    let mut rq = pls.run_queue.lock();
    rq.dequeue_thread(tid);
    rq.enqueue_thread(talos_core::task::Priority::Critical, tid);
    rq.yield_current();
}

/// Applies one IRQ number's effects — the timer reload plus a scheduler
/// tick, or nothing beyond a reschedule request for the reschedule SGI.
/// Shared between the live [`handle_irq`] path (which also acks/EOIs) and
/// [`drain_deferred_irqs`] (whose IRQs were already EOI'd when they were
/// first observed mid-syscall; only their effects were deferred). Returns
/// whether the caller should reschedule.
fn service_irq(pls: &Pls, irq: u32) -> bool {
    if irq < gic::SGI_COUNT {
        irq == SGI_RESCHEDULE
    } else if irq == TIMER_IRQ {
        talos_intrinsics::set_cntp_tval_el0(TIMER_RELOAD_TICKS);
        pls.run_queue.lock().tick() == TickDecision::Reschedule
    } else {
        false
    }
}

/// Drains this PE's pending-IRQ bitmap, accumulated while a syscall held
/// [`IrqCause::Syscall`], running each deferred IRQ's handler exactly once
/// (timer reload + tick, or the reschedule SGI's flag) before clearing it.
/// Any reschedule those handlers want is picked up by `handle_svc`'s own
/// unconditional call to [`reschedule`] right after this returns.
pub fn drain_deferred_irqs() {
    let pls = crate::pls::get();
    let bits = pls.take_pending_irqs();
    if bits == 0 {
        return;
    }
    pls.set_irq_cause(IrqCause::DeferredIrq);
    for irq in 0..64u32 {
        if bits & (1 << irq) != 0 {
            service_irq(pls, irq);
        }
    }
    pls.set_irq_cause(IrqCause::None);
}

/// Entry point for `handle_irq_entry`.
#[unsafe(no_mangle)]
pub(crate) extern "C" fn handle_irq(frame: &mut TrapFrame) -> u64 {
    let gic = gic::global();
    let irq = gic.acknowledge();
    if irq == gic::SPURIOUS_IRQ {
        return 0;
    }

    let pls = crate::pls::get();
    let already_busy = matches!(pls.irq_cause(), IrqCause::Syscall);
    if already_busy {
        pls.mark_irq_pending(irq);
        gic.end_of_interrupt(irq);
        return 0;
    }
    pls.set_irq_cause(IrqCause::Irq);

    let want_reschedule = service_irq(pls, irq);

    gic.end_of_interrupt(irq);
    pls.set_irq_cause(IrqCause::None);

    if want_reschedule {
        reschedule(frame)
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yield_current_forces_reschedule_on_next_tick() {
        let mut s = FairScheduler::new();
        s.enqueue_thread(talos_core::task::Priority::Normal, talos_core::id::Tid::new(1));
        s.enqueue_thread(talos_core::task::Priority::Normal, talos_core::id::Tid::new(2));
        s.pick_next();
        s.yield_current();
        assert_eq!(s.tick(), TickDecision::Reschedule);
    }
}
