//! Synchronization primitives.
//!
//! [`SpinLock`] is the plain leaf lock for data touched from both normal and
//! interrupt context is never required to be interrupt-safe by itself;
//! [`IrqSpinLock`] additionally masks interrupts for locks shared with trap
//! handlers (run queues, the PLS deferred-IRQ bitmap, the GIC driver state).
//! [`WaitQueue`] parks threads rather than tasks: waking a member hands its
//! [`Tid`](crate::id::Tid) back to the scheduler instead of calling a waker.

mod irq_spinlock;
mod spinlock;
mod waitqueue;

pub use irq_spinlock::{IrqSpinLock, IrqSpinLockGuard};
pub use spinlock::{SpinLock, SpinLockGuard};
pub use waitqueue::WaitQueue;
