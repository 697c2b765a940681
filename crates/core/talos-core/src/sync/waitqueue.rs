//! Wait queue for thread-blocking sleeps.
//!
//! Unlike an async wait queue that stores [`Waker`](core::task::Waker)s,
//! [`WaitQueue`] stores the [`Tid`] of each sleeping thread. Waking a member
//! only returns its id; the caller (the scheduler glue in the kernel crate)
//! is responsible for checking the thread's [`WaitCondition`](crate::task::WaitCondition)
//! via `can_wake` and transitioning it back to `Running` before handing it
//! to `enqueue_thread`. This keeps `talos-core` free of a concrete `Thread`
//! type while still being useful as the membership structure behind
//! `SLEEP`/`QUEUE_IO`/`WAIT` conditions.

extern crate alloc;

use alloc::collections::VecDeque;

use crate::id::Tid;
use crate::sync::IrqSpinLock;

/// A queue of threads parked on the same condition.
///
/// Implemented as a FIFO list under an [`IrqSpinLock`]; membership mirrors
/// the "doubly linked intrusive list under a lock" shape without requiring
/// each `Thread` to carry intrusive link pointers, since thread ids are
/// cheap to store by value.
pub struct WaitQueue {
    waiters: IrqSpinLock<VecDeque<Tid>>,
}

impl WaitQueue {
    /// Creates an empty wait queue.
    pub const fn new() -> Self {
        Self {
            waiters: IrqSpinLock::new(VecDeque::new()),
        }
    }

    /// Parks `tid` on this queue.
    ///
    /// The caller must have already transitioned the thread's state away
    /// from `Running` before calling `schedule()`.
    pub fn park(&self, tid: Tid) {
        self.waiters.lock().push_back(tid);
    }

    /// Removes a specific thread from the queue without waking it (used when
    /// a timed wait's timer fires before a matching wake).
    pub fn remove(&self, tid: Tid) -> bool {
        let mut waiters = self.waiters.lock();
        if let Some(pos) = waiters.iter().position(|&t| t == tid) {
            waiters.remove(pos);
            true
        } else {
            false
        }
    }

    /// Wakes one parked thread (FIFO order) and returns its id.
    pub fn wake_one(&self) -> Option<Tid> {
        self.waiters.lock().pop_front()
    }

    /// Wakes every parked thread, returning their ids.
    ///
    /// Drains under the lock, then hands the caller the list to act on
    /// outside the lock (mirrors acquiring each thread's run-queue lock
    /// separately rather than nesting it inside the wait-queue lock).
    pub fn wake_all(&self) -> VecDeque<Tid> {
        let mut waiters = self.waiters.lock();
        core::mem::take(&mut *waiters)
    }

    /// True if no thread is parked here.
    pub fn is_empty(&self) -> bool {
        self.waiters.lock().is_empty()
    }
}

impl Default for WaitQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn park_and_wake_one_is_fifo() {
        let wq = WaitQueue::new();
        wq.park(Tid::new(1));
        wq.park(Tid::new(2));
        assert_eq!(wq.wake_one(), Some(Tid::new(1)));
        assert_eq!(wq.wake_one(), Some(Tid::new(2)));
        assert_eq!(wq.wake_one(), None);
    }

    #[test]
    fn wake_all_drains_every_waiter() {
        let wq = WaitQueue::new();
        wq.park(Tid::new(1));
        wq.park(Tid::new(2));
        wq.park(Tid::new(3));
        let woken = wq.wake_all();
        assert_eq!(woken.len(), 3);
        assert!(wq.is_empty());
    }

    #[test]
    fn remove_specific_thread() {
        let wq = WaitQueue::new();
        wq.park(Tid::new(1));
        wq.park(Tid::new(2));
        assert!(wq.remove(Tid::new(1)));
        assert!(!wq.remove(Tid::new(1)));
        assert_eq!(wq.wake_one(), Some(Tid::new(2)));
    }

    #[test]
    fn wake_one_empty_returns_none() {
        let wq = WaitQueue::new();
        assert_eq!(wq.wake_one(), None);
    }

    #[test]
    fn is_empty_reflects_state() {
        let wq = WaitQueue::new();
        assert!(wq.is_empty());
        wq.park(Tid::new(4));
        assert!(!wq.is_empty());
    }
}
