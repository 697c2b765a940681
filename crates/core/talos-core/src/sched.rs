//! Scheduling primitives.
//!
//! The core treats the scheduler as a polymorphic capability set
//! ([`SchedClass`]) with at least one concrete fair/deadline policy
//! supplied. [`ReadyQueues`] and [`FairScheduler`] are the default,
//! priority-tiered implementation; both are host-testable.

extern crate alloc;

use alloc::collections::VecDeque;

use crate::id::Tid;
use crate::task::Priority;

/// How many consecutive Normal pops before forcing one Background pop.
const BACKGROUND_STARVATION_LIMIT: u64 = 100;

/// What `tick` tells the trap-exit path to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickDecision {
    /// Keep running the current thread.
    Continue,
    /// The trap-exit path should observe a different `current_thread` and
    /// perform a full save/switch.
    Reschedule,
}

/// The capability set the trap and lifecycle layers program against.
///
/// A run queue is embedded in the PLS; the scheduler class is consulted
/// through this trait rather than concretely, so alternate policies can be
/// swapped in per-thread or per-build.
pub trait SchedClass {
    /// Makes `tid` eligible to run at `priority`.
    fn enqueue_thread(&mut self, priority: Priority, tid: Tid);

    /// Removes `tid` from the ready set without running it (e.g. it is about
    /// to be pinned elsewhere, or has become non-runnable).
    fn dequeue_thread(&mut self, tid: Tid) -> bool;

    /// Chooses the next thread to run, if any is ready.
    fn pick_next(&mut self) -> Option<Tid>;

    /// Called from the timer IRQ; decides whether the current thread's
    /// quantum has expired.
    fn tick(&mut self) -> TickDecision;

    /// Called by the yield syscall: voluntarily give up the remainder of the
    /// current quantum.
    fn yield_current(&mut self);

    /// True if any thread is ready to run.
    fn has_ready(&self) -> bool;
}

/// Priority-aware ready queues.
///
/// Maintains one FIFO queue per priority tier. Pops from the highest
/// priority (lowest ordinal) non-empty queue first.
pub struct ReadyQueues {
    queues: [VecDeque<Tid>; Priority::COUNT],
    /// Incremented each time a Normal thread is popped while Background
    /// threads wait; reset whenever Critical or Background is served.
    normal_streak: u64,
}

impl ReadyQueues {
    /// Creates empty ready queues.
    pub fn new() -> Self {
        Self {
            queues: [VecDeque::new(), VecDeque::new(), VecDeque::new()],
            normal_streak: 0,
        }
    }

    /// Pushes a thread into the queue for the given priority.
    pub fn push(&mut self, priority: Priority, id: Tid) {
        self.queues[priority as usize].push_back(id);
    }

    /// Removes a specific thread from whichever queue holds it.
    pub fn remove(&mut self, id: Tid) -> bool {
        for queue in &mut self.queues {
            if let Some(pos) = queue.iter().position(|&t| t == id) {
                queue.remove(pos);
                return true;
            }
        }
        false
    }

    /// Pops the highest-priority ready thread.
    ///
    /// Always drains Critical first. Between Normal and Background, applies
    /// starvation prevention: if Normal has run for
    /// `BACKGROUND_STARVATION_LIMIT` consecutive pops and Background has
    /// work, pop one Background thread instead.
    pub fn pop(&mut self) -> Option<(Priority, Tid)> {
        if let Some(id) = self.queues[Priority::Critical as usize].pop_front() {
            self.normal_streak = 0;
            return Some((Priority::Critical, id));
        }

        let has_background = !self.queues[Priority::Background as usize].is_empty();
        let has_normal = !self.queues[Priority::Normal as usize].is_empty();

        if has_normal && has_background && self.normal_streak >= BACKGROUND_STARVATION_LIMIT {
            self.normal_streak = 0;
            if let Some(id) = self.queues[Priority::Background as usize].pop_front() {
                return Some((Priority::Background, id));
            }
        }

        if let Some(id) = self.queues[Priority::Normal as usize].pop_front() {
            if has_background {
                self.normal_streak += 1;
            } else {
                self.normal_streak = 0;
            }
            return Some((Priority::Normal, id));
        }

        self.normal_streak = 0;
        self.queues[Priority::Background as usize]
            .pop_front()
            .map(|id| (Priority::Background, id))
    }

    /// Returns `true` if any priority queue has threads.
    pub fn has_ready(&self) -> bool {
        self.queues.iter().any(|q| !q.is_empty())
    }

    /// Steals one thread from the back of the queue for work stealing.
    ///
    /// Returns a Normal or Background thread (never Critical — critical work
    /// stays local). Steals from the back to preserve locality: the victim
    /// keeps its hot (front) threads while the thief gets the coldest one.
    ///
    /// **One-task rule**: refuses to steal if the victim has only one
    /// stealable thread (Normal + Background combined), preventing a sole
    /// thread bouncing back and forth between PEs without making progress.
    pub fn steal_one(&mut self) -> Option<(Priority, Tid)> {
        let stealable = self.queues[Priority::Normal as usize].len()
            + self.queues[Priority::Background as usize].len();
        if stealable <= 1 {
            return None;
        }

        if let Some(id) = self.queues[Priority::Normal as usize].pop_back() {
            return Some((Priority::Normal, id));
        }
        self.queues[Priority::Background as usize]
            .pop_back()
            .map(|id| (Priority::Background, id))
    }
}

impl Default for ReadyQueues {
    fn default() -> Self {
        Self::new()
    }
}

/// Default fair scheduler class: [`ReadyQueues`] plus the current thread's
/// remaining quantum.
pub struct FairScheduler {
    queues: ReadyQueues,
    current: Option<Tid>,
    /// Ticks remaining before the current thread is due for preemption.
    quantum_remaining: u32,
}

/// Timer ticks a thread is allowed to run before `tick` requests a
/// reschedule.
pub const DEFAULT_QUANTUM_TICKS: u32 = 10;

impl FairScheduler {
    /// Creates a new, empty fair scheduler.
    pub fn new() -> Self {
        Self {
            queues: ReadyQueues::new(),
            current: None,
            quantum_remaining: DEFAULT_QUANTUM_TICKS,
        }
    }

    /// The thread most recently returned by `pick_next`, if still current.
    pub fn current(&self) -> Option<Tid> {
        self.current
    }
}

impl Default for FairScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedClass for FairScheduler {
    fn enqueue_thread(&mut self, priority: Priority, tid: Tid) {
        self.queues.push(priority, tid);
    }

    fn dequeue_thread(&mut self, tid: Tid) -> bool {
        self.queues.remove(tid)
    }

    fn pick_next(&mut self) -> Option<Tid> {
        let (_, tid) = self.queues.pop()?;
        self.current = Some(tid);
        self.quantum_remaining = DEFAULT_QUANTUM_TICKS;
        Some(tid)
    }

    fn tick(&mut self) -> TickDecision {
        if self.quantum_remaining == 0 {
            return TickDecision::Reschedule;
        }
        self.quantum_remaining -= 1;
        if self.quantum_remaining == 0 && self.queues.has_ready() {
            TickDecision::Reschedule
        } else {
            TickDecision::Continue
        }
    }

    fn yield_current(&mut self) {
        self.quantum_remaining = 0;
    }

    fn has_ready(&self) -> bool {
        self.queues.has_ready()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tid(n: u64) -> Tid {
        Tid::new(n)
    }

    #[test]
    fn critical_always_served_first() {
        let mut q = ReadyQueues::new();
        q.push(Priority::Normal, tid(1));
        q.push(Priority::Critical, tid(2));
        assert_eq!(q.pop(), Some((Priority::Critical, tid(2))));
        assert_eq!(q.pop(), Some((Priority::Normal, tid(1))));
    }

    #[test]
    fn background_starved_until_limit() {
        let mut q = ReadyQueues::new();
        q.push(Priority::Background, tid(99));
        for i in 0..BACKGROUND_STARVATION_LIMIT {
            q.push(Priority::Normal, tid(i));
            assert_eq!(q.pop(), Some((Priority::Normal, tid(i))));
        }
        assert_eq!(q.pop(), Some((Priority::Background, tid(99))));
    }

    #[test]
    fn remove_finds_thread_in_any_tier() {
        let mut q = ReadyQueues::new();
        q.push(Priority::Background, tid(5));
        assert!(q.remove(tid(5)));
        assert!(!q.has_ready());
        assert!(!q.remove(tid(5)));
    }

    #[test]
    fn steal_one_respects_one_task_rule() {
        let mut q = ReadyQueues::new();
        q.push(Priority::Normal, tid(1));
        assert_eq!(q.steal_one(), None);
        q.push(Priority::Normal, tid(2));
        assert_eq!(q.steal_one(), Some((Priority::Normal, tid(2))));
    }

    #[test]
    fn steal_one_never_takes_critical() {
        let mut q = ReadyQueues::new();
        q.push(Priority::Critical, tid(1));
        q.push(Priority::Critical, tid(2));
        assert_eq!(q.steal_one(), None);
    }

    #[test]
    fn fair_scheduler_pick_next_tracks_current() {
        let mut s = FairScheduler::new();
        assert!(s.pick_next().is_none());
        s.enqueue_thread(Priority::Normal, tid(1));
        assert_eq!(s.pick_next(), Some(tid(1)));
        assert_eq!(s.current(), Some(tid(1)));
    }

    #[test]
    fn fair_scheduler_tick_expires_quantum() {
        let mut s = FairScheduler::new();
        s.enqueue_thread(Priority::Normal, tid(1));
        s.enqueue_thread(Priority::Normal, tid(2));
        s.pick_next();
        for _ in 0..DEFAULT_QUANTUM_TICKS - 1 {
            assert_eq!(s.tick(), TickDecision::Continue);
        }
        assert_eq!(s.tick(), TickDecision::Reschedule);
    }

    #[test]
    fn fair_scheduler_tick_continues_if_nothing_else_ready() {
        let mut s = FairScheduler::new();
        s.enqueue_thread(Priority::Normal, tid(1));
        s.pick_next();
        for _ in 0..DEFAULT_QUANTUM_TICKS + 5 {
            assert_eq!(s.tick(), TickDecision::Continue);
        }
    }

    #[test]
    fn fair_scheduler_yield_forces_reschedule_on_next_tick() {
        let mut s = FairScheduler::new();
        s.enqueue_thread(Priority::Normal, tid(1));
        s.enqueue_thread(Priority::Normal, tid(2));
        s.pick_next();
        s.yield_current();
        assert_eq!(s.tick(), TickDecision::Reschedule);
    }
}
