//! Thread state and scheduling metadata shared between the scheduler and the
//! trap layer.

use crate::id::{PeId, Pid, Tid};

/// Lifecycle state of a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreadState {
    /// Currently the `current_thread` of some PE.
    Running,
    /// Blocked on a wait-condition; wakeable.
    Sleeping,
    /// Blocked in a way that does not respond to ordinary wakeups (e.g. an
    /// in-flight uninterruptible I/O wait).
    UninterruptibleSleeping,
    /// Stopped by a debug or job-control event; resumes only on an explicit
    /// continue.
    Stopped,
    /// Terminal. Never scheduled again.
    Dead,
}

impl ThreadState {
    /// Whether a thread in this state may be handed to `pick_next`.
    pub const fn is_runnable(self) -> bool {
        matches!(self, Self::Running)
    }

    /// Whether this is the terminal state.
    pub const fn is_dead(self) -> bool {
        matches!(self, Self::Dead)
    }
}

/// What a sleeping thread is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitConditionKind {
    /// A timed or untimed sleep.
    Sleep,
    /// Blocked on I/O completion.
    QueueIo,
    /// Blocked on an arbitrary condition owned by another subsystem.
    Wait,
}

/// A thread's wait-condition slot.
///
/// Owned by the thread; refers to the queue it is parked on through a
/// non-owning handle. A waker consults [`WaitCondition::can_wake`] before
/// transitioning the thread back to [`ThreadState::Running`].
#[derive(Debug, Clone, Copy)]
pub struct WaitCondition {
    /// What kind of wait this is.
    pub kind: WaitConditionKind,
    /// Opaque key used by the owning subsystem to decide whether a given
    /// wakeup still applies, guarding against stale wakeups after a timeout
    /// already fired.
    pub key: u64,
}

impl WaitCondition {
    /// Creates a new wait condition.
    pub const fn new(kind: WaitConditionKind, key: u64) -> Self {
        Self { kind, key }
    }

    /// Whether a wakeup carrying `wake_key` should resume this wait.
    pub const fn can_wake(&self, wake_key: u64) -> bool {
        self.key == wake_key
    }
}

/// Priority tier for the default fair scheduler class.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    /// Time-critical kernel work (interrupt bottom halves, deferred IRQ
    /// handlers).
    Critical = 0,
    /// Ordinary user and kernel threads.
    Normal = 1,
    /// Housekeeping work that may be starved briefly under load.
    Background = 2,
}

impl Priority {
    /// Number of priority tiers.
    pub const COUNT: usize = 3;

    /// Converts a raw value, defaulting unknown values to `Normal`.
    pub const fn from_u8(val: u8) -> Self {
        match val {
            0 => Self::Critical,
            2 => Self::Background,
            _ => Self::Normal,
        }
    }
}

/// Metadata describing how a thread should be scheduled.
#[derive(Debug, Clone, Copy)]
pub struct ThreadMeta {
    /// Owning process.
    pub process: Pid,
    /// Thread id.
    pub tid: Tid,
    /// Scheduling priority.
    pub priority: Priority,
    /// Pinned PE, or `None` for any.
    pub affinity: Option<PeId>,
    /// `true` for kernel threads (no user-mode context).
    pub is_kernel_thread: bool,
}

impl ThreadMeta {
    /// Creates thread metadata with default (`Normal`, unpinned, user)
    /// scheduling attributes.
    pub const fn new(process: Pid, tid: Tid) -> Self {
        Self {
            process,
            tid,
            priority: Priority::Normal,
            affinity: None,
            is_kernel_thread: false,
        }
    }

    /// Sets the priority.
    pub const fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets CPU affinity.
    pub const fn with_affinity(mut self, pe: PeId) -> Self {
        self.affinity = Some(pe);
        self
    }

    /// Marks this as a kernel thread.
    pub const fn as_kernel_thread(mut self) -> Self {
        self.is_kernel_thread = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_state_runnable() {
        assert!(ThreadState::Running.is_runnable());
        assert!(!ThreadState::Sleeping.is_runnable());
        assert!(!ThreadState::Dead.is_runnable());
    }

    #[test]
    fn thread_state_dead() {
        assert!(ThreadState::Dead.is_dead());
        assert!(!ThreadState::Running.is_dead());
    }

    #[test]
    fn wait_condition_can_wake_matches_key() {
        let wc = WaitCondition::new(WaitConditionKind::Sleep, 7);
        assert!(wc.can_wake(7));
        assert!(!wc.can_wake(8));
    }

    #[test]
    fn priority_from_u8_critical() {
        assert_eq!(Priority::from_u8(0), Priority::Critical);
    }

    #[test]
    fn priority_from_u8_normal_default() {
        assert_eq!(Priority::from_u8(1), Priority::Normal);
        assert_eq!(Priority::from_u8(200), Priority::Normal);
    }

    #[test]
    fn priority_from_u8_background() {
        assert_eq!(Priority::from_u8(2), Priority::Background);
    }

    #[test]
    fn thread_meta_builder() {
        let meta = ThreadMeta::new(Pid::new(1), Tid::new(1))
            .with_priority(Priority::Critical)
            .with_affinity(PeId::new(2))
            .as_kernel_thread();
        assert_eq!(meta.priority, Priority::Critical);
        assert_eq!(meta.affinity, Some(PeId::new(2)));
        assert!(meta.is_kernel_thread);
    }

    #[test]
    fn thread_meta_defaults() {
        let meta = ThreadMeta::new(Pid::new(1), Tid::new(1));
        assert_eq!(meta.priority, Priority::Normal);
        assert!(meta.affinity.is_none());
        assert!(!meta.is_kernel_thread);
    }
}
