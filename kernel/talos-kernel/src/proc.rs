//! Process and thread lifecycle.
//!
//! Threads are plain data owned by a global table; the scheduler only ever
//! stores their [`Tid`]. A thread's kernel stack is allocated once, at
//! creation, and `saved_sp` always points at a valid, previously-saved
//! [`TrapFrame`] on that stack once the thread has run at least once — the
//! reschedule path in [`crate::sched`] switches to a thread by redirecting
//! `sp` there, never by copying register state around.

extern crate alloc;

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use talos_core::cell::RacyCell;
use talos_core::id::{PeId, Pid, Tid};
use talos_core::sched::SchedClass;
use talos_core::sync::IrqSpinLock;
use talos_core::task::{Priority, ThreadMeta, ThreadState, WaitCondition};

use crate::arch::trap::TrapFrame;
use crate::config::DEFAULT_THREAD_STACK_SIZE;

/// Per-thread scheduling and timing counters, outside the scheduler's own
/// bookkeeping.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadTiming {
    /// Ticks spent executing at EL0.
    pub user_ticks: u64,
    /// Ticks spent executing at EL1 on this thread's behalf.
    pub kernel_ticks: u64,
}

/// A thread's dedicated kernel-mode stack.
pub struct KernelStack {
    mem: Box<[u8]>,
}

impl KernelStack {
    fn new(size: usize) -> Self {
        Self {
            mem: alloc::vec![0u8; size].into_boxed_slice(),
        }
    }

    /// The initial stack pointer for a thread that has never run.
    fn initial_top(&self) -> u64 {
        let base = self.mem.as_ptr() as u64;
        (base + self.mem.len() as u64) & !0xf
    }
}

/// A schedulable thread of execution.
pub struct Thread {
    /// Static identity and scheduling hints.
    pub meta: ThreadMeta,
    /// Lifecycle state.
    pub state: ThreadState,
    /// What this thread is blocked on, if `state` is a sleeping state.
    pub wait_condition: Option<WaitCondition>,
    /// The PE this thread is currently running on, if any.
    pub running_core: Option<PeId>,
    /// Accounting counters.
    pub timing: ThreadTiming,
    kernel_stack: KernelStack,
    /// Stack pointer to resume at. `0` until the thread has been given an
    /// entry point and started at least once.
    saved_sp: u64,
    entry: extern "C" fn(u64) -> !,
    entry_arg: u64,
    started: bool,
}

impl Thread {
    fn new(meta: ThreadMeta, entry: extern "C" fn(u64) -> !, entry_arg: u64) -> Self {
        let kernel_stack = KernelStack::new(DEFAULT_THREAD_STACK_SIZE);
        Self {
            meta,
            state: ThreadState::Running,
            wait_condition: None,
            running_core: None,
            timing: ThreadTiming::default(),
            kernel_stack,
            saved_sp: 0,
            entry,
            entry_arg,
            started: false,
        }
    }

    /// The stack pointer the scheduler should switch to in order to resume
    /// this thread, preparing a fresh [`TrapFrame`] on first run.
    fn resume_sp(&mut self) -> u64 {
        if self.started {
            return self.saved_sp;
        }
        self.started = true;
        let top = self.kernel_stack.initial_top();
        let frame_addr = top - crate::arch::trap::FRAME_SIZE as u64;
        // SAFETY: `frame_addr` is within the freshly allocated kernel stack
        // and not otherwise in use.
        let frame = unsafe { &mut *(frame_addr as *mut TrapFrame) };
        *frame = TrapFrame::default();
        frame.elr = self.entry as usize as u64;
        frame.x[0] = self.entry_arg;
        // EL1h, all exceptions unmasked.
        frame.spsr = 0b0101;
        self.saved_sp = frame_addr;
        frame_addr
    }

    /// Saves `frame`'s address as this thread's resume point. The frame
    /// itself already lives on this thread's own kernel stack; no copy is
    /// needed.
    fn save_frame(&mut self, frame: &TrapFrame) {
        self.saved_sp = frame as *const TrapFrame as u64;
    }

    /// Redirects this thread's saved frame to resume at `pc`, optionally
    /// also setting its user stack pointer. No-op if the thread has never
    /// run (nothing saved to redirect).
    fn redirect(&mut self, pc: u64, sp: u64) {
        if !self.started || self.saved_sp == 0 {
            return;
        }
        // SAFETY: `saved_sp` points at this thread's own last-saved frame,
        // which nothing else touches while the thread is not running.
        let frame = unsafe { &mut *(self.saved_sp as *mut TrapFrame) };
        frame.elr = pc;
        if sp != 0 {
            frame.sp_el0 = sp;
        }
    }
}

/// Process lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// At least one thread is runnable or running.
    Running,
    /// Every thread has exited; waiting to be reaped by its parent.
    Zombie,
    /// Reaped; the `pid` may be reused.
    Dead,
}

/// The address space a process's threads execute in.
#[derive(Debug, Clone, Copy, Default)]
pub struct VmSpace {
    /// `TTBR0_EL1` value for this process (0 for kernel-only processes,
    /// which run entirely against the shared kernel address space).
    pub ttbr0: u64,
}

/// A process: a VM container, credentials, and a set of threads.
pub struct Process {
    /// Process id.
    pub pid: Pid,
    /// Parent, if any (the boot/init process has none).
    pub parent: Option<Pid>,
    /// Address space.
    pub vm: VmSpace,
    /// Threads belonging to this process.
    pub threads: Vec<Tid>,
    /// Direct children, for `exit_group`/reap bookkeeping.
    pub children: Vec<Pid>,
    /// Exit code, valid once `state` is `Zombie` or `Dead`.
    pub exit_code: i32,
    /// Lifecycle state.
    pub state: ProcessState,
}

static THREADS: IrqSpinLock<BTreeMap<Tid, Thread>> = IrqSpinLock::new(BTreeMap::new());
static PROCESSES: IrqSpinLock<BTreeMap<Pid, Process>> = IrqSpinLock::new(BTreeMap::new());
static NEXT_TID: AtomicU64 = AtomicU64::new(1);
static NEXT_PID: AtomicU32 = AtomicU32::new(1);

fn alloc_tid() -> Tid {
    Tid::new(NEXT_TID.fetch_add(1, Ordering::Relaxed))
}

fn alloc_pid() -> Pid {
    Pid::new(NEXT_PID.fetch_add(1, Ordering::Relaxed))
}

/// Creates a new process with no threads yet.
pub fn create_process(parent: Option<Pid>) -> Pid {
    let pid = alloc_pid();
    PROCESSES.lock().insert(
        pid,
        Process {
            pid,
            parent,
            vm: VmSpace::default(),
            threads: Vec::new(),
            children: Vec::new(),
            exit_code: 0,
            state: ProcessState::Running,
        },
    );
    if let Some(parent_pid) = parent {
        if let Some(parent_proc) = PROCESSES.lock().get_mut(&parent_pid) {
            parent_proc.children.push(pid);
        }
    }
    pid
}

/// Creates a new thread in `process`, enqueuing it on `affinity` (or the
/// calling PE if unset).
pub fn create_thread(
    process: Pid,
    entry: extern "C" fn(u64) -> !,
    arg: u64,
    priority: Priority,
    affinity: Option<PeId>,
) -> Tid {
    let tid = alloc_tid();
    let mut meta = ThreadMeta::new(process, tid).with_priority(priority);
    if let Some(pe) = affinity {
        meta = meta.with_affinity(pe);
    }
    THREADS.lock().insert(tid, Thread::new(meta, entry, arg));
    if let Some(proc) = PROCESSES.lock().get_mut(&process) {
        proc.threads.push(tid);
    }

    let target = affinity.unwrap_or_else(crate::pls::current_id);
    crate::pls::get_for(target).run_queue.lock().enqueue_thread(priority, tid);
    tid
}

/// Spawns the initial (`pid 1`) process with a single thread.
pub fn spawn_init(entry: extern "C" fn(u64) -> !) -> Pid {
    let pid = create_process(None);
    create_thread(pid, entry, 0, Priority::Normal, None);
    pid
}

/// Marks every thread of `process` dead and the process itself a zombie.
pub fn exit_group(process: Pid, exit_code: i32) {
    let tids: Vec<Tid> = {
        let mut procs = PROCESSES.lock();
        let Some(proc) = procs.get_mut(&process) else {
            return;
        };
        proc.exit_code = exit_code;
        proc.state = ProcessState::Zombie;
        proc.threads.clone()
    };
    let mut threads = THREADS.lock();
    for tid in tids {
        if let Some(thread) = threads.get_mut(&tid) {
            thread.state = ThreadState::Dead;
        }
        crate::pls::get().run_queue.lock().dequeue_thread(tid);
    }
}

/// Marks a single thread dead. If it was the last live thread in its
/// process, the process becomes a zombie too.
pub fn exit_thread(tid: Tid, exit_code: i32) {
    let process = {
        let mut threads = THREADS.lock();
        let Some(thread) = threads.get_mut(&tid) else {
            return;
        };
        thread.state = ThreadState::Dead;
        thread.meta.process
    };
    crate::pls::get().run_queue.lock().dequeue_thread(tid);

    let threads = THREADS.lock();
    let all_dead = PROCESSES
        .lock()
        .get(&process)
        .map(|p| {
            p.threads
                .iter()
                .all(|t| threads.get(t).map(|th| th.state.is_dead()).unwrap_or(true))
        })
        .unwrap_or(true);
    drop(threads);

    if all_dead {
        if let Some(proc) = PROCESSES.lock().get_mut(&process) {
            proc.exit_code = exit_code;
            proc.state = ProcessState::Zombie;
        }
    }
}

/// Reaps a zombie process, returning its exit code.
pub fn reap(pid: Pid) -> Option<i32> {
    let mut procs = PROCESSES.lock();
    let proc = procs.get(&pid)?;
    if proc.state != ProcessState::Zombie {
        return None;
    }
    let code = proc.exit_code;
    let tids = proc.threads.clone();
    procs.get_mut(&pid)?.state = ProcessState::Dead;
    drop(procs);
    let mut threads = THREADS.lock();
    for tid in tids {
        threads.remove(&tid);
    }
    Some(code)
}

/// Returns the stack pointer to resume `tid` at, starting it fresh if this
/// is its first run.
pub fn resume_sp_for(tid: Tid) -> Option<u64> {
    THREADS.lock().get_mut(&tid).map(Thread::resume_sp)
}

/// Records `frame`'s address as `tid`'s resume point (called when a thread
/// is being switched away from).
pub fn save_frame_for(tid: Tid, frame: &TrapFrame) {
    if let Some(thread) = THREADS.lock().get_mut(&tid) {
        thread.save_frame(frame);
    }
}

/// Looks up a thread's current [`ThreadState`].
pub fn thread_state(tid: Tid) -> Option<ThreadState> {
    THREADS.lock().get(&tid).map(|t| t.state)
}

/// The `TTBR0_EL1` value the owning process expects installed while `tid`
/// runs. `None` if the thread doesn't exist.
pub fn vm_table_for(tid: Tid) -> Option<u64> {
    let process = THREADS.lock().get(&tid)?.meta.process;
    PROCESSES.lock().get(&process).map(|p| p.vm.ttbr0)
}

/// The process a thread belongs to.
pub fn process_of(tid: Tid) -> Option<Pid> {
    THREADS.lock().get(&tid).map(|t| t.meta.process)
}

/// A process's scheduling affinity, taken from its first thread. `Some(None)`
/// means the process exists but is unpinned (may run on any PE); `None`
/// means no such process.
pub fn process_affinity(pid: Pid) -> Option<Option<PeId>> {
    let procs = PROCESSES.lock();
    let proc = procs.get(&pid)?;
    let first_tid = *proc.threads.first()?;
    drop(procs);
    Some(THREADS.lock().get(&first_tid)?.meta.affinity)
}

/// Sets a thread's state (used by the wait/wake paths in `sched`).
pub fn set_thread_state(tid: Tid, state: ThreadState) {
    if let Some(thread) = THREADS.lock().get_mut(&tid) {
        thread.state = state;
    }
}

/// Why [`preempt_thread`] could not redirect a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreemptError {
    /// No thread with that id exists.
    NoSuchThread,
    /// The thread exists but is not sleeping, so it has no safe point to
    /// redirect into.
    NotSleeping,
}

/// Redirects a sleeping sibling thread to resume at `pc` (and, if `sp != 0`,
/// its user stack pointer too), then makes it runnable again. Used to
/// deliver synchronous signals to a blocked thread.
pub fn preempt_thread(tid: Tid, pc: u64, sp: u64) -> Result<(), PreemptError> {
    let (priority, affinity) = {
        let mut threads = THREADS.lock();
        let thread = threads.get_mut(&tid).ok_or(PreemptError::NoSuchThread)?;
        if thread.state != ThreadState::Sleeping {
            return Err(PreemptError::NotSleeping);
        }
        thread.redirect(pc, sp);
        thread.state = ThreadState::Running;
        (thread.meta.priority, thread.meta.affinity)
    };
    let target_pe = affinity.unwrap_or_else(crate::pls::current_id);
    crate::pls::get_for(target_pe)
        .run_queue
        .lock()
        .enqueue_thread(priority, tid);
    Ok(())
}

/// A same-EL data/instruction abort: recoverable if a `copy_*_user` left a
/// fault expectation behind, an unrecoverable kernel fault otherwise.
#[unsafe(no_mangle)]
pub extern "C" fn recover_or_panic_fault(frame: &mut TrapFrame) -> u64 {
    if let Some(expectation) = crate::pls::get().take_fault_expectation() {
        frame.elr = expectation.recover_ip;
        return 0;
    }
    crate::panic::kernel_fault_panic("recoverable fault with no expectation set", frame)
}

/// A lower-EL (user) instruction abort, or any lower-EL fault a hook
/// declined to handle: the faulting thread is killed, not the kernel.
#[unsafe(no_mangle)]
pub extern "C" fn fault_current_thread(frame: &mut TrapFrame) -> u64 {
    let Some(tid) = crate::pls::get().current_thread() else {
        return crate::panic::kernel_fault_panic("user fault with no current thread", frame);
    };
    exit_thread(tid, -14); // EFAULT-coded exit status; the thread never observes it.
    crate::sched::reschedule(frame)
}

/// Hook consulted on a lower-EL data abort, given `(faulting_va, is_write,
/// elr)`. Returns `true` if it handled the fault and the thread should
/// simply resume.
pub type DataAbortHook = fn(u64, bool, u64) -> bool;

/// Hook consulted on a lower-EL software single-step exception, given
/// `elr`. Returns `true` if it handled the step and the thread should
/// resume.
pub type DebugHook = fn(u64) -> bool;

static DATA_ABORT_HOOK: RacyCell<Option<DataAbortHook>> = RacyCell::new(None);
static DEBUG_HOOK: RacyCell<Option<DebugHook>> = RacyCell::new(None);

/// Registers the hook consulted by [`handle_user_data_abort`]. No
/// demand-paging/COW layer is in scope in this revision, so nothing calls
/// this yet; the hook point exists so a future VMM can plug lazy mapping in
/// without touching the trap-dispatch layer.
pub fn set_data_abort_hook(hook: DataAbortHook) {
    // SAFETY: set once, at boot, before any PE takes a lower-EL data abort.
    unsafe { *DATA_ABORT_HOOK.get() = Some(hook) };
}

/// Registers the hook consulted by [`handle_user_debug`]. No debugger
/// subsystem is in scope in this revision.
pub fn set_debug_hook(hook: DebugHook) {
    // SAFETY: set once, at boot, before any PE takes a lower-EL step trap.
    unsafe { *DEBUG_HOOK.get() = Some(hook) };
}

/// A lower-EL data abort: gives a registered hook first refusal, falling
/// back to killing the faulting thread when none is registered or the hook
/// declines.
#[unsafe(no_mangle)]
pub extern "C" fn handle_user_data_abort(frame: &mut TrapFrame) -> u64 {
    let is_write = (frame.iss() >> 6) & 1 != 0;
    // SAFETY: only ever written by `set_data_abort_hook`, at boot.
    let handled = unsafe { *DATA_ABORT_HOOK.get() }
        .map(|hook| hook(frame.far, is_write, frame.elr))
        .unwrap_or(false);
    if handled {
        return 0;
    }
    fault_current_thread(frame)
}

/// A lower-EL software single-step: gives a registered debug hook first
/// refusal, falling back to killing the stepped thread.
#[unsafe(no_mangle)]
pub extern "C" fn handle_user_debug(frame: &mut TrapFrame) -> u64 {
    // SAFETY: only ever written by `set_debug_hook`, at boot.
    let handled = unsafe { *DEBUG_HOOK.get() }
        .map(|hook| hook(frame.elr))
        .unwrap_or(false);
    if handled {
        return 0;
    }
    fault_current_thread(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn dummy_entry(_arg: u64) -> ! {
        loop {
            talos_intrinsics::wfi();
        }
    }

    #[test]
    fn create_process_and_thread_populate_tables() {
        let pid = create_process(None);
        let tid = create_thread(pid, dummy_entry, 0, Priority::Normal, Some(PeId::new(0)));
        assert_eq!(thread_state(tid), Some(ThreadState::Running));
        assert!(PROCESSES.lock().get(&pid).unwrap().threads.contains(&tid));
    }

    #[test]
    fn exit_thread_marks_dead_and_zombifies_process() {
        let pid = create_process(None);
        let tid = create_thread(pid, dummy_entry, 0, Priority::Normal, Some(PeId::new(0)));
        exit_thread(tid, 0);
        assert_eq!(thread_state(tid), Some(ThreadState::Dead));
        assert_eq!(PROCESSES.lock().get(&pid).unwrap().state, ProcessState::Zombie);
    }

    #[test]
    fn reap_returns_exit_code_once_zombie() {
        let pid = create_process(None);
        let tid = create_thread(pid, dummy_entry, 0, Priority::Normal, Some(PeId::new(0)));
        exit_thread(tid, 7);
        assert_eq!(reap(pid), Some(7));
        assert_eq!(reap(pid), None);
    }

    #[test]
    fn preempt_thread_rejects_running_thread() {
        let pid = create_process(None);
        let tid = create_thread(pid, dummy_entry, 0, Priority::Normal, Some(PeId::new(0)));
        assert_eq!(
            preempt_thread(tid, 0x2000, 0),
            Err(PreemptError::NotSleeping)
        );
    }

    #[test]
    fn preempt_thread_redirects_sleeping_thread_and_wakes_it() {
        let pid = create_process(None);
        let tid = create_thread(pid, dummy_entry, 0, Priority::Normal, Some(PeId::new(0)));
        let sp = resume_sp_for(tid).unwrap();
        set_thread_state(tid, ThreadState::Sleeping);
        assert!(preempt_thread(tid, 0x2000, 0).is_ok());
        assert_eq!(thread_state(tid), Some(ThreadState::Running));
        // SAFETY: test-only read-back of the frame we just redirected.
        let frame = unsafe { &*(sp as *const TrapFrame) };
        assert_eq!(frame.elr, 0x2000);
    }

    #[test]
    fn handle_user_data_abort_resumes_when_hook_handles_it() {
        fn always_handle(_va: u64, _write: bool, _elr: u64) -> bool {
            true
        }
        set_data_abort_hook(always_handle);
        let mut frame = TrapFrame::default();
        assert_eq!(handle_user_data_abort(&mut frame), 0);
    }

    #[test]
    fn handle_user_debug_resumes_when_hook_handles_it() {
        fn always_handle(_elr: u64) -> bool {
            true
        }
        set_debug_hook(always_handle);
        let mut frame = TrapFrame::default();
        assert_eq!(handle_user_debug(&mut frame), 0);
    }

    #[test]
    fn resume_sp_for_fresh_thread_prepares_entry_frame() {
        let pid = create_process(None);
        let tid = create_thread(pid, dummy_entry, 99, Priority::Normal, Some(PeId::new(0)));
        let sp = resume_sp_for(tid).unwrap();
        assert_ne!(sp, 0);
        // SAFETY: test-only read-back of the frame we just prepared.
        let frame = unsafe { &*(sp as *const TrapFrame) };
        assert_eq!(frame.x[0], 99);
        assert_eq!(frame.elr, dummy_entry as usize as u64);
    }
}
