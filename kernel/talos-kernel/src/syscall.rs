//! User-memory access primitives and the `svc #0` dispatch path.
//!
//! Only immediate `0` is an accepted syscall trap (`svc #0`); any other
//! immediate is treated as an unrecognized trap and returns `-ENOSYS` without
//! dispatching, rather than being given meaning it was never assigned.
//!
//! Return convention: the result goes in `x0`; the saved `SPSR_EL1`'s Carry
//! flag is set iff that result is negative, so callers can branch on the
//! flag instead of re-checking `x0`'s sign.

extern crate alloc;

use talos_core::id::Tid;
use talos_core::pls::{FaultExpectation, FaultKind};
use talos_syscall::{dispatch, errno, SyscallHandler};

use crate::arch::trap::TrapFrame;
use crate::arch::uaccess::{load_byte_raw, store_byte_raw, uaccess_fault_recover};
use crate::platform::{ClockClass, ClockSource};

/// Addresses at or above this are never valid user addresses (this kernel's
/// TTBR0 region is the low half of the address space).
const USER_VA_LIMIT: u64 = 0x0000_8000_0000_0000;

/// Whether `[ptr, ptr+len)` lies entirely within the user half of the
/// address space, without wrapping.
pub fn access_ok(ptr: u64, len: usize) -> bool {
    let Some(end) = ptr.checked_add(len as u64) else {
        return false;
    };
    end <= USER_VA_LIMIT
}

fn with_fault_expectation<T>(f: impl FnOnce() -> T) -> T {
    crate::pls::get().set_fault_expectation(Some(FaultExpectation {
        kind: FaultKind::UserAccess,
        recover_ip: uaccess_fault_recover as usize as u64,
    }));
    let result = f();
    crate::pls::get().take_fault_expectation();
    result
}

/// Copies `data` into user memory at `user_ptr`, byte by byte, stopping and
/// returning `Err` on the first fault.
pub fn copy_to_user(user_ptr: u64, data: &[u8]) -> Result<(), i64> {
    if !access_ok(user_ptr, data.len()) {
        return Err(-errno::EFAULT);
    }
    for (i, &byte) in data.iter().enumerate() {
        let status = with_fault_expectation(|| unsafe {
            store_byte_raw(user_ptr + i as u64, byte as u64)
        });
        if status != 0 {
            return Err(-errno::EFAULT);
        }
    }
    Ok(())
}

/// Copies `len` bytes from user memory at `user_ptr` into a freshly
/// allocated buffer.
pub fn copy_from_user(user_ptr: u64, len: usize) -> Result<alloc::vec::Vec<u8>, i64> {
    if !access_ok(user_ptr, len) {
        return Err(-errno::EFAULT);
    }
    let mut buf = alloc::vec![0u8; len];
    for (i, slot) in buf.iter_mut().enumerate() {
        let mut out: u8 = 0;
        let status = with_fault_expectation(|| unsafe {
            load_byte_raw(user_ptr + i as u64, &mut out as *mut u8 as u64)
        });
        if status != 0 {
            return Err(-errno::EFAULT);
        }
        *slot = out;
    }
    Ok(buf)
}

static CLOCKS: talos_core::cell::RacyCell<[Option<&'static dyn ClockSource>; 3]> =
    talos_core::cell::RacyCell::new([None, None, None]);

fn clock_slot(class: ClockClass) -> usize {
    match class {
        ClockClass::Global => 0,
        ClockClass::Local => 1,
        ClockClass::Rtc => 2,
    }
}

/// Registers the platform clock source for one class. Called once at boot.
pub fn register_clock(source: &'static dyn ClockSource) {
    let slot = clock_slot(source.class());
    // SAFETY: called only during single-threaded boot, before any PE reads.
    unsafe { (*CLOCKS.get())[slot] = Some(source) };
}

fn clock_for(clock_type: u64) -> Option<&'static dyn ClockSource> {
    let slot = match clock_type {
        0 => 0,
        1 => 1,
        2 => 2,
        _ => return None,
    };
    // SAFETY: `register_clock` only ever runs before this is read.
    unsafe { (*CLOCKS.get())[slot] }
}

/// The kernel's [`SyscallHandler`] implementation. Stateless: all mutable
/// state lives in the global process/thread tables and the per-PE scheduler.
struct KernelSyscalls;

impl SyscallHandler for KernelSyscalls {
    type Thread = Tid;

    fn sched_yield(&mut self, _thread: &mut Tid) -> i64 {
        crate::sched::yield_current();
        0
    }

    fn sched_getaffinity(&mut self, _thread: &mut Tid, pid: u64, out_ptr: u64) -> i64 {
        let Some(affinity) = crate::proc::process_affinity(talos_core::id::Pid::new(pid as u32))
        else {
            return -errno::ESRCH;
        };
        let mask: u64 = affinity.map(|pe| 1u64 << (pe.as_u32() & 63)).unwrap_or(!0);
        match copy_to_user(out_ptr, &mask.to_ne_bytes()) {
            Ok(()) => 0,
            Err(err) => err,
        }
    }

    fn exit(&mut self, thread: &mut Tid, code: u64) -> i64 {
        crate::proc::exit_thread(*thread, code as i32);
        0
    }

    fn exit_group(&mut self, thread: &mut Tid, code: u64) -> i64 {
        if let Some(process) = crate::proc::process_of(*thread) {
            crate::proc::exit_group(process, code as i32);
        }
        0
    }

    fn thread_start(&mut self, thread: &mut Tid, func: u64, _stack: u64, arg: u64) -> i64 {
        let Some(process) = crate::proc::process_of(*thread) else {
            return -errno::ESRCH;
        };
        // SAFETY: `func` is a user-supplied code address validated by
        // `access_ok`-style checks at the caller's own risk, matching the
        // syscall ABI's contract that `func` is a valid entry point.
        let entry: extern "C" fn(u64) -> ! = unsafe { core::mem::transmute(func as usize) };
        let tid = crate::proc::create_thread(
            process,
            entry,
            arg,
            talos_core::task::Priority::Normal,
            None,
        );
        tid.as_u64() as i64
    }

    fn thread_preempt(&mut self, _thread: &mut Tid, tid: u64, pc: u64, sp: u64) -> i64 {
        match crate::proc::preempt_thread(Tid::new(tid), pc, sp) {
            Ok(()) => 0,
            Err(crate::proc::PreemptError::NoSuchThread) => -errno::ESRCH,
            Err(crate::proc::PreemptError::NotSleeping) => -errno::EBUSY,
        }
    }

    fn get_time(&mut self, _thread: &mut Tid, clock_type: u64, timespec_ptr: u64) -> i64 {
        let Some(clock) = clock_for(clock_type) else {
            return -errno::EINVAL;
        };
        let nanos = clock.now_nanos();
        let secs = nanos / 1_000_000_000;
        let nsec = nanos % 1_000_000_000;
        let mut buf = [0u8; 16];
        buf[0..8].copy_from_slice(&secs.to_ne_bytes());
        buf[8..16].copy_from_slice(&nsec.to_ne_bytes());
        match copy_to_user(timespec_ptr, &buf) {
            Ok(()) => 0,
            Err(err) => err,
        }
    }
}

/// Entry point for `handle_sync_lower_el`'s `EC_SVC64` arm.
///
/// Rejects any immediate other than 0, marks the deferred-IRQ state machine
/// so a concurrent IRQ queues instead of interrupting the syscall, dispatches,
/// writes the result back into `x0`, then hands off to the scheduler in case
/// the syscall made the current thread non-runnable (`exit`, `exit_group`) or
/// requested a yield.
#[unsafe(no_mangle)]
pub(crate) extern "C" fn handle_svc(frame: &mut TrapFrame) -> u64 {
    let svc_immediate = frame.iss() & 0xffff;
    if svc_immediate != 0 {
        frame.set_return(-errno::ENOSYS);
        frame.set_carry(true);
        return 0;
    }

    let pls = crate::pls::get();
    let Some(mut tid) = pls.current_thread() else {
        frame.set_return(-errno::ESRCH);
        frame.set_carry(true);
        return 0;
    };

    pls.set_irq_cause(talos_core::pls::IrqCause::Syscall);
    let args = [
        frame.arg(0),
        frame.arg(1),
        frame.arg(2),
        frame.arg(3),
        frame.arg(4),
        frame.arg(5),
    ];
    let ret = dispatch(&mut KernelSyscalls, &mut tid, frame.syscall_number(), args);
    frame.set_return(ret);
    frame.set_carry(ret < 0);
    pls.set_irq_cause(talos_core::pls::IrqCause::None);

    crate::sched::drain_deferred_irqs();
    crate::sched::reschedule(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_ok_rejects_kernel_half_addresses() {
        assert!(access_ok(0x1000, 16));
        assert!(!access_ok(USER_VA_LIMIT, 1));
        assert!(!access_ok(u64::MAX - 4, 16));
    }

    #[test]
    fn copy_to_user_and_back_round_trips_through_a_user_like_buffer() {
        let mut buf = [0u8; 4];
        let ptr = buf.as_mut_ptr() as u64;
        copy_to_user(ptr, &[1, 2, 3, 4]).unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);
        let back = copy_from_user(ptr, 4).unwrap();
        assert_eq!(back, alloc::vec![1, 2, 3, 4]);
    }

    #[test]
    fn copy_to_user_rejects_kernel_address() {
        assert_eq!(copy_to_user(USER_VA_LIMIT, &[0]), Err(-errno::EFAULT));
    }
}
