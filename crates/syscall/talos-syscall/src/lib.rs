//! Syscall numbers, error codes, and the generated dispatch table.
//!
//! The actual behavior behind each syscall lives in `talos-kernel`, which
//! implements [`SyscallHandler`] and calls [`dispatch`] from the `svc #0`
//! trap path.

#![no_std]
#![warn(missing_docs)]

talos_syscall_macros::define_syscalls! {
    errors {
        EPERM = 1;
        ENOENT = 2;
        ESRCH = 3;
        EINTR = 4;
        EIO = 5;
        EBUSY = 16;
        EINVAL = 22;
        ENOSYS = 38;
        ENOMEM = 12;
        EFAULT = 14;
    }

    syscalls {
        fn sched_yield() = 0;
        fn sched_getaffinity(pid: u64, out_ptr: u64) = 1;
        fn exit(code: u64) = 2;
        fn exit_group(code: u64) = 3;
        fn thread_start(func: u64, stack: u64, arg: u64) = 4;
        fn thread_preempt(tid: u64, pc: u64, sp: u64) = 5;
        fn get_time(clock_type: u64, timespec_ptr: u64) = 6;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        log: alloc::vec::Vec<&'static str>,
    }

    extern crate alloc;

    impl SyscallHandler for Fixture {
        type Thread = ();

        fn sched_yield(&mut self, _thread: &mut ()) -> i64 {
            self.log.push("sched_yield");
            0
        }

        fn sched_getaffinity(&mut self, _thread: &mut (), pid: u64, _out_ptr: u64) -> i64 {
            if pid == 0 {
                -errno::ESRCH
            } else {
                0
            }
        }

        fn exit(&mut self, _thread: &mut (), _code: u64) -> i64 {
            self.log.push("exit");
            0
        }

        fn exit_group(&mut self, _thread: &mut (), _code: u64) -> i64 {
            0
        }

        fn thread_start(&mut self, _thread: &mut (), _func: u64, _stack: u64, _arg: u64) -> i64 {
            7
        }

        fn thread_preempt(&mut self, _thread: &mut (), _tid: u64, _pc: u64, _sp: u64) -> i64 {
            -errno::EBUSY
        }

        fn get_time(&mut self, _thread: &mut (), _clock_type: u64, _timespec_ptr: u64) -> i64 {
            0
        }
    }

    #[test]
    fn dispatch_routes_to_the_right_handler() {
        let mut h = Fixture {
            log: alloc::vec::Vec::new(),
        };
        let mut thread = ();
        let ret = dispatch(&mut h, &mut thread, nr::SCHED_YIELD, [0; 6]);
        assert_eq!(ret, 0);
        assert_eq!(h.log, ["sched_yield"]);
    }

    #[test]
    fn dispatch_passes_arguments_in_order() {
        let mut h = Fixture {
            log: alloc::vec::Vec::new(),
        };
        let mut thread = ();
        let ret = dispatch(&mut h, &mut thread, nr::SCHED_GETAFFINITY, [0, 0x1000, 0, 0, 0, 0]);
        assert_eq!(ret, -errno::ESRCH);
    }

    #[test]
    fn dispatch_unknown_number_returns_enosys() {
        let mut h = Fixture {
            log: alloc::vec::Vec::new(),
        };
        let mut thread = ();
        let ret = dispatch(&mut h, &mut thread, 0xffff, [0; 6]);
        assert_eq!(ret, -errno::ENOSYS);
    }

    #[test]
    fn nr_count_matches_defined_syscalls() {
        assert_eq!(nr::COUNT, 7);
    }
}
