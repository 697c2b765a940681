//! Intermediate representation for the syscall DSL.

use syn::{Ident, LitInt, Type};

/// Top-level definition from the DSL: `define_syscalls! { errors { .. } syscalls { .. } }`.
pub(crate) struct SyscallDefs {
    pub errors: Vec<ErrorDef>,
    pub syscalls: Vec<SyscallDef>,
}

/// An error code definition: `ENOENT = 2;`
pub(crate) struct ErrorDef {
    pub name: Ident,
    pub value: LitInt,
}

/// A single syscall: `fn sched_yield() = 0;`
pub(crate) struct SyscallDef {
    pub name: Ident,
    pub args: Vec<ArgDef>,
    pub number: LitInt,
}

/// An argument to a syscall. All arguments and the return value are raw
/// 64-bit words at the ABI boundary; the declared type documents intended
/// use and nothing more.
pub(crate) struct ArgDef {
    pub name: Ident,
    #[allow(dead_code)]
    pub ty: Type,
}

impl SyscallDef {
    /// Number of ABI argument registers this syscall consumes (0..=6).
    pub fn arity(&self) -> usize {
        self.args.len()
    }
}
