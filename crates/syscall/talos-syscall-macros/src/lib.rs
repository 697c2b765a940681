//! Proc-macro crate for the talos syscall definition DSL.
//!
//! Provides `define_syscalls!`, which generates error-code constants,
//! syscall-number constants, a `SyscallHandler` trait, and a `dispatch`
//! function from a single declarative definition.

mod gen;
mod model;
mod parse;
mod validate;

use proc_macro::TokenStream;
use syn::parse_macro_input;

use model::SyscallDefs;

/// Defines syscall numbers, error codes, and the generated dispatch table.
///
/// See `crates/syscall/talos-syscall/src/lib.rs` for the invocation.
#[proc_macro]
pub fn define_syscalls(input: TokenStream) -> TokenStream {
    let defs = parse_macro_input!(input as SyscallDefs);

    if let Err(errors) = validate::validate(&defs) {
        let mut combined = proc_macro2::TokenStream::new();
        for err in errors {
            combined.extend(err.to_compile_error());
        }
        return combined.into();
    }

    gen::generate(&defs).into()
}
