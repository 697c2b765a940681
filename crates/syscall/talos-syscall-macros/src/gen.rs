//! Code generation for the syscall DSL.

use proc_macro2::TokenStream;
use quote::{format_ident, quote};

use crate::model::SyscallDefs;

/// Generates the `errno` module, the `nr` module of syscall numbers, and the
/// `SyscallHandler` trait + `dispatch` function.
pub(crate) fn generate(defs: &SyscallDefs) -> TokenStream {
    let errno = generate_errno(defs);
    let numbers = generate_numbers(defs);
    let handler = generate_handler(defs);
    let dispatch = generate_dispatch(defs);

    quote! {
        #errno
        #numbers
        #handler
        #dispatch
    }
}

fn generate_errno(defs: &SyscallDefs) -> TokenStream {
    let entries = defs.errors.iter().map(|e| {
        let name = &e.name;
        let value = &e.value;
        quote! {
            #[doc = concat!("Error code ", stringify!(#name), ".")]
            pub const #name: i64 = #value;
        }
    });
    quote! {
        /// Positive error-code constants. Syscall returns negate these.
        pub mod errno {
            #(#entries)*
        }
    }
}

fn generate_numbers(defs: &SyscallDefs) -> TokenStream {
    let entries = defs.syscalls.iter().map(|s| {
        let const_name = format_ident!("{}", s.name.to_string().to_uppercase());
        let number = &s.number;
        quote! {
            pub const #const_name: u64 = #number;
        }
    });
    let count = defs.syscalls.len();
    quote! {
        /// Syscall-number constants, one per entry in the dispatch table.
        pub mod nr {
            #(#entries)*
            /// Number of distinct syscalls in this table.
            pub const COUNT: usize = #count;
        }
    }
}

fn generate_handler(defs: &SyscallDefs) -> TokenStream {
    let methods = defs.syscalls.iter().map(|s| {
        let name = &s.name;
        let args = s.args.iter().map(|a| {
            let arg_name = &a.name;
            quote! { #arg_name: u64 }
        });
        quote! {
            /// Arity: see `ARITY` for the generated dispatch table.
            fn #name(&mut self, thread: &mut Self::Thread, #(#args),*) -> i64;
        }
    });

    quote! {
        /// Implemented by the kernel crate to supply the behavior behind
        /// each syscall number. `Thread` is left abstract so this crate does
        /// not need to know the kernel's thread representation.
        pub trait SyscallHandler {
            /// The per-thread context type passed to every handler.
            type Thread;

            #(#methods)*
        }
    }
}

fn generate_dispatch(defs: &SyscallDefs) -> TokenStream {
    let arms = defs.syscalls.iter().map(|s| {
        let name = &s.name;
        let const_name = format_ident!("{}", name.to_string().to_uppercase());
        let arg_exprs = (0..s.arity()).map(|i| {
            let idx = syn::Index::from(i);
            quote! { args[#idx] }
        });
        quote! {
            nr::#const_name => handler.#name(thread, #(#arg_exprs),*),
        }
    });

    quote! {
        /// Looks up `number` in the generated table and invokes the bound
        /// handler with up to six raw argument words. Out-of-range numbers
        /// return `-ENOSYS` without touching `handler` or `thread`.
        pub fn dispatch<H: SyscallHandler>(
            handler: &mut H,
            thread: &mut H::Thread,
            number: u64,
            args: [u64; 6],
        ) -> i64 {
            match number {
                #(#arms)*
                _ => -errno::ENOSYS,
            }
        }
    }
}
