//! Parser for the `define_syscalls!` DSL.

use syn::parse::{Parse, ParseStream};
use syn::{braced, parenthesized, Ident, LitInt, Token};

use crate::model::{ArgDef, ErrorDef, SyscallDef, SyscallDefs};

mod kw {
    syn::custom_keyword!(errors);
    syn::custom_keyword!(syscalls);
}

impl Parse for SyscallDefs {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let mut errors = Vec::new();
        let mut syscalls = Vec::new();

        input.parse::<kw::errors>()?;
        let errors_body;
        braced!(errors_body in input);
        while !errors_body.is_empty() {
            errors.push(errors_body.parse::<ErrorDef>()?);
        }

        input.parse::<kw::syscalls>()?;
        let syscalls_body;
        braced!(syscalls_body in input);
        while !syscalls_body.is_empty() {
            syscalls.push(syscalls_body.parse::<SyscallDef>()?);
        }

        Ok(SyscallDefs { errors, syscalls })
    }
}

impl Parse for ErrorDef {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let name: Ident = input.parse()?;
        input.parse::<Token![=]>()?;
        let value: LitInt = input.parse()?;
        input.parse::<Token![;]>()?;
        Ok(ErrorDef { name, value })
    }
}

impl Parse for SyscallDef {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        input.parse::<Token![fn]>()?;
        let name: Ident = input.parse()?;

        let args_body;
        parenthesized!(args_body in input);
        let mut args = Vec::new();
        while !args_body.is_empty() {
            args.push(args_body.parse::<ArgDef>()?);
            if !args_body.is_empty() {
                args_body.parse::<Token![,]>()?;
            }
        }

        input.parse::<Token![=]>()?;
        let number: LitInt = input.parse()?;
        input.parse::<Token![;]>()?;

        if args.len() > 6 {
            return Err(syn::Error::new(
                name.span(),
                "syscalls support at most 6 arguments",
            ));
        }

        Ok(SyscallDef { name, args, number })
    }
}

impl Parse for ArgDef {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let name: Ident = input.parse()?;
        input.parse::<Token![:]>()?;
        let ty = input.parse()?;
        Ok(ArgDef { name, ty })
    }
}
