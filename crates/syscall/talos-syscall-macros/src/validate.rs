//! Cross-item validation for the syscall DSL.
//!
//! Checked separately from parsing so a single malformed item doesn't hide
//! duplicate-number errors elsewhere in the definition.

use std::collections::HashMap;

use crate::model::SyscallDefs;

pub(crate) fn validate(defs: &SyscallDefs) -> Result<(), Vec<syn::Error>> {
    let mut errors = Vec::new();
    let mut seen_numbers: HashMap<u64, &syn::Ident> = HashMap::new();
    let mut seen_names: HashMap<String, &syn::Ident> = HashMap::new();

    for syscall in &defs.syscalls {
        let Ok(number) = syscall.number.base10_parse::<u64>() else {
            errors.push(syn::Error::new_spanned(
                &syscall.number,
                "syscall number must be a non-negative integer",
            ));
            continue;
        };

        if let Some(prev) = seen_numbers.insert(number, &syscall.name) {
            errors.push(syn::Error::new_spanned(
                &syscall.name,
                format!("syscall number {number} already used by `{prev}`"),
            ));
        }

        let name = syscall.name.to_string();
        if let Some(prev) = seen_names.insert(name.clone(), &syscall.name) {
            errors.push(syn::Error::new_spanned(
                &syscall.name,
                format!("syscall `{name}` already defined near `{prev}`"),
            ));
        }
    }

    let mut seen_error_names: HashMap<String, &syn::Ident> = HashMap::new();
    for error in &defs.errors {
        let name = error.name.to_string();
        if let Some(prev) = seen_error_names.insert(name.clone(), &error.name) {
            errors.push(syn::Error::new_spanned(
                &error.name,
                format!("error `{name}` already defined near `{prev}`"),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
