//! Core types and synchronization primitives for the talos kernel.
//!
//! This crate contains host-testable abstractions shared by the kernel
//! crate: id newtypes, per-PE storage, thread/scheduling metadata, and all
//! synchronization primitives (spin locks, IRQ-safe spin locks, and wait
//! queues).
//!
//! Living outside the kernel crate means these types can be exercised with
//! plain `cargo test` (and `loom` for the lock-ordering-sensitive ones)
//! without a kernel target or emulator.

#![cfg_attr(not(test), no_std)]
#![feature(negative_impls)]
#![warn(missing_docs)]

extern crate alloc;

pub mod cell;
pub mod heap;
pub mod id;
pub mod pls;
pub mod safety;
pub mod sched;
pub mod static_assert;
pub mod sync;
pub mod task;
