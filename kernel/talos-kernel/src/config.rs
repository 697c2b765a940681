//! Compile-time kernel configuration.
//!
//! Plain constants rather than a build-script-generated crate: there is no
//! per-target codegen step in this kernel, so a `const` module is the
//! simplest source of truth.

use crate::log::LogLevel;

/// Maximum kernel log level. Sinks filter independently via
/// [`LogSink::max_level`](crate::log::LogSink::max_level); this is the
/// default applied to the early console sink.
pub const MAX_LOG_LEVEL: LogLevel = LogLevel::Debug;

/// Maximum number of processing elements (PEs) this kernel supports.
///
/// Matches [`talos_core::pls::MAX_PES`]; duplicated here as a plain `usize`
/// so kernel code doesn't need to import `talos_core` for a size constant.
pub const MAX_PES: usize = talos_core::pls::MAX_PES;

/// Boot stack size for a secondary PE, reserved per spin-table entry.
pub const SECONDARY_BOOT_STACK_SIZE: usize = 128 * 1024;

/// Default stack size for a newly created kernel thread.
pub const DEFAULT_THREAD_STACK_SIZE: usize = 1024 * 1024;

/// Default scheduling quantum, in timer ticks, for a new thread.
pub const DEFAULT_QUANTUM_TICKS: u32 = talos_core::sched::DEFAULT_QUANTUM_TICKS;

/// Default priority assigned to SGIs and the timer IRQ in the GIC.
pub const DEFAULT_IRQ_PRIORITY: u8 = 0x10;

/// Maximum number of distinct IRQ numbers the handler table tracks.
///
/// Covers 16 SGIs + 16 PPIs + a generous span of SPIs for a virtual
/// platform; real hardware with more SPIs would need a larger table.
pub const MAX_IRQS: usize = 256;

/// SGI used to wake a remote PE after a cross-PE run-queue mutation
/// (see the concurrency model's lock-mutate-SGI protocol).
pub const SGI_RESCHEDULE: u32 = 1;

/// GIC INTID of the non-secure EL1 physical timer (`CNTP`), a PPI.
pub const TIMER_IRQ: u32 = 30;

/// Timer ticks between successive `CNTP` reloads.
pub const TIMER_RELOAD_TICKS: u32 = 10_000;
