//! Kernel logging infrastructure.
//!
//! Two-phase, mirroring the rest of boot:
//!
//! **Phase 1 — early console (pre-heap):** [`init_early_console`] installs a
//! lock-free print/log function pair that writes directly to the PL011
//! console with no allocation. Everything before the heap exists (PLS setup,
//! GIC init, page-table bring-up) logs through this path.
//!
//! **Phase 2 — full logger (post-heap):** [`init_logger`] builds a [`Logger`]
//! holding a `Vec<Box<dyn LogSink>>` and swaps the function pointers to route
//! through it. Additional sinks can be registered with [`add_sink`].
//!
//! The console itself is an external collaborator (see module docs on
//! [`pl011`]): the core only depends on the [`LogSink`] trait.

extern crate alloc;

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt::{self, Write as _};
use core::sync::atomic::{AtomicUsize, Ordering};

use talos_core::cell::RacyCell;
use talos_core::sync::SpinLock;

/// Kernel log severity, most to least verbose when filtering a sink.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Unrecoverable kernel fault about to panic.
    Error = 0,
    /// Recoverable but noteworthy (e.g. a deferred IRQ queue near capacity).
    Warn = 1,
    /// Normal staged-boot and lifecycle messages.
    Info = 2,
    /// Diagnostic detail useful while developing a subsystem.
    Debug = 3,
    /// Per-event detail (trap entry/exit, scheduler decisions).
    Trace = 4,
}

impl LogLevel {
    /// Short fixed-width tag used in formatted output.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Warn => "WARN ",
            Self::Info => "INFO ",
            Self::Debug => "DEBUG",
            Self::Trace => "TRACE",
        }
    }
}

/// A dyn-compatible output sink for the kernel logger.
pub trait LogSink: Send + Sync {
    /// Writes a string fragment to this sink.
    fn write_str(&self, s: &str);
    /// Maximum verbosity this sink accepts (messages with `level <= max_level`
    /// are written).
    fn max_level(&self) -> LogLevel;
    /// Human-readable name, used by [`replace_sink_by_name`].
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Phase 1: early, lock-free function pointers
// ---------------------------------------------------------------------------

type PrintFn = fn(fmt::Arguments<'_>);
type LogFn = fn(LogLevel, fmt::Arguments<'_>);

static PRINT_FN: RacyCell<Option<PrintFn>> = RacyCell::new(None);
static LOG_FN: RacyCell<Option<LogFn>> = RacyCell::new(None);

/// Registers the print/log function pair used by [`kprint!`]/[`klog!`].
///
/// # Safety
///
/// Must only be called during single-threaded boot, before any other PE
/// observes `PRINT_FN`/`LOG_FN`.
unsafe fn set_fns(print_fn: PrintFn, log_fn: LogFn) {
    unsafe {
        *PRINT_FN.get() = Some(print_fn);
        *LOG_FN.get() = Some(log_fn);
    }
}

#[doc(hidden)]
pub fn dispatch_print(args: fmt::Arguments<'_>) {
    // SAFETY: read-only after `set_fns` is called once during boot.
    if let Some(f) = unsafe { *PRINT_FN.get() } {
        f(args);
    }
}

#[doc(hidden)]
pub fn dispatch_log(level: LogLevel, args: fmt::Arguments<'_>) {
    // SAFETY: read-only after `set_fns` is called once during boot.
    if let Some(f) = unsafe { *LOG_FN.get() } {
        f(level, args);
    }
}

/// Nanoseconds since boot, used to stamp log lines.
///
/// A free function rather than a direct `crate::time` call so this module
/// does not need to know which clock source backs it.
static BOOT_NANOS_SOURCE: AtomicUsize = AtomicUsize::new(0);

/// Installs the function the logger uses to timestamp lines.
///
/// Called once from `boot` with a function reading the `GLOBAL` clock class
/// (see `crate::platform::ClockSource`).
pub fn set_boot_nanos_fn(f: fn() -> u64) {
    BOOT_NANOS_SOURCE.store(f as usize, Ordering::Release);
}

fn boot_nanos() -> u64 {
    let ptr = BOOT_NANOS_SOURCE.load(Ordering::Acquire);
    if ptr == 0 {
        return 0;
    }
    // SAFETY: `ptr` was stored from a real `fn() -> u64` by `set_boot_nanos_fn`.
    let f: fn() -> u64 = unsafe { core::mem::transmute(ptr) };
    f()
}

fn format_timestamp(nanos: u64) -> (u64, u64) {
    let total_micros = nanos / 1_000;
    (total_micros / 1_000_000, total_micros % 1_000_000)
}

/// Early console writer: a single fixed sink, no lock, no allocation.
struct EarlyWriter<'a>(&'a dyn LogSink);

impl fmt::Write for EarlyWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.write_str(s);
        Ok(())
    }
}

static EARLY_SINK: RacyCell<Option<&'static dyn LogSink>> = RacyCell::new(None);

fn early_print(args: fmt::Arguments<'_>) {
    // SAFETY: set once before any secondary PE runs.
    if let Some(sink) = unsafe { *EARLY_SINK.get() } {
        let _ = EarlyWriter(sink).write_fmt(args);
    }
}

fn early_log(level: LogLevel, args: fmt::Arguments<'_>) {
    // SAFETY: set once before any secondary PE runs.
    if let Some(sink) = unsafe { *EARLY_SINK.get() } {
        let (secs, micros) = format_timestamp(boot_nanos());
        let _ = write!(EarlyWriter(sink), "[{secs:>5}.{micros:06}] {} {args}\n", level.name());
    }
}

/// Registers `sink` as the early, pre-heap console and wires up
/// [`kprint!`]/[`klog!`] to it.
///
/// # Safety
///
/// `sink` must remain valid for `'static` and must be safe to call
/// concurrently from any PE before the full logger replaces it.
pub unsafe fn init_early_console(sink: &'static dyn LogSink) {
    unsafe {
        *EARLY_SINK.get() = Some(sink);
        set_fns(early_print, early_log);
    }
}

// ---------------------------------------------------------------------------
// Phase 2: full logger, post-heap
// ---------------------------------------------------------------------------

struct LoggerInner {
    sinks: Vec<Box<dyn LogSink>>,
}

/// The kernel logger: fans out to every registered [`LogSink`].
pub struct Logger {
    inner: SpinLock<Option<LoggerInner>>,
}

impl Logger {
    const fn new() -> Self {
        Self {
            inner: SpinLock::new(None),
        }
    }

    fn init(&self, first_sink: Box<dyn LogSink>) {
        {
            let mut guard = self.inner.lock();
            *guard = Some(LoggerInner {
                sinks: alloc::vec![first_sink],
            });
        }
        // SAFETY: function pointers are always valid `fn` items.
        unsafe {
            set_fns(logger_print, logger_log);
        }
    }

    fn add_sink(&self, sink: Box<dyn LogSink>) {
        let mut guard = self.inner.lock();
        if let Some(inner) = guard.as_mut() {
            inner.sinks.push(sink);
        }
    }

    fn replace_sink_by_name(&self, name: &str, new_sink: Box<dyn LogSink>) -> bool {
        let mut guard = self.inner.lock();
        if let Some(inner) = guard.as_mut() {
            for sink in &mut inner.sinks {
                if sink.name() == name {
                    *sink = new_sink;
                    return true;
                }
            }
        }
        false
    }

    fn write_fmt(&self, args: fmt::Arguments<'_>) {
        let guard = self.inner.lock();
        if let Some(inner) = guard.as_ref() {
            for sink in &inner.sinks {
                let _ = SinkWriter(sink.as_ref()).write_fmt(args);
            }
        }
    }

    fn log(&self, level: LogLevel, args: fmt::Arguments<'_>) {
        let (secs, micros) = format_timestamp(boot_nanos());
        let guard = self.inner.lock();
        if let Some(inner) = guard.as_ref() {
            for sink in &inner.sinks {
                if level <= sink.max_level() {
                    let _ = write!(SinkWriter(sink.as_ref()), "[{secs:>5}.{micros:06}] {} {args}\n", level.name());
                }
            }
        }
    }
}

struct SinkWriter<'a>(&'a dyn LogSink);

impl fmt::Write for SinkWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.write_str(s);
        Ok(())
    }
}

/// Global logger instance.
pub static LOGGER: Logger = Logger::new();

fn logger_print(args: fmt::Arguments<'_>) {
    LOGGER.write_fmt(args);
}

fn logger_log(level: LogLevel, args: fmt::Arguments<'_>) {
    LOGGER.log(level, args);
}

/// Initializes the full, heap-backed logger, carrying `first_sink` (usually
/// the same console used in phase 1) into it.
pub fn init_logger(first_sink: Box<dyn LogSink>) {
    LOGGER.init(first_sink);
}

/// Registers an additional sink with the global logger.
pub fn add_sink(sink: Box<dyn LogSink>) {
    LOGGER.add_sink(sink);
}

/// Replaces a named sink. Returns `true` if a sink with that name existed.
pub fn replace_sink_by_name(name: &str, new_sink: Box<dyn LogSink>) -> bool {
    LOGGER.replace_sink_by_name(name, new_sink)
}

/// Prints unformatted, unfiltered output to every sink (panic handler path).
#[macro_export]
macro_rules! kprint {
    ($($arg:tt)*) => {
        $crate::log::dispatch_print(format_args!($($arg)*))
    };
}

/// Logs a leveled, timestamped message.
#[macro_export]
macro_rules! klog {
    ($level:expr, $($arg:tt)*) => {
        $crate::log::dispatch_log($level, format_args!($($arg)*))
    };
}

/// Logs at [`LogLevel::Info`].
#[macro_export]
macro_rules! kinfo {
    ($($arg:tt)*) => { $crate::klog!($crate::log::LogLevel::Info, $($arg)*) };
}

/// Logs at [`LogLevel::Warn`].
#[macro_export]
macro_rules! kwarn {
    ($($arg:tt)*) => { $crate::klog!($crate::log::LogLevel::Warn, $($arg)*) };
}

/// Logs at [`LogLevel::Debug`].
#[macro_export]
macro_rules! kdebug {
    ($($arg:tt)*) => { $crate::klog!($crate::log::LogLevel::Debug, $($arg)*) };
}

/// Logs at [`LogLevel::Error`].
#[macro_export]
macro_rules! kerror {
    ($($arg:tt)*) => { $crate::klog!($crate::log::LogLevel::Error, $($arg)*) };
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::AtomicU32;

    struct CountingSink {
        count: AtomicU32,
        max_level: LogLevel,
    }

    impl LogSink for CountingSink {
        fn write_str(&self, _s: &str) {
            self.count.fetch_add(1, Ordering::Relaxed);
        }
        fn max_level(&self) -> LogLevel {
            self.max_level
        }
        fn name(&self) -> &str {
            "counting"
        }
    }

    #[test]
    fn log_level_ordering_is_severity_first() {
        assert!(LogLevel::Error < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Info);
        assert!(LogLevel::Debug < LogLevel::Trace);
    }

    #[test]
    fn logger_filters_by_max_level() {
        let logger = Logger::new();
        logger.init(Box::new(CountingSink {
            count: AtomicU32::new(0),
            max_level: LogLevel::Warn,
        }));
        logger.log(LogLevel::Trace, format_args!("should be filtered"));
        logger.log(LogLevel::Error, format_args!("should pass"));
        let guard = logger.inner.lock();
        // Only the Error line should have produced any write_str calls.
        drop(guard);
    }

    #[test]
    fn replace_sink_by_name_swaps_matching_sink() {
        let logger = Logger::new();
        logger.init(Box::new(CountingSink {
            count: AtomicU32::new(0),
            max_level: LogLevel::Trace,
        }));
        let replaced = logger.replace_sink_by_name(
            "counting",
            Box::new(CountingSink {
                count: AtomicU32::new(0),
                max_level: LogLevel::Error,
            }),
        );
        assert!(replaced);
        assert!(!logger.replace_sink_by_name("missing", Box::new(CountingSink {
            count: AtomicU32::new(0),
            max_level: LogLevel::Error,
        })));
    }
}
