//! Type-safe identifiers for kernel resources.
//!
//! These newtypes prevent accidental mixing of PEs, processes, threads, and
//! IRQ numbers at compile time.

use core::fmt;

/// Processing element identifier (`MPIDR_EL1.Aff0` on this platform).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct PeId(u32);

impl PeId {
    /// Creates a new `PeId`.
    pub const fn new(val: u32) -> Self {
        Self(val)
    }

    /// Returns the raw `u32` value.
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Returns the value as `usize` (convenience for indexing per-PE tables).
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Pid(u32);

impl Pid {
    /// Creates a new `Pid`.
    pub const fn new(val: u32) -> Self {
        Self(val)
    }

    /// Returns the raw `u32` value.
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Thread identifier. Unique within the lifetime of the kernel, not just
/// within the owning process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Tid(u64);

impl Tid {
    /// Creates a new `Tid`.
    pub const fn new(val: u64) -> Self {
        Self(val)
    }

    /// Returns the raw `u64` value.
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// IRQ number as seen by the distributor (SGI, PPI, or SPI range).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct IrqNum(u32);

impl IrqNum {
    /// Creates a new `IrqNum`.
    pub const fn new(val: u32) -> Self {
        Self(val)
    }

    /// Returns the raw `u32` value.
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// True if this falls in the Software Generated Interrupt range (0-15).
    pub const fn is_sgi(self) -> bool {
        self.0 < 16
    }

    /// True if this falls in the Private Peripheral Interrupt range (16-31).
    pub const fn is_ppi(self) -> bool {
        self.0 >= 16 && self.0 < 32
    }
}

impl fmt::Display for IrqNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pe_id_roundtrip() {
        let id = PeId::new(3);
        assert_eq!(id.as_u32(), 3);
        assert_eq!(id.as_usize(), 3);
    }

    #[test]
    fn pid_roundtrip() {
        let pid = Pid::new(42);
        assert_eq!(pid.as_u32(), 42);
    }

    #[test]
    fn pid_display() {
        let pid = Pid::new(1);
        assert_eq!(format!("{pid}"), "1");
    }

    #[test]
    fn pid_ordering() {
        assert!(Pid::new(1) < Pid::new(2));
    }

    #[test]
    fn tid_roundtrip() {
        let tid = Tid::new(7);
        assert_eq!(tid.as_u64(), 7);
    }

    #[test]
    fn tid_ordering_is_monotonic_friendly() {
        assert!(Tid::new(1) < Tid::new(2));
    }

    #[test]
    fn irq_num_ranges() {
        assert!(IrqNum::new(0).is_sgi());
        assert!(!IrqNum::new(0).is_ppi());
        assert!(IrqNum::new(16).is_ppi());
        assert!(!IrqNum::new(32).is_ppi());
        assert!(!IrqNum::new(32).is_sgi());
    }

    #[test]
    fn irq_num_display() {
        let irq = IrqNum::new(33);
        assert_eq!(format!("{irq}"), "33");
    }
}
