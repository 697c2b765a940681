//! Kernel entry point and boot sequence.
//!
//! The boot PE enters at [`_start`], sets up a stack, and jumps into
//! [`kernel_main`]. Everything [`kernel_main`] needs before it can trust
//! ordinary Rust code (a stack, the early console, per-PE storage) is
//! established by the time it runs. Secondary PEs enter at [`secondary_start`]
//! after the boot PE releases them via the spin table.

extern crate alloc;

use alloc::boxed::Box;

use talos_core::id::PeId;

use crate::arch::gic::Gic;
use crate::log::LogLevel;
use crate::pl011::Pl011;
use crate::platform::{ClockSource, DeviceTree, GenericTimerClock, MemoryRegion};

const BOOT_STACK_SIZE: usize = 256 * 1024;
const HEAP_SIZE: usize = 8 * 1024 * 1024;

#[repr(align(16))]
struct AlignedBytes<const N: usize>([u8; N]);

static mut BOOT_STACK: AlignedBytes<BOOT_STACK_SIZE> = AlignedBytes([0; BOOT_STACK_SIZE]);
static mut HEAP: AlignedBytes<HEAP_SIZE> = AlignedBytes([0; HEAP_SIZE]);

static EARLY_CONSOLE: Pl011 = Pl011::new(QemuVirt::UART_BASE, LogLevel::Debug);

/// Hardcoded device-tree stand-in for a QEMU `virt` machine with GICv3 and
/// one PL011 UART.
///
/// TODO: replace with a real flattened-device-tree parse once one is in
/// scope; until then this is the single place board layout lives.
struct QemuVirt {
    boot_pes: [u32; 1],
    regions: [MemoryRegion; 1],
}

impl QemuVirt {
    const GICD_BASE: u64 = 0x0800_0000;
    const GICR_BASE: u64 = 0x080A_0000;
    const UART_BASE: usize = 0x0900_0000;

    const fn new() -> Self {
        Self {
            boot_pes: [0],
            regions: [MemoryRegion {
                start: 0x4000_0000,
                size: 0x4000_0000,
            }],
        }
    }
}

impl DeviceTree for QemuVirt {
    fn gic_addresses(&self) -> (u64, u64) {
        (Self::GICD_BASE, Self::GICR_BASE)
    }

    fn boot_pe_ids(&self) -> &[u32] {
        &self.boot_pes
    }

    fn memory_regions(&self) -> &[MemoryRegion] {
        &self.regions
    }

    fn command_line(&self) -> Option<&str> {
        None
    }
}

/// Raw AArch64 entry point: installs a boot stack and branches into
/// [`kernel_main`]. Never returns.
///
/// # Safety
///
/// Must be the very first code executed on the boot PE, at EL1, with the
/// MMU off (this kernel runs with a flat physical address space throughout).
#[cfg(target_arch = "aarch64")]
#[unsafe(naked)]
#[unsafe(no_mangle)]
pub unsafe extern "C" fn _start() -> ! {
    core::arch::naked_asm!(
        "adrp x0, {stack}",
        "add x0, x0, :lo12:{stack}",
        "mov x1, {stack_size}",
        "add sp, x0, x1",
        "b {main}",
        stack = sym BOOT_STACK,
        stack_size = const BOOT_STACK_SIZE,
        main = sym kernel_main,
    );
}

/// Entry point for a secondary PE, released via [`crate::arch::wait_for_release`].
/// Never returns.
extern "C" fn secondary_start(arg: u64) -> ! {
    let pe_index = arg as usize;
    // SAFETY: runs once per secondary PE, before it is scheduled, with
    // interrupts still masked.
    unsafe {
        crate::arch::cpu_init(crate::arch::gic::global(), pe_index);
        core::arch::asm!("msr DAIFClr, #0xf", options(nomem, nostack));
    }
    loop {
        talos_intrinsics::wfi();
    }
}

/// Safe Rust entry point reached once a stack is live.
///
/// Performs the full boot sequence: early console, per-PE storage, the
/// interrupt controller, the heap, the full logger, secondary-PE bring-up,
/// and finally spawns the initial process before idling with interrupts
/// enabled.
pub extern "C" fn kernel_main() -> ! {
    // SAFETY: first logging call on the boot PE, before any other PE exists.
    unsafe {
        crate::log::init_early_console(&EARLY_CONSOLE);
    }
    crate::kprint!("talos: boot PE alive\n");

    // SAFETY: runs once, before any secondary PE is released or interrupt
    // unmasked.
    unsafe {
        crate::pls::init();
    }

    let dt = QemuVirt::new();
    let (gicd, gicr) = dt.gic_addresses();
    let gic = Gic::new(gicd as usize, gicr as usize);
    // SAFETY: runs once, before any PE enables its CPU interface.
    unsafe {
        gic.init_distributor();
    }
    crate::arch::gic::init_global(gic);
    // SAFETY: boot PE, interrupts still masked.
    unsafe {
        crate::arch::cpu_init(crate::arch::gic::global(), 0);
    }
    crate::arch::gic::global().enable_distributor();

    crate::syscall::register_clock(&GenericTimerClock);
    crate::log::set_boot_nanos_fn(|| GenericTimerClock.now_nanos());

    // SAFETY: `HEAP` is a static, exclusively owned from this point on; no
    // allocation happens before this call.
    #[allow(static_mut_refs)]
    unsafe {
        talos_core::heap::init(core::ptr::addr_of_mut!(HEAP.0) as usize, HEAP_SIZE);
    }

    crate::log::init_logger(Box::new(Pl011::new(
        QemuVirt::UART_BASE,
        crate::config::MAX_LOG_LEVEL,
    )));
    crate::kinfo!("heap and logger ready");

    for (index, &pe) in dt.boot_pe_ids().iter().enumerate().skip(1) {
        let stack = alloc::vec![0u8; crate::config::SECONDARY_BOOT_STACK_SIZE].into_boxed_slice();
        let top = (stack.as_ptr() as u64 + stack.len() as u64) & !0xf;
        // The spin table and PSCI CPU_ON keep this stack alive for the
        // kernel's lifetime; it is never freed.
        core::mem::forget(stack);
        match crate::arch::psci::cpu_on(
            u64::from(pe),
            secondary_start as usize as u64,
            index as u64,
        ) {
            Ok(()) => crate::arch::release_pe(PeId::new(pe), top),
            Err(err) => crate::kwarn!("psci cpu_on for pe {pe} failed: {err:?}"),
        }
    }

    talos_intrinsics::set_cntp_tval_el0(crate::config::TIMER_RELOAD_TICKS);
    talos_intrinsics::set_cntp_ctl_el0(true, false);

    extern "C" fn init_entry(_arg: u64) -> ! {
        loop {
            talos_intrinsics::wfi();
        }
    }
    let init_pid = crate::proc::spawn_init(init_entry);
    crate::kinfo!("spawned init process {init_pid:?}");

    // SAFETY: per-PE storage, the GIC, the heap, and the logger are all
    // initialized by this point.
    unsafe {
        core::arch::asm!("msr DAIFClr, #0xf", options(nomem, nostack));
    }

    loop {
        talos_intrinsics::wfi();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qemu_virt_reports_single_region_and_pe() {
        let dt = QemuVirt::new();
        assert_eq!(dt.boot_pe_ids(), &[0]);
        assert_eq!(dt.memory_regions().len(), 1);
        assert_eq!(
            dt.gic_addresses(),
            (QemuVirt::GICD_BASE, QemuVirt::GICR_BASE)
        );
    }
}
