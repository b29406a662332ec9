//! # Cortex-M4 Port Layer
//!
//! Hardware-specific code for the ARM Cortex-M4 (Thumb-2) processor:
//! SysTick as the scheduler tick, interrupt enable, and sleep-until-
//! interrupt while the immediate queue is empty.
//!
//! ## Interrupt Priorities
//!
//! SysTick runs at the lowest priority (0xFF) so device interrupts that
//! wake tasks are never delayed by timer bookkeeping. The kernel's critical
//! sections mask all interrupts, so the relative order only matters for
//! latency.

use cortex_m::peripheral::syst::SystClkSource;

use crate::config::{SYSTEM_CLOCK_HZ, TICK_HZ};

// ---------------------------------------------------------------------------
// SysTick configuration
// ---------------------------------------------------------------------------

/// Configure the SysTick timer for the scheduler tick.
///
/// Sets up SysTick to fire at `TICK_HZ` frequency using the processor
/// clock. Each tick enters [`SysTick`], which advances the global kernel.
///
/// # Parameters
/// - `syst`: Mutable reference to the SysTick peripheral
pub fn configure_systick(syst: &mut cortex_m::peripheral::SYST) {
    let reload = SYSTEM_CLOCK_HZ / TICK_HZ - 1;
    set_systick_priority();
    syst.set_reload(reload);
    syst.clear_current();
    syst.set_clock_source(SystClkSource::Core);
    syst.enable_counter();
    syst.enable_interrupt();
}

/// Put SysTick at the lowest interrupt priority.
fn set_systick_priority() {
    // System Handler Priority Register 3 (SHPR3): 0xE000_ED20
    // Bits [31:24] = SysTick priority
    const SHPR3: *mut u32 = 0xE000_ED20 as *mut u32;
    unsafe {
        let val = core::ptr::read_volatile(SHPR3);
        core::ptr::write_volatile(SHPR3, val | (0xFF << 24));
    }
}

// ---------------------------------------------------------------------------
// Interrupts and idle
// ---------------------------------------------------------------------------

/// Unmask interrupts. Called once when the dispatch loop starts.
#[inline]
pub fn enable_interrupts() {
    // SAFETY: all kernel state is behind critical sections
    unsafe { cortex_m::interrupt::enable() }
}

/// Sleep until the next interrupt.
#[inline]
pub fn idle() {
    cortex_m::asm::wfi();
}

// ---------------------------------------------------------------------------
// SysTick handler
// ---------------------------------------------------------------------------

/// SysTick exception handler, the scheduler tick entry point.
///
/// Called at `TICK_HZ` frequency. Advances the tick counter and moves due
/// timers onto the immediate queue; the dispatch loop wakes from `wfi`
/// and picks them up.
#[no_mangle]
pub unsafe extern "C" fn SysTick() {
    crate::kernel::global().tick();
}
