//! # Architecture Abstraction Layer
//!
//! Provides a hardware abstraction boundary for the kernel: the tick
//! source, interrupt enable, and what the dispatch loop does when there is
//! nothing to run. The Cortex-M4 port is used on bare-metal ARM targets;
//! everywhere else a host fallback keeps the kernel runnable in tests.

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod cortex_m4;

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub use cortex_m4::{enable_interrupts, idle};

#[cfg(not(all(target_arch = "arm", target_os = "none")))]
pub use host::{enable_interrupts, idle};

#[cfg(not(all(target_arch = "arm", target_os = "none")))]
mod host {
    /// Nothing to unmask on a host.
    #[inline]
    pub fn enable_interrupts() {}

    #[inline]
    pub fn idle() {
        core::hint::spin_loop();
    }
}
