//! # Synchronization Primitives
//!
//! Interrupt-safe critical section abstractions. All shared scheduler
//! state must be accessed within a critical section to prevent data races
//! between the main loop and interrupt handlers.
//!
//! The implementation is chosen at link time through the `critical-section`
//! crate: on Cortex-M it masks interrupts (`cortex-m`'s single-core
//! implementation), on a host it is a process-wide lock (`std` feature).

use core::cell::RefCell;

pub use ::critical_section::CriticalSection;

/// State shared between the main loop and interrupt handlers.
pub type Shared<T> = ::critical_section::Mutex<RefCell<T>>;

/// Wrap `value` for sharing. Usable in `static` initializers.
pub const fn shared<T>(value: T) -> Shared<T> {
    ::critical_section::Mutex::new(RefCell::new(value))
}

/// Execute a closure within a critical section.
///
/// Interrupts are disabled on entry and restored on exit, ensuring
/// atomicity of the enclosed operation.
///
/// # Usage
/// ```ignore
/// sync::critical_section(|cs| {
///     let mut state = SHARED.borrow_ref_mut(cs);
/// });
/// ```
///
/// # Performance
/// Keep critical sections as short as possible to minimize interrupt
/// latency. Never call back into the kernel from inside one: the shared
/// state is already borrowed.
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(CriticalSection<'_>) -> R,
{
    ::critical_section::with(f)
}
