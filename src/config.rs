//! # Cotask Configuration
//!
//! Compile-time constants governing the scheduler and its resources.
//! All limits are fixed at compile time; nothing is allocated at runtime.

/// Number of task slots handed out by `new_task()`.
/// Allocation past this count fails with `SchedError::PoolExhausted`
/// until a pooled task is deleted.
pub const TASK_POOL_SIZE: usize = 16;

/// Number of task slots reserved for statically declared tasks
/// (driver task tables indexed by a resource id). These are claimed
/// with `declare_task()` and live for the whole program.
pub const STATIC_TASKS: usize = 8;

/// Total size of the task arena.
pub const MAX_TASKS: usize = TASK_POOL_SIZE + STATIC_TASKS;

/// Capacity of the timer priority queue. A task is resident in at most
/// one queue, so this only has to cover `MAX_TASKS`.
pub const TIMER_QUEUE_CAPACITY: usize = 32;

/// Number of task mutexes. Each one owns a wait-list head in the
/// scheduler's link arena.
pub const MAX_MUTEXES: usize = 8;

/// Default ring buffer size in bytes. One slot is always kept empty,
/// so the usable capacity is `RING_BUFFER_SIZE - 1`.
pub const RING_BUFFER_SIZE: usize = 128;

/// Free-slot threshold below which a ring buffer counts as almost full.
/// Serial drivers use it to assert hardware flow control before overrun.
pub const RING_BUFFER_TOO_CLOSE: usize = 16;

/// SysTick frequency in Hz. One tick is one scheduler time unit.
pub const TICK_HZ: u32 = 1000;

/// System clock frequency in Hz (default for STM32F4 at 16 MHz HSI).
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;

const _: () = assert!(MAX_TASKS <= TIMER_QUEUE_CAPACITY);
const _: () = assert!(MAX_TASKS < u8::MAX as usize);
const _: () = assert!(RING_BUFFER_SIZE >= 2);
