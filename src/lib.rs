//! # Cotask: Cooperative Slice Scheduler
//!
//! A cooperative task scheduler for single-core, interrupt-driven
//! microcontrollers.
//!
//! ## Overview
//!
//! Each task is a small state machine: an ordered table of *slices*
//! (plain functions) and the index of the one to run next. The dispatch
//! loop pops a task from the immediate queue, runs one slice to
//! completion, and re-queues the task according to the slice's
//! [`Directive`](task::Directive). A periodic tick interrupt advances time
//! and moves tasks whose deadline has passed from the timer heap to the
//! immediate queue. No task preempts another.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │            Application tasks (demo.rs, drivers)         │
//! ├─────────────────────────────────────────────────────────┤
//! │        Kernel API + TaskContext (kernel.rs)             │
//! │   new_task · schedule · lock/unlock · process_callback  │
//! ├──────────────────────────────┬──────────────────────────┤
//! │  Scheduler (scheduler.rs)    │  Sync (sync.rs)          │
//! │  ─ immediate queue           │  ─ critical_section      │
//! │  ─ timer heap                │  ─ Shared<T>             │
//! │  ─ mutex table (mutex.rs)    │                          │
//! ├──────────────┬───────────────┼──────────────────────────┤
//! │  list.rs     │  heap.rs      │  ring_buffer.rs          │
//! │  link arena  │  timer queue  │  lock-free SPSC bytes    │
//! ├──────────────┴───────────────┴──────────────────────────┤
//! │   Task model (task.rs) · Errors (error.rs) · config.rs  │
//! ├─────────────────────────────────────────────────────────┤
//! │        Arch port (arch/cortex_m4.rs): SysTick, wfi      │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Memory Model
//!
//! - **No heap**: all state is statically sized
//! - **No `alloc`**: pure `core` outside of tests
//! - **Fixed task arena**: pooled slots plus statically declared slots
//! - **Critical sections**: `critical-section` crate for shared state
//! - **Ring buffer**: atomics only, no critical section on the hot path

#![cfg_attr(not(test), no_std)]

pub mod arch;
pub mod config;
pub mod demo;
pub mod error;
pub mod heap;
pub mod kernel;
pub mod list;
pub mod mutex;
pub mod ring_buffer;
pub mod scheduler;
pub mod sync;
pub mod task;

pub use error::{SchedError, SchedResult};
pub use kernel::{Kernel, TaskContext};
pub use mutex::MutexId;
pub use ring_buffer::RingBuffer;
pub use scheduler::{Scheduler, SchedulerStats};
pub use task::{Directive, Slice, SliceResult, TaskId, Tick};
