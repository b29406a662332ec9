//! # Producer/Consumer Workload
//!
//! Reference workload exercising every kernel primitive at once: producers
//! and consumers share one [`RingBuffer`] guarded by one task mutex, each
//! written as a small slice state machine.
//!
//! | Task        | Period | Behaviour                                      |
//! |-------------|--------|------------------------------------------------|
//! | producer 0  | 125    | one byte per period                            |
//! | producer 1  | 1000   | one byte per period                            |
//! | consumer 0  | 250    | one byte per period                            |
//! | consumer 1  | 750    | one byte per period                            |
//! | consumer 2  | 5000   | drops to 75 when the buffer is nearly full     |
//! | reporter    | 500    | logs the counters                              |
//!
//! ## Producer slices
//!
//! ```text
//!   0 produce ──► 1 get_control ──(locked)──► 2 finalize ──► Resched(0)
//!                   │   ▲                        │
//!                   │   └──── SchedImmed(1) ─────┘ buffer full
//!                   └─ Wait(1) until the mutex is released
//! ```
//!
//! Consumers mirror this: `get_control`, `finalize` (take one byte), then
//! `consume`, which re-arms the timer.
//!
//! Every access to the buffer happens with the mutex held; a slice that
//! reaches `finalize` without it counts a protocol violation.

use core::sync::atomic::{AtomicU32, AtomicU8, Ordering};

use crate::config::RING_BUFFER_SIZE;
use crate::error::SchedResult;
use crate::kernel::{Kernel, TaskContext};
use crate::mutex::MutexId;
use crate::ring_buffer::RingBuffer;
use crate::task::{Directive, Slice, SliceResult, TaskId, Tick};

/// Reporter period in ticks.
pub const REPORT_PERIOD: Tick = 500;

/// Adaptive consumer period while the buffer is nearly full.
pub const BURST_PERIOD: Tick = 75;

/// Shared state of one workload instance.
pub struct Pipeline {
    pub buffer: RingBuffer<RING_BUFFER_SIZE>,
    pub mutex: MutexId,
    inserted: AtomicU32,
    removed: AtomicU32,
    violations: AtomicU32,
}

impl Pipeline {
    pub const fn new(mutex: MutexId) -> Self {
        Self {
            buffer: RingBuffer::new(),
            mutex,
            inserted: AtomicU32::new(0),
            removed: AtomicU32::new(0),
            violations: AtomicU32::new(0),
        }
    }

    /// Bytes successfully inserted so far.
    pub fn inserted(&self) -> u32 {
        self.inserted.load(Ordering::Relaxed)
    }

    /// Bytes removed so far.
    pub fn removed(&self) -> u32 {
        self.removed.load(Ordering::Relaxed)
    }

    /// Times a slice touched the buffer without holding the mutex.
    pub fn violations(&self) -> u32 {
        self.violations.load(Ordering::Relaxed)
    }

    fn check_lock(&self, ctx: &TaskContext<'_>) -> bool {
        let held = ctx.have_lock(self.mutex);
        if !held {
            self.violations.fetch_add(1, Ordering::Relaxed);
            log::warn!("task {} in critical slice without the lock", ctx.id().index());
        }
        held
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Producer,
    Consumer,
    /// Consumer that speeds up when the buffer is nearly full and slows
    /// back down once it is half empty.
    AdaptiveConsumer,
}

/// Per-task data of a producer or consumer.
pub struct Worker {
    pub pipeline: &'static Pipeline,
    pub role: Role,
    pub period: Tick,
    /// Producer: next byte to write. Consumer: last byte read.
    byte: AtomicU8,
}

impl Worker {
    pub const fn new(pipeline: &'static Pipeline, role: Role, period: Tick) -> Self {
        Self {
            pipeline,
            role,
            period,
            byte: AtomicU8::new(0),
        }
    }

    /// Last byte consumed (consumers) or next byte to produce (producers).
    pub fn byte(&self) -> u8 {
        self.byte.load(Ordering::Relaxed)
    }

    fn slices(&self) -> &'static [Slice] {
        match self.role {
            Role::Producer => &PRODUCER,
            Role::Consumer | Role::AdaptiveConsumer => &CONSUMER,
        }
    }
}

// ---------------------------------------------------------------------------
// Producer
// ---------------------------------------------------------------------------

static PRODUCER: [Slice; 3] = [produce, producer_get_control, producer_finalize];

fn produce(ctx: &mut TaskContext<'_>) -> SliceResult {
    if let Some(worker) = ctx.data::<Worker>() {
        worker.byte.fetch_add(1, Ordering::Relaxed);
    }
    SliceResult::immediate(1)
}

fn producer_get_control(ctx: &mut TaskContext<'_>) -> SliceResult {
    let Some(worker) = ctx.data::<Worker>() else {
        return SliceResult::end(0);
    };
    if ctx.lock(worker.pipeline.mutex) {
        SliceResult::immediate(2)
    } else {
        SliceResult::wait(1)
    }
}

fn producer_finalize(ctx: &mut TaskContext<'_>) -> SliceResult {
    let Some(worker) = ctx.data::<Worker>() else {
        return SliceResult::end(0);
    };
    let pipeline = worker.pipeline;
    if !pipeline.check_lock(ctx) {
        return SliceResult::immediate(1);
    }

    let stored = !pipeline.buffer.is_full();
    if stored {
        pipeline.buffer.insert(worker.byte(), false);
        pipeline.inserted.fetch_add(1, Ordering::Relaxed);
    }
    if let Err(err) = ctx.unlock(pipeline.mutex) {
        log::warn!("producer {} unlock failed: {}", ctx.id().index(), err);
    }

    if stored {
        SliceResult::resched(0)
    } else {
        // full: go back for the lock and try again
        SliceResult::immediate(1)
    }
}

// ---------------------------------------------------------------------------
// Consumer
// ---------------------------------------------------------------------------

static CONSUMER: [Slice; 3] = [consumer_get_control, consumer_finalize, consume];

fn consumer_get_control(ctx: &mut TaskContext<'_>) -> SliceResult {
    let Some(worker) = ctx.data::<Worker>() else {
        return SliceResult::end(0);
    };
    if ctx.lock(worker.pipeline.mutex) {
        SliceResult::immediate(1)
    } else {
        SliceResult::wait(0)
    }
}

fn consumer_finalize(ctx: &mut TaskContext<'_>) -> SliceResult {
    let Some(worker) = ctx.data::<Worker>() else {
        return SliceResult::end(0);
    };
    let pipeline = worker.pipeline;
    if !pipeline.check_lock(ctx) {
        return SliceResult::immediate(0);
    }

    if let Some(byte) = pipeline.buffer.remove() {
        worker.byte.store(byte, Ordering::Relaxed);
        pipeline.removed.fetch_add(1, Ordering::Relaxed);
    }
    if let Err(err) = ctx.unlock(pipeline.mutex) {
        log::warn!("consumer {} unlock failed: {}", ctx.id().index(), err);
    }
    SliceResult::immediate(2)
}

fn consume(ctx: &mut TaskContext<'_>) -> SliceResult {
    let Some(worker) = ctx.data::<Worker>() else {
        return SliceResult::end(0);
    };
    if worker.role == Role::AdaptiveConsumer {
        let used = worker.pipeline.buffer.len();
        let period = if used >= RING_BUFFER_SIZE - 2 {
            Some(BURST_PERIOD)
        } else if used < RING_BUFFER_SIZE / 2 {
            Some(worker.period)
        } else {
            None
        };
        if let Some(period) = period {
            // the running task is always live
            let _ = ctx.set_ticks(period);
        }
    }
    SliceResult::resched(0)
}

// ---------------------------------------------------------------------------
// Reporter
// ---------------------------------------------------------------------------

static REPORTER: [Slice; 1] = [report];

fn report(ctx: &mut TaskContext<'_>) -> SliceResult {
    if let Some(pipeline) = ctx.data::<Pipeline>() {
        let stats = ctx.kernel().stats();
        log::info!(
            "t={} inserted={} removed={} buffered={} violations={} dispatched={}",
            ctx.now(),
            pipeline.inserted(),
            pipeline.removed(),
            pipeline.buffer.len(),
            pipeline.violations(),
            stats.dispatched
        );
    }
    SliceResult::resched(0)
}

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

/// Allocate and arm one task per worker plus the reporter. Returns the
/// reporter's handle.
pub fn spawn(
    kernel: &Kernel,
    pipeline: &'static Pipeline,
    workers: &'static [Worker],
) -> SchedResult<TaskId> {
    kernel.init();
    kernel.mutex_init(pipeline.mutex);
    for worker in workers {
        let task = kernel.new_task(worker.slices(), Some(worker), worker.period, true)?;
        kernel.schedule(task, Directive::Resched)?;
    }
    let reporter = kernel.new_task(&REPORTER, Some(pipeline), REPORT_PERIOD, true)?;
    kernel.schedule(reporter, Directive::Resched)?;
    log::info!("workload started with {} workers", workers.len());
    Ok(reporter)
}
