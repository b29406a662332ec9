//! End-to-end scenarios driving a private `Kernel` through simulated ticks.

use std::sync::atomic::{AtomicU32, Ordering};

use cotask::config::{RING_BUFFER_SIZE, TASK_POOL_SIZE};
use cotask::demo::{self, Pipeline, Role, Worker};
use cotask::task::Membership;
use cotask::{Directive, Kernel, MutexId, SchedError, Slice, SliceResult, TaskContext};

fn idle(_: &mut TaskContext<'_>) -> SliceResult {
    SliceResult::end(0)
}

static IDLE: [Slice; 1] = [idle];

/// Advance `ticks` ticks, draining the immediate queue after each one.
fn run_ticks(kernel: &Kernel, ticks: u32, mut each: impl FnMut(&Kernel)) {
    for _ in 0..ticks {
        kernel.tick();
        kernel.run_until_idle(64);
        each(kernel);
    }
}

#[test]
fn producer_consumer_conserves_bytes() {
    static PIPELINE: Pipeline = Pipeline::new(MutexId::new(0));
    static WORKERS: [Worker; 5] = [
        Worker::new(&PIPELINE, Role::Producer, 125),
        Worker::new(&PIPELINE, Role::Producer, 1000),
        Worker::new(&PIPELINE, Role::Consumer, 250),
        Worker::new(&PIPELINE, Role::Consumer, 750),
        Worker::new(&PIPELINE, Role::AdaptiveConsumer, 5000),
    ];

    let kernel = Kernel::new();
    demo::spawn(&kernel, &PIPELINE, &WORKERS).unwrap();

    let mut peak = 0;
    run_ticks(&kernel, 60_000, |_| peak = peak.max(PIPELINE.buffer.len()));

    // producers outpace the fixed consumers until the buffer tops out
    assert!(peak >= RING_BUFFER_SIZE - 2);
    assert_eq!(
        PIPELINE.inserted() as usize,
        PIPELINE.removed() as usize + PIPELINE.buffer.len()
    );
    assert_eq!(PIPELINE.violations(), 0);
    assert!(kernel.is_consistent());
}

#[test]
fn pool_allows_exactly_its_capacity() {
    let kernel = Kernel::new();
    kernel.init();

    let tasks: Vec<_> = (0..TASK_POOL_SIZE)
        .map(|_| kernel.new_task(&IDLE, None, 10, true).unwrap())
        .collect();
    assert_eq!(
        kernel.new_task(&IDLE, None, 10, true),
        Err(SchedError::PoolExhausted)
    );

    kernel.delete_task(tasks[5]).unwrap();
    assert!(kernel.new_task(&IDLE, None, 10, true).is_ok());
    assert_eq!(
        kernel.new_task(&IDLE, None, 10, true),
        Err(SchedError::PoolExhausted)
    );
    assert_eq!(kernel.stats().pool_exhausted, 2);
}

#[test]
fn resched_task_is_not_released_before_its_deadline() {
    const T: u64 = 7;
    const P: u64 = 5;
    let kernel = Kernel::new();
    for _ in 0..T {
        kernel.tick();
    }
    let task = kernel.new_task(&IDLE, None, P, true).unwrap();
    kernel.schedule(task, Directive::Resched).unwrap();

    while kernel.now() < T + P {
        kernel.tick();
        assert_eq!(kernel.immediate_len(), 0, "released early at {}", kernel.now());
    }
    kernel.tick();
    assert_eq!(kernel.immediate_len(), 1);
    assert_eq!(kernel.dequeue(), Some(task));
}

#[test]
fn unlock_wakes_all_waiters_and_one_wins() {
    const LOCK: MutexId = MutexId::new(2);
    static WINS: AtomicU32 = AtomicU32::new(0);

    fn contend(ctx: &mut TaskContext<'_>) -> SliceResult {
        if ctx.lock(LOCK) {
            WINS.fetch_add(1, Ordering::Relaxed);
            // keep the lock
            SliceResult::end(1)
        } else {
            SliceResult::wait(0)
        }
    }
    static CONTEND: [Slice; 1] = [contend];

    let kernel = Kernel::new();
    let owner = kernel.new_task(&IDLE, None, 1, true).unwrap();
    assert!(kernel.try_lock(LOCK, owner));

    for _ in 0..3 {
        let waiter = kernel.new_task(&CONTEND, None, 1, true).unwrap();
        kernel.schedule(waiter, Directive::SchedImmed).unwrap();
    }
    kernel.run_until_idle(16);
    assert_eq!(kernel.mutex_waiters(LOCK), 3);
    assert_eq!(WINS.load(Ordering::Relaxed), 0);

    assert_eq!(kernel.unlock(LOCK, owner), Ok(()));
    assert_eq!(kernel.immediate_len(), 3);

    kernel.run_until_idle(16);
    assert_eq!(WINS.load(Ordering::Relaxed), 1);
    assert_eq!(kernel.mutex_waiters(LOCK), 2);
    let winner = kernel.mutex_owner(LOCK).unwrap();
    assert_ne!(winner, owner);
    assert!(kernel.is_consistent());
}

#[test]
fn non_owner_unlock_leaves_ownership() {
    let lock = MutexId::new(3);
    let kernel = Kernel::new();
    let a = kernel.new_task(&IDLE, None, 1, true).unwrap();
    let b = kernel.new_task(&IDLE, None, 1, true).unwrap();

    assert!(kernel.try_lock(lock, a));
    assert!(!kernel.try_lock(lock, b));
    assert_eq!(kernel.unlock(lock, b), Err(SchedError::NotOwner));
    assert_eq!(kernel.mutex_owner(lock), Some(a));
    assert!(kernel.have_lock(lock, a));
}

#[test]
fn static_task_woken_by_interrupt() {
    static DONE: AtomicU32 = AtomicU32::new(0);

    fn begin(_: &mut TaskContext<'_>) -> SliceResult {
        // peripheral started; the completion interrupt wakes us
        SliceResult::wait(1)
    }
    fn complete(_: &mut TaskContext<'_>) -> SliceResult {
        DONE.fetch_add(1, Ordering::Relaxed);
        SliceResult::end(0)
    }
    static CONVERSION: [Slice; 2] = [begin, complete];

    let kernel = Kernel::new();
    let channel = kernel.declare_task(0, &CONVERSION, None).unwrap();
    kernel.start(channel, 10).unwrap();

    run_ticks(&kernel, 11, |_| {});
    assert_eq!(kernel.task(channel).map(|tcb| tcb.slice_idx()), Some(1));
    assert_eq!(DONE.load(Ordering::Relaxed), 0);

    // what the completion ISR does
    kernel.schedule(channel, Directive::SchedImmed).unwrap();
    kernel.run_until_idle(4);
    assert_eq!(DONE.load(Ordering::Relaxed), 1);
    assert_eq!(kernel.delete_task(channel), Err(SchedError::StaticTask));
}

#[test]
fn task_can_delete_itself() {
    fn once(ctx: &mut TaskContext<'_>) -> SliceResult {
        let id = ctx.id();
        let _ = ctx.kernel().delete_task(id);
        SliceResult::resched(0)
    }
    static ONCE: [Slice; 1] = [once];

    let kernel = Kernel::new();
    let task = kernel.new_task(&ONCE, None, 3, true).unwrap();
    kernel.schedule(task, Directive::SchedImmed).unwrap();
    assert_eq!(kernel.run_until_idle(4), 1);

    assert_eq!(kernel.timer_len(), 0);
    assert_eq!(kernel.with(|s| s.free_len()), TASK_POOL_SIZE);
    assert!(kernel.is_consistent());
}

#[test]
fn slot_reused_by_a_deleting_slice_keeps_its_fresh_state() {
    fn replace(ctx: &mut TaskContext<'_>) -> SliceResult {
        let kernel = ctx.kernel();
        let _ = kernel.delete_task(ctx.id());
        let _ = kernel.new_task(&IDLE, None, 5, true);
        SliceResult::resched(1)
    }
    static REPLACE: [Slice; 2] = [replace, replace];

    let kernel = Kernel::new();
    for _ in 0..TASK_POOL_SIZE - 1 {
        kernel.new_task(&IDLE, None, 10, true).unwrap();
    }
    let task = kernel.new_task(&REPLACE, None, 10, true).unwrap();
    kernel.schedule(task, Directive::SchedImmed).unwrap();
    assert_eq!(kernel.run_until_idle(4), 1);

    // the fresh task landed in the same slot and is untouched
    let tcb = kernel.task(task).unwrap();
    assert_eq!(tcb.slice_count(), IDLE.len());
    assert_eq!(tcb.slice_idx(), 0);
    assert_eq!(tcb.membership(), Membership::Idle);
    assert_eq!(kernel.timer_len(), 0);
    assert!(kernel.is_consistent());
}

#[test]
fn disabled_task_is_dropped_from_timer_queue() {
    static RUNS: AtomicU32 = AtomicU32::new(0);

    fn tick_slice(_: &mut TaskContext<'_>) -> SliceResult {
        RUNS.fetch_add(1, Ordering::Relaxed);
        SliceResult::resched(0)
    }
    static PERIODIC: [Slice; 1] = [tick_slice];

    let kernel = Kernel::new();
    let task = kernel.new_task(&PERIODIC, None, 2, true).unwrap();
    kernel.schedule(task, Directive::Resched).unwrap();
    run_ticks(&kernel, 10, |_| {});
    let before = RUNS.load(Ordering::Relaxed);
    assert!(before > 0);

    kernel.disable(task).unwrap();
    run_ticks(&kernel, 10, |_| {});
    assert_eq!(RUNS.load(Ordering::Relaxed), before);
    assert_eq!(kernel.timer_len(), 0);
    assert_eq!(kernel.stats().dropped_disabled, 1);

    // re-arm by hand
    kernel.enable(task).unwrap();
    kernel.schedule(task, Directive::SchedImmed).unwrap();
    kernel.run_until_idle(4);
    assert_eq!(RUNS.load(Ordering::Relaxed), before + 1);
}
