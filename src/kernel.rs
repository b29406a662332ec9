//! # Kernel
//!
//! Interrupt-safe front end to the [`Scheduler`] and the context handed to
//! every slice.
//!
//! A [`Kernel`] owns one scheduler inside a critical-section mutex. Each
//! public method is one short critical section; slices themselves run with
//! interrupts enabled, between the two halves of a dispatch.
//!
//! ## Startup Sequence
//!
//! ```text
//! reset_handler (cortex-m-rt)
//!   └─► main()
//!         ├─► kernel::global().init()       ← Prime the task pool
//!         ├─► new_task() / declare_task()   ← Register tasks (×N)
//!         ├─► start() / schedule()          ← Arm them
//!         ├─► arch::configure_systick()     ← Tick source
//!         └─► kernel::global().run()        ← Dispatch loop (no return)
//! ```
//!
//! ## Dispatch cycle
//!
//! ```text
//!   [cs] begin_dispatch ──► slice(&mut ctx) ──► [cs] finish_dispatch
//!                             (interrupts on)
//! ```

use core::any::Any;

use crate::arch;
use crate::error::SchedResult;
use crate::mutex::MutexId;
use crate::scheduler::{Dispatch, Scheduler, SchedulerStats};
use crate::sync::{self, Shared};
use crate::task::{Directive, Slice, TaskControlBlock, TaskData, TaskId, Tick};

// ---------------------------------------------------------------------------
// Global kernel instance
// ---------------------------------------------------------------------------

static KERNEL: Kernel = Kernel::new();

/// The process-wide kernel driven by the tick interrupt.
#[inline]
pub fn global() -> &'static Kernel {
    &KERNEL
}

// ---------------------------------------------------------------------------
// Kernel
// ---------------------------------------------------------------------------

/// Scheduler plus the critical section that guards it.
pub struct Kernel {
    state: Shared<Scheduler>,
}

impl Kernel {
    pub const fn new() -> Self {
        Self {
            state: sync::shared(Scheduler::new()),
        }
    }

    /// Run `f` on the scheduler inside a critical section.
    ///
    /// Must not be nested, and `f` must not call back into this kernel.
    pub fn with<R>(&self, f: impl FnOnce(&mut Scheduler) -> R) -> R {
        sync::critical_section(|cs| f(&mut *self.state.borrow_ref_mut(cs)))
    }

    /// Prime the task pool. Idempotent.
    pub fn init(&self) {
        self.with(Scheduler::init);
    }

    pub fn now(&self) -> Tick {
        self.with(|s| s.now())
    }

    /// Tick interrupt entry: advance time and release due timers.
    pub fn tick(&self) {
        self.with(Scheduler::tick);
    }

    pub fn stats(&self) -> SchedulerStats {
        self.with(|s| s.stats())
    }

    /// Copy of the control block in `task`'s slot.
    pub fn task(&self, task: TaskId) -> Option<TaskControlBlock> {
        self.with(|s| s.task(task).copied())
    }

    pub fn is_consistent(&self) -> bool {
        self.with(|s| s.is_consistent())
    }

    pub fn immediate_len(&self) -> usize {
        self.with(|s| s.immediate_len())
    }

    pub fn timer_len(&self) -> usize {
        self.with(|s| s.timer_len())
    }

    // -- tasks --------------------------------------------------------------

    pub fn new_task(
        &self,
        slices: &'static [Slice],
        data: Option<TaskData>,
        period: Tick,
        enabled: bool,
    ) -> SchedResult<TaskId> {
        self.with(|s| s.new_task(slices, data, period, enabled))
    }

    pub fn declare_task(
        &self,
        slot: usize,
        slices: &'static [Slice],
        data: Option<TaskData>,
    ) -> SchedResult<TaskId> {
        self.with(|s| s.declare_task(slot, slices, data))
    }

    pub fn init_task(
        &self,
        task: TaskId,
        slices: &'static [Slice],
        data: Option<TaskData>,
    ) -> SchedResult<()> {
        self.with(|s| s.init_task(task, slices, data))
    }

    pub fn delete_task(&self, task: TaskId) -> SchedResult<()> {
        self.with(|s| s.delete_task(task))
    }

    pub fn enable(&self, task: TaskId) -> SchedResult<()> {
        self.with(|s| s.enable(task))
    }

    pub fn disable(&self, task: TaskId) -> SchedResult<()> {
        self.with(|s| s.disable(task))
    }

    pub fn set_ticks(&self, task: TaskId, period: Tick) -> SchedResult<()> {
        self.with(|s| s.set_ticks(task, period))
    }

    pub fn set_slice(&self, task: TaskId, index: u8) -> SchedResult<()> {
        self.with(|s| s.set_slice(task, index))
    }

    pub fn start(&self, task: TaskId, period: Tick) -> SchedResult<()> {
        self.with(|s| s.start(task, period))
    }

    /// Queue `task` per `directive`. Interrupt handlers call this with
    /// `SchedImmed` to wake the task that owns their peripheral.
    pub fn schedule(&self, task: TaskId, directive: Directive) -> SchedResult<()> {
        self.with(|s| s.enqueue(task, directive))
    }

    pub fn dequeue(&self) -> Option<TaskId> {
        self.with(Scheduler::dequeue)
    }

    // -- mutexes ------------------------------------------------------------

    pub fn mutex_init(&self, mutex: MutexId) {
        self.with(|s| s.mutex_init(mutex));
    }

    pub fn try_lock(&self, mutex: MutexId, task: TaskId) -> bool {
        self.with(|s| s.mutex_try_lock(mutex, task))
    }

    pub fn lock(&self, mutex: MutexId, task: TaskId) -> bool {
        self.with(|s| s.mutex_lock(mutex, task))
    }

    pub fn unlock(&self, mutex: MutexId, task: TaskId) -> SchedResult<()> {
        self.with(|s| s.mutex_unlock(mutex, task))
    }

    pub fn have_lock(&self, mutex: MutexId, task: TaskId) -> bool {
        self.with(|s| s.mutex_have_lock(mutex, task))
    }

    pub fn mutex_owner(&self, mutex: MutexId) -> Option<TaskId> {
        self.with(|s| s.mutex_owner(mutex))
    }

    pub fn mutex_waiters(&self, mutex: MutexId) -> usize {
        self.with(|s| s.mutex_waiters(mutex))
    }

    // -- dispatch -----------------------------------------------------------

    /// One pass of the dispatch loop. Returns `false` when the immediate
    /// queue was empty.
    pub fn process_callback(&self) -> bool {
        let Some(dispatch) = self.with(Scheduler::begin_dispatch) else {
            return false;
        };
        if let Dispatch::Run { task, slice, data } = dispatch {
            let mut ctx = TaskContext {
                kernel: self,
                task,
                data,
            };
            let result = slice(&mut ctx);
            self.with(|s| s.finish_dispatch(task, result));
        }
        true
    }

    /// Dispatch until the immediate queue drains or `limit` passes have
    /// run. Returns the number of passes.
    pub fn run_until_idle(&self, limit: usize) -> usize {
        let mut passes = 0;
        while passes < limit && self.process_callback() {
            passes += 1;
        }
        passes
    }

    /// Enable interrupts and dispatch forever, idling the core whenever
    /// the immediate queue is empty. **Does not return.**
    pub fn run(&self) -> ! {
        self.init();
        arch::enable_interrupts();
        loop {
            if !self.process_callback() {
                arch::idle();
            }
        }
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Task context
// ---------------------------------------------------------------------------

/// What a running slice sees: its own handle, its data, and the kernel
/// operations that act on itself.
pub struct TaskContext<'k> {
    kernel: &'k Kernel,
    task: TaskId,
    data: Option<TaskData>,
}

impl<'k> TaskContext<'k> {
    #[inline]
    pub fn id(&self) -> TaskId {
        self.task
    }

    #[inline]
    pub fn kernel(&self) -> &'k Kernel {
        self.kernel
    }

    /// The task's data, if it was bound with type `T`.
    pub fn data<T: Any>(&self) -> Option<&'static T> {
        self.data.and_then(|data| data.downcast_ref::<T>())
    }

    pub fn now(&self) -> Tick {
        self.kernel.now()
    }

    pub fn is_enabled(&self) -> bool {
        self.kernel
            .task(self.task)
            .is_some_and(|tcb| tcb.is_enabled())
    }

    pub fn set_ticks(&mut self, period: Tick) -> SchedResult<()> {
        self.kernel.set_ticks(self.task, period)
    }

    pub fn enable(&mut self) -> SchedResult<()> {
        self.kernel.enable(self.task)
    }

    pub fn disable(&mut self) -> SchedResult<()> {
        self.kernel.disable(self.task)
    }

    pub fn lock(&mut self, mutex: MutexId) -> bool {
        self.kernel.lock(mutex, self.task)
    }

    pub fn try_lock(&mut self, mutex: MutexId) -> bool {
        self.kernel.try_lock(mutex, self.task)
    }

    pub fn unlock(&mut self, mutex: MutexId) -> SchedResult<()> {
        self.kernel.unlock(mutex, self.task)
    }

    pub fn have_lock(&self, mutex: MutexId) -> bool {
        self.kernel.have_lock(mutex, self.task)
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::SliceResult;
    use core::sync::atomic::{AtomicU32, Ordering};

    struct Counter(AtomicU32);

    fn count(ctx: &mut TaskContext<'_>) -> SliceResult {
        if let Some(counter) = ctx.data::<Counter>() {
            counter.0.fetch_add(1, Ordering::Relaxed);
        }
        SliceResult::resched(0)
    }

    fn three_steps_a(_: &mut TaskContext<'_>) -> SliceResult {
        SliceResult::immediate(1)
    }

    fn three_steps_b(_: &mut TaskContext<'_>) -> SliceResult {
        SliceResult::immediate(2)
    }

    fn three_steps_c(_: &mut TaskContext<'_>) -> SliceResult {
        SliceResult::end(0)
    }

    static COUNT: [Slice; 1] = [count];
    static STEPS: [Slice; 3] = [three_steps_a, three_steps_b, three_steps_c];

    #[test]
    fn test_periodic_task_runs_once_per_period() {
        static HITS: Counter = Counter(AtomicU32::new(0));
        let kernel = Kernel::new();
        let t = kernel.new_task(&COUNT, Some(&HITS), 10, true).unwrap();
        kernel.schedule(t, Directive::Resched).unwrap();

        for _ in 0..100 {
            kernel.tick();
            kernel.run_until_idle(8);
        }
        // released at ticks 11, 22, 33, ..., 99
        assert_eq!(HITS.0.load(Ordering::Relaxed), 9);
        assert!(kernel.is_consistent());
    }

    #[test]
    fn test_slices_advance_in_order() {
        let kernel = Kernel::new();
        let t = kernel.new_task(&STEPS, None, 0, true).unwrap();
        kernel.schedule(t, Directive::SchedImmed).unwrap();
        assert_eq!(kernel.run_until_idle(10), 3);
        assert_eq!(kernel.task(t).map(|tcb| tcb.slice_idx()), Some(0));
        assert_eq!(kernel.stats().dispatched, 3);
        assert!(!kernel.process_callback());
    }

    #[test]
    fn test_data_type_mismatch_yields_none() {
        static HITS: Counter = Counter(AtomicU32::new(0));
        static WRONG: u8 = 0;
        let kernel = Kernel::new();
        let t = kernel.new_task(&COUNT, Some(&WRONG), 1, true).unwrap();
        kernel.schedule(t, Directive::SchedImmed).unwrap();
        kernel.run_until_idle(1);
        assert_eq!(HITS.0.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_disabled_task_not_run() {
        static HITS: Counter = Counter(AtomicU32::new(0));
        let kernel = Kernel::new();
        let t = kernel.new_task(&COUNT, Some(&HITS), 1, false).unwrap();
        kernel.schedule(t, Directive::SchedImmed).unwrap();
        assert_eq!(kernel.run_until_idle(4), 1);
        assert_eq!(HITS.0.load(Ordering::Relaxed), 0);
        assert_eq!(kernel.stats().dropped_disabled, 1);
        assert_eq!(kernel.timer_len(), 0);
    }
}
