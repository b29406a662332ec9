//! # Scheduler
//!
//! Core scheduling state for Cotask: the task arena, the immediate-dispatch
//! queue, the timer heap, the mutex table and the tick counter.
//!
//! `Scheduler` is a plain value with no synchronization of its own. The
//! [`Kernel`](crate::kernel::Kernel) wraps it in a critical-section mutex
//! and is the only thing firmware should touch; tests drive it directly.
//!
//! ## Scheduling Algorithm
//!
//! At each tick:
//! 1. **Advance time**: increment the tick counter
//! 2. **Release timers**: while the timer heap's earliest deadline has
//!    passed (`now > deadline`), move that task to the immediate queue
//!
//! At each dispatch:
//! 1. **Dequeue**: pop the front of the immediate queue
//! 2. **Filter**: drop disabled tasks and tasks whose slice index is out
//!    of range
//! 3. **Run**: the kernel invokes the slice outside the critical section
//! 4. **Re-queue**: apply the returned directive via [`Scheduler::enqueue`]
//!
//! ## Link arena layout
//!
//! ```text
//!   0 .. TASK_POOL_SIZE           pooled task nodes
//!   TASK_POOL_SIZE .. MAX_TASKS   static task nodes
//!   FREE_HEAD                     free pool
//!   IMMEDIATE_HEAD                immediate queue
//!   WAIT_BASE + m                 wait list of mutex m
//! ```

use crate::config::{MAX_MUTEXES, MAX_TASKS, STATIC_TASKS, TASK_POOL_SIZE, TIMER_QUEUE_CAPACITY};
use crate::error::{SchedError, SchedResult};
use crate::heap::{BoundedHeap, HeapOrder};
use crate::list::{LinkArena, NodeId};
use crate::mutex::{MutexId, TaskMutex};
use crate::task::{
    Directive, Membership, Slice, SliceResult, SlotKind, TaskControlBlock, TaskData, TaskId, Tick,
};

const FREE_HEAD: NodeId = NodeId::new(MAX_TASKS);
const IMMEDIATE_HEAD: NodeId = NodeId::new(MAX_TASKS + 1);
const WAIT_BASE: usize = MAX_TASKS + 2;
const LIST_NODES: usize = WAIT_BASE + MAX_MUTEXES;

#[inline]
const fn node(task: TaskId) -> NodeId {
    NodeId::new(task.index())
}

#[inline]
const fn wait_head(mutex: MutexId) -> NodeId {
    NodeId::new(WAIT_BASE + mutex.index())
}

/// One entry of the timer heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerEntry {
    pub deadline: Tick,
    pub task: TaskId,
}

fn timer_key(entry: &TimerEntry) -> Tick {
    entry.deadline
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

/// Event counters for conditions the scheduler survives but the
/// application may want to surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Slices handed to the kernel for execution.
    pub dispatched: u32,
    /// Tasks popped while disabled and dropped without running.
    pub dropped_disabled: u32,
    /// Tasks dropped because their slice index was out of range.
    pub bad_slices: u32,
    /// Resched requests refused because the timer heap was full.
    pub timer_overflows: u32,
    /// `new_task()` calls refused because the pool was empty.
    pub pool_exhausted: u32,
    /// Enqueue requests refused because the task was already queued.
    pub rejected_enqueues: u32,
}

impl SchedulerStats {
    pub const ZERO: Self = Self {
        dispatched: 0,
        dropped_disabled: 0,
        bad_slices: 0,
        timer_overflows: 0,
        pool_exhausted: 0,
        rejected_enqueues: 0,
    };
}

/// Outcome of popping the immediate queue.
#[derive(Clone, Copy)]
pub enum Dispatch {
    /// Run `slice` for `task`, then report back with
    /// [`Scheduler::finish_dispatch`].
    Run {
        task: TaskId,
        slice: Slice,
        data: Option<TaskData>,
    },
    /// The task was popped but not run (disabled or bad slice index).
    Dropped(TaskId),
}

// ---------------------------------------------------------------------------
// Scheduler struct
// ---------------------------------------------------------------------------

/// The central scheduler state. Held inside a `Kernel`.
///
/// ## Design Notes
///
/// - All tasks are stored inline in a fixed-size array (no heap)
/// - A task's identity is its slot index; its list link sits at the same
///   index in `links`
/// - `Membership` records the one queue a task is in and is checked before
///   every queue operation
pub struct Scheduler {
    tasks: [TaskControlBlock; MAX_TASKS],
    links: LinkArena<LIST_NODES>,
    timers: BoundedHeap<TimerEntry, Tick, TIMER_QUEUE_CAPACITY>,
    mutexes: [TaskMutex; MAX_MUTEXES],
    ticks: Tick,
    primed: bool,
    /// Task whose slice is between `begin_dispatch` and `finish_dispatch`.
    running: Option<TaskId>,
    stats: SchedulerStats,
}

impl Scheduler {
    /// Create a scheduler with empty queues and an unprimed pool.
    pub const fn new() -> Self {
        let mut tasks = [TaskControlBlock::EMPTY; MAX_TASKS];
        let mut i = TASK_POOL_SIZE;
        while i < MAX_TASKS {
            tasks[i].kind = SlotKind::Static;
            i += 1;
        }

        let mut mutexes = [TaskMutex::new(NodeId::new(WAIT_BASE)); MAX_MUTEXES];
        let mut m = 0;
        while m < MAX_MUTEXES {
            mutexes[m] = TaskMutex::new(NodeId::new(WAIT_BASE + m));
            m += 1;
        }

        Self {
            tasks,
            links: LinkArena::new(),
            timers: BoundedHeap::new(HeapOrder::Min, timer_key),
            mutexes,
            ticks: 0,
            primed: false,
            running: None,
            stats: SchedulerStats::ZERO,
        }
    }

    /// Prime the task pool. Safe to call any number of times; only the
    /// first call does anything.
    pub fn init(&mut self) {
        if self.primed {
            return;
        }
        for index in 0..TASK_POOL_SIZE {
            let id = TaskId::new(index);
            self.tasks[index].membership = Membership::Free;
            self.links.add_at_rear(FREE_HEAD, node(id));
        }
        self.primed = true;
        log::debug!("task pool primed with {} slots", TASK_POOL_SIZE);
    }

    /// Current tick count.
    #[inline]
    pub fn now(&self) -> Tick {
        self.ticks
    }

    /// Advance time by one tick and release due timers. Called from the
    /// tick interrupt.
    pub fn tick(&mut self) {
        self.ticks += 1;
        self.timer_callback();
    }

    #[inline]
    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    /// Task control block for `task`, live or not.
    pub fn task(&self, task: TaskId) -> Option<&TaskControlBlock> {
        self.tasks.get(task.index())
    }

    fn live_mut(&mut self, task: TaskId) -> SchedResult<&mut TaskControlBlock> {
        match self.tasks.get_mut(task.index()) {
            Some(tcb) if tcb.membership.is_live() => Ok(tcb),
            _ => Err(SchedError::InvalidTask),
        }
    }

    // -----------------------------------------------------------------------
    // Task lifecycle
    // -----------------------------------------------------------------------

    /// Allocate a task from the pool and bind it to `slices` and `data`.
    ///
    /// The task starts idle: it runs only once something schedules it.
    pub fn new_task(
        &mut self,
        slices: &'static [Slice],
        data: Option<TaskData>,
        period: Tick,
        enabled: bool,
    ) -> SchedResult<TaskId> {
        self.init();
        let Some(free) = self.links.remove_front(FREE_HEAD) else {
            self.stats.pool_exhausted = self.stats.pool_exhausted.wrapping_add(1);
            log::warn!("task pool exhausted ({} slots)", TASK_POOL_SIZE);
            return Err(SchedError::PoolExhausted);
        };

        let id = TaskId::new(free.index());
        let tcb = &mut self.tasks[id.index()];
        tcb.init(slices, data);
        tcb.period = period;
        tcb.enabled = enabled;
        tcb.membership = Membership::Idle;
        log::debug!("task {} allocated, period {}", id.index(), period);
        Ok(id)
    }

    /// Claim static slot `slot` (a driver's resource id) for the lifetime
    /// of the program. Declaring an already-claimed slot rebinds it.
    pub fn declare_task(
        &mut self,
        slot: usize,
        slices: &'static [Slice],
        data: Option<TaskData>,
    ) -> SchedResult<TaskId> {
        if slot >= STATIC_TASKS {
            return Err(SchedError::InvalidTask);
        }
        let id = TaskId::new(TASK_POOL_SIZE + slot);
        self.detach(id);
        let tcb = &mut self.tasks[id.index()];
        tcb.init(slices, data);
        tcb.membership = Membership::Idle;
        log::debug!("static task {} declared", slot);
        Ok(id)
    }

    /// Rebind a live task to a new slice table and data. The task is taken
    /// out of whatever queue it was in, enabled, and rewound to slice 0.
    pub fn init_task(
        &mut self,
        task: TaskId,
        slices: &'static [Slice],
        data: Option<TaskData>,
    ) -> SchedResult<()> {
        self.live_mut(task)?;
        self.detach(task);
        self.tasks[task.index()].init(slices, data);
        Ok(())
    }

    /// Unlink a live task from its queue, release any mutex it owns, wipe
    /// it and return the slot to the pool.
    pub fn delete_task(&mut self, task: TaskId) -> SchedResult<()> {
        let tcb = self.live_mut(task)?;
        if tcb.kind == SlotKind::Static {
            return Err(SchedError::StaticTask);
        }

        self.detach(task);
        for index in 0..MAX_MUTEXES {
            if self.mutexes[index].have_lock(task) {
                self.mutex_unlock(MutexId::new(index), task)?;
            }
        }

        if self.running == Some(task) {
            self.running = None;
        }
        let tcb = &mut self.tasks[task.index()];
        tcb.clear();
        tcb.membership = Membership::Free;
        self.links.add_at_rear(FREE_HEAD, node(task));
        log::debug!("task {} freed", task.index());
        Ok(())
    }

    /// Take `task` out of whichever queue holds it and mark it idle.
    fn detach(&mut self, task: TaskId) {
        let tcb = &mut self.tasks[task.index()];
        match tcb.membership {
            Membership::Immediate | Membership::Waiting(_) => {
                self.links.remove(node(task));
            }
            Membership::Timed => {
                let removed = self.timers.remove_where(|entry| entry.task == task);
                debug_assert!(removed.is_some(), "timed task missing from heap");
            }
            Membership::Idle | Membership::Unclaimed | Membership::Free => return,
        }
        tcb.membership = Membership::Idle;
    }

    pub fn enable(&mut self, task: TaskId) -> SchedResult<()> {
        self.live_mut(task)?.enabled = true;
        Ok(())
    }

    /// Disable `task`. It stays in its queue and is dropped when popped.
    pub fn disable(&mut self, task: TaskId) -> SchedResult<()> {
        self.live_mut(task)?.enabled = false;
        Ok(())
    }

    /// Change the period used by the next `Resched`.
    pub fn set_ticks(&mut self, task: TaskId, period: Tick) -> SchedResult<()> {
        self.live_mut(task)?.period = period;
        Ok(())
    }

    /// Position the task's state machine at slice `index`.
    pub fn set_slice(&mut self, task: TaskId, index: u8) -> SchedResult<()> {
        self.live_mut(task)?.slice_idx = index;
        Ok(())
    }

    /// Driver start helper: set the period, enable, rewind to slice 0 and
    /// arm the timer. A task that is already queued is re-armed.
    pub fn start(&mut self, task: TaskId, period: Tick) -> SchedResult<()> {
        let tcb = self.live_mut(task)?;
        tcb.period = period;
        tcb.enabled = true;
        tcb.slice_idx = 0;
        self.detach(task);
        self.enqueue(task, Directive::Resched)
    }

    // -----------------------------------------------------------------------
    // Queues
    // -----------------------------------------------------------------------

    /// Apply `directive` to an idle task.
    ///
    /// `SchedImmed` appends to the immediate queue; `Resched` arms the timer
    /// at `now + period`. `End` and `Wait` leave the task where it is.
    pub fn enqueue(&mut self, task: TaskId, directive: Directive) -> SchedResult<()> {
        let now = self.ticks;
        let tcb = self.live_mut(task)?;
        if !directive.requeues() {
            return Ok(());
        }
        if tcb.membership != Membership::Idle {
            let membership = tcb.membership;
            self.stats.rejected_enqueues = self.stats.rejected_enqueues.wrapping_add(1);
            log::warn!(
                "task {} already queued ({:?}), {:?} ignored",
                task.index(),
                membership,
                directive
            );
            return Err(SchedError::AlreadyQueued);
        }

        match directive {
            Directive::SchedImmed => {
                tcb.membership = Membership::Immediate;
                self.links.add_at_rear(IMMEDIATE_HEAD, node(task));
            }
            Directive::Resched => {
                // a period past the end of time arms the task for never
                let deadline = now.saturating_add(tcb.period);
                tcb.deadline = deadline;
                if self.timers.insert(TimerEntry { deadline, task }).is_err() {
                    self.stats.timer_overflows = self.stats.timer_overflows.wrapping_add(1);
                    log::warn!("timer queue full, task {} not armed", task.index());
                    return Err(SchedError::TimerQueueFull);
                }
                self.tasks[task.index()].membership = Membership::Timed;
            }
            Directive::End | Directive::Wait => {}
        }
        Ok(())
    }

    /// Pop the front of the immediate queue.
    pub fn dequeue(&mut self) -> Option<TaskId> {
        let popped = self.links.remove_front(IMMEDIATE_HEAD)?;
        let id = TaskId::new(popped.index());
        self.tasks[id.index()].membership = Membership::Idle;
        Some(id)
    }

    /// Move every task whose deadline has passed to the immediate queue,
    /// earliest deadline first.
    pub fn timer_callback(&mut self) {
        let now = self.ticks;
        while let Some(head) = self.timers.head() {
            if now <= head.deadline {
                break;
            }
            let Some(entry) = self.timers.remove_head() else {
                break;
            };
            let task = entry.task;
            self.tasks[task.index()].membership = Membership::Immediate;
            self.links.add_at_rear(IMMEDIATE_HEAD, node(task));
            log::trace!("tick {}: task {} due at {} released", now, task.index(), entry.deadline);
        }
    }

    /// First half of one dispatch cycle: pop a task and decide whether it
    /// runs. Returns `None` when the immediate queue is empty.
    pub fn begin_dispatch(&mut self) -> Option<Dispatch> {
        let task = self.dequeue()?;
        let tcb = &self.tasks[task.index()];

        if !tcb.enabled {
            self.stats.dropped_disabled = self.stats.dropped_disabled.wrapping_add(1);
            log::trace!("task {} disabled, dropped", task.index());
            return Some(Dispatch::Dropped(task));
        }

        let Some(slice) = tcb.current_slice() else {
            let (index, count) = (tcb.slice_idx, tcb.slice_count());
            self.stats.bad_slices = self.stats.bad_slices.wrapping_add(1);
            log::warn!(
                "task {} slice index {} out of range ({} slices), dropped",
                task.index(),
                index,
                count
            );
            return Some(Dispatch::Dropped(task));
        };

        self.stats.dispatched = self.stats.dispatched.wrapping_add(1);
        self.running = Some(task);
        log::trace!("dispatch task {} slice {}", task.index(), tcb.slice_idx);
        Some(Dispatch::Run {
            task,
            slice,
            data: tcb.data,
        })
    }

    /// Second half of one dispatch cycle: record the next slice and
    /// re-queue per the directive. Failures are logged and counted; the
    /// dispatcher carries on.
    ///
    /// If the slice deleted its own task the result is discarded, even when
    /// a new task has since been allocated into the same slot.
    pub fn finish_dispatch(&mut self, task: TaskId, result: SliceResult) {
        if self.running.take() != Some(task) {
            log::trace!("task {} deleted during its slice, result dropped", task.index());
            return;
        }
        let Ok(tcb) = self.live_mut(task) else {
            return;
        };
        tcb.slice_idx = result.next;
        if let Err(err) = self.enqueue(task, result.directive) {
            log::debug!("task {} re-queue failed: {}", task.index(), err);
        }
    }

    /// Number of tasks waiting in the immediate queue.
    pub fn immediate_len(&self) -> usize {
        self.links.len(IMMEDIATE_HEAD)
    }

    /// Number of armed timers.
    pub fn timer_len(&self) -> usize {
        self.timers.len()
    }

    /// Number of free pool slots.
    pub fn free_len(&self) -> usize {
        self.links.len(FREE_HEAD)
    }

    /// Earliest armed deadline, if any.
    pub fn next_deadline(&self) -> Option<Tick> {
        self.timers.head().map(|entry| entry.deadline)
    }

    // -----------------------------------------------------------------------
    // Mutexes
    // -----------------------------------------------------------------------

    /// Reset `mutex` to unowned. Tasks still parked on it go idle.
    pub fn mutex_init(&mut self, mutex: MutexId) {
        let head = wait_head(mutex);
        while let Some(parked) = self.links.remove_front(head) {
            self.tasks[parked.index()].membership = Membership::Idle;
        }
        self.mutexes[mutex.index()].reset();
    }

    pub fn mutex_try_lock(&mut self, mutex: MutexId, task: TaskId) -> bool {
        self.mutexes[mutex.index()].try_lock(task)
    }

    /// Try to lock; on failure park `task` on the wait list. The caller's
    /// slice must then return `Wait`.
    ///
    /// A task that is queued elsewhere is not parked.
    pub fn mutex_lock(&mut self, mutex: MutexId, task: TaskId) -> bool {
        if self.mutexes[mutex.index()].try_lock(task) {
            return true;
        }
        let tcb = &mut self.tasks[task.index()];
        match tcb.membership {
            Membership::Idle => {
                tcb.membership = Membership::Waiting(mutex);
                self.links.add_at_rear(wait_head(mutex), node(task));
            }
            Membership::Waiting(m) if m == mutex => {}
            other => {
                log::warn!("task {} not parked on mutex {}: {:?}", task.index(), mutex.index(), other);
            }
        }
        false
    }

    /// Release `mutex` and move every waiter to the immediate queue.
    pub fn mutex_unlock(&mut self, mutex: MutexId, task: TaskId) -> SchedResult<()> {
        let index = mutex.index();
        self.mutexes[index].release(task)?;

        let head = wait_head(mutex);
        let mut woken = 0usize;
        while let Some(parked) = self.links.remove_front(head) {
            let waiter = TaskId::new(parked.index());
            self.tasks[waiter.index()].membership = Membership::Idle;
            // already counted and logged by enqueue
            let _ = self.enqueue(waiter, Directive::SchedImmed);
            woken += 1;
        }
        if woken > 0 {
            log::debug!("mutex {} released by task {}, {} woken", index, task.index(), woken);
        }
        Ok(())
    }

    pub fn mutex_have_lock(&self, mutex: MutexId, task: TaskId) -> bool {
        self.mutexes[mutex.index()].have_lock(task)
    }

    pub fn mutex_owner(&self, mutex: MutexId) -> Option<TaskId> {
        self.mutexes[mutex.index()].owner()
    }

    /// Number of tasks parked on `mutex`.
    pub fn mutex_waiters(&self, mutex: MutexId) -> usize {
        self.links.len(wait_head(mutex))
    }

    // -----------------------------------------------------------------------
    // Invariants
    // -----------------------------------------------------------------------

    /// Check every structural invariant: list symmetry, heap validity, and
    /// that each task's membership tag names exactly the structure holding
    /// it.
    pub fn is_consistent(&self) -> bool {
        let heads_ok = self.links.is_consistent(FREE_HEAD)
            && self.links.is_consistent(IMMEDIATE_HEAD)
            && (0..MAX_MUTEXES).all(|m| self.links.is_consistent(wait_head(MutexId::new(m))));
        if !heads_ok || !self.timers.is_valid() {
            return false;
        }

        let tags_ok = self.tasks.iter().enumerate().all(|(index, tcb)| {
            let id = TaskId::new(index);
            let n = node(id);
            let timed = self.timers.iter().filter(|entry| entry.task == id).count();
            match tcb.membership {
                Membership::Free => self.links.contains(FREE_HEAD, n) && timed == 0,
                Membership::Immediate => self.links.contains(IMMEDIATE_HEAD, n) && timed == 0,
                Membership::Waiting(m) => {
                    self.links.contains(wait_head(m), n)
                        && timed == 0
                        && !self.mutexes[m.index()].have_lock(id)
                }
                Membership::Timed => !self.links.is_linked(n) && timed == 1,
                Membership::Idle | Membership::Unclaimed => !self.links.is_linked(n) && timed == 0,
            }
        });

        // every list member carries the tag of the list it is in
        let members_ok = self
            .links
            .iter(FREE_HEAD)
            .all(|n| self.tasks[n.index()].membership == Membership::Free)
            && self
                .links
                .iter(IMMEDIATE_HEAD)
                .all(|n| self.tasks[n.index()].membership == Membership::Immediate)
            && (0..MAX_MUTEXES).all(|m| {
                let mutex = MutexId::new(m);
                self.links
                    .iter(wait_head(mutex))
                    .all(|n| self.tasks[n.index()].membership == Membership::Waiting(mutex))
            });

        tags_ok && members_ok
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
