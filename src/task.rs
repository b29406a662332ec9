//! # Task Control Block
//!
//! Defines the task model for Cotask. A task is a small state machine: an
//! ordered table of *slices* (plain functions) plus the index of the slice
//! to run next. The scheduler runs one slice per dispatch, and the slice's
//! return value says which slice comes next and how the task is re-queued.
//!
//! ## Dispatch protocol
//!
//! ```text
//!              ┌──────────── SchedImmed ────────────┐
//!              ▼                                    │
//!   ┌─────────────────┐   dispatch   ┌───────────────────────┐
//!   │ Immediate queue │ ───────────► │ slices[slice_idx](ctx) │
//!   └─────────────────┘              └───────────────────────┘
//!              ▲                       │      │          │
//!              │ deadline passed       │      │ Wait     │ End
//!   ┌─────────────────┐   Resched      │      ▼          ▼
//!   │   Timer heap    │ ◄──────────────┘   parked     idle until
//!   └─────────────────┘                 (mutex wakes)  re-armed
//! ```
//!
//! A task that is disabled when popped is not run at all and is dropped
//! as if it had returned `End`.
//!
//! ## Queue membership
//!
//! A task is resident in at most one place at a time, recorded in its
//! [`Membership`] tag: the free pool, the immediate queue, the timer heap,
//! or exactly one mutex wait list. The scheduler checks the tag before
//! every queue operation.

use core::any::Any;

use crate::kernel::TaskContext;
use crate::mutex::MutexId;

/// Scheduler time, in ticks since start.
pub type Tick = u64;

/// Opaque per-task data. Slices recover the concrete type with
/// [`TaskContext::data`].
pub type TaskData = &'static (dyn Any + Send + Sync);

/// One step of a task's state machine.
pub type Slice = fn(&mut TaskContext<'_>) -> SliceResult;

/// Handle to a task slot in the scheduler's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u8);

impl TaskId {
    pub(crate) const fn new(index: usize) -> Self {
        Self(index as u8)
    }

    /// Arena index of this task.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

// ---------------------------------------------------------------------------
// Slice results
// ---------------------------------------------------------------------------

/// How the scheduler re-queues a task after one of its slices returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// Not re-queued. The task stays idle until something re-arms it.
    End,
    /// Not re-queued. Another component (usually a mutex unlock) is
    /// expected to schedule it again.
    Wait,
    /// Arm the timer: run again once `period` ticks have elapsed.
    Resched,
    /// Append to the immediate queue and run on the next dispatch.
    SchedImmed,
}

impl Directive {
    /// True for directives that put the task back in a queue.
    #[inline]
    pub const fn requeues(self) -> bool {
        matches!(self, Self::Resched | Self::SchedImmed)
    }
}

/// Value returned by every slice: the next slice index and the directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceResult {
    pub next: u8,
    pub directive: Directive,
}

impl SliceResult {
    pub const fn new(next: u8, directive: Directive) -> Self {
        Self { next, directive }
    }

    pub const fn end(next: u8) -> Self {
        Self::new(next, Directive::End)
    }

    pub const fn wait(next: u8) -> Self {
        Self::new(next, Directive::Wait)
    }

    pub const fn resched(next: u8) -> Self {
        Self::new(next, Directive::Resched)
    }

    pub const fn immediate(next: u8) -> Self {
        Self::new(next, Directive::SchedImmed)
    }
}

// ---------------------------------------------------------------------------
// Queue membership
// ---------------------------------------------------------------------------

/// Where a task slot currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    /// Slot not handed out and not in the free pool (an unprimed pool slot
    /// or an undeclared static slot).
    Unclaimed,
    /// In the free pool, available to `new_task()`.
    Free,
    /// Live but not queued anywhere (running, ended, or never scheduled).
    Idle,
    /// In the immediate-dispatch queue.
    Immediate,
    /// In the timer heap.
    Timed,
    /// Parked in a mutex wait list.
    Waiting(MutexId),
}

impl Membership {
    /// True if the slot holds a live task.
    #[inline]
    pub const fn is_live(self) -> bool {
        !matches!(self, Self::Unclaimed | Self::Free)
    }
}

/// Origin of a task slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    /// Handed out by `new_task()`, returned by `delete_task()`.
    Pooled,
    /// Claimed once by `declare_task()`, never returned.
    Static,
}

// ---------------------------------------------------------------------------
// Task Control Block
// ---------------------------------------------------------------------------

/// Task Control Block (TCB): scheduling state of one task.
///
/// TCBs are stored in a fixed array inside the scheduler; the task's
/// identity is its slot index ([`TaskId`]). The list link lives in the
/// scheduler's link arena at the same index.
#[derive(Clone, Copy)]
pub struct TaskControlBlock {
    /// Disabled tasks are dropped instead of run when dispatched.
    pub(crate) enabled: bool,
    /// Ticks between timer re-arms.
    pub(crate) period: Tick,
    /// Absolute tick after which the timer releases this task.
    pub(crate) deadline: Tick,
    /// Index of the next slice to execute.
    pub(crate) slice_idx: u8,
    pub(crate) slices: &'static [Slice],
    pub(crate) data: Option<TaskData>,
    pub(crate) membership: Membership,
    pub(crate) kind: SlotKind,
}

impl TaskControlBlock {
    /// Unclaimed slot. Used to initialize the static array.
    pub const EMPTY: Self = Self {
        enabled: false,
        period: 0,
        deadline: 0,
        slice_idx: 0,
        slices: &[],
        data: None,
        membership: Membership::Unclaimed,
        kind: SlotKind::Pooled,
    };

    /// Bind a slice table and data, mark enabled, rewind to slice 0.
    /// Period and queue membership are left alone.
    pub fn init(&mut self, slices: &'static [Slice], data: Option<TaskData>) {
        self.slices = slices;
        self.data = data;
        self.enabled = true;
        self.slice_idx = 0;
    }

    /// Wipe everything a deleted task could leak into a later owner.
    pub fn clear(&mut self) {
        self.enabled = false;
        self.period = 0;
        self.deadline = 0;
        self.slice_idx = 0;
        self.slices = &[];
        self.data = None;
    }

    /// The slice the next dispatch will run, if the index is in range.
    #[inline]
    pub fn current_slice(&self) -> Option<Slice> {
        self.slices.get(self.slice_idx as usize).copied()
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[inline]
    pub fn period(&self) -> Tick {
        self.period
    }

    #[inline]
    pub fn deadline(&self) -> Tick {
        self.deadline
    }

    #[inline]
    pub fn slice_idx(&self) -> u8 {
        self.slice_idx
    }

    #[inline]
    pub fn slice_count(&self) -> usize {
        self.slices.len()
    }

    #[inline]
    pub fn membership(&self) -> Membership {
        self.membership
    }

    #[inline]
    pub fn kind(&self) -> SlotKind {
        self.kind
    }

    #[inline]
    pub fn data(&self) -> Option<TaskData> {
        self.data
    }
}

impl core::fmt::Debug for TaskControlBlock {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TaskControlBlock")
            .field("enabled", &self.enabled)
            .field("period", &self.period)
            .field("deadline", &self.deadline)
            .field("slice_idx", &self.slice_idx)
            .field("slices", &self.slices.len())
            .field("membership", &self.membership)
            .field("kind", &self.kind)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn first(_: &mut TaskContext<'_>) -> SliceResult {
        SliceResult::immediate(1)
    }

    fn second(_: &mut TaskContext<'_>) -> SliceResult {
        SliceResult::end(0)
    }

    static SLICES: [Slice; 2] = [first, second];
    static DATA: u32 = 7;

    #[test]
    fn test_tcb_initialization() {
        let mut tcb = TaskControlBlock::EMPTY;
        assert!(!tcb.is_enabled());
        assert!(!tcb.membership().is_live());
        assert!(tcb.current_slice().is_none());

        tcb.slice_idx = 1;
        tcb.init(&SLICES, Some(&DATA));
        assert!(tcb.is_enabled());
        assert_eq!(tcb.slice_idx(), 0);
        assert_eq!(tcb.slice_count(), 2);
        assert!(tcb.current_slice().is_some());
        assert_eq!(tcb.data().and_then(|d| d.downcast_ref::<u32>()), Some(&7));
    }

    #[test]
    fn test_clear_wipes_fields() {
        let mut tcb = TaskControlBlock::EMPTY;
        tcb.init(&SLICES, Some(&DATA));
        tcb.period = 100;
        tcb.deadline = 250;
        tcb.clear();
        assert!(!tcb.is_enabled());
        assert_eq!(tcb.period(), 0);
        assert_eq!(tcb.deadline(), 0);
        assert_eq!(tcb.slice_count(), 0);
        assert!(tcb.data().is_none());
    }

    #[test]
    fn test_out_of_range_slice() {
        let mut tcb = TaskControlBlock::EMPTY;
        tcb.init(&SLICES, None);
        tcb.slice_idx = 2;
        assert!(tcb.current_slice().is_none());
    }

    #[test]
    fn test_directive_requeues() {
        assert!(Directive::Resched.requeues());
        assert!(Directive::SchedImmed.requeues());
        assert!(!Directive::End.requeues());
        assert!(!Directive::Wait.requeues());
    }

    #[test]
    fn test_membership_liveness() {
        assert!(!Membership::Unclaimed.is_live());
        assert!(!Membership::Free.is_live());
        assert!(Membership::Idle.is_live());
        assert!(Membership::Timed.is_live());
        assert!(Membership::Waiting(MutexId::new(0)).is_live());
    }
}
