//! # Task Mutex
//!
//! Per-resource lock with a single owner and a FIFO wait list of blocked
//! tasks. Ownership bookkeeping lives here; the wait list is a list head
//! in the scheduler's link arena, so parking and waking go through
//! [`Scheduler`](crate::scheduler::Scheduler).
//!
//! ## Protocol
//!
//! ```text
//!   slice:  if ctx.lock(m) { ...critical work...; ctx.unlock(m) }
//!           else { return SliceResult::wait(same_slice) }
//! ```
//!
//! A failed `lock` appends the caller to the wait list; the slice must
//! then return `Wait`. `unlock` moves *every* waiter to the immediate
//! queue. They race to re-lock on their next dispatch, one wins and the
//! rest park again.
//!
//! Locking is reentrant for the owner. Releasing an unowned mutex is
//! tolerated.

use crate::config::MAX_MUTEXES;
use crate::error::{SchedError, SchedResult};
use crate::list::NodeId;
use crate::task::TaskId;

/// Handle to one of the scheduler's [`MAX_MUTEXES`] mutex slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MutexId(u8);

impl MutexId {
    /// Mutex slot `index`. Panics at compile time when used in a const
    /// with an out-of-range index.
    pub const fn new(index: usize) -> Self {
        assert!(index < MAX_MUTEXES, "mutex index out of range");
        Self(index as u8)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Ownership state of one mutex plus the head of its wait list.
#[derive(Debug, Clone, Copy)]
pub struct TaskMutex {
    owner: Option<TaskId>,
    waiting: NodeId,
}

impl TaskMutex {
    /// Unowned mutex whose wait list is headed by `waiting`.
    pub const fn new(waiting: NodeId) -> Self {
        Self {
            owner: None,
            waiting,
        }
    }

    /// Forget the owner.
    pub fn reset(&mut self) {
        self.owner = None;
    }

    /// Take ownership if free or already held by `task`.
    pub fn try_lock(&mut self, task: TaskId) -> bool {
        match self.owner {
            None => {
                self.owner = Some(task);
                true
            }
            Some(owner) => owner == task,
        }
    }

    /// Give up ownership. Fails only when another task holds the lock.
    pub fn release(&mut self, task: TaskId) -> SchedResult<()> {
        match self.owner {
            Some(owner) if owner != task => Err(SchedError::NotOwner),
            _ => {
                self.owner = None;
                Ok(())
            }
        }
    }

    #[inline]
    pub fn have_lock(&self, task: TaskId) -> bool {
        self.owner == Some(task)
    }

    #[inline]
    pub fn owner(&self) -> Option<TaskId> {
        self.owner
    }

    /// Head node of the wait list.
    #[inline]
    pub fn wait_head(&self) -> NodeId {
        self.waiting
    }
}
