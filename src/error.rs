//! # Scheduler Errors
//!
//! Every fallible kernel operation reports through [`SchedError`]. None of
//! these terminate the system: capacity exhaustion and rejected requests
//! are returned to the caller, who decides whether to retry, drop, or
//! surface the condition.

use core::fmt;

/// Result alias used by the kernel API.
pub type SchedResult<T> = Result<T, SchedError>;

/// Kernel error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedError {
    /// Every pooled task slot is in use
    PoolExhausted,
    /// The timer queue cannot take another entry
    TimerQueueFull,
    /// The task is already resident in a queue or wait list
    AlreadyQueued,
    /// The handle does not name a live task
    InvalidTask,
    /// Statically declared tasks cannot be returned to the pool
    StaticTask,
    /// The mutex is owned by another task
    NotOwner,
}

impl SchedError {
    /// Get error code
    #[must_use]
    pub const fn code(&self) -> u16 {
        match self {
            Self::PoolExhausted => 0x0101,
            Self::TimerQueueFull => 0x0102,
            Self::AlreadyQueued => 0x0201,
            Self::InvalidTask => 0x0202,
            Self::StaticTask => 0x0203,
            Self::NotOwner => 0x0301,
        }
    }

    /// True for conditions caused by a fixed-size resource running out
    #[must_use]
    pub const fn is_capacity(&self) -> bool {
        matches!(self, Self::PoolExhausted | Self::TimerQueueFull)
    }
}

impl fmt::Display for SchedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::PoolExhausted => "task pool exhausted",
            Self::TimerQueueFull => "timer queue full",
            Self::AlreadyQueued => "task already queued",
            Self::InvalidTask => "invalid task handle",
            Self::StaticTask => "static task cannot be deleted",
            Self::NotOwner => "mutex held by another task",
        };
        write!(f, "{} (0x{:04x})", msg, self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct() {
        let all = [
            SchedError::PoolExhausted,
            SchedError::TimerQueueFull,
            SchedError::AlreadyQueued,
            SchedError::InvalidTask,
            SchedError::StaticTask,
            SchedError::NotOwner,
        ];
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(a.code(), b.code());
            }
        }
    }

    #[test]
    fn test_capacity_classification() {
        assert!(SchedError::PoolExhausted.is_capacity());
        assert!(SchedError::TimerQueueFull.is_capacity());
        assert!(!SchedError::NotOwner.is_capacity());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            SchedError::PoolExhausted.to_string(),
            "task pool exhausted (0x0101)"
        );
    }
}
