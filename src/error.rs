//! # Error Types
//!
//! Two enums model the two failure layers of the kernel:
//!
//! * [`KernelError`]: start-up and API-contract failures. Configuration and
//!   resource-exhaustion errors are fatal: the system refuses to start.
//! * [`QueueError`]: expected, transient outcomes of a queue operation that
//!   the calling task handles locally (ignore or retry).

use thiserror::Error;

use crate::task::{TaskId, TaskState};

/// Coarse classification of a [`KernelError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// An invalid parameter was supplied at construction time.
    Configuration,
    /// A fixed-size kernel table or object could not be created.
    ResourceExhaustion,
    /// A kernel call was made in a state that does not allow it.
    Usage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum KernelError {
    #[error("invalid configuration: {field} {reason}")]
    InvalidConfig {
        field: &'static str,
        reason: &'static str,
    },

    #[error("task '{name}' has priority {priority} (valid: 1..={max})")]
    InvalidPriority {
        name: &'static str,
        priority: u8,
        max: u8,
    },

    #[error("task name must not be empty")]
    EmptyTaskName,

    /// Tasks may only be registered before the scheduler starts.
    #[error("scheduler already started")]
    AlreadyStarted,

    #[error("no tasks registered before start")]
    NoTasks,

    #[error("task table is full ({capacity} slots including idle)")]
    TaskTableFull { capacity: usize },

    #[error("queue capacity must be at least one slot")]
    ZeroCapacityQueue,

    #[error("scheduler has not been started")]
    NotStarted,

    #[error("task {id} does not exist")]
    UnknownTask { id: TaskId },

    #[error("task {id} is {state:?}, which does not allow this operation")]
    InvalidState { id: TaskId, state: TaskState },

    #[error("the idle task must never block")]
    IdleCannotBlock,
}

impl KernelError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            KernelError::InvalidConfig { .. }
            | KernelError::InvalidPriority { .. }
            | KernelError::EmptyTaskName
            | KernelError::AlreadyStarted
            | KernelError::NoTasks => ErrorKind::Configuration,
            KernelError::TaskTableFull { .. } | KernelError::ZeroCapacityQueue => {
                ErrorKind::ResourceExhaustion
            }
            KernelError::NotStarted
            | KernelError::UnknownTask { .. }
            | KernelError::InvalidState { .. }
            | KernelError::IdleCannotBlock => ErrorKind::Usage,
        }
    }

    /// Whether the error must stop the system from starting.
    pub fn is_fatal(&self) -> bool {
        self.kind() != ErrorKind::Usage
    }
}

/// Failure of a single queue operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The queue was full (send) or empty (receive) and the caller asked not
    /// to wait, or cannot wait from its current context.
    #[error("queue operation would block")]
    WouldBlock,

    /// The wait ended without a hand-off: its deadline passed or it was
    /// aborted.
    #[error("timed out waiting on queue")]
    TimedOut,
}
