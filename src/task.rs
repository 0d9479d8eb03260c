//! # Task Control Block
//!
//! Defines the task model for blinkos. Each task has a fixed priority, an
//! inline stack owned by the scheduler, and the bookkeeping the scheduler
//! needs to block it on a delay or a queue and wake it again.

use crate::config::{DEFAULT_TIME_SLICE, IDLE_PRIORITY, MAX_PRIORITY, STACK_SIZE};
use crate::error::KernelError;
use crate::time::Ticks;

/// Index of a task in the scheduler's table.
pub type TaskId = usize;

/// Identifies a queue in wait targets.
pub type QueueId = u8;

/// Task entry point. Tasks never return.
pub type TaskEntry = extern "C" fn() -> !;

// ---------------------------------------------------------------------------
// Task state machine
// ---------------------------------------------------------------------------

/// Execution state of a task.
///
/// ```text
///   ┌──────────┐     schedule()      ┌─────────┐
///   │  Ready   │ ──────────────────► │ Running │
///   └──────────┘                     └─────────┘
///      ▲  ▲       preempt / yield        │  │
///      │  └──────────────────────────────┘  │ block_current()
///      │                                    ▼
///      │      wake() / unblock()       ┌──────────┐
///      └────────────────────────────── │ Blocked  │
///                                      └──────────┘
/// ```
///
/// `Suspended` is entered and left only through explicit
/// `suspend()` / `resume()` calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Ready,
    Running,
    Blocked,
    Suspended,
}

/// What a blocked task is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitTarget {
    /// A timed delay; only the deadline can end it.
    Delay,
    /// Space in a full queue.
    QueueSend(QueueId),
    /// An item from an empty queue.
    QueueReceive(QueueId),
}

/// Why a blocked task was made Ready again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeReason {
    /// The awaited event happened (queue hand-off).
    Signalled,
    /// The wake deadline was reached.
    TimedOut,
    /// The wait was cut short by `unblock()` or `suspend()`.
    Aborted,
}

// ---------------------------------------------------------------------------
// Task configuration (immutable after creation)
// ---------------------------------------------------------------------------

/// Static configuration for a task, set at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskConfig {
    /// Debug name, shown in logs only.
    pub name: &'static str,

    /// Fixed priority (higher = more urgent). Application tasks use
    /// `1..=MAX_PRIORITY`; 0 belongs to the idle task.
    pub priority: u8,

    /// Time slice in ticks for round-robin among equal priorities.
    /// If 0, uses `DEFAULT_TIME_SLICE`.
    pub time_slice: u32,
}

impl TaskConfig {
    pub const fn new(name: &'static str, priority: u8) -> Self {
        Self {
            name,
            priority,
            time_slice: 0,
        }
    }

    /// Returns the effective time slice, falling back to the system default.
    #[inline]
    pub const fn effective_time_slice(&self) -> u32 {
        if self.time_slice > 0 {
            self.time_slice
        } else {
            DEFAULT_TIME_SLICE
        }
    }

    /// Check the parameters of an application task.
    pub fn validate(&self) -> Result<(), KernelError> {
        if self.name.is_empty() {
            return Err(KernelError::EmptyTaskName);
        }
        if self.priority == IDLE_PRIORITY || self.priority > MAX_PRIORITY {
            return Err(KernelError::InvalidPriority {
                name: self.name,
                priority: self.priority,
                max: MAX_PRIORITY,
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Task Control Block
// ---------------------------------------------------------------------------

/// Per-task stack memory. Aligned to 8 bytes as required by ARM AAPCS.
#[repr(C, align(8))]
pub struct Stack(pub [u8; STACK_SIZE]);

/// Task Control Block (TCB). TCBs are stored in a static array in the
/// scheduler; nothing is heap allocated.
///
/// Each TCB includes an inline stack. The `stack_pointer` field points into
/// this stack and is updated on every context switch.
pub struct TaskControlBlock {
    /// Index in the scheduler's task array.
    pub id: TaskId,

    pub state: TaskState,

    pub config: TaskConfig,

    /// Saved process stack pointer. Points into `self.stack`.
    pub stack_pointer: *mut u32,

    pub stack: Stack,

    /// Remaining ticks in the current time slice.
    pub ticks_remaining: u32,

    /// Total ticks this task has been in the Running state.
    pub run_ticks: u32,

    /// What the task is blocked on, while Blocked.
    pub wait: Option<WaitTarget>,

    /// Absolute tick at which a timed wait ends.
    pub wake_at: Option<Ticks>,

    /// Set when the task leaves Blocked; consumed by the task on resumption.
    pub wake_reason: Option<WakeReason>,

    /// Position in the round-robin order among equal priorities. Lower runs
    /// first.
    pub ready_seq: u64,

    /// Order in which the task entered its current wait.
    pub block_seq: u64,

    /// Whether this slot holds a task.
    pub active: bool,
}

// Safety: `stack_pointer` always points into the task's own stack array, and
// TCBs are only touched inside critical sections.
unsafe impl Send for TaskControlBlock {}
unsafe impl Sync for TaskControlBlock {}

impl TaskControlBlock {
    /// An unallocated slot. Used to initialize the static array.
    pub const EMPTY: Self = Self {
        id: 0,
        state: TaskState::Suspended,
        config: TaskConfig::new("", IDLE_PRIORITY),
        stack_pointer: core::ptr::null_mut(),
        stack: Stack([0u8; STACK_SIZE]),
        ticks_remaining: 0,
        run_ticks: 0,
        wait: None,
        wake_at: None,
        wake_reason: None,
        ready_seq: 0,
        block_seq: 0,
        active: false,
    };

    /// Initialize a slot for a new task in the Ready state. The stack frame is
    /// prepared separately by the port layer.
    pub fn init(&mut self, id: TaskId, config: TaskConfig, ready_seq: u64) {
        self.id = id;
        self.state = TaskState::Ready;
        self.config = config;
        self.ticks_remaining = config.effective_time_slice();
        self.run_ticks = 0;
        self.wait = None;
        self.wake_at = None;
        self.wake_reason = None;
        self.ready_seq = ready_seq;
        self.block_seq = 0;
        self.active = true;
    }

    #[inline]
    pub fn priority(&self) -> u8 {
        self.config.priority
    }

    #[inline]
    pub fn is_runnable(&self) -> bool {
        self.active && self.state == TaskState::Ready
    }

    /// Enter a wait. The caller requests the reschedule.
    pub fn block(&mut self, target: WaitTarget, wake_at: Option<Ticks>, block_seq: u64) {
        self.state = TaskState::Blocked;
        self.wait = Some(target);
        self.wake_at = wake_at;
        self.wake_reason = None;
        self.block_seq = block_seq;
    }

    /// Leave a wait and join the back of the ready order.
    pub fn wake(&mut self, reason: WakeReason, ready_seq: u64) {
        self.state = TaskState::Ready;
        self.wait = None;
        self.wake_at = None;
        self.wake_reason = Some(reason);
        self.ready_seq = ready_seq;
    }

    /// Whether the task is currently blocked on `target`.
    #[inline]
    pub fn is_waiting_on(&self, target: WaitTarget) -> bool {
        self.active && self.state == TaskState::Blocked && self.wait == Some(target)
    }

    /// Whether a timed wait has reached its deadline at `now`.
    pub fn wait_expired(&self, now: Ticks) -> bool {
        self.active
            && self.state == TaskState::Blocked
            && self
                .wake_at
                .is_some_and(|deadline| crate::time::has_elapsed(now, deadline))
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
