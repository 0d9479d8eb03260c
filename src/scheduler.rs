//! # Scheduler
//!
//! Core scheduling logic for blinkos: fixed-priority preemptive scheduling
//! with round-robin among equal priorities.
//!
//! ## Scheduling Algorithm
//!
//! - The highest-priority Ready task runs. Among equal priorities the task
//!   with the lowest ready sequence number runs; a task is given a fresh
//!   (highest) number whenever it becomes Ready, yields, or uses up its time
//!   slice, which yields round-robin order.
//! - A preempted task keeps its number, so it resumes ahead of its
//!   equal-priority peers.
//! - The idle task (priority 0) is always Ready and runs when nothing else
//!   can.
//!
//! At each SysTick interrupt:
//! 1. Increment the tick counter and run the tick hook
//! 2. Wake expired timed waits, ordered by deadline, then priority, then
//!    the order in which the tasks blocked
//! 3. Decrement the running task's time slice; on expiry rotate it behind any
//!    Ready peer of equal priority
//! 4. Request a reschedule if a higher-priority task became Ready

use log::{debug, info, trace};

use crate::arch;
use crate::config::{IDLE_PRIORITY, MAX_TASKS};
use crate::error::KernelError;
use crate::task::{
    TaskConfig, TaskControlBlock, TaskEntry, TaskId, TaskState, WaitTarget, WakeReason,
};
use crate::time::{self, Ticks};

/// Called from tick context on every tick. Must not block.
pub type TickHook = fn(Ticks);

/// The central scheduler state. Stored as a `static` by the kernel on the
/// target and by value in the host simulator.
pub struct Scheduler {
    /// Fixed-size array of TCBs. The idle task takes the slot after the last
    /// application task.
    tasks: [TaskControlBlock; MAX_TASKS],

    /// Index of the currently running task.
    current_task: TaskId,

    /// Number of allocated tasks (including idle once started).
    task_count: usize,

    idle_task: TaskId,

    /// Monotonic, wrapping tick counter.
    tick_count: Ticks,

    started: bool,

    /// Set whenever a different task may need to run.
    needs_reschedule: bool,

    next_ready_seq: u64,
    next_block_seq: u64,

    context_switches: u32,

    tick_hook: Option<TickHook>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub const fn new() -> Self {
        Self {
            tasks: [TaskControlBlock::EMPTY; MAX_TASKS],
            current_task: 0,
            task_count: 0,
            idle_task: 0,
            tick_count: 0,
            started: false,
            needs_reschedule: false,
            next_ready_seq: 0,
            next_block_seq: 0,
            context_switches: 0,
            tick_hook: None,
        }
    }

    /// Register a new task. Only allowed before [`start`](Self::start); one
    /// slot is always kept for the idle task.
    pub fn create_task(
        &mut self,
        entry: TaskEntry,
        config: TaskConfig,
    ) -> Result<TaskId, KernelError> {
        if self.started {
            return Err(KernelError::AlreadyStarted);
        }
        config.validate()?;
        if self.task_count >= MAX_TASKS - 1 {
            return Err(KernelError::TaskTableFull {
                capacity: MAX_TASKS,
            });
        }

        let id = self.allocate(entry, config);
        debug!(
            "created task '{}' (id {}, priority {})",
            config.name, id, config.priority
        );
        Ok(id)
    }

    fn allocate(&mut self, entry: TaskEntry, config: TaskConfig) -> TaskId {
        let id = self.task_count;
        let seq = self.take_ready_seq();
        let tcb = &mut self.tasks[id];
        tcb.init(id, config, seq);
        tcb.stack_pointer = arch::init_stack_frame(&mut tcb.stack, entry);
        self.task_count += 1;
        id
    }

    /// Create the idle task, freeze the task table and select the first
    /// task. Returns the task to launch.
    pub fn start(&mut self, idle_entry: TaskEntry) -> Result<TaskId, KernelError> {
        if self.started {
            return Err(KernelError::AlreadyStarted);
        }
        if self.task_count == 0 {
            return Err(KernelError::NoTasks);
        }

        let idle = self.allocate(idle_entry, TaskConfig::new("idle", IDLE_PRIORITY));
        self.idle_task = idle;
        self.current_task = idle;
        self.started = true;

        let first = self.schedule();
        info!(
            "scheduler started with {} tasks, first: '{}'",
            self.task_count,
            self.tasks[first].config.name
        );
        Ok(first)
    }

    /// Select the next task to run and mark it Running.
    ///
    /// If the current task is still Running it competes with its original
    /// ready sequence number and keeps the CPU unless a higher-priority task
    /// is Ready.
    pub fn schedule(&mut self) -> TaskId {
        if !self.started {
            return self.current_task;
        }

        let prev = self.current_task;
        if self.tasks[prev].state == TaskState::Running {
            self.tasks[prev].state = TaskState::Ready;
        }

        let next = self.highest_ready().unwrap_or(self.idle_task);
        if next != prev {
            self.context_switches = self.context_switches.wrapping_add(1);
            self.tasks[next].ticks_remaining = self.tasks[next].config.effective_time_slice();
            trace!(
                "switch '{}' -> '{}' at tick {}",
                self.tasks[prev].config.name,
                self.tasks[next].config.name,
                self.tick_count
            );
        }

        self.tasks[next].state = TaskState::Running;
        self.current_task = next;
        self.needs_reschedule = false;
        next
    }

    fn highest_ready(&self) -> Option<TaskId> {
        self.tasks[..self.task_count]
            .iter()
            .filter(|t| t.is_runnable())
            .min_by_key(|t| (core::cmp::Reverse(t.priority()), t.ready_seq))
            .map(|t| t.id)
    }

    /// Called from the SysTick handler every tick. Returns whether a context
    /// switch should be requested.
    pub fn tick(&mut self) -> bool {
        if !self.started {
            return false;
        }

        self.tick_count = self.tick_count.wrapping_add(1);
        if let Some(hook) = self.tick_hook {
            hook(self.tick_count);
        }

        self.wake_expired();

        // --- Time slice accounting for the running task ---
        let current = self.current_task;
        if self.tasks[current].state == TaskState::Running {
            let tcb = &mut self.tasks[current];
            tcb.run_ticks = tcb.run_ticks.wrapping_add(1);
            tcb.ticks_remaining = tcb.ticks_remaining.saturating_sub(1);

            if tcb.ticks_remaining == 0 {
                tcb.ticks_remaining = tcb.config.effective_time_slice();
                let priority = tcb.priority();
                if self.has_ready_at_or_above(priority) {
                    self.rotate_current();
                }
            }
        }

        self.needs_reschedule
    }

    /// Wake every timed wait whose deadline has passed, earliest deadline
    /// first, then higher priority, then earlier block order.
    fn wake_expired(&mut self) {
        let now = self.tick_count;
        loop {
            let next = self.tasks[..self.task_count]
                .iter()
                .filter(|t| t.wait_expired(now))
                .min_by_key(|t| {
                    let deadline = t.wake_at.unwrap_or(now);
                    (
                        time::remaining(now, deadline),
                        core::cmp::Reverse(t.priority()),
                        t.block_seq,
                    )
                })
                .map(|t| t.id);

            match next {
                Some(id) => self.wake(id, WakeReason::TimedOut),
                None => break,
            }
        }
    }

    fn has_ready_at_or_above(&self, priority: u8) -> bool {
        self.tasks[..self.task_count]
            .iter()
            .any(|t| t.is_runnable() && t.priority() >= priority)
    }

    /// Move the running task to the back of its priority's ready order.
    fn rotate_current(&mut self) {
        let seq = self.take_ready_seq();
        let tcb = &mut self.tasks[self.current_task];
        tcb.state = TaskState::Ready;
        tcb.ready_seq = seq;
        self.needs_reschedule = true;
    }

    /// Voluntarily give up the CPU to any Ready task of equal or higher
    /// priority.
    pub fn yield_current(&mut self) {
        let current = self.current_task;
        if self.started && self.tasks[current].state == TaskState::Running {
            self.rotate_current();
        }
    }

    /// Block the running task on `target` until it is woken or `deadline`
    /// passes. The caller must request a context switch afterwards.
    pub fn block_current(
        &mut self,
        target: WaitTarget,
        deadline: Option<Ticks>,
    ) -> Result<TaskId, KernelError> {
        if !self.started {
            return Err(KernelError::NotStarted);
        }
        let current = self.current_task;
        if current == self.idle_task {
            return Err(KernelError::IdleCannotBlock);
        }
        let state = self.tasks[current].state;
        if state != TaskState::Running {
            return Err(KernelError::InvalidState { id: current, state });
        }

        let seq = self.next_block_seq;
        self.next_block_seq += 1;
        self.tasks[current].block(target, deadline, seq);
        self.needs_reschedule = true;
        debug!(
            "'{}' blocked on {:?} until {:?}",
            self.tasks[current].config.name, target, deadline
        );
        Ok(current)
    }

    /// Make a blocked task Ready. Does nothing if the task is not Blocked.
    pub fn wake(&mut self, id: TaskId, reason: WakeReason) {
        if id >= self.task_count || self.tasks[id].state != TaskState::Blocked {
            return;
        }
        let seq = self.take_ready_seq();
        self.tasks[id].wake(reason, seq);
        debug!(
            "'{}' woken ({:?}) at tick {}",
            self.tasks[id].config.name, reason, self.tick_count
        );
        self.note_ready(id);
    }

    /// Abort the wait of a blocked task. It resumes with
    /// [`WakeReason::Aborted`].
    pub fn unblock(&mut self, id: TaskId) -> Result<(), KernelError> {
        let state = self.state(id)?;
        if state != TaskState::Blocked {
            return Err(KernelError::InvalidState { id, state });
        }
        self.wake(id, WakeReason::Aborted);
        Ok(())
    }

    /// Take a task out of scheduling. A pending wait is abandoned and reported
    /// as aborted once the task is resumed.
    pub fn suspend(&mut self, id: TaskId) -> Result<(), KernelError> {
        let state = self.state(id)?;
        if id == self.idle_task {
            return Err(KernelError::InvalidState { id, state });
        }
        match state {
            TaskState::Suspended => return Ok(()),
            TaskState::Blocked => {
                let tcb = &mut self.tasks[id];
                tcb.wait = None;
                tcb.wake_at = None;
                tcb.wake_reason = Some(WakeReason::Aborted);
            }
            TaskState::Running => self.needs_reschedule = true,
            TaskState::Ready => {}
        }
        self.tasks[id].state = TaskState::Suspended;
        debug!("'{}' suspended", self.tasks[id].config.name);
        Ok(())
    }

    /// Return a suspended task to the back of the ready order.
    pub fn resume(&mut self, id: TaskId) -> Result<(), KernelError> {
        let state = self.state(id)?;
        if state != TaskState::Suspended {
            return Err(KernelError::InvalidState { id, state });
        }
        let seq = self.take_ready_seq();
        let tcb = &mut self.tasks[id];
        tcb.state = TaskState::Ready;
        tcb.ready_seq = seq;
        self.note_ready(id);
        Ok(())
    }

    /// Request preemption if `id` outranks the running task.
    fn note_ready(&mut self, id: TaskId) {
        let current = &self.tasks[self.current_task];
        if current.state != TaskState::Running || self.tasks[id].priority() > current.priority() {
            self.needs_reschedule = true;
        }
    }

    fn take_ready_seq(&mut self) -> u64 {
        let seq = self.next_ready_seq;
        self.next_ready_seq += 1;
        seq
    }

    /// Consume the reason the task last left the Blocked state.
    pub fn take_wake_reason(&mut self, id: TaskId) -> Option<WakeReason> {
        self.tasks.get_mut(id).and_then(|t| t.wake_reason.take())
    }

    pub fn is_waiting_on(&self, id: TaskId, target: WaitTarget) -> bool {
        self.task(id).is_some_and(|t| t.is_waiting_on(target))
    }

    pub fn set_tick_hook(&mut self, hook: TickHook) {
        self.tick_hook = Some(hook);
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    #[inline]
    pub fn now(&self) -> Ticks {
        self.tick_count
    }

    #[inline]
    pub fn current(&self) -> TaskId {
        self.current_task
    }

    #[inline]
    pub fn idle_task(&self) -> TaskId {
        self.idle_task
    }

    #[inline]
    pub fn is_started(&self) -> bool {
        self.started
    }

    #[inline]
    pub fn needs_reschedule(&self) -> bool {
        self.needs_reschedule
    }

    pub fn task_count(&self) -> usize {
        self.task_count
    }

    pub fn context_switches(&self) -> u32 {
        self.context_switches
    }

    pub fn task(&self, id: TaskId) -> Option<&TaskControlBlock> {
        self.tasks[..self.task_count].get(id)
    }

    pub fn state(&self, id: TaskId) -> Result<TaskState, KernelError> {
        self.task(id)
            .map(|t| t.state)
            .ok_or(KernelError::UnknownTask { id })
    }

    /// Stack pointer to restore when switching to the current task.
    pub fn current_stack_pointer(&self) -> *mut u32 {
        self.tasks[self.current_task].stack_pointer
    }

    /// Record where the outgoing task's context was saved.
    pub fn save_stack_pointer(&mut self, sp: *mut u32) {
        self.tasks[self.current_task].stack_pointer = sp;
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicU32, Ordering};

    extern "C" fn entry() -> ! {
        loop {}
    }

    fn with_tasks(priorities: &[u8]) -> (Scheduler, Vec<TaskId>) {
        let mut sched = Scheduler::new();
        let ids = priorities
            .iter()
            .map(|&p| sched.create_task(entry, TaskConfig::new("t", p)).unwrap())
            .collect();
        (sched, ids)
    }

    #[test]
    fn test_start_requires_tasks() {
        let mut sched = Scheduler::new();
        assert_eq!(sched.start(entry), Err(KernelError::NoTasks));
    }

    #[test]
    fn test_create_after_start_rejected() {
        let (mut sched, _) = with_tasks(&[1]);
        sched.start(entry).unwrap();
        assert_eq!(
            sched.create_task(entry, TaskConfig::new("late", 1)),
            Err(KernelError::AlreadyStarted)
        );
        assert_eq!(sched.start(entry), Err(KernelError::AlreadyStarted));
    }

    #[test]
    fn test_task_table_full() {
        let (mut sched, ids) = with_tasks(&[1, 1, 1]);
        assert_eq!(ids.len(), MAX_TASKS - 1);
        assert_eq!(
            sched.create_task(entry, TaskConfig::new("extra", 1)),
            Err(KernelError::TaskTableFull {
                capacity: MAX_TASKS
            })
        );
    }

    #[test]
    fn test_invalid_priority_rejected() {
        let mut sched = Scheduler::new();
        let err = sched
            .create_task(entry, TaskConfig::new("t", 0))
            .unwrap_err();
        assert!(matches!(err, KernelError::InvalidPriority { .. }));
        assert_eq!(sched.task_count(), 0);
    }

    #[test]
    fn test_highest_priority_runs_first() {
        let (mut sched, ids) = with_tasks(&[1, 3, 2]);
        assert_eq!(sched.start(entry), Ok(ids[1]));
        assert_eq!(sched.state(ids[1]), Ok(TaskState::Running));
        assert_eq!(sched.state(ids[0]), Ok(TaskState::Ready));
    }

    #[test]
    fn test_idle_runs_when_all_blocked() {
        let (mut sched, ids) = with_tasks(&[2]);
        sched.start(entry).unwrap();
        sched.block_current(WaitTarget::Delay, Some(5)).unwrap();
        assert_eq!(sched.schedule(), sched.idle_task());

        for _ in 0..4 {
            sched.tick();
        }
        assert_eq!(sched.state(ids[0]), Ok(TaskState::Blocked));
        assert!(sched.tick());
        assert_eq!(sched.schedule(), ids[0]);
        assert_eq!(sched.take_wake_reason(ids[0]), Some(WakeReason::TimedOut));
    }

    #[test]
    fn test_idle_cannot_block() {
        let (mut sched, _) = with_tasks(&[1]);
        sched.start(entry).unwrap();
        sched.block_current(WaitTarget::Delay, None).unwrap();
        sched.schedule();
        assert_eq!(
            sched.block_current(WaitTarget::Delay, Some(1)),
            Err(KernelError::IdleCannotBlock)
        );
    }

    #[test]
    fn test_round_robin_on_slice_expiry() {
        let (mut sched, ids) = with_tasks(&[2, 2]);
        assert_eq!(sched.start(entry), Ok(ids[0]));

        let slice = TaskConfig::new("t", 2).effective_time_slice();
        for _ in 0..slice - 1 {
            assert!(!sched.tick());
        }
        assert!(sched.tick());
        assert_eq!(sched.schedule(), ids[1]);

        for _ in 0..slice {
            sched.tick();
        }
        assert_eq!(sched.schedule(), ids[0]);
    }

    #[test]
    fn test_slice_expiry_without_peer_keeps_task() {
        let (mut sched, ids) = with_tasks(&[3, 1]);
        sched.start(entry).unwrap();
        for _ in 0..50 {
            assert!(!sched.tick());
        }
        assert_eq!(sched.current(), ids[0]);
    }

    #[test]
    fn test_yield_rotates_equal_priority() {
        let (mut sched, ids) = with_tasks(&[2, 2, 1]);
        sched.start(entry).unwrap();
        sched.yield_current();
        assert!(sched.needs_reschedule());
        assert_eq!(sched.schedule(), ids[1]);
        sched.yield_current();
        assert_eq!(sched.schedule(), ids[0]);
    }

    #[test]
    fn test_yield_alone_keeps_running() {
        let (mut sched, ids) = with_tasks(&[2, 1]);
        sched.start(entry).unwrap();
        sched.yield_current();
        assert_eq!(sched.schedule(), ids[0]);
    }

    #[test]
    fn test_higher_priority_wake_preempts() {
        let (mut sched, ids) = with_tasks(&[3, 1]);
        sched.start(entry).unwrap();
        sched
            .block_current(WaitTarget::QueueReceive(0), None)
            .unwrap();
        assert_eq!(sched.schedule(), ids[1]);

        sched.wake(ids[0], WakeReason::Signalled);
        assert!(sched.needs_reschedule());
        assert_eq!(sched.schedule(), ids[0]);
        assert_eq!(sched.state(ids[1]), Ok(TaskState::Ready));
    }

    #[test]
    fn test_lower_priority_wake_does_not_preempt() {
        let (mut sched, ids) = with_tasks(&[1, 3]);
        sched.start(entry).unwrap();
        assert_eq!(sched.current(), ids[1]);
        // Park the low-priority task by hand: it never ran
        sched.suspend(ids[0]).unwrap();
        sched.resume(ids[0]).unwrap();
        assert!(!sched.needs_reschedule());
    }

    #[test]
    fn test_preempted_task_resumes_before_peers() {
        let (mut sched, ids) = with_tasks(&[2, 2, 3]);
        assert_eq!(sched.start(entry), Ok(ids[2]));
        sched.block_current(WaitTarget::Delay, Some(3)).unwrap();
        assert_eq!(sched.schedule(), ids[0]);

        for _ in 0..3 {
            sched.tick();
        }
        assert_eq!(sched.schedule(), ids[2]);
        sched.block_current(WaitTarget::Delay, Some(100)).unwrap();
        // ids[0] was preempted, not rotated
        assert_eq!(sched.schedule(), ids[0]);
    }

    #[test]
    fn test_wake_order_deadline_then_priority_then_insertion() {
        let (mut sched, ids) = with_tasks(&[2, 2, 3]);
        let (a, b, c) = (ids[0], ids[1], ids[2]);
        sched.start(entry).unwrap();

        // c (prio 3) blocks first, then a, then b; all until tick 10
        assert_eq!(sched.current(), c);
        sched.block_current(WaitTarget::Delay, Some(10)).unwrap();
        assert_eq!(sched.schedule(), a);
        sched.block_current(WaitTarget::Delay, Some(10)).unwrap();
        assert_eq!(sched.schedule(), b);
        sched.block_current(WaitTarget::Delay, Some(10)).unwrap();
        sched.schedule();

        for _ in 0..10 {
            sched.tick();
        }
        let seq = |id| sched.task(id).unwrap().ready_seq;
        assert!(seq(c) < seq(a), "higher priority wakes first");
        assert!(seq(a) < seq(b), "earlier blocker wakes first");

        assert_eq!(sched.schedule(), c);
        sched.block_current(WaitTarget::Delay, None).unwrap();
        assert_eq!(sched.schedule(), a);
    }

    #[test]
    fn test_earlier_deadline_wakes_first() {
        let (mut sched, ids) = with_tasks(&[2, 2]);
        sched.start(entry).unwrap();
        // Both deadlines are already overdue when the next tick runs
        sched.block_current(WaitTarget::Delay, Some(0)).unwrap();
        sched.schedule();
        sched.block_current(WaitTarget::Delay, Some(u32::MAX)).unwrap();
        sched.schedule();

        sched.tick();
        let seq = |id| sched.task(id).unwrap().ready_seq;
        assert!(seq(ids[1]) < seq(ids[0]));
    }

    #[test]
    fn test_unblock_aborts_wait() {
        let (mut sched, ids) = with_tasks(&[2]);
        sched.start(entry).unwrap();
        sched
            .block_current(WaitTarget::QueueReceive(1), None)
            .unwrap();
        sched.schedule();

        sched.unblock(ids[0]).unwrap();
        assert_eq!(sched.state(ids[0]), Ok(TaskState::Ready));
        assert_eq!(sched.take_wake_reason(ids[0]), Some(WakeReason::Aborted));
        assert!(matches!(
            sched.unblock(ids[0]),
            Err(KernelError::InvalidState { .. })
        ));
        assert_eq!(
            sched.unblock(42),
            Err(KernelError::UnknownTask { id: 42 })
        );
    }

    #[test]
    fn test_suspend_blocked_task() {
        let (mut sched, ids) = with_tasks(&[2, 1]);
        sched.start(entry).unwrap();
        sched.block_current(WaitTarget::Delay, Some(3)).unwrap();
        sched.schedule();

        sched.suspend(ids[0]).unwrap();
        for _ in 0..10 {
            sched.tick();
        }
        assert_eq!(sched.state(ids[0]), Ok(TaskState::Suspended));

        sched.resume(ids[0]).unwrap();
        assert!(sched.needs_reschedule());
        assert_eq!(sched.schedule(), ids[0]);
        assert_eq!(sched.take_wake_reason(ids[0]), Some(WakeReason::Aborted));
    }

    #[test]
    fn test_idle_cannot_be_suspended() {
        let (mut sched, _) = with_tasks(&[1]);
        sched.start(entry).unwrap();
        let idle = sched.idle_task();
        assert!(sched.suspend(idle).is_err());
    }

    #[test]
    fn test_tick_hook_runs_every_tick() {
        static TICKS: AtomicU32 = AtomicU32::new(0);
        fn hook(now: Ticks) {
            TICKS.store(now, Ordering::Relaxed);
        }

        let (mut sched, _) = with_tasks(&[1]);
        sched.set_tick_hook(hook);
        sched.start(entry).unwrap();
        for _ in 0..25 {
            sched.tick();
        }
        assert_eq!(TICKS.load(Ordering::Relaxed), 25);
        assert_eq!(sched.now(), 25);
    }

    #[test]
    fn test_tick_before_start_is_ignored() {
        let (mut sched, _) = with_tasks(&[1]);
        assert!(!sched.tick());
        assert_eq!(sched.now(), 0);
    }

    #[test]
    fn test_context_switch_counter() {
        let (mut sched, _) = with_tasks(&[2]);
        sched.start(entry).unwrap();
        assert_eq!(sched.context_switches(), 1);
        sched.block_current(WaitTarget::Delay, Some(1)).unwrap();
        sched.schedule();
        sched.tick();
        sched.schedule();
        assert_eq!(sched.context_switches(), 3);
    }
}
