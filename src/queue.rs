//! # Bounded Queue
//!
//! A fixed-capacity FIFO channel between tasks. Operations never block the
//! caller directly: when an operation has to wait, the calling task is moved
//! to the Blocked state and the operation returns [`Poll::Pending`]. Once the
//! task runs again it calls [`finish_send`](BoundedQueue::finish_send) or
//! [`finish_receive`](BoundedQueue::finish_receive) to learn the outcome.
//!
//! Items are handed over directly when the other side is already waiting:
//! a send to a blocked receiver goes straight into that receiver's slot, and
//! a receive from a full queue moves the earliest blocked sender's item into
//! the freed space. Waiters are served in the order they blocked.

use core::task::Poll;

use heapless::{Deque, Vec};
use log::debug;

use crate::config::MAX_TASKS;
use crate::error::{KernelError, QueueError};
use crate::scheduler::Scheduler;
use crate::task::{QueueId, TaskId, WaitTarget, WakeReason};
use crate::time::Timeout;

pub struct BoundedQueue<T, const N: usize> {
    id: QueueId,
    items: Vec<T, N>,

    /// Tasks blocked on a full queue, oldest first.
    senders: Deque<TaskId, MAX_TASKS>,
    /// Tasks blocked on an empty queue, oldest first.
    receivers: Deque<TaskId, MAX_TASKS>,

    /// Item each blocked sender is trying to enqueue, indexed by task.
    parked: [Option<T>; MAX_TASKS],
    /// Item handed to each blocked receiver, indexed by task.
    delivered: [Option<T>; MAX_TASKS],
}

impl<T, const N: usize> BoundedQueue<T, N> {
    pub fn new(id: QueueId) -> Result<Self, KernelError> {
        if N == 0 {
            return Err(KernelError::ZeroCapacityQueue);
        }
        Ok(Self {
            id,
            items: Vec::new(),
            senders: Deque::new(),
            receivers: Deque::new(),
            parked: core::array::from_fn(|_| None),
            delivered: core::array::from_fn(|_| None),
        })
    }

    /// Enqueue `item`, or hand it to the earliest waiting receiver.
    ///
    /// On a full queue the item is parked and the calling task blocks until a
    /// receiver frees a slot or `timeout` expires.
    pub fn send(
        &mut self,
        sched: &mut Scheduler,
        item: T,
        timeout: Timeout,
    ) -> Result<Poll<()>, QueueError> {
        if let Some(receiver) = Self::pop_waiter(
            &mut self.receivers,
            sched,
            WaitTarget::QueueReceive(self.id),
        ) {
            self.delivered[receiver] = Some(item);
            sched.wake(receiver, WakeReason::Signalled);
            return Ok(Poll::Ready(()));
        }

        let item = match self.items.push(item) {
            Ok(()) => return Ok(Poll::Ready(())),
            Err(item) => item,
        };
        if timeout.is_zero() {
            return Err(QueueError::WouldBlock);
        }

        let deadline = timeout.deadline(sched.now());
        let task = sched
            .block_current(WaitTarget::QueueSend(self.id), deadline)
            .map_err(|_| QueueError::WouldBlock)?;
        Self::remove_waiter(&mut self.senders, task);
        // Cannot fail: each task appears at most once in the list
        let _ = self.senders.push_back(task);
        self.parked[task] = Some(item);
        debug!("queue {}: task {} waiting to send", self.id, task);
        Ok(Poll::Pending)
    }

    /// Dequeue the oldest item.
    ///
    /// On an empty queue the calling task blocks until an item is handed to
    /// it or `timeout` expires. With [`Timeout::Forever`] the wait only ends
    /// with an item.
    pub fn receive(
        &mut self,
        sched: &mut Scheduler,
        timeout: Timeout,
    ) -> Result<Poll<T>, QueueError> {
        if !self.items.is_empty() {
            let item = self.items.remove(0);
            self.admit_parked_sender(sched);
            return Ok(Poll::Ready(item));
        }
        if timeout.is_zero() {
            return Err(QueueError::WouldBlock);
        }

        let deadline = timeout.deadline(sched.now());
        let task = sched
            .block_current(WaitTarget::QueueReceive(self.id), deadline)
            .map_err(|_| QueueError::WouldBlock)?;
        Self::remove_waiter(&mut self.receivers, task);
        let _ = self.receivers.push_back(task);
        debug!("queue {}: task {} waiting to receive", self.id, task);
        Ok(Poll::Pending)
    }

    /// Outcome of a send that returned `Pending`, once `task` runs again.
    pub fn finish_send(&mut self, sched: &mut Scheduler, task: TaskId) -> Result<(), QueueError> {
        let reason = sched.take_wake_reason(task);
        match self.parked.get_mut(task).and_then(Option::take) {
            // Still parked: nobody made room before the wait ended
            Some(_) => {
                Self::remove_waiter(&mut self.senders, task);
                debug!("queue {}: send by task {} ended ({:?})", self.id, task, reason);
                Err(QueueError::TimedOut)
            }
            None => Ok(()),
        }
    }

    /// Outcome of a receive that returned `Pending`, once `task` runs again.
    pub fn finish_receive(&mut self, sched: &mut Scheduler, task: TaskId) -> Result<T, QueueError> {
        let reason = sched.take_wake_reason(task);
        match self.delivered.get_mut(task).and_then(Option::take) {
            Some(item) => Ok(item),
            None => {
                Self::remove_waiter(&mut self.receivers, task);
                debug!(
                    "queue {}: receive by task {} ended ({:?})",
                    self.id, task, reason
                );
                Err(QueueError::TimedOut)
            }
        }
    }

    /// Move the earliest blocked sender's item into the slot just freed.
    fn admit_parked_sender(&mut self, sched: &mut Scheduler) {
        let sender = Self::pop_waiter(&mut self.senders, sched, WaitTarget::QueueSend(self.id));
        let Some(sender) = sender else {
            return;
        };
        if let Some(item) = self.parked[sender].take() {
            if let Err(item) = self.items.push(item) {
                self.parked[sender] = Some(item);
                return;
            }
        }
        sched.wake(sender, WakeReason::Signalled);
    }

    /// Pop waiters until one that is still blocked on `target` is found.
    /// Entries of tasks whose wait already ended are dropped.
    fn pop_waiter(
        list: &mut Deque<TaskId, MAX_TASKS>,
        sched: &Scheduler,
        target: WaitTarget,
    ) -> Option<TaskId> {
        while let Some(task) = list.pop_front() {
            if sched.is_waiting_on(task, target) {
                return Some(task);
            }
        }
        None
    }

    fn remove_waiter(list: &mut Deque<TaskId, MAX_TASKS>, task: TaskId) {
        for _ in 0..list.len() {
            if let Some(other) = list.pop_front() {
                if other != task {
                    let _ = list.push_back(other);
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    #[inline]
    pub fn id(&self) -> QueueId {
        self.id
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.items.is_full()
    }

    #[inline]
    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn waiting_senders(&self) -> usize {
        self.senders.len()
    }

    pub fn waiting_receivers(&self) -> usize {
        self.receivers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{TaskConfig, TaskState};

    extern "C" fn entry() -> ! {
        loop {}
    }

    /// Scheduler with one task per priority, started.
    fn started(priorities: &[u8]) -> (Scheduler, std::vec::Vec<TaskId>) {
        let mut sched = Scheduler::new();
        let ids = priorities
            .iter()
            .map(|&p| sched.create_task(entry, TaskConfig::new("t", p)).unwrap())
            .collect();
        sched.start(entry).unwrap();
        (sched, ids)
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(
            BoundedQueue::<u32, 0>::new(0),
            Err(KernelError::ZeroCapacityQueue)
        ));
    }

    #[test]
    fn test_fifo_order() {
        let (mut sched, _) = started(&[1]);
        let mut queue = BoundedQueue::<u32, 3>::new(0).unwrap();
        for item in 1..=3 {
            assert_eq!(queue.send(&mut sched, item, Timeout::NoWait), Ok(Poll::Ready(())));
        }
        assert!(queue.is_full());
        for item in 1..=3 {
            assert_eq!(queue.receive(&mut sched, Timeout::NoWait), Ok(Poll::Ready(item)));
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn test_send_nowait_on_full_queue() {
        let (mut sched, ids) = started(&[1]);
        let mut queue = BoundedQueue::<u32, 1>::new(0).unwrap();
        assert_eq!(queue.send(&mut sched, 100, Timeout::NoWait), Ok(Poll::Ready(())));
        assert_eq!(
            queue.send(&mut sched, 100, Timeout::NoWait),
            Err(QueueError::WouldBlock)
        );
        assert_eq!(queue.len(), 1);
        assert_eq!(sched.state(ids[0]), Ok(TaskState::Running));
    }

    #[test]
    fn test_receive_nowait_on_empty_queue() {
        let (mut sched, _) = started(&[1]);
        let mut queue = BoundedQueue::<u32, 1>::new(0).unwrap();
        assert_eq!(queue.receive(&mut sched, Timeout::NoWait), Err(QueueError::WouldBlock));
    }

    #[test]
    fn test_zero_tick_timeout_does_not_block() {
        let (mut sched, ids) = started(&[1]);
        let mut queue = BoundedQueue::<u32, 1>::new(0).unwrap();
        assert_eq!(
            queue.receive(&mut sched, Timeout::After(0)),
            Err(QueueError::WouldBlock)
        );
        assert_eq!(queue.send(&mut sched, 1, Timeout::NoWait), Ok(Poll::Ready(())));
        assert_eq!(
            queue.send(&mut sched, 2, Timeout::After(0)),
            Err(QueueError::WouldBlock)
        );
        assert_eq!(sched.state(ids[0]), Ok(TaskState::Running));
        assert_eq!(queue.waiting_senders(), 0);
        assert_eq!(queue.waiting_receivers(), 0);
    }

    #[test]
    fn test_blocking_outside_task_would_block() {
        let mut sched = Scheduler::new();
        let mut queue = BoundedQueue::<u32, 1>::new(0).unwrap();
        assert_eq!(queue.receive(&mut sched, Timeout::Forever), Err(QueueError::WouldBlock));
        assert_eq!(queue.waiting_receivers(), 0);
    }

    #[test]
    fn test_send_hands_off_to_blocked_receiver() {
        let (mut sched, ids) = started(&[2, 1]);
        let (rx, tx) = (ids[0], ids[1]);
        let mut queue = BoundedQueue::<u32, 1>::new(0).unwrap();

        assert_eq!(queue.receive(&mut sched, Timeout::Forever), Ok(Poll::Pending));
        assert_eq!(sched.state(rx), Ok(TaskState::Blocked));
        assert_eq!(sched.schedule(), tx);

        assert_eq!(queue.send(&mut sched, 100, Timeout::NoWait), Ok(Poll::Ready(())));
        // Delivered directly; the slot stays free
        assert!(queue.is_empty());
        assert!(sched.needs_reschedule());
        assert_eq!(sched.schedule(), rx);
        assert_eq!(queue.finish_receive(&mut sched, rx), Ok(100));
        assert_eq!(queue.waiting_receivers(), 0);
    }

    #[test]
    fn test_blocked_sender_admitted_on_receive() {
        let (mut sched, ids) = started(&[2, 1]);
        let (tx, rx) = (ids[0], ids[1]);
        let mut queue = BoundedQueue::<u32, 1>::new(0).unwrap();

        assert_eq!(queue.send(&mut sched, 1, Timeout::Forever), Ok(Poll::Ready(())));
        assert_eq!(queue.send(&mut sched, 2, Timeout::Forever), Ok(Poll::Pending));
        assert_eq!(queue.waiting_senders(), 1);
        assert_eq!(sched.schedule(), rx);

        assert_eq!(queue.receive(&mut sched, Timeout::Forever), Ok(Poll::Ready(1)));
        assert!(queue.is_full());
        assert_eq!(sched.schedule(), tx);
        assert_eq!(queue.finish_send(&mut sched, tx), Ok(()));

        sched.block_current(WaitTarget::Delay, None).unwrap();
        assert_eq!(sched.schedule(), rx);
        assert_eq!(queue.receive(&mut sched, Timeout::NoWait), Ok(Poll::Ready(2)));
    }

    #[test]
    fn test_receive_timeout() {
        let (mut sched, ids) = started(&[1]);
        let mut queue = BoundedQueue::<u32, 1>::new(0).unwrap();

        assert_eq!(queue.receive(&mut sched, Timeout::After(5)), Ok(Poll::Pending));
        sched.schedule();
        for _ in 0..5 {
            sched.tick();
        }
        assert_eq!(sched.schedule(), ids[0]);
        assert_eq!(queue.finish_receive(&mut sched, ids[0]), Err(QueueError::TimedOut));
        assert_eq!(queue.waiting_receivers(), 0);
    }

    #[test]
    fn test_send_timeout_discards_parked_item() {
        let (mut sched, ids) = started(&[1]);
        let mut queue = BoundedQueue::<u32, 1>::new(0).unwrap();

        assert_eq!(queue.send(&mut sched, 1, Timeout::NoWait), Ok(Poll::Ready(())));
        assert_eq!(queue.send(&mut sched, 2, Timeout::After(3)), Ok(Poll::Pending));
        sched.schedule();
        for _ in 0..3 {
            sched.tick();
        }
        assert_eq!(sched.schedule(), ids[0]);
        assert_eq!(queue.finish_send(&mut sched, ids[0]), Err(QueueError::TimedOut));
        assert_eq!(queue.waiting_senders(), 0);

        assert_eq!(queue.receive(&mut sched, Timeout::NoWait), Ok(Poll::Ready(1)));
        assert_eq!(queue.receive(&mut sched, Timeout::NoWait), Err(QueueError::WouldBlock));
    }

    #[test]
    fn test_stale_receiver_is_skipped() {
        let (mut sched, ids) = started(&[3, 2, 1]);
        let (first, second, tx) = (ids[0], ids[1], ids[2]);
        let mut queue = BoundedQueue::<u32, 1>::new(0).unwrap();

        assert_eq!(queue.receive(&mut sched, Timeout::Forever), Ok(Poll::Pending));
        assert_eq!(sched.schedule(), second);
        assert_eq!(queue.receive(&mut sched, Timeout::Forever), Ok(Poll::Pending));
        assert_eq!(sched.schedule(), tx);

        // The earliest receiver's wait is abandoned
        sched.suspend(first).unwrap();
        assert_eq!(queue.send(&mut sched, 7, Timeout::NoWait), Ok(Poll::Ready(())));
        assert_eq!(sched.schedule(), second);
        assert_eq!(queue.finish_receive(&mut sched, second), Ok(7));

        sched.resume(first).unwrap();
        assert_eq!(sched.schedule(), first);
        assert_eq!(queue.finish_receive(&mut sched, first), Err(QueueError::TimedOut));
    }

    #[test]
    fn test_receivers_served_in_block_order() {
        let (mut sched, ids) = started(&[2, 2, 1]);
        let (a, b, tx) = (ids[0], ids[1], ids[2]);
        let mut queue = BoundedQueue::<u32, 1>::new(0).unwrap();

        assert_eq!(sched.current(), a);
        assert_eq!(queue.receive(&mut sched, Timeout::Forever), Ok(Poll::Pending));
        assert_eq!(sched.schedule(), b);
        assert_eq!(queue.receive(&mut sched, Timeout::Forever), Ok(Poll::Pending));
        assert_eq!(sched.schedule(), tx);

        assert_eq!(queue.send(&mut sched, 10, Timeout::NoWait), Ok(Poll::Ready(())));
        assert_eq!(queue.send(&mut sched, 20, Timeout::NoWait), Ok(Poll::Ready(())));
        assert_eq!(sched.schedule(), a);
        assert_eq!(queue.finish_receive(&mut sched, a), Ok(10));
        sched.yield_current();
        assert_eq!(sched.schedule(), b);
        assert_eq!(queue.finish_receive(&mut sched, b), Ok(20));
    }
}
