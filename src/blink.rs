//! # Blink Application
//!
//! The producer/consumer pair and the context object that owns their shared
//! state.
//!
//! ## Task Bodies
//!
//! Tasks are written as resumable state machines: [`TaskBody::resume`] takes
//! the reply to the previous request and returns the next blocking request.
//! The firmware runs each body in a loop on its own stack, trapping into the
//! kernel for every request; the host simulator drives the same bodies
//! directly. Either way the queue and scheduler semantics are identical.
//!
//! ```text
//!   producer                               consumer
//!   ────────                               ────────
//!   SleepUntil(last + period·rate)         Receive(Forever)
//!   Send(payload, NoWait) ───── queue ───► show active
//!   (WouldBlock logged)                    Sleep(active·rate)
//!                                          show inactive
//! ```

use core::task::Poll;

use embedded_hal::digital::OutputPin;
use log::{debug, info, warn};

use crate::buttons::{EdgeOutcome, EdgeSource, RateButtons};
use crate::config::{BlinkConfig, QUEUE_DEPTH};
use crate::error::{KernelError, QueueError};
use crate::led::StatusLed;
use crate::queue::BoundedQueue;
use crate::rate::RateFactor;
use crate::scheduler::Scheduler;
use crate::task::{TaskConfig, TaskEntry, TaskId, WaitTarget};
use crate::time::{self, Ticks, Timeout};

/// Queue id of the producer → consumer channel.
const MESSAGE_QUEUE: u8 = 0;

// ---------------------------------------------------------------------------
// Request protocol
// ---------------------------------------------------------------------------

/// A kernel operation requested by a task.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Request {
    /// Sleep until the absolute tick. Returns at once if it already passed.
    SleepUntil(Ticks),
    /// Sleep for a number of ticks. `Sleep(0)` only yields.
    Sleep(Ticks),
    Send { item: u32, timeout: Timeout },
    Receive { timeout: Timeout },
}

/// Outcome of the previous [`Request`], handed to the task when it resumes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reply {
    /// First activation.
    Start,
    Slept,
    Sent(Result<(), QueueError>),
    Received(Result<u32, QueueError>),
}

/// Result of submitting a request for the running task.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Submission {
    /// Completed without blocking.
    Done(Reply),
    /// The task is now Blocked; call [`BlinkSystem::complete`] once it runs
    /// again.
    Blocked,
}

/// Snapshot of shared state taken when a task resumes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaskEnv {
    pub now: Ticks,
    pub rate: f32,
}

pub trait TaskBody {
    fn resume(&mut self, reply: Reply, env: TaskEnv) -> Request;
}

// ---------------------------------------------------------------------------
// Producer
// ---------------------------------------------------------------------------

/// Sends the payload once per period, on an absolute time base so the
/// period does not drift with processing time.
#[derive(Debug)]
pub struct Producer {
    period: Ticks,
    payload: u32,
    last_wake: Ticks,
}

impl Producer {
    pub fn new(config: &BlinkConfig) -> Self {
        Self {
            period: config.producer_period,
            payload: config.payload,
            last_wake: 0,
        }
    }

    fn next_wake(&mut self, rate: f32) -> Request {
        // A factor small enough to round the period to zero would spin
        let period = time::scale(self.period, rate).max(1);
        self.last_wake = self.last_wake.wrapping_add(period);
        Request::SleepUntil(self.last_wake)
    }

    pub fn last_wake(&self) -> Ticks {
        self.last_wake
    }
}

impl TaskBody for Producer {
    fn resume(&mut self, reply: Reply, env: TaskEnv) -> Request {
        match reply {
            Reply::Start => {
                self.last_wake = env.now;
                self.next_wake(env.rate)
            }
            Reply::Slept => Request::Send {
                item: self.payload,
                timeout: Timeout::NoWait,
            },
            Reply::Sent(result) => {
                if let Err(e) = result {
                    warn!("tick {}: payload dropped: {}", env.now, e);
                }
                self.next_wake(env.rate)
            }
            Reply::Received(_) => self.next_wake(env.rate),
        }
    }
}

// ---------------------------------------------------------------------------
// Consumer
// ---------------------------------------------------------------------------

/// Waits for the payload and runs one active/inactive cycle of the
/// indicator for each one received.
pub struct Consumer<A, I> {
    payload: u32,
    active_period: Ticks,
    led: StatusLed<A, I>,
}

impl<A: OutputPin, I: OutputPin> Consumer<A, I> {
    pub fn new(config: &BlinkConfig, led: StatusLed<A, I>) -> Self {
        Self {
            payload: config.payload,
            active_period: config.active_period,
            led,
        }
    }

    pub fn led(&self) -> &StatusLed<A, I> {
        &self.led
    }

    pub fn into_led(self) -> StatusLed<A, I> {
        self.led
    }
}

const WAIT_FOR_MESSAGE: Request = Request::Receive {
    timeout: Timeout::Forever,
};

impl<A: OutputPin, I: OutputPin> TaskBody for Consumer<A, I> {
    fn resume(&mut self, reply: Reply, env: TaskEnv) -> Request {
        match reply {
            Reply::Received(Ok(item)) if item == self.payload => {
                self.led.show_active();
                Request::Sleep(time::scale(self.active_period, env.rate))
            }
            Reply::Received(Ok(_)) => WAIT_FOR_MESSAGE,
            Reply::Received(Err(e)) => {
                debug!("receive ended without a message: {}", e);
                WAIT_FOR_MESSAGE
            }
            Reply::Slept => {
                self.led.show_inactive();
                WAIT_FOR_MESSAGE
            }
            Reply::Start | Reply::Sent(_) => WAIT_FOR_MESSAGE,
        }
    }
}

// ---------------------------------------------------------------------------
// System context
// ---------------------------------------------------------------------------

/// Owns everything the two tasks and the button interrupt share: the message
/// queue, the rate factor and the debounce state.
pub struct BlinkSystem {
    config: BlinkConfig,
    queue: BoundedQueue<u32, QUEUE_DEPTH>,
    rate: RateFactor,
    buttons: RateButtons,
    producer: TaskId,
    consumer: TaskId,
}

impl BlinkSystem {
    /// Validate `config`, create the queue and register both tasks.
    pub fn new(
        config: BlinkConfig,
        sched: &mut Scheduler,
        producer_entry: TaskEntry,
        consumer_entry: TaskEntry,
    ) -> Result<Self, KernelError> {
        config.validate()?;
        let queue = BoundedQueue::new(MESSAGE_QUEUE)?;

        let consumer =
            sched.create_task(consumer_entry, TaskConfig::new("rx", config.consumer_priority))?;
        let producer =
            sched.create_task(producer_entry, TaskConfig::new("tx", config.producer_priority))?;

        info!(
            "blink system ready: period {} ticks, active {} ticks, rate {}",
            config.producer_period, config.active_period, config.initial_rate
        );
        Ok(Self {
            config,
            queue,
            rate: RateFactor::new(config.initial_rate),
            buttons: RateButtons::new(&config),
            producer,
            consumer,
        })
    }

    pub fn env(&self, sched: &Scheduler) -> TaskEnv {
        TaskEnv {
            now: sched.now(),
            rate: self.rate.get(),
        }
    }

    /// Perform `request` on behalf of the running task.
    pub fn submit(&mut self, sched: &mut Scheduler, request: Request) -> Submission {
        match request {
            Request::SleepUntil(deadline) => {
                if time::has_elapsed(sched.now(), deadline) {
                    return Submission::Done(Reply::Slept);
                }
                Self::delay(sched, deadline)
            }
            Request::Sleep(0) => {
                sched.yield_current();
                Submission::Done(Reply::Slept)
            }
            Request::Sleep(ticks) => {
                let deadline = sched.now().wrapping_add(ticks.min(time::MAX_DELAY));
                Self::delay(sched, deadline)
            }
            Request::Send { item, timeout } => match self.queue.send(sched, item, timeout) {
                Ok(Poll::Ready(())) => Submission::Done(Reply::Sent(Ok(()))),
                Ok(Poll::Pending) => Submission::Blocked,
                Err(e) => Submission::Done(Reply::Sent(Err(e))),
            },
            Request::Receive { timeout } => match self.queue.receive(sched, timeout) {
                Ok(Poll::Ready(item)) => Submission::Done(Reply::Received(Ok(item))),
                Ok(Poll::Pending) => Submission::Blocked,
                Err(e) => Submission::Done(Reply::Received(Err(e))),
            },
        }
    }

    fn delay(sched: &mut Scheduler, deadline: Ticks) -> Submission {
        match sched.block_current(WaitTarget::Delay, Some(deadline)) {
            Ok(_) => Submission::Blocked,
            Err(e) => {
                warn!("cannot sleep: {}", e);
                Submission::Done(Reply::Slept)
            }
        }
    }

    /// Reply to a request that blocked, once the requesting task (the
    /// current task) runs again.
    pub fn complete(&mut self, sched: &mut Scheduler, request: Request) -> Reply {
        let task = sched.current();
        match request {
            Request::SleepUntil(_) | Request::Sleep(_) => {
                sched.take_wake_reason(task);
                Reply::Slept
            }
            Request::Send { .. } => Reply::Sent(self.queue.finish_send(sched, task)),
            Request::Receive { .. } => Reply::Received(self.queue.finish_receive(sched, task)),
        }
    }

    /// Button interrupt: take the pending edges from `source` and adjust the
    /// rate factor.
    pub fn on_interrupt<S: EdgeSource>(&mut self, sched: &Scheduler, source: &mut S) -> EdgeOutcome {
        self.buttons.service(source, sched.now(), &self.rate)
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn config(&self) -> &BlinkConfig {
        &self.config
    }

    pub fn rate(&self) -> &RateFactor {
        &self.rate
    }

    pub fn queue(&self) -> &BoundedQueue<u32, QUEUE_DEPTH> {
        &self.queue
    }

    pub fn buttons(&self) -> &RateButtons {
        &self.buttons
    }

    pub fn producer_task(&self) -> TaskId {
        self.producer
    }

    pub fn consumer_task(&self) -> TaskId {
        self.consumer
    }
}
