//! # Host Simulator
//!
//! Runs the blink system on a virtual clock. The real scheduler and queue
//! make every decision; the simulator only plays the part of the hardware:
//! it delivers ticks, injects button edges and, between ticks, resumes
//! whichever task the scheduler marks as Running until every task is blocked
//! again.

use embedded_hal::digital::OutputPin;
use log::warn;

use crate::arch;
use crate::blink::{BlinkSystem, Consumer, Producer, Reply, Request, Submission, TaskBody};
use crate::buttons::{EdgeOutcome, EdgeSource};
use crate::config::{BlinkConfig, MAX_TASKS};
use crate::error::KernelError;
use crate::led::{Indicator, StatusLed};
use crate::scheduler::Scheduler;
use crate::task::TaskId;
use crate::time::{self, Ticks};

/// Upper bound on task steps between two ticks. Hitting it means some task
/// never blocks.
const MAX_STEPS_PER_TICK: usize = 64;

/// Simulated tasks never execute their entry point.
extern "C" fn unused_entry() -> ! {
    loop {
        arch::wait_for_interrupt();
    }
}

/// Edge mask injected by [`Simulator::raise`].
struct Injected(u32);

impl EdgeSource for Injected {
    fn take_pending(&mut self) -> u32 {
        core::mem::take(&mut self.0)
    }
}

pub struct Simulator<A, I> {
    sched: Scheduler,
    system: BlinkSystem,
    producer: Producer,
    consumer: Consumer<A, I>,

    /// Request each blocked task is waiting in.
    pending: [Option<Request>; MAX_TASKS],
    /// Reply each ready task receives when it next runs.
    replies: [Option<Reply>; MAX_TASKS],
}

impl<A: OutputPin, I: OutputPin> Simulator<A, I> {
    /// Build and start the system. Both tasks run their first step at tick 0.
    pub fn new(config: BlinkConfig, led: StatusLed<A, I>) -> Result<Self, KernelError> {
        let mut sched = Scheduler::new();
        let system = BlinkSystem::new(config, &mut sched, unused_entry, unused_entry)?;
        sched.start(unused_entry)?;

        let mut replies = [None; MAX_TASKS];
        replies[system.producer_task()] = Some(Reply::Start);
        replies[system.consumer_task()] = Some(Reply::Start);

        let mut sim = Self {
            producer: Producer::new(&config),
            consumer: Consumer::new(&config, led),
            sched,
            system,
            pending: [None; MAX_TASKS],
            replies,
        };
        sim.run_ready_tasks();
        Ok(sim)
    }

    /// Inject a button edge on `mask` at the current tick.
    pub fn raise(&mut self, mask: u32) -> EdgeOutcome {
        let outcome = self.system.on_interrupt(&self.sched, &mut Injected(mask));
        self.run_ready_tasks();
        outcome
    }

    /// Advance the clock by `ticks`.
    pub fn advance(&mut self, ticks: Ticks) {
        for _ in 0..ticks {
            self.step();
        }
    }

    /// Advance the clock until it reads `tick`. Does nothing if it already
    /// passed.
    pub fn run_until(&mut self, tick: Ticks) {
        while time::remaining(self.sched.now(), tick) > 0 {
            self.step();
        }
    }

    fn step(&mut self) {
        if self.sched.tick() {
            self.sched.schedule();
        }
        self.run_ready_tasks();
    }

    /// Resume application tasks until only the idle task is left running.
    fn run_ready_tasks(&mut self) {
        for _ in 0..MAX_STEPS_PER_TICK {
            let task = self.sched.current();
            if task == self.sched.idle_task() {
                return;
            }

            let reply = match (self.replies[task].take(), self.pending[task].take()) {
                (Some(reply), _) => reply,
                (None, Some(request)) => self.system.complete(&mut self.sched, request),
                (None, None) => {
                    warn!("task {} has nothing to resume", task);
                    return;
                }
            };

            let env = self.system.env(&self.sched);
            let request = self.body(task).resume(reply, env);
            match self.system.submit(&mut self.sched, request) {
                Submission::Done(reply) => self.replies[task] = Some(reply),
                Submission::Blocked => self.pending[task] = Some(request),
            }

            if self.sched.needs_reschedule() {
                self.sched.schedule();
            }
        }
        warn!(
            "tick {}: task {} still running after {} steps",
            self.sched.now(),
            self.sched.current(),
            MAX_STEPS_PER_TICK
        );
    }

    fn body(&mut self, task: TaskId) -> &mut dyn TaskBody {
        if task == self.system.producer_task() {
            &mut self.producer
        } else {
            &mut self.consumer
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    #[inline]
    pub fn now(&self) -> Ticks {
        self.sched.now()
    }

    pub fn rate(&self) -> f32 {
        self.system.rate().get()
    }

    pub fn indicator(&self) -> Indicator {
        self.consumer.led().shown()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.sched
    }

    pub fn system(&self) -> &BlinkSystem {
        &self.system
    }

    pub fn producer(&self) -> &Producer {
        &self.producer
    }

    /// Stop the simulation and give back the indicator pins.
    pub fn into_led(self) -> StatusLed<A, I> {
        self.consumer.into_led()
    }
}
