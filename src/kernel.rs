//! # Kernel
//!
//! Firmware glue between the portable scheduler and the Cortex-M4 port: the
//! global scheduler and blink system instances, the task-side request call,
//! and the handlers invoked from SysTick, PendSV and the button interrupt.
//!
//! ## Startup Sequence
//!
//! ```text
//! reset_handler (cortex-m-rt)
//!   └─► main()
//!         ├─► kernel::init()        ← Validate config, create queue + tasks
//!         └─► kernel::start()       ← Launch scheduler (no return)
//!               ├─► Create idle task, pick the first task
//!               ├─► Configure SysTick
//!               ├─► Set interrupt priorities
//!               └─► Start first task via arch::start_first_task()
//! ```
//!
//! ## Task Calls
//!
//! A task performs a blocking operation with [`call`]: the request is
//! submitted inside a critical section and, if the task blocked, PendSV is
//! pended. PendSV fires as soon as the critical section ends, so by the time
//! `call` continues the task has been switched out and back in again, and
//! the outcome is collected with [`BlinkSystem::complete`].

use core::convert::Infallible;
use core::ptr::addr_of_mut;

use critical_section::CriticalSection;
use log::{error, info};

use crate::arch::{self, cortex_m4};
use crate::blink::{BlinkSystem, Reply, Request, Submission, TaskBody, TaskEnv};
use crate::buttons::{EdgeOutcome, EdgeSource};
use crate::config::BlinkConfig;
use crate::error::KernelError;
use crate::scheduler::Scheduler;
use crate::sync::{self, Shared};
use crate::task::TaskEntry;

// ---------------------------------------------------------------------------
// Global instances
// ---------------------------------------------------------------------------

/// Global scheduler instance.
///
/// # Safety
/// Only accessed through [`scheduler`], i.e. inside a critical section.
static mut SCHEDULER: Scheduler = Scheduler::new();

static SYSTEM: Shared<BlinkSystem> = Shared::new();

/// Borrow the scheduler for the duration of a critical section.
///
/// # Safety
/// The caller must not hold another reference obtained from this function.
unsafe fn scheduler<'cs>(_cs: CriticalSection<'cs>) -> &'cs mut Scheduler {
    &mut *addr_of_mut!(SCHEDULER)
}

// ---------------------------------------------------------------------------
// Kernel API
// ---------------------------------------------------------------------------

/// Validate `config`, create the message queue and register the producer
/// and consumer tasks.
pub fn init(
    config: BlinkConfig,
    producer_entry: TaskEntry,
    consumer_entry: TaskEntry,
) -> Result<(), KernelError> {
    sync::critical_section(|cs| {
        let sched = unsafe { scheduler(cs) };
        let system = BlinkSystem::new(config, sched, producer_entry, consumer_entry)?;
        SYSTEM.install(system);
        Ok(())
    })
}

/// Start the scheduler. Returns only if it cannot start.
///
/// Creates the idle task, configures SysTick and the exception priorities,
/// and launches the first task.
pub fn start(mut core_peripherals: cortex_m::Peripherals) -> Result<Infallible, KernelError> {
    cortex_m::interrupt::disable();

    let first_sp = sync::critical_section(|cs| {
        let sched = unsafe { scheduler(cs) };
        sched.start(idle_task)?;
        Ok::<_, KernelError>(sched.current_stack_pointer())
    })?;

    cortex_m4::configure_systick(&mut core_peripherals.SYST);
    cortex_m4::set_interrupt_priorities(&mut core_peripherals.SCB);
    info!("launching first task");

    unsafe { cortex_m4::start_first_task(first_sp) }
}

/// Configuration the system was initialised with.
pub fn config() -> BlinkConfig {
    SYSTEM.with(|system| *system.config()).unwrap_or_default()
}

/// Snapshot of the clock and rate factor for the running task.
pub fn env() -> TaskEnv {
    sync::critical_section(|cs| {
        let sched = unsafe { scheduler(cs) };
        SYSTEM
            .with_cs(cs, |system| system.env(sched))
            .unwrap_or(TaskEnv {
                now: sched.now(),
                rate: 1.0,
            })
    })
}

/// Perform `request` for the calling task, blocking it if needed.
pub fn call(request: Request) -> Reply {
    let submission = sync::critical_section(|cs| {
        let sched = unsafe { scheduler(cs) };
        let submission = SYSTEM.with_cs(cs, |system| system.submit(sched, request));
        if sched.needs_reschedule() {
            cortex_m4::trigger_pendsv();
        }
        submission
    });

    match submission {
        Some(Submission::Done(reply)) => reply,
        // Switched out and back in by now
        Some(Submission::Blocked) => sync::critical_section(|cs| {
            let sched = unsafe { scheduler(cs) };
            SYSTEM
                .with_cs(cs, |system| system.complete(sched, request))
                .unwrap_or(Reply::Slept)
        }),
        None => {
            error!("kernel call before init: {:?}", request);
            Reply::Slept
        }
    }
}

/// Drive a task body forever. Used as the whole body of a task entry point.
pub fn run_task<B: TaskBody>(mut body: B) -> ! {
    let mut reply = Reply::Start;
    loop {
        let request = body.resume(reply, env());
        reply = call(request);
    }
}

/// Feed a button interrupt to the blink system.
pub fn service_buttons<S: EdgeSource>(source: &mut S) -> Option<EdgeOutcome> {
    sync::critical_section(|cs| {
        let sched = unsafe { scheduler(cs) };
        SYSTEM.with_cs(cs, |system| system.on_interrupt(sched, source))
    })
}

// ---------------------------------------------------------------------------
// Exception entry points
// ---------------------------------------------------------------------------

/// Called from SysTick.
pub(crate) fn on_tick() {
    let switch = sync::critical_section(|cs| unsafe { scheduler(cs) }.tick());
    if switch {
        cortex_m4::trigger_pendsv();
    }
}

/// Called from PendSV with the outgoing task's saved stack pointer; returns
/// the stack pointer of the task to resume.
pub(crate) extern "C" fn switch_context(psp: *mut u32) -> *mut u32 {
    sync::critical_section(|cs| {
        let sched = unsafe { scheduler(cs) };
        sched.save_stack_pointer(psp);
        sched.schedule();
        sched.current_stack_pointer()
    })
}

extern "C" fn idle_task() -> ! {
    loop {
        arch::wait_for_interrupt();
    }
}
