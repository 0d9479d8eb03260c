//! # blinkos
//!
//! A small fixed-priority preemptive RTOS for the ARM Cortex-M4, shipped with
//! the application it was written for: a producer task that posts a message
//! once per period, a consumer task that blinks an LED for each message, and
//! a pair of push buttons that speed the cycle up or slow it down.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │        Producer · Consumer · Rate buttons (blink.rs)    │
//! ├────────────────────────────────────────────────────────┤
//! │   Kernel glue (kernel.rs)      │  Host simulator (sim.rs)│
//! │   call() · SysTick · GPIOF     │  run_until() · raise()  │
//! ├──────────────┬─────────────────┴──┬────────────────────┤
//! │  Scheduler   │   Bounded queue    │  Sync primitives   │
//! │  scheduler.rs│   queue.rs         │  sync.rs           │
//! │  ─ tick()    │   ─ send()         │  ─ critical_section│
//! │  ─ schedule()│   ─ receive()      │  ─ Shared<T>       │
//! ├──────────────┴────────────────────┴────────────────────┤
//! │              Task Model (task.rs)                       │
//! │    TCB · TaskState · WaitTarget · WakeReason            │
//! ├────────────────────────────────────────────────────────┤
//! │      Arch Port (arch/) · Board (board.rs)               │
//! │    PendSV · SysTick · Stack Init · TM4C123 Port F       │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Scheduling Model
//!
//! - Fixed priorities, higher number = more urgent, 0 reserved for idle
//! - Preemptive: a task made Ready above the running task switches in at once
//! - Round-robin between equal priorities on time-slice expiry or yield
//! - Tasks block only in queue operations and delays
//!
//! ## Memory Model
//!
//! - **No heap**: All state is statically allocated
//! - **Fixed-size TCB array**: `[TaskControlBlock; MAX_TASKS]`
//! - **Per-task stack**: `[u8; STACK_SIZE]` inline in TCB
//! - **Critical sections**: `critical_section::with()` for shared state
//!
//! ## Targets
//!
//! Everything except `kernel`, `board`, `logger` and `arch::cortex_m4` builds
//! on the host as well, where [`sim::Simulator`] drives the same scheduler,
//! queue and task bodies on a virtual clock.

#![cfg_attr(not(test), no_std)]

pub mod arch;
pub mod blink;
pub mod buttons;
pub mod config;
pub mod error;
pub mod led;
pub mod queue;
pub mod rate;
pub mod scheduler;
pub mod sim;
pub mod sync;
pub mod task;
pub mod time;

#[cfg(firmware)]
pub mod board;
#[cfg(firmware)]
pub mod kernel;
#[cfg(firmware)]
pub mod logger;

pub use error::{KernelError, QueueError};
