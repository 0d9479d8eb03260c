//! # blinkos Configuration
//!
//! Compile-time constants governing the kernel, plus the runtime
//! [`BlinkConfig`] describing the blinker application. All kernel limits are
//! fixed at compile time; nothing is allocated dynamically.

use crate::error::KernelError;
use crate::time::{ms_to_ticks, Ticks};

/// Maximum number of tasks the kernel can manage, including the idle task.
/// This bounds the static TCB array. Each task consumes `STACK_SIZE` bytes
/// of RAM.
pub const MAX_TASKS: usize = 4;

/// SysTick frequency in Hz. One tick is one millisecond.
pub const TICK_HZ: u32 = 1000;

/// Default time slice in ticks. A running task whose slice expires yields to
/// any Ready task of equal priority.
pub const DEFAULT_TIME_SLICE: u32 = 10;

/// Per-task stack size in bytes. Must hold the deepest call chain plus the
/// extended FPU exception frame (104 bytes) and the software-saved context
/// (36 bytes for R4–R11 and EXC_RETURN, 64 more when S16–S31 are live).
pub const STACK_SIZE: usize = 1024;

/// Highest priority an application task may use.
pub const MAX_PRIORITY: u8 = 7;

/// Priority of the idle task. Reserved: application tasks must be above it.
pub const IDLE_PRIORITY: u8 = 0;

/// System clock frequency in Hz (TM4C123 precision internal oscillator).
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;

/// Depth of the producer → consumer queue.
pub const QUEUE_DEPTH: usize = 1;

// ---------------------------------------------------------------------------
// Application configuration
// ---------------------------------------------------------------------------

/// Runtime parameters of the blinker application.
///
/// The defaults reproduce the LaunchPad demo: one message per second, the
/// active LED lit for half a second, and each accepted button press scaling
/// both periods by ten percent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlinkConfig {
    /// Producer period in ticks at a rate factor of 1.0.
    pub producer_period: Ticks,
    /// Duration the active indicator stays on, in ticks at a rate of 1.0.
    pub active_period: Ticks,
    /// The only payload the consumer reacts to.
    pub payload: u32,
    /// Fractional change applied by one accepted button press.
    pub rate_step: f32,
    /// Rate factor at start-up.
    pub initial_rate: f32,
    /// Edges closer than this to the previous edge are discarded.
    pub debounce: Ticks,
    pub producer_priority: u8,
    pub consumer_priority: u8,
    /// Pending-status bit of the line that scales the factor by `1 + step`.
    pub increase_mask: u32,
    /// Pending-status bit of the line that scales the factor by `1 - step`.
    pub decrease_mask: u32,
}

impl Default for BlinkConfig {
    fn default() -> Self {
        Self {
            producer_period: ms_to_ticks(1000),
            active_period: ms_to_ticks(500),
            payload: 100,
            rate_step: 0.1,
            initial_rate: 1.0,
            debounce: ms_to_ticks(200),
            producer_priority: 1,
            consumer_priority: 2,
            // SW2 (PF0) and SW1 (PF4) on the EK-TM4C123GXL
            increase_mask: 1 << 0,
            decrease_mask: 1 << 4,
        }
    }
}

impl BlinkConfig {
    /// Reject parameters the system cannot run with. Task priorities are
    /// checked again by the scheduler when the tasks are created.
    pub fn validate(&self) -> Result<(), KernelError> {
        if self.producer_period == 0 {
            return Err(invalid("producer_period", "must be at least one tick"));
        }
        if self.active_period == 0 {
            return Err(invalid("active_period", "must be at least one tick"));
        }
        if !(self.rate_step > 0.0 && self.rate_step < 1.0) {
            return Err(invalid("rate_step", "must lie strictly between 0 and 1"));
        }
        if !(self.initial_rate.is_finite() && self.initial_rate > 0.0) {
            return Err(invalid("initial_rate", "must be finite and positive"));
        }
        if self.increase_mask == 0 || self.decrease_mask == 0 {
            return Err(invalid("line masks", "must select at least one line"));
        }
        if self.increase_mask & self.decrease_mask != 0 {
            return Err(invalid("line masks", "must not overlap"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: &'static str) -> KernelError {
    KernelError::InvalidConfig { field, reason }
}
