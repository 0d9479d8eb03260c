//! # Rate Buttons
//!
//! Interrupt-side logic for the two push buttons that speed up or slow down
//! the blink cycle. The hardware part (reading and acknowledging the pending
//! edge status) sits behind [`EdgeSource`]; everything here is plain
//! arithmetic and runs in bounded time without touching the scheduler.
//!
//! Edges closer than the debounce window to the previous edge are dropped.
//! The previous-edge timestamp is refreshed on every edge, including the
//! dropped ones, so a button that keeps bouncing stays muted until it has
//! been quiet for a full window.

use log::{debug, info};

use crate::config::BlinkConfig;
use crate::rate::RateFactor;
use crate::time::Ticks;

/// Source of edge interrupts, one bit per line.
pub trait EdgeSource {
    /// Return the pending edge mask and acknowledge it.
    fn take_pending(&mut self) -> u32;
}

/// Which way a button moves the rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLine {
    Increase,
    Decrease,
}

/// Result of handling one interrupt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EdgeOutcome {
    /// The factor was scaled; `factor` is the new value.
    Adjusted { line: RateLine, factor: f32 },
    /// Dropped: only `elapsed` ticks since the previous edge.
    Bounced { elapsed: Ticks },
    /// No configured line was pending.
    Unmatched,
}

pub struct RateButtons {
    increase_mask: u32,
    decrease_mask: u32,
    step: f32,
    debounce: Ticks,
    last_edge: Option<Ticks>,
}

impl RateButtons {
    pub fn new(config: &BlinkConfig) -> Self {
        Self {
            increase_mask: config.increase_mask,
            decrease_mask: config.decrease_mask,
            step: config.rate_step,
            debounce: config.debounce,
            last_edge: None,
        }
    }

    /// Handle one interrupt: acknowledge the pending edges and apply them.
    pub fn service<S: EdgeSource>(
        &mut self,
        source: &mut S,
        now: Ticks,
        rate: &RateFactor,
    ) -> EdgeOutcome {
        let status = source.take_pending();
        self.on_edges(status, now, rate)
    }

    /// Apply an already-captured edge `status` at tick `now`.
    ///
    /// The increase line wins when both lines are pending.
    pub fn on_edges(&mut self, status: u32, now: Ticks, rate: &RateFactor) -> EdgeOutcome {
        let previous = self.last_edge.replace(now);
        if let Some(last) = previous {
            let elapsed = now.wrapping_sub(last);
            if elapsed <= self.debounce {
                debug!("edge {:#x} at {} bounced ({} ticks)", status, now, elapsed);
                return EdgeOutcome::Bounced { elapsed };
            }
        }

        let (line, multiplier) = if status & self.increase_mask != 0 {
            (RateLine::Increase, 1.0 + self.step)
        } else if status & self.decrease_mask != 0 {
            (RateLine::Decrease, 1.0 - self.step)
        } else {
            return EdgeOutcome::Unmatched;
        };

        let factor = rate.apply(multiplier);
        info!("{:?} at tick {}: rate factor now {}", line, now, factor);
        EdgeOutcome::Adjusted { line, factor }
    }

    /// Tick of the most recent edge, accepted or not.
    pub fn last_edge(&self) -> Option<Ticks> {
        self.last_edge
    }
}
