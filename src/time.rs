//! # Time
//!
//! Tick arithmetic shared by the scheduler and the tasks. The tick counter is
//! a wrapping `u32`; deadlines are compared by signed distance so they keep
//! working across the wrap (about 49 days at 1 kHz).

use crate::config::TICK_HZ;

/// Scheduler time unit. One tick is `1 / TICK_HZ` seconds.
pub type Ticks = u32;

/// Longest delay a deadline can express. Deadlines are compared by signed
/// distance, so anything further out would read as already passed.
pub const MAX_DELAY: Ticks = i32::MAX as Ticks;

/// How long a blocking queue operation may wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Fail immediately instead of waiting.
    NoWait,
    /// Wait at most this many ticks.
    After(Ticks),
    /// Wait until the operation can complete.
    Forever,
}

impl Timeout {
    /// True for timeouts that must not block: `NoWait` and `After(0)`.
    #[inline]
    pub fn is_zero(self) -> bool {
        matches!(self, Timeout::NoWait | Timeout::After(0))
    }

    /// Absolute wake deadline for a wait starting at `now`, if any.
    pub fn deadline(self, now: Ticks) -> Option<Ticks> {
        match self {
            Timeout::After(ticks) => Some(now.wrapping_add(ticks.min(MAX_DELAY))),
            Timeout::NoWait | Timeout::Forever => None,
        }
    }
}

/// Convert milliseconds to ticks.
pub const fn ms_to_ticks(ms: u32) -> Ticks {
    (ms as u64 * TICK_HZ as u64 / 1000) as Ticks
}

/// True once `now` has reached or passed `deadline`.
#[inline]
pub fn has_elapsed(now: Ticks, deadline: Ticks) -> bool {
    now.wrapping_sub(deadline) as i32 >= 0
}

/// Signed distance from `now` to `deadline`; negative when overdue.
#[inline]
pub fn remaining(now: Ticks, deadline: Ticks) -> i32 {
    deadline.wrapping_sub(now) as i32
}

/// Scale a tick count by a rate factor, truncating toward zero.
///
/// Negative and NaN products saturate to zero, large ones to [`MAX_DELAY`].
#[inline]
pub fn scale(base: Ticks, factor: f32) -> Ticks {
    ((base as f32 * factor) as Ticks).min(MAX_DELAY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_elapsed_across_wrap() {
        assert!(has_elapsed(10, 10));
        assert!(has_elapsed(11, 10));
        assert!(!has_elapsed(9, 10));
        // Deadline set just before the counter wraps
        assert!(!has_elapsed(u32::MAX - 1, 3));
        assert!(has_elapsed(4, u32::MAX - 1));
    }

    #[test]
    fn test_timeout_deadline() {
        assert_eq!(Timeout::After(5).deadline(u32::MAX), Some(4));
        assert_eq!(Timeout::Forever.deadline(7), None);
        assert_eq!(Timeout::NoWait.deadline(7), None);
        // Clamped so the deadline still reads as in the future
        assert_eq!(Timeout::After(u32::MAX).deadline(0), Some(MAX_DELAY));
        assert!(!has_elapsed(0, MAX_DELAY));
    }

    #[test]
    fn test_zero_timeouts() {
        assert!(Timeout::NoWait.is_zero());
        assert!(Timeout::After(0).is_zero());
        assert!(!Timeout::After(1).is_zero());
        assert!(!Timeout::Forever.is_zero());
    }

    #[test]
    fn test_scale() {
        assert_eq!(scale(1000, 1.0), 1000);
        assert_eq!(scale(1000, 1.1), 1100);
        assert_eq!(scale(500, 0.5), 250);
        assert_eq!(scale(500, -1.0), 0);
        assert_eq!(scale(500, f32::NAN), 0);
        assert_eq!(scale(1000, 3.0e6), MAX_DELAY);
        assert_eq!(scale(u32::MAX, 1.0), MAX_DELAY);
    }

    #[test]
    fn test_ms_to_ticks() {
        assert_eq!(ms_to_ticks(1000), 1000);
        assert_eq!(ms_to_ticks(200), 200);
    }

    #[test]
    fn test_remaining() {
        assert_eq!(remaining(100, 150), 50);
        assert_eq!(remaining(150, 100), -50);
    }
}
