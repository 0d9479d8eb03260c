//! # Rate Factor
//!
//! The shared speed multiplier. Written only by the button interrupt and read
//! by both tasks, so it lives in an atomic cell holding the `f32` bit pattern:
//! a reader always sees either the old or the new value, never a torn one.

use core::sync::atomic::{AtomicU32, Ordering};

pub struct RateFactor(AtomicU32);

impl RateFactor {
    pub const fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    #[inline]
    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Release);
    }

    /// Multiply the factor by `multiplier` and return the new value.
    ///
    /// Single writer: the load and the store are not one atomic step.
    pub fn apply(&self, multiplier: f32) -> f32 {
        let value = self.get() * multiplier;
        self.set(value);
        value
    }
}

impl core::fmt::Debug for RateFactor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("RateFactor").field(&self.get()).finish()
    }
}
