//! # Synchronization Primitives
//!
//! Interrupt-safe critical section abstractions. All shared kernel state must
//! be accessed within a critical section to prevent data races between the
//! tasks and the interrupt handlers.
//!
//! The implementation comes from the `critical-section` crate: on the target
//! `cortex-m` provides the single-core PRIMASK implementation, and host tests
//! use the `std` one.

use core::cell::RefCell;

use critical_section::{CriticalSection, Mutex};

/// Execute a closure within a critical section (interrupts disabled).
///
/// Keep critical sections as short as possible to minimize interrupt latency.
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(CriticalSection<'_>) -> R,
{
    ::critical_section::with(f)
}

/// A value created at start-up and then shared between tasks and interrupt
/// handlers. Empty until [`install`](Self::install) is called.
pub struct Shared<T>(Mutex<RefCell<Option<T>>>);

impl<T> Shared<T> {
    pub const fn new() -> Self {
        Self(Mutex::new(RefCell::new(None)))
    }

    /// Store `value`, returning the previous one if any.
    pub fn install(&self, value: T) -> Option<T> {
        critical_section(|cs| self.0.borrow_ref_mut(cs).replace(value))
    }

    /// Remove and return the value.
    pub fn take(&self) -> Option<T> {
        critical_section(|cs| self.0.borrow_ref_mut(cs).take())
    }

    /// Run `f` on the value inside a critical section. Returns `None` if
    /// nothing has been installed yet.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        critical_section(|cs| self.0.borrow_ref_mut(cs).as_mut().map(f))
    }

    /// Like [`with`](Self::with), for callers already inside a critical
    /// section.
    pub fn with_cs<R>(&self, cs: CriticalSection<'_>, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.0.borrow_ref_mut(cs).as_mut().map(f)
    }
}

impl<T> Default for Shared<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_until_installed() {
        let shared: Shared<u32> = Shared::new();
        assert_eq!(shared.with(|v| *v), None);
        assert_eq!(shared.install(5), None);
        assert_eq!(shared.with(|v| {
            *v += 1;
            *v
        }), Some(6));
        assert_eq!(shared.install(1), Some(6));
        assert_eq!(shared.take(), Some(1));
        assert_eq!(shared.take(), None);
    }

    #[test]
    fn test_with_cs_inside_critical_section() {
        static COUNTER: Shared<u32> = Shared::new();
        COUNTER.install(0);
        critical_section(|cs| {
            COUNTER.with_cs(cs, |v| *v = 41);
            COUNTER.with_cs(cs, |v| *v += 1);
        });
        assert_eq!(COUNTER.with(|v| *v), Some(42));
    }
}
