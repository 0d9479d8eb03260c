//! # Status LED
//!
//! Two-colour indicator driven by the consumer task. On the LaunchPad the
//! blue LED marks the active phase and the red LED the inactive one.

use embedded_hal::digital::OutputPin;
use log::warn;

/// What the indicator currently shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indicator {
    /// Nothing shown yet.
    Off,
    Active,
    Inactive,
}

pub struct StatusLed<A, I> {
    active: A,
    inactive: I,
    shown: Indicator,
}

impl<A: OutputPin, I: OutputPin> StatusLed<A, I> {
    pub fn new(active: A, inactive: I) -> Self {
        Self {
            active,
            inactive,
            shown: Indicator::Off,
        }
    }

    pub fn show_active(&mut self) {
        if let Err(e) = self.inactive.set_low() {
            warn!("inactive LED: {:?}", e);
        }
        if let Err(e) = self.active.set_high() {
            warn!("active LED: {:?}", e);
        }
        self.shown = Indicator::Active;
    }

    pub fn show_inactive(&mut self) {
        if let Err(e) = self.active.set_low() {
            warn!("active LED: {:?}", e);
        }
        if let Err(e) = self.inactive.set_high() {
            warn!("inactive LED: {:?}", e);
        }
        self.shown = Indicator::Inactive;
    }

    #[inline]
    pub fn shown(&self) -> Indicator {
        self.shown
    }

    /// Give the pins back.
    pub fn release(self) -> (A, I) {
        (self.active, self.inactive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal_mock::eh1::digital::{Mock as PinMock, State, Transaction};

    #[test]
    fn test_active_then_inactive() {
        let blue = PinMock::new(&[
            Transaction::set(State::High),
            Transaction::set(State::Low),
        ]);
        let red = PinMock::new(&[
            Transaction::set(State::Low),
            Transaction::set(State::High),
        ]);

        let mut led = StatusLed::new(blue, red);
        assert_eq!(led.shown(), Indicator::Off);
        led.show_active();
        assert_eq!(led.shown(), Indicator::Active);
        led.show_inactive();
        assert_eq!(led.shown(), Indicator::Inactive);

        let (mut blue, mut red) = led.release();
        blue.done();
        red.done();
    }
}
