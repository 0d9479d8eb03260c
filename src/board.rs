//! # EK-TM4C123GXL Board Support
//!
//! Port F of the TM4C123GH6PM carries everything the application needs:
//!
//! | Pin | Function |
//! |-----|----------|
//! | PF0 | SW2, slows the cycle down (locked pin, needs the commit unlock) |
//! | PF1 | Red LED, inactive indicator |
//! | PF2 | Blue LED, active indicator |
//! | PF4 | SW1, speeds the cycle up |
//!
//! Both switches pull the line low when pressed, so they are configured
//! with pull-ups and falling-edge interrupts.

use cortex_m::peripheral::NVIC;
use embedded_hal::digital::{ErrorType, OutputPin};
use tm4c123x::{interrupt, Interrupt, GPIO_PORTF};

use crate::buttons::EdgeSource;
use crate::kernel;
use crate::led::StatusLed;
use crate::sync::{self, Shared};

/// Bit of Port F in the SYSCTL run-mode gating and ready registers.
const PORT_F: u32 = 1 << 5;

const GPIO_LOCK_KEY: u32 = 0x4C4F_434B;

const PIN_RED: u32 = 1 << 1;
const PIN_BLUE: u32 = 1 << 2;

/// Switch lines, matching the default `BlinkConfig` masks.
pub const BUTTON_LINES: u32 = (1 << 0) | (1 << 4);

// ---------------------------------------------------------------------------
// LEDs
// ---------------------------------------------------------------------------

/// One LED on Port F.
pub struct LedPin {
    mask: u32,
}

impl LedPin {
    fn write(&mut self, on: bool) {
        // SAFETY: the DATA register is only touched here, and every
        // read-modify-write happens inside a critical section.
        let port = unsafe { &*GPIO_PORTF::ptr() };
        let mask = self.mask;
        sync::critical_section(|_| {
            port.data.modify(|r, w| {
                let bits = if on { r.bits() | mask } else { r.bits() & !mask };
                unsafe { w.bits(bits) }
            });
        });
    }
}

impl ErrorType for LedPin {
    type Error = core::convert::Infallible;
}

impl OutputPin for LedPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.write(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.write(true);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Buttons
// ---------------------------------------------------------------------------

/// The switch interrupt lines of Port F. Owns the port once bring-up is
/// done; the LEDs only reach its DATA register.
pub struct ButtonLines {
    port: GPIO_PORTF,
    mask: u32,
}

impl EdgeSource for ButtonLines {
    fn take_pending(&mut self) -> u32 {
        let status = self.port.mis.read().bits() & self.mask;
        // Write-one-to-clear
        self.port.icr.write(|w| unsafe { w.bits(status) });
        status
    }
}

static BUTTONS: Shared<ButtonLines> = Shared::new();

// ---------------------------------------------------------------------------
// Bring-up
// ---------------------------------------------------------------------------

/// Configure Port F and return the status LED. The switch lines are handed
/// to the `GPIOF` interrupt; call [`enable_button_interrupts`] once the
/// kernel is initialised.
pub fn init(dp: tm4c123x::Peripherals) -> StatusLed<LedPin, LedPin> {
    let leds = PIN_RED | PIN_BLUE;
    let sysctl = dp.SYSCTL;
    let port = dp.GPIO_PORTF;

    sysctl
        .rcgcgpio
        .modify(|r, w| unsafe { w.bits(r.bits() | PORT_F) });
    while sysctl.prgpio.read().bits() & PORT_F == 0 {}

    // PF0 is an NMI-capable pin and locked out of reset
    port.lock.write(|w| unsafe { w.bits(GPIO_LOCK_KEY) });
    port.cr.modify(|r, w| unsafe { w.bits(r.bits() | BUTTON_LINES) });
    port.lock.write(|w| unsafe { w.bits(0) });

    port.dir
        .modify(|r, w| unsafe { w.bits((r.bits() & !BUTTON_LINES) | leds) });
    port.pur.modify(|r, w| unsafe { w.bits(r.bits() | BUTTON_LINES) });
    port.den
        .modify(|r, w| unsafe { w.bits(r.bits() | BUTTON_LINES | leds) });

    // Edge-sensitive, single edge, falling
    port.is.modify(|r, w| unsafe { w.bits(r.bits() & !BUTTON_LINES) });
    port.ibe.modify(|r, w| unsafe { w.bits(r.bits() & !BUTTON_LINES) });
    port.iev.modify(|r, w| unsafe { w.bits(r.bits() & !BUTTON_LINES) });
    port.icr.write(|w| unsafe { w.bits(BUTTON_LINES) });
    port.im.modify(|r, w| unsafe { w.bits(r.bits() | BUTTON_LINES) });

    BUTTONS.install(ButtonLines {
        port,
        mask: BUTTON_LINES,
    });

    StatusLed::new(LedPin { mask: PIN_BLUE }, LedPin { mask: PIN_RED })
}

pub fn enable_button_interrupts() {
    // SAFETY: the handler only takes critical sections; it does not rely on
    // interrupt masking for soundness.
    unsafe { NVIC::unmask(Interrupt::GPIOF) };
}

#[interrupt]
fn GPIOF() {
    BUTTONS.with(|lines| kernel::service_buttons(lines));
}
