//! # blinkos Firmware
//!
//! The LaunchPad blinker on top of the blinkos kernel:
//!
//! | Task | Priority | Behavior |
//! |------|----------|----------|
//! | `rx` (consumer) | 2 | Waits for a message, lights blue for `500 ms × rate`, then red |
//! | `tx` (producer) | 1 | Sends the message every `1000 ms × rate` |
//!
//! SW2 multiplies the rate factor by 1.1 (slower), SW1 by 0.9 (faster);
//! presses within 200 ms of the previous edge are ignored.
//!
//! Built for the host, the binary runs the same system in the simulator for
//! a number of simulated seconds (first argument, default 10), pressing each
//! button once along the way. Set `RUST_LOG=debug` to see every wake-up.

#![cfg_attr(firmware, no_std)]
#![cfg_attr(firmware, no_main)]

#[cfg(firmware)]
use panic_halt as _;

// ---------------------------------------------------------------------------
// Firmware
// ---------------------------------------------------------------------------

#[cfg(firmware)]
mod firmware {
    use cortex_m_rt::entry;
    use log::error;
    use rtt_target::rtt_init;

    use blinkos::blink::{Consumer, Producer};
    use blinkos::board::{self, LedPin};
    use blinkos::config::BlinkConfig;
    use blinkos::led::StatusLed;
    use blinkos::sync::Shared;
    use blinkos::{kernel, logger};

    /// Handed from `main` to the consumer task.
    static STATUS_LED: Shared<StatusLed<LedPin, LedPin>> = Shared::new();

    /// Report a startup failure over RTT, then halt.
    fn fatal(message: core::fmt::Arguments<'_>) -> ! {
        error!("{}", message);
        panic!("{}", message);
    }

    extern "C" fn producer_task() -> ! {
        kernel::run_task(Producer::new(&kernel::config()))
    }

    extern "C" fn consumer_task() -> ! {
        let Some(led) = STATUS_LED.take() else {
            fatal(format_args!("status LED already taken"))
        };
        kernel::run_task(Consumer::new(&kernel::config(), led))
    }

    /// Firmware entry point. Brings up the board, creates the tasks and
    /// starts the scheduler. Does not return.
    #[entry]
    fn main() -> ! {
        let channels = rtt_init! {
            up: {
                0: {
                    size: 1024,
                    name: "Terminal"
                }
            }
        };
        logger::init(channels.up.0, log::LevelFilter::Info);

        let Some(cp) = cortex_m::Peripherals::take() else {
            fatal(format_args!("core peripherals already taken"))
        };
        let Some(dp) = tm4c123x::Peripherals::take() else {
            fatal(format_args!("device peripherals already taken"))
        };
        STATUS_LED.install(board::init(dp));

        if let Err(e) = kernel::init(BlinkConfig::default(), producer_task, consumer_task) {
            fatal(format_args!("failed to create the blink system: {}", e));
        }
        board::enable_button_interrupts();

        match kernel::start(cp) {
            Ok(never) => match never {},
            Err(e) => fatal(format_args!("scheduler failed to start: {}", e)),
        }
    }
}

// ---------------------------------------------------------------------------
// Host simulation
// ---------------------------------------------------------------------------

#[cfg(not(firmware))]
mod host {
    use embedded_hal::digital::{ErrorType, OutputPin};
    use log::{debug, info};

    use blinkos::config::BlinkConfig;
    use blinkos::led::StatusLed;
    use blinkos::sim::Simulator;
    use blinkos::time::Ticks;
    use blinkos::KernelError;

    /// An LED that reports its changes through the logger.
    pub struct ConsolePin {
        name: &'static str,
    }

    impl ErrorType for ConsolePin {
        type Error = core::convert::Infallible;
    }

    impl OutputPin for ConsolePin {
        fn set_low(&mut self) -> Result<(), Self::Error> {
            debug!("{} LED off", self.name);
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Self::Error> {
            debug!("{} LED on", self.name);
            Ok(())
        }
    }

    pub fn run(seconds: Ticks) -> Result<(), KernelError> {
        let config = BlinkConfig::default();
        let led = StatusLed::new(ConsolePin { name: "blue" }, ConsolePin { name: "red" });
        let mut sim = Simulator::new(config, led)?;
        let end = seconds.saturating_mul(1000);

        let presses = [
            (end / 4, config.increase_mask),
            (end / 2, config.decrease_mask),
        ];
        let mut last = sim.indicator();
        while sim.now() < end {
            for (at, mask) in presses {
                if sim.now() == at {
                    info!("tick {}: button {:#x} -> {:?}", at, mask, sim.raise(mask));
                }
            }

            sim.advance(1);
            let shown = sim.indicator();
            if shown != last {
                info!("tick {}: {:?} (rate {:.3})", sim.now(), shown, sim.rate());
                last = shown;
            }
        }

        info!(
            "{} ticks, {} context switches, final rate {:.3}",
            sim.now(),
            sim.scheduler().context_switches(),
            sim.rate()
        );

        // Both LEDs off on exit
        let (mut blue, mut red) = sim.into_led().release();
        let _ = blue.set_low();
        let _ = red.set_low();
        Ok(())
    }
}

#[cfg(not(firmware))]
fn main() -> Result<(), blinkos::KernelError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let seconds = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(10);
    host::run(seconds)
}
