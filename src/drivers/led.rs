//! Single-colour LED driver and the status blink pattern.
//!
//! ## Dual-target design
//!
//! [`Led`] wraps any `embedded_hal` output pin. On ESP-IDF that is
//! [`OutputGpio`](crate::drivers::hw_init::OutputGpio) driving a raw GPIO;
//! on host/test it is a mock that records the level.

use embedded_hal::digital::OutputPin;
use log::warn;

pub struct Led<P> {
    pin: P,
    on: bool,
    name: &'static str,
}

impl<P: OutputPin> Led<P> {
    /// Wrap a pin and drive it low.
    pub fn new(mut pin: P, name: &'static str) -> Self {
        if pin.set_low().is_err() {
            warn!("LED {}: initial set_low failed", name);
        }
        Self {
            pin,
            on: false,
            name,
        }
    }

    pub fn set(&mut self, on: bool) {
        let res = if on {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        match res {
            Ok(()) => self.on = on,
            Err(_) => warn!("LED {}: pin write failed", self.name),
        }
    }

    pub fn toggle(&mut self) {
        self.set(!self.on);
    }

    pub fn is_on(&self) -> bool {
        self.on
    }
}

/// Square-wave blink generator. The main loop advances it by the loop
/// period and writes the returned level to the LED.
#[derive(Debug, Clone)]
pub struct BlinkPattern {
    on_ms: u32,
    off_ms: u32,
    phase_ms: u64,
}

impl BlinkPattern {
    pub fn new(on_ms: u32, off_ms: u32) -> Self {
        Self {
            on_ms: on_ms.max(1),
            off_ms: off_ms.max(1),
            phase_ms: 0,
        }
    }

    /// Advance by `elapsed_ms` and return the LED level for the new phase.
    pub fn tick(&mut self, elapsed_ms: u32) -> bool {
        let period = u64::from(self.on_ms) + u64::from(self.off_ms);
        self.phase_ms = (self.phase_ms + u64::from(elapsed_ms)) % period;
        self.level()
    }

    /// LED level for the current phase: on for the first `on_ms` of
    /// every period.
    pub fn level(&self) -> bool {
        self.phase_ms < u64::from(self.on_ms)
    }

    pub fn reset(&mut self) {
        self.phase_ms = 0;
    }
}
