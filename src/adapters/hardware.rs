//! Hardware adapter: bridges real peripherals to domain port traits.
//!
//! Owns the [`BatteryReader`] and both LEDs, exposing them through
//! [`BatteryPort`] and [`LedPort`]. Generic over the pin, ADC and delay
//! types so the same adapter runs on ESP-IDF (raw GPIO, oneshot ADC,
//! FreeRTOS delay) and in host tests (mocks).

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;

use crate::app::ports::{BatteryPort, LedPort};
use crate::drivers::led::Led;
use crate::error::SensorError;
use crate::sensors::battery::{AdcChannel, BatteryReader, BatterySample};

/// Concrete adapter that combines all hardware behind port traits.
pub struct HardwareAdapter<A, E, U, S, D> {
    battery: BatteryReader<A, E>,
    user_led: Led<U>,
    status_led: Led<S>,
    delay: D,
}

impl<A, E, U, S, D> HardwareAdapter<A, E, U, S, D>
where
    A: AdcChannel,
    E: OutputPin,
    U: OutputPin,
    S: OutputPin,
    D: DelayNs,
{
    pub fn new(battery: BatteryReader<A, E>, user_led: U, status_led: S, delay: D) -> Self {
        Self {
            battery,
            user_led: Led::new(user_led, "user"),
            status_led: Led::new(status_led, "status"),
            delay,
        }
    }

    /// Everything off: LEDs dark, analog front-end unpowered.
    pub fn all_off(&mut self) {
        self.user_led.set(false);
        self.status_led.set(false);
        self.battery.power_down();
    }
}

// ── BatteryPort implementation ────────────────────────────────

impl<A, E, U, S, D> BatteryPort for HardwareAdapter<A, E, U, S, D>
where
    A: AdcChannel,
    E: OutputPin,
    D: DelayNs,
{
    fn sample(&mut self) -> Result<BatterySample, SensorError> {
        self.battery.sample(&mut self.delay)
    }

    fn last_percent(&self) -> u8 {
        self.battery.last_percent()
    }
}

// ── LedPort implementation ────────────────────────────────────

impl<A, E, U, S, D> LedPort for HardwareAdapter<A, E, U, S, D>
where
    U: OutputPin,
    S: OutputPin,
{
    fn set_user_led(&mut self, on: bool) {
        self.user_led.set(on);
    }

    fn user_led(&self) -> bool {
        self.user_led.is_on()
    }

    fn set_status_led(&mut self, on: bool) {
        if self.status_led.is_on() != on {
            self.status_led.set(on);
        }
    }
}
