//! System configuration parameters
//!
//! All tunable parameters for the battery firmware. The source sketches
//! disagreed on several of these (divider factor, percent formula,
//! reference voltage); the defaults below are the deliberate choice and
//! every variation is expressed as a value here rather than a code path.

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// How button presses are detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ButtonMode {
    /// Falling-edge interrupt arms a one-shot timer; the timer re-checks
    /// the pin level before committing the press.
    Interrupt,
    /// Main loop samples the pin level every iteration.
    Polling,
}

/// What a debounced press does to the user LED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ButtonAction {
    Toggle,
    On,
    Off,
}

impl ButtonAction {
    /// Apply the action to the current LED level.
    pub fn apply(self, led_on: bool) -> bool {
        match self {
            Self::Toggle => !led_on,
            Self::On => true,
            Self::Off => false,
        }
    }
}

/// Core system configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    // --- Battery curve ---
    /// Battery voltage reported as 0 %.
    pub empty_mv: f32,
    /// Battery voltage reported as 100 %.
    pub full_mv: f32,
    /// Resistive divider compensation (measured × factor = battery voltage).
    pub divider_factor: f32,

    // --- ADC ---
    /// Full-scale voltage assumed when no calibration curve is available.
    pub fallback_reference_mv: f32,
    /// Highest raw code at the configured bit width.
    pub adc_max_code: u16,
    /// Try to create the factory calibration curve at start-up.
    pub use_calibration: bool,
    /// Settling time after raising the front-end enable pin.
    pub adc_settle_ms: u32,
    /// Drop the front-end enable pin again after each conversion.
    pub gate_frontend: bool,

    // --- Buttons ---
    /// Quiescent window between accepted presses on one channel.
    pub debounce_ms: u32,
    pub button_mode: ButtonMode,
    pub primary_action: ButtonAction,
    pub secondary_action: ButtonAction,

    // --- Timing ---
    /// Main loop period (milliseconds).
    pub loop_interval_ms: u32,
    /// Battery sample + notification period (milliseconds).
    pub sample_interval_ms: u32,
    /// Task watchdog timeout (milliseconds).
    pub watchdog_timeout_ms: u32,

    // --- BLE ---
    pub device_name: heapless::String<24>,
    /// Advertising interval bounds in 0.625 ms units.
    pub adv_interval_min: u16,
    pub adv_interval_max: u16,

    // --- Status LED ---
    pub status_blink_on_ms: u32,
    pub status_blink_off_ms: u32,

    // --- Power ---
    /// Enter deep sleep after this long without a client or button press.
    /// `0` disables deep sleep.
    pub deep_sleep_idle_secs: u32,
    /// Timer wake-up after entering deep sleep.
    pub deep_sleep_wake_secs: u32,
}

impl Default for SystemConfig {
    fn default() -> Self {
        let mut device_name = heapless::String::new();
        let _ = device_name.push_str("ESP32-Battery");

        Self {
            // Battery curve (single Li-ion cell)
            empty_mv: 3000.0,
            full_mv: 4200.0,
            divider_factor: 2.0,

            // ADC (12-bit, 12 dB attenuation)
            fallback_reference_mv: 3300.0,
            adc_max_code: 4095,
            use_calibration: true,
            adc_settle_ms: 10,
            gate_frontend: true,

            // Buttons
            debounce_ms: 50,
            button_mode: ButtonMode::Interrupt,
            primary_action: ButtonAction::Toggle,
            secondary_action: ButtonAction::Off,

            // Timing
            loop_interval_ms: 100,    // 10 Hz
            sample_interval_ms: 5000, // every 5 s
            watchdog_timeout_ms: 10_000,

            // BLE
            device_name,
            adv_interval_min: 0x20, // 20 ms
            adv_interval_max: 0x40, // 40 ms

            // Status LED
            status_blink_on_ms: 100,
            status_blink_off_ms: 200,

            // Power
            deep_sleep_idle_secs: 0,
            deep_sleep_wake_secs: 60,
        }
    }
}

/// Upper bound for either half of the status blink.
pub const MAX_BLINK_MS: u32 = 60_000;

impl SystemConfig {
    /// Range-check every field. Called once at boot before any driver
    /// consumes the configuration.
    pub fn validate(&self) -> Result<(), Error> {
        if !(self.empty_mv >= 0.0 && self.full_mv > self.empty_mv) {
            return Err(Error::Config("full_mv must be above empty_mv (both >= 0)"));
        }
        if !(self.divider_factor > 0.0 && self.divider_factor.is_finite()) {
            return Err(Error::Config("divider_factor must be a positive number"));
        }
        if !(self.fallback_reference_mv > 0.0) || self.adc_max_code == 0 {
            return Err(Error::Config("fallback ADC scale must be non-zero"));
        }
        if self.debounce_ms == 0 {
            return Err(Error::Config("debounce_ms must be > 0"));
        }
        if self.loop_interval_ms == 0 || self.sample_interval_ms < self.loop_interval_ms {
            return Err(Error::Config("sample_interval_ms must be >= loop_interval_ms > 0"));
        }
        if self.watchdog_timeout_ms <= self.loop_interval_ms {
            return Err(Error::Config("watchdog_timeout_ms must exceed loop_interval_ms"));
        }
        if self.device_name.is_empty() {
            return Err(Error::Config("device_name must not be empty"));
        }
        if self.adv_interval_min < 0x20 || self.adv_interval_max < self.adv_interval_min {
            return Err(Error::Config("advertising interval must be 0x20 <= min <= max"));
        }
        if !(1..=MAX_BLINK_MS).contains(&self.status_blink_on_ms)
            || !(1..=MAX_BLINK_MS).contains(&self.status_blink_off_ms)
        {
            return Err(Error::Config("status blink periods must be 1..=60000 ms"));
        }
        Ok(())
    }
}
