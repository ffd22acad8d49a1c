//! Application service: the hexagonal core.
//!
//! [`AppService`] owns the BLE [`Peripheral`] state machine, the button
//! action mapping, the status blink and the idle policy. All I/O flows
//! through port traits injected at call sites, so the whole service is
//! testable with mock adapters.
//!
//! ```text
//!  BatteryPort ──▶ ┌────────────────────────┐ ──▶ EventSink
//!                  │       AppService        │
//!     LedPort ◀──  │ Peripheral · Buttons    │ ──▶ GattHost
//!                  └────────────────────────┘
//! ```

use log::{debug, info, warn};

use crate::config::{ButtonAction, SystemConfig};
use crate::drivers::button::ButtonId;
use crate::drivers::led::BlinkPattern;
use crate::events::Event;
use crate::power::IdlePolicy;

use super::events::{AppEvent, TelemetryData};
use super::peripheral::{Peripheral, PeripheralState, StackEvent, StateChange};
use super::ports::{AdvertisingParams, BatteryPort, EventSink, GattHost, LedPort};

/// Nominal cell capacity used for the runtime estimate.
pub const BATTERY_CAPACITY_MAH: f32 = 300.0;
/// Radio + MCU + LED draw while awake.
pub const AWAKE_CURRENT_MA: f32 = 40.0 + 10.0 + 1.0;

/// Hours left at [`AWAKE_CURRENT_MA`] with `percent` of the capacity
/// remaining.
pub fn estimated_runtime_hours(percent: u8) -> f32 {
    f32::from(percent.min(100)) / 100.0 * BATTERY_CAPACITY_MAH / AWAKE_CURRENT_MA
}

pub struct AppService {
    peripheral: Peripheral,
    primary_action: ButtonAction,
    secondary_action: ButtonAction,
    blink: BlinkPattern,
    idle: IdlePolicy,
    button_activity: bool,
    samples: u32,
    failed_samples: u32,
}

impl AppService {
    pub fn new(config: &SystemConfig) -> Self {
        Self {
            peripheral: Peripheral::new(
                config.device_name.clone(),
                AdvertisingParams {
                    interval_min: config.adv_interval_min,
                    interval_max: config.adv_interval_max,
                },
            ),
            primary_action: config.primary_action,
            secondary_action: config.secondary_action,
            blink: BlinkPattern::new(config.status_blink_on_ms, config.status_blink_off_ms),
            idle: IdlePolicy::new(config.deep_sleep_idle_secs),
            button_activity: false,
            samples: 0,
            failed_samples: 0,
        }
    }

    pub fn peripheral(&self) -> &Peripheral {
        &self.peripheral
    }

    pub fn samples(&self) -> (u32, u32) {
        (self.samples, self.failed_samples)
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Take the initial sample so the characteristic is created with a
    /// real value, then announce the start.
    pub fn start(
        &mut self,
        hw: &mut impl BatteryPort,
        host: &mut impl GattHost,
        sink: &mut impl EventSink,
    ) {
        let percent = match hw.sample() {
            Ok(s) => s.percent,
            Err(e) => {
                warn!("Initial battery sample failed: {}", e);
                hw.last_percent()
            }
        };
        self.peripheral.publish_level(percent, host);
        sink.emit(&AppEvent::Started { percent });
        info!("AppService started (battery {}%)", percent);
    }

    // ── Event dispatch ────────────────────────────────────────

    /// Process one event drained from the timer/ISR queue.
    pub fn handle_event(
        &mut self,
        event: Event,
        hw: &mut (impl BatteryPort + LedPort),
        host: &mut impl GattHost,
        sink: &mut impl EventSink,
    ) {
        match event {
            Event::SampleTick => self.on_sample_tick(hw, host, sink),
            Event::PrimaryButton => self.on_button(self.primary_action, "primary", hw, sink),
            Event::SecondaryButton => self.on_button(self.secondary_action, "secondary", hw, sink),
        }
    }

    /// Feed one Bluetooth stack event into the peripheral.
    pub fn handle_stack_event(
        &mut self,
        event: StackEvent,
        host: &mut impl GattHost,
        sink: &mut impl EventSink,
    ) {
        if let Some(change) = self.peripheral.handle(event, host) {
            self.report_change(change, sink);
        }
    }

    /// Restart advertising if the last start attempt was lost.
    pub fn maintain_ble(&mut self, host: &mut impl GattHost, sink: &mut impl EventSink) {
        if let Some(change) = self.peripheral.ensure_advertising(host) {
            self.report_change(change, sink);
        }
    }

    fn report_change(&mut self, change: StateChange, sink: &mut impl EventSink) {
        if change.to == PeripheralState::Advertising {
            self.blink.reset();
        }
        sink.emit(&AppEvent::BleStateChanged {
            from: change.from,
            to: change.to,
        });
    }

    /// Polling button mode: sample every button through `pressed` and
    /// dispatch confirmed presses straight away.
    pub fn poll_buttons(
        &mut self,
        now_ms: u32,
        pressed: impl Fn(i32) -> bool,
        hw: &mut (impl BatteryPort + LedPort),
        host: &mut impl GattHost,
        sink: &mut impl EventSink,
    ) {
        for id in ButtonId::ALL {
            let ch = id.channel();
            if ch.poll(pressed(ch.gpio()), now_ms).is_some() {
                self.handle_event(id.event(), hw, host, sink);
            }
        }
    }

    /// Sample, publish the level, emit telemetry. A failed sample reuses
    /// the last good percent (0 before the first one).
    pub fn on_sample_tick(
        &mut self,
        hw: &mut (impl BatteryPort + LedPort),
        host: &mut impl GattHost,
        sink: &mut impl EventSink,
    ) {
        let (raw, millivolts, percent) = match hw.sample() {
            Ok(s) => {
                self.samples = self.samples.wrapping_add(1);
                debug!(
                    "Battery: ~{:.1} h left at {:.0} mA",
                    estimated_runtime_hours(s.percent),
                    AWAKE_CURRENT_MA
                );
                (s.raw, s.millivolts, s.percent)
            }
            Err(error) => {
                self.failed_samples = self.failed_samples.wrapping_add(1);
                let kept_percent = hw.last_percent();
                sink.emit(&AppEvent::SampleFailed {
                    error,
                    kept_percent,
                });
                (0, 0.0, kept_percent)
            }
        };

        let notify = self.peripheral.publish_level(percent, host);

        sink.emit(&AppEvent::Telemetry(TelemetryData {
            raw,
            millivolts,
            percent,
            ble: self.peripheral.state(),
            notify,
            user_led: hw.user_led(),
        }));
    }

    /// Apply a button's action to the user LED. Both buttons write the same
    /// LED; the later press wins.
    pub fn on_button(
        &mut self,
        action: ButtonAction,
        source: &'static str,
        hw: &mut impl LedPort,
        sink: &mut impl EventSink,
    ) {
        self.button_activity = true;
        let on = action.apply(hw.user_led());
        hw.set_user_led(on);
        sink.emit(&AppEvent::LedChanged { on, source });
    }

    // ── Per-iteration housekeeping ────────────────────────────

    /// Blink the status LED while advertising; keep it off otherwise.
    pub fn tick_status_led(&mut self, elapsed_ms: u32, hw: &mut impl LedPort) {
        let level = match self.peripheral.state() {
            PeripheralState::Advertising => self.blink.tick(elapsed_ms),
            _ => false,
        };
        hw.set_status_led(level);
    }

    /// Evaluate the idle policy. Returns `true` when the device should
    /// enter deep sleep.
    pub fn should_sleep(&mut self, now_ms: u32, sink: &mut impl EventSink) -> bool {
        let active = core::mem::take(&mut self.button_activity) || self.peripheral.is_connected();
        let sleep = self.idle.tick(now_ms, active);
        if sleep {
            sink.emit(&AppEvent::EnteringDeepSleep {
                idle_secs: self.idle.idle_secs(now_ms),
            });
        }
        sleep
    }
}
