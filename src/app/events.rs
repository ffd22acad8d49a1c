//! Outbound application events.
//!
//! The [`AppService`](super::service::AppService) emits these through the
//! [`EventSink`](super::ports::EventSink) port. Adapters on the other
//! side decide what to do with them.

use super::peripheral::{NotifyOutcome, PeripheralState};
use crate::error::SensorError;

/// Structured events emitted by the application core.
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// One sampling cycle finished.
    Telemetry(TelemetryData),

    /// A sample failed; the previous percent was reused.
    SampleFailed { error: SensorError, kept_percent: u8 },

    /// The user LED was switched by a button press.
    LedChanged { on: bool, source: &'static str },

    /// The BLE peripheral moved between states.
    BleStateChanged { from: PeripheralState, to: PeripheralState },

    /// The service has started.
    Started { percent: u8 },

    /// The idle policy decided to power down.
    EnteringDeepSleep { idle_secs: u32 },
}

/// A point-in-time telemetry snapshot suitable for logging.
#[derive(Debug, Clone)]
pub struct TelemetryData {
    pub raw: u16,
    pub millivolts: f32,
    pub percent: u8,
    pub ble: PeripheralState,
    pub notify: NotifyOutcome,
    pub user_led: bool,
}
