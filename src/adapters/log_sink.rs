//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the ESP-IDF logger (UART / USB-CDC in production).

use log::{info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] to the serial console.
#[derive(Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Telemetry(t) => {
                info!(
                    "TELEM | raw={} | {:.0}mV | {}% | ble={:?} notify={:?} | led={}",
                    t.raw,
                    t.millivolts,
                    t.percent,
                    t.ble,
                    t.notify,
                    if t.user_led { "ON" } else { "OFF" },
                );
            }
            AppEvent::SampleFailed {
                error,
                kept_percent,
            } => {
                warn!("TELEM | sample failed ({}), keeping {}%", error, kept_percent);
            }
            AppEvent::LedChanged { on, source } => {
                info!("LED | user {} ({})", if *on { "ON" } else { "OFF" }, source);
            }
            AppEvent::BleStateChanged { from, to } => {
                info!("BLE | {:?} -> {:?}", from, to);
            }
            AppEvent::Started { percent } => {
                info!("START | battery={}%", percent);
            }
            AppEvent::EnteringDeepSleep { idle_secs } => {
                info!("POWER | idle {}s, entering deep sleep", idle_secs);
            }
        }
    }
}
