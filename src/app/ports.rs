//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ AppService / Peripheral (domain)
//! ```
//!
//! Driven adapters (battery reader, LEDs, BLE host stack, event sinks)
//! implement these traits. The domain consumes them via generics, so it
//! never touches hardware directly and every transition can be exercised
//! on the host with mocks.

use crate::error::{CommsError, SensorError};
use crate::sensors::battery::BatterySample;

// ───────────────────────────────────────────────────────────────
// Battery port (driven adapter: hardware → domain)
// ───────────────────────────────────────────────────────────────

pub trait BatteryPort {
    /// Take one sample. Errors are transient; the caller keeps the last value.
    fn sample(&mut self) -> Result<BatterySample, SensorError>;

    /// Last good percent, or 0 before the first good sample.
    fn last_percent(&self) -> u8;
}

// ───────────────────────────────────────────────────────────────
// LED port (driven adapter: domain → hardware)
// ───────────────────────────────────────────────────────────────

pub trait LedPort {
    fn set_user_led(&mut self, on: bool);
    fn user_led(&self) -> bool;
    fn set_status_led(&mut self, on: bool);
}

// ───────────────────────────────────────────────────────────────
// GATT host port (driven adapter: domain → Bluetooth stack)
// ───────────────────────────────────────────────────────────────

/// Advertising interval bounds, 0.625 ms units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvertisingParams {
    pub interval_min: u16,
    pub interval_max: u16,
}

/// The requests the peripheral state machine issues to a BLE host stack.
///
/// Every call is asynchronous from the stack's point of view: completion
/// comes back later as a [`StackEvent`](super::peripheral::StackEvent).
/// An `Err` means the stack rejected the request outright.
pub trait GattHost {
    fn set_device_name(&mut self, name: &str) -> Result<(), CommsError>;

    /// Set the advertising payload: flags plus the 16-bit service UUID.
    fn configure_advertising(&mut self, service_uuid: u16) -> Result<(), CommsError>;

    fn create_service(&mut self, interface: u8, uuid: u16, num_handles: u16)
    -> Result<(), CommsError>;

    fn start_service(&mut self, service: u16) -> Result<(), CommsError>;

    /// Add a read + notify characteristic whose reads the stack answers
    /// from the stored attribute value.
    fn add_characteristic(&mut self, service: u16, uuid: u16, initial: &[u8])
    -> Result<(), CommsError>;

    /// Add a read + write descriptor to the last characteristic.
    fn add_descriptor(&mut self, service: u16, uuid: u16) -> Result<(), CommsError>;

    fn start_advertising(&mut self, params: AdvertisingParams) -> Result<(), CommsError>;

    /// Answer a write that asked for a response.
    fn send_response(
        &mut self,
        interface: u8,
        conn_id: u16,
        trans_id: u32,
        handle: u16,
        value: &[u8],
    ) -> Result<(), CommsError>;

    /// Update the value the stack serves for reads.
    fn set_attribute_value(&mut self, handle: u16, value: &[u8]) -> Result<(), CommsError>;

    fn notify(&mut self, interface: u8, conn_id: u16, handle: u16, value: &[u8])
    -> Result<(), CommsError>;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port. Adapters decide where they go.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}
