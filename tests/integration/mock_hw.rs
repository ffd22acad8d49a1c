//! Mock adapters for integration tests.
//!
//! Records every GATT request so tests can assert on the full call
//! history without a Bluetooth stack.

use core::convert::Infallible;
use std::cell::Cell;
use std::rc::Rc;

use battery_ble::app::events::AppEvent;
use battery_ble::app::peripheral::{GattWrite, StackEvent};
use battery_ble::app::ports::{AdvertisingParams, EventSink, GattHost};
use battery_ble::error::{CommsError, SensorError};
use battery_ble::sensors::AdcChannel;

// ── GATT call record ──────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum GattCall {
    SetName(String),
    ConfigureAdvertising(u16),
    CreateService { interface: u8, uuid: u16, handles: u16 },
    StartService(u16),
    AddCharacteristic { service: u16, uuid: u16, initial: Vec<u8> },
    AddDescriptor { service: u16, uuid: u16 },
    StartAdvertising,
    Response { conn_id: u16, trans_id: u32 },
    SetValue { handle: u16, value: Vec<u8> },
    Notify { conn_id: u16, handle: u16, value: Vec<u8> },
}

#[derive(Default)]
pub struct MockGattHost {
    pub calls: Vec<GattCall>,
    pub fail_notify: bool,
    pub fail_start_service: bool,
    /// Number of upcoming `start_advertising` requests to reject.
    pub fail_advertising: u32,
}

#[allow(dead_code)]
impl MockGattHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<u8> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                GattCall::Notify { value, .. } => value.first().copied(),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&GattCall) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }
}

impl GattHost for MockGattHost {
    fn set_device_name(&mut self, name: &str) -> Result<(), CommsError> {
        self.calls.push(GattCall::SetName(name.to_owned()));
        Ok(())
    }
    fn configure_advertising(&mut self, service_uuid: u16) -> Result<(), CommsError> {
        self.calls.push(GattCall::ConfigureAdvertising(service_uuid));
        Ok(())
    }
    fn create_service(&mut self, interface: u8, uuid: u16, num_handles: u16) -> Result<(), CommsError> {
        self.calls.push(GattCall::CreateService {
            interface,
            uuid,
            handles: num_handles,
        });
        Ok(())
    }
    fn start_service(&mut self, service: u16) -> Result<(), CommsError> {
        self.calls.push(GattCall::StartService(service));
        if self.fail_start_service {
            return Err(CommsError::GattRequestFailed(0x103));
        }
        Ok(())
    }
    fn add_characteristic(&mut self, service: u16, uuid: u16, initial: &[u8]) -> Result<(), CommsError> {
        self.calls.push(GattCall::AddCharacteristic {
            service,
            uuid,
            initial: initial.to_vec(),
        });
        Ok(())
    }
    fn add_descriptor(&mut self, service: u16, uuid: u16) -> Result<(), CommsError> {
        self.calls.push(GattCall::AddDescriptor { service, uuid });
        Ok(())
    }
    fn start_advertising(&mut self, _params: AdvertisingParams) -> Result<(), CommsError> {
        self.calls.push(GattCall::StartAdvertising);
        if self.fail_advertising > 0 {
            self.fail_advertising -= 1;
            return Err(CommsError::GattRequestFailed(0x103));
        }
        Ok(())
    }
    fn send_response(&mut self, _interface: u8, conn_id: u16, trans_id: u32, _handle: u16, _value: &[u8]) -> Result<(), CommsError> {
        self.calls.push(GattCall::Response { conn_id, trans_id });
        Ok(())
    }
    fn set_attribute_value(&mut self, handle: u16, value: &[u8]) -> Result<(), CommsError> {
        self.calls.push(GattCall::SetValue {
            handle,
            value: value.to_vec(),
        });
        Ok(())
    }
    fn notify(&mut self, _interface: u8, conn_id: u16, handle: u16, value: &[u8]) -> Result<(), CommsError> {
        if self.fail_notify {
            return Err(CommsError::NotifyFailed(-1));
        }
        self.calls.push(GattCall::Notify {
            conn_id,
            handle,
            value: value.to_vec(),
        });
        Ok(())
    }
}

// ── Stack event helpers ───────────────────────────────────────

pub const SERVICE: u16 = 40;
pub const CHAR: u16 = 42;
pub const CCCD: u16 = 43;

/// The completion sequence Bluedroid delivers for a normal bring-up.
pub fn bring_up_events() -> Vec<StackEvent> {
    vec![
        StackEvent::Registered { interface: 3 },
        StackEvent::AdvertisingDataSet,
        StackEvent::ServiceCreated { service: SERVICE },
        StackEvent::AdvertisingStarted { ok: true },
        StackEvent::CharacteristicAdded { handle: CHAR },
        StackEvent::DescriptorAdded { handle: CCCD },
    ]
}

#[allow(dead_code)]
pub fn cccd_write(conn_id: u16, value: &[u8]) -> StackEvent {
    let mut v = heapless::Vec::new();
    v.extend_from_slice(value).unwrap();
    StackEvent::Write(GattWrite {
        conn_id,
        trans_id: 9,
        handle: CCCD,
        need_rsp: true,
        value: v,
    })
}

// ── Hardware mocks ────────────────────────────────────────────

/// ADC returning a shared raw code; `None` makes the read fail.
pub struct MockAdc {
    pub raw: Rc<Cell<Option<u16>>>,
}

impl AdcChannel for MockAdc {
    fn read_raw(&mut self) -> Result<u16, SensorError> {
        self.raw.get().ok_or(SensorError::AdcReadFailed(-1))
    }
    fn has_calibration(&self) -> bool {
        false
    }
    fn calibrated_mv(&self, _raw: u16) -> Option<u32> {
        None
    }
}

/// Output pin whose level is observable from the test.
#[derive(Clone, Default)]
pub struct MockPin(pub Rc<Cell<bool>>);

impl embedded_hal::digital::ErrorType for MockPin {
    type Error = Infallible;
}

impl embedded_hal::digital::OutputPin for MockPin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.0.set(false);
        Ok(())
    }
    fn set_high(&mut self) -> Result<(), Infallible> {
        self.0.set(true);
        Ok(())
    }
}

pub struct NoDelay;

impl embedded_hal::delay::DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

// ── Recording sink ────────────────────────────────────────────

#[derive(Default)]
pub struct LogSink {
    pub events: Vec<AppEvent>,
}

impl EventSink for LogSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}
