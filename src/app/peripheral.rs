//! Battery Service peripheral state machine.
//!
//! Stack-independent: the Bluetooth host (Bluedroid on target, a mock in
//! tests) reports completions and link events as [`StackEvent`]s, and the
//! machine answers through the [`GattHost`] port. One handler per
//! transition:
//!
//! ```text
//! Unregistered ─Registered─▶ Registered ─ServiceCreated─▶ ServiceCreated
//!   ─CharacteristicAdded─▶ CharacteristicAdded ─DescriptorAdded─▶ DescriptorAdded
//!   ─AdvertisingDataSet─▶ Advertising ◀─Disconnected── Connected
//!                              └──────────Connected──────────▶┘
//! ```
//!
//! Events that arrive in the wrong state are logged and dropped. A failed
//! advertising start leaves the machine in `DescriptorAdded` until
//! [`Peripheral::ensure_advertising`] gets the controller going again. A
//! rejected service-table request moves it to `Failed`, which is terminal.

use log::{debug, error, info, warn};

use super::ports::{AdvertisingParams, GattHost};
use crate::error::CommsError;

/// Battery Service.
pub const BATTERY_SERVICE_UUID: u16 = 0x180F;
/// Battery Level characteristic (1 byte, 0–100).
pub const BATTERY_LEVEL_UUID: u16 = 0x2A19;
/// Client Characteristic Configuration descriptor.
pub const CCCD_UUID: u16 = 0x2902;
/// Service declaration + characteristic declaration + value + CCCD.
pub const SERVICE_NUM_HANDLES: u16 = 4;
/// CCCD value that enables notifications.
pub const CCCD_NOTIFY: u16 = 0x0001;

/// Largest write payload carried in a [`StackEvent::Write`]. Longer writes
/// are truncated; they can never be a valid CCCD write anyway.
pub const MAX_WRITE_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeripheralState {
    Unregistered,
    Registered,
    ServiceCreated,
    CharacteristicAdded,
    DescriptorAdded,
    Advertising,
    Connected,
    /// A service-table request was rejected; see [`Peripheral::fault`].
    Failed,
}

/// Link and attribute bookkeeping. Handles survive a disconnect; the
/// connection fields do not.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeripheralSession {
    pub connected: bool,
    pub notifications_enabled: bool,
    pub conn_id: u16,
    pub interface: u8,
    pub characteristic_handle: u16,
    pub descriptor_handle: u16,
}

impl PeripheralSession {
    fn end_connection(&mut self) {
        self.connected = false;
        self.notifications_enabled = false;
        self.conn_id = 0;
    }
}

/// A client write, copied out of the stack's callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattWrite {
    pub conn_id: u16,
    pub trans_id: u32,
    pub handle: u16,
    pub need_rsp: bool,
    pub value: heapless::Vec<u8, MAX_WRITE_LEN>,
}

/// Completions and link events reported by the host stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackEvent {
    Registered { interface: u8 },
    ServiceCreated { service: u16 },
    CharacteristicAdded { handle: u16 },
    DescriptorAdded { handle: u16 },
    AdvertisingDataSet,
    AdvertisingStarted { ok: bool },
    Connected { conn_id: u16, interface: u8 },
    Disconnected { reason: u16 },
    Write(GattWrite),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    pub from: PeripheralState,
    pub to: PeripheralState,
}

/// Result of [`Peripheral::publish_level`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOutcome {
    Sent,
    NotConnected,
    NotSubscribed,
    Failed(CommsError),
}

pub struct Peripheral {
    state: PeripheralState,
    session: PeripheralSession,
    service_handle: u16,
    advertising_requested: bool,
    adv_data_ready: bool,
    fault: Option<CommsError>,
    device_name: heapless::String<24>,
    adv: AdvertisingParams,
    level: u8,
}

impl Peripheral {
    pub fn new(device_name: heapless::String<24>, adv: AdvertisingParams) -> Self {
        Self {
            state: PeripheralState::Unregistered,
            session: PeripheralSession::default(),
            service_handle: 0,
            advertising_requested: false,
            adv_data_ready: false,
            fault: None,
            device_name,
            adv,
            level: 0,
        }
    }

    pub fn state(&self) -> PeripheralState {
        self.state
    }

    pub fn session(&self) -> &PeripheralSession {
        &self.session
    }

    pub fn is_connected(&self) -> bool {
        self.state == PeripheralState::Connected
    }

    pub fn notifications_enabled(&self) -> bool {
        self.session.notifications_enabled
    }

    /// The request that put the machine in `Failed`, if any.
    pub fn fault(&self) -> Option<CommsError> {
        self.fault
    }

    /// Last published battery level.
    pub fn level(&self) -> u8 {
        self.level
    }

    /// Feed one stack event through the machine.
    pub fn handle(&mut self, event: StackEvent, host: &mut impl GattHost) -> Option<StateChange> {
        let from = self.state;
        if from == PeripheralState::Failed {
            self.out_of_order("event");
            return None;
        }
        match event {
            StackEvent::Registered { interface } => self.on_registered(interface, host),
            StackEvent::ServiceCreated { service } => self.on_service_created(service, host),
            StackEvent::CharacteristicAdded { handle } => self.on_characteristic_added(handle, host),
            StackEvent::DescriptorAdded { handle } => self.on_descriptor_added(handle),
            StackEvent::AdvertisingDataSet => self.on_advertising_data_set(host),
            StackEvent::AdvertisingStarted { ok } => self.on_advertising_started(ok),
            StackEvent::Connected { conn_id, interface } => self.on_connected(conn_id, interface),
            StackEvent::Disconnected { reason } => self.on_disconnected(reason, host),
            StackEvent::Write(write) => self.on_write(&write, host),
        }
        (self.state != from).then_some(StateChange {
            from,
            to: self.state,
        })
    }

    fn out_of_order(&self, event: &str) {
        warn!("BLE: {} ignored in state {:?}", event, self.state);
    }

    /// The stack will never send the completion we are waiting for.
    fn fail(&mut self, request: &str, e: CommsError) {
        error!("BLE: {} failed: {}", request, e);
        self.fault = Some(e);
        self.advertising_requested = false;
        self.state = PeripheralState::Failed;
    }

    fn on_registered(&mut self, interface: u8, host: &mut impl GattHost) {
        if self.state != PeripheralState::Unregistered {
            return self.out_of_order("Registered");
        }
        self.session.interface = interface;
        if let Err(e) = host.set_device_name(&self.device_name) {
            warn!("BLE: set device name failed: {}", e);
        }
        if let Err(e) = host.configure_advertising(BATTERY_SERVICE_UUID) {
            return self.fail("advertising data", e);
        }
        if let Err(e) = host.create_service(interface, BATTERY_SERVICE_UUID, SERVICE_NUM_HANDLES) {
            return self.fail("create service", e);
        }
        self.state = PeripheralState::Registered;
    }

    fn on_service_created(&mut self, service: u16, host: &mut impl GattHost) {
        if self.state != PeripheralState::Registered {
            return self.out_of_order("ServiceCreated");
        }
        self.service_handle = service;
        if let Err(e) = host.start_service(service) {
            return self.fail("start service", e);
        }
        if let Err(e) = host.add_characteristic(service, BATTERY_LEVEL_UUID, &[self.level]) {
            return self.fail("add characteristic", e);
        }
        self.state = PeripheralState::ServiceCreated;
    }

    fn on_characteristic_added(&mut self, handle: u16, host: &mut impl GattHost) {
        if self.state != PeripheralState::ServiceCreated {
            return self.out_of_order("CharacteristicAdded");
        }
        self.session.characteristic_handle = handle;
        if let Err(e) = host.add_descriptor(self.service_handle, CCCD_UUID) {
            return self.fail("add descriptor", e);
        }
        self.state = PeripheralState::CharacteristicAdded;
    }

    fn on_descriptor_added(&mut self, handle: u16) {
        if self.state != PeripheralState::CharacteristicAdded {
            return self.out_of_order("DescriptorAdded");
        }
        self.session.descriptor_handle = handle;
        self.state = if self.advertising_requested {
            PeripheralState::Advertising
        } else {
            PeripheralState::DescriptorAdded
        };
    }

    fn on_advertising_data_set(&mut self, host: &mut impl GattHost) {
        if matches!(
            self.state,
            PeripheralState::Unregistered | PeripheralState::Connected
        ) {
            return self.out_of_order("AdvertisingDataSet");
        }
        self.adv_data_ready = true;
        self.request_advertising(host);
        if self.state == PeripheralState::DescriptorAdded && self.advertising_requested {
            self.state = PeripheralState::Advertising;
        }
    }

    fn on_advertising_started(&mut self, ok: bool) {
        if ok {
            info!("BLE: advertising as '{}'", self.device_name);
            return;
        }
        warn!("BLE: advertising start failed");
        self.advertising_requested = false;
        if self.state == PeripheralState::Advertising {
            self.state = PeripheralState::DescriptorAdded;
        }
    }

    fn on_connected(&mut self, conn_id: u16, interface: u8) {
        if !matches!(
            self.state,
            PeripheralState::DescriptorAdded | PeripheralState::Advertising
        ) {
            return self.out_of_order("Connected");
        }
        self.session.connected = true;
        self.session.conn_id = conn_id;
        self.session.interface = interface;
        // Clients opt in again on every connection.
        self.session.notifications_enabled = false;
        // The controller stops advertising once a link is up.
        self.advertising_requested = false;
        self.state = PeripheralState::Connected;
        info!("BLE: client connected (conn_id={})", conn_id);
    }

    fn on_disconnected(&mut self, reason: u16, host: &mut impl GattHost) {
        if self.state != PeripheralState::Connected {
            return self.out_of_order("Disconnected");
        }
        info!(
            "BLE: client disconnected (conn_id={}, reason=0x{:02x})",
            self.session.conn_id, reason
        );
        self.session.end_connection();
        self.request_advertising(host);
        self.state = if self.advertising_requested {
            PeripheralState::Advertising
        } else {
            PeripheralState::DescriptorAdded
        };
    }

    fn on_write(&mut self, write: &GattWrite, host: &mut impl GattHost) {
        if self.state == PeripheralState::Connected
            && write.handle == self.session.descriptor_handle
        {
            if let Ok(bytes) = <[u8; 2]>::try_from(write.value.as_slice()) {
                let enabled = u16::from_le_bytes(bytes) == CCCD_NOTIFY;
                self.session.notifications_enabled = enabled;
                info!(
                    "BLE: notifications {}",
                    if enabled { "enabled" } else { "disabled" }
                );
            } else {
                warn!(
                    "BLE: CCCD write of {} bytes ignored",
                    write.value.len()
                );
            }
        } else if self.state != PeripheralState::Connected {
            self.out_of_order("Write");
        } else {
            debug!("BLE: write to unhandled handle {}", write.handle);
        }

        if write.need_rsp {
            if let Err(e) = host.send_response(
                self.session.interface,
                write.conn_id,
                write.trans_id,
                write.handle,
                &write.value,
            ) {
                warn!("BLE: write response failed: {}", e);
            }
        }
    }

    /// Ask the controller to advertise again if the advertising data is in
    /// place but no start request is outstanding. Called once per loop pass.
    pub fn ensure_advertising(&mut self, host: &mut impl GattHost) -> Option<StateChange> {
        let retry = self.adv_data_ready
            && !self.advertising_requested
            && !matches!(
                self.state,
                PeripheralState::Unregistered | PeripheralState::Connected | PeripheralState::Failed
            );
        if !retry {
            return None;
        }
        let from = self.state;
        self.request_advertising(host);
        if from == PeripheralState::DescriptorAdded && self.advertising_requested {
            self.state = PeripheralState::Advertising;
        }
        (self.state != from).then_some(StateChange {
            from,
            to: self.state,
        })
    }

    fn request_advertising(&mut self, host: &mut impl GattHost) {
        match host.start_advertising(self.adv) {
            Ok(()) => self.advertising_requested = true,
            Err(e) => {
                warn!("BLE: start advertising failed: {}", e);
                self.advertising_requested = false;
            }
        }
    }

    /// Store `percent` as the characteristic value (reads are served from
    /// it) and notify the client when it has opted in.
    pub fn publish_level(&mut self, percent: u8, host: &mut impl GattHost) -> NotifyOutcome {
        self.level = percent.min(100);
        let handle = self.session.characteristic_handle;
        let value = [self.level];

        if handle != 0 {
            if let Err(e) = host.set_attribute_value(handle, &value) {
                warn!("BLE: attribute update failed: {}", e);
            }
        }

        if self.state != PeripheralState::Connected {
            return NotifyOutcome::NotConnected;
        }
        if !self.session.notifications_enabled {
            return NotifyOutcome::NotSubscribed;
        }
        match host.notify(
            self.session.interface,
            self.session.conn_id,
            handle,
            &value,
        ) {
            Ok(()) => NotifyOutcome::Sent,
            Err(e) => {
                warn!("BLE: notify failed: {}", e);
                NotifyOutcome::Failed(e)
            }
        }
    }
}
