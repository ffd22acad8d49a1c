//! Bluedroid GATT server adapter.
//!
//! Implements [`GattHost`] for the battery [`Peripheral`](crate::app::peripheral::Peripheral)
//! and turns Bluedroid's C callbacks into [`StackEvent`]s.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: controller and Bluedroid brought up through
//!   `esp_idf_svc::bt::BtDriver`; GAP/GATTS driven with raw `esp_ble_*` calls.
//! - **all other targets**: a simulated stack that logs every request and
//!   answers it with the completion event the real stack would send.
//!
//! ## Callback bridge
//!
//! GAP/GATTS callbacks run in the Bluedroid (BTC) task and cannot capture
//! Rust state. They copy what they need into a [`StackEvent`] and push it
//! into a bounded queue; the main loop drains the queue and is the only
//! code that mutates the peripheral.
//!
//! ## GATT layout
//!
//! | Attribute              | UUID     | Perms        |
//! |------------------------|----------|--------------|
//! | Battery Service        | `0x180F` | primary      |
//! | Battery Level          | `0x2A19` | Read+Notify  |
//! | Client Char. Config    | `0x2902` | Read+Write   |

use core::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use log::{info, warn};

use crate::app::peripheral::{GattWrite, StackEvent, MAX_WRITE_LEN};
use crate::app::ports::{AdvertisingParams, GattHost};
use crate::error::CommsError;

const STACK_QUEUE_CAP: usize = 16;

// GATTS callbacks run in the Bluedroid task (not ISR), so std Mutex is safe.
static STACK_EVENTS: Mutex<heapless::Deque<StackEvent, STACK_QUEUE_CAP>> =
    Mutex::new(heapless::Deque::new());
static STACK_EVENTS_DROPPED: AtomicU32 = AtomicU32::new(0);

/// Queue a stack event for the main loop. Returns `false` (and counts the
/// drop) when the queue is full.
pub fn push_stack_event(event: StackEvent) -> bool {
    let pushed = STACK_EVENTS
        .lock()
        .map(|mut q| q.push_back(event).is_ok())
        .unwrap_or(false);
    if !pushed {
        STACK_EVENTS_DROPPED.fetch_add(1, Ordering::Relaxed);
    }
    pushed
}

/// Drain queued stack events, FIFO. The lock is released before each
/// handler call so callbacks never wait on the main loop.
pub fn drain_stack_events(mut handler: impl FnMut(StackEvent)) {
    loop {
        let next = STACK_EVENTS.lock().ok().and_then(|mut q| q.pop_front());
        match next {
            Some(event) => handler(event),
            None => break,
        }
    }
    let dropped = STACK_EVENTS_DROPPED.swap(0, Ordering::Relaxed);
    if dropped > 0 {
        warn!("BLE: {} stack event(s) dropped (queue full)", dropped);
    }
}

fn write_event(
    conn_id: u16,
    trans_id: u32,
    handle: u16,
    need_rsp: bool,
    data: &[u8],
) -> StackEvent {
    let len = data.len().min(MAX_WRITE_LEN);
    let mut value = heapless::Vec::new();
    // Cannot fail: len is bounded by the capacity.
    let _ = value.extend_from_slice(&data[..len]);
    StackEvent::Write(GattWrite {
        conn_id,
        trans_id,
        handle,
        need_rsp,
        value,
    })
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF: Bluedroid callbacks
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
fn uuid16_to_esp(uuid: u16) -> esp_idf_svc::sys::esp_bt_uuid_t {
    // SAFETY: esp_bt_uuid_t is a plain C struct/union; all-zero is valid.
    let mut t: esp_idf_svc::sys::esp_bt_uuid_t = unsafe { core::mem::zeroed() };
    t.len = 2;
    t.uuid.uuid16 = uuid;
    t
}

/// 16-bit UUID expanded onto the Bluetooth base UUID, little-endian, as
/// the advertising-data builder expects.
pub fn uuid16_to_base128_le(uuid: u16) -> [u8; 16] {
    let mut out = [
        0xfb, 0x34, 0x9b, 0x5f, 0x80, 0x00, 0x00, 0x80, 0x00, 0x10, 0x00, 0x00, 0, 0, 0x00, 0x00,
    ];
    out[12..14].copy_from_slice(&uuid.to_le_bytes());
    out
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn ble_gap_event_handler(
    event: esp_idf_svc::sys::esp_gap_ble_cb_event_t,
    param: *mut esp_idf_svc::sys::esp_ble_gap_cb_param_t,
) {
    use esp_idf_svc::sys::*;
    #[allow(non_upper_case_globals)]
    match event {
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_DATA_SET_COMPLETE_EVT => {
            push_stack_event(StackEvent::AdvertisingDataSet);
        }
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_START_COMPLETE_EVT => {
            // SAFETY: Bluedroid passes a valid param for this event.
            let status = unsafe { (*param).adv_start_cmpl.status };
            push_stack_event(StackEvent::AdvertisingStarted {
                ok: status == esp_bt_status_t_ESP_BT_STATUS_SUCCESS,
            });
        }
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_STOP_COMPLETE_EVT => {
            log::debug!("BLE GAP: advertising stopped");
        }
        _ => {}
    }
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn ble_gatts_event_handler(
    event: esp_idf_svc::sys::esp_gatts_cb_event_t,
    gatts_if: esp_idf_svc::sys::esp_gatt_if_t,
    param: *mut esp_idf_svc::sys::esp_ble_gatts_cb_param_t,
) {
    use esp_idf_svc::sys::*;

    // SAFETY: Bluedroid passes a valid param pointer for the duration of
    // the callback; each arm reads only the union member for its event.
    #[allow(non_upper_case_globals)]
    unsafe {
        match event {
            esp_gatts_cb_event_t_ESP_GATTS_REG_EVT => {
                let p = &(*param).reg;
                if p.status == esp_gatt_status_t_ESP_GATT_OK {
                    push_stack_event(StackEvent::Registered {
                        interface: gatts_if,
                    });
                } else {
                    log::error!("BLE GATTS: app register failed (status={})", p.status);
                }
            }
            esp_gatts_cb_event_t_ESP_GATTS_CREATE_EVT => {
                push_stack_event(StackEvent::ServiceCreated {
                    service: (*param).create.service_handle,
                });
            }
            esp_gatts_cb_event_t_ESP_GATTS_ADD_CHAR_EVT => {
                push_stack_event(StackEvent::CharacteristicAdded {
                    handle: (*param).add_char.attr_handle,
                });
            }
            esp_gatts_cb_event_t_ESP_GATTS_ADD_CHAR_DESCR_EVT => {
                push_stack_event(StackEvent::DescriptorAdded {
                    handle: (*param).add_char_descr.attr_handle,
                });
            }
            esp_gatts_cb_event_t_ESP_GATTS_CONNECT_EVT => {
                push_stack_event(StackEvent::Connected {
                    conn_id: (*param).connect.conn_id,
                    interface: gatts_if,
                });
            }
            esp_gatts_cb_event_t_ESP_GATTS_DISCONNECT_EVT => {
                push_stack_event(StackEvent::Disconnected {
                    reason: (*param).disconnect.reason as u16,
                });
            }
            esp_gatts_cb_event_t_ESP_GATTS_WRITE_EVT => {
                let p = &(*param).write;
                let data = if p.value.is_null() || p.len == 0 {
                    &[][..]
                } else {
                    core::slice::from_raw_parts(p.value, p.len as usize)
                };
                push_stack_event(write_event(
                    p.conn_id,
                    p.trans_id,
                    p.handle,
                    p.need_rsp,
                    data,
                ));
            }
            _ => {}
        }
    }
}

// ───────────────────────────────────────────────────────────────
// BLE adapter
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
type Driver = esp_idf_svc::bt::BtDriver<'static, esp_idf_svc::bt::Ble>;

pub struct BleAdapter {
    #[cfg(target_os = "espidf")]
    _driver: Option<Driver>,
}

impl Default for BleAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl BleAdapter {
    pub fn new() -> Self {
        Self {
            #[cfg(target_os = "espidf")]
            _driver: None,
        }
    }

    /// Bring up the controller (BLE only) and Bluedroid, register the
    /// GAP/GATTS callbacks and the GATT application. Registration
    /// completes asynchronously with [`StackEvent::Registered`].
    #[cfg(target_os = "espidf")]
    pub fn start(&mut self, modem: esp_idf_svc::hal::modem::Modem) -> Result<(), CommsError> {
        use esp_idf_svc::sys::*;

        let driver = Driver::new(modem, None).map_err(|e| {
            log::error!("BLE: controller/bluedroid bring-up failed: {}", e);
            CommsError::BleInitFailed(e.code())
        })?;

        // SAFETY: Bluedroid is enabled (BtDriver above); the callbacks are
        // 'static functions that only push into the stack-event queue.
        unsafe {
            let ret = esp_ble_gap_register_callback(Some(ble_gap_event_handler));
            if ret != ESP_OK as i32 {
                return Err(CommsError::BleInitFailed(ret));
            }
            let ret = esp_ble_gatts_register_callback(Some(ble_gatts_event_handler));
            if ret != ESP_OK as i32 {
                return Err(CommsError::BleInitFailed(ret));
            }
            let ret = esp_ble_gatts_app_register(0);
            if ret != ESP_OK as i32 {
                return Err(CommsError::BleInitFailed(ret));
            }
        }

        self._driver = Some(driver);
        info!("BLE(espidf): Bluedroid up, GATT app registered");
        Ok(())
    }

    /// Simulated bring-up: registration completes immediately.
    #[cfg(not(target_os = "espidf"))]
    pub fn start(&mut self) -> Result<(), CommsError> {
        info!("BLE(sim): stack started");
        push_stack_event(StackEvent::Registered { interface: 3 });
        Ok(())
    }
}

// ── Simulation hooks (host only) ──────────────────────────────

#[cfg(not(target_os = "espidf"))]
pub const SIM_SERVICE_HANDLE: u16 = 40;
#[cfg(not(target_os = "espidf"))]
pub const SIM_CHAR_HANDLE: u16 = 42;
#[cfg(not(target_os = "espidf"))]
pub const SIM_CCCD_HANDLE: u16 = 43;

/// Simulate a central connecting.
#[cfg(not(target_os = "espidf"))]
pub fn sim_connect(conn_id: u16) {
    push_stack_event(StackEvent::Connected {
        conn_id,
        interface: 3,
    });
}

/// Simulate the connected central writing the CCCD.
#[cfg(not(target_os = "espidf"))]
pub fn sim_write_cccd(conn_id: u16, value: &[u8]) {
    push_stack_event(write_event(conn_id, 1, SIM_CCCD_HANDLE, true, value));
}

#[cfg(not(target_os = "espidf"))]
pub fn sim_disconnect() {
    push_stack_event(StackEvent::Disconnected { reason: 0x13 });
}

// ── GattHost: ESP-IDF ─────────────────────────────────────────

#[cfg(target_os = "espidf")]
fn check(ret: i32, err: fn(i32) -> CommsError) -> Result<(), CommsError> {
    if ret == esp_idf_svc::sys::ESP_OK as i32 {
        Ok(())
    } else {
        Err(err(ret))
    }
}

#[cfg(target_os = "espidf")]
impl GattHost for BleAdapter {
    fn set_device_name(&mut self, name: &str) -> Result<(), CommsError> {
        let mut cname: heapless::Vec<u8, 32> = heapless::Vec::new();
        cname
            .extend_from_slice(name.as_bytes())
            .map_err(|()| CommsError::GattRequestFailed(-1))?;
        cname
            .push(0)
            .map_err(|_| CommsError::GattRequestFailed(-1))?;
        // SAFETY: NUL-terminated buffer; Bluedroid copies the name.
        check(
            unsafe { esp_idf_svc::sys::esp_ble_gap_set_device_name(cname.as_ptr().cast()) },
            CommsError::GattRequestFailed,
        )
    }

    fn configure_advertising(&mut self, service_uuid: u16) -> Result<(), CommsError> {
        use esp_idf_svc::sys::*;
        let mut uuid = uuid16_to_base128_le(service_uuid);
        let mut adv = esp_ble_adv_data_t {
            set_scan_rsp: false,
            include_name: true,
            include_txpower: false,
            min_interval: 0x0006,
            max_interval: 0x0010,
            appearance: 0,
            manufacturer_len: 0,
            p_manufacturer_data: core::ptr::null_mut(),
            service_data_len: 0,
            p_service_data: core::ptr::null_mut(),
            service_uuid_len: uuid.len() as u16,
            p_service_uuid: uuid.as_mut_ptr(),
            flag: (ESP_BLE_ADV_FLAG_GEN_DISC | ESP_BLE_ADV_FLAG_BREDR_NOT_SPT) as u8,
        };
        // SAFETY: the stack deep-copies the advertising data before returning.
        check(
            unsafe { esp_ble_gap_config_adv_data(&mut adv) },
            CommsError::GattRequestFailed,
        )
    }

    fn create_service(
        &mut self,
        interface: u8,
        uuid: u16,
        num_handles: u16,
    ) -> Result<(), CommsError> {
        use esp_idf_svc::sys::*;
        let mut id = esp_gatt_srvc_id_t {
            id: esp_gatt_id_t {
                uuid: uuid16_to_esp(uuid),
                inst_id: 0,
            },
            is_primary: true,
        };
        // SAFETY: `id` outlives the call; the stack copies it.
        check(
            unsafe { esp_ble_gatts_create_service(interface, &mut id, num_handles) },
            CommsError::GattRequestFailed,
        )
    }

    fn start_service(&mut self, service: u16) -> Result<(), CommsError> {
        // SAFETY: plain request with a handle returned by CREATE_EVT.
        check(
            unsafe { esp_idf_svc::sys::esp_ble_gatts_start_service(service) },
            CommsError::GattRequestFailed,
        )
    }

    fn add_characteristic(
        &mut self,
        service: u16,
        uuid: u16,
        initial: &[u8],
    ) -> Result<(), CommsError> {
        use esp_idf_svc::sys::*;
        let mut char_uuid = uuid16_to_esp(uuid);
        let mut value: heapless::Vec<u8, 8> = heapless::Vec::new();
        value
            .extend_from_slice(initial)
            .map_err(|()| CommsError::GattRequestFailed(-1))?;
        let mut attr = esp_attr_value_t {
            attr_max_len: value.len().max(1) as u16,
            attr_len: value.len() as u16,
            attr_value: value.as_mut_ptr(),
        };
        // Reads are answered by the stack from the stored value.
        let mut control = esp_attr_control_t {
            auto_rsp: ESP_GATT_AUTO_RSP as u8,
        };
        // SAFETY: all pointers are valid for the call; the stack copies them.
        check(
            unsafe {
                esp_ble_gatts_add_char(
                    service,
                    &mut char_uuid,
                    ESP_GATT_PERM_READ as esp_gatt_perm_t,
                    (ESP_GATT_CHAR_PROP_BIT_READ | ESP_GATT_CHAR_PROP_BIT_NOTIFY)
                        as esp_gatt_char_prop_t,
                    &mut attr,
                    &mut control,
                )
            },
            CommsError::GattRequestFailed,
        )
    }

    fn add_descriptor(&mut self, service: u16, uuid: u16) -> Result<(), CommsError> {
        use esp_idf_svc::sys::*;
        let mut descr_uuid = uuid16_to_esp(uuid);
        // No control block: writes reach the application, which answers them.
        // SAFETY: `descr_uuid` outlives the call.
        check(
            unsafe {
                esp_ble_gatts_add_char_descr(
                    service,
                    &mut descr_uuid,
                    (ESP_GATT_PERM_READ | ESP_GATT_PERM_WRITE) as esp_gatt_perm_t,
                    core::ptr::null_mut(),
                    core::ptr::null_mut(),
                )
            },
            CommsError::GattRequestFailed,
        )
    }

    fn start_advertising(&mut self, params: AdvertisingParams) -> Result<(), CommsError> {
        use esp_idf_svc::sys::*;
        // SAFETY: zeroed tail fields (peer address) are valid for undirected adv.
        let mut adv_params = esp_ble_adv_params_t {
            adv_int_min: params.interval_min,
            adv_int_max: params.interval_max,
            adv_type: esp_ble_adv_type_t_ADV_TYPE_IND,
            own_addr_type: esp_ble_addr_type_t_BLE_ADDR_TYPE_PUBLIC,
            channel_map: esp_ble_adv_channel_t_ADV_CHNL_ALL,
            adv_filter_policy: esp_ble_adv_filter_t_ADV_FILTER_ALLOW_SCAN_ANY_CON_ANY,
            ..unsafe { core::mem::zeroed() }
        };
        // SAFETY: `adv_params` outlives the call.
        check(
            unsafe { esp_ble_gap_start_advertising(&mut adv_params) },
            CommsError::GattRequestFailed,
        )
    }

    fn send_response(
        &mut self,
        interface: u8,
        conn_id: u16,
        trans_id: u32,
        handle: u16,
        value: &[u8],
    ) -> Result<(), CommsError> {
        use esp_idf_svc::sys::*;
        // SAFETY: esp_gatt_rsp_t is a plain C union; all-zero is valid.
        let mut rsp: esp_gatt_rsp_t = unsafe { core::mem::zeroed() };
        // SAFETY: writing the attr_value member of the union.
        unsafe {
            let len = value.len().min(rsp.attr_value.value.len());
            rsp.attr_value.handle = handle;
            rsp.attr_value.len = len as u16;
            rsp.attr_value.value[..len].copy_from_slice(&value[..len]);
        }
        // SAFETY: `rsp` outlives the call.
        check(
            unsafe {
                esp_ble_gatts_send_response(
                    interface,
                    conn_id,
                    trans_id,
                    esp_gatt_status_t_ESP_GATT_OK,
                    &mut rsp,
                )
            },
            CommsError::GattRequestFailed,
        )
    }

    fn set_attribute_value(&mut self, handle: u16, value: &[u8]) -> Result<(), CommsError> {
        // SAFETY: the stack copies `value` into the attribute database.
        check(
            unsafe {
                esp_idf_svc::sys::esp_ble_gatts_set_attr_value(
                    handle,
                    value.len() as u16,
                    value.as_ptr(),
                )
            },
            CommsError::GattRequestFailed,
        )
    }

    fn notify(
        &mut self,
        interface: u8,
        conn_id: u16,
        handle: u16,
        value: &[u8],
    ) -> Result<(), CommsError> {
        let mut buf: heapless::Vec<u8, 8> = heapless::Vec::new();
        buf.extend_from_slice(value)
            .map_err(|()| CommsError::NotifyFailed(-1))?;
        // SAFETY: `buf` outlives the call; need_confirm = false (notification).
        check(
            unsafe {
                esp_idf_svc::sys::esp_ble_gatts_send_indicate(
                    interface,
                    conn_id,
                    handle,
                    buf.len() as u16,
                    buf.as_mut_ptr(),
                    false,
                )
            },
            CommsError::NotifyFailed,
        )
    }
}

// ── GattHost: simulation ──────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
impl GattHost for BleAdapter {
    fn set_device_name(&mut self, name: &str) -> Result<(), CommsError> {
        info!("BLE(sim): device name '{}'", name);
        Ok(())
    }

    fn configure_advertising(&mut self, service_uuid: u16) -> Result<(), CommsError> {
        info!("BLE(sim): advertising data (service 0x{:04X})", service_uuid);
        push_stack_event(StackEvent::AdvertisingDataSet);
        Ok(())
    }

    fn create_service(
        &mut self,
        interface: u8,
        uuid: u16,
        num_handles: u16,
    ) -> Result<(), CommsError> {
        info!(
            "BLE(sim): create service 0x{:04X} ({} handles, if={})",
            uuid, num_handles, interface
        );
        push_stack_event(StackEvent::ServiceCreated {
            service: SIM_SERVICE_HANDLE,
        });
        Ok(())
    }

    fn start_service(&mut self, service: u16) -> Result<(), CommsError> {
        info!("BLE(sim): start service {}", service);
        Ok(())
    }

    fn add_characteristic(
        &mut self,
        service: u16,
        uuid: u16,
        initial: &[u8],
    ) -> Result<(), CommsError> {
        info!(
            "BLE(sim): add characteristic 0x{:04X} to {} (initial {:?})",
            uuid, service, initial
        );
        push_stack_event(StackEvent::CharacteristicAdded {
            handle: SIM_CHAR_HANDLE,
        });
        Ok(())
    }

    fn add_descriptor(&mut self, service: u16, uuid: u16) -> Result<(), CommsError> {
        info!("BLE(sim): add descriptor 0x{:04X} to {}", uuid, service);
        push_stack_event(StackEvent::DescriptorAdded {
            handle: SIM_CCCD_HANDLE,
        });
        Ok(())
    }

    fn start_advertising(&mut self, params: AdvertisingParams) -> Result<(), CommsError> {
        info!(
            "BLE(sim): advertising (interval 0x{:02X}-0x{:02X})",
            params.interval_min, params.interval_max
        );
        push_stack_event(StackEvent::AdvertisingStarted { ok: true });
        Ok(())
    }

    fn send_response(
        &mut self,
        _interface: u8,
        conn_id: u16,
        trans_id: u32,
        handle: u16,
        _value: &[u8],
    ) -> Result<(), CommsError> {
        log::debug!(
            "BLE(sim): write response (conn={}, trans={}, handle={})",
            conn_id,
            trans_id,
            handle
        );
        Ok(())
    }

    fn set_attribute_value(&mut self, handle: u16, value: &[u8]) -> Result<(), CommsError> {
        log::debug!("BLE(sim): attr {} = {:?}", handle, value);
        Ok(())
    }

    fn notify(
        &mut self,
        _interface: u8,
        conn_id: u16,
        handle: u16,
        value: &[u8],
    ) -> Result<(), CommsError> {
        info!("BLE(sim): notify conn={} handle={} {:?}", conn_id, handle, value);
        Ok(())
    }
}
