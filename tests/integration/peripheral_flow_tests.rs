//! Battery Service peripheral driven through full stack-event sequences.

use crate::mock_hw::{CCCD, CHAR, GattCall, MockGattHost, SERVICE, bring_up_events, cccd_write};

use battery_ble::app::peripheral::{
    BATTERY_LEVEL_UUID, BATTERY_SERVICE_UUID, CCCD_UUID, NotifyOutcome, Peripheral,
    PeripheralState, SERVICE_NUM_HANDLES, StackEvent,
};
use battery_ble::app::ports::AdvertisingParams;
use battery_ble::config::SystemConfig;
use battery_ble::error::CommsError;

fn advertising_peripheral() -> (Peripheral, MockGattHost) {
    let config = SystemConfig::default();
    let mut p = Peripheral::new(
        config.device_name.clone(),
        AdvertisingParams {
            interval_min: config.adv_interval_min,
            interval_max: config.adv_interval_max,
        },
    );
    let mut host = MockGattHost::new();
    for e in bring_up_events() {
        p.handle(e, &mut host);
    }
    (p, host)
}

fn connected_peripheral() -> (Peripheral, MockGattHost) {
    let (mut p, mut host) = advertising_peripheral();
    p.handle(
        StackEvent::Connected {
            conn_id: 5,
            interface: 3,
        },
        &mut host,
    );
    (p, host)
}

// ── Bring-up ──────────────────────────────────────────────────

#[test]
fn bring_up_builds_battery_service_and_advertises() {
    let (p, host) = advertising_peripheral();
    assert_eq!(p.state(), PeripheralState::Advertising);

    assert!(host.calls.contains(&GattCall::SetName("ESP32-Battery".into())));
    assert!(host.calls.contains(&GattCall::ConfigureAdvertising(BATTERY_SERVICE_UUID)));
    assert!(host.calls.contains(&GattCall::CreateService {
        interface: 3,
        uuid: BATTERY_SERVICE_UUID,
        handles: SERVICE_NUM_HANDLES,
    }));
    assert!(host.calls.contains(&GattCall::StartService(SERVICE)));
    assert!(host.calls.contains(&GattCall::AddCharacteristic {
        service: SERVICE,
        uuid: BATTERY_LEVEL_UUID,
        initial: vec![0],
    }));
    assert!(host.calls.contains(&GattCall::AddDescriptor {
        service: SERVICE,
        uuid: CCCD_UUID,
    }));
    assert_eq!(host.count(|c| *c == GattCall::StartAdvertising), 1);
    assert_eq!(p.session().characteristic_handle, CHAR);
    assert_eq!(p.session().descriptor_handle, CCCD);
}

#[test]
fn early_connect_is_ignored() {
    let mut p = Peripheral::new(
        heapless::String::new(),
        AdvertisingParams {
            interval_min: 0x20,
            interval_max: 0x40,
        },
    );
    let mut host = MockGattHost::new();
    let change = p.handle(
        StackEvent::Connected {
            conn_id: 1,
            interface: 3,
        },
        &mut host,
    );
    assert!(change.is_none());
    assert_eq!(p.state(), PeripheralState::Unregistered);
}

// ── Subscription ──────────────────────────────────────────────

#[test]
fn connect_resets_subscription() {
    let (p, _) = connected_peripheral();
    assert_eq!(p.state(), PeripheralState::Connected);
    assert!(p.is_connected());
    assert!(!p.notifications_enabled());
    assert_eq!(p.session().conn_id, 5);
}

#[test]
fn cccd_writes_toggle_notifications() {
    let (mut p, mut host) = connected_peripheral();

    p.handle(cccd_write(5, &[0x01, 0x00]), &mut host);
    assert!(p.notifications_enabled());

    p.handle(cccd_write(5, &[0x00, 0x00]), &mut host);
    assert!(!p.notifications_enabled());

    // Every write asked for a response and got one.
    assert_eq!(
        host.count(|c| matches!(c, GattCall::Response { conn_id: 5, trans_id: 9 })),
        2
    );
}

#[test]
fn indication_value_does_not_enable_notifications() {
    let (mut p, mut host) = connected_peripheral();
    p.handle(cccd_write(5, &[0x02, 0x00]), &mut host);
    assert!(!p.notifications_enabled());
}

#[test]
fn short_cccd_write_leaves_state_unchanged() {
    let (mut p, mut host) = connected_peripheral();
    p.handle(cccd_write(5, &[0x01, 0x00]), &mut host);
    p.handle(cccd_write(5, &[0x00]), &mut host);
    assert!(p.notifications_enabled());
}

#[test]
fn disconnect_clears_subscription_and_readvertises() {
    let (mut p, mut host) = connected_peripheral();
    p.handle(cccd_write(5, &[0x01, 0x00]), &mut host);

    let change = p.handle(StackEvent::Disconnected { reason: 0x13 }, &mut host);
    let change = change.expect("state change");
    assert_eq!(change.from, PeripheralState::Connected);
    assert_eq!(change.to, PeripheralState::Advertising);
    assert!(!p.notifications_enabled());
    assert!(!p.is_connected());
    assert_eq!(host.count(|c| *c == GattCall::StartAdvertising), 2);
    // Handles survive the disconnect.
    assert_eq!(p.session().characteristic_handle, CHAR);

    // A second central can connect and starts unsubscribed.
    p.handle(
        StackEvent::Connected {
            conn_id: 6,
            interface: 3,
        },
        &mut host,
    );
    assert!(!p.notifications_enabled());
}

#[test]
fn advertising_rejected_after_disconnect_is_restarted() {
    let (mut p, mut host) = connected_peripheral();
    host.fail_advertising = 1;

    let change = p.handle(StackEvent::Disconnected { reason: 0x08 }, &mut host);
    assert_eq!(change.map(|c| c.to), Some(PeripheralState::DescriptorAdded));
    assert!(!p.is_connected());

    let change = p.ensure_advertising(&mut host).expect("restarted");
    assert_eq!(change.from, PeripheralState::DescriptorAdded);
    assert_eq!(change.to, PeripheralState::Advertising);
    assert_eq!(host.count(|c| *c == GattCall::StartAdvertising), 3);
}

#[test]
fn failed_start_completion_is_retried_once_per_pass() {
    let (mut p, mut host) = advertising_peripheral();
    p.handle(StackEvent::AdvertisingStarted { ok: false }, &mut host);
    assert_eq!(p.state(), PeripheralState::DescriptorAdded);

    host.fail_advertising = 1;
    assert_eq!(p.ensure_advertising(&mut host), None);
    assert_eq!(p.state(), PeripheralState::DescriptorAdded);
    assert!(p.ensure_advertising(&mut host).is_some());
    assert_eq!(p.ensure_advertising(&mut host), None);
    assert_eq!(p.state(), PeripheralState::Advertising);
    assert_eq!(host.count(|c| *c == GattCall::StartAdvertising), 3);

    // Clients can still connect once the retry lands.
    p.handle(
        StackEvent::Connected {
            conn_id: 7,
            interface: 3,
        },
        &mut host,
    );
    assert!(p.is_connected());
}

#[test]
fn rejected_service_start_stops_bring_up() {
    let config = SystemConfig::default();
    let mut p = Peripheral::new(
        config.device_name.clone(),
        AdvertisingParams {
            interval_min: config.adv_interval_min,
            interval_max: config.adv_interval_max,
        },
    );
    let mut host = MockGattHost {
        fail_start_service: true,
        ..MockGattHost::default()
    };
    for e in bring_up_events() {
        p.handle(e, &mut host);
    }
    assert_eq!(p.state(), PeripheralState::Failed);
    assert_eq!(p.fault(), Some(CommsError::GattRequestFailed(0x103)));
    assert_eq!(host.count(|c| matches!(c, GattCall::AddCharacteristic { .. })), 0);
    assert_eq!(host.count(|c| matches!(c, GattCall::AddDescriptor { .. })), 0);

    let change = p.handle(
        StackEvent::Connected {
            conn_id: 1,
            interface: 3,
        },
        &mut host,
    );
    assert_eq!(change, None);
    assert_eq!(p.ensure_advertising(&mut host), None);
}

// ── Publishing ────────────────────────────────────────────────

#[test]
fn notify_only_when_connected_and_subscribed() {
    let (mut p, mut host) = advertising_peripheral();
    assert_eq!(p.publish_level(80, &mut host), NotifyOutcome::NotConnected);

    p.handle(
        StackEvent::Connected {
            conn_id: 5,
            interface: 3,
        },
        &mut host,
    );
    assert_eq!(p.publish_level(79, &mut host), NotifyOutcome::NotSubscribed);

    p.handle(cccd_write(5, &[0x01, 0x00]), &mut host);
    assert_eq!(p.publish_level(78, &mut host), NotifyOutcome::Sent);

    assert_eq!(host.notifications(), vec![78]);
    assert!(host.calls.contains(&GattCall::Notify {
        conn_id: 5,
        handle: CHAR,
        value: vec![78],
    }));
    // The stored value tracks every publish, notified or not.
    assert_eq!(
        host.count(|c| matches!(c, GattCall::SetValue { handle: CHAR, .. })),
        3
    );
}

#[test]
fn notify_failure_keeps_session() {
    let (mut p, mut host) = connected_peripheral();
    p.handle(cccd_write(5, &[0x01, 0x00]), &mut host);
    host.fail_notify = true;

    let outcome = p.publish_level(50, &mut host);
    assert!(matches!(outcome, NotifyOutcome::Failed(_)));
    assert_eq!(p.state(), PeripheralState::Connected);
    assert!(p.notifications_enabled());
    assert_eq!(p.level(), 50);
}

#[test]
fn level_is_clamped_to_100() {
    let (mut p, mut host) = advertising_peripheral();
    p.publish_level(250, &mut host);
    assert_eq!(p.level(), 100);
}
