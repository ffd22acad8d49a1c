//! Application core: pure domain logic, zero I/O.
//!
//! This module contains the behaviour of the battery peripheral: the BLE
//! state machine, sampling and notification, and button handling. All
//! interaction with hardware happens through **port traits** defined in
//! [`ports`], keeping this layer fully testable without real peripherals.

pub mod events;
pub mod peripheral;
pub mod ports;
pub mod service;
