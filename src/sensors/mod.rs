//! Sensor drivers.

pub mod battery;

pub use battery::{AdcChannel, BatteryReader, BatterySample};
