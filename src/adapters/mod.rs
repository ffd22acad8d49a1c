//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter     | Implements              | Connects to              |
//! |-------------|-------------------------|--------------------------|
//! | `ble`       | GattHost                | Bluedroid GATT server    |
//! | `hardware`  | BatteryPort, LedPort    | ESP32 ADC, GPIO          |
//! | `log_sink`  | EventSink               | Serial log output        |
//! | `nvs`       | -                       | NVS flash init           |
//! | `time`      | -                       | ESP32 system timer       |

pub mod ble;
pub mod hardware;
pub mod log_sink;
pub mod nvs;
pub mod time;
