//! GPIO / peripheral pin assignments for the battery board (ESP32-C6).
//!
//! Every driver references this module rather than
//! hard-coding pin numbers.

// ---------------------------------------------------------------------------
// Battery sense (ADC1)
// ---------------------------------------------------------------------------

/// Battery voltage through a 1:2 resistive divider.
/// ADC1 channel 3 (GPIO 4 on ESP32-C6).
pub const BATTERY_ADC_GPIO: i32 = 4;
/// ADC1 channel number for [`BATTERY_ADC_GPIO`].
pub const BATTERY_ADC_CHANNEL: u32 = 3;

/// Digital output: powers the divider / analog front-end (active HIGH).
/// Kept low between samples so the divider does not drain the cell.
pub const ADC_ENABLE_GPIO: i32 = 3;

// ---------------------------------------------------------------------------
// Push-buttons (active-low, internal pull-up, falling-edge interrupt)
// ---------------------------------------------------------------------------

/// Primary button. Also the deep-sleep wake source.
pub const BUTTON_PRIMARY_GPIO: i32 = 2;
/// Secondary button.
pub const BUTTON_SECONDARY_GPIO: i32 = 1;

// ---------------------------------------------------------------------------
// LEDs
// ---------------------------------------------------------------------------

/// User LED driven by the buttons.
pub const USER_LED_GPIO: i32 = 19;
/// On-board status LED (blinks while advertising).
pub const STATUS_LED_GPIO: i32 = 21;
