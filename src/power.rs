//! Wake-reason decoding, idle policy and deep sleep.
//!
//! Deep sleep is a cold restart: on wake the firmware boots from `main()`
//! again, so nothing here needs to preserve state across the sleep.

use log::info;

/// Why the chip booted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeReason {
    PowerOn,
    Timer,
    Button,
    Other,
}

#[cfg(target_os = "espidf")]
pub fn wake_reason() -> WakeReason {
    use esp_idf_svc::sys::*;
    // SAFETY: read-only query of the RTC wake cause.
    let cause = unsafe { esp_sleep_get_wakeup_cause() };
    #[allow(non_upper_case_globals)]
    match cause {
        esp_sleep_source_t_ESP_SLEEP_WAKEUP_UNDEFINED => WakeReason::PowerOn,
        esp_sleep_source_t_ESP_SLEEP_WAKEUP_TIMER => WakeReason::Timer,
        esp_sleep_source_t_ESP_SLEEP_WAKEUP_EXT1 | esp_sleep_source_t_ESP_SLEEP_WAKEUP_GPIO => {
            WakeReason::Button
        }
        _ => WakeReason::Other,
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn wake_reason() -> WakeReason {
    WakeReason::PowerOn
}

/// Decides when the device has been idle long enough to sleep.
///
/// Activity (a button press or a connected client) restarts the clock.
/// A zero timeout disables the policy entirely.
#[derive(Debug, Clone)]
pub struct IdlePolicy {
    timeout_ms: u32,
    last_activity_ms: u32,
}

impl IdlePolicy {
    pub fn new(idle_secs: u32) -> Self {
        Self {
            timeout_ms: idle_secs.saturating_mul(1000),
            last_activity_ms: 0,
        }
    }

    pub fn enabled(&self) -> bool {
        self.timeout_ms != 0
    }

    /// Returns `true` once the idle timeout has elapsed.
    pub fn tick(&mut self, now_ms: u32, active: bool) -> bool {
        if !self.enabled() {
            return false;
        }
        if active {
            self.last_activity_ms = now_ms;
            return false;
        }
        now_ms.wrapping_sub(self.last_activity_ms) >= self.timeout_ms
    }

    pub fn idle_secs(&self, now_ms: u32) -> u32 {
        now_ms.wrapping_sub(self.last_activity_ms) / 1000
    }
}

/// Arm timer and button wake sources and enter deep sleep. Never returns.
#[cfg(target_os = "espidf")]
pub fn enter_deep_sleep(wake_after_secs: u32, wake_gpio: i32) -> ! {
    use esp_idf_svc::sys::*;
    info!(
        "Power: deep sleep (timer {} s, button GPIO{})",
        wake_after_secs, wake_gpio
    );
    // SAFETY: called from the main task after every driver has been parked.
    unsafe {
        if wake_after_secs > 0 {
            esp_sleep_enable_timer_wakeup(u64::from(wake_after_secs) * 1_000_000);
        }
        // Active-low button: wake when the pin is pulled low.
        esp_sleep_enable_ext1_wakeup(
            1u64 << wake_gpio,
            esp_sleep_ext1_wakeup_mode_t_ESP_EXT1_WAKEUP_ANY_LOW,
        );
        esp_deep_sleep_start();
    }
}

/// Host stand-in: logs and exits the process.
#[cfg(not(target_os = "espidf"))]
pub fn enter_deep_sleep(wake_after_secs: u32, wake_gpio: i32) -> ! {
    info!(
        "Power(sim): deep sleep (timer {} s, button GPIO{}), exiting",
        wake_after_secs, wake_gpio
    );
    std::process::exit(0)
}
