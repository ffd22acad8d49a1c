//! One-shot hardware peripheral initialization.
//!
//! Configures the battery ADC channel (and its calibration curve), the
//! button inputs, and the LED / front-end outputs using raw ESP-IDF sys
//! calls. Called once from `main()` before the event loop starts.

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(target_os = "espidf")]
use log::{info, warn};

use core::convert::Infallible;

use crate::error::SensorError;
use crate::sensors::battery::AdcChannel;

#[cfg(target_os = "espidf")]
use crate::pins;

// ── Error type ────────────────────────────────────────────────

/// Errors during one-shot peripheral initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwInitError {
    AdcInitFailed(i32),
    GpioConfigFailed(i32),
    IsrInstallFailed(i32),
    TimerFailed(i32),
}

impl core::fmt::Display for HwInitError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::AdcInitFailed(rc) => write!(f, "ADC1 init failed (rc={})", rc),
            Self::GpioConfigFailed(rc) => write!(f, "GPIO config failed (rc={})", rc),
            Self::IsrInstallFailed(rc) => write!(f, "GPIO ISR service install failed (rc={})", rc),
            Self::TimerFailed(rc) => write!(f, "esp_timer create/start failed (rc={})", rc),
        }
    }
}

impl std::error::Error for HwInitError {}

/// Configure GPIO directions. `button_interrupts` selects falling-edge
/// interrupts on the button inputs (interrupt mode) or plain inputs
/// (polling mode).
#[cfg(target_os = "espidf")]
pub fn init_peripherals(button_interrupts: bool) -> Result<(), HwInitError> {
    // SAFETY: Called once from main() before the event loop; single-threaded.
    unsafe {
        init_gpio_inputs(button_interrupts)?;
        init_gpio_outputs()?;
    }
    info!("hw_init: GPIO configured");
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn init_peripherals(_button_interrupts: bool) -> Result<(), HwInitError> {
    log::info!("hw_init(sim): peripheral init skipped");
    Ok(())
}

// ── ADC (oneshot) ─────────────────────────────────────────────

/// ADC1 oneshot channel with an optional curve-fitting calibration.
#[cfg(target_os = "espidf")]
pub struct OneshotAdc {
    unit: adc_oneshot_unit_handle_t,
    channel: adc_channel_t,
    cali: Option<adc_cali_handle_t>,
}

#[cfg(target_os = "espidf")]
impl OneshotAdc {
    /// Open ADC1, configure `channel` for 12-bit / 12 dB, and try to build
    /// the factory calibration curve when `use_calibration` is set.
    pub fn new(channel: u32, use_calibration: bool) -> Result<Self, HwInitError> {
        let init_cfg = adc_oneshot_unit_init_cfg_t {
            unit_id: adc_unit_t_ADC_UNIT_1,
            ulp_mode: adc_ulp_mode_t_ADC_ULP_MODE_DISABLE,
            ..Default::default()
        };
        let mut unit: adc_oneshot_unit_handle_t = core::ptr::null_mut();
        // SAFETY: boot-time call; `unit` is a valid out-pointer.
        let ret = unsafe { adc_oneshot_new_unit(&init_cfg, &mut unit) };
        if ret != ESP_OK as i32 {
            return Err(HwInitError::AdcInitFailed(ret));
        }

        let chan_cfg = adc_oneshot_chan_cfg_t {
            atten: adc_atten_t_ADC_ATTEN_DB_12,
            bitwidth: adc_bitwidth_t_ADC_BITWIDTH_12,
        };
        // SAFETY: `unit` was just created above.
        let ret = unsafe { adc_oneshot_config_channel(unit, channel, &chan_cfg) };
        if ret != ESP_OK as i32 {
            return Err(HwInitError::AdcInitFailed(ret));
        }

        let cali = if use_calibration {
            Self::create_calibration(channel)
        } else {
            None
        };

        info!(
            "hw_init: ADC1 CH{} configured (GPIO{}, 12 dB, 12-bit, calibration={})",
            channel,
            pins::BATTERY_ADC_GPIO,
            cali.is_some()
        );
        Ok(Self {
            unit,
            channel,
            cali,
        })
    }

    fn create_calibration(channel: u32) -> Option<adc_cali_handle_t> {
        let cfg = adc_cali_curve_fitting_config_t {
            unit_id: adc_unit_t_ADC_UNIT_1,
            chan: channel,
            atten: adc_atten_t_ADC_ATTEN_DB_12,
            bitwidth: adc_bitwidth_t_ADC_BITWIDTH_12,
        };
        let mut handle: adc_cali_handle_t = core::ptr::null_mut();
        // SAFETY: `handle` is a valid out-pointer; the driver keeps no
        // reference to `cfg`.
        let ret = unsafe { adc_cali_create_scheme_curve_fitting(&cfg, &mut handle) };
        if ret == ESP_OK as i32 {
            Some(handle)
        } else {
            warn!("hw_init: calibration scheme unavailable (rc={})", ret);
            None
        }
    }
}

#[cfg(target_os = "espidf")]
impl AdcChannel for OneshotAdc {
    fn read_raw(&mut self) -> Result<u16, SensorError> {
        let mut raw: i32 = 0;
        // SAFETY: unit/channel configured in `new`; main-loop access only.
        let ret = unsafe { adc_oneshot_read(self.unit, self.channel, &mut raw) };
        if ret != ESP_OK as i32 {
            return Err(SensorError::AdcReadFailed(ret));
        }
        Ok(raw.clamp(0, 4095) as u16)
    }

    fn has_calibration(&self) -> bool {
        self.cali.is_some()
    }

    fn calibrated_mv(&self, raw: u16) -> Option<u32> {
        let handle = self.cali?;
        let mut mv: i32 = 0;
        // SAFETY: handle created by adc_cali_create_scheme_curve_fitting.
        let ret = unsafe { adc_cali_raw_to_voltage(handle, i32::from(raw), &mut mv) };
        (ret == ESP_OK as i32).then_some(mv.max(0) as u32)
    }
}

/// Host stand-in for the ADC. The raw code is injected through
/// [`sim_set_battery_raw`]; there is never a calibration curve.
#[cfg(not(target_os = "espidf"))]
pub struct OneshotAdc {
    channel: u32,
}

#[cfg(not(target_os = "espidf"))]
static SIM_BATTERY_RAW: core::sync::atomic::AtomicU16 = core::sync::atomic::AtomicU16::new(2048);

/// Set the raw code the simulated ADC returns.
#[cfg(not(target_os = "espidf"))]
pub fn sim_set_battery_raw(raw: u16) {
    SIM_BATTERY_RAW.store(raw.min(4095), core::sync::atomic::Ordering::Relaxed);
}

#[cfg(not(target_os = "espidf"))]
impl OneshotAdc {
    pub fn new(channel: u32, _use_calibration: bool) -> Result<Self, HwInitError> {
        log::info!("hw_init(sim): ADC1 CH{} (no calibration)", channel);
        Ok(Self { channel })
    }

    pub fn channel(&self) -> u32 {
        self.channel
    }
}

#[cfg(not(target_os = "espidf"))]
impl AdcChannel for OneshotAdc {
    fn read_raw(&mut self) -> Result<u16, SensorError> {
        Ok(SIM_BATTERY_RAW.load(core::sync::atomic::Ordering::Relaxed))
    }

    fn has_calibration(&self) -> bool {
        false
    }

    fn calibrated_mv(&self, _raw: u16) -> Option<u32> {
        None
    }
}

// ── GPIO Inputs ───────────────────────────────────────────────

#[cfg(target_os = "espidf")]
unsafe fn init_gpio_inputs(button_interrupts: bool) -> Result<(), HwInitError> {
    let intr_type = if button_interrupts {
        gpio_int_type_t_GPIO_INTR_NEGEDGE
    } else {
        gpio_int_type_t_GPIO_INTR_DISABLE
    };
    let cfg = gpio_config_t {
        pin_bit_mask: (1u64 << pins::BUTTON_PRIMARY_GPIO) | (1u64 << pins::BUTTON_SECONDARY_GPIO),
        mode: gpio_mode_t_GPIO_MODE_INPUT,
        pull_up_en: gpio_pullup_t_GPIO_PULLUP_ENABLE,
        pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
        intr_type,
    };
    let ret = unsafe { gpio_config(&cfg) };
    if ret != ESP_OK as i32 {
        return Err(HwInitError::GpioConfigFailed(ret));
    }
    Ok(())
}

#[cfg(target_os = "espidf")]
pub fn gpio_read(pin: i32) -> bool {
    // SAFETY: gpio_get_level is a read-only register access on an
    // already-configured input pin; safe from ISR and timer context.
    (unsafe { gpio_get_level(pin) }) != 0
}

#[cfg(not(target_os = "espidf"))]
pub fn gpio_read(_pin: i32) -> bool {
    // Pull-up: released.
    true
}

/// Active-low button level: `true` while pressed.
pub fn button_pressed(pin: i32) -> bool {
    !gpio_read(pin)
}

// ── GPIO Outputs ──────────────────────────────────────────────

#[cfg(target_os = "espidf")]
unsafe fn init_gpio_outputs() -> Result<(), HwInitError> {
    let output_pins = [
        pins::USER_LED_GPIO,
        pins::STATUS_LED_GPIO,
        pins::ADC_ENABLE_GPIO,
    ];

    for &pin in &output_pins {
        let cfg = gpio_config_t {
            pin_bit_mask: 1u64 << pin,
            mode: gpio_mode_t_GPIO_MODE_OUTPUT,
            pull_up_en: gpio_pullup_t_GPIO_PULLUP_DISABLE,
            pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
            intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
        };
        let ret = unsafe { gpio_config(&cfg) };
        if ret != ESP_OK as i32 {
            return Err(HwInitError::GpioConfigFailed(ret));
        }
        unsafe { gpio_set_level(pin, 0) };
    }
    Ok(())
}

#[cfg(target_os = "espidf")]
pub fn gpio_write(pin: i32, high: bool) {
    // SAFETY: gpio_set_level writes to a pin configured as output in
    // init_gpio_outputs(). Main-loop only.
    unsafe {
        gpio_set_level(pin, u32::from(high));
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn gpio_write(_pin: i32, _high: bool) {}

/// Raw GPIO output exposed through the `embedded_hal` pin trait so the
/// LED and battery drivers stay target-agnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputGpio(pub i32);

impl embedded_hal::digital::ErrorType for OutputGpio {
    type Error = Infallible;
}

impl embedded_hal::digital::OutputPin for OutputGpio {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        gpio_write(self.0, false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        gpio_write(self.0, true);
        Ok(())
    }
}

// ── GPIO ISR Service ──────────────────────────────────────────

#[cfg(target_os = "espidf")]
use crate::drivers::button::{button_isr_handler, ButtonId};

/// Shared falling-edge ISR. `arg` carries the [`ButtonId`] index.
#[cfg(target_os = "espidf")]
unsafe extern "C" fn button_gpio_isr(arg: *mut core::ffi::c_void) {
    let Some(id) = ButtonId::from_index(arg as usize) else {
        return;
    };
    // SAFETY: esp_timer_get_time is a counter read; safe in ISR context.
    let now_ms = (unsafe { esp_timer_get_time() } / 1_000) as u32;
    if button_isr_handler(id, now_ms) {
        crate::drivers::hw_timer::arm_debounce(id);
    }
}

/// Install the per-pin GPIO ISR service and register both button handlers.
/// Call after init_peripherals() and after the debounce timers exist.
#[cfg(target_os = "espidf")]
pub fn init_isr_service() -> Result<(), HwInitError> {
    // SAFETY: gpio_install_isr_service is idempotent; ESP_ERR_INVALID_STATE
    // means it was already installed. The handler only touches atomics and
    // arms an esp_timer.
    unsafe {
        let ret = gpio_install_isr_service(0);
        if ret != ESP_OK as i32 && ret != ESP_ERR_INVALID_STATE as i32 {
            return Err(HwInitError::IsrInstallFailed(ret));
        }

        for id in ButtonId::ALL {
            let gpio = id.channel().gpio();
            gpio_set_intr_type(gpio, gpio_int_type_t_GPIO_INTR_NEGEDGE);
            let ret = gpio_isr_handler_add(gpio, Some(button_gpio_isr), id as usize as *mut _);
            if ret != ESP_OK as i32 {
                return Err(HwInitError::IsrInstallFailed(ret));
            }
            gpio_intr_enable(gpio);
        }

        info!(
            "hw_init: ISR service installed (buttons GPIO{} + GPIO{})",
            pins::BUTTON_PRIMARY_GPIO,
            pins::BUTTON_SECONDARY_GPIO
        );
    }
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn init_isr_service() -> Result<(), HwInitError> {
    log::info!("hw_init(sim): ISR service skipped");
    Ok(())
}
