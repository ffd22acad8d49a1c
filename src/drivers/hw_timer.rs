//! Hardware timers using ESP-IDF's esp_timer API.
//!
//! - One periodic timer pushes [`Event::SampleTick`] every
//!   `sample_interval_ms`.
//! - One one-shot timer per button is armed by the GPIO ISR and, on
//!   expiry, re-reads the pin to confirm the press.
//!
//! Timer callbacks execute in the ESP timer task context (not ISR), so
//! they can safely call `push_event()`. All callbacks share that one task,
//! which keeps the event queue single-producer.

use crate::drivers::hw_init::HwInitError;

#[cfg(target_os = "espidf")]
use core::sync::atomic::{AtomicPtr, Ordering};

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(target_os = "espidf")]
use log::info;

#[cfg(target_os = "espidf")]
use crate::drivers::button::{confirm_press, ButtonId};
#[cfg(target_os = "espidf")]
use crate::drivers::hw_init::button_pressed;
#[cfg(target_os = "espidf")]
use crate::events::{push_event, Event};

// Handles are published once at boot and then only read (the debounce
// ones from ISR context), hence atomics rather than `static mut`.
#[cfg(target_os = "espidf")]
static SAMPLE_TIMER: AtomicPtr<esp_timer> = AtomicPtr::new(core::ptr::null_mut());
#[cfg(target_os = "espidf")]
static DEBOUNCE_TIMERS: [AtomicPtr<esp_timer>; 2] =
    [const { AtomicPtr::new(core::ptr::null_mut()) }; 2];
#[cfg(target_os = "espidf")]
static DEBOUNCE_US: core::sync::atomic::AtomicU64 = core::sync::atomic::AtomicU64::new(50_000);

#[cfg(target_os = "espidf")]
unsafe extern "C" fn sample_tick_cb(_arg: *mut core::ffi::c_void) {
    push_event(Event::SampleTick);
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn debounce_cb(arg: *mut core::ffi::c_void) {
    if let Some(id) = ButtonId::from_index(arg as usize) {
        confirm_press(id, button_pressed(id.channel().gpio()));
    }
}

#[cfg(target_os = "espidf")]
unsafe fn create_timer(
    callback: unsafe extern "C" fn(*mut core::ffi::c_void),
    arg: usize,
    name: &'static core::ffi::CStr,
) -> Result<esp_timer_handle_t, HwInitError> {
    let args = esp_timer_create_args_t {
        callback: Some(callback),
        arg: arg as *mut _,
        dispatch_method: esp_timer_dispatch_t_ESP_TIMER_TASK,
        name: name.as_ptr(),
        skip_unhandled_events: true,
    };
    let mut handle: esp_timer_handle_t = core::ptr::null_mut();
    // SAFETY: `args` and `name` outlive the call; `handle` is a valid out-pointer.
    let ret = unsafe { esp_timer_create(&args, &mut handle) };
    if ret != ESP_OK as i32 {
        return Err(HwInitError::TimerFailed(ret));
    }
    Ok(handle)
}

/// Create the debounce timers and start the periodic sample timer.
#[cfg(target_os = "espidf")]
pub fn start_timers(sample_interval_ms: u32, debounce_ms: u32) -> Result<(), HwInitError> {
    DEBOUNCE_US.store(u64::from(debounce_ms) * 1_000, Ordering::Relaxed);

    // SAFETY: boot-time, single main-task context, before the GPIO ISRs
    // that read DEBOUNCE_TIMERS are installed.
    unsafe {
        for id in ButtonId::ALL {
            let handle = create_timer(debounce_cb, id as usize, c"debounce")?;
            DEBOUNCE_TIMERS[id as usize].store(handle, Ordering::Release);
        }

        let handle = create_timer(sample_tick_cb, 0, c"sample")?;
        let ret = esp_timer_start_periodic(handle, u64::from(sample_interval_ms) * 1_000);
        if ret != ESP_OK as i32 {
            return Err(HwInitError::TimerFailed(ret));
        }
        SAMPLE_TIMER.store(handle, Ordering::Release);
    }

    info!(
        "hw_timer: sample every {} ms, debounce {} ms",
        sample_interval_ms, debounce_ms
    );
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn start_timers(sample_interval_ms: u32, debounce_ms: u32) -> Result<(), HwInitError> {
    log::info!(
        "hw_timer(sim): not started (sample {} ms, debounce {} ms)",
        sample_interval_ms,
        debounce_ms
    );
    Ok(())
}

/// Arm (or re-arm) the confirmation timer for one button. ISR-safe.
#[cfg(target_os = "espidf")]
pub fn arm_debounce(id: ButtonId) {
    let handle = DEBOUNCE_TIMERS[id as usize].load(Ordering::Acquire);
    if handle.is_null() {
        return;
    }
    // SAFETY: handle was created in start_timers(). esp_timer_stop/start_once
    // are callable from ISR context; stop fails harmlessly when idle.
    unsafe {
        esp_timer_stop(handle);
        esp_timer_start_once(handle, DEBOUNCE_US.load(Ordering::Relaxed));
    }
}

/// Stop every timer (deep sleep preparation).
#[cfg(target_os = "espidf")]
pub fn stop_timers() {
    // SAFETY: null-checked handles created by start_timers().
    unsafe {
        let st = SAMPLE_TIMER.load(Ordering::Acquire);
        if !st.is_null() {
            esp_timer_stop(st);
        }
        for slot in &DEBOUNCE_TIMERS {
            let t = slot.load(Ordering::Acquire);
            if !t.is_null() {
                esp_timer_stop(t);
            }
        }
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn stop_timers() {}
