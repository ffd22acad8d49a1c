//! NVS (Non-Volatile Storage) flash initialisation.
//!
//! Bluedroid keeps bonding and PHY calibration data in NVS, so the
//! partition must be usable before the controller starts. The firmware
//! stores nothing of its own there.

use log::info;

use crate::error::Error;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

/// Initialise the default NVS partition. On "no free pages" or "new
/// version found" the partition is erased and initialised again.
#[cfg(target_os = "espidf")]
pub fn init_flash() -> Result<(), Error> {
    // SAFETY: nvs_flash_init / nvs_flash_erase are called from the single
    // main-task context before any other NVS user exists.
    let ret = unsafe { nvs_flash_init() };
    if ret == ESP_ERR_NVS_NO_FREE_PAGES as i32 || ret == ESP_ERR_NVS_NEW_VERSION_FOUND as i32 {
        log::warn!("NVS: erasing and re-initialising flash partition (rc={})", ret);
        if unsafe { nvs_flash_erase() } != ESP_OK as i32 {
            return Err(Error::Init("nvs_flash_erase failed"));
        }
        if unsafe { nvs_flash_init() } != ESP_OK as i32 {
            return Err(Error::Init("nvs_flash_init failed after erase"));
        }
    } else if ret != ESP_OK as i32 {
        log::error!("NVS: nvs_flash_init failed (rc={})", ret);
        return Err(Error::Init("nvs_flash_init failed"));
    }
    info!("NVS: flash initialised");
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn init_flash() -> Result<(), Error> {
    info!("NVS(sim): nothing to initialise");
    Ok(())
}
