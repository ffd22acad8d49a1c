//! Button, LED and timer drivers, hardware initialisation and watchdog.

pub mod button;
pub mod hw_init;
pub mod hw_timer;
pub mod led;
pub mod watchdog;
