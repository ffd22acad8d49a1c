//! Battery BLE peripheral: main entry point.
//!
//! Hexagonal architecture with a timer-driven event loop and idle deep sleep.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  HardwareAdapter       LogEventSink   BleAdapter   Esp32Time   │
//! │  (BatteryPort+LedPort) (EventSink)    (GattHost)   (uptime)    │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              AppService (pure logic)                   │    │
//! │  │  Peripheral FSM · Button actions · Idle policy         │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  esp_timer callbacks ──▶ Event queue ◀── GPIO ISR (debounce)   │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use anyhow::{Context, Result};
use esp_idf_svc::hal::delay::FreeRtos;
use esp_idf_svc::hal::peripherals::Peripherals;
use log::info;

use battery_ble::adapters::ble::{self, BleAdapter};
use battery_ble::adapters::hardware::HardwareAdapter;
use battery_ble::adapters::log_sink::LogEventSink;
use battery_ble::adapters::nvs;
use battery_ble::adapters::time::Esp32TimeAdapter;
use battery_ble::app::service::AppService;
use battery_ble::config::{ButtonMode, SystemConfig};
use battery_ble::drivers::button;
use battery_ble::drivers::hw_init::{self, OneshotAdc, OutputGpio};
use battery_ble::drivers::{hw_timer, watchdog::Watchdog};
use battery_ble::error::Error;
use battery_ble::events;
use battery_ble::pins;
use battery_ble::power;
use battery_ble::sensors::BatteryReader;

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  Battery BLE v{}                    ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Configuration ──────────────────────────────────────
    let config = SystemConfig::default();
    config
        .validate()
        .map_err(anyhow::Error::from)
        .context("invalid configuration")?;
    info!("Config: {}", serde_json::to_string(&config)?);

    let wake = power::wake_reason();
    info!("Boot: {:?}", wake);

    // ── 3. Platform services ──────────────────────────────────
    nvs::init_flash().context("NVS flash init")?;
    let watchdog = Watchdog::new(config.watchdog_timeout_ms);
    let peripherals = Peripherals::take().context("peripherals already taken")?;

    let interrupts = config.button_mode == ButtonMode::Interrupt;
    button::configure(config.debounce_ms);
    hw_init::init_peripherals(interrupts).context("GPIO init")?;

    // ── 4. Hardware adapter ───────────────────────────────────
    let adc = OneshotAdc::new(pins::BATTERY_ADC_CHANNEL, config.use_calibration)
        .context("ADC init")?;
    let reader = BatteryReader::initialize(adc, OutputGpio(pins::ADC_ENABLE_GPIO), &config)
        .context("battery reader init")?;
    let mut hw = HardwareAdapter::new(
        reader,
        OutputGpio(pins::USER_LED_GPIO),
        OutputGpio(pins::STATUS_LED_GPIO),
        FreeRtos,
    );

    let mut log_sink = LogEventSink::new();
    let time = Esp32TimeAdapter::new();

    // ── 5. BLE stack (fatal on failure) ───────────────────────
    let mut gatt = BleAdapter::new();
    gatt.start(peripherals.modem)
        .map_err(Error::from)
        .context("BLE bring-up")?;

    // ── 6. App service ────────────────────────────────────────
    let mut app = AppService::new(&config);
    app.start(&mut hw, &mut gatt, &mut log_sink);

    // ── 7. Event sources ──────────────────────────────────────
    hw_timer::start_timers(config.sample_interval_ms, config.debounce_ms)
        .context("timer start")?;
    if interrupts {
        hw_init::init_isr_service().context("GPIO ISR service")?;
    }

    info!("System ready. Entering event loop.");

    // ── 8. Event loop ─────────────────────────────────────────
    loop {
        events::drain_events(|event| {
            app.handle_event(event, &mut hw, &mut gatt, &mut log_sink);
        });

        ble::drain_stack_events(|event| {
            app.handle_stack_event(event, &mut gatt, &mut log_sink);
        });
        // A half-built service table cannot recover; let the runtime reboot.
        if let Some(fault) = app.peripheral().fault() {
            return Err(Error::from(fault)).context("BLE service bring-up");
        }
        app.maintain_ble(&mut gatt, &mut log_sink);

        let now_ms = time.uptime_ms();

        if !interrupts {
            app.poll_buttons(
                now_ms,
                hw_init::button_pressed,
                &mut hw,
                &mut gatt,
                &mut log_sink,
            );
        }

        app.tick_status_led(config.loop_interval_ms, &mut hw);
        watchdog.feed();

        if app.should_sleep(now_ms, &mut log_sink) {
            hw_timer::stop_timers();
            hw.all_off();
            power::enter_deep_sleep(config.deep_sleep_wake_secs, pins::BUTTON_PRIMARY_GPIO);
        }

        FreeRtos::delay_ms(config.loop_interval_ms);
    }
}
