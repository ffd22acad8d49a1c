//! Battery voltage reader.
//!
//! Reads the cell through a 1:2 resistive divider on an ADC1 channel,
//! converts the raw code to millivolts, and maps the voltage linearly
//! onto 0–100 % between an empty and a full threshold.
//!
//! ## Conversion chain
//!
//! ```text
//! raw code ──▶ pin mV ──▶ × divider ──▶ battery mV ──▶ percent
//!           (curve or                             (clamped linear
//!            fixed ratio)                          interpolation)
//! ```
//!
//! The factory calibration curve is used when the ADC driver can build
//! one; otherwise the reader falls back to `raw * reference / max_code`,
//! which is an approximation rather than a precision measurement.
//!
//! ## Dual-target design
//!
//! The reader is generic over [`AdcChannel`] and an `embedded_hal` output
//! pin for the front-end enable line. On ESP-IDF those are the oneshot
//! driver from `hw_init` and a `PinDriver`; on host/test they are mocks.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use log::{debug, info, warn};

use crate::config::SystemConfig;
use crate::error::{Error, SensorError};

/// One raw ADC channel plus whatever calibration the driver offers.
pub trait AdcChannel {
    /// Perform exactly one conversion.
    fn read_raw(&mut self) -> Result<u16, SensorError>;

    /// Whether a factory calibration curve was created for this channel.
    fn has_calibration(&self) -> bool;

    /// Convert a raw code through the calibration curve. `None` if there
    /// is no curve or the conversion failed.
    fn calibrated_mv(&self, raw: u16) -> Option<u32>;
}

/// A single derived battery reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatterySample {
    /// Raw conversion result (0 – 4095).
    pub raw: u16,
    /// Battery voltage after divider compensation. Never negative.
    pub millivolts: f32,
    /// Clamped 0 – 100.
    pub percent: u8,
}

/// How raw codes become pin millivolts. Fixed for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VoltageMapping {
    Calibrated,
    FixedRatio { reference_mv: f32, max_code: u16 },
}

/// Linear discharge curve between two thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DischargeCurve {
    pub empty_mv: f32,
    pub full_mv: f32,
}

impl DischargeCurve {
    pub const fn new(empty_mv: f32, full_mv: f32) -> Self {
        Self { empty_mv, full_mv }
    }

    /// Percent charge for a battery voltage, clamped to 0–100 and
    /// truncated toward zero.
    ///
    /// ```
    /// use battery_ble::sensors::battery::DischargeCurve;
    ///
    /// let curve = DischargeCurve::new(3000.0, 4200.0);
    /// assert_eq!(curve.percent(3600.0), 50);
    /// assert_eq!(curve.percent(5000.0), 100);
    /// ```
    pub fn percent(&self, millivolts: f32) -> u8 {
        let span = self.full_mv - self.empty_mv;
        if span <= 0.0 || millivolts.is_nan() {
            return 0;
        }
        let pct = (millivolts - self.empty_mv) / span * 100.0;
        pct.clamp(0.0, 100.0) as u8
    }
}

/// Uncalibrated conversion: `raw * reference / max_code`.
pub fn fixed_ratio_mv(raw: u16, reference_mv: f32, max_code: u16) -> f32 {
    if max_code == 0 {
        return 0.0;
    }
    (f32::from(raw.min(max_code)) * reference_mv / f32::from(max_code)).max(0.0)
}

pub struct BatteryReader<A, E> {
    adc: A,
    enable: E,
    mapping: VoltageMapping,
    curve: DischargeCurve,
    fallback: (f32, u16),
    divider_factor: f32,
    settle_ms: u32,
    gate_frontend: bool,
    last: Option<BatterySample>,
}

impl<A: AdcChannel, E: OutputPin> BatteryReader<A, E> {
    /// Validate the configuration, park the front-end enable pin, and pick
    /// the voltage mapping. Missing calibration is not an error.
    pub fn initialize(adc: A, mut enable: E, config: &SystemConfig) -> Result<Self, Error> {
        config.validate()?;

        let parked = if config.gate_frontend {
            enable.set_low()
        } else {
            enable.set_high()
        };
        parked.map_err(|_| Error::Init("ADC front-end enable pin"))?;

        let fallback = (config.fallback_reference_mv, config.adc_max_code);
        let mapping = if config.use_calibration && adc.has_calibration() {
            info!("battery: ADC calibration active (curve fitting)");
            VoltageMapping::Calibrated
        } else {
            if config.use_calibration {
                warn!(
                    "battery: ADC calibration unavailable, using fixed ratio ({} mV / {})",
                    fallback.0, fallback.1
                );
            }
            VoltageMapping::FixedRatio {
                reference_mv: fallback.0,
                max_code: fallback.1,
            }
        };

        Ok(Self {
            adc,
            enable,
            mapping,
            curve: DischargeCurve::new(config.empty_mv, config.full_mv),
            fallback,
            divider_factor: config.divider_factor,
            settle_ms: config.adc_settle_ms,
            gate_frontend: config.gate_frontend,
            last: None,
        })
    }

    pub fn mapping(&self) -> VoltageMapping {
        self.mapping
    }

    /// Take one sample. A failed conversion is returned to the caller and
    /// leaves [`last_sample`](Self::last_sample) untouched.
    pub fn sample(&mut self, delay: &mut impl DelayNs) -> Result<BatterySample, SensorError> {
        self.enable
            .set_high()
            .map_err(|_| SensorError::FrontEndFailed)?;
        if self.settle_ms > 0 {
            delay.delay_ms(self.settle_ms);
        }

        let raw = self.adc.read_raw();

        if self.gate_frontend && self.enable.set_low().is_err() {
            warn!("battery: could not drop front-end enable pin");
        }

        let raw = raw?;
        let sample = self.convert(raw);
        debug!(
            "battery: raw={} voltage={:.1}mV percent={}",
            sample.raw, sample.millivolts, sample.percent
        );
        self.last = Some(sample);
        Ok(sample)
    }

    /// Convert a raw code without touching the hardware.
    pub fn convert(&self, raw: u16) -> BatterySample {
        let pin_mv = match self.mapping {
            VoltageMapping::Calibrated => match self.adc.calibrated_mv(raw) {
                Some(mv) => mv as f32,
                None => fixed_ratio_mv(raw, self.fallback.0, self.fallback.1),
            },
            VoltageMapping::FixedRatio {
                reference_mv,
                max_code,
            } => fixed_ratio_mv(raw, reference_mv, max_code),
        };
        let millivolts = (pin_mv * self.divider_factor).max(0.0);
        BatterySample {
            raw,
            millivolts,
            percent: self.curve.percent(millivolts),
        }
    }

    pub fn last_sample(&self) -> Option<BatterySample> {
        self.last
    }

    /// Last good percent, or 0 before the first successful sample.
    pub fn last_percent(&self) -> u8 {
        self.last.map_or(0, |s| s.percent)
    }

    /// Drive the front-end off (deep sleep preparation).
    pub fn power_down(&mut self) {
        let _ = self.enable.set_low();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::convert::Infallible;
    use std::collections::VecDeque;

    struct FakeAdc {
        reads: VecDeque<Result<u16, SensorError>>,
        curve: Option<fn(u16) -> Option<u32>>,
    }

    impl FakeAdc {
        fn returning(reads: &[Result<u16, SensorError>]) -> Self {
            Self {
                reads: reads.iter().copied().collect(),
                curve: None,
            }
        }
    }

    impl AdcChannel for FakeAdc {
        fn read_raw(&mut self) -> Result<u16, SensorError> {
            self.reads.pop_front().unwrap_or(Ok(0))
        }
        fn has_calibration(&self) -> bool {
            self.curve.is_some()
        }
        fn calibrated_mv(&self, raw: u16) -> Option<u32> {
            self.curve.and_then(|f| f(raw))
        }
    }

    #[derive(Default)]
    struct Pin {
        high: bool,
        transitions: u32,
    }

    impl embedded_hal::digital::ErrorType for Pin {
        type Error = Infallible;
    }

    impl OutputPin for Pin {
        fn set_low(&mut self) -> Result<(), Infallible> {
            self.high = false;
            self.transitions += 1;
            Ok(())
        }
        fn set_high(&mut self) -> Result<(), Infallible> {
            self.high = true;
            self.transitions += 1;
            Ok(())
        }
    }

    #[derive(Default)]
    struct Delay {
        total_ns: u64,
    }

    impl DelayNs for Delay {
        fn delay_ns(&mut self, ns: u32) {
            self.total_ns += u64::from(ns);
        }
    }

    fn reader(adc: FakeAdc) -> BatteryReader<FakeAdc, Pin> {
        BatteryReader::initialize(adc, Pin::default(), &SystemConfig::default()).unwrap()
    }

    #[test]
    fn mid_scale_reading_maps_to_quarter_charge() {
        let mut r = reader(FakeAdc::returning(&[Ok(2048)]));
        let s = r.sample(&mut Delay::default()).unwrap();
        // 2048/4095 * 3300 * 2 = 3300.8 mV → (300.8 / 1200) * 100 = 25.07 %
        assert!((s.millivolts - 3300.8).abs() < 0.5, "got {}", s.millivolts);
        assert_eq!(s.percent, 25);
    }

    #[test]
    fn full_scale_clamps_to_100() {
        let mut r = reader(FakeAdc::returning(&[Ok(4095)]));
        let s = r.sample(&mut Delay::default()).unwrap();
        assert!((s.millivolts - 6600.0).abs() < 0.5);
        assert_eq!(s.percent, 100);
    }

    #[test]
    fn zero_code_clamps_to_0() {
        let mut r = reader(FakeAdc::returning(&[Ok(0)]));
        let s = r.sample(&mut Delay::default()).unwrap();
        assert_eq!(s.millivolts, 0.0);
        assert_eq!(s.percent, 0);
    }

    #[test]
    fn read_failure_keeps_last_sample() {
        let mut r = reader(FakeAdc::returning(&[
            Ok(2600),
            Err(SensorError::AdcReadFailed(-1)),
        ]));
        let mut d = Delay::default();
        let first = r.sample(&mut d).unwrap();
        assert_eq!(
            r.sample(&mut d),
            Err(SensorError::AdcReadFailed(-1))
        );
        assert_eq!(r.last_sample(), Some(first));
        assert_eq!(r.last_percent(), first.percent);
    }

    #[test]
    fn last_percent_zero_before_first_sample() {
        let r = reader(FakeAdc::returning(&[]));
        assert_eq!(r.last_percent(), 0);
    }

    #[test]
    fn frontend_gated_around_conversion() {
        let mut r = reader(FakeAdc::returning(&[Ok(1000)]));
        let mut d = Delay::default();
        r.sample(&mut d).unwrap();
        assert!(!r.enable.high, "enable pin must be parked low after sample");
        // init(low) + high + low
        assert_eq!(r.enable.transitions, 3);
        assert_eq!(d.total_ns, 10 * 1_000_000);
    }

    #[test]
    fn frontend_left_on_when_not_gated() {
        let config = SystemConfig {
            gate_frontend: false,
            ..SystemConfig::default()
        };
        let mut r =
            BatteryReader::initialize(FakeAdc::returning(&[Ok(1)]), Pin::default(), &config)
                .unwrap();
        assert!(r.enable.high);
        r.sample(&mut Delay::default()).unwrap();
        assert!(r.enable.high);
    }

    #[test]
    fn calibrated_mapping_uses_curve() {
        let mut adc = FakeAdc::returning(&[Ok(1234)]);
        adc.curve = Some(|_| Some(1800));
        let mut r = reader(adc);
        assert_eq!(r.mapping(), VoltageMapping::Calibrated);
        let s = r.sample(&mut Delay::default()).unwrap();
        assert_eq!(s.millivolts, 3600.0);
        assert_eq!(s.percent, 50);
    }

    #[test]
    fn calibration_failure_falls_back_per_sample() {
        let mut adc = FakeAdc::returning(&[]);
        adc.curve = Some(|raw| if raw > 4000 { None } else { Some(raw as u32) });
        let r = reader(adc);
        let s = r.convert(4095);
        assert!((s.millivolts - 6600.0).abs() < 0.5);
    }

    #[test]
    fn calibration_disabled_by_config() {
        let mut adc = FakeAdc::returning(&[]);
        adc.curve = Some(|_| Some(1));
        let config = SystemConfig {
            use_calibration: false,
            ..SystemConfig::default()
        };
        let r = BatteryReader::initialize(adc, Pin::default(), &config).unwrap();
        assert!(matches!(r.mapping(), VoltageMapping::FixedRatio { .. }));
    }

    #[test]
    fn invalid_config_rejected_at_initialize() {
        let config = SystemConfig {
            divider_factor: 0.0,
            ..SystemConfig::default()
        };
        assert!(
            BatteryReader::initialize(FakeAdc::returning(&[]), Pin::default(), &config).is_err()
        );
    }

    #[test]
    fn curve_endpoints() {
        let c = DischargeCurve::new(3000.0, 4200.0);
        assert_eq!(c.percent(3000.0), 0);
        assert_eq!(c.percent(4200.0), 100);
        assert_eq!(c.percent(2500.0), 0);
        assert_eq!(c.percent(f32::NAN), 0);
    }
}
