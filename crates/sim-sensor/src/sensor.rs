//! Noisy sinusoidal sensor model

use crate::sample::{SampleSource, SensorSample};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use std::time::{Duration, Instant};
use tracing::debug;

/// Simulated sensor configuration
///
/// Units: Hz, °C, kPa, radians.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimSensorConfig {
    /// Frequency of the pressure oscillation (Hz)
    pub pressure_freq_hz: f64,
    /// Frequency of the temperature oscillation (Hz)
    pub temperature_freq_hz: f64,
    /// Pressure oscillation amplitude (kPa)
    pub pressure_amplitude_kpa: f64,
    /// Temperature oscillation amplitude (°C)
    pub temperature_amplitude_c: f64,
    /// Uniform noise as a fraction of each amplitude (0.15 => ±15%)
    pub noise_fraction: f64,
    /// Ambient baseline temperature (°C)
    pub base_temperature_c: f64,
    /// Nominal system pressure (kPa)
    pub base_pressure_kpa: f64,
    /// Phase offset of the pressure wave (radians)
    pub pressure_phase_rad: f64,
    /// Pressure drift per degree of temperature deviation (kPa/°C)
    pub coupling_kpa_per_c: f64,
    /// Fixed RNG seed for reproducible noise
    pub seed: Option<u64>,
}

impl Default for SimSensorConfig {
    fn default() -> Self {
        Self {
            pressure_freq_hz: 0.8333,
            temperature_freq_hz: 0.1,
            pressure_amplitude_kpa: 15.0,
            temperature_amplitude_c: 400.0,
            noise_fraction: 0.15,
            base_temperature_c: 27.5,
            base_pressure_kpa: 1400.0,
            pressure_phase_rad: 0.7,
            coupling_kpa_per_c: 0.5,
            seed: None,
        }
    }
}

impl SimSensorConfig {
    /// Same model without noise, for predictable output
    pub fn noiseless() -> Self {
        Self {
            noise_fraction: 0.0,
            ..Default::default()
        }
    }
}

/// Synthetic temperature/pressure sensor
///
/// Temperature is a slow wave around its baseline. Pressure is a faster wave
/// around its nominal value plus a partial coupling to the temperature
/// deviation. Time is measured from construction.
pub struct SimSensor {
    config: SimSensorConfig,
    start: Instant,
    rng: StdRng,
}

impl SimSensor {
    /// Create a new sensor
    pub fn new(config: SimSensorConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        debug!("Creating simulated sensor: {:?}", config);

        Self {
            config,
            start: Instant::now(),
            rng,
        }
    }

    /// Get the sensor configuration
    pub fn config(&self) -> &SimSensorConfig {
        &self.config
    }

    /// Read the sensor at the current time
    pub fn read(&mut self) -> SensorSample {
        self.sample_at(self.start.elapsed())
    }

    /// Evaluate the model `elapsed` after construction
    pub fn sample_at(&mut self, elapsed: Duration) -> SensorSample {
        let t = elapsed.as_secs_f64();
        let cfg = self.config;

        let temperature_c = self.noisy_sine(
            t,
            cfg.temperature_freq_hz,
            cfg.temperature_amplitude_c,
            cfg.base_temperature_c,
            0.0,
        );
        let pressure_wave = self.noisy_sine(
            t,
            cfg.pressure_freq_hz,
            cfg.pressure_amplitude_kpa,
            0.0,
            cfg.pressure_phase_rad,
        );
        let pressure_kpa = cfg.base_pressure_kpa
            + pressure_wave
            + cfg.coupling_kpa_per_c * (temperature_c - cfg.base_temperature_c);

        SensorSample {
            timestamp: self.start + elapsed,
            temperature_c: temperature_c as f32,
            pressure_kpa: pressure_kpa as f32,
        }
    }

    /// `offset + amplitude * sin(2π f t + phase)` plus uniform noise
    fn noisy_sine(&mut self, t: f64, freq_hz: f64, amplitude: f64, offset: f64, phase: f64) -> f64 {
        let noise_range = (amplitude * self.config.noise_fraction).abs();
        let noise = if noise_range > 0.0 && noise_range.is_finite() {
            self.rng.gen_range(-noise_range..=noise_range)
        } else {
            0.0
        };

        offset + amplitude * (TAU * freq_hz * t + phase).sin() + noise
    }
}

impl Default for SimSensor {
    fn default() -> Self {
        Self::new(SimSensorConfig::default())
    }
}

impl SampleSource for SimSensor {
    fn produce(&mut self) -> SensorSample {
        self.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_noiseless_at_origin() {
        let mut sensor = SimSensor::new(SimSensorConfig::noiseless());
        let sample = sensor.sample_at(Duration::ZERO);

        assert!((sample.temperature_c - 27.5).abs() < 1e-4);
        // 1400 + 15 * sin(0.7), no temperature deviation at t = 0
        let expected = 1400.0 + 15.0 * 0.7f64.sin();
        assert!((f64::from(sample.pressure_kpa) - expected).abs() < 1e-3);
    }

    #[test]
    fn test_noiseless_quarter_period() {
        let mut sensor = SimSensor::new(SimSensorConfig::noiseless());
        // Quarter of the 10 s temperature period: sin = 1
        let sample = sensor.sample_at(Duration::from_millis(2500));

        assert!((sample.temperature_c - 427.5).abs() < 1e-3);
        // Coupling adds 0.5 kPa per degree of deviation
        let wave = 15.0 * (TAU * 0.8333 * 2.5 + 0.7).sin();
        let expected = 1400.0 + wave + 0.5 * 400.0;
        assert!((f64::from(sample.pressure_kpa) - expected).abs() < 1e-2);
    }

    #[test]
    fn test_seed_is_reproducible() {
        let config = SimSensorConfig {
            seed: Some(42),
            ..Default::default()
        };
        let mut a = SimSensor::new(config);
        let mut b = SimSensor::new(config);

        for i in 0..20 {
            let at = Duration::from_millis(i * 50);
            let (sa, sb) = (a.sample_at(at), b.sample_at(at));
            assert_eq!(sa.temperature_c, sb.temperature_c);
            assert_eq!(sa.pressure_kpa, sb.pressure_kpa);
        }
    }

    #[test]
    fn test_produce_advances_timestamp() {
        let mut sensor = SimSensor::default();
        let first = sensor.produce();
        let second = sensor.produce();
        assert!(second.timestamp >= first.timestamp);
    }

    proptest! {
        #[test]
        fn prop_readings_stay_in_envelope(millis in 0u64..120_000, seed in any::<u64>()) {
            let config = SimSensorConfig { seed: Some(seed), ..Default::default() };
            let mut sensor = SimSensor::new(config);
            let sample = sensor.sample_at(Duration::from_millis(millis));

            let temp_span = config.temperature_amplitude_c * (1.0 + config.noise_fraction);
            let deviation = f64::from(sample.temperature_c) - config.base_temperature_c;
            prop_assert!(deviation.abs() <= temp_span + 1e-3);

            let press_span = config.pressure_amplitude_kpa * (1.0 + config.noise_fraction)
                + config.coupling_kpa_per_c * temp_span;
            let press_dev = f64::from(sample.pressure_kpa) - config.base_pressure_kpa;
            prop_assert!(press_dev.abs() <= press_span + 1e-2);
        }
    }
}
