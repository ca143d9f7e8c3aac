//! Sample record and source trait

use std::time::Instant;

/// One sensor reading
///
/// Plain `Copy` value with no heap ownership, so it can be moved through the
/// transport queue by a byte copy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSample {
    /// Capture time
    pub timestamp: Instant,
    /// Temperature in degrees Celsius
    pub temperature_c: f32,
    /// Pressure in kilopascals
    pub pressure_kpa: f32,
}

impl SensorSample {
    /// Create a sample stamped with the current time
    pub fn now(temperature_c: f32, pressure_kpa: f32) -> Self {
        Self {
            timestamp: Instant::now(),
            temperature_c,
            pressure_kpa,
        }
    }
}

/// Pull-style producer of samples
pub trait SampleSource {
    /// Produce the next sample
    fn produce(&mut self) -> SensorSample;
}

impl<F> SampleSource for F
where
    F: FnMut() -> SensorSample,
{
    fn produce(&mut self) -> SensorSample {
        self()
    }
}
