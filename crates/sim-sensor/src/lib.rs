//! Simulated Sensor
//!
//! Produces timestamped temperature/pressure samples for the telemetry
//! pipeline. Hardware-free: readings come from a noisy sinusoidal model.

mod sample;
mod sensor;

pub use sample::{SampleSource, SensorSample};
pub use sensor::{SimSensor, SimSensorConfig};
