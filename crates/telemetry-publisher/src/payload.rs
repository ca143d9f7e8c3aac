//! CSV reading payload
//!
//! Wire shape: `tempC,avgTempC,pressKPa,avgPressKPa`, three decimals each,
//! e.g. `23.412,23.120,101.600,101.700`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors while parsing a payload
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("Expected 4 fields, got {0}")]
    FieldCount(usize),

    #[error("Invalid number in field {index}: {value:?}")]
    InvalidNumber { index: usize, value: String },
}

/// One published reading: raw and smoothed temperature and pressure
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReadingPayload {
    /// Raw temperature (°C)
    pub temperature_c: f32,
    /// Moving-average temperature (°C)
    pub avg_temperature_c: f32,
    /// Raw pressure (kPa)
    pub pressure_kpa: f32,
    /// Moving-average pressure (kPa)
    pub avg_pressure_kpa: f32,
}

impl ReadingPayload {
    /// Render the payload bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

impl fmt::Display for ReadingPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.3},{:.3},{:.3},{:.3}",
            self.temperature_c, self.avg_temperature_c, self.pressure_kpa, self.avg_pressure_kpa
        )
    }
}

impl FromStr for ReadingPayload {
    type Err = PayloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.trim().split(',').collect();
        if fields.len() != 4 {
            return Err(PayloadError::FieldCount(fields.len()));
        }

        let mut values = [0.0f32; 4];
        for (index, (slot, field)) in values.iter_mut().zip(&fields).enumerate() {
            *slot = field
                .trim()
                .parse()
                .map_err(|_| PayloadError::InvalidNumber {
                    index,
                    value: field.to_string(),
                })?;
        }

        Ok(Self {
            temperature_c: values[0],
            avg_temperature_c: values[1],
            pressure_kpa: values[2],
            avg_pressure_kpa: values[3],
        })
    }
}
