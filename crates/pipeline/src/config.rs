//! Pipeline configuration
//!
//! Settings are layered: built-in defaults, an optional TOML file, then
//! `TELEMETRY_*` environment variables (nested keys use `__`, e.g.
//! `TELEMETRY_PUBLISHER__BROKER_URI`). CLI flags are applied on top by the
//! binary. Call [`Settings::clamped`] before handing values to the core.

use crate::error::PipelineError;
use config::{Config, Environment, File};
use ring_buffer::OverflowPolicy;
use serde::{Deserialize, Serialize};
use sim_sensor::SimSensorConfig;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Transport queue capacity shared by the whole binary
pub const RING_CAPACITY: usize = 256;

/// Largest moving-average window shared by the whole binary
pub const MAX_AVG_WINDOW: usize = 256;

/// Upper bound for the requested sample count
pub const MAX_SAMPLES: usize = 1_000_000;

/// Highest MQTT QoS level
pub const MAX_QOS: u8 = 2;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "TELEMETRY";

/// Full-queue policy as written in config files and on the command line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum QueuePolicy {
    /// Drop the newest sample when the queue is full
    #[default]
    Reject,
    /// Evict the oldest unread sample when the queue is full
    OverwriteOldest,
}

impl From<QueuePolicy> for OverflowPolicy {
    fn from(policy: QueuePolicy) -> Self {
        match policy {
            QueuePolicy::Reject => OverflowPolicy::Reject,
            QueuePolicy::OverwriteOldest => OverflowPolicy::OverwriteOldest,
        }
    }
}

/// Console log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Broker publishing settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherSettings {
    /// Try to publish at all
    pub enabled: bool,
    /// Broker address, e.g. `tcp://localhost:1883`
    pub broker_uri: String,
    /// MQTT client identifier (random when empty)
    pub client_id: String,
    /// Keep-alive interval in seconds (0 => 60)
    pub keep_alive_secs: u64,
    /// Topic readings are published to
    pub topic: String,
    /// Delivery level: 0 fire-and-forget, 1 at-least-once, 2 exactly-once
    pub qos: u8,
    /// Ask the broker to retain the last reading
    pub retain: bool,
}

impl Default for PublisherSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            broker_uri: "tcp://localhost:1883".to_string(),
            client_id: "sensor_sim".to_string(),
            keep_alive_secs: 60,
            topic: "sensors/demo/readings".to_string(),
            qos: 0,
            retain: false,
        }
    }
}

impl PublisherSettings {
    /// Keep-alive as a duration
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }
}

/// Pipeline settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Max log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Console log format
    pub log_format: LogFormat,
    /// Moving-average window, clamped into `1..=MAX_AVG_WINDOW`
    pub window: usize,
    /// Samples to produce and consume, clamped into `1..=MAX_SAMPLES`
    pub samples: usize,
    /// Delay between produced samples (ms)
    pub sample_period_ms: u64,
    /// Consumer sleep when the queue is empty (ms)
    pub poll_backoff_ms: u64,
    /// Extra time the consumer waits beyond `samples × period` (ms)
    pub drain_grace_ms: u64,
    /// Full-queue policy
    pub queue_policy: QueuePolicy,
    /// Broker publishing
    pub publisher: PublisherSettings,
    /// Simulated sensor model
    pub sensor: SimSensorConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            window: 10,
            samples: 200,
            sample_period_ms: 10,
            poll_backoff_ms: 1,
            drain_grace_ms: 2000,
            queue_policy: QueuePolicy::Reject,
            publisher: PublisherSettings::default(),
            sensor: SimSensorConfig::default(),
        }
    }
}

impl Settings {
    /// Load settings from an optional file plus the environment
    pub fn load(path: Option<&Path>) -> Result<Self, PipelineError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder.build()?.try_deserialize()?;
        Ok(settings)
    }

    /// Force every value into the range the core accepts
    pub fn clamped(mut self) -> Self {
        let window = self.window.clamp(1, MAX_AVG_WINDOW);
        if window != self.window {
            warn!("Window {} out of range, using {}", self.window, window);
            self.window = window;
        }

        let samples = self.samples.clamp(1, MAX_SAMPLES);
        if samples != self.samples {
            warn!("Sample count {} out of range, using {}", self.samples, samples);
            self.samples = samples;
        }

        if self.publisher.qos > MAX_QOS {
            warn!("QoS {} out of range, using {}", self.publisher.qos, MAX_QOS);
            self.publisher.qos = MAX_QOS;
        }

        self
    }

    /// Delay between produced samples
    pub fn sample_period(&self) -> Duration {
        Duration::from_millis(self.sample_period_ms)
    }

    /// Consumer sleep on an empty queue
    pub fn poll_backoff(&self) -> Duration {
        Duration::from_millis(self.poll_backoff_ms)
    }

    /// Wall-clock budget for the consumer
    pub fn drain_budget(&self) -> Duration {
        let production = self.sample_period_ms.saturating_mul(self.samples as u64);
        Duration::from_millis(production.saturating_add(self.drain_grace_ms))
    }
}
