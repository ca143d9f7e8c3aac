//! Command-line interface

use crate::config::{QueuePolicy, Settings};
use clap::Parser;
use std::path::PathBuf;

/// Simulated sensor → lock-free queue → moving average → MQTT
#[derive(Debug, Parser)]
#[command(name = "telemetry-pipeline", version)]
pub struct Cli {
    /// TOML settings file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Moving-average window (samples)
    #[arg(short, long)]
    pub window: Option<usize>,

    /// Number of samples to produce
    #[arg(short = 'n', long)]
    pub samples: Option<usize>,

    /// Delay between samples (ms)
    #[arg(long)]
    pub period_ms: Option<u64>,

    /// What to do when the queue is full
    #[arg(long, value_enum)]
    pub policy: Option<QueuePolicy>,

    /// Broker address, e.g. tcp://localhost:1883
    #[arg(long)]
    pub broker: Option<String>,

    /// Topic to publish readings to
    #[arg(long)]
    pub topic: Option<String>,

    /// MQTT QoS level (0-2)
    #[arg(long)]
    pub qos: Option<u8>,

    /// Publish with the retain flag
    #[arg(long)]
    pub retain: bool,

    /// Run without a broker
    #[arg(long)]
    pub no_publish: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,
}

impl Cli {
    /// Overlay the flags that were given onto loaded settings
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(window) = self.window {
            settings.window = window;
        }
        if let Some(samples) = self.samples {
            settings.samples = samples;
        }
        if let Some(period_ms) = self.period_ms {
            settings.sample_period_ms = period_ms;
        }
        if let Some(policy) = self.policy {
            settings.queue_policy = policy;
        }
        if let Some(broker) = &self.broker {
            settings.publisher.broker_uri = broker.clone();
        }
        if let Some(topic) = &self.topic {
            settings.publisher.topic = topic.clone();
        }
        if let Some(qos) = self.qos {
            settings.publisher.qos = qos;
        }
        if self.retain {
            settings.publisher.retain = true;
        }
        if self.no_publish {
            settings.publisher.enabled = false;
        }
        if let Some(level) = &self.log_level {
            settings.log_level = level.clone();
        }
        if self.json_logs {
            settings.log_format = crate::config::LogFormat::Json;
        }
    }
}
