//! Telemetry Pipeline
//!
//! Wires a simulated sensor, the SPSC transport queue, per-channel moving
//! averages and an MQTT sink into one run:
//! - layered settings (defaults, TOML file, environment, CLI flags)
//! - non-blocking producer with drop accounting
//! - polling consumer with a wall-clock deadline
//! - structured logging and `metrics` counters

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod runner;

pub use cli::Cli;
pub use config::{
    LogFormat, PublisherSettings, QueuePolicy, Settings, MAX_AVG_WINDOW, MAX_SAMPLES,
    RING_CAPACITY,
};
pub use error::PipelineError;
pub use logging::init_logging;
pub use runner::{
    produce, Drain, DrainReport, Pipeline, PipelineReport, ProducerReport, PublishTarget,
    SampleQueue, Smoother,
};

/// Register descriptions for the counters the pipeline emits
///
/// Counters go through the `metrics` facade. Nothing is recorded until the
/// embedding application installs a recorder or exporter; the bundled
/// binary installs none.
pub fn describe_metrics() {
    metrics::describe_counter!(
        "telemetry_samples_produced_total",
        "Samples read from the sensor"
    );
    metrics::describe_counter!(
        "telemetry_samples_dropped_total",
        "Samples dropped because the queue was full"
    );
    metrics::describe_counter!(
        "telemetry_samples_consumed_total",
        "Samples taken off the queue and filtered"
    );
    metrics::describe_counter!(
        "telemetry_publish_failures_total",
        "Readings the sink failed to publish"
    );
}
