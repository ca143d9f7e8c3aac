//! Telemetry Pipeline - Main Entry Point

use anyhow::Context;
use clap::Parser;
use sim_sensor::SimSensor;
use telemetry_pipeline::{describe_metrics, init_logging, Cli, Pipeline, Settings};
use telemetry_publisher::{MqttPublisher, TelemetrySink};
use tracing::{info, warn};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref()).context("loading settings")?;
    cli.apply(&mut settings);
    init_logging(&settings.log_level, settings.log_format)?;
    describe_metrics();

    info!("=== Telemetry Pipeline v{} ===", env!("CARGO_PKG_VERSION"));

    let pipeline = Pipeline::new(settings);
    let settings = pipeline.settings();
    let sensor = SimSensor::new(settings.sensor);

    let mut publisher = MqttPublisher::new();
    let sink: Option<&mut dyn TelemetrySink> = if settings.publisher.enabled {
        let publisher_settings = &settings.publisher;
        match publisher.connect(
            &publisher_settings.broker_uri,
            &publisher_settings.client_id,
            publisher_settings.keep_alive(),
        ) {
            Ok(()) => Some(&mut publisher as &mut dyn TelemetrySink),
            Err(e) => {
                warn!(
                    "MQTT broker {} unavailable ({}), continuing without publishing",
                    publisher_settings.broker_uri, e
                );
                None
            }
        }
    } else {
        info!("Publishing disabled");
        None
    };

    let report = pipeline.run(sensor, sink)?;

    info!(
        "Done in {:.2?}: produced {}, dropped {}, overwritten {}, consumed {}, published {}, publish failures {}",
        report.elapsed,
        report.producer.produced,
        report.producer.dropped,
        report.overwritten,
        report.drain.consumed,
        report.drain.published,
        report.drain.publish_failures
    );
    if let Some(last) = report.drain.last {
        info!("Last reading: {}", last);
    }

    publisher.disconnect();
    Ok(())
}
