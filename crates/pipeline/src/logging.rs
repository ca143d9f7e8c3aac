//! Console logging setup

use crate::config::LogFormat;
use crate::error::PipelineError;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Install the global tracing subscriber
///
/// Fails if `level` is not a tracing level name or a subscriber is already
/// installed.
pub fn init_logging(level: &str, format: LogFormat) -> Result<(), PipelineError> {
    let level: Level = level
        .trim()
        .parse()
        .map_err(|_| PipelineError::LogLevel(level.to_string()))?;

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true);

    let result = match format {
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.finish()),
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish()),
    };
    result.map_err(|e| PipelineError::Logging(e.to_string()))
}
