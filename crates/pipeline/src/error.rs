//! Pipeline error types

use thiserror::Error;

/// Errors that stop the pipeline from starting or finishing
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid log level: {0:?}")]
    LogLevel(String),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("Failed to spawn thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("{0} thread panicked")]
    ThreadPanicked(&'static str),
}
