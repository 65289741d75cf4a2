//! Custom error types for the shutter actor.
//!
//! This module defines `FpiError`, the error type for infrastructure problems
//! in the crate. Device-level outcomes (a shutter command exiting non-zero, an
//! unparseable acknowledgment, a position mismatch) are deliberately NOT errors:
//! they are modelled as values (`CommandOutcome`, `ParsedAck`,
//! `OperationOutcome`) so that callers must handle each path explicitly.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: Wraps errors from `figment`, typically file parsing or type
//!   mismatches in the configuration.
//! - **`Configuration`**: Semantic errors caught during validation (empty
//!   command names, unknown log levels, bad argument templates).
//! - **`Io`**: Wraps standard `std::io::Error`, e.g. writing replies to stdout.
//! - **`Spawn`**: An external command could not be launched at all.
//! - **`Template`**: A calibration-box argument template could not be rendered.
//! - **`Surface`**: A command line received by the command surface is invalid.
//! - **`ActorStopped`**: The shutter actor task is no longer running.

use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type FpiResult<T> = std::result::Result<T, FpiError>;

#[allow(missing_docs)]
#[derive(Error, Debug)]
pub enum FpiError {
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to render argument template '{template}': {reason}")]
    Template { template: String, reason: String },

    #[error("Invalid command: {0}")]
    Surface(String),

    #[error("Shutter actor is not running")]
    ActorStopped,
}

impl From<figment::Error> for FpiError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FpiError::Configuration("open_command is empty".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration validation error: open_command is empty"
        );
    }

    #[test]
    fn test_spawn_error_keeps_command() {
        let err = FpiError::Spawn {
            command: "open-shutter".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        };
        let text = err.to_string();
        assert!(text.contains("open-shutter"));
        assert!(text.contains("no such file"));
    }
}
