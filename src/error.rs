//! Error types for Tello protocol operations

use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TelloError>;

#[derive(Error, Debug)]
pub enum TelloError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("No reply within {0:?}")]
    Timeout(Duration),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Malformed telemetry: {0}")]
    Telemetry(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl TelloError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TelloError::Timeout(_))
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, TelloError::Connection(_))
    }
}
