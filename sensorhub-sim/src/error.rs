//! Error types for simulated hardware

use thiserror::Error;

/// Result type alias for simulation setup
pub type Result<T> = std::result::Result<T, SimError>;

/// Errors raised while building a simulation
#[derive(Error, Debug)]
pub enum SimError {
    /// Pattern parameters out of range
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    /// Channel count does not match the sensor type
    #[error("{sensor} expects {expected} channels, got {actual}")]
    ChannelCount {
        sensor: String,
        expected: usize,
        actual: usize,
    },

    /// Virtual sensors cannot be simulated directly
    #[error("{0} is a virtual sensor")]
    VirtualSensor(String),

    /// Profile file could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Profile file is not valid JSON
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
}
