//! Daemon error type

use sensorhub::HubError;
use sensorhub_sim::SimError;
use thiserror::Error;

use crate::replay::ReplayError;

/// Errors that stop the daemon or a client connection
#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("Hub error: {0}")]
    Hub(#[from] HubError),

    #[error("Simulation error: {0}")]
    Sim(#[from] SimError),

    #[error("Replay error: {0}")]
    Replay(#[from] ReplayError),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Malformed request: {0}")]
    Protocol(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DaemonError>;
