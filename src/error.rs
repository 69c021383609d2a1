//! Error types for the sensor hub
//!
//! Every error is recovered at the boundary of the operation that raised
//! it. Only [`HubError::NoSensors`] is fatal, and only at startup.

use thiserror::Error;

use crate::event::{ClientId, EventType, SensorId};

/// Result type alias for hub operations
pub type Result<T> = std::result::Result<T, HubError>;

/// Main error type for hub operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HubError {
    /// Hardware enable/disable/read failure
    #[error("Adapter failure on sensor {sensor_id}: {source}")]
    Adapter {
        sensor_id: SensorId,
        #[source]
        source: AdapterError,
    },

    /// Dispatch queue refused the event
    #[error("Dispatch queue full (capacity {capacity})")]
    QueueFull { capacity: usize },

    /// Command referenced a client that is not connected
    #[error("Unknown client: {0}")]
    UnknownClient(ClientId),

    /// Command referenced a sensor that is not in the registry
    #[error("Unknown sensor: {0}")]
    UnknownSensor(SensorId),

    /// Client lacks the capability required by the sensor
    #[error("Permission denied for client {client_id} on sensor {sensor_id}")]
    PermissionDenied {
        client_id: ClientId,
        sensor_id: SensorId,
    },

    /// Same (sensor, event type) registered twice
    #[error("Event {event_type} already registered on sensor {sensor_id}")]
    DuplicateRegistration {
        sensor_id: SensorId,
        event_type: EventType,
    },

    /// Unregistering an event type that was never registered
    #[error("Event {event_type} not registered on sensor {sensor_id}")]
    NotRegistered {
        sensor_id: SensorId,
        event_type: EventType,
    },

    /// Operation requires the sensor to be started by the caller
    #[error("Sensor {0} not started by this client")]
    NotStarted(SensorId),

    /// Event type does not belong to the sensor
    #[error("Event {event_type} is not produced by sensor {sensor_id}")]
    EventTypeMismatch {
        sensor_id: SensorId,
        event_type: EventType,
    },

    /// No sensors could be registered
    #[error("No sensors discovered")]
    NoSensors,

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Sending to a client channel failed
    #[error("Client channel error: {0}")]
    Sink(#[from] SinkError),

    /// A worker thread could not be started
    #[error("Failed to spawn {0}")]
    Spawn(String),

    /// The hub was shut down and cannot run again
    #[error("Sensor hub is shut down")]
    ShutDown,
}

/// Errors reported by device adapters
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdapterError {
    /// Device node could not be opened or written
    #[error("I/O error: {0}")]
    Io(String),

    /// No sample available yet
    #[error("No data available")]
    NoData,

    /// Device rejected the requested setting
    #[error("Unsupported setting: {0}")]
    Unsupported(String),

    /// Device was disabled while reading
    #[error("Device disabled")]
    Disabled,
}

/// Errors reported by client outbound channels
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// Peer went away
    #[error("Disconnected: {reason}")]
    Disconnected { reason: String },

    /// Outbound buffer is full, event dropped for this client
    #[error("Outbound buffer full")]
    BufferFull,
}

impl HubError {
    /// Wrap an adapter error with the sensor it came from
    pub fn adapter(sensor_id: SensorId, source: AdapterError) -> Self {
        Self::Adapter { sensor_id, source }
    }

    /// Short machine-readable code, used on the wire
    pub fn code(&self) -> &'static str {
        match self {
            Self::Adapter { .. } => "adapter_failure",
            Self::QueueFull { .. } => "queue_full",
            Self::UnknownClient(_) => "unknown_client",
            Self::UnknownSensor(_) => "unknown_sensor",
            Self::PermissionDenied { .. } => "permission_denied",
            Self::DuplicateRegistration { .. } => "duplicate_registration",
            Self::NotRegistered { .. } => "not_registered",
            Self::NotStarted(_) => "not_started",
            Self::EventTypeMismatch { .. } => "event_type_mismatch",
            Self::NoSensors => "no_sensors",
            Self::InvalidConfig(_) => "invalid_config",
            Self::Sink(_) => "sink_error",
            Self::Spawn(_) => "spawn_failed",
            Self::ShutDown => "shut_down",
        }
    }
}
