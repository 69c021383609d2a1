// Sensorhub - Sensor hub core
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Sensor identities, event types and the event payload
//!
//! An [`Event`] is created by the producing node, cloned into the dispatch
//! queue and never mutated afterwards.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::HubError;

/// Stable identifier of one sensor node, never reused while the hub runs
pub type SensorId = u32;

/// Identifier of one connected client
pub type ClientId = u32;

/// Sensor category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorType {
    /// Acceleration including gravity (m/s^2)
    Accelerometer,
    /// Angular velocity (deg/s)
    Gyroscope,
    /// Near/far object detection
    Proximity,
    /// Illuminance (lux)
    Light,
    /// Atmospheric pressure (hPa)
    Pressure,
    /// Geomagnetic field (uT)
    Magnetometer,
    /// Gravity vector (m/s^2), derived
    Gravity,
    /// Acceleration without gravity (m/s^2), derived
    LinearAcceleration,
    /// Azimuth, pitch, roll (deg), derived
    Orientation,
    /// Attitude quaternion, derived
    RotationVector,
}

impl SensorType {
    /// Every sensor type, physical first
    pub const ALL: [SensorType; 10] = [
        SensorType::Accelerometer,
        SensorType::Gyroscope,
        SensorType::Proximity,
        SensorType::Light,
        SensorType::Pressure,
        SensorType::Magnetometer,
        SensorType::Gravity,
        SensorType::LinearAcceleration,
        SensorType::Orientation,
        SensorType::RotationVector,
    ];

    /// Whether this type is computed from other sensors
    pub fn is_virtual(&self) -> bool {
        matches!(
            self,
            Self::Gravity | Self::LinearAcceleration | Self::Orientation | Self::RotationVector
        )
    }

    /// Number of values in a data event
    pub fn value_count(&self) -> usize {
        match self {
            Self::Proximity | Self::Light | Self::Pressure => 1,
            Self::RotationVector => 4,
            _ => 3,
        }
    }

    /// Event kinds this sensor can emit
    pub fn event_kinds(&self) -> &'static [EventKind] {
        match self {
            Self::Proximity => &[EventKind::RawData, EventKind::Change],
            Self::Magnetometer | Self::Orientation | Self::RotationVector => {
                &[EventKind::RawData, EventKind::CalibrationNeeded]
            }
            _ => &[EventKind::RawData],
        }
    }

    /// Whether the sensor emits the given event type
    pub fn emits(&self, event_type: EventType) -> bool {
        event_type.sensor_type == *self && self.event_kinds().contains(&event_type.kind)
    }

    /// Canonical lowercase name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Accelerometer => "accelerometer",
            Self::Gyroscope => "gyroscope",
            Self::Proximity => "proximity",
            Self::Light => "light",
            Self::Pressure => "pressure",
            Self::Magnetometer => "magnetometer",
            Self::Gravity => "gravity",
            Self::LinearAcceleration => "linear_acceleration",
            Self::Orientation => "orientation",
            Self::RotationVector => "rotation_vector",
        }
    }
}

impl fmt::Display for SensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SensorType {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SensorType::ALL
            .iter()
            .copied()
            .find(|t| t.name() == s)
            .ok_or_else(|| HubError::InvalidConfig(format!("unknown sensor type '{}'", s)))
    }
}

/// What an event carries
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Periodic measurement
    #[default]
    RawData,
    /// State transition (e.g. proximity near/far)
    Change,
    /// Sensor asks the user to calibrate
    CalibrationNeeded,
}

impl EventKind {
    /// Recordable kinds are kept in the last-event cache
    pub fn is_recordable(&self) -> bool {
        matches!(self, Self::RawData | Self::Change)
    }

    fn name(&self) -> &'static str {
        match self {
            Self::RawData => "raw_data",
            Self::Change => "change",
            Self::CalibrationNeeded => "calibration_needed",
        }
    }
}

/// Event type: the sensor category plus the kind of event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventType {
    pub sensor_type: SensorType,
    pub kind: EventKind,
}

impl EventType {
    pub const fn new(sensor_type: SensorType, kind: EventKind) -> Self {
        Self { sensor_type, kind }
    }

    /// Data event of a sensor type
    pub const fn raw(sensor_type: SensorType) -> Self {
        Self::new(sensor_type, EventKind::RawData)
    }

    pub fn is_recordable(&self) -> bool {
        self.kind.is_recordable()
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.sensor_type, self.kind.name())
    }
}

/// Measurement accuracy reported with each event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Accuracy {
    #[default]
    Undefined,
    Bad,
    Normal,
    Good,
    VeryGood,
}

/// A timestamped sensor event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Type of the event
    pub event_type: EventType,
    /// Producing sensor
    pub sensor_id: SensorId,
    /// Monotonic timestamp in microseconds, non-decreasing per sensor
    pub timestamp_us: u64,
    /// Accuracy of the values
    pub accuracy: Accuracy,
    /// Payload in canonical units
    pub values: Vec<f32>,
}

impl Event {
    /// Create a new event
    pub fn new(
        event_type: EventType,
        sensor_id: SensorId,
        timestamp_us: u64,
        values: Vec<f32>,
    ) -> Self {
        Self {
            event_type,
            sensor_id,
            timestamp_us,
            accuracy: Accuracy::Undefined,
            values,
        }
    }

    /// Set the accuracy
    pub fn with_accuracy(mut self, accuracy: Accuracy) -> Self {
        self.accuracy = accuracy;
        self
    }

    /// Number of values in the payload
    pub fn data_length(&self) -> usize {
        self.values.len()
    }
}

/// One sample as read from a device adapter, before unit conversion
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawSample {
    /// Device timestamp in monotonic microseconds, 0 if the device has none
    pub timestamp_us: u64,
    /// Raw values in device units
    pub values: Vec<f32>,
    /// Accuracy as reported by the device
    pub accuracy: Accuracy,
}

impl RawSample {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            timestamp_us: 0,
            values,
            accuracy: Accuracy::Undefined,
        }
    }

    pub fn at(timestamp_us: u64, values: Vec<f32>) -> Self {
        Self {
            timestamp_us,
            values,
            accuracy: Accuracy::Undefined,
        }
    }
}
