// Sensorhub - Sensor hub core
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Configuration types for the sensor hub
//!
//! [`HubConfig`] holds runtime tuning. [`DeviceConfigTable`] is the static
//! per-device table (vendor, model, default interval, mounting rotation,
//! proximity mapping) loaded once at startup and read-only afterwards.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::adapter::{AxisRotation, ProximityMap};
use crate::error::{HubError, Result};
use crate::event::SensorType;
use crate::health::HealthConfig;
use crate::permission::Permission;
use crate::queue::QueueConfig;

/// Hub-level configuration
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Dispatch queue sizing and policies
    pub queue: QueueConfig,

    /// How long a poller blocks in `is_data_ready` before re-checking
    pub poll_timeout: Duration,

    /// Interval used while no requester constrains a sensor
    pub default_interval_ms: u32,

    /// Health thresholds
    pub health: HealthConfig,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            queue: QueueConfig::default(),
            poll_timeout: Duration::from_millis(100),
            default_interval_ms: 100,
            health: HealthConfig::default(),
        }
    }
}

impl HubConfig {
    /// Create a configuration with a custom queue capacity
    pub fn with_queue_capacity(capacity: usize) -> Self {
        Self {
            queue: QueueConfig::with_capacity(capacity),
            ..Default::default()
        }
    }

    /// Create a configuration with explicit queue settings
    pub fn with_queue(queue: QueueConfig) -> Self {
        Self {
            queue,
            ..Default::default()
        }
    }

    /// Create a configuration with a custom poll timeout
    pub fn with_poll_timeout(poll_timeout: Duration) -> Self {
        Self {
            poll_timeout,
            ..Default::default()
        }
    }
}

/// Static configuration of one device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceEntry {
    pub sensor_type: SensorType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Overrides [`HubConfig::default_interval_ms`] for this sensor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_interval_ms: Option<u32>,

    /// Board mounting compensation for 3-axis sensors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub axis_rotation: Option<AxisRotation>,

    /// Raw value to near/far table for proximity sensors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proximity_map: Option<ProximityMap>,

    /// Capability a client needs, `STANDARD` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_permission: Option<Permission>,
}

impl DeviceEntry {
    pub fn new(sensor_type: SensorType) -> Self {
        Self {
            sensor_type,
            vendor: None,
            model: None,
            default_interval_ms: None,
            axis_rotation: None,
            proximity_map: None,
            required_permission: None,
        }
    }
}

/// Device configuration table, at most one entry per sensor type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfigTable {
    #[serde(default)]
    pub devices: Vec<DeviceEntry>,
}

impl DeviceConfigTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry, replacing any previous entry for the same type
    pub fn with_entry(mut self, entry: DeviceEntry) -> Self {
        self.devices.retain(|d| d.sensor_type != entry.sensor_type);
        self.devices.push(entry);
        self
    }

    /// Parse a table from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        let table: DeviceConfigTable = serde_json::from_str(json)
            .map_err(|e| HubError::InvalidConfig(format!("device table: {}", e)))?;
        table.validate()?;
        Ok(table)
    }

    /// Load a table from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .map_err(|e| HubError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        let table = Self::from_json(&json)?;
        log::info!("loaded {} device entries from {}", table.devices.len(), path.display());
        Ok(table)
    }

    /// Entry for a sensor type
    pub fn get(&self, sensor_type: SensorType) -> Option<&DeviceEntry> {
        self.devices.iter().find(|d| d.sensor_type == sensor_type)
    }

    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for entry in &self.devices {
            if !seen.insert(entry.sensor_type) {
                return Err(HubError::InvalidConfig(format!(
                    "duplicate device entry for {}",
                    entry.sensor_type
                )));
            }
            if entry.default_interval_ms == Some(0) {
                return Err(HubError::InvalidConfig(format!(
                    "{}: default interval must be > 0",
                    entry.sensor_type
                )));
            }
            if entry.proximity_map.is_some() && entry.sensor_type != SensorType::Proximity {
                return Err(HubError::InvalidConfig(format!(
                    "{}: proximity map on a non-proximity sensor",
                    entry.sensor_type
                )));
            }
        }
        Ok(())
    }
}
