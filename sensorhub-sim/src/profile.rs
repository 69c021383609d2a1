// Sensorhub Sim - Device profiles
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Sets of simulated devices, built in or loaded from JSON.
//!
//! ```json
//! {
//!   "seed": 42,
//!   "sensors": [
//!     { "sensor_type": "light",
//!       "channels": [{ "pattern": "constant", "value": 300.0 }] }
//!   ]
//! }
//! ```

use std::path::Path;
use std::sync::Arc;

use sensorhub::SensorType;
use serde::{Deserialize, Serialize};

use crate::device::SimulatedAdapter;
use crate::error::Result;
use crate::faults::FaultConfig;
use crate::patterns::SignalPattern;

/// One simulated device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimSensorConfig {
    pub sensor_type: SensorType,
    /// One pattern per value of the sensor type
    pub channels: Vec<SignalPattern>,
    #[serde(default)]
    pub faults: Vec<FaultConfig>,
}

impl SimSensorConfig {
    pub fn new(sensor_type: SensorType, channels: Vec<SignalPattern>) -> Self {
        Self {
            sensor_type,
            channels,
            faults: Vec::new(),
        }
    }

    pub fn with_fault(mut self, fault: FaultConfig) -> Self {
        self.faults.push(fault);
        self
    }
}

/// A set of simulated devices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimProfile {
    /// Base seed; device `i` uses `seed + i`
    #[serde(default)]
    pub seed: u64,
    pub sensors: Vec<SimSensorConfig>,
}

impl SimProfile {
    /// A handset lying on a desk next to a window
    pub fn handset() -> Self {
        Self {
            seed: 42,
            sensors: vec![
                SimSensorConfig::new(
                    SensorType::Accelerometer,
                    vec![
                        SignalPattern::Composite {
                            parts: vec![
                                SignalPattern::tilt(0.4, 8_000),
                                SignalPattern::Noise { std: 0.02 },
                            ],
                        },
                        SignalPattern::gravity_axis(0.0, 0.02),
                        SignalPattern::gravity_axis(9.79, 0.02),
                    ],
                ),
                SimSensorConfig::new(
                    SensorType::Gyroscope,
                    vec![
                        SignalPattern::Noise { std: 0.05 },
                        SignalPattern::Noise { std: 0.05 },
                        SignalPattern::Noise { std: 0.05 },
                    ],
                ),
                SimSensorConfig::new(
                    SensorType::Magnetometer,
                    vec![
                        SignalPattern::gravity_axis(22.0, 0.3),
                        SignalPattern::gravity_axis(-4.0, 0.3),
                        SignalPattern::gravity_axis(-41.0, 0.3),
                    ],
                ),
                SimSensorConfig::new(
                    SensorType::Light,
                    vec![SignalPattern::ambient_light(80.0, 600.0, 60_000)],
                ),
                SimSensorConfig::new(
                    SensorType::Proximity,
                    vec![SignalPattern::proximity_toggle(0.02, 0.1)],
                ),
                SimSensorConfig::new(
                    SensorType::Pressure,
                    vec![SignalPattern::barometric(1013.25)],
                ),
            ],
        }
    }

    /// Parse a profile from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a profile from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Keep only the listed sensor types
    pub fn only(mut self, types: &[SensorType]) -> Self {
        self.sensors.retain(|s| types.contains(&s.sensor_type));
        self
    }

    /// Instantiate every device
    pub fn build(&self) -> Result<Vec<Arc<SimulatedAdapter>>> {
        self.sensors
            .iter()
            .enumerate()
            .map(|(i, sensor)| {
                let mut device = SimulatedAdapter::new(
                    sensor.sensor_type,
                    sensor.channels.clone(),
                    self.seed.wrapping_add(i as u64),
                )?;
                for fault in &sensor.faults {
                    device = device.with_fault(fault.clone());
                }
                Ok(Arc::new(device))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::faults::FaultKind;
    use std::io::Write;

    #[test]
    fn test_handset_builds() {
        let devices = SimProfile::handset().build().unwrap();
        assert_eq!(devices.len(), 6);
        let types: Vec<_> = devices.iter().map(|d| d.sensor_type()).collect();
        assert!(types.contains(&SensorType::Accelerometer));
        assert!(types.contains(&SensorType::Proximity));
    }

    #[test]
    fn test_only_filters() {
        let profile = SimProfile::handset().only(&[SensorType::Light, SensorType::Pressure]);
        assert_eq!(profile.sensors.len(), 2);
    }

    #[test]
    fn test_load_from_file() {
        let profile = SimProfile::handset().only(&[SensorType::Light]);
        let profile = SimProfile {
            sensors: vec![profile.sensors[0]
                .clone()
                .with_fault(FaultConfig::new(FaultKind::Stuck, 10).with_duration(5))],
            ..profile
        };

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", serde_json::to_string_pretty(&profile).unwrap()).unwrap();

        let loaded = SimProfile::load(file.path()).unwrap();
        assert_eq!(loaded, profile);
    }

    #[test]
    fn test_bad_profile_rejected() {
        let json = r#"{"sensors": [{"sensor_type": "accelerometer",
                        "channels": [{"pattern": "constant", "value": 1.0}]}]}"#;
        let profile = SimProfile::from_json(json).unwrap();
        assert_eq!(profile.seed, 0);
        assert!(profile.build().is_err());

        assert!(SimProfile::from_json("{not json").is_err());
        assert!(SimProfile::load("/nonexistent/profile.json").is_err());
    }
}
