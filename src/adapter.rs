// Sensorhub - Sensor hub core
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Device adapter contract
//!
//! This module provides the [`DeviceAdapter`] trait every hardware binding
//! implements, the unit [`Conversion`] applied by physical nodes, and a
//! [`MemoryAdapter`] for tests and local replay.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};

use crate::error::AdapterError;
use crate::event::{RawSample, SensorType};

/// Static descriptor of a sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorProperties {
    /// Sensor category
    pub sensor_type: SensorType,
    /// Chip or model name
    pub name: String,
    /// Vendor name
    pub vendor: String,
    /// Smallest value the sensor reports
    pub min_range: f32,
    /// Largest value the sensor reports
    pub max_range: f32,
    /// Smallest distinguishable change
    pub resolution: f32,
    /// Fastest supported interval
    pub min_interval_ms: u32,
    /// Hardware FIFO depth available for batching, 0 if none
    pub max_batch_count: u32,
    /// Whether the sensor can wake the system
    pub wakeup_supported: bool,
}

impl SensorProperties {
    /// Properties with generic defaults for a sensor type
    pub fn new(sensor_type: SensorType, name: impl Into<String>) -> Self {
        Self {
            sensor_type,
            name: name.into(),
            vendor: String::from("generic"),
            min_range: 0.0,
            max_range: 0.0,
            resolution: 0.0,
            min_interval_ms: 10,
            max_batch_count: 0,
            wakeup_supported: false,
        }
    }

    /// Set the vendor
    pub fn with_vendor(mut self, vendor: impl Into<String>) -> Self {
        self.vendor = vendor.into();
        self
    }

    /// Set the reported range
    pub fn with_range(mut self, min: f32, max: f32) -> Self {
        self.min_range = min;
        self.max_range = max;
        self
    }

    /// Set the resolution
    pub fn with_resolution(mut self, resolution: f32) -> Self {
        self.resolution = resolution;
        self
    }
}

/// Uniform contract of a hardware binding.
///
/// Methods take `&self`: the polling thread blocks in
/// [`is_data_ready`](Self::is_data_ready) while control calls
/// (`enable`, `set_interval`, ...) arrive from command workers, so
/// implementations synchronize internally.
pub trait DeviceAdapter: Send + Sync {
    /// Power the device up
    fn enable(&self) -> Result<(), AdapterError>;

    /// Power the device down
    fn disable(&self) -> Result<(), AdapterError>;

    /// Set the sampling interval
    fn set_interval(&self, interval_ms: u32) -> Result<(), AdapterError>;

    /// Set the hardware batch latency
    fn set_batch_latency(&self, latency_ms: u32) -> Result<(), AdapterError> {
        let _ = latency_ms;
        Ok(())
    }

    /// Block up to `timeout` until a sample can be read
    fn is_data_ready(&self, timeout: Duration) -> bool;

    /// Read one sample in device units
    fn read_sample(&self) -> Result<RawSample, AdapterError>;

    /// Static descriptor
    fn properties(&self) -> SensorProperties;

    /// How device units map to canonical units
    fn conversion(&self) -> Conversion {
        Conversion::Identity
    }
}

/// Axis remapping for 3-axis sensors mounted rotated on the board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisRotation(pub [[i8; 3]; 3]);

impl AxisRotation {
    pub const IDENTITY: AxisRotation = AxisRotation([[1, 0, 0], [0, 1, 0], [0, 0, 1]]);

    /// Apply the rotation to one vector
    pub fn apply(&self, v: [f32; 3]) -> [f32; 3] {
        let mut out = [0.0f32; 3];
        for (row, o) in self.0.iter().zip(out.iter_mut()) {
            *o = row
                .iter()
                .zip(v.iter())
                .map(|(m, x)| f32::from(*m) * x)
                .sum();
        }
        out
    }
}

impl Default for AxisRotation {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Proximity state reported to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProximityState {
    Near,
    Far,
}

impl ProximityState {
    /// Canonical value carried in proximity events
    pub fn value(&self) -> f32 {
        match self {
            Self::Near => 0.0,
            Self::Far => 5.0,
        }
    }
}

/// Raw proximity value to near/far table.
///
/// IIO and input-event drivers disagree on which raw value means "near",
/// so each adapter supplies its own table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProximityMap {
    /// (raw value, state) pairs
    pub entries: Vec<(i32, ProximityState)>,
    /// State for raw values not in the table
    pub fallback: ProximityState,
}

impl ProximityMap {
    /// Input-event drivers: 0 is near
    pub fn input_event() -> Self {
        Self {
            entries: vec![(0, ProximityState::Near), (1, ProximityState::Far)],
            fallback: ProximityState::Far,
        }
    }

    /// IIO drivers: 1 is near
    pub fn iio() -> Self {
        Self {
            entries: vec![(1, ProximityState::Near), (0, ProximityState::Far)],
            fallback: ProximityState::Far,
        }
    }

    /// Look up the state for a raw value
    pub fn state(&self, raw: f32) -> ProximityState {
        let raw = raw.round() as i32;
        self.entries
            .iter()
            .find(|(r, _)| *r == raw)
            .map(|(_, s)| *s)
            .unwrap_or(self.fallback)
    }
}

/// Conversion from device units to canonical units
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Conversion {
    /// Values are already canonical
    #[default]
    Identity,
    /// `value * scale + offset` on every value
    Linear { scale: f32, offset: f32 },
    /// Scale then remap the first three values
    Axes { scale: f32, rotation: AxisRotation },
    /// Map the first value through a near/far table
    Proximity(ProximityMap),
}

impl Conversion {
    /// Convert one raw sample
    pub fn apply(&self, raw: &[f32]) -> Vec<f32> {
        match self {
            Conversion::Identity => raw.to_vec(),
            Conversion::Linear { scale, offset } => {
                raw.iter().map(|v| v * scale + offset).collect()
            }
            Conversion::Axes { scale, rotation } => {
                if raw.len() < 3 {
                    return raw.iter().map(|v| v * scale).collect();
                }
                let rotated = rotation.apply([raw[0] * scale, raw[1] * scale, raw[2] * scale]);
                let mut out = rotated.to_vec();
                out.extend(raw[3..].iter().map(|v| v * scale));
                out
            }
            Conversion::Proximity(map) => match raw.first() {
                Some(v) => vec![map.state(*v).value()],
                None => Vec::new(),
            },
        }
    }

    /// Replace the axis rotation, keeping the scale
    pub fn with_rotation(self, rotation: AxisRotation) -> Self {
        match self {
            Conversion::Identity => Conversion::Axes {
                scale: 1.0,
                rotation,
            },
            Conversion::Axes { scale, .. } => Conversion::Axes { scale, rotation },
            other => other,
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    enabled: bool,
    interval_ms: Option<u32>,
    batch_latency_ms: Option<u32>,
    samples: VecDeque<RawSample>,
    enable_calls: u32,
    disable_calls: u32,
    interval_history: Vec<u32>,
    fail_enable: bool,
    fail_batch: bool,
    fail_read: bool,
}

/// In-memory adapter fed by [`push_sample`](MemoryAdapter::push_sample).
///
/// Records every control call so tests can assert on what reached the
/// "hardware".
#[derive(Debug)]
pub struct MemoryAdapter {
    properties: SensorProperties,
    conversion: Conversion,
    state: Mutex<MemoryState>,
    ready: Condvar,
}

impl MemoryAdapter {
    /// Create an adapter for a sensor type
    pub fn new(sensor_type: SensorType) -> Self {
        Self::with_properties(SensorProperties::new(
            sensor_type,
            format!("memory-{}", sensor_type),
        ))
    }

    /// Create an adapter with explicit properties
    pub fn with_properties(properties: SensorProperties) -> Self {
        Self {
            properties,
            conversion: Conversion::Identity,
            state: Mutex::new(MemoryState::default()),
            ready: Condvar::new(),
        }
    }

    /// Set the conversion reported to the node
    pub fn with_conversion(mut self, conversion: Conversion) -> Self {
        self.conversion = conversion;
        self
    }

    /// Queue a sample and wake the poller
    pub fn push_sample(&self, sample: RawSample) {
        self.state.lock().samples.push_back(sample);
        self.ready.notify_all();
    }

    /// Make the next `enable` calls fail
    pub fn set_fail_enable(&self, fail: bool) {
        self.state.lock().fail_enable = fail;
    }

    /// Make the next batch latency changes fail
    pub fn set_fail_batch(&self, fail: bool) {
        self.state.lock().fail_batch = fail;
    }

    /// Make the next reads fail
    pub fn set_fail_read(&self, fail: bool) {
        self.state.lock().fail_read = fail;
    }

    pub fn is_enabled(&self) -> bool {
        self.state.lock().enabled
    }

    pub fn enable_calls(&self) -> u32 {
        self.state.lock().enable_calls
    }

    pub fn disable_calls(&self) -> u32 {
        self.state.lock().disable_calls
    }

    /// Last interval applied
    pub fn interval_ms(&self) -> Option<u32> {
        self.state.lock().interval_ms
    }

    /// Every interval applied, oldest first
    pub fn interval_history(&self) -> Vec<u32> {
        self.state.lock().interval_history.clone()
    }

    /// Last batch latency applied
    pub fn batch_latency_ms(&self) -> Option<u32> {
        self.state.lock().batch_latency_ms
    }

    /// Samples waiting to be read
    pub fn pending(&self) -> usize {
        self.state.lock().samples.len()
    }
}

impl DeviceAdapter for MemoryAdapter {
    fn enable(&self) -> Result<(), AdapterError> {
        let mut state = self.state.lock();
        if state.fail_enable {
            return Err(AdapterError::Io("enable failed".to_string()));
        }
        state.enabled = true;
        state.enable_calls += 1;
        drop(state);
        self.ready.notify_all();
        Ok(())
    }

    fn disable(&self) -> Result<(), AdapterError> {
        let mut state = self.state.lock();
        state.enabled = false;
        state.disable_calls += 1;
        Ok(())
    }

    fn set_interval(&self, interval_ms: u32) -> Result<(), AdapterError> {
        let mut state = self.state.lock();
        state.interval_ms = Some(interval_ms);
        state.interval_history.push(interval_ms);
        Ok(())
    }

    fn set_batch_latency(&self, latency_ms: u32) -> Result<(), AdapterError> {
        let mut state = self.state.lock();
        if state.fail_batch {
            return Err(AdapterError::Unsupported(format!("batch {}ms", latency_ms)));
        }
        state.batch_latency_ms = Some(latency_ms);
        Ok(())
    }

    fn is_data_ready(&self, timeout: Duration) -> bool {
        let mut state = self.state.lock();
        if state.enabled && !state.samples.is_empty() {
            return true;
        }
        let _ = self.ready.wait_for(&mut state, timeout);
        state.enabled && !state.samples.is_empty()
    }

    fn read_sample(&self) -> Result<RawSample, AdapterError> {
        let mut state = self.state.lock();
        if state.fail_read {
            return Err(AdapterError::Io("read failed".to_string()));
        }
        if !state.enabled {
            return Err(AdapterError::Disabled);
        }
        state.samples.pop_front().ok_or(AdapterError::NoData)
    }

    fn properties(&self) -> SensorProperties {
        self.properties.clone()
    }

    fn conversion(&self) -> Conversion {
        self.conversion.clone()
    }
}
