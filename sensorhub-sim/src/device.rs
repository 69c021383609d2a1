// Sensorhub Sim - Simulated device adapter
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! A [`DeviceAdapter`] backed by signal patterns.
//!
//! The device paces itself on the wall clock: once enabled, a new sample
//! becomes ready every `interval_ms`. Values come from one
//! [`Channel`] per axis, evaluated on simulated time, then pass through
//! the scheduled faults.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use rand::rngs::StdRng;
use rand::SeedableRng;
use sensorhub::clock::monotonic_us;
use sensorhub::{
    Accuracy, AdapterError, Conversion, DeviceAdapter, ProximityMap, RawSample,
    SensorProperties, SensorType,
};

use crate::error::{Result, SimError};
use crate::faults::{FaultConfig, FaultEffect, FaultState};
use crate::patterns::{Channel, SignalPattern};

const DEFAULT_INTERVAL_MS: u32 = 200;

#[derive(Debug)]
struct SimState {
    enabled: bool,
    interval_ms: u32,
    batch_latency_ms: u32,
    channels: Vec<Channel>,
    rng: StdRng,
    faults: FaultState,
    sample_index: u64,
    sim_time_ms: u64,
    next_due: Option<Instant>,
}

/// Pattern-driven device
#[derive(Debug)]
pub struct SimulatedAdapter {
    properties: SensorProperties,
    conversion: Conversion,
    schedule: Vec<FaultConfig>,
    state: Mutex<SimState>,
    control: Condvar,
}

impl SimulatedAdapter {
    /// Create a device with one pattern per channel
    pub fn new(sensor_type: SensorType, patterns: Vec<SignalPattern>, seed: u64) -> Result<Self> {
        if sensor_type.is_virtual() {
            return Err(SimError::VirtualSensor(sensor_type.to_string()));
        }
        if patterns.len() != sensor_type.value_count() {
            return Err(SimError::ChannelCount {
                sensor: sensor_type.to_string(),
                expected: sensor_type.value_count(),
                actual: patterns.len(),
            });
        }
        for pattern in &patterns {
            pattern.validate()?;
        }

        let conversion = match sensor_type {
            SensorType::Proximity => Conversion::Proximity(ProximityMap::iio()),
            _ => Conversion::Identity,
        };

        Ok(Self {
            properties: default_properties(sensor_type),
            conversion,
            schedule: Vec::new(),
            state: Mutex::new(SimState {
                enabled: false,
                interval_ms: DEFAULT_INTERVAL_MS,
                batch_latency_ms: 0,
                channels: patterns.into_iter().map(Channel::new).collect(),
                rng: StdRng::seed_from_u64(seed),
                faults: FaultState::default(),
                sample_index: 0,
                sim_time_ms: 0,
                next_due: None,
            }),
            control: Condvar::new(),
        })
    }

    /// Schedule a fault
    pub fn with_fault(mut self, fault: FaultConfig) -> Self {
        self.schedule.push(fault);
        self
    }

    /// Override the reported properties
    pub fn with_properties(mut self, properties: SensorProperties) -> Self {
        self.properties = properties;
        self
    }

    pub fn sensor_type(&self) -> SensorType {
        self.properties.sensor_type
    }

    pub fn is_enabled(&self) -> bool {
        self.state.lock().enabled
    }

    pub fn interval_ms(&self) -> u32 {
        self.state.lock().interval_ms
    }

    pub fn batch_latency_ms(&self) -> u32 {
        self.state.lock().batch_latency_ms
    }

    /// Samples produced since creation
    pub fn samples_read(&self) -> u64 {
        self.state.lock().sample_index
    }

    /// Rewind simulated time and clear pattern state
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.channels.iter_mut().for_each(Channel::reset);
        state.faults.reset();
        state.sample_index = 0;
        state.sim_time_ms = 0;
    }
}

impl DeviceAdapter for SimulatedAdapter {
    fn enable(&self) -> std::result::Result<(), AdapterError> {
        let mut state = self.state.lock();
        if !state.enabled {
            state.enabled = true;
            state.next_due = Some(Instant::now() + interval(state.interval_ms));
            log::debug!("sim {} enabled", self.properties.sensor_type);
        }
        drop(state);
        self.control.notify_all();
        Ok(())
    }

    fn disable(&self) -> std::result::Result<(), AdapterError> {
        let mut state = self.state.lock();
        state.enabled = false;
        state.next_due = None;
        drop(state);
        self.control.notify_all();
        log::debug!("sim {} disabled", self.properties.sensor_type);
        Ok(())
    }

    fn set_interval(&self, interval_ms: u32) -> std::result::Result<(), AdapterError> {
        if interval_ms < self.properties.min_interval_ms {
            return Err(AdapterError::Unsupported(format!(
                "interval {} ms below minimum {} ms",
                interval_ms, self.properties.min_interval_ms
            )));
        }
        let mut state = self.state.lock();
        state.interval_ms = interval_ms;
        if state.enabled {
            state.next_due = Some(Instant::now() + interval(interval_ms));
        }
        drop(state);
        self.control.notify_all();
        Ok(())
    }

    fn set_batch_latency(&self, latency_ms: u32) -> std::result::Result<(), AdapterError> {
        self.state.lock().batch_latency_ms = latency_ms;
        Ok(())
    }

    fn is_data_ready(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            let now = Instant::now();
            match (state.enabled, state.next_due) {
                (true, Some(due)) if due <= now => return true,
                (true, Some(due)) => {
                    let wake = due.min(deadline);
                    if now >= deadline {
                        return false;
                    }
                    let _ = self.control.wait_until(&mut state, wake);
                }
                _ => {
                    if now >= deadline {
                        return false;
                    }
                    let _ = self.control.wait_until(&mut state, deadline);
                }
            }
        }
    }

    fn read_sample(&self) -> std::result::Result<RawSample, AdapterError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if !state.enabled {
            return Err(AdapterError::Disabled);
        }

        let index = state.sample_index;
        let t = state.sim_time_ms;
        state.sample_index += 1;
        state.sim_time_ms += state.interval_ms as u64;
        // A slow reader does not build up a backlog of due samples
        let period = interval(state.interval_ms);
        let now = Instant::now();
        let floor = now.checked_sub(period).unwrap_or(now);
        state.next_due = Some(state.next_due.map_or(now, |due| due.max(floor)) + period);

        let rng = &mut state.rng;
        let raw: Vec<f64> = state.channels.iter_mut().map(|c| c.sample(t, rng)).collect();

        match state.faults.apply(&self.schedule, index, raw) {
            FaultEffect::Values(values) => {
                let accuracy = if FaultState::uncalibrated(&self.schedule, index) {
                    Accuracy::Bad
                } else {
                    Accuracy::Good
                };
                Ok(RawSample {
                    timestamp_us: monotonic_us(),
                    values: values.into_iter().map(|v| v as f32).collect(),
                    accuracy,
                })
            }
            FaultEffect::Error => Err(AdapterError::Io(format!(
                "simulated read error at sample {}",
                index
            ))),
            FaultEffect::Missing => Err(AdapterError::NoData),
        }
    }

    fn properties(&self) -> SensorProperties {
        self.properties.clone()
    }

    fn conversion(&self) -> Conversion {
        self.conversion.clone()
    }
}

fn interval(ms: u32) -> Duration {
    Duration::from_millis(ms as u64)
}

/// Plausible datasheet values for a sensor type
pub fn default_properties(sensor_type: SensorType) -> SensorProperties {
    let base = SensorProperties::new(sensor_type, format!("sim-{}", sensor_type))
        .with_vendor("sensorhub-sim");
    match sensor_type {
        SensorType::Accelerometer => base.with_range(-39.2, 39.2).with_resolution(0.0012),
        SensorType::Gyroscope => base.with_range(-2000.0, 2000.0).with_resolution(0.061),
        SensorType::Magnetometer => base.with_range(-4900.0, 4900.0).with_resolution(0.15),
        SensorType::Light => base.with_range(0.0, 65535.0).with_resolution(1.0),
        SensorType::Pressure => base.with_range(260.0, 1260.0).with_resolution(0.01),
        SensorType::Proximity => base.with_range(0.0, 5.0).with_resolution(5.0),
        _ => base,
    }
}
