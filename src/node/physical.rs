// Sensorhub - Sensor hub core
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Adapter-backed nodes

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::adapter::{Conversion, DeviceAdapter};
use crate::clock::monotonic_us;
use crate::error::{HubError, Result};
use crate::event::{Accuracy, Event, EventKind, EventType, RawSample, SensorId, SensorType};

use super::SensorNode;

#[derive(Debug, Default)]
struct EmitState {
    last_timestamp_us: u64,
    last_proximity: Option<f32>,
    last_accuracy: Accuracy,
}

/// Node owning one [`DeviceAdapter`]
pub struct PhysicalNode {
    adapter: Arc<dyn DeviceAdapter>,
    conversion: Conversion,
    emit: Mutex<EmitState>,
}

impl PhysicalNode {
    pub fn new(adapter: Arc<dyn DeviceAdapter>, conversion: Conversion) -> Self {
        Self {
            adapter,
            conversion,
            emit: Mutex::new(EmitState::default()),
        }
    }

    pub fn adapter(&self) -> &Arc<dyn DeviceAdapter> {
        &self.adapter
    }

    pub fn conversion(&self) -> &Conversion {
        &self.conversion
    }

    pub(super) fn on_start(&self, id: SensorId, interval_ms: u32, batch_ms: u32) -> Result<()> {
        self.adapter.enable().map_err(|e| HubError::adapter(id, e))?;
        if let Err(e) = self.apply_rates(id, interval_ms, batch_ms) {
            if let Err(disable_err) = self.adapter.disable() {
                log::warn!("sensor {}: disable after failed start: {}", id, disable_err);
            }
            return Err(e);
        }

        // A fresh activation reports the proximity state again
        let mut emit = self.emit.lock();
        emit.last_proximity = None;
        emit.last_accuracy = Accuracy::Undefined;
        Ok(())
    }

    pub(super) fn on_stop(&self, id: SensorId) -> Result<()> {
        self.adapter.disable().map_err(|e| HubError::adapter(id, e))
    }

    /// Push only the settings that changed. A refused batch latency puts
    /// the previous interval back on the device.
    pub(super) fn on_rates_changed(
        &self,
        id: SensorId,
        previous: Option<(u32, u32)>,
        interval_ms: u32,
        batch_ms: u32,
    ) -> Result<()> {
        let Some((prev_interval, prev_batch)) = previous else {
            return self.apply_rates(id, interval_ms, batch_ms);
        };
        if interval_ms != prev_interval {
            self.adapter
                .set_interval(interval_ms)
                .map_err(|e| HubError::adapter(id, e))?;
        }
        if batch_ms != prev_batch {
            if let Err(e) = self.adapter.set_batch_latency(batch_ms) {
                if interval_ms != prev_interval {
                    if let Err(rollback) = self.adapter.set_interval(prev_interval) {
                        log::warn!("sensor {}: interval rollback failed: {}", id, rollback);
                    }
                }
                return Err(HubError::adapter(id, e));
            }
        }
        Ok(())
    }

    fn apply_rates(&self, id: SensorId, interval_ms: u32, batch_ms: u32) -> Result<()> {
        self.adapter
            .set_interval(interval_ms)
            .map_err(|e| HubError::adapter(id, e))?;
        self.adapter
            .set_batch_latency(batch_ms)
            .map_err(|e| HubError::adapter(id, e))
    }

    pub(super) fn poll_once(&self, node: &SensorNode, timeout: Duration) -> Result<bool> {
        if !self.adapter.is_data_ready(timeout) {
            return Ok(false);
        }
        let sample = self
            .adapter
            .read_sample()
            .map_err(|e| HubError::adapter(node.id(), e))?;

        for event in self.convert(node.id(), node.sensor_type(), sample) {
            node.push(event);
        }
        Ok(true)
    }

    pub(super) fn read_now(&self, node: &SensorNode) -> Result<Event> {
        let sample = self
            .adapter
            .read_sample()
            .map_err(|e| HubError::adapter(node.id(), e))?;
        let timestamp_us = self.stamp(sample.timestamp_us);
        let values = self.conversion.apply(&sample.values);
        Ok(Event::new(EventType::raw(node.sensor_type()), node.id(), timestamp_us, values)
            .with_accuracy(sample.accuracy))
    }

    /// Timestamps never go backwards for one sensor
    fn stamp(&self, device_us: u64) -> u64 {
        let now = if device_us > 0 { device_us } else { monotonic_us() };
        let mut emit = self.emit.lock();
        let ts = now.max(emit.last_timestamp_us);
        emit.last_timestamp_us = ts;
        ts
    }

    /// Turn one raw sample into the events it produces
    fn convert(&self, id: SensorId, sensor_type: SensorType, sample: RawSample) -> Vec<Event> {
        let timestamp_us = self.stamp(sample.timestamp_us);
        let values = self.conversion.apply(&sample.values);
        let mut events = Vec::with_capacity(2);

        let mut emit = self.emit.lock();
        if sensor_type.emits(EventType::new(sensor_type, EventKind::Change)) {
            if let Some(state) = values.first().copied() {
                if emit.last_proximity != Some(state) {
                    emit.last_proximity = Some(state);
                    events.push(
                        Event::new(
                            EventType::new(sensor_type, EventKind::Change),
                            id,
                            timestamp_us,
                            vec![state],
                        )
                        .with_accuracy(sample.accuracy),
                    );
                }
            }
        }

        let calibration = EventType::new(sensor_type, EventKind::CalibrationNeeded);
        if sensor_type.emits(calibration)
            && sample.accuracy == Accuracy::Bad
            && emit.last_accuracy != Accuracy::Bad
        {
            events.push(
                Event::new(calibration, id, timestamp_us, Vec::new()).with_accuracy(Accuracy::Bad),
            );
        }
        emit.last_accuracy = sample.accuracy;
        drop(emit);

        events.insert(
            0,
            Event::new(EventType::raw(sensor_type), id, timestamp_us, values)
                .with_accuracy(sample.accuracy),
        );
        events
    }
}
