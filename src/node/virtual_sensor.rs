// Sensorhub - Sensor hub core
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Nodes computed from upstream nodes
//!
//! A virtual sensor subscribes to its upstreams as
//! `Requester::Sensor(own id)` and owns that entry exclusively: it
//! re-registers its own effective interval and batch on every upstream
//! whenever they change.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;
use crate::event::{Event, EventKind, EventType, SensorId};
use crate::fusion::Fusion;
use crate::rate::Requester;

use super::SensorNode;

struct SynthState {
    /// Latest data event of each upstream, in declaration order
    latest: Vec<Option<Event>>,
    fusion: Box<dyn Fusion>,
    last_timestamp_us: u64,
    last_output: Option<Event>,
}

/// Node synthesizing events from one or more upstream nodes
pub struct VirtualSensor {
    upstreams: Vec<Arc<SensorNode>>,
    synth: Mutex<SynthState>,
}

impl VirtualSensor {
    pub fn new(upstreams: Vec<Arc<SensorNode>>, fusion: Box<dyn Fusion>) -> Self {
        let latest = vec![None; upstreams.len()];
        Self {
            upstreams,
            synth: Mutex::new(SynthState {
                latest,
                fusion,
                last_timestamp_us: 0,
                last_output: None,
            }),
        }
    }

    pub fn upstreams(&self) -> &[Arc<SensorNode>] {
        &self.upstreams
    }

    /// Whether `sensor_id` is one of the declared upstreams
    pub fn depends_on(&self, sensor_id: SensorId) -> bool {
        self.upstreams.iter().any(|u| u.id() == sensor_id)
    }

    /// Last event this node produced, if any
    pub fn latest_output(&self) -> Option<Event> {
        self.synth.lock().last_output.clone()
    }

    pub(super) fn on_start(&self, id: SensorId, interval_ms: u32, batch_ms: u32) -> Result<()> {
        let requester = Requester::Sensor(id);
        for (i, upstream) in self.upstreams.iter().enumerate() {
            let subscribed = upstream
                .add_interval(requester, interval_ms)
                .and_then(|_| upstream.add_batch(requester, batch_ms))
                .and_then(|_| upstream.start(requester));

            if let Err(e) = subscribed {
                for started in &self.upstreams[..=i] {
                    if let Err(rollback) = started.detach(requester) {
                        log::warn!(
                            "sensor {}: rollback on upstream {} failed: {}",
                            id,
                            started.id(),
                            rollback
                        );
                    }
                }
                return Err(e);
            }
        }
        Ok(())
    }

    pub(super) fn on_stop(&self, id: SensorId) -> Result<()> {
        let requester = Requester::Sensor(id);
        for upstream in &self.upstreams {
            if let Err(e) = upstream.detach(requester) {
                // The upstream released us regardless
                log::warn!("sensor {}: upstream {} stop: {}", id, upstream.id(), e);
            }
        }

        let mut synth = self.synth.lock();
        synth.latest.iter_mut().for_each(|slot| *slot = None);
        synth.fusion.reset();
        Ok(())
    }

    pub(super) fn on_rates_changed(
        &self,
        id: SensorId,
        previous: Option<(u32, u32)>,
        interval_ms: u32,
        batch_ms: u32,
    ) -> Result<()> {
        let requester = Requester::Sensor(id);
        for (i, upstream) in self.upstreams.iter().enumerate() {
            let applied = upstream
                .add_interval(requester, interval_ms)
                .and_then(|_| upstream.add_batch(requester, batch_ms));

            if let Err(e) = applied {
                if let Some((prev_interval, prev_batch)) = previous {
                    for done in &self.upstreams[..=i] {
                        let restored = done
                            .add_interval(requester, prev_interval)
                            .and_then(|_| done.add_batch(requester, prev_batch));
                        if let Err(rollback) = restored {
                            log::warn!(
                                "sensor {}: rate rollback on upstream {} failed: {}",
                                id,
                                done.id(),
                                rollback
                            );
                        }
                    }
                }
                return Err(e);
            }
        }
        Ok(())
    }

    pub(super) fn synthesize(&self, node: &SensorNode, event: &Event) -> usize {
        let Some(index) = self.upstreams.iter().position(|u| u.id() == event.sensor_id) else {
            return 0;
        };
        let sensor_type = node.sensor_type();

        match event.event_type.kind {
            EventKind::RawData => {}
            EventKind::CalibrationNeeded => {
                let calibration = EventType::new(sensor_type, EventKind::CalibrationNeeded);
                if !sensor_type.emits(calibration) {
                    return 0;
                }
                let out = Event::new(calibration, node.id(), event.timestamp_us, Vec::new())
                    .with_accuracy(event.accuracy);
                return usize::from(node.push(out));
            }
            EventKind::Change => return 0,
        }

        let mut synth = self.synth.lock();
        synth.latest[index] = Some(event.clone());
        if synth.latest.iter().any(Option::is_none) {
            return 0;
        }

        let SynthState {
            latest,
            fusion,
            last_timestamp_us,
            last_output,
        } = &mut *synth;
        let inputs: Vec<&Event> = latest.iter().flatten().collect();
        let Some(values) = fusion.fuse(&inputs, index) else {
            return 0;
        };

        let timestamp_us = event.timestamp_us.max(*last_timestamp_us);
        *last_timestamp_us = timestamp_us;
        let out = Event::new(EventType::raw(sensor_type), node.id(), timestamp_us, values)
            .with_accuracy(event.accuracy);
        *last_output = Some(out.clone());
        drop(synth);

        usize::from(node.push(out))
    }
}
