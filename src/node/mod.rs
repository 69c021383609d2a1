// Sensorhub - Sensor hub core
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Sensor nodes
//!
//! A [`SensorNode`] is either backed by a device adapter
//! ([`PhysicalNode`]) or computed from upstream nodes ([`VirtualSensor`]).
//! Both share the same activation and rate contract:
//!
//! - the node is active iff its requester set is non-empty;
//! - the requester set and the [`RateTable`] live under one mutex, so an
//!   activation change and the rate re-application happen in a single
//!   critical section;
//! - a failed hardware (or upstream) call leaves the node in its prior
//!   state.
//!
//! Lock order is downstream node, then upstream node. The graph is acyclic
//! by construction, so a virtual node may call into its upstreams while
//! holding its own lock.

mod physical;
mod virtual_sensor;

pub use physical::PhysicalNode;
pub use virtual_sensor::VirtualSensor;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use serde::Serialize;

use crate::adapter::SensorProperties;
use crate::error::{HubError, Result};
use crate::event::{Event, SensorId, SensorType};
use crate::permission::Permission;
use crate::queue::DispatchQueue;
use crate::rate::{RateTable, Requester};

/// Static description of a registered node
#[derive(Debug, Clone, Serialize)]
pub struct SensorInfo {
    /// Registry-assigned id
    pub id: SensorId,
    /// Sensor category
    pub sensor_type: SensorType,
    /// Capability a client needs to use this sensor
    pub required_permission: Permission,
    /// Interval applied while no requester constrains it
    pub default_interval_ms: u32,
    /// Descriptor returned by `get_properties`
    pub properties: SensorProperties,
}

/// Closed set of node variants
pub enum NodeKind {
    Physical(PhysicalNode),
    Virtual(VirtualSensor),
}

#[derive(Debug, Default)]
struct NodeState {
    requesters: HashSet<Requester>,
    rates: RateTable,
    /// (interval, batch) last pushed to the hardware or upstreams
    applied: Option<(u32, u32)>,
}

/// One node of the sensor graph
pub struct SensorNode {
    info: SensorInfo,
    kind: NodeKind,
    state: Mutex<NodeState>,
    activity: Condvar,
    queue: Arc<DispatchQueue>,
}

impl SensorNode {
    pub(crate) fn new(info: SensorInfo, kind: NodeKind, queue: Arc<DispatchQueue>) -> Self {
        Self {
            info,
            kind,
            state: Mutex::new(NodeState::default()),
            activity: Condvar::new(),
            queue,
        }
    }

    pub fn id(&self) -> SensorId {
        self.info.id
    }

    pub fn sensor_type(&self) -> SensorType {
        self.info.sensor_type
    }

    pub fn info(&self) -> &SensorInfo {
        &self.info
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn is_virtual(&self) -> bool {
        matches!(self.kind, NodeKind::Virtual(_))
    }

    /// Upstream nodes of a virtual sensor, empty for physical ones
    pub fn upstreams(&self) -> &[Arc<SensorNode>] {
        match &self.kind {
            NodeKind::Physical(_) => &[],
            NodeKind::Virtual(v) => v.upstreams(),
        }
    }

    /// Whether at least one requester has started the node
    pub fn is_active(&self) -> bool {
        !self.state.lock().requesters.is_empty()
    }

    /// Number of requesters holding the node active
    pub fn active_count(&self) -> usize {
        self.state.lock().requesters.len()
    }

    /// Whether this requester has started the node
    pub fn is_started_by(&self, requester: Requester) -> bool {
        self.state.lock().requesters.contains(&requester)
    }

    /// Requesters currently holding the node active
    pub fn requesters(&self) -> Vec<Requester> {
        let mut out: Vec<_> = self.state.lock().requesters.iter().copied().collect();
        out.sort();
        out
    }

    /// Smallest requested interval, `None` when unconstrained
    pub fn min_interval(&self) -> Option<u32> {
        self.state.lock().rates.min_interval()
    }

    /// Largest requested batch latency, `None` when unconstrained
    pub fn max_batch(&self) -> Option<u32> {
        self.state.lock().rates.max_batch()
    }

    /// Interval the node runs at (or would run at if started)
    pub fn effective_interval(&self) -> u32 {
        self.effective(&self.state.lock()).0
    }

    /// Batch latency the node runs at (or would run at if started)
    pub fn effective_batch(&self) -> u32 {
        self.effective(&self.state.lock()).1
    }

    fn effective(&self, state: &NodeState) -> (u32, u32) {
        let interval = state
            .rates
            .min_interval()
            .unwrap_or(self.info.default_interval_ms)
            .max(self.info.properties.min_interval_ms);
        let batch = state.rates.max_batch().unwrap_or(0);
        (interval, batch)
    }

    /// Add a requester to the active set.
    ///
    /// On the first requester the adapter is enabled (or the upstreams are
    /// subscribed) and the effective rates are applied. Returns `false` if
    /// the requester had already started the node.
    pub fn start(&self, requester: Requester) -> Result<bool> {
        let mut state = self.state.lock();
        if !state.requesters.insert(requester) {
            log::debug!("sensor {}: {} already started", self.info.id, requester);
            return Ok(false);
        }

        if state.requesters.len() == 1 {
            if let Err(e) = self.activate(&mut state) {
                state.requesters.remove(&requester);
                log::error!("sensor {}: start failed: {}", self.info.id, e);
                return Err(e);
            }
            self.activity.notify_all();
            log::info!("sensor {} ({}) activated", self.info.id, self.info.sensor_type);
        }
        Ok(true)
    }

    /// Remove a requester from the active set.
    ///
    /// On the last requester the adapter is disabled (or the upstreams are
    /// released). Returns `false` if the requester had not started the node.
    pub fn stop(&self, requester: Requester) -> Result<bool> {
        let mut state = self.state.lock();
        if !state.requesters.remove(&requester) {
            return Ok(false);
        }

        if state.requesters.is_empty() {
            if let Err(e) = self.deactivate(&mut state) {
                state.requesters.insert(requester);
                log::error!("sensor {}: stop failed: {}", self.info.id, e);
                return Err(e);
            }
            log::info!("sensor {} ({}) deactivated", self.info.id, self.info.sensor_type);
        } else {
            self.reapply(&mut state)?;
        }
        Ok(true)
    }

    /// Drop the interval, batch and activation of a requester at once.
    ///
    /// Used on client stop and disconnect. The requester is always
    /// released; a hardware failure while disabling is reported but the node
    /// is considered stopped.
    pub fn detach(&self, requester: Requester) -> Result<()> {
        let mut state = self.state.lock();
        state.rates.remove(requester);
        let was_started = state.requesters.remove(&requester);

        if was_started && state.requesters.is_empty() {
            let result = self.deactivate(&mut state);
            if let Err(ref e) = result {
                log::error!("sensor {}: disable on detach failed: {}", self.info.id, e);
            } else {
                log::info!("sensor {} ({}) deactivated", self.info.id, self.info.sensor_type);
            }
            return result;
        }
        self.reapply(&mut state)
    }

    /// Set the interval requested by `requester`
    pub fn add_interval(&self, requester: Requester, interval_ms: u32) -> Result<()> {
        if interval_ms == 0 {
            return Err(HubError::InvalidConfig("interval must be > 0".to_string()));
        }
        let mut state = self.state.lock();
        let previous = state.rates.add_interval(requester, interval_ms);
        if let Err(e) = self.reapply(&mut state) {
            match previous {
                Some(p) => state.rates.add_interval(requester, p),
                None => state.rates.delete_interval(requester),
            };
            return Err(e);
        }
        Ok(())
    }

    /// Remove the interval requested by `requester`
    pub fn delete_interval(&self, requester: Requester) -> Result<bool> {
        let mut state = self.state.lock();
        let Some(previous) = state.rates.delete_interval(requester) else {
            return Ok(false);
        };
        if let Err(e) = self.reapply(&mut state) {
            state.rates.add_interval(requester, previous);
            return Err(e);
        }
        Ok(true)
    }

    /// Set the batch latency requested by `requester`
    pub fn add_batch(&self, requester: Requester, latency_ms: u32) -> Result<()> {
        let mut state = self.state.lock();
        let previous = state.rates.add_batch(requester, latency_ms);
        if let Err(e) = self.reapply(&mut state) {
            match previous {
                Some(p) => state.rates.add_batch(requester, p),
                None => state.rates.delete_batch(requester),
            };
            return Err(e);
        }
        Ok(())
    }

    /// Remove the batch latency requested by `requester`
    pub fn delete_batch(&self, requester: Requester) -> Result<bool> {
        let mut state = self.state.lock();
        let Some(previous) = state.rates.delete_batch(requester) else {
            return Ok(false);
        };
        if let Err(e) = self.reapply(&mut state) {
            state.rates.add_batch(requester, previous);
            return Err(e);
        }
        Ok(true)
    }

    /// Enqueue an event into the dispatch queue without blocking
    pub fn push(&self, event: Event) -> bool {
        let accepted = self.queue.push(event);
        if !accepted {
            log::debug!("sensor {}: event dropped", self.info.id);
        }
        accepted
    }

    /// Wait until the node is active or `timeout` elapses
    pub fn wait_active(&self, timeout: Duration) -> bool {
        let mut state = self.state.lock();
        if !state.requesters.is_empty() {
            return true;
        }
        let _ = self.activity.wait_for(&mut state, timeout);
        !state.requesters.is_empty()
    }

    /// Wake a poller blocked in [`wait_active`](Self::wait_active)
    pub fn wake(&self) {
        self.activity.notify_all();
    }

    /// Read one sample from the adapter and push it.
    ///
    /// Returns `Ok(false)` when no data became ready within `timeout` and
    /// always for virtual nodes.
    pub fn poll_once(&self, timeout: Duration) -> Result<bool> {
        match &self.kind {
            NodeKind::Physical(p) => p.poll_once(self, timeout),
            NodeKind::Virtual(_) => Ok(false),
        }
    }

    /// Read and convert one sample without enqueueing it
    pub fn read_now(&self) -> Result<Option<Event>> {
        match &self.kind {
            NodeKind::Physical(p) => p.read_now(self).map(Some),
            NodeKind::Virtual(v) => Ok(v.latest_output()),
        }
    }

    /// Feed an upstream event to a virtual node.
    ///
    /// Returns the number of events pushed into the queue.
    pub fn synthesize(&self, event: &Event) -> usize {
        match &self.kind {
            NodeKind::Virtual(v) if self.is_active() => v.synthesize(self, event),
            _ => 0,
        }
    }

    fn activate(&self, state: &mut NodeState) -> Result<()> {
        let (interval, batch) = self.effective(state);
        match &self.kind {
            NodeKind::Physical(p) => p.on_start(self.info.id, interval, batch)?,
            NodeKind::Virtual(v) => v.on_start(self.info.id, interval, batch)?,
        }
        state.applied = Some((interval, batch));
        Ok(())
    }

    fn deactivate(&self, state: &mut NodeState) -> Result<()> {
        let result = match &self.kind {
            NodeKind::Physical(p) => p.on_stop(self.info.id),
            NodeKind::Virtual(v) => v.on_stop(self.info.id),
        };
        if result.is_ok() {
            state.applied = None;
        }
        result
    }

    /// Push the effective rates if the node is active and they changed
    fn reapply(&self, state: &mut NodeState) -> Result<()> {
        if state.requesters.is_empty() {
            return Ok(());
        }
        let (interval, batch) = self.effective(state);
        if state.applied == Some((interval, batch)) {
            return Ok(());
        }
        log::debug!(
            "sensor {}: effective interval {}ms, batch {}ms",
            self.info.id,
            interval,
            batch
        );
        match &self.kind {
            NodeKind::Physical(p) => {
                p.on_rates_changed(self.info.id, state.applied, interval, batch)?
            }
            NodeKind::Virtual(v) => {
                v.on_rates_changed(self.info.id, state.applied, interval, batch)?
            }
        }
        state.applied = Some((interval, batch));
        Ok(())
    }
}

impl std::fmt::Debug for SensorNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorNode")
            .field("id", &self.info.id)
            .field("type", &self.info.sensor_type)
            .field("virtual", &self.is_virtual())
            .field("active", &self.active_count())
            .finish()
    }
}

#[cfg(test)]
mod tests;
