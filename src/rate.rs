//! Interval and batch reconciliation
//!
//! Each node keeps one [`RateTable`]. The hardware (or the upstream of a
//! virtual sensor) runs at the smallest interval and the largest batch
//! latency requested by any requester.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::event::{ClientId, SensorId};

/// Who holds a rate entry or an activation on a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Requester {
    /// A connected client
    Client(ClientId),
    /// A virtual sensor subscribed to this node as a processor
    Sensor(SensorId),
}

impl Requester {
    /// True for virtual-sensor pseudo-clients
    pub fn is_processor(&self) -> bool {
        matches!(self, Self::Sensor(_))
    }
}

impl fmt::Display for Requester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client(id) => write!(f, "client#{}", id),
            Self::Sensor(id) => write!(f, "sensor#{}", id),
        }
    }
}

/// Per-requester interval and batch latency table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateTable {
    intervals: HashMap<Requester, u32>,
    batches: HashMap<Requester, u32>,
}

impl RateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the interval of a requester.
    ///
    /// Returns the previous value.
    pub fn add_interval(&mut self, requester: Requester, interval_ms: u32) -> Option<u32> {
        self.intervals.insert(requester, interval_ms)
    }

    /// Remove the interval of a requester
    pub fn delete_interval(&mut self, requester: Requester) -> Option<u32> {
        self.intervals.remove(&requester)
    }

    /// Insert or replace the batch latency of a requester
    pub fn add_batch(&mut self, requester: Requester, latency_ms: u32) -> Option<u32> {
        self.batches.insert(requester, latency_ms)
    }

    /// Remove the batch latency of a requester
    pub fn delete_batch(&mut self, requester: Requester) -> Option<u32> {
        self.batches.remove(&requester)
    }

    /// Drop every entry held by a requester
    pub fn remove(&mut self, requester: Requester) {
        self.intervals.remove(&requester);
        self.batches.remove(&requester);
    }

    /// Smallest requested interval, `None` when unconstrained
    pub fn min_interval(&self) -> Option<u32> {
        self.intervals.values().copied().min()
    }

    /// Largest requested batch latency, `None` when unconstrained
    pub fn max_batch(&self) -> Option<u32> {
        self.batches.values().copied().max()
    }

    /// Interval requested by one requester
    pub fn interval_of(&self, requester: Requester) -> Option<u32> {
        self.intervals.get(&requester).copied()
    }

    /// Batch latency requested by one requester
    pub fn batch_of(&self, requester: Requester) -> Option<u32> {
        self.batches.get(&requester).copied()
    }

    /// Number of requesters with an interval entry
    pub fn interval_count(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty() && self.batches.is_empty()
    }
}
