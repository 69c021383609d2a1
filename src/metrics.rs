//! Dispatch statistics
//!
//! The dispatcher updates [`DispatchStats`] from its own thread while the
//! daemon's exporter reads it concurrently, so counters are atomics.
//! [`DispatchMetrics`] is a plain snapshot with the derived ratios and a
//! human-readable report.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;

use crate::event::SensorType;

/// Live counters shared between the dispatcher and readers
#[derive(Debug, Default)]
pub struct DispatchStats {
    dispatched: AtomicU64,
    deliveries: AtomicU64,
    delivery_failures: AtomicU64,
    synthesized: AtomicU64,
    replays: AtomicU64,
    suppressed: AtomicU64,
    per_type: Mutex<HashMap<SensorType, u64>>,
}

impl DispatchStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// One event dequeued and processed
    pub fn record_dispatch(&self, sensor_type: SensorType) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        *self.per_type.lock().entry(sensor_type).or_insert(0) += 1;
    }

    /// One send to a client sink
    pub fn record_delivery(&self, ok: bool) {
        if ok {
            self.deliveries.fetch_add(1, Ordering::Relaxed);
        } else {
            self.delivery_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Events pushed by virtual sensors
    pub fn record_synthesized(&self, count: usize) {
        self.synthesized.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Cached events replayed to a late registrant
    pub fn record_replay(&self, count: usize) {
        self.replays.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Deliveries skipped because the display is off
    pub fn record_suppressed(&self) {
        self.suppressed.fetch_add(1, Ordering::Relaxed);
    }

    /// Consistent-enough copy of every counter
    pub fn snapshot(&self) -> DispatchMetrics {
        DispatchMetrics {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
            synthesized: self.synthesized.load(Ordering::Relaxed),
            replays: self.replays.load(Ordering::Relaxed),
            suppressed: self.suppressed.load(Ordering::Relaxed),
            per_type: self.per_type.lock().clone(),
        }
    }

    /// Reset all counters
    pub fn reset(&self) {
        self.dispatched.store(0, Ordering::Relaxed);
        self.deliveries.store(0, Ordering::Relaxed);
        self.delivery_failures.store(0, Ordering::Relaxed);
        self.synthesized.store(0, Ordering::Relaxed);
        self.replays.store(0, Ordering::Relaxed);
        self.suppressed.store(0, Ordering::Relaxed);
        self.per_type.lock().clear();
    }
}

/// Snapshot of [`DispatchStats`]
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DispatchMetrics {
    /// Events dequeued
    pub dispatched: u64,
    /// Successful sends to client sinks
    pub deliveries: u64,
    /// Failed sends to client sinks
    pub delivery_failures: u64,
    /// Events produced by virtual sensors
    pub synthesized: u64,
    /// Cached events replayed
    pub replays: u64,
    /// Deliveries suppressed while the display is off
    pub suppressed: u64,
    /// Dispatched events per sensor type
    pub per_type: HashMap<SensorType, u64>,
}

impl DispatchMetrics {
    /// Share of sends that failed (0.0 - 1.0)
    pub fn failure_rate(&self) -> f64 {
        let total = self.deliveries + self.delivery_failures;
        if total == 0 {
            return 0.0;
        }
        self.delivery_failures as f64 / total as f64
    }

    /// Average number of clients each event reached
    pub fn fan_out(&self) -> f64 {
        if self.dispatched == 0 {
            return 0.0;
        }
        self.deliveries as f64 / self.dispatched as f64
    }

    /// Busiest sensor type
    pub fn busiest_type(&self) -> Option<SensorType> {
        self.per_type
            .iter()
            .max_by_key(|(t, count)| (**count, std::cmp::Reverse(**t)))
            .map(|(t, _)| *t)
    }

    /// Generate a human-readable report
    pub fn report(&self) -> String {
        let mut report = String::new();

        report.push_str("=== Sensorhub Dispatch Metrics ===\n\n");
        report.push_str(&format!("Events dispatched: {}\n", self.dispatched));
        report.push_str(&format!("Synthesized: {}\n", self.synthesized));
        report.push_str(&format!(
            "Deliveries: {} ({} failed, {:.1}%)\n",
            self.deliveries,
            self.delivery_failures,
            self.failure_rate() * 100.0
        ));
        report.push_str(&format!("Average fan-out: {:.2}\n", self.fan_out()));
        report.push_str(&format!("Replays: {}\n", self.replays));
        report.push_str(&format!("Suppressed (display off): {}\n\n", self.suppressed));

        report.push_str("Per sensor type:\n");
        let mut types: Vec<_> = self.per_type.iter().collect();
        types.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
        for (sensor_type, count) in types {
            let percent = if self.dispatched > 0 {
                (*count as f64 / self.dispatched as f64) * 100.0
            } else {
                0.0
            };
            report.push_str(&format!("  {}: {} ({:.1}%)\n", sensor_type, count, percent));
        }

        report
    }
}
