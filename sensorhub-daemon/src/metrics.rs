// Sensorhub Daemon - Prometheus metrics definitions
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Prometheus metrics for hub monitoring.
//!
//! The core keeps plain counters; this module mirrors them into gauges on
//! every scrape, so nothing in the dispatch path touches prometheus.

use prometheus::{Encoder, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};
use sensorhub::SensorHub;

use crate::error::Result;

/// All gauges exported at `/metrics`
pub struct HubMetrics {
    registry: Registry,

    // Dispatch counters (from DispatchMetrics)
    events_dispatched: IntGauge,
    deliveries: IntGauge,
    delivery_failures: IntGauge,
    synthesized: IntGauge,
    replays: IntGauge,
    suppressed: IntGauge,
    events_by_type: IntGaugeVec,

    // Dispatch queue
    queue_depth: IntGauge,
    queue_capacity: IntGauge,
    queue_dropped: IntGauge,
    queue_high_water: IntGauge,

    // Hub state
    health: IntGauge,
    clients: IntGauge,
    active_sensors: IntGauge,
}

impl HubMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let metrics = Self {
            events_dispatched: int_gauge(
                &registry,
                "sensorhub_events_dispatched_total",
                "Events taken off the dispatch queue",
            )?,
            deliveries: int_gauge(
                &registry,
                "sensorhub_deliveries_total",
                "Events delivered to clients",
            )?,
            delivery_failures: int_gauge(
                &registry,
                "sensorhub_delivery_failures_total",
                "Client sends that failed",
            )?,
            synthesized: int_gauge(
                &registry,
                "sensorhub_synthesized_total",
                "Events produced by virtual sensors",
            )?,
            replays: int_gauge(
                &registry,
                "sensorhub_replays_total",
                "Cached events replayed to late clients",
            )?,
            suppressed: int_gauge(
                &registry,
                "sensorhub_suppressed_total",
                "Deliveries skipped while the display was off",
            )?,
            events_by_type: {
                let vec = IntGaugeVec::new(
                    Opts::new(
                        "sensorhub_events_by_type_total",
                        "Events dispatched per sensor type",
                    ),
                    &["sensor_type"],
                )?;
                registry.register(Box::new(vec.clone()))?;
                vec
            },
            queue_depth: int_gauge(
                &registry,
                "sensorhub_queue_depth",
                "Events waiting in the dispatch queue",
            )?,
            queue_capacity: int_gauge(
                &registry,
                "sensorhub_queue_capacity",
                "Dispatch queue capacity",
            )?,
            queue_dropped: int_gauge(
                &registry,
                "sensorhub_queue_dropped_total",
                "Events dropped because the queue was full",
            )?,
            queue_high_water: int_gauge(
                &registry,
                "sensorhub_queue_high_water",
                "Deepest the dispatch queue has been",
            )?,
            health: int_gauge(
                &registry,
                "sensorhub_health",
                "Pipeline health (0=Healthy, 1=Degraded, 2=Unhealthy, 3=Unknown)",
            )?,
            clients: int_gauge(&registry, "sensorhub_clients", "Connected clients")?,
            active_sensors: int_gauge(
                &registry,
                "sensorhub_active_sensors",
                "Sensors with at least one requester",
            )?,
            registry,
        };
        Ok(metrics)
    }

    /// Refresh every gauge from the hub
    pub fn update(&self, hub: &SensorHub) {
        let dispatch = hub.metrics();
        self.events_dispatched.set(dispatch.dispatched as i64);
        self.deliveries.set(dispatch.deliveries as i64);
        self.delivery_failures.set(dispatch.delivery_failures as i64);
        self.synthesized.set(dispatch.synthesized as i64);
        self.replays.set(dispatch.replays as i64);
        self.suppressed.set(dispatch.suppressed as i64);
        for (sensor_type, count) in &dispatch.per_type {
            self.events_by_type
                .with_label_values(&[sensor_type.name()])
                .set(*count as i64);
        }

        let queue = hub.queue();
        self.queue_depth.set(queue.len() as i64);
        self.queue_capacity.set(queue.capacity() as i64);
        self.queue_dropped.set(queue.dropped() as i64);
        self.queue_high_water.set(queue.high_water() as i64);

        self.health.set(hub.health().as_gauge());
        self.clients.set(hub.clients().len() as i64);
        self.active_sensors.set(
            hub.registry()
                .nodes()
                .iter()
                .filter(|n| n.is_active())
                .count() as i64,
        );
    }

    /// Encode all metrics to Prometheus text format.
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

fn int_gauge(registry: &Registry, name: &str, help: &str) -> Result<IntGauge> {
    let gauge = IntGauge::new(name, help)?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}
