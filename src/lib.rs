//! # Sensorhub - Sensor hub core
//!
//! A process-wide broker between sensor hardware and the client processes
//! that consume it. Physical sensors (accelerometer, gyroscope, proximity,
//! light, pressure, magnetometer) and derived virtual sensors (gravity,
//! linear acceleration, orientation, rotation vector) are multiplexed to any
//! number of clients, each with its own rate, batching and permissions.
//!
//! ## Key Features
//!
//! - **Composition graph**: virtual sensors subscribe to upstream nodes and
//!   synthesize derived events
//! - **Rate negotiation**: the hardware runs at the fastest interval and the
//!   longest batch latency any requester asked for
//! - **Bounded dispatch**: one MPSC queue between pollers and the
//!   dispatcher, with an explicit drop policy when full
//! - **Replay**: a late client gets the last cached event once on start
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use sensorhub::{EventType, HubConfig, MemoryAdapter, MemorySink, SensorHub, SensorType};
//!
//! let hub = SensorHub::builder(HubConfig::default())
//!     .adapter(Arc::new(MemoryAdapter::new(SensorType::Light)))
//!     .build()
//!     .unwrap();
//!
//! let sink = Arc::new(MemorySink::new());
//! let client = hub.connect(1234, 1000, sink.clone());
//! let light = hub.registry().by_type(SensorType::Light).unwrap().id();
//!
//! hub.register_event(client, light, EventType::raw(SensorType::Light)).unwrap();
//! hub.set_interval(client, light, 200).unwrap();
//! hub.start_sensor(client, light).unwrap();
//! hub.disconnect(client).unwrap();
//! ```
//!
//! ## Modules
//!
//! - [`event`]: Sensor types, event types and the event payload
//! - [`adapter`]: Device adapter contract and unit conversion
//! - [`node`]: Physical and virtual sensor nodes
//! - [`rate`]: Interval and batch reconciliation
//! - [`queue`]: Bounded dispatch queue
//! - [`dispatcher`]: Fan-out and last-event cache
//! - [`client`]: Client records and outbound sinks
//! - [`hub`]: The hub context and client operations

// Modules
pub mod adapter;
pub mod client;
pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod fusion;
pub mod health;
pub mod hub;
pub mod metrics;
pub mod node;
pub mod permission;
pub mod queue;
pub mod rate;
pub mod registry;

// Re-exports for convenient access
pub use adapter::{
    AxisRotation, Conversion, DeviceAdapter, MemoryAdapter, ProximityMap, ProximityState,
    SensorProperties,
};
pub use client::{ClientRegistry, ClientSensorState, EventSink, MemorySink, SensorOption};
pub use config::{DeviceConfigTable, DeviceEntry, HubConfig};
pub use dispatcher::{EventDispatcher, LastEventCache};
pub use error::{AdapterError, HubError, Result, SinkError};
pub use event::{
    Accuracy, ClientId, Event, EventKind, EventType, RawSample, SensorId, SensorType,
};
pub use fusion::{Fusion, STANDARD_GRAVITY};
pub use health::{HealthCheck, HealthConfig, HealthMonitor, HealthStatus, QueueSnapshot};
pub use hub::{SensorHub, SensorHubBuilder};
pub use metrics::{DispatchMetrics, DispatchStats};
pub use node::{NodeKind, SensorInfo, SensorNode};
pub use permission::{Permission, PermissionChecker, StaticPermissions};
pub use queue::{DispatchQueue, DropPolicy, QueueConfig, QueueOrdering, WakePolicy};
pub use rate::{RateTable, Requester};
pub use registry::{RegistryBuilder, SensorRegistry};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default dispatch queue capacity
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_default_capacity() {
        assert_eq!(QueueConfig::default().capacity, DEFAULT_QUEUE_CAPACITY);
    }

    #[test]
    fn test_basic_flow() {
        let adapter = Arc::new(MemoryAdapter::new(SensorType::Light));
        let hub = SensorHub::builder(HubConfig::default())
            .adapter(adapter.clone())
            .build()
            .unwrap();
        let sink = Arc::new(MemorySink::new());
        let client = hub.connect(1, 1000, sink.clone());
        let light = hub.registry().by_type(SensorType::Light).unwrap().id();

        hub.register_event(client, light, EventType::raw(SensorType::Light)).unwrap();
        hub.start_sensor(client, light).unwrap();
        adapter.push_sample(RawSample::new(vec![120.0]));

        let node = hub.registry().get(light).unwrap();
        assert!(node.poll_once(std::time::Duration::from_millis(10)).unwrap());
        hub.dispatcher().drain();
        assert_eq!(sink.drain()[0].values, vec![120.0]);
    }
}
