// Sensorhub - Sensor hub core
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Event dispatcher
//!
//! The single consumer of the [`DispatchQueue`]. For every dequeued event
//! it feeds the virtual sensors subscribed to the producer, records the
//! event in the [`LastEventCache`] and fans it out to every client that has
//! the sensor started and the event type registered.
//!
//! Synthesized events go back through the queue, so a chain such as
//! accelerometer, gravity, linear acceleration never recurses.
//!
//! Recording an event and picking its listeners happen under one read lock
//! of the client registry. A client start marks the sensor started and
//! replays the cache under the write lock, so a late client sees each event
//! once: either by fan-out or by replay, never both.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::client::{ClientRecord, ClientRegistry};
use crate::error::Result;
use crate::event::{ClientId, Event, EventType, SensorId};
use crate::metrics::DispatchStats;
use crate::queue::DispatchQueue;
use crate::registry::SensorRegistry;

/// Most recent recordable event per sensor and event type
#[derive(Debug, Default)]
pub struct LastEventCache {
    events: RwLock<HashMap<(SensorId, EventType), Event>>,
}

impl LastEventCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember `event` if its type is recordable
    pub fn record(&self, event: &Event) -> bool {
        if !event.event_type.is_recordable() {
            return false;
        }
        self.events
            .write()
            .insert((event.sensor_id, event.event_type), event.clone());
        true
    }

    pub fn get(&self, sensor_id: SensorId, event_type: EventType) -> Option<Event> {
        self.events.read().get(&(sensor_id, event_type)).cloned()
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.events.write().clear();
    }
}

/// Fan-out of queued events to clients
pub struct EventDispatcher {
    queue: Arc<DispatchQueue>,
    registry: Arc<SensorRegistry>,
    clients: Arc<ClientRegistry>,
    cache: LastEventCache,
    stats: DispatchStats,
    display_off: AtomicBool,
}

impl EventDispatcher {
    pub fn new(
        queue: Arc<DispatchQueue>,
        registry: Arc<SensorRegistry>,
        clients: Arc<ClientRegistry>,
    ) -> Self {
        Self {
            queue,
            registry,
            clients,
            cache: LastEventCache::new(),
            stats: DispatchStats::new(),
            display_off: AtomicBool::new(false),
        }
    }

    /// Consume the queue until it is closed
    pub fn run(&self) {
        log::info!("dispatcher started");
        while let Some(event) = self.queue.pop() {
            self.dispatch_one(event);
        }
        log::info!("dispatcher stopped");
    }

    /// Dispatch whatever is queued right now, without blocking.
    ///
    /// Events synthesized on the way are dispatched too. Returns the number
    /// of events processed.
    pub fn drain(&self) -> usize {
        let mut count = 0;
        while let Some(event) = self.queue.try_pop() {
            self.dispatch_one(event);
            count += 1;
        }
        count
    }

    /// Process one dequeued event, returning the number of clients reached
    pub fn dispatch_one(&self, event: Event) -> usize {
        self.stats.record_dispatch(event.event_type.sensor_type);

        for consumer in self.registry.consumers_of(event.sensor_id) {
            let produced = consumer.synthesize(&event);
            if produced > 0 {
                self.stats.record_synthesized(produced);
            }
        }

        let listeners = self
            .clients
            .listeners_with(&event, self.is_display_off(), || {
                self.cache.record(&event);
            });
        for _ in 0..listeners.suppressed {
            self.stats.record_suppressed();
        }

        let mut delivered = 0;
        for (client_id, sink) in listeners.sinks {
            match sink.send(&event) {
                Ok(()) => {
                    delivered += 1;
                    self.stats.record_delivery(true);
                }
                Err(e) => {
                    log::warn!("send {} to client {} failed: {}", event.event_type, client_id, e);
                    self.stats.record_delivery(false);
                }
            }
        }
        delivered
    }

    /// Deliver the cached events of `sensor_id` to one client.
    ///
    /// Only the event types the client registered on that sensor are
    /// replayed, each once per call. Returns the number of events sent.
    pub fn request_last_event(&self, client_id: ClientId, sensor_id: SensorId) -> Result<usize> {
        self.registry.get(sensor_id)?;
        self.clients
            .with_client(client_id, |client| self.replay_to(client, sensor_id))
    }

    /// Replay the cached events of `sensor_id` to a client record the
    /// caller already holds through the client registry
    pub fn replay_to(&self, client: &ClientRecord, sensor_id: SensorId) -> usize {
        let Some(state) = client.sensor(sensor_id) else {
            return 0;
        };

        let mut sent = 0;
        for event_type in &state.events {
            let Some(event) = self.cache.get(sensor_id, *event_type) else {
                continue;
            };
            match client.sink().send(&event) {
                Ok(()) => sent += 1,
                Err(e) => {
                    log::warn!("replay {} to client {} failed: {}", event_type, client.id, e);
                    self.stats.record_delivery(false);
                }
            }
        }
        if sent > 0 {
            log::debug!("replayed {} cached events to client {}", sent, client.id);
            self.stats.record_replay(sent);
        }
        sent
    }

    /// Suppress delivery to clients without `ON_IN_SCREEN_OFF`
    pub fn set_display_off(&self, off: bool) {
        let was = self.display_off.swap(off, Ordering::AcqRel);
        if was != off {
            log::info!("display {}", if off { "off" } else { "on" });
        }
    }

    pub fn is_display_off(&self) -> bool {
        self.display_off.load(Ordering::Acquire)
    }

    pub fn cache(&self) -> &LastEventCache {
        &self.cache
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }
}
