// Sensorhub - Sensor hub core
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Connected clients
//!
//! A [`ClientRecord`] is created on connect and destroyed on disconnect.
//! It is the source of truth for what a client asked for: the hub pushes a
//! client's interval and batch into the node rate tables only while the
//! client has the sensor started.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use bitflags::bitflags;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::error::{HubError, Result, SinkError};
use crate::event::{ClientId, Event, EventType, SensorId};
use crate::permission::Permission;

bitflags! {
    /// When a client still wants events from a sensor
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct SensorOption: u32 {
        /// Keep delivering while the display is off
        const ON_IN_SCREEN_OFF = 1 << 0;
        /// Keep delivering in power-save mode
        const ON_IN_POWERSAVE = 1 << 1;
        /// Never suppress
        const ALWAYS_ON = Self::ON_IN_SCREEN_OFF.bits() | Self::ON_IN_POWERSAVE.bits();
    }
}

/// Outbound channel of one client
pub trait EventSink: Send + Sync {
    /// Hand one event to the client without blocking
    fn send(&self, event: &Event) -> std::result::Result<(), SinkError>;
}

/// In-memory sink for tests and local tools
#[derive(Debug)]
pub struct MemorySink {
    buffer: Mutex<VecDeque<Event>>,
    max_buffer_size: usize,
    open: AtomicBool,
    sent: AtomicU64,
}

impl MemorySink {
    /// Create a new memory sink
    pub fn new() -> Self {
        Self::with_buffer_size(1000)
    }

    /// Create with custom buffer size
    pub fn with_buffer_size(max_size: usize) -> Self {
        Self {
            buffer: Mutex::new(VecDeque::with_capacity(max_size.min(1024))),
            max_buffer_size: max_size,
            open: AtomicBool::new(true),
            sent: AtomicU64::new(0),
        }
    }

    /// Take every buffered event
    pub fn drain(&self) -> Vec<Event> {
        self.buffer.lock().drain(..).collect()
    }

    /// Copy of the buffered events
    pub fn events(&self) -> Vec<Event> {
        self.buffer.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Events accepted since creation
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Simulate the peer going away
    pub fn close(&self) {
        self.open.store(false, Ordering::Release);
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for MemorySink {
    fn send(&self, event: &Event) -> std::result::Result<(), SinkError> {
        if !self.open.load(Ordering::Acquire) {
            return Err(SinkError::Disconnected {
                reason: "Sink is closed".to_string(),
            });
        }

        let mut buffer = self.buffer.lock();
        if buffer.len() >= self.max_buffer_size {
            return Err(SinkError::BufferFull);
        }
        buffer.push_back(event.clone());
        self.sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// What one client asked of one sensor
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClientSensorState {
    pub started: bool,
    pub events: BTreeSet<EventType>,
    pub interval_ms: Option<u32>,
    pub batch_ms: Option<u32>,
    pub option: SensorOption,
}

impl ClientSensorState {
    /// Whether the client receives this event right now
    pub fn wants(&self, event_type: EventType, display_off: bool) -> bool {
        self.started
            && self.events.contains(&event_type)
            && (!display_off || self.option.contains(SensorOption::ON_IN_SCREEN_OFF))
    }
}

/// One connected client
pub struct ClientRecord {
    pub id: ClientId,
    pub pid: u32,
    pub uid: u32,
    pub permission: Permission,
    sink: Arc<dyn EventSink>,
    sensors: HashMap<SensorId, ClientSensorState>,
}

impl ClientRecord {
    pub fn sink(&self) -> &Arc<dyn EventSink> {
        &self.sink
    }

    /// State for a sensor the client has touched
    pub fn sensor(&self, sensor_id: SensorId) -> Option<&ClientSensorState> {
        self.sensors.get(&sensor_id)
    }

    /// State for a sensor, created on first use
    pub fn sensor_mut(&mut self, sensor_id: SensorId) -> &mut ClientSensorState {
        self.sensors.entry(sensor_id).or_default()
    }

    /// Sensors the client has touched
    pub fn sensor_ids(&self) -> Vec<SensorId> {
        let mut ids: Vec<_> = self.sensors.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Sensors the client has started
    pub fn started_sensors(&self) -> Vec<SensorId> {
        let mut ids: Vec<_> = self
            .sensors
            .iter()
            .filter(|(_, s)| s.started)
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }
}

impl std::fmt::Debug for ClientRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientRecord")
            .field("id", &self.id)
            .field("pid", &self.pid)
            .field("permission", &self.permission)
            .field("sensors", &self.sensors)
            .finish()
    }
}

/// Sinks an event must be sent to
pub struct Listeners {
    pub sinks: Vec<(ClientId, Arc<dyn EventSink>)>,
    /// Clients skipped because the display is off
    pub suppressed: usize,
}

/// Every connected client, behind one lock
#[derive(Default)]
pub struct ClientRegistry {
    next_id: AtomicU32,
    clients: RwLock<HashMap<ClientId, ClientRecord>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new client and return its id
    pub fn connect(
        &self,
        pid: u32,
        uid: u32,
        permission: Permission,
        sink: Arc<dyn EventSink>,
    ) -> ClientId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let record = ClientRecord {
            id,
            pid,
            uid,
            permission,
            sink,
            sensors: HashMap::new(),
        };
        self.clients.write().insert(id, record);
        log::info!("client {} connected (pid {}, uid {})", id, pid, uid);
        id
    }

    /// Remove a client, returning its record
    pub fn disconnect(&self, id: ClientId) -> Result<ClientRecord> {
        let record = self
            .clients
            .write()
            .remove(&id)
            .ok_or(HubError::UnknownClient(id))?;
        log::info!("client {} disconnected", id);
        Ok(record)
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.clients.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.clients.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Connected client ids, sorted
    pub fn ids(&self) -> Vec<ClientId> {
        let mut ids: Vec<_> = self.clients.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Run `f` on a client record under the read lock
    pub fn with_client<R>(&self, id: ClientId, f: impl FnOnce(&ClientRecord) -> R) -> Result<R> {
        let clients = self.clients.read();
        let record = clients.get(&id).ok_or(HubError::UnknownClient(id))?;
        Ok(f(record))
    }

    /// Run `f` on a client record under the write lock.
    ///
    /// Node calls made from `f` happen with the registry locked, which is
    /// the documented lock order (registry, then nodes).
    pub fn with_client_mut<R>(
        &self,
        id: ClientId,
        f: impl FnOnce(&mut ClientRecord) -> Result<R>,
    ) -> Result<R> {
        let mut clients = self.clients.write();
        let record = clients.get_mut(&id).ok_or(HubError::UnknownClient(id))?;
        f(record)
    }

    /// Every client that should receive `event`
    pub fn listeners(&self, event: &Event, display_off: bool) -> Listeners {
        self.listeners_with(event, display_off, || ())
    }

    /// Like [`listeners`](Self::listeners), running `f` first under the same
    /// read lock. No client operation can land between the two.
    pub fn listeners_with(
        &self,
        event: &Event,
        display_off: bool,
        f: impl FnOnce(),
    ) -> Listeners {
        let clients = self.clients.read();
        f();
        let mut sinks = Vec::new();
        let mut suppressed = 0;
        for record in clients.values() {
            let Some(state) = record.sensors.get(&event.sensor_id) else {
                continue;
            };
            if state.wants(event.event_type, display_off) {
                sinks.push((record.id, record.sink.clone()));
            } else if state.wants(event.event_type, false) {
                suppressed += 1;
            }
        }
        sinks.sort_by_key(|(id, _)| *id);
        Listeners { sinks, suppressed }
    }
}
