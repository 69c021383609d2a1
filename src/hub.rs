// Sensorhub - Sensor hub core
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! The sensor hub context
//!
//! [`SensorHub`] owns the registry, the client registry, the dispatch queue
//! and the dispatcher, and exposes the client operations. Every mutating
//! operation either succeeds or leaves the hub as it was.
//!
//! Lock order is client registry, then downstream node, then upstream node.
//! Client operations hold the registry write lock while they call into
//! nodes; the dispatcher never holds a node lock while it reads the client
//! registry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;

use crate::adapter::{DeviceAdapter, SensorProperties};
use crate::client::{ClientRecord, ClientRegistry, EventSink, SensorOption};
use crate::config::{DeviceConfigTable, HubConfig};
use crate::dispatcher::EventDispatcher;
use crate::error::{AdapterError, HubError, Result};
use crate::event::{ClientId, Event, EventKind, EventType, SensorId, SensorType};
use crate::health::{HealthMonitor, HealthStatus, QueueSnapshot};
use crate::metrics::DispatchMetrics;
use crate::node::{SensorInfo, SensorNode};
use crate::permission::{PermissionChecker, StaticPermissions};
use crate::queue::DispatchQueue;
use crate::rate::Requester;
use crate::registry::SensorRegistry;

/// Builder for [`SensorHub`]
pub struct SensorHubBuilder {
    config: HubConfig,
    devices: DeviceConfigTable,
    adapters: Vec<Arc<dyn DeviceAdapter>>,
    virtual_types: Option<Vec<SensorType>>,
    permissions: Arc<dyn PermissionChecker>,
}

impl SensorHubBuilder {
    pub fn new(config: HubConfig) -> Self {
        Self {
            config,
            devices: DeviceConfigTable::default(),
            adapters: Vec::new(),
            virtual_types: None,
            permissions: Arc::new(StaticPermissions::default()),
        }
    }

    /// Static device configuration table
    pub fn devices(mut self, devices: DeviceConfigTable) -> Self {
        self.devices = devices;
        self
    }

    /// Add one hardware sensor
    pub fn adapter(mut self, adapter: Arc<dyn DeviceAdapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    /// Restrict the virtual sensors to this list (all built-ins by default)
    pub fn virtual_sensors(mut self, types: Vec<SensorType>) -> Self {
        self.virtual_types = Some(types);
        self
    }

    /// Privilege lookup for new connections
    pub fn permissions(mut self, permissions: Arc<dyn PermissionChecker>) -> Self {
        self.permissions = permissions;
        self
    }

    /// Build the graph; fails with [`HubError::NoSensors`] if nothing registers
    pub fn build(self) -> Result<SensorHub> {
        if self.config.queue.capacity == 0 {
            log::warn!("dispatch queue capacity is 0, every event will be dropped");
        }
        let queue = Arc::new(DispatchQueue::new(self.config.queue.clone()));

        let mut builder = SensorRegistry::builder(queue.clone())
            .devices(self.devices)
            .default_interval_ms(self.config.default_interval_ms);
        for adapter in self.adapters {
            builder = builder.physical(adapter);
        }
        builder = match self.virtual_types {
            Some(types) => types.into_iter().fold(builder, |b, t| b.virtual_sensor(t)),
            None => builder.all_virtual_sensors(),
        };
        let registry = Arc::new(builder.build()?);

        let clients = Arc::new(ClientRegistry::new());
        let dispatcher = Arc::new(EventDispatcher::new(
            queue.clone(),
            registry.clone(),
            clients.clone(),
        ));

        Ok(SensorHub {
            health: Mutex::new(HealthMonitor::with_config(self.config.health.clone())),
            config: self.config,
            queue,
            registry,
            clients,
            dispatcher,
            permissions: self.permissions,
            running: Arc::new(AtomicBool::new(false)),
            threads: Mutex::new(Vec::new()),
        })
    }
}

/// Process-wide sensor hub
pub struct SensorHub {
    config: HubConfig,
    queue: Arc<DispatchQueue>,
    registry: Arc<SensorRegistry>,
    clients: Arc<ClientRegistry>,
    dispatcher: Arc<EventDispatcher>,
    permissions: Arc<dyn PermissionChecker>,
    running: Arc<AtomicBool>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    health: Mutex<HealthMonitor>,
}

impl SensorHub {
    pub fn builder(config: HubConfig) -> SensorHubBuilder {
        SensorHubBuilder::new(config)
    }

    /// Spawn one polling thread per physical node and the dispatcher thread.
    ///
    /// A hub cannot be restarted once [`shutdown`](Self::shutdown) closed
    /// its queue.
    pub fn start(&self) -> Result<()> {
        if self.queue.is_closed() {
            return Err(HubError::ShutDown);
        }
        if self.running.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let mut threads = self.threads.lock();

        for node in self.registry.physical_nodes() {
            let node = node.clone();
            let running = self.running.clone();
            let timeout = self.config.poll_timeout;
            let handle = thread::Builder::new()
                .name(format!("poll-{}", node.sensor_type()))
                .spawn(move || poll_loop(&node, &running, timeout))
                .map_err(|e| HubError::Spawn(format!("poller: {}", e)))?;
            threads.push(handle);
        }

        let dispatcher = self.dispatcher.clone();
        let handle = thread::Builder::new()
            .name("dispatcher".to_string())
            .spawn(move || dispatcher.run())
            .map_err(|e| HubError::Spawn(format!("dispatcher: {}", e)))?;
        threads.push(handle);

        log::info!(
            "sensor hub running: {} sensors, queue capacity {}",
            self.registry.len(),
            self.queue.capacity()
        );
        Ok(())
    }

    /// Stop every thread. Queued events are still dispatched first.
    pub fn shutdown(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        for node in self.registry.physical_nodes() {
            node.wake();
        }
        self.queue.close();

        let threads: Vec<_> = self.threads.lock().drain(..).collect();
        for handle in threads {
            let name = handle.thread().name().unwrap_or("worker").to_string();
            if handle.join().is_err() {
                log::error!("{} thread panicked", name);
            }
        }
        log::info!("sensor hub stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    // --- client operations ---

    /// Register a new client; its permissions come from the checker
    pub fn connect(&self, pid: u32, uid: u32, sink: Arc<dyn EventSink>) -> ClientId {
        let permission = self.permissions.permissions(pid, uid);
        self.clients.connect(pid, uid, permission, sink)
    }

    /// Remove a client and release everything it holds
    pub fn disconnect(&self, client_id: ClientId) -> Result<()> {
        let record = self.clients.disconnect(client_id)?;
        self.release_all(&record);
        Ok(())
    }

    fn release_all(&self, record: &ClientRecord) {
        let requester = Requester::Client(record.id);
        for sensor_id in record.sensor_ids() {
            if let Ok(node) = self.registry.get(sensor_id) {
                if let Err(e) = node.detach(requester) {
                    log::warn!("client {}: release of sensor {}: {}", record.id, sensor_id, e);
                }
            }
        }
    }

    /// Start a sensor for a client, then replay its cached events.
    ///
    /// The replay runs under the same client registry lock that marks the
    /// sensor started, so it is ordered against the dispatcher's fan-out.
    pub fn start_sensor(&self, client_id: ClientId, sensor_id: SensorId) -> Result<()> {
        let node = self.registry.get(sensor_id)?;
        let requester = Requester::Client(client_id);

        self.clients.with_client_mut(client_id, |client| {
            check_permission(client, &node)?;
            let state = client.sensor_mut(sensor_id);
            if state.started {
                return Ok(());
            }

            if let Some(interval) = state.interval_ms {
                node.add_interval(requester, interval)?;
            }
            let subscribed = match state.batch_ms {
                Some(batch) => node.add_batch(requester, batch),
                None => Ok(()),
            }
            .and_then(|_| node.start(requester));

            if let Err(e) = subscribed {
                if let Err(rollback) = node.detach(requester) {
                    log::warn!(
                        "client {}: rollback of sensor {} failed: {}",
                        client_id,
                        sensor_id,
                        rollback
                    );
                }
                return Err(e);
            }
            state.started = true;
            self.dispatcher.replay_to(client, sensor_id);
            Ok(())
        })
    }

    /// Stop a sensor for a client, releasing its interval and batch
    pub fn stop_sensor(&self, client_id: ClientId, sensor_id: SensorId) -> Result<()> {
        let node = self.registry.get(sensor_id)?;
        self.clients.with_client_mut(client_id, |client| {
            let state = client.sensor_mut(sensor_id);
            if !state.started {
                return Err(HubError::NotStarted(sensor_id));
            }
            state.started = false;
            if let Err(e) = node.detach(Requester::Client(client_id)) {
                log::warn!("client {}: stop of sensor {}: {}", client_id, sensor_id, e);
            }
            Ok(())
        })
    }

    /// Subscribe a client to one event type of a sensor
    pub fn register_event(
        &self,
        client_id: ClientId,
        sensor_id: SensorId,
        event_type: EventType,
    ) -> Result<()> {
        let node = self.registry.get(sensor_id)?;
        if !node.sensor_type().emits(event_type) {
            return Err(HubError::EventTypeMismatch {
                sensor_id,
                event_type,
            });
        }
        self.clients.with_client_mut(client_id, |client| {
            check_permission(client, &node)?;
            if !client.sensor_mut(sensor_id).events.insert(event_type) {
                return Err(HubError::DuplicateRegistration {
                    sensor_id,
                    event_type,
                });
            }
            Ok(())
        })
    }

    /// Unsubscribe a client from one event type of a sensor
    pub fn unregister_event(
        &self,
        client_id: ClientId,
        sensor_id: SensorId,
        event_type: EventType,
    ) -> Result<()> {
        self.registry.get(sensor_id)?;
        self.clients.with_client_mut(client_id, |client| {
            let removed = client.sensor_mut(sensor_id).events.remove(&event_type);
            if !removed {
                return Err(HubError::NotRegistered {
                    sensor_id,
                    event_type,
                });
            }
            Ok(())
        })
    }

    /// Request a sampling interval
    pub fn set_interval(
        &self,
        client_id: ClientId,
        sensor_id: SensorId,
        interval_ms: u32,
    ) -> Result<()> {
        if interval_ms == 0 {
            return Err(HubError::InvalidConfig("interval must be > 0".to_string()));
        }
        let node = self.registry.get(sensor_id)?;
        self.clients.with_client_mut(client_id, |client| {
            check_permission(client, &node)?;
            let state = client.sensor_mut(sensor_id);
            if state.started {
                node.add_interval(Requester::Client(client_id), interval_ms)?;
            }
            state.interval_ms = Some(interval_ms);
            Ok(())
        })
    }

    /// Request a sampling interval and a batch latency together.
    ///
    /// Both are applied or neither is.
    pub fn set_batch(
        &self,
        client_id: ClientId,
        sensor_id: SensorId,
        interval_ms: u32,
        latency_ms: u32,
    ) -> Result<()> {
        if interval_ms == 0 {
            return Err(HubError::InvalidConfig("interval must be > 0".to_string()));
        }
        let node = self.registry.get(sensor_id)?;
        self.clients.with_client_mut(client_id, |client| {
            check_permission(client, &node)?;
            let state = client.sensor_mut(sensor_id);
            if state.started {
                let requester = Requester::Client(client_id);
                node.add_interval(requester, interval_ms)?;
                if let Err(e) = node.add_batch(requester, latency_ms) {
                    let restored = match state.interval_ms {
                        Some(previous) => node.add_interval(requester, previous),
                        None => node.delete_interval(requester).map(|_| ()),
                    };
                    if let Err(rollback) = restored {
                        log::warn!(
                            "client {}: interval rollback on sensor {} failed: {}",
                            client_id,
                            sensor_id,
                            rollback
                        );
                    }
                    return Err(e);
                }
            }
            state.interval_ms = Some(interval_ms);
            state.batch_ms = Some(latency_ms);
            Ok(())
        })
    }

    /// Drop the batch latency request
    pub fn unset_batch(&self, client_id: ClientId, sensor_id: SensorId) -> Result<()> {
        let node = self.registry.get(sensor_id)?;
        self.clients.with_client_mut(client_id, |client| {
            let state = client.sensor_mut(sensor_id);
            if state.started {
                node.delete_batch(Requester::Client(client_id))?;
            }
            state.batch_ms = None;
            Ok(())
        })
    }

    /// Set when the client still wants events
    pub fn set_option(
        &self,
        client_id: ClientId,
        sensor_id: SensorId,
        option: SensorOption,
    ) -> Result<()> {
        let node = self.registry.get(sensor_id)?;
        self.clients.with_client_mut(client_id, |client| {
            check_permission(client, &node)?;
            client.sensor_mut(sensor_id).option = option;
            Ok(())
        })
    }

    /// Latest event of one type from a started sensor.
    ///
    /// Served from the last-event cache. Raw data is read from the device
    /// when nothing is cached yet; other kinds only exist once produced.
    pub fn get_data(
        &self,
        client_id: ClientId,
        sensor_id: SensorId,
        event_type: EventType,
    ) -> Result<Event> {
        let node = self.registry.get(sensor_id)?;
        if !node.sensor_type().emits(event_type) {
            return Err(HubError::EventTypeMismatch {
                sensor_id,
                event_type,
            });
        }
        let started = self.clients.with_client(client_id, |client| {
            client.sensor(sensor_id).map(|s| s.started).unwrap_or(false)
        })?;
        if !started {
            return Err(HubError::NotStarted(sensor_id));
        }

        if let Some(event) = self.dispatcher.cache().get(sensor_id, event_type) {
            return Ok(event);
        }
        let no_data = HubError::adapter(sensor_id, AdapterError::NoData);
        if event_type.kind != EventKind::RawData {
            return Err(no_data);
        }
        node.read_now()?.ok_or(no_data)
    }

    /// Static descriptor of a sensor
    pub fn get_properties(
        &self,
        client_id: ClientId,
        sensor_id: SensorId,
    ) -> Result<SensorProperties> {
        let node = self.registry.get(sensor_id)?;
        self.clients.with_client(client_id, |client| {
            if !client.permission.allows(node.info().required_permission) {
                return Err(HubError::PermissionDenied {
                    client_id,
                    sensor_id,
                });
            }
            Ok(node.info().properties.clone())
        })?
    }

    /// Sensors the client is allowed to use
    pub fn list_sensors(&self, client_id: ClientId) -> Result<Vec<SensorInfo>> {
        let permission = self.clients.with_client(client_id, |client| client.permission)?;
        Ok(self
            .registry
            .nodes()
            .iter()
            .filter(|n| permission.allows(n.info().required_permission))
            .map(|n| n.info().clone())
            .collect())
    }

    /// Display on/off, gates delivery per client option
    pub fn set_display_state(&self, on: bool) {
        self.dispatcher.set_display_off(!on);
    }

    // --- introspection ---

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SensorRegistry> {
        &self.registry
    }

    pub fn clients(&self) -> &Arc<ClientRegistry> {
        &self.clients
    }

    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    pub fn queue(&self) -> &Arc<DispatchQueue> {
        &self.queue
    }

    pub fn queue_snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            len: self.queue.len(),
            capacity: self.queue.capacity(),
            pushed: self.queue.pushed(),
            dropped: self.queue.dropped(),
        }
    }

    pub fn metrics(&self) -> DispatchMetrics {
        self.dispatcher.stats().snapshot()
    }

    /// Re-evaluate pipeline health
    pub fn health(&self) -> HealthStatus {
        let queue = self.queue_snapshot();
        let metrics = self.metrics();
        self.health.lock().evaluate(&queue, &metrics)
    }

    /// Human-readable health report from the last evaluation
    pub fn health_report(&self) -> String {
        self.health.lock().report()
    }
}

impl Drop for SensorHub {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn check_permission(client: &ClientRecord, node: &SensorNode) -> Result<()> {
    if client.permission.allows(node.info().required_permission) {
        Ok(())
    } else {
        log::warn!("client {} denied sensor {}", client.id, node.id());
        Err(HubError::PermissionDenied {
            client_id: client.id,
            sensor_id: node.id(),
        })
    }
}

fn poll_loop(node: &SensorNode, running: &AtomicBool, timeout: std::time::Duration) {
    log::debug!("poller for sensor {} started", node.id());
    while running.load(Ordering::Acquire) {
        if !node.wait_active(timeout) {
            continue;
        }
        if let Err(e) = node.poll_once(timeout) {
            log::warn!("sensor {}: {}", node.id(), e);
            thread::sleep(timeout);
        }
    }
    log::debug!("poller for sensor {} stopped", node.id());
}
