// Sensorhub - Sensor hub core
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Sensor registry
//!
//! Built once at startup by [`RegistryBuilder`]: physical nodes first, then
//! virtual nodes in dependency order so that every upstream exists before
//! the node that consumes it. A virtual sensor whose upstreams are missing
//! is skipped with a warning. The graph is read-only afterwards.
//!
//! Redundant hardware gets one node per adapter. The first adapter of a
//! type is the primary node: type lookups and virtual sensors use it.

use std::collections::HashMap;
use std::sync::Arc;

use crate::adapter::{Conversion, DeviceAdapter, SensorProperties};
use crate::config::DeviceConfigTable;
use crate::error::{HubError, Result};
use crate::event::{SensorId, SensorType};
use crate::fusion::{fusion_for, upstreams_for, Fusion};
use crate::node::{NodeKind, PhysicalNode, SensorInfo, SensorNode, VirtualSensor};
use crate::permission::Permission;
use crate::queue::DispatchQueue;

struct VirtualSpec {
    sensor_type: SensorType,
    upstreams: Vec<SensorType>,
    fusion: Box<dyn Fusion>,
}

/// Builder for [`SensorRegistry`]
pub struct RegistryBuilder {
    queue: Arc<DispatchQueue>,
    devices: DeviceConfigTable,
    default_interval_ms: u32,
    adapters: Vec<Arc<dyn DeviceAdapter>>,
    virtuals: Vec<VirtualSpec>,
}

impl RegistryBuilder {
    pub fn new(queue: Arc<DispatchQueue>) -> Self {
        Self {
            queue,
            devices: DeviceConfigTable::default(),
            default_interval_ms: 100,
            adapters: Vec::new(),
            virtuals: Vec::new(),
        }
    }

    /// Static per-device configuration
    pub fn devices(mut self, devices: DeviceConfigTable) -> Self {
        self.devices = devices;
        self
    }

    /// Interval used when neither clients nor the device table set one
    pub fn default_interval_ms(mut self, interval_ms: u32) -> Self {
        self.default_interval_ms = interval_ms;
        self
    }

    /// Add one hardware sensor
    pub fn physical(mut self, adapter: Arc<dyn DeviceAdapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    /// Add a built-in virtual sensor
    pub fn virtual_sensor(mut self, sensor_type: SensorType) -> Self {
        match fusion_for(sensor_type) {
            Some(fusion) => self.virtuals.push(VirtualSpec {
                sensor_type,
                upstreams: upstreams_for(sensor_type).to_vec(),
                fusion,
            }),
            None => log::warn!("{} has no built-in fusion, ignored", sensor_type),
        }
        self
    }

    /// Add every built-in virtual sensor
    pub fn all_virtual_sensors(self) -> Self {
        SensorType::ALL
            .iter()
            .filter(|t| t.is_virtual())
            .fold(self, |builder, t| builder.virtual_sensor(*t))
    }

    /// Add a virtual sensor with a custom fusion
    pub fn custom_virtual(
        mut self,
        sensor_type: SensorType,
        upstreams: Vec<SensorType>,
        fusion: Box<dyn Fusion>,
    ) -> Self {
        self.virtuals.push(VirtualSpec {
            sensor_type,
            upstreams,
            fusion,
        });
        self
    }

    /// Build the graph
    pub fn build(mut self) -> Result<SensorRegistry> {
        let mut registry = SensorRegistry {
            nodes: Vec::new(),
            by_type: HashMap::new(),
            consumers: HashMap::new(),
            queue: self.queue.clone(),
        };

        for adapter in &self.adapters {
            let properties = adapter.properties();
            let sensor_type = properties.sensor_type;
            if sensor_type.is_virtual() {
                log::warn!("adapter reports virtual type {}, ignored", sensor_type);
                continue;
            }
            let (info, conversion) =
                self.physical_info(registry.next_id(), properties, adapter.conversion());
            let kind = NodeKind::Physical(PhysicalNode::new(adapter.clone(), conversion));
            registry.insert(info, kind, Vec::new());
        }

        let mut pending = std::mem::take(&mut self.virtuals);
        loop {
            let before = pending.len();
            let mut waiting = Vec::new();
            for spec in pending {
                if registry.by_type.contains_key(&spec.sensor_type) {
                    log::warn!("duplicate virtual {} ignored", spec.sensor_type);
                    continue;
                }
                let upstreams: Option<Vec<Arc<SensorNode>>> =
                    spec.upstreams.iter().map(|t| registry.by_type(*t)).collect();
                match upstreams {
                    Some(upstreams) if !upstreams.is_empty() => {
                        let info =
                            self.virtual_info(registry.next_id(), spec.sensor_type, &upstreams);
                        let kind =
                            NodeKind::Virtual(VirtualSensor::new(upstreams.clone(), spec.fusion));
                        registry.insert(info, kind, upstreams);
                    }
                    _ => waiting.push(spec),
                }
            }
            pending = waiting;
            if pending.is_empty() || pending.len() == before {
                break;
            }
        }
        for spec in &pending {
            log::warn!(
                "virtual {} skipped: missing upstream among {:?}",
                spec.sensor_type,
                spec.upstreams
            );
        }

        if registry.nodes.is_empty() {
            return Err(HubError::NoSensors);
        }
        log::info!("sensor registry built with {} nodes", registry.nodes.len());
        Ok(registry)
    }

    fn physical_info(
        &self,
        id: SensorId,
        mut properties: SensorProperties,
        mut conversion: Conversion,
    ) -> (SensorInfo, Conversion) {
        let sensor_type = properties.sensor_type;
        let entry = self.devices.get(sensor_type);

        if let Some(entry) = entry {
            if let Some(vendor) = &entry.vendor {
                properties.vendor = vendor.clone();
            }
            if let Some(model) = &entry.model {
                properties.name = model.clone();
            }
            if let Some(rotation) = entry.axis_rotation {
                conversion = conversion.with_rotation(rotation);
            }
            if let Some(map) = &entry.proximity_map {
                conversion = Conversion::Proximity(map.clone());
            }
        }

        let info = SensorInfo {
            id,
            sensor_type,
            required_permission: entry
                .and_then(|e| e.required_permission)
                .unwrap_or(Permission::STANDARD),
            default_interval_ms: entry
                .and_then(|e| e.default_interval_ms)
                .unwrap_or(self.default_interval_ms),
            properties,
        };
        (info, conversion)
    }

    fn virtual_info(
        &self,
        id: SensorId,
        sensor_type: SensorType,
        upstreams: &[Arc<SensorNode>],
    ) -> SensorInfo {
        let mut properties = SensorProperties::new(sensor_type, format!("virtual-{}", sensor_type))
            .with_vendor("sensorhub");
        properties.min_interval_ms = upstreams
            .iter()
            .map(|u| u.info().properties.min_interval_ms)
            .max()
            .unwrap_or(properties.min_interval_ms);

        let entry = self.devices.get(sensor_type);
        // A virtual sensor needs at least what its upstreams need
        let inherited = upstreams
            .iter()
            .fold(Permission::STANDARD, |acc, u| acc | u.info().required_permission);

        SensorInfo {
            id,
            sensor_type,
            required_permission: entry.and_then(|e| e.required_permission).unwrap_or(inherited),
            default_interval_ms: entry
                .and_then(|e| e.default_interval_ms)
                .unwrap_or(self.default_interval_ms),
            properties,
        }
    }
}

/// The sensor graph
pub struct SensorRegistry {
    nodes: Vec<Arc<SensorNode>>,
    by_type: HashMap<SensorType, Vec<SensorId>>,
    consumers: HashMap<SensorId, Vec<Arc<SensorNode>>>,
    queue: Arc<DispatchQueue>,
}

impl SensorRegistry {
    pub fn builder(queue: Arc<DispatchQueue>) -> RegistryBuilder {
        RegistryBuilder::new(queue)
    }

    fn next_id(&self) -> SensorId {
        self.nodes.len() as SensorId + 1
    }

    fn insert(&mut self, info: SensorInfo, kind: NodeKind, upstreams: Vec<Arc<SensorNode>>) {
        let id = info.id;
        let sensor_type = info.sensor_type;
        let node = Arc::new(SensorNode::new(info, kind, self.queue.clone()));
        for upstream in upstreams {
            self.consumers.entry(upstream.id()).or_default().push(node.clone());
        }
        log::debug!("registered sensor {} as {}", sensor_type, id);
        self.by_type.entry(sensor_type).or_default().push(id);
        self.nodes.push(node);
    }

    /// Node by id
    pub fn get(&self, id: SensorId) -> Result<Arc<SensorNode>> {
        let index = (id as usize).checked_sub(1).ok_or(HubError::UnknownSensor(id))?;
        self.nodes
            .get(index)
            .cloned()
            .ok_or(HubError::UnknownSensor(id))
    }

    /// Primary node of a type
    pub fn by_type(&self, sensor_type: SensorType) -> Option<Arc<SensorNode>> {
        let id = *self.by_type.get(&sensor_type)?.first()?;
        self.get(id).ok()
    }

    /// Every node of a type, primary first
    pub fn all_of_type(&self, sensor_type: SensorType) -> Vec<Arc<SensorNode>> {
        self.by_type
            .get(&sensor_type)
            .map(|ids| ids.iter().filter_map(|id| self.get(*id).ok()).collect())
            .unwrap_or_default()
    }

    /// Every node, in id order
    pub fn nodes(&self) -> &[Arc<SensorNode>] {
        &self.nodes
    }

    /// Adapter-backed nodes
    pub fn physical_nodes(&self) -> impl Iterator<Item = &Arc<SensorNode>> {
        self.nodes.iter().filter(|n| !n.is_virtual())
    }

    /// Virtual nodes subscribed to `id`
    pub fn consumers_of(&self, id: SensorId) -> &[Arc<SensorNode>] {
        self.consumers.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn queue(&self) -> &Arc<DispatchQueue> {
        &self.queue
    }
}

impl std::fmt::Debug for SensorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.nodes.iter()).finish()
    }
}
