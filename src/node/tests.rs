use super::*;

use crate::adapter::{Conversion, DeviceAdapter, MemoryAdapter, ProximityMap};
use crate::event::{Accuracy, EventKind, EventType, RawSample};
use crate::fusion::fusion_for;

fn info(id: SensorId, sensor_type: SensorType) -> SensorInfo {
    SensorInfo {
        id,
        sensor_type,
        required_permission: Permission::STANDARD,
        default_interval_ms: 200,
        properties: SensorProperties::new(sensor_type, "test"),
    }
}

fn physical(
    id: SensorId,
    adapter: &Arc<MemoryAdapter>,
    queue: &Arc<DispatchQueue>,
) -> Arc<SensorNode> {
    let sensor_type = adapter.properties().sensor_type;
    let kind = NodeKind::Physical(PhysicalNode::new(adapter.clone(), adapter.conversion()));
    Arc::new(SensorNode::new(info(id, sensor_type), kind, queue.clone()))
}

fn virtual_node(
    id: SensorId,
    sensor_type: SensorType,
    upstreams: Vec<Arc<SensorNode>>,
    queue: &Arc<DispatchQueue>,
) -> Arc<SensorNode> {
    let fusion = fusion_for(sensor_type).unwrap();
    let kind = NodeKind::Virtual(VirtualSensor::new(upstreams, fusion));
    Arc::new(SensorNode::new(info(id, sensor_type), kind, queue.clone()))
}

#[test]
fn test_start_twice_enables_once() {
    let queue = Arc::new(DispatchQueue::default());
    let adapter = Arc::new(MemoryAdapter::new(SensorType::Accelerometer));
    let node = physical(1, &adapter, &queue);

    assert!(node.start(Requester::Client(1)).unwrap());
    assert!(!node.start(Requester::Client(1)).unwrap());
    assert!(node.start(Requester::Client(2)).unwrap());
    assert_eq!(adapter.enable_calls(), 1);
    assert_eq!(node.active_count(), 2);

    assert!(node.stop(Requester::Client(1)).unwrap());
    assert!(!node.stop(Requester::Client(1)).unwrap());
    assert_eq!(adapter.disable_calls(), 0);
    assert!(node.stop(Requester::Client(2)).unwrap());
    assert_eq!(adapter.disable_calls(), 1);
    assert!(!node.is_active());
}

#[test]
fn test_start_failure_rolls_back() {
    let queue = Arc::new(DispatchQueue::default());
    let adapter = Arc::new(MemoryAdapter::new(SensorType::Gyroscope));
    adapter.set_fail_enable(true);
    let node = physical(1, &adapter, &queue);

    let err = node.start(Requester::Client(7)).unwrap_err();
    assert!(matches!(err, HubError::Adapter { sensor_id: 1, .. }));
    assert!(!node.is_active());
    assert!(!node.is_started_by(Requester::Client(7)));

    adapter.set_fail_enable(false);
    assert!(node.start(Requester::Client(7)).unwrap());
}

#[test]
fn test_effective_interval_applied_on_start() {
    let queue = Arc::new(DispatchQueue::default());
    let adapter = Arc::new(MemoryAdapter::new(SensorType::Light));
    let node = physical(1, &adapter, &queue);

    // Default interval when nobody constrains the rate
    node.start(Requester::Client(1)).unwrap();
    assert_eq!(adapter.interval_ms(), Some(200));

    node.add_interval(Requester::Client(1), 50).unwrap();
    node.add_interval(Requester::Client(2), 80).unwrap();
    assert_eq!(adapter.interval_ms(), Some(50));
    node.delete_interval(Requester::Client(1)).unwrap();
    assert_eq!(adapter.interval_ms(), Some(80));

    // Clamped to the fastest interval the hardware supports
    node.add_interval(Requester::Client(3), 1).unwrap();
    assert_eq!(adapter.interval_ms(), Some(10));
}

#[test]
fn test_batch_takes_max() {
    let queue = Arc::new(DispatchQueue::default());
    let adapter = Arc::new(MemoryAdapter::new(SensorType::Pressure));
    let node = physical(1, &adapter, &queue);

    node.add_batch(Requester::Client(1), 100).unwrap();
    node.add_batch(Requester::Client(2), 500).unwrap();
    assert_eq!(adapter.batch_latency_ms(), None);

    node.start(Requester::Client(1)).unwrap();
    assert_eq!(adapter.batch_latency_ms(), Some(500));
    node.delete_batch(Requester::Client(2)).unwrap();
    assert_eq!(adapter.batch_latency_ms(), Some(100));
}

#[test]
fn test_zero_interval_rejected() {
    let queue = Arc::new(DispatchQueue::default());
    let adapter = Arc::new(MemoryAdapter::new(SensorType::Light));
    let node = physical(1, &adapter, &queue);
    assert!(node.add_interval(Requester::Client(1), 0).is_err());
    assert_eq!(node.min_interval(), None);
}

#[test]
fn test_detach_releases_everything() {
    let queue = Arc::new(DispatchQueue::default());
    let adapter = Arc::new(MemoryAdapter::new(SensorType::Accelerometer));
    let node = physical(1, &adapter, &queue);

    node.add_interval(Requester::Client(1), 20).unwrap();
    node.add_batch(Requester::Client(1), 100).unwrap();
    node.start(Requester::Client(1)).unwrap();
    node.detach(Requester::Client(1)).unwrap();

    assert!(!node.is_active());
    assert_eq!(node.min_interval(), None);
    assert_eq!(node.max_batch(), None);
    assert!(!adapter.is_enabled());
}

#[test]
fn test_poll_stamps_and_pushes() {
    let queue = Arc::new(DispatchQueue::default());
    let adapter = Arc::new(MemoryAdapter::new(SensorType::Accelerometer));
    let node = physical(4, &adapter, &queue);
    node.start(Requester::Client(1)).unwrap();

    adapter.push_sample(RawSample::at(5_000, vec![0.0, 0.0, 9.8]));
    adapter.push_sample(RawSample::at(4_000, vec![0.0, 0.1, 9.8]));
    assert!(node.poll_once(Duration::from_millis(10)).unwrap());
    assert!(node.poll_once(Duration::from_millis(10)).unwrap());
    assert!(!node.poll_once(Duration::from_millis(1)).unwrap());

    let first = queue.try_pop().unwrap();
    let second = queue.try_pop().unwrap();
    assert_eq!(first.sensor_id, 4);
    assert_eq!(first.event_type, EventType::raw(SensorType::Accelerometer));
    assert_eq!(first.timestamp_us, 5_000);
    // The device clock went backwards, the event clock does not
    assert_eq!(second.timestamp_us, 5_000);
}

#[test]
fn test_read_failure_reported() {
    let queue = Arc::new(DispatchQueue::default());
    let adapter = Arc::new(MemoryAdapter::new(SensorType::Light));
    let node = physical(2, &adapter, &queue);
    node.start(Requester::Client(1)).unwrap();
    adapter.push_sample(RawSample::new(vec![10.0]));
    adapter.set_fail_read(true);

    assert!(node.poll_once(Duration::from_millis(10)).is_err());
    assert!(queue.is_empty());
    assert!(node.is_active());
}

#[test]
fn test_proximity_change_on_flip() {
    let queue = Arc::new(DispatchQueue::default());
    let adapter = Arc::new(
        MemoryAdapter::new(SensorType::Proximity)
            .with_conversion(Conversion::Proximity(ProximityMap::iio())),
    );
    let node = physical(3, &adapter, &queue);
    node.start(Requester::Client(1)).unwrap();

    for raw in [1.0, 1.0, 0.0] {
        adapter.push_sample(RawSample::new(vec![raw]));
        node.poll_once(Duration::from_millis(10)).unwrap();
    }

    let change = EventType::new(SensorType::Proximity, EventKind::Change);
    let mut events = Vec::new();
    while let Some(e) = queue.try_pop() {
        events.push(e);
    }
    let changes: Vec<_> = events.iter().filter(|e| e.event_type == change).collect();
    assert_eq!(events.len(), 5);
    assert_eq!(changes.len(), 2);
    assert_eq!(changes[0].values, vec![0.0]);
    assert_eq!(changes[1].values, vec![5.0]);
}

#[test]
fn test_magnetometer_calibration_needed_once() {
    let queue = Arc::new(DispatchQueue::default());
    let adapter = Arc::new(MemoryAdapter::new(SensorType::Magnetometer));
    let node = physical(3, &adapter, &queue);
    node.start(Requester::Client(1)).unwrap();

    for accuracy in [Accuracy::Good, Accuracy::Bad, Accuracy::Bad] {
        let mut sample = RawSample::new(vec![0.0, 20.0, -40.0]);
        sample.accuracy = accuracy;
        adapter.push_sample(sample);
        node.poll_once(Duration::from_millis(10)).unwrap();
    }

    let calibration = EventType::new(SensorType::Magnetometer, EventKind::CalibrationNeeded);
    let mut count = 0;
    while let Some(e) = queue.try_pop() {
        if e.event_type == calibration {
            count += 1;
        }
    }
    assert_eq!(count, 1);
}

#[test]
fn test_virtual_waits_for_every_upstream() {
    let queue = Arc::new(DispatchQueue::default());
    let accel_hw = Arc::new(MemoryAdapter::new(SensorType::Accelerometer));
    let mag_hw = Arc::new(MemoryAdapter::new(SensorType::Magnetometer));
    let accel = physical(1, &accel_hw, &queue);
    let mag = physical(2, &mag_hw, &queue);
    let orientation = virtual_node(3, SensorType::Orientation, vec![accel, mag], &queue);
    orientation.start(Requester::Client(1)).unwrap();

    let a = Event::new(EventType::raw(SensorType::Accelerometer), 1, 100, vec![0.0, 0.0, 9.8]);
    let m = Event::new(EventType::raw(SensorType::Magnetometer), 2, 200, vec![0.0, 22.0, -40.0]);

    assert_eq!(orientation.synthesize(&a), 0);
    assert_eq!(orientation.synthesize(&a), 0);
    assert!(queue.is_empty());

    assert_eq!(orientation.synthesize(&m), 1);
    assert_eq!(orientation.synthesize(&a), 1);
    assert_eq!(queue.len(), 2);

    let out = queue.try_pop().unwrap();
    assert_eq!(out.sensor_id, 3);
    assert_eq!(out.timestamp_us, 200);
    // Output clock never goes back even if the trigger is older
    assert_eq!(queue.try_pop().unwrap().timestamp_us, 200);
}

#[test]
fn test_inactive_virtual_ignores_events() {
    let queue = Arc::new(DispatchQueue::default());
    let accel_hw = Arc::new(MemoryAdapter::new(SensorType::Accelerometer));
    let gyro_hw = Arc::new(MemoryAdapter::new(SensorType::Gyroscope));
    let accel = physical(1, &accel_hw, &queue);
    let gyro = physical(2, &gyro_hw, &queue);
    let gravity = virtual_node(3, SensorType::Gravity, vec![accel, gyro], &queue);

    let a = Event::new(EventType::raw(SensorType::Accelerometer), 1, 100, vec![0.0, 0.0, 9.8]);
    assert_eq!(gravity.synthesize(&a), 0);
}

#[test]
fn test_virtual_start_subscribes_upstreams() {
    let queue = Arc::new(DispatchQueue::default());
    let accel_hw = Arc::new(MemoryAdapter::new(SensorType::Accelerometer));
    let gyro_hw = Arc::new(MemoryAdapter::new(SensorType::Gyroscope));
    let accel = physical(1, &accel_hw, &queue);
    let gyro = physical(2, &gyro_hw, &queue);
    let gravity = virtual_node(3, SensorType::Gravity, vec![accel.clone(), gyro.clone()], &queue);

    gravity.add_interval(Requester::Client(9), 40).unwrap();
    gravity.start(Requester::Client(9)).unwrap();
    assert!(accel.is_started_by(Requester::Sensor(3)));
    assert!(gyro.is_started_by(Requester::Sensor(3)));
    assert_eq!(accel_hw.interval_ms(), Some(40));
    assert_eq!(gyro_hw.interval_ms(), Some(40));

    gravity.add_interval(Requester::Client(9), 25).unwrap();
    assert_eq!(gyro_hw.interval_ms(), Some(25));

    gravity.stop(Requester::Client(9)).unwrap();
    assert!(!accel.is_active());
    assert!(!gyro.is_active());
    assert_eq!(accel.min_interval(), None);
}

#[test]
fn test_virtual_start_rolls_back_on_upstream_failure() {
    let queue = Arc::new(DispatchQueue::default());
    let accel_hw = Arc::new(MemoryAdapter::new(SensorType::Accelerometer));
    let gyro_hw = Arc::new(MemoryAdapter::new(SensorType::Gyroscope));
    gyro_hw.set_fail_enable(true);
    let accel = physical(1, &accel_hw, &queue);
    let gyro = physical(2, &gyro_hw, &queue);
    let gravity = virtual_node(3, SensorType::Gravity, vec![accel.clone(), gyro.clone()], &queue);

    assert!(gravity.start(Requester::Client(1)).is_err());
    assert!(!gravity.is_active());
    assert!(!accel.is_active());
    assert!(!accel_hw.is_enabled());
    assert_eq!(accel.min_interval(), None);
    assert_eq!(gyro.min_interval(), None);
}

#[test]
fn test_shared_upstream_scenario() {
    // A reads the accelerometer at 100ms, B reads gravity at 20ms
    let queue = Arc::new(DispatchQueue::default());
    let accel_hw = Arc::new(MemoryAdapter::new(SensorType::Accelerometer));
    let gyro_hw = Arc::new(MemoryAdapter::new(SensorType::Gyroscope));
    let accel = physical(1, &accel_hw, &queue);
    let gyro = physical(2, &gyro_hw, &queue);
    let gravity = virtual_node(3, SensorType::Gravity, vec![accel.clone(), gyro], &queue);

    let a = Requester::Client(1);
    let b = Requester::Client(2);
    accel.add_interval(a, 100).unwrap();
    accel.start(a).unwrap();
    assert_eq!(accel_hw.interval_ms(), Some(100));

    gravity.add_interval(b, 20).unwrap();
    gravity.start(b).unwrap();
    assert_eq!(accel_hw.interval_ms(), Some(20));

    accel.detach(a).unwrap();
    assert_eq!(accel_hw.interval_ms(), Some(20));
    assert!(accel_hw.is_enabled());

    gravity.detach(b).unwrap();
    assert!(!accel_hw.is_enabled());
    assert_eq!(accel_hw.enable_calls(), 1);
    assert_eq!(accel_hw.disable_calls(), 1);
}
