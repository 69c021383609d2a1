//! End-to-end tests of the event pipeline
//!
//! Most tests drive the dispatcher by hand (`poll_once` + `drain`) so they
//! are deterministic; `test_threaded_*` run the real poller and dispatcher
//! threads.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sensorhub::*;

const POLL: Duration = Duration::from_millis(20);

struct Rig {
    hub: SensorHub,
    accel: Arc<MemoryAdapter>,
    gyro: Arc<MemoryAdapter>,
    light: Arc<MemoryAdapter>,
    proximity: Arc<MemoryAdapter>,
}

fn rig_with(config: HubConfig, permissions: StaticPermissions) -> Rig {
    let accel = Arc::new(MemoryAdapter::new(SensorType::Accelerometer));
    let gyro = Arc::new(MemoryAdapter::new(SensorType::Gyroscope));
    let light = Arc::new(MemoryAdapter::new(SensorType::Light));
    let proximity = Arc::new(
        MemoryAdapter::new(SensorType::Proximity)
            .with_conversion(Conversion::Proximity(ProximityMap::iio())),
    );
    let devices = DeviceConfigTable::new().with_entry(DeviceEntry {
        required_permission: Some(Permission::BIO),
        ..DeviceEntry::new(SensorType::Proximity)
    });

    let hub = SensorHub::builder(config)
        .devices(devices)
        .permissions(Arc::new(permissions))
        .adapter(accel.clone())
        .adapter(gyro.clone())
        .adapter(light.clone())
        .adapter(proximity.clone())
        .build()
        .unwrap();
    Rig {
        hub,
        accel,
        gyro,
        light,
        proximity,
    }
}

fn rig() -> Rig {
    rig_with(HubConfig::default(), StaticPermissions::default())
}

fn id_of(hub: &SensorHub, sensor_type: SensorType) -> SensorId {
    hub.registry().by_type(sensor_type).unwrap().id()
}

fn poll(hub: &SensorHub, sensor_type: SensorType) {
    let node = hub.registry().by_type(sensor_type).unwrap();
    assert!(node.poll_once(POLL).unwrap(), "no sample ready for {}", sensor_type);
}

fn subscribe(
    hub: &SensorHub,
    sink: &Arc<MemorySink>,
    sensor_type: SensorType,
) -> (ClientId, SensorId) {
    let client = hub.connect(100, 1000, sink.clone());
    let sensor = id_of(hub, sensor_type);
    hub.register_event(client, sensor, EventType::raw(sensor_type)).unwrap();
    hub.start_sensor(client, sensor).unwrap();
    (client, sensor)
}

#[test]
fn test_shared_accelerometer_scenario() {
    let rig = rig();
    let hub = &rig.hub;
    let accel = id_of(hub, SensorType::Accelerometer);
    let gravity = id_of(hub, SensorType::Gravity);

    let a = hub.connect(1, 1000, Arc::new(MemorySink::new()));
    hub.register_event(a, accel, EventType::raw(SensorType::Accelerometer)).unwrap();
    hub.set_interval(a, accel, 100).unwrap();
    hub.start_sensor(a, accel).unwrap();
    assert_eq!(rig.accel.interval_ms(), Some(100));

    let b = hub.connect(2, 1000, Arc::new(MemorySink::new()));
    hub.register_event(b, gravity, EventType::raw(SensorType::Gravity)).unwrap();
    hub.set_interval(b, gravity, 20).unwrap();
    hub.start_sensor(b, gravity).unwrap();
    assert_eq!(rig.accel.interval_ms(), Some(20));
    assert_eq!(rig.gyro.interval_ms(), Some(20));

    hub.disconnect(a).unwrap();
    assert_eq!(rig.accel.interval_ms(), Some(20));
    assert!(rig.accel.is_enabled());

    hub.disconnect(b).unwrap();
    assert!(!rig.accel.is_enabled());
    assert!(!rig.gyro.is_enabled());
    assert_eq!(rig.accel.enable_calls(), 1);
    assert_eq!(rig.accel.disable_calls(), 1);
}

#[test]
fn test_interval_tracks_started_clients_only() {
    let rig = rig();
    let hub = &rig.hub;
    let light = id_of(hub, SensorType::Light);

    let a = hub.connect(1, 1000, Arc::new(MemorySink::new()));
    let b = hub.connect(2, 1000, Arc::new(MemorySink::new()));
    hub.set_interval(a, light, 500).unwrap();
    hub.set_interval(b, light, 50).unwrap();
    hub.start_sensor(a, light).unwrap();
    assert_eq!(rig.light.interval_ms(), Some(500));

    hub.start_sensor(b, light).unwrap();
    assert_eq!(rig.light.interval_ms(), Some(50));

    hub.stop_sensor(b, light).unwrap();
    assert_eq!(rig.light.interval_ms(), Some(500));

    // The stored request comes back on the next start
    hub.start_sensor(b, light).unwrap();
    assert_eq!(rig.light.interval_ms(), Some(50));
}

#[test]
fn test_random_interval_sequences() {
    let rig = rig();
    let hub = &rig.hub;
    let light = id_of(hub, SensorType::Light);
    let node = hub.registry().get(light).unwrap();
    let mut rng = StdRng::seed_from_u64(7);

    let clients: Vec<_> = (0..6)
        .map(|i| hub.connect(i, 1000, Arc::new(MemorySink::new())))
        .collect();
    let mut requested: Vec<Option<u32>> = vec![None; clients.len()];
    let mut started = vec![false; clients.len()];

    for _ in 0..500 {
        let i = rng.gen_range(0..clients.len());
        match rng.gen_range(0..3) {
            0 => {
                let interval = rng.gen_range(10..1000);
                hub.set_interval(clients[i], light, interval).unwrap();
                requested[i] = Some(interval);
            }
            1 if !started[i] => {
                hub.start_sensor(clients[i], light).unwrap();
                started[i] = true;
            }
            _ if started[i] => {
                hub.stop_sensor(clients[i], light).unwrap();
                started[i] = false;
            }
            _ => {}
        }

        let expected = requested
            .iter()
            .zip(&started)
            .filter(|(_, s)| **s)
            .filter_map(|(r, _)| *r)
            .min();
        assert_eq!(node.min_interval(), expected);
        assert_eq!(rig.light.is_enabled(), started.iter().any(|s| *s));
        if let Some(expected) = expected {
            assert_eq!(rig.light.interval_ms(), Some(expected));
        }
    }
}

#[test]
fn test_events_reach_registered_clients_only() {
    let rig = rig();
    let hub = &rig.hub;
    let sink_a = Arc::new(MemorySink::new());
    let sink_b = Arc::new(MemorySink::new());
    let (_, light) = subscribe(hub, &sink_a, SensorType::Light);

    // B starts the sensor but never registers the event type
    let b = hub.connect(2, 1000, sink_b.clone());
    hub.start_sensor(b, light).unwrap();

    rig.light.push_sample(RawSample::at(1_000, vec![250.0]));
    poll(hub, SensorType::Light);
    hub.dispatcher().drain();

    assert_eq!(sink_a.len(), 1);
    assert!(sink_b.is_empty());
}

#[test]
fn test_virtual_needs_both_upstreams() {
    let rig = rig();
    let hub = &rig.hub;
    let sink = Arc::new(MemorySink::new());
    subscribe(hub, &sink, SensorType::Gravity);

    for ts in [1_000, 2_000, 3_000] {
        rig.accel.push_sample(RawSample::at(ts, vec![0.0, 0.0, 9.7]));
        poll(hub, SensorType::Accelerometer);
    }
    hub.dispatcher().drain();
    assert!(sink.is_empty());

    rig.gyro.push_sample(RawSample::at(3_500, vec![0.0, 0.0, 0.0]));
    poll(hub, SensorType::Gyroscope);
    hub.dispatcher().drain();
    assert_eq!(sink.len(), 1);

    // From now on one output per upstream sample
    rig.accel.push_sample(RawSample::at(4_000, vec![0.0, 0.0, 9.8]));
    poll(hub, SensorType::Accelerometer);
    rig.gyro.push_sample(RawSample::at(4_500, vec![0.0, 0.0, 0.0]));
    poll(hub, SensorType::Gyroscope);
    hub.dispatcher().drain();

    let events = sink.drain();
    assert_eq!(events.len(), 3);
    assert_eq!(
        events.iter().map(|e| e.timestamp_us).collect::<Vec<_>>(),
        vec![3_500, 4_000, 4_500]
    );
    for event in &events {
        assert_eq!(event.data_length(), 3);
        let norm = event.values.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - STANDARD_GRAVITY).abs() < 1e-3);
    }
}

#[test]
fn test_late_registrant_gets_cached_event_once() {
    let rig = rig();
    let hub = &rig.hub;
    let early = Arc::new(MemorySink::new());
    subscribe(hub, &early, SensorType::Light);

    rig.light.push_sample(RawSample::at(5_000, vec![42.0]));
    poll(hub, SensorType::Light);
    hub.dispatcher().drain();
    let enable_calls = rig.light.enable_calls();

    let late = Arc::new(MemorySink::new());
    subscribe(hub, &late, SensorType::Light);
    let replayed = late.drain();
    assert_eq!(replayed.len(), 1);
    assert_eq!(replayed[0].values, vec![42.0]);
    assert_eq!(replayed[0].timestamp_us, 5_000);

    // Replay came from the cache, not from the hardware
    assert_eq!(rig.light.enable_calls(), enable_calls);
    assert_eq!(rig.light.pending(), 0);
    assert!(hub.queue().is_empty());
    assert_eq!(early.len(), 1);
    assert_eq!(hub.metrics().replays, 1);
}

#[test]
fn test_restart_replays_again_but_repeat_start_does_not() {
    let rig = rig();
    let hub = &rig.hub;
    let sink = Arc::new(MemorySink::new());
    let (client, light) = subscribe(hub, &sink, SensorType::Light);

    rig.light.push_sample(RawSample::new(vec![7.0]));
    poll(hub, SensorType::Light);
    hub.dispatcher().drain();
    sink.drain();

    hub.start_sensor(client, light).unwrap();
    assert!(sink.is_empty());

    hub.stop_sensor(client, light).unwrap();
    hub.start_sensor(client, light).unwrap();
    assert_eq!(sink.drain().len(), 1);
}

#[test]
fn test_disconnect_stops_delivery_of_queued_events() {
    let rig = rig();
    let hub = &rig.hub;
    let sink = Arc::new(MemorySink::new());
    let (client, _) = subscribe(hub, &sink, SensorType::Light);

    rig.light.push_sample(RawSample::new(vec![1.0]));
    poll(hub, SensorType::Light);
    assert_eq!(hub.queue().len(), 1);

    hub.disconnect(client).unwrap();
    hub.dispatcher().drain();
    assert!(sink.is_empty());
    assert!(!rig.light.is_enabled());
    assert_eq!(hub.disconnect(client), Err(HubError::UnknownClient(client)));
}

#[test]
fn test_queue_overflow_drops_newest() {
    let rig = rig_with(HubConfig::with_queue_capacity(1000), StaticPermissions::default());
    let queue = rig.hub.queue();

    for i in 0..1001u64 {
        let event = Event::new(EventType::raw(SensorType::Light), 3, i, vec![i as f32]);
        let accepted = queue.push(event);
        assert_eq!(accepted, i < 1000);
    }
    assert_eq!(queue.len(), 1000);
    assert_eq!(queue.dropped(), 1);

    for i in 0..1000u64 {
        assert_eq!(queue.try_pop().unwrap().timestamp_us, i);
    }
    assert!(queue.try_pop().is_none());
}

#[test]
fn test_permission_denied() {
    let rig = rig();
    let hub = &rig.hub;
    let proximity = id_of(hub, SensorType::Proximity);
    let client = hub.connect(1, 1000, Arc::new(MemorySink::new()));

    let change = EventType::new(SensorType::Proximity, EventKind::Change);
    assert!(matches!(
        hub.register_event(client, proximity, change),
        Err(HubError::PermissionDenied { .. })
    ));
    assert!(matches!(
        hub.start_sensor(client, proximity),
        Err(HubError::PermissionDenied { .. })
    ));
    assert!(hub.get_properties(client, proximity).is_err());
    assert!(!rig.proximity.is_enabled());

    let visible: Vec<_> = hub.list_sensors(client).unwrap().iter().map(|s| s.sensor_type).collect();
    assert!(!visible.contains(&SensorType::Proximity));
    assert!(visible.contains(&SensorType::Light));
}

#[test]
fn test_privileged_client_sees_proximity_changes() {
    let permissions = StaticPermissions::default().with_uid(0, Permission::all());
    let rig = rig_with(HubConfig::default(), permissions);
    let hub = &rig.hub;
    let proximity = id_of(hub, SensorType::Proximity);
    let sink = Arc::new(MemorySink::new());
    let client = hub.connect(1, 0, sink.clone());

    let change = EventType::new(SensorType::Proximity, EventKind::Change);
    hub.register_event(client, proximity, change).unwrap();
    hub.start_sensor(client, proximity).unwrap();

    for raw in [0.0, 0.0, 1.0, 1.0, 0.0] {
        rig.proximity.push_sample(RawSample::new(vec![raw]));
        poll(hub, SensorType::Proximity);
    }
    hub.dispatcher().drain();

    let states: Vec<f32> = sink.drain().iter().map(|e| e.values[0]).collect();
    assert_eq!(
        states,
        vec![
            ProximityState::Far.value(),
            ProximityState::Near.value(),
            ProximityState::Far.value()
        ]
    );
}

#[test]
fn test_registration_errors() {
    let rig = rig();
    let hub = &rig.hub;
    let light = id_of(hub, SensorType::Light);
    let client = hub.connect(1, 1000, Arc::new(MemorySink::new()));
    let raw = EventType::raw(SensorType::Light);

    hub.register_event(client, light, raw).unwrap();
    assert!(matches!(
        hub.register_event(client, light, raw),
        Err(HubError::DuplicateRegistration { .. })
    ));
    assert!(matches!(
        hub.register_event(client, light, EventType::raw(SensorType::Pressure)),
        Err(HubError::EventTypeMismatch { .. })
    ));
    hub.unregister_event(client, light, raw).unwrap();
    assert!(matches!(
        hub.unregister_event(client, light, raw),
        Err(HubError::NotRegistered { .. })
    ));
    assert_eq!(hub.start_sensor(client, 999), Err(HubError::UnknownSensor(999)));
    assert_eq!(hub.start_sensor(777, light), Err(HubError::UnknownClient(777)));
    assert_eq!(hub.stop_sensor(client, light), Err(HubError::NotStarted(light)));
    assert!(hub.set_interval(client, light, 0).is_err());
}

#[test]
fn test_start_failure_leaves_no_state() {
    let rig = rig();
    let hub = &rig.hub;
    let gyro = id_of(hub, SensorType::Gyroscope);
    let gravity = id_of(hub, SensorType::Gravity);
    let client = hub.connect(1, 1000, Arc::new(MemorySink::new()));

    rig.gyro.set_fail_enable(true);
    hub.set_interval(client, gravity, 30).unwrap();
    assert!(matches!(
        hub.start_sensor(client, gravity),
        Err(HubError::Adapter { sensor_id, .. }) if sensor_id == gyro
    ));
    assert!(!rig.accel.is_enabled());
    let accel_node = hub.registry().by_type(SensorType::Accelerometer).unwrap();
    assert_eq!(accel_node.min_interval(), None);
    assert!(!hub.registry().get(gravity).unwrap().is_active());

    rig.gyro.set_fail_enable(false);
    hub.start_sensor(client, gravity).unwrap();
    assert_eq!(rig.accel.interval_ms(), Some(30));
}

#[test]
fn test_get_data() {
    let rig = rig();
    let hub = &rig.hub;
    let light = id_of(hub, SensorType::Light);
    let raw = EventType::raw(SensorType::Light);
    let client = hub.connect(1, 1000, Arc::new(MemorySink::new()));
    assert_eq!(hub.get_data(client, light, raw), Err(HubError::NotStarted(light)));

    hub.start_sensor(client, light).unwrap();
    // Nothing cached: read straight from the device
    rig.light.push_sample(RawSample::at(10, vec![3.0]));
    assert_eq!(hub.get_data(client, light, raw).unwrap().values, vec![3.0]);
    assert!(matches!(
        hub.get_data(client, light, raw),
        Err(HubError::Adapter { source: AdapterError::NoData, .. })
    ));

    rig.light.push_sample(RawSample::at(20, vec![4.0]));
    poll(hub, SensorType::Light);
    hub.dispatcher().drain();
    assert_eq!(hub.get_data(client, light, raw).unwrap().values, vec![4.0]);

    let change = EventType::new(SensorType::Proximity, EventKind::Change);
    assert!(matches!(
        hub.get_data(client, light, change),
        Err(HubError::EventTypeMismatch { .. })
    ));
}

#[test]
fn test_get_data_returns_last_proximity_change() {
    let permissions = StaticPermissions::default().with_uid(0, Permission::all());
    let rig = rig_with(HubConfig::default(), permissions);
    let hub = &rig.hub;
    let proximity = id_of(hub, SensorType::Proximity);
    let change = EventType::new(SensorType::Proximity, EventKind::Change);
    let client = hub.connect(1, 0, Arc::new(MemorySink::new()));
    hub.start_sensor(client, proximity).unwrap();

    // Change events are never read from the device directly
    assert!(matches!(
        hub.get_data(client, proximity, change),
        Err(HubError::Adapter { source: AdapterError::NoData, .. })
    ));

    for raw in [0.0, 1.0] {
        rig.proximity.push_sample(RawSample::new(vec![raw]));
        poll(hub, SensorType::Proximity);
    }
    hub.dispatcher().drain();

    let last = hub.get_data(client, proximity, change).unwrap();
    assert_eq!(last.event_type, change);
    assert_eq!(last.values, vec![ProximityState::Near.value()]);
}

#[test]
fn test_batch_negotiation() {
    let rig = rig();
    let hub = &rig.hub;
    let accel = id_of(hub, SensorType::Accelerometer);
    let a = hub.connect(1, 1000, Arc::new(MemorySink::new()));
    let b = hub.connect(2, 1000, Arc::new(MemorySink::new()));

    hub.set_batch(a, accel, 50, 200).unwrap();
    hub.set_batch(b, accel, 80, 1_000).unwrap();
    hub.start_sensor(a, accel).unwrap();
    hub.start_sensor(b, accel).unwrap();
    assert_eq!(rig.accel.interval_ms(), Some(50));
    assert_eq!(rig.accel.batch_latency_ms(), Some(1_000));

    hub.unset_batch(b, accel).unwrap();
    assert_eq!(rig.accel.batch_latency_ms(), Some(200));
    assert_eq!(rig.accel.interval_ms(), Some(50));

    assert!(matches!(
        hub.set_batch(a, accel, 0, 100),
        Err(HubError::InvalidConfig(_))
    ));
}

#[test]
fn test_set_batch_rolls_back_interval() {
    let rig = rig();
    let hub = &rig.hub;
    let accel = id_of(hub, SensorType::Accelerometer);
    let client = hub.connect(1, 1000, Arc::new(MemorySink::new()));
    hub.set_interval(client, accel, 100).unwrap();
    hub.start_sensor(client, accel).unwrap();
    assert_eq!(rig.accel.interval_ms(), Some(100));

    rig.accel.set_fail_batch(true);
    assert!(matches!(
        hub.set_batch(client, accel, 20, 500),
        Err(HubError::Adapter { .. })
    ));
    let node = hub.registry().get(accel).unwrap();
    assert_eq!(node.min_interval(), Some(100));
    assert_eq!(node.max_batch(), None);
    assert_eq!(rig.accel.interval_ms(), Some(100));
    let state = hub
        .clients()
        .with_client(client, |c| c.sensor(accel).cloned())
        .unwrap()
        .unwrap();
    assert_eq!(state.interval_ms, Some(100));
    assert_eq!(state.batch_ms, None);

    rig.accel.set_fail_batch(false);
    hub.set_batch(client, accel, 20, 500).unwrap();
    assert_eq!(rig.accel.interval_ms(), Some(20));
    assert_eq!(rig.accel.batch_latency_ms(), Some(500));
}

#[test]
fn test_display_off_respects_options() {
    let rig = rig();
    let hub = &rig.hub;
    let quiet = Arc::new(MemorySink::new());
    let always = Arc::new(MemorySink::new());
    subscribe(hub, &quiet, SensorType::Light);
    let (always_id, light) = subscribe(hub, &always, SensorType::Light);
    hub.set_option(always_id, light, SensorOption::ALWAYS_ON).unwrap();

    hub.set_display_state(false);
    rig.light.push_sample(RawSample::new(vec![1.0]));
    poll(hub, SensorType::Light);
    hub.dispatcher().drain();
    assert!(quiet.is_empty());
    assert_eq!(always.len(), 1);

    hub.set_display_state(true);
    rig.light.push_sample(RawSample::new(vec![2.0]));
    poll(hub, SensorType::Light);
    hub.dispatcher().drain();
    assert_eq!(quiet.len(), 1);
}

#[test]
fn test_health_reflects_drops() {
    let rig = rig_with(HubConfig::with_queue_capacity(4), StaticPermissions::default());
    let hub = &rig.hub;
    assert_eq!(hub.health(), HealthStatus::Healthy);

    for i in 0..10u64 {
        hub.queue().push(Event::new(EventType::raw(SensorType::Light), 3, i, vec![0.0]));
    }
    assert_eq!(hub.health(), HealthStatus::Unhealthy);
    assert!(hub.health_report().contains("dispatch_queue"));
}

#[test]
fn test_threaded_pipeline_delivers_in_order() {
    let rig = rig();
    let hub = &rig.hub;
    let sink = Arc::new(MemorySink::new());
    subscribe(hub, &sink, SensorType::Light);
    hub.start().unwrap();

    for i in 1..=50u64 {
        rig.light.push_sample(RawSample::at(i * 1_000, vec![i as f32]));
    }

    let deadline = Instant::now() + Duration::from_secs(5);
    while sink.len() < 50 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    hub.shutdown();

    let events = sink.drain();
    assert_eq!(events.len(), 50);
    assert!(events.windows(2).all(|w| w[0].timestamp_us <= w[1].timestamp_us));
    assert_eq!(events[49].values, vec![50.0]);
}

#[test]
fn test_threaded_poller_idles_until_started() {
    let rig = rig();
    let hub = &rig.hub;
    hub.start().unwrap();

    rig.light.push_sample(RawSample::new(vec![1.0]));
    std::thread::sleep(Duration::from_millis(50));
    // Nobody started the light sensor, so the sample is never read
    assert_eq!(rig.light.pending(), 1);

    let sink = Arc::new(MemorySink::new());
    subscribe(hub, &sink, SensorType::Light);
    let deadline = Instant::now() + Duration::from_secs(5);
    while sink.is_empty() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    hub.shutdown();
    assert_eq!(sink.len(), 1);
}

#[test]
fn test_start_racing_dispatch_delivers_event_once() {
    let rig = rig();
    let hub = &rig.hub;
    let light = id_of(hub, SensorType::Light);
    let raw = EventType::raw(SensorType::Light);

    for i in 1..=200u64 {
        let sink = Arc::new(MemorySink::new());
        let client = hub.connect(1, 1000, sink.clone());
        hub.register_event(client, light, raw).unwrap();

        let event = Event::new(raw, light, i * 1_000, vec![i as f32]);
        let barrier = std::sync::Barrier::new(2);
        std::thread::scope(|s| {
            s.spawn(|| {
                barrier.wait();
                hub.dispatcher().dispatch_one(event);
            });
            barrier.wait();
            hub.start_sensor(client, light).unwrap();
        });

        // Delivered either by fan-out or by the start replay, never both
        let copies = sink
            .drain()
            .iter()
            .filter(|e| e.timestamp_us == i * 1_000)
            .count();
        assert_eq!(copies, 1, "event {} delivered {} times", i, copies);
        hub.disconnect(client).unwrap();
    }
}

#[test]
fn test_redundant_hardware_has_own_ids() {
    let primary = Arc::new(MemoryAdapter::new(SensorType::Light));
    let backup = Arc::new(MemoryAdapter::new(SensorType::Light));
    let hub = SensorHub::builder(HubConfig::default())
        .adapter(primary.clone())
        .adapter(backup.clone())
        .build()
        .unwrap();

    let sink = Arc::new(MemorySink::new());
    let client = hub.connect(1, 1000, sink.clone());
    let ids: Vec<SensorId> = hub
        .list_sensors(client)
        .unwrap()
        .iter()
        .filter(|s| s.sensor_type == SensorType::Light)
        .map(|s| s.id)
        .collect();
    assert_eq!(ids.len(), 2);

    let raw = EventType::raw(SensorType::Light);
    hub.register_event(client, ids[1], raw).unwrap();
    hub.start_sensor(client, ids[1]).unwrap();
    assert!(backup.is_enabled());
    assert!(!primary.is_enabled());

    backup.push_sample(RawSample::at(10, vec![7.0]));
    assert!(hub.registry().get(ids[1]).unwrap().poll_once(POLL).unwrap());
    hub.dispatcher().drain();
    let events = sink.drain();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].sensor_id, ids[1]);
    assert_eq!(hub.get_data(client, ids[1], raw).unwrap().values, vec![7.0]);
}

#[test]
fn test_start_after_shutdown_is_rejected() {
    let rig = rig();
    let hub = &rig.hub;
    hub.start().unwrap();
    hub.shutdown();
    assert_eq!(hub.start(), Err(HubError::ShutDown));
    assert!(!hub.is_running());
}
