//! Stress tests for Sensorhub
//!
//! Run with: cargo test --release stress -- --ignored

use sensorhub::*;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn light(ts: u64) -> Event {
    Event::new(EventType::raw(SensorType::Light), 1, ts, vec![ts as f32])
}

#[test]
#[ignore] // Run manually with --ignored
fn stress_test_queue_throughput() {
    let queue = Arc::new(DispatchQueue::with_capacity(10_000));
    let producers = 4;
    let per_producer = 250_000u64;

    let start = Instant::now();
    let handles: Vec<_> = (0..producers)
        .map(|p| {
            let queue = queue.clone();
            thread::spawn(move || {
                for i in 0..per_producer {
                    while !queue.push(light(p * per_producer + i)) {
                        thread::yield_now();
                    }
                }
            })
        })
        .collect();

    let mut received = 0u64;
    while received < producers * per_producer {
        if queue.pop_timeout(Duration::from_millis(100)).is_some() {
            received += 1;
        }
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let elapsed = start.elapsed();
    let rate = received as f64 / elapsed.as_secs_f64();
    println!("Moved {} events in {:?}", received, elapsed);
    println!("Rate: {:.0} events/second", rate);

    assert!(
        rate > 200_000.0,
        "Should move at least 200k events/s, got {:.0}",
        rate
    );
}

#[test]
#[ignore]
fn stress_test_fan_out() {
    let adapter = Arc::new(MemoryAdapter::new(SensorType::Light));
    let hub = SensorHub::builder(HubConfig::with_queue_capacity(100_000))
        .adapter(adapter)
        .build()
        .unwrap();
    let light_id = hub.registry().by_type(SensorType::Light).unwrap().id();

    let clients = 64;
    let sinks: Vec<_> = (0..clients)
        .map(|i| {
            let sink = Arc::new(MemorySink::with_buffer_size(1_000_000));
            let id = hub.connect(i, 1000, sink.clone());
            hub.register_event(id, light_id, EventType::raw(SensorType::Light)).unwrap();
            hub.start_sensor(id, light_id).unwrap();
            sink
        })
        .collect();

    let events = 50_000u64;
    let start = Instant::now();
    for ts in 0..events {
        let mut event = light(ts);
        event.sensor_id = light_id;
        hub.queue().push(event);
        if hub.queue().len() > 50_000 {
            hub.dispatcher().drain();
        }
    }
    hub.dispatcher().drain();
    let elapsed = start.elapsed();

    let deliveries = events * clients as u64;
    let rate = deliveries as f64 / elapsed.as_secs_f64();
    println!("Delivered {} events to {} clients in {:?}", events, clients, elapsed);
    println!("Rate: {:.0} deliveries/second", rate);

    for sink in &sinks {
        assert_eq!(sink.len() as u64, events);
    }
    assert_eq!(hub.metrics().deliveries, deliveries);
}

#[test]
#[ignore]
fn stress_test_client_churn() {
    let accel = Arc::new(MemoryAdapter::new(SensorType::Accelerometer));
    let gyro = Arc::new(MemoryAdapter::new(SensorType::Gyroscope));
    let hub = Arc::new(
        SensorHub::builder(HubConfig::default())
            .adapter(accel.clone())
            .adapter(gyro.clone())
            .build()
            .unwrap(),
    );
    let targets: Vec<SensorId> = hub.registry().nodes().iter().map(|n| n.id()).collect();

    let start = Instant::now();
    let handles: Vec<_> = (0..8u32)
        .map(|t| {
            let hub = hub.clone();
            let targets = targets.clone();
            thread::spawn(move || {
                for i in 0..2_000u32 {
                    let client = hub.connect(t, 1000, Arc::new(MemorySink::new()));
                    let sensor = targets[(t + i) as usize % targets.len()];
                    hub.set_interval(client, sensor, 10 + (i % 200)).unwrap();
                    hub.start_sensor(client, sensor).unwrap();
                    if i % 3 == 0 {
                        hub.stop_sensor(client, sensor).unwrap();
                    }
                    hub.disconnect(client).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    println!("Client churn finished in {:?}", start.elapsed());

    // Everyone left, so nothing may remain enabled or requested
    assert!(hub.clients().is_empty());
    for node in hub.registry().nodes() {
        assert!(!node.is_active(), "{} still active", node.sensor_type());
        assert_eq!(node.min_interval(), None);
    }
    assert!(!accel.is_enabled());
    assert!(!gyro.is_enabled());
    assert_eq!(accel.enable_calls(), accel.disable_calls());
}
