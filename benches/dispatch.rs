//! Benchmarks for the dispatch path

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use sensorhub::{
    DispatchQueue, Event, EventType, HubConfig, MemoryAdapter, MemorySink, QueueConfig,
    QueueOrdering, SensorHub, SensorType,
};
use std::sync::Arc;

fn generate_events(count: usize, sensor_id: u32) -> Vec<Event> {
    (0..count)
        .map(|i| {
            Event::new(
                EventType::raw(SensorType::Accelerometer),
                sensor_id,
                i as u64 * 1_000,
                vec![0.1 * (i % 10) as f32, 0.0, 9.81],
            )
        })
        .collect()
}

fn bench_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue");
    let events = generate_events(1000, 1);
    group.throughput(Throughput::Elements(1000));

    for ordering in [QueueOrdering::Fifo, QueueOrdering::Sequenced] {
        group.bench_with_input(
            BenchmarkId::new("push_pop_1000", format!("{:?}", ordering)),
            &ordering,
            |b, &ordering| {
                let queue = DispatchQueue::new(QueueConfig::with_capacity(1000).ordering(ordering));
                b.iter(|| {
                    for e in &events {
                        queue.push(e.clone());
                    }
                    while let Some(e) = queue.try_pop() {
                        black_box(e);
                    }
                })
            },
        );
    }

    group.finish();
}

fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out");

    for clients in [1u32, 8, 64] {
        let hub = SensorHub::builder(HubConfig::with_queue_capacity(1000))
            .adapter(Arc::new(MemoryAdapter::new(SensorType::Accelerometer)))
            .virtual_sensors(Vec::new())
            .build()
            .unwrap();
        let accel = hub.registry().by_type(SensorType::Accelerometer).unwrap().id();
        let sinks: Vec<_> = (0..clients)
            .map(|i| {
                let sink = Arc::new(MemorySink::new());
                let id = hub.connect(i, 1000, sink.clone());
                hub.register_event(id, accel, EventType::raw(SensorType::Accelerometer))
                    .unwrap();
                hub.start_sensor(id, accel).unwrap();
                sink
            })
            .collect();
        let events = generate_events(100, accel);

        group.throughput(Throughput::Elements(100 * clients as u64));
        group.bench_with_input(BenchmarkId::new("dispatch_100", clients), &clients, |b, _| {
            b.iter(|| {
                for e in &events {
                    black_box(hub.dispatcher().dispatch_one(e.clone()));
                }
                for sink in &sinks {
                    sink.drain();
                }
            })
        });
    }

    group.finish();
}

fn bench_composition(c: &mut Criterion) {
    let mut group = c.benchmark_group("composition");

    let hub = SensorHub::builder(HubConfig::with_queue_capacity(1000))
        .adapter(Arc::new(MemoryAdapter::new(SensorType::Accelerometer)))
        .adapter(Arc::new(MemoryAdapter::new(SensorType::Gyroscope)))
        .build()
        .unwrap();
    let accel = hub.registry().by_type(SensorType::Accelerometer).unwrap().id();
    let gyro = hub.registry().by_type(SensorType::Gyroscope).unwrap().id();
    let linear = hub.registry().by_type(SensorType::LinearAcceleration).unwrap().id();

    let sink = Arc::new(MemorySink::new());
    let client = hub.connect(1, 1000, sink.clone());
    hub.register_event(client, linear, EventType::raw(SensorType::LinearAcceleration))
        .unwrap();
    hub.start_sensor(client, linear).unwrap();

    let accel_events = generate_events(100, accel);
    let gyro_event = Event::new(EventType::raw(SensorType::Gyroscope), gyro, 0, vec![0.0; 3]);

    group.throughput(Throughput::Elements(100));
    group.bench_function("accel_to_linear_100", |b| {
        b.iter(|| {
            hub.queue().push(gyro_event.clone());
            for e in &accel_events {
                hub.queue().push(e.clone());
            }
            black_box(hub.dispatcher().drain());
            sink.drain();
        })
    });

    group.finish();
}

criterion_group!(benches, bench_queue, bench_fan_out, bench_composition);
criterion_main!(benches);
