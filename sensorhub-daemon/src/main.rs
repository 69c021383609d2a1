// Sensorhub Daemon - Sensor hub daemon
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # sensorhubd
//!
//! Brokers sensor devices to clients over a Unix socket and exports
//! Prometheus metrics over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! # Simulated handset sensors
//! sensorhubd --simulate
//!
//! # Replay a recording at 10x, simulated devices for everything else
//! sensorhubd --simulate --csv capture.csv --speed 10.0
//!
//! # Device table, custom socket and exporter port
//! sensorhubd --profile sim.json --config devices.json --socket /run/sensorhub.sock --port 9090
//! ```

mod error;
mod http;
mod metrics;
mod protocol;
mod replay;
mod worker;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use sensorhub::{
    DeviceAdapter, DeviceConfigTable, HubConfig, Permission, QueueConfig, SensorHub, SensorType,
    StaticPermissions,
};
use sensorhub_sim::SimProfile;
use tokio::net::TcpListener;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use crate::error::Result;
use crate::http::AppState;
use crate::metrics::HubMetrics;
use crate::replay::{DatasetInfo, ReplayConfig, ReplayDataset};

/// Sensor hub daemon
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Client socket path
    #[arg(long, default_value = "/tmp/sensorhub.sock")]
    socket: PathBuf,

    /// Device configuration table (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Simulation profile (JSON); implies --simulate
    #[arg(long)]
    profile: Option<PathBuf>,

    /// Attach simulated handset sensors
    #[arg(long)]
    simulate: bool,

    /// CSV recording to replay
    #[arg(short, long)]
    csv: Option<String>,

    /// Replay speed multiplier (1.0 = real-time)
    #[arg(short, long, default_value = "1.0")]
    speed: f64,

    /// Stop each replayed sensor at the end of the recording
    #[arg(long)]
    no_loop: bool,

    /// Dispatch queue capacity
    #[arg(long, default_value = "1000")]
    queue_capacity: usize,

    /// Events buffered per client before drops
    #[arg(long, default_value = "256")]
    client_buffer: usize,

    /// uid granted every permission (repeatable)
    #[arg(long = "privileged-uid")]
    privileged_uids: Vec<u32>,

    /// Metrics port
    #[arg(short, long, default_value = "9100")]
    port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match args.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };
        EnvFilter::from_default_env().add_directive(level.into())
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("sensorhubd v{}", env!("CARGO_PKG_VERSION"));

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let mut adapters: Vec<Arc<dyn DeviceAdapter>> = Vec::new();

    let replay = match &args.csv {
        Some(csv_path) => {
            let dataset = ReplayDataset::from_csv(ReplayConfig {
                csv_path: csv_path.clone(),
                speed: args.speed,
                loop_replay: !args.no_loop,
            })?;
            let info = dataset.info();
            info!(
                "dataset loaded: {} sensors, {} samples, {} ms",
                info.sensor_count, info.sample_count, info.duration_ms
            );
            for adapter in dataset.adapters() {
                adapters.push(adapter);
            }
            Some(info)
        }
        None => None,
    };

    if args.simulate || args.profile.is_some() {
        let profile = match &args.profile {
            Some(path) => SimProfile::load(path)?,
            None => SimProfile::handset(),
        };
        // Recorded tracks take precedence over simulated ones
        let simulated: Vec<SensorType> = SensorType::ALL
            .iter()
            .copied()
            .filter(|t| !t.is_virtual())
            .filter(|t| !replay.as_ref().is_some_and(|r| r.sensor_types.contains(t)))
            .collect();
        for adapter in profile.only(&simulated).build()? {
            adapters.push(adapter);
        }
    }

    let devices = match &args.config {
        Some(path) => DeviceConfigTable::load(path)?,
        None => DeviceConfigTable::default(),
    };

    let permissions = args
        .privileged_uids
        .iter()
        .fold(StaticPermissions::default(), |p, uid| {
            p.with_uid(*uid, Permission::all())
        });

    let config = HubConfig::with_queue(QueueConfig::with_capacity(args.queue_capacity));
    let hub = adapters
        .into_iter()
        .fold(SensorHub::builder(config), |b, adapter| b.adapter(adapter))
        .devices(devices)
        .permissions(Arc::new(permissions))
        .build()?;
    let hub = Arc::new(hub);

    for node in hub.registry().nodes() {
        info!(
            id = node.id(),
            sensor_type = %node.sensor_type(),
            "sensor registered"
        );
    }

    hub.start()?;
    let result = serve(&args, hub.clone(), replay).await;

    let blocking = hub.clone();
    if let Err(e) = tokio::task::spawn_blocking(move || blocking.shutdown()).await {
        warn!("hub shutdown did not complete: {}", e);
    }
    if let Err(e) = std::fs::remove_file(&args.socket) {
        warn!("cannot remove {}: {}", args.socket.display(), e);
    }
    info!("{}", hub.metrics().report());
    result
}

/// Run the socket and HTTP servers until a signal arrives
async fn serve(args: &Args, hub: Arc<SensorHub>, replay: Option<DatasetInfo>) -> Result<()> {
    let state = Arc::new(AppState {
        hub: hub.clone(),
        metrics: HubMetrics::new()?,
        replay,
        start_time: Instant::now(),
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let http_listener = TcpListener::bind(addr).await?;
    info!("metrics endpoint: http://{}/metrics", addr);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(http_listener, http::router(state)).await {
            error!("http server failed: {}", e);
        }
    });

    let listener = worker::bind(&args.socket)?;
    info!("listening on {}", args.socket.display());

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = worker::serve(listener, hub, args.client_buffer) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received, shutting down");
            Ok(())
        }
        _ = terminate.recv() => {
            info!("SIGTERM received, shutting down");
            Ok(())
        }
    }
}
