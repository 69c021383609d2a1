// Sensorhub Daemon - Recorded sensor replay
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Device adapters that replay recorded samples from a CSV file.
//!
//! The file holds one sample per row, any number of sensors interleaved:
//!
//! ```text
//! timestamp_ms,sensor_type,v0,v1,v2
//! 0,accelerometer,0.01,0.02,9.79
//! 5,light,320
//! 10,accelerometer,0.02,0.01,9.81
//! ```
//!
//! Each sensor type becomes one adapter. Recorded timing is kept (scaled
//! by the replay speed); the interval requested by the hub is recorded but
//! does not resample the data.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use sensorhub::{
    AdapterError, Conversion, DeviceAdapter, ProximityMap, RawSample, SensorProperties,
    SensorType,
};
use serde::Serialize;
use tracing::info;

/// Configuration for dataset replay.
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// Path to CSV dataset file.
    pub csv_path: String,
    /// Replay speed multiplier (1.0 = real-time, 10.0 = 10x faster).
    pub speed: f64,
    /// Whether to loop the dataset.
    pub loop_replay: bool,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            csv_path: String::new(),
            speed: 1.0,
            loop_replay: true,
        }
    }
}

/// One recorded sample
#[derive(Debug, Clone, PartialEq)]
struct Row {
    timestamp_ms: u64,
    values: Vec<f32>,
}

/// Dataset information.
#[derive(Debug, Clone, Serialize)]
pub struct DatasetInfo {
    pub sensor_count: usize,
    pub sample_count: usize,
    pub duration_ms: u64,
    pub sensor_types: Vec<SensorType>,
}

/// A parsed recording, one track per sensor type
#[derive(Debug)]
pub struct ReplayDataset {
    config: ReplayConfig,
    tracks: BTreeMap<SensorType, Vec<Row>>,
}

impl ReplayDataset {
    /// Load and validate a CSV recording.
    pub fn from_csv(config: ReplayConfig) -> Result<Self, ReplayError> {
        let path = Path::new(&config.csv_path);
        if !path.exists() {
            return Err(ReplayError::FileNotFound(config.csv_path.clone()));
        }
        if !(config.speed.is_finite() && config.speed > 0.0) {
            return Err(ReplayError::InvalidFormat(format!(
                "replay speed must be positive, got {}",
                config.speed
            )));
        }

        let tracks = Self::parse_csv(path)?;
        if tracks.is_empty() {
            return Err(ReplayError::EmptyDataset);
        }

        let dataset = Self { config, tracks };
        let info = dataset.info();
        info!(
            "Loaded recording: {} sensors, {} samples, {}ms",
            info.sensor_count, info.sample_count, info.duration_ms
        );
        Ok(dataset)
    }

    /// Parse a CSV file into per-sensor tracks.
    fn parse_csv(path: &Path) -> Result<BTreeMap<SensorType, Vec<Row>>, ReplayError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path)?;

        let headers = reader.headers()?.clone();
        if headers.get(0) != Some("timestamp_ms") || headers.get(1) != Some("sensor_type") {
            return Err(ReplayError::InvalidFormat(
                "First columns must be 'timestamp_ms,sensor_type'".to_string(),
            ));
        }

        let mut tracks: BTreeMap<SensorType, Vec<Row>> = BTreeMap::new();
        for (line, result) in reader.records().enumerate() {
            let record = result?;
            if record.iter().all(|field| field.is_empty()) {
                continue;
            }

            let timestamp_ms: u64 = record
                .get(0)
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| {
                    ReplayError::InvalidFormat(format!("Invalid timestamp on row {}", line + 1))
                })?;
            let name = record.get(1).unwrap_or_default();
            let sensor_type: SensorType = name
                .parse()
                .map_err(|_| ReplayError::UnknownSensor(name.to_string()))?;
            if sensor_type.is_virtual() {
                return Err(ReplayError::UnknownSensor(name.to_string()));
            }

            let values = record
                .iter()
                .skip(2)
                .filter(|s| !s.is_empty())
                .map(|s| s.parse::<f32>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| {
                    ReplayError::InvalidFormat(format!("Invalid value on row {}", line + 1))
                })?;
            if values.len() != sensor_type.value_count() {
                return Err(ReplayError::InvalidFormat(format!(
                    "{} expects {} values on row {}, got {}",
                    sensor_type,
                    sensor_type.value_count(),
                    line + 1,
                    values.len()
                )));
            }

            let track = tracks.entry(sensor_type).or_default();
            if track.last().is_some_and(|last| last.timestamp_ms > timestamp_ms) {
                return Err(ReplayError::InvalidFormat(format!(
                    "Timestamps go backwards for {} on row {}",
                    sensor_type,
                    line + 1
                )));
            }
            track.push(Row {
                timestamp_ms,
                values,
            });
        }

        Ok(tracks)
    }

    pub fn info(&self) -> DatasetInfo {
        let first = self
            .tracks
            .values()
            .filter_map(|t| t.first())
            .map(|r| r.timestamp_ms)
            .min();
        let last = self
            .tracks
            .values()
            .filter_map(|t| t.last())
            .map(|r| r.timestamp_ms)
            .max();
        DatasetInfo {
            sensor_count: self.tracks.len(),
            sample_count: self.tracks.values().map(Vec::len).sum(),
            duration_ms: match (first, last) {
                (Some(first), Some(last)) => last - first,
                _ => 0,
            },
            sensor_types: self.tracks.keys().copied().collect(),
        }
    }

    /// One adapter per recorded sensor type
    pub fn adapters(&self) -> Vec<Arc<ReplayAdapter>> {
        self.tracks
            .iter()
            .map(|(sensor_type, rows)| {
                Arc::new(ReplayAdapter::new(
                    *sensor_type,
                    rows.clone(),
                    self.config.speed,
                    self.config.loop_replay,
                ))
            })
            .collect()
    }
}

#[derive(Debug)]
struct Cursor {
    enabled: bool,
    position: usize,
    /// Wall clock instant matching the recorded timestamp
    anchor: Option<(Instant, u64)>,
    interval_ms: u32,
    loops: u64,
}

/// Plays one recorded track
#[derive(Debug)]
pub struct ReplayAdapter {
    properties: SensorProperties,
    rows: Vec<Row>,
    speed: f64,
    loop_replay: bool,
    cursor: Mutex<Cursor>,
    control: Condvar,
}

impl ReplayAdapter {
    fn new(sensor_type: SensorType, rows: Vec<Row>, speed: f64, loop_replay: bool) -> Self {
        Self {
            properties: SensorProperties::new(sensor_type, format!("replay-{}", sensor_type))
                .with_vendor("sensorhub-replay"),
            rows,
            speed,
            loop_replay,
            cursor: Mutex::new(Cursor {
                enabled: false,
                position: 0,
                anchor: None,
                interval_ms: 0,
                loops: 0,
            }),
            control: Condvar::new(),
        }
    }

    pub fn sensor_type(&self) -> SensorType {
        self.properties.sensor_type
    }

    /// Index of the next row to play
    pub fn position(&self) -> usize {
        self.cursor.lock().position
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Completed passes over the track
    pub fn loops(&self) -> u64 {
        self.cursor.lock().loops
    }

    pub fn interval_ms(&self) -> u32 {
        self.cursor.lock().interval_ms
    }

    /// When the row at the cursor is due, None when the track is finished
    fn due(&self, cursor: &mut Cursor) -> Option<Instant> {
        if cursor.position >= self.rows.len() {
            if !self.loop_replay || self.rows.is_empty() {
                return None;
            }
            cursor.position = 0;
            cursor.loops += 1;
            cursor.anchor = None;
        }
        let row = &self.rows[cursor.position];
        let (start, base_ms) = *cursor
            .anchor
            .get_or_insert_with(|| (Instant::now(), row.timestamp_ms));
        let offset_ms = row.timestamp_ms.saturating_sub(base_ms) as f64 / self.speed;
        Some(start + Duration::from_secs_f64(offset_ms / 1000.0))
    }
}

impl DeviceAdapter for ReplayAdapter {
    fn enable(&self) -> Result<(), AdapterError> {
        let mut cursor = self.cursor.lock();
        cursor.enabled = true;
        // Resume from the current row without replaying the gap
        cursor.anchor = None;
        drop(cursor);
        self.control.notify_all();
        Ok(())
    }

    fn disable(&self) -> Result<(), AdapterError> {
        self.cursor.lock().enabled = false;
        self.control.notify_all();
        Ok(())
    }

    fn set_interval(&self, interval_ms: u32) -> Result<(), AdapterError> {
        self.cursor.lock().interval_ms = interval_ms;
        Ok(())
    }

    fn is_data_ready(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut cursor = self.cursor.lock();
        loop {
            let due = if cursor.enabled { self.due(&mut cursor) } else { None };
            let now = Instant::now();
            if due.is_some_and(|due| due <= now) {
                return true;
            }
            if now >= deadline {
                return false;
            }
            let wake = due.map_or(deadline, |due| due.min(deadline));
            let _ = self.control.wait_until(&mut cursor, wake);
        }
    }

    fn read_sample(&self) -> Result<RawSample, AdapterError> {
        let mut cursor = self.cursor.lock();
        if !cursor.enabled {
            return Err(AdapterError::Disabled);
        }
        if self.due(&mut cursor).is_none() {
            return Err(AdapterError::NoData);
        }
        let row = &self.rows[cursor.position];
        cursor.position += 1;
        Ok(RawSample::new(row.values.clone()))
    }

    fn properties(&self) -> SensorProperties {
        self.properties.clone()
    }

    fn conversion(&self) -> Conversion {
        match self.properties.sensor_type {
            SensorType::Proximity => Conversion::Proximity(ProximityMap::iio()),
            _ => Conversion::Identity,
        }
    }
}

/// Replay errors.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Unknown or virtual sensor type: {0}")]
    UnknownSensor(String),

    #[error("Empty dataset")]
    EmptyDataset,
}
