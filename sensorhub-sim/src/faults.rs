// Sensorhub Sim - Fault injection
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Fault injection for simulated devices.
//!
//! Faults are scheduled on the device's sample counter, so a fault at
//! sample 500 hits the 500th read regardless of the sampling interval.

use serde::{Deserialize, Serialize};

/// Scheduled fault
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaultConfig {
    /// Type of fault to inject.
    pub kind: FaultKind,
    /// Sample index when the fault starts.
    pub start_sample: u64,
    /// Duration in samples (None = until the device is reset).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_samples: Option<u64>,
}

impl FaultConfig {
    pub fn new(kind: FaultKind, start_sample: u64) -> Self {
        Self {
            kind,
            start_sample,
            duration_samples: None,
        }
    }

    /// Set duration in samples.
    pub fn with_duration(mut self, samples: u64) -> Self {
        self.duration_samples = Some(samples);
        self
    }

    /// Check if the fault is active at a given sample index.
    pub fn is_active(&self, sample_idx: u64) -> bool {
        if sample_idx < self.start_sample {
            return false;
        }
        match self.duration_samples {
            Some(duration) => sample_idx < self.start_sample + duration,
            None => true,
        }
    }

    pub fn samples_since_start(&self, sample_idx: u64) -> u64 {
        sample_idx.saturating_sub(self.start_sample)
    }
}

/// Type of fault to inject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FaultKind {
    /// Reads fail with an I/O error.
    ReadError,

    /// No sample becomes available.
    Dropout,

    /// Values repeat the last reading before the fault.
    Stuck,

    /// One-sample jump added to every channel.
    Spike { magnitude: f64 },

    /// Constant offset added to every channel.
    Bias { offset: f64 },

    /// Device reports bad accuracy (magnetic interference).
    Uncalibrated,
}

/// Outcome of a read under the active faults
#[derive(Debug, Clone, PartialEq)]
pub enum FaultEffect {
    /// Sample goes out, possibly altered
    Values(Vec<f64>),
    Error,
    Missing,
}

/// Running state of fault application.
#[derive(Debug, Clone, Default)]
pub struct FaultState {
    stuck: Option<Vec<f64>>,
}

impl FaultState {
    /// Apply every active fault to one reading
    pub fn apply(
        &mut self,
        faults: &[FaultConfig],
        sample_idx: u64,
        values: Vec<f64>,
    ) -> FaultEffect {
        let mut values = values;
        let mut stuck_active = false;

        for fault in faults.iter().filter(|f| f.is_active(sample_idx)) {
            match &fault.kind {
                FaultKind::ReadError => return FaultEffect::Error,
                FaultKind::Dropout => return FaultEffect::Missing,
                FaultKind::Stuck => {
                    stuck_active = true;
                    values = self.stuck.get_or_insert_with(|| values.clone()).clone();
                }
                FaultKind::Spike { magnitude } => {
                    if fault.samples_since_start(sample_idx) == 0 {
                        values.iter_mut().for_each(|v| *v += magnitude);
                    }
                }
                FaultKind::Bias { offset } => values.iter_mut().for_each(|v| *v += offset),
                FaultKind::Uncalibrated => {}
            }
        }

        if !stuck_active {
            self.stuck = None;
        }
        FaultEffect::Values(values)
    }

    /// Whether accuracy should be reported as bad at this sample
    pub fn uncalibrated(faults: &[FaultConfig], sample_idx: u64) -> bool {
        faults
            .iter()
            .any(|f| f.kind == FaultKind::Uncalibrated && f.is_active(sample_idx))
    }

    pub fn reset(&mut self) {
        self.stuck = None;
    }
}
