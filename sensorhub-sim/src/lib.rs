// Sensorhub Sim - Simulated sensor hardware
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # Sensorhub Sim
//!
//! Simulated sensor hardware for running the hub without devices.
//!
//! - **Signal patterns**: sine, random walk, steps, binary toggles, noise
//! - **Fault injection**: read errors, dropouts, stuck values, spikes, bad
//!   calibration
//! - **Profiles**: a built-in handset profile or JSON profiles
//!
//! ## Quick Start
//!
//! ```rust
//! use sensorhub::{HubConfig, SensorHub};
//! use sensorhub_sim::SimProfile;
//!
//! let mut builder = SensorHub::builder(HubConfig::default());
//! for device in SimProfile::handset().build().unwrap() {
//!     builder = builder.adapter(device);
//! }
//! let hub = builder.build().unwrap();
//! assert!(hub.registry().len() > 6);
//! ```

pub mod device;
pub mod error;
pub mod faults;
pub mod patterns;
pub mod profile;

// Re-exports for convenience
pub use device::{default_properties, SimulatedAdapter};
pub use error::{Result, SimError};
pub use faults::{FaultConfig, FaultKind};
pub use patterns::{Channel, PatternState, SignalPattern};
pub use profile::{SimProfile, SimSensorConfig};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
