// Sensorhub Sim - Signal patterns
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Signal pattern generators for simulated sensor channels.
//!
//! Each channel of a simulated device (one axis of an accelerometer, the
//! lux value of a light sensor) follows one pattern. Patterns are
//! evaluated on simulated time, so a device running at 10 ms and one at
//! 200 ms trace the same curve at different resolutions.

use rand::prelude::*;
use rand_distr::Normal;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::error::{Result, SimError};

/// Signal pattern definition.
///
/// Patterns can be summed with `Composite`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "pattern", rename_all = "snake_case")]
pub enum SignalPattern {
    /// Constant value.
    Constant { value: f64 },

    /// Sinusoidal wave.
    ///
    /// `value = offset + amplitude * sin(2*PI*t/period_ms + phase)`
    Sine {
        amplitude: f64,
        period_ms: u64,
        phase: f64,
        offset: f64,
    },

    /// Linear trend.
    ///
    /// `value = start + slope_per_ms * t`
    Linear { start: f64, slope_per_ms: f64 },

    /// Random walk (Brownian motion).
    RandomWalk { start: f64, step_std: f64 },

    /// Step function over (timestamp_ms, value) pairs.
    ///
    /// The value persists until the next timestamp.
    Step { levels: Vec<(u64, f64)> },

    /// Sawtooth wave (linear ramp with reset).
    Sawtooth {
        min: f64,
        max: f64,
        period_ms: u64,
        ascending: bool,
    },

    /// Binary state (0 or 1) with per-sample transition probabilities.
    Binary {
        initial: bool,
        p_on: f64,
        p_off: f64,
    },

    /// Zero-mean gaussian noise.
    Noise { std: f64 },

    /// Sum of several patterns.
    Composite { parts: Vec<SignalPattern> },
}

impl SignalPattern {
    /// Check parameters before the pattern is used
    pub fn validate(&self) -> Result<()> {
        match self {
            SignalPattern::Sine { period_ms, .. } | SignalPattern::Sawtooth { period_ms, .. }
                if *period_ms == 0 =>
            {
                Err(SimError::InvalidPattern("period_ms must be positive".to_string()))
            }
            SignalPattern::RandomWalk { step_std: std, .. } | SignalPattern::Noise { std }
                if !(std.is_finite() && *std >= 0.0) =>
            {
                Err(SimError::InvalidPattern(format!("bad standard deviation {}", std)))
            }
            SignalPattern::Binary { p_on, p_off, .. }
                if !(0.0..=1.0).contains(p_on) || !(0.0..=1.0).contains(p_off) =>
            {
                Err(SimError::InvalidPattern(
                    "transition probabilities must be in [0, 1]".to_string(),
                ))
            }
            SignalPattern::Composite { parts } => parts.iter().try_for_each(|p| p.validate()),
            _ => Ok(()),
        }
    }

    /// Evaluate the pattern at a given timestamp.
    ///
    /// For patterns that need state (RandomWalk, Binary), use
    /// [`PatternState::evaluate`].
    pub fn evaluate(&self, timestamp_ms: u64, rng: &mut (impl Rng + ?Sized)) -> f64 {
        match self {
            SignalPattern::Constant { value } => *value,

            SignalPattern::Sine {
                amplitude,
                period_ms,
                phase,
                offset,
            } => {
                let t = timestamp_ms as f64;
                let period = (*period_ms).max(1) as f64;
                offset + amplitude * (2.0 * PI * t / period + phase).sin()
            }

            SignalPattern::Linear {
                start,
                slope_per_ms,
            } => start + slope_per_ms * timestamp_ms as f64,

            SignalPattern::RandomWalk { start, step_std } => start + gaussian(*step_std, rng),

            SignalPattern::Step { levels } => {
                let mut current_value = levels.first().map(|(_, v)| *v).unwrap_or(0.0);
                for (ts, val) in levels {
                    if timestamp_ms >= *ts {
                        current_value = *val;
                    } else {
                        break;
                    }
                }
                current_value
            }

            SignalPattern::Sawtooth {
                min,
                max,
                period_ms,
                ascending,
            } => {
                let period = (*period_ms).max(1);
                let fraction = (timestamp_ms % period) as f64 / period as f64;
                if *ascending {
                    min + (max - min) * fraction
                } else {
                    max - (max - min) * fraction
                }
            }

            SignalPattern::Binary { p_on, p_off, .. } => {
                // Stateless approximation: steady-state probability
                let total = p_on + p_off;
                let steady_state = if total > 0.0 { p_on / total } else { 0.0 };
                if rng.gen::<f64>() < steady_state {
                    1.0
                } else {
                    0.0
                }
            }

            SignalPattern::Noise { std } => gaussian(*std, rng),

            SignalPattern::Composite { parts } => {
                parts.iter().map(|p| p.evaluate(timestamp_ms, rng)).sum()
            }
        }
    }

    /// Device at rest, gravity on one axis
    pub fn gravity_axis(value: f64, noise_std: f64) -> Self {
        SignalPattern::Composite {
            parts: vec![
                SignalPattern::Constant { value },
                SignalPattern::Noise { std: noise_std },
            ],
        }
    }

    /// Slow tilt, as when a handset is picked up and turned
    pub fn tilt(amplitude: f64, period_ms: u64) -> Self {
        SignalPattern::Sine {
            amplitude,
            period_ms,
            phase: 0.0,
            offset: 0.0,
        }
    }

    /// Ambient light drifting between dim and bright
    pub fn ambient_light(min_lux: f64, max_lux: f64, period_ms: u64) -> Self {
        SignalPattern::Sine {
            amplitude: (max_lux - min_lux) / 2.0,
            period_ms,
            phase: 0.0,
            offset: (max_lux + min_lux) / 2.0,
        }
    }

    /// Object occasionally covering the proximity window
    pub fn proximity_toggle(p_cover: f64, p_uncover: f64) -> Self {
        SignalPattern::Binary {
            initial: false,
            p_on: p_cover,
            p_off: p_uncover,
        }
    }

    /// Barometric pressure wandering around a base value
    pub fn barometric(base_hpa: f64) -> Self {
        SignalPattern::RandomWalk {
            start: base_hpa,
            step_std: 0.01,
        }
    }
}

fn gaussian(std: f64, rng: &mut (impl Rng + ?Sized)) -> f64 {
    match Normal::new(0.0, std) {
        Ok(normal) if std > 0.0 => normal.sample(rng),
        _ => 0.0,
    }
}

/// State for patterns that need history.
#[derive(Debug, Clone, Default)]
pub struct PatternState {
    /// Current value for random walk.
    pub random_walk_value: f64,
    /// Current binary state.
    pub binary_state: bool,
}

impl PatternState {
    /// Create state initialized for a pattern.
    pub fn for_pattern(pattern: &SignalPattern) -> Self {
        let mut state = Self::default();
        match pattern {
            SignalPattern::RandomWalk { start, .. } => {
                state.random_walk_value = *start;
            }
            SignalPattern::Binary { initial, .. } => {
                state.binary_state = *initial;
            }
            _ => {}
        }
        state
    }

    /// Evaluate pattern with state update.
    pub fn evaluate(
        &mut self,
        pattern: &SignalPattern,
        timestamp_ms: u64,
        rng: &mut (impl Rng + ?Sized),
    ) -> f64 {
        match pattern {
            SignalPattern::RandomWalk { step_std, .. } => {
                self.random_walk_value += gaussian(*step_std, rng);
                self.random_walk_value
            }

            SignalPattern::Binary { p_on, p_off, .. } => {
                let p = if self.binary_state { *p_off } else { *p_on };
                if rng.gen::<f64>() < p {
                    self.binary_state = !self.binary_state;
                }
                if self.binary_state {
                    1.0
                } else {
                    0.0
                }
            }

            _ => pattern.evaluate(timestamp_ms, rng),
        }
    }
}

/// One channel: a pattern plus its running state
#[derive(Debug, Clone)]
pub struct Channel {
    pattern: SignalPattern,
    state: PatternState,
}

impl Channel {
    pub fn new(pattern: SignalPattern) -> Self {
        let state = PatternState::for_pattern(&pattern);
        Self { pattern, state }
    }

    pub fn pattern(&self) -> &SignalPattern {
        &self.pattern
    }

    pub fn sample(&mut self, timestamp_ms: u64, rng: &mut (impl Rng + ?Sized)) -> f64 {
        self.state.evaluate(&self.pattern, timestamp_ms, rng)
    }

    /// Forget accumulated state
    pub fn reset(&mut self) {
        self.state = PatternState::for_pattern(&self.pattern);
    }
}
