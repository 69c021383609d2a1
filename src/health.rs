//! Health monitoring for the dispatch pipeline
//!
//! Maps queue fill, drop rate and delivery failures to a
//! [`HealthStatus`] per component plus an overall system status.

use std::time::{Duration, Instant};

use serde::Serialize;

use crate::metrics::DispatchMetrics;

/// Health status of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Component is healthy
    Healthy,
    /// Component is degraded but functional
    Degraded,
    /// Component is unhealthy
    Unhealthy,
    /// Component status is unknown
    #[default]
    Unknown,
}

impl HealthStatus {
    /// Check if the status is operational (healthy or degraded)
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Healthy | Self::Degraded)
    }

    /// Check if the status is healthy
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// Numeric form for gauges: 0 healthy, 1 degraded, 2 unhealthy, 3 unknown
    pub fn as_gauge(&self) -> i64 {
        match self {
            Self::Healthy => 0,
            Self::Degraded => 1,
            Self::Unhealthy => 2,
            Self::Unknown => 3,
        }
    }
}

/// Health check result
#[derive(Debug, Clone)]
pub struct HealthCheck {
    /// Component name
    pub component: String,
    /// Status
    pub status: HealthStatus,
    /// Last check time
    pub last_check: Instant,
    /// Details message
    pub message: String,
}

impl HealthCheck {
    /// Create a healthy check result
    pub fn healthy(component: impl Into<String>) -> Self {
        Self::with_status(component, HealthStatus::Healthy, "OK")
    }

    /// Create an unhealthy check result
    pub fn unhealthy(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(component, HealthStatus::Unhealthy, message)
    }

    /// Create a degraded check result
    pub fn degraded(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(component, HealthStatus::Degraded, message)
    }

    fn with_status(
        component: impl Into<String>,
        status: HealthStatus,
        message: impl Into<String>,
    ) -> Self {
        Self {
            component: component.into(),
            status,
            last_check: Instant::now(),
            message: message.into(),
        }
    }
}

/// Health configuration thresholds
#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Queue fill ratio before degraded (0.0 - 1.0)
    pub degraded_queue_fill: f64,
    /// Queue fill ratio before unhealthy
    pub unhealthy_queue_fill: f64,
    /// Share of pushes dropped before degraded
    pub degraded_drop_rate: f64,
    /// Share of pushes dropped before unhealthy
    pub unhealthy_drop_rate: f64,
    /// Share of sends failed before degraded
    pub degraded_failure_rate: f64,
    /// Share of sends failed before unhealthy
    pub unhealthy_failure_rate: f64,
    /// Check interval
    pub check_interval: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            degraded_queue_fill: 0.5,
            unhealthy_queue_fill: 0.9,
            degraded_drop_rate: 0.001,
            unhealthy_drop_rate: 0.05,
            degraded_failure_rate: 0.01,
            unhealthy_failure_rate: 0.2,
            check_interval: Duration::from_secs(10),
        }
    }
}

/// Queue counters needed by a health evaluation
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct QueueSnapshot {
    pub len: usize,
    pub capacity: usize,
    pub pushed: u64,
    pub dropped: u64,
}

impl QueueSnapshot {
    pub fn fill(&self) -> f64 {
        if self.capacity == 0 {
            return 1.0;
        }
        self.len as f64 / self.capacity as f64
    }

    pub fn drop_rate(&self) -> f64 {
        let offered = self.pushed + self.dropped;
        if offered == 0 {
            return 0.0;
        }
        self.dropped as f64 / offered as f64
    }
}

/// Health monitor for the pipeline
#[derive(Debug, Default)]
pub struct HealthMonitor {
    checks: Vec<HealthCheck>,
    config: HealthConfig,
    system_status: HealthStatus,
}

impl HealthMonitor {
    /// Create a new health monitor
    pub fn new() -> Self {
        Self::with_config(HealthConfig::default())
    }

    /// Create a health monitor with custom configuration
    pub fn with_config(config: HealthConfig) -> Self {
        Self {
            checks: Vec::new(),
            config,
            system_status: HealthStatus::Unknown,
        }
    }

    /// Add a health check result
    pub fn add_check(&mut self, check: HealthCheck) {
        // Remove old check for same component
        self.checks.retain(|c| c.component != check.component);
        self.checks.push(check);
        self.update_system_status();
    }

    /// Re-evaluate every pipeline component
    pub fn evaluate(&mut self, queue: &QueueSnapshot, dispatch: &DispatchMetrics) -> HealthStatus {
        let cfg = &self.config;

        let fill = queue.fill();
        let queue_check = if fill >= cfg.unhealthy_queue_fill {
            HealthCheck::unhealthy("dispatch_queue", format!("{:.0}% full", fill * 100.0))
        } else if fill >= cfg.degraded_queue_fill {
            HealthCheck::degraded("dispatch_queue", format!("{:.0}% full", fill * 100.0))
        } else {
            HealthCheck::healthy("dispatch_queue")
        };

        let drop_rate = queue.drop_rate();
        let drop_check = if drop_rate >= cfg.unhealthy_drop_rate {
            HealthCheck::unhealthy("drops", format!("{} events dropped", queue.dropped))
        } else if drop_rate >= cfg.degraded_drop_rate && queue.dropped > 0 {
            HealthCheck::degraded("drops", format!("{} events dropped", queue.dropped))
        } else {
            HealthCheck::healthy("drops")
        };

        let failure_rate = dispatch.failure_rate();
        let delivery_check = if failure_rate >= cfg.unhealthy_failure_rate {
            HealthCheck::unhealthy(
                "delivery",
                format!("{} failed sends", dispatch.delivery_failures),
            )
        } else if failure_rate >= cfg.degraded_failure_rate && dispatch.delivery_failures > 0 {
            HealthCheck::degraded(
                "delivery",
                format!("{} failed sends", dispatch.delivery_failures),
            )
        } else {
            HealthCheck::healthy("delivery")
        };

        self.add_check(queue_check);
        self.add_check(drop_check);
        self.add_check(delivery_check);
        self.system_status
    }

    /// Update overall system status based on all checks
    fn update_system_status(&mut self) {
        if self.checks.is_empty() {
            self.system_status = HealthStatus::Unknown;
            return;
        }

        let unhealthy = self.checks.iter().any(|c| c.status == HealthStatus::Unhealthy);
        let degraded = self.checks.iter().any(|c| c.status == HealthStatus::Degraded);

        self.system_status = if unhealthy {
            HealthStatus::Unhealthy
        } else if degraded {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };
    }

    /// Get current system status
    pub fn status(&self) -> HealthStatus {
        self.system_status
    }

    /// Get all checks
    pub fn checks(&self) -> &[HealthCheck] {
        &self.checks
    }

    /// Get configuration
    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    /// Get check for a specific component
    pub fn get_check(&self, component: &str) -> Option<&HealthCheck> {
        self.checks.iter().find(|c| c.component == component)
    }

    /// Generate health report
    pub fn report(&self) -> String {
        let mut report = String::new();
        report.push_str(&format!("System Status: {:?}\n\n", self.system_status));

        for check in &self.checks {
            report.push_str(&format!(
                "[{:?}] {} - {}\n",
                check.status, check.component, check.message
            ));
        }

        report
    }

    /// Check if system is operational
    pub fn is_operational(&self) -> bool {
        self.system_status.is_ok()
    }
}
