//! Health check aggregation.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

/// Health status for the whole process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

/// Component health state.
#[derive(Debug)]
pub struct ComponentHealth {
    name: &'static str,
    /// Whether an unhealthy state makes the whole report unhealthy rather
    /// than degraded.
    critical: bool,
    healthy: AtomicBool,
    message: parking_lot::RwLock<Option<String>>,
}

impl ComponentHealth {
    pub const fn new(name: &'static str, critical: bool) -> Self {
        Self {
            name,
            critical,
            healthy: AtomicBool::new(false),
            message: parking_lot::RwLock::new(None),
        }
    }

    pub fn set_healthy(&self) {
        self.healthy.store(true, Ordering::Relaxed);
        *self.message.write() = None;
    }

    pub fn set_unhealthy(&self, msg: impl Into<String>) {
        self.healthy.store(false, Ordering::Relaxed);
        *self.message.write() = Some(msg.into());
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn message(&self) -> Option<String> {
        self.message.read().clone()
    }

    fn report(&self) -> ComponentHealthReport {
        ComponentHealthReport {
            name: self.name.to_string(),
            healthy: self.is_healthy(),
            critical: self.critical,
            message: self.message(),
        }
    }
}

/// Aggregated health status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub components: Vec<ComponentHealthReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealthReport {
    pub name: String,
    pub healthy: bool,
    pub critical: bool,
    pub message: Option<String>,
}

/// Health of the pipeline's external dependencies.
pub struct HealthRegistry {
    pub redpanda: ComponentHealth,
    pub postgres: ComponentHealth,
    /// Mail is optional: without it only email actions fail.
    pub mail: ComponentHealth,
}

impl HealthRegistry {
    pub const fn new() -> Self {
        Self {
            redpanda: ComponentHealth::new("redpanda", true),
            postgres: ComponentHealth::new("postgres", true),
            mail: ComponentHealth::new("mail", false),
        }
    }

    /// Generate a health report.
    ///
    /// Unhealthy when any critical component is down, degraded when only
    /// optional ones are.
    pub fn report(&self) -> HealthReport {
        let components = vec![
            self.redpanda.report(),
            self.postgres.report(),
            self.mail.report(),
        ];

        let critical_down = components.iter().any(|c| c.critical && !c.healthy);
        let any_down = components.iter().any(|c| !c.healthy);

        let status = if critical_down {
            HealthStatus::Unhealthy
        } else if any_down {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        HealthReport { status, components }
    }
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Global health registry.
pub static HEALTH: std::sync::LazyLock<HealthRegistry> =
    std::sync::LazyLock::new(HealthRegistry::new);

/// Get the global health registry.
pub fn health() -> &'static HealthRegistry {
    &HEALTH
}
