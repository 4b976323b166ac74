//! Pipeline health
//!
//! The sampler, scheduler, uploader and capture backend each publish a
//! status here. `/healthz` reports the worst of them and `/readyz` only
//! passes once the agent has finished wiring and nothing is unhealthy.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Still sampling or capturing, but failing repeatedly
    Degraded,
    /// Stopped doing its job; fails both health endpoints
    Unhealthy,
}

impl ComponentStatus {
    pub fn is_operational(&self) -> bool {
        matches!(self, ComponentStatus::Healthy | ComponentStatus::Degraded)
    }
}

/// Last reported status of one pipeline stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Unix seconds of the report
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    fn at_now(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn healthy() -> Self {
        Self::at_now(ComponentStatus::Healthy, None)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::at_now(ComponentStatus::Degraded, Some(message.into()))
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::at_now(ComponentStatus::Unhealthy, Some(message.into()))
    }
}

/// Body of `/healthz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: HashMap<String, ComponentHealth>,
}

impl HealthResponse {
    /// Worst status wins; an empty map is healthy
    pub fn compute_status(components: &HashMap<String, ComponentHealth>) -> ComponentStatus {
        let any_with = |status: ComponentStatus| components.values().any(|h| h.status == status);
        if any_with(ComponentStatus::Unhealthy) {
            ComponentStatus::Unhealthy
        } else if any_with(ComponentStatus::Degraded) {
            ComponentStatus::Degraded
        } else {
            ComponentStatus::Healthy
        }
    }
}

/// Body of `/readyz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

pub mod components {
    pub const SAMPLER: &str = "sampler";
    pub const SCHEDULER: &str = "scheduler";
    pub const UPLOADER: &str = "uploader";
    pub const CAPTURE: &str = "capture";

    pub const ALL: [&str; 4] = [SAMPLER, SCHEDULER, UPLOADER, CAPTURE];
}

/// Consecutive failures before a component is reported degraded
pub const DEGRADED_AFTER_FAILURES: u32 = 3;

/// Turns a stream of successes and failures into health transitions.
///
/// Only transitions are returned so callers touch the registry when the
/// status actually changes.
#[derive(Debug, Default)]
pub struct FailureStreak {
    failures: u32,
    degraded: bool,
}

impl FailureStreak {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a success; returns the new health if the component recovered
    pub fn success(&mut self) -> Option<ComponentHealth> {
        self.failures = 0;
        if self.degraded {
            self.degraded = false;
            return Some(ComponentHealth::healthy());
        }
        None
    }

    /// Record a failure; returns the new health once the streak is long enough
    pub fn failure(&mut self, message: impl Into<String>) -> Option<ComponentHealth> {
        self.failures = self.failures.saturating_add(1);
        if !self.degraded && self.failures >= DEGRADED_AFTER_FAILURES {
            self.degraded = true;
            return Some(ComponentHealth::degraded(message));
        }
        None
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}

/// Shared view of pipeline health; clones observe the same state
#[derive(Debug, Clone)]
pub struct HealthRegistry {
    components: Arc<RwLock<HashMap<String, ComponentHealth>>>,
    ready: Arc<RwLock<bool>>,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self {
            components: Arc::new(RwLock::new(HashMap::new())),
            ready: Arc::new(RwLock::new(false)),
        }
    }

    pub async fn register(&self, name: &str) {
        self.set_healthy(name).await;
    }

    /// Register the sampler, scheduler, uploader and capture backend as healthy
    pub async fn register_pipeline(&self) {
        for name in components::ALL {
            self.register(name).await;
        }
    }

    /// Replace a component's last report
    pub async fn update(&self, name: &str, health: ComponentHealth) {
        self.components
            .write()
            .await
            .insert(name.to_string(), health);
    }

    pub async fn set_healthy(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::degraded(message)).await;
    }

    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::unhealthy(message)).await;
    }

    /// Flipped on once every task is spawned and off again at shutdown
    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    pub async fn health(&self) -> HealthResponse {
        let components = self.components.read().await.clone();
        let status = HealthResponse::compute_status(&components);
        HealthResponse { status, components }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        let ready = *self.ready.read().await;
        let status = self.health().await.status;

        let reason = if !ready {
            Some("Pipeline tasks not started")
        } else if status == ComponentStatus::Unhealthy {
            Some("Critical component unhealthy")
        } else {
            None
        };

        ReadinessResponse {
            ready: reason.is_none(),
            reason: reason.map(str::to_string),
        }
    }
}
