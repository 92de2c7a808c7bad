use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::metrics::Metrics;
use crate::store::OrderStore;
use crate::utils::{CircuitBreaker, CircuitState};

// ============================================================================
// Health Check Abstractions
// ============================================================================
//
// Every component the monitor watches implements `HealthCheckable`. The
// database answers a ping; each HTTP notification transport is as healthy as
// its circuit breaker.
//
// ============================================================================

/// Health status of a component
#[derive(Debug, Clone, PartialEq)]
pub enum HealthStatus {
    Healthy,
    Degraded(String),
    Unhealthy(String),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    pub fn is_unhealthy(&self) -> bool {
        matches!(self, HealthStatus::Unhealthy(_))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded(_) => "degraded",
            HealthStatus::Unhealthy(_) => "unhealthy",
        }
    }

    /// Gauge value: 0=Unhealthy, 1=Degraded, 2=Healthy.
    pub fn code(&self) -> i64 {
        match self {
            HealthStatus::Unhealthy(_) => 0,
            HealthStatus::Degraded(_) => 1,
            HealthStatus::Healthy => 2,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            HealthStatus::Healthy => None,
            HealthStatus::Degraded(reason) | HealthStatus::Unhealthy(reason) => Some(reason),
        }
    }
}

impl Serialize for HealthStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Health information for a component
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    pub last_check: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ComponentHealth {
    pub fn new(name: impl Into<String>, status: HealthStatus) -> Self {
        let details = status.reason().map(str::to_string);
        Self {
            name: name.into(),
            status,
            last_check: Utc::now(),
            details,
        }
    }
}

/// A component the health monitor polls.
#[async_trait]
pub trait HealthCheckable: Send + Sync {
    fn component_name(&self) -> &str;

    async fn check_health(&self) -> ComponentHealth;
}

pub struct StoreProbe {
    store: Arc<dyn OrderStore>,
}

impl StoreProbe {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl HealthCheckable for StoreProbe {
    fn component_name(&self) -> &str {
        "database"
    }

    async fn check_health(&self) -> ComponentHealth {
        let status = match self.store.ping().await {
            Ok(()) => HealthStatus::Healthy,
            Err(e) => HealthStatus::Unhealthy(e.to_string()),
        };
        ComponentHealth::new(self.component_name(), status)
    }
}

/// Reports a notification transport through its circuit breaker and keeps
/// the `circuit_breaker_state` gauge current.
pub struct BreakerProbe {
    breaker: CircuitBreaker,
    metrics: Option<Arc<Metrics>>,
}

impl BreakerProbe {
    pub fn new(breaker: CircuitBreaker, metrics: Option<Arc<Metrics>>) -> Self {
        Self { breaker, metrics }
    }
}

#[async_trait]
impl HealthCheckable for BreakerProbe {
    fn component_name(&self) -> &str {
        self.breaker.name()
    }

    async fn check_health(&self) -> ComponentHealth {
        let state = self.breaker.get_state().await;
        if let Some(metrics) = &self.metrics {
            metrics.update_circuit_breaker_state(self.breaker.name(), state.code());
        }

        let status = match state {
            CircuitState::Closed => HealthStatus::Healthy,
            CircuitState::HalfOpen => HealthStatus::Degraded("Circuit breaker half-open".to_string()),
            CircuitState::Open => HealthStatus::Unhealthy("Circuit breaker open".to_string()),
        };
        ComponentHealth::new(self.component_name(), status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryOrderStore;
    use crate::utils::CircuitBreakerConfig;
    use std::time::Duration;

    #[tokio::test]
    async fn test_store_probe_healthy() {
        let probe = StoreProbe::new(Arc::new(MemoryOrderStore::new()));
        let health = probe.check_health().await;

        assert_eq!(health.name, "database");
        assert!(health.status.is_healthy());
        assert!(health.details.is_none());
    }

    #[tokio::test]
    async fn test_breaker_probe_reports_open_circuit() {
        let breaker = CircuitBreaker::new(
            "whatsapp",
            CircuitBreakerConfig {
                failure_threshold: 1,
                timeout: Duration::from_secs(60),
                success_threshold: 1,
            },
        );
        let _ = breaker.call(async { Err::<(), _>("down") }).await;

        let metrics = Arc::new(Metrics::new().unwrap());
        let probe = BreakerProbe::new(breaker, Some(metrics.clone()));
        let health = probe.check_health().await;

        assert!(health.status.is_unhealthy());
        assert_eq!(health.details.as_deref(), Some("Circuit breaker open"));
        assert_eq!(metrics.circuit_breaker_state.with_label_values(&["whatsapp"]).get(), 1);
    }

    #[test]
    fn test_status_serializes_as_label() {
        let json = serde_json::to_value(ComponentHealth::new("push", HealthStatus::Degraded("off".into()))).unwrap();
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["details"], "off");
    }
}
