use kameo::Actor;
use kameo::message::{Context, Message};
use kameo::actor::ActorRef;
use kameo::error::Infallible;
use kameo::reply::{Reply, ReplyError};
use std::sync::Arc;
use std::collections::BTreeMap;
use std::time::Duration;
use chrono::Utc;
use serde::Serialize;
use crate::actors::core::{ComponentHealth, HealthCheckable, HealthStatus};
use crate::metrics::Metrics;

// ============================================================================
// Health Monitor Actor - Aggregates component health for /health
// ============================================================================
//
// Responsibilities:
// - Poll every registered probe on a fixed interval
// - Accept pushed updates (e.g. a transport disabled at startup)
// - Aggregate system-wide health
//
// ============================================================================

// ============================================================================
// Messages
// ============================================================================

#[derive(Debug)]
pub struct UpdateHealth {
    pub health: ComponentHealth,
}

#[derive(Debug)]
pub struct GetSystemHealth;

#[derive(Debug, Clone, Serialize)]
pub struct SystemHealth {
    #[serde(rename = "status")]
    pub overall_status: HealthStatus,
    pub components: BTreeMap<String, ComponentHealth>,
    pub check_time: chrono::DateTime<Utc>,
}

// Implement Reply for SystemHealth to use it as a message reply type
impl Reply for SystemHealth {
    type Ok = Self;
    type Error = Infallible;
    type Value = Self;

    fn to_result(self) -> Result<Self, Infallible> {
        Ok(self)
    }

    fn into_any_err(self) -> Option<Box<dyn ReplyError>> {
        None
    }

    fn into_value(self) -> Self::Value {
        self
    }
}

// ============================================================================
// Health Monitor Actor
// ============================================================================

pub struct HealthMonitorActor {
    components: BTreeMap<String, ComponentHealth>,
    probes: Vec<Arc<dyn HealthCheckable>>,
    interval: Duration,
    metrics: Option<Arc<Metrics>>,
}

impl HealthMonitorActor {
    pub fn new(interval: Duration, metrics: Option<Arc<Metrics>>) -> Self {
        Self {
            components: BTreeMap::new(),
            probes: Vec::new(),
            interval,
            metrics,
        }
    }

    pub fn with_probe(mut self, probe: Arc<dyn HealthCheckable>) -> Self {
        self.probes.push(probe);
        self
    }

    fn compute_overall_status(&self) -> HealthStatus {
        let mut has_degraded = false;
        let mut unhealthy_components = Vec::new();

        for (name, health) in &self.components {
            match &health.status {
                HealthStatus::Unhealthy(msg) => {
                    unhealthy_components.push(format!("{}: {}", name, msg));
                }
                HealthStatus::Degraded(_) => {
                    has_degraded = true;
                }
                HealthStatus::Healthy => {}
            }
        }

        if !unhealthy_components.is_empty() {
            HealthStatus::Unhealthy(unhealthy_components.join(", "))
        } else if has_degraded {
            HealthStatus::Degraded("Some components degraded".to_string())
        } else {
            HealthStatus::Healthy
        }
    }

    fn record(&mut self, health: ComponentHealth) {
        if let Some(metrics) = &self.metrics {
            metrics.update_component_health(&health.name, health.status.code());
        }

        let changed = self
            .components
            .get(&health.name)
            .map_or(true, |previous| previous.status != health.status);
        if changed && !health.status.is_healthy() {
            tracing::warn!(component = %health.name, status = ?health.status, "Component health changed");
        } else {
            tracing::debug!(component = %health.name, status = ?health.status, "Updated component health");
        }

        self.components.insert(health.name.clone(), health);
    }
}

impl Actor for HealthMonitorActor {
    type Args = Self;
    type Error = Infallible;

    async fn on_start(
        mut state: Self::Args,
        actor_ref: ActorRef<Self>
    ) -> Result<Self, Self::Error> {
        tracing::info!(probes = state.probes.len(), "HealthMonitorActor started");

        // First round inline so /health has data before the first tick.
        let probes = state.probes.clone();
        for probe in &probes {
            let health = probe.check_health().await;
            state.record(health);
        }

        let interval = state.interval;
        let monitor = actor_ref.downgrade();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(monitor) = monitor.upgrade() else {
                    break;
                };

                for probe in &probes {
                    let health = probe.check_health().await;
                    // Fire and forget - use tell
                    if monitor.tell(UpdateHealth { health }).await.is_err() {
                        return;
                    }
                }
            }
        });

        Ok(state)
    }
}

// ============================================================================
// Message Handlers
// ============================================================================

impl Message<UpdateHealth> for HealthMonitorActor {
    type Reply = ();

    async fn handle(&mut self, msg: UpdateHealth, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        self.record(msg.health);
    }
}

impl Message<GetSystemHealth> for HealthMonitorActor {
    type Reply = SystemHealth;

    async fn handle(&mut self, _msg: GetSystemHealth, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        SystemHealth {
            overall_status: self.compute_overall_status(),
            components: self.components.clone(),
            check_time: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actors::core::StoreProbe;
    use crate::store::MemoryOrderStore;
    use kameo::prelude::*;

    #[tokio::test]
    async fn test_initial_probe_results_are_available() {
        let monitor = HealthMonitorActor::new(Duration::from_secs(60), None)
            .with_probe(Arc::new(StoreProbe::new(Arc::new(MemoryOrderStore::new()))));
        let monitor = HealthMonitorActor::spawn(monitor);

        let health = monitor.ask(GetSystemHealth).await.unwrap();
        assert!(health.overall_status.is_healthy());
        assert!(health.components.contains_key("database"));
    }

    #[tokio::test]
    async fn test_pushed_unhealthy_component_marks_system_unhealthy() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let monitor = HealthMonitorActor::spawn(HealthMonitorActor::new(
            Duration::from_secs(60),
            Some(metrics.clone()),
        ));

        monitor
            .tell(UpdateHealth {
                health: ComponentHealth::new("push", HealthStatus::Degraded("not initialized".into())),
            })
            .await
            .unwrap();
        monitor
            .tell(UpdateHealth {
                health: ComponentHealth::new("email", HealthStatus::Unhealthy("Circuit breaker open".into())),
            })
            .await
            .unwrap();

        let health = monitor.ask(GetSystemHealth).await.unwrap();
        assert_eq!(
            health.overall_status,
            HealthStatus::Unhealthy("email: Circuit breaker open".into())
        );
        assert_eq!(metrics.component_health_status.with_label_values(&["push"]).get(), 1);
    }
}
