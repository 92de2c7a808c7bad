use actix_web::{web, HttpResponse, Responder};
use kameo::actor::ActorRef;
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;

use crate::actors::{GetSystemHealth, HealthMonitorActor};
use super::Metrics;

/// `GET /metrics` in the Prometheus text format
pub async fn metrics_handler(metrics: web::Data<Arc<Metrics>>) -> impl Responder {
    let encoder = TextEncoder::new();
    let metric_families = metrics.registry().gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return HttpResponse::InternalServerError().finish();
    }

    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(buffer)
}

/// `GET /health`: 200 while nothing is unhealthy, 503 otherwise
pub async fn health_handler(monitor: web::Data<ActorRef<HealthMonitorActor>>) -> impl Responder {
    match monitor.ask(GetSystemHealth).await {
        Ok(health) if health.overall_status.is_unhealthy() => {
            HttpResponse::ServiceUnavailable().json(health)
        }
        Ok(health) => HttpResponse::Ok().json(health),
        Err(e) => {
            tracing::error!(error = ?e, "Health monitor unavailable");
            HttpResponse::ServiceUnavailable().json(serde_json::json!({
                "status": "unhealthy",
                "service": "agua-piatua"
            }))
        }
    }
}
