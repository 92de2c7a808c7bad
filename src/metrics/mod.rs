// Private module declaration
mod server;

use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry};

// Re-export for public API
pub use server::{health_handler, metrics_handler};

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Provides metrics for:
// - Order creation, rejections and status transitions
// - Notification outcomes and latency per channel
// - Circuit breaker state per notification transport
// - Courier location updates
// - Component health
//
// All metrics are registered with one Prometheus registry scraped via /metrics
// ============================================================================

pub struct Metrics {
    registry: Registry,

    // Order Metrics
    pub orders_created_total: IntCounter,
    pub order_status_transitions_total: IntCounterVec,
    pub order_rejections_total: IntCounterVec,

    // Notification Metrics
    pub notifications_total: IntCounterVec,
    pub notification_duration_seconds: HistogramVec,

    // Circuit Breaker Metrics
    pub circuit_breaker_state: IntGaugeVec,

    // Delivery Metrics
    pub deliveries_location_updates_total: IntCounter,

    // Health Metrics
    pub component_health_status: IntGaugeVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        // Order Metrics
        let orders_created_total = IntCounter::new("orders_created_total", "Total orders created")?;
        registry.register(Box::new(orders_created_total.clone()))?;

        let order_status_transitions_total = IntCounterVec::new(
            Opts::new("order_status_transitions_total", "Order status transitions"),
            &["from", "to"],
        )?;
        registry.register(Box::new(order_status_transitions_total.clone()))?;

        let order_rejections_total = IntCounterVec::new(
            Opts::new("order_rejections_total", "Order operations rejected by business rules"),
            &["reason"],
        )?;
        registry.register(Box::new(order_rejections_total.clone()))?;

        // Notification Metrics
        let notifications_total = IntCounterVec::new(
            Opts::new("notifications_total", "Notification attempts by outcome"),
            &["channel", "event", "outcome"],
        )?;
        registry.register(Box::new(notifications_total.clone()))?;

        let notification_duration_seconds = HistogramVec::new(
            HistogramOpts::new("notification_duration_seconds", "Time spent delivering one notification")
                .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["channel"],
        )?;
        registry.register(Box::new(notification_duration_seconds.clone()))?;

        // Circuit Breaker Metrics
        let circuit_breaker_state = IntGaugeVec::new(
            Opts::new("circuit_breaker_state", "Circuit breaker state (0=Closed, 1=Open, 2=HalfOpen)"),
            &["channel"],
        )?;
        registry.register(Box::new(circuit_breaker_state.clone()))?;

        // Delivery Metrics
        let deliveries_location_updates_total = IntCounter::new(
            "deliveries_location_updates_total",
            "Courier location updates accepted",
        )?;
        registry.register(Box::new(deliveries_location_updates_total.clone()))?;

        // Health Metrics
        let component_health_status = IntGaugeVec::new(
            Opts::new("component_health_status", "Component health (0=Unhealthy, 1=Degraded, 2=Healthy)"),
            &["component"],
        )?;
        registry.register(Box::new(component_health_status.clone()))?;

        Ok(Self {
            registry,
            orders_created_total,
            order_status_transitions_total,
            order_rejections_total,
            notifications_total,
            notification_duration_seconds,
            circuit_breaker_state,
            deliveries_location_updates_total,
            component_health_status,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_order_created(&self) {
        self.orders_created_total.inc();
    }

    pub fn record_transition(&self, from: &str, to: &str) {
        self.order_status_transitions_total.with_label_values(&[from, to]).inc();
    }

    pub fn record_rejection(&self, reason: &str) {
        self.order_rejections_total.with_label_values(&[reason]).inc();
    }

    /// Helper to record one channel's result for one event
    pub fn record_notification(&self, channel: &str, event: &str, outcome: &str, duration_secs: f64) {
        self.notifications_total.with_label_values(&[channel, event, outcome]).inc();
        self.notification_duration_seconds.with_label_values(&[channel]).observe(duration_secs);
    }

    pub fn update_circuit_breaker_state(&self, channel: &str, state: i64) {
        self.circuit_breaker_state.with_label_values(&[channel]).set(state);
    }

    pub fn record_location_update(&self) {
        self.deliveries_location_updates_total.inc();
    }

    pub fn update_component_health(&self, component: &str, status: i64) {
        self.component_health_status.with_label_values(&[component]).set(status);
    }
}
