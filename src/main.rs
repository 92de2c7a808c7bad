use actix::Actor as _;
use actix_web::{web, App, HttpServer};
use kameo::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod actors;
mod api;
mod config;
mod domain;
mod messaging;
mod metrics;
mod models;
mod notifications;
mod store;
mod utils;

use actors::{
    BreakerProbe, ComponentHealth, HealthMonitorActor, HealthStatus, NotificationHub, StoreProbe, UpdateHealth,
};
use api::AppState;
use config::Config;
use domain::delivery::DeliveryTracker;
use domain::order::OrderCoordinator;
use messaging::{FcmClient, HttpMailer, WhatsAppClient};
use notifications::{
    EmailChannel, NotificationDispatcher, OutcomeReporter, PushChannel, WebsocketChannel, WhatsAppChannel,
};
use store::{MemoryOrderStore, OrderStore, PostgresOrderStore};
use utils::CircuitBreakerConfig;

const DEFAULT_CONFIG_PATH: &str = "config/default.yaml";

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional; real deployments set the environment directly
    let _ = dotenvy::dotenv();

    // Initialize structured logging with environment-based filtering
    // Default to INFO level, can be overridden with RUST_LOG env var
    // Example: RUST_LOG=debug cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,agua_piatua=debug"))
        )
        .init();

    tracing::info!("🚀 Starting Agua Piatua order service");

    let config_path = std::env::var("AGUA_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load(&config_path)?;

    // === 1. Order Store ===
    let store: Arc<dyn OrderStore> = match config.database.url.as_deref() {
        Some(url) => {
            tracing::info!("Connecting to Postgres...");
            let postgres = PostgresOrderStore::connect(url, config.database.max_connections).await?;
            postgres.migrate().await?;
            Arc::new(postgres)
        }
        None => {
            tracing::warn!("No DATABASE_URL configured, using the in-memory store (data is lost on restart)");
            let memory = MemoryOrderStore::new();
            if config.database.seed_demo_data {
                memory.seed_demo().await;
            }
            Arc::new(memory)
        }
    };

    // === 2. Initialize Prometheus metrics ===
    let metrics = Arc::new(metrics::Metrics::new()?);
    tracing::info!("📊 Metrics registry created with {} metrics", metrics.registry().gather().len());

    // === 3. Websocket hub ===
    let hub = NotificationHub::new().start();

    // === 4. Notification channels and health probes ===
    let notifications = &config.notifications;
    let timeout = notifications.request_timeout();
    let breaker = CircuitBreakerConfig::from(&notifications.circuit_breaker);

    let mut dispatcher = NotificationDispatcher::new(OutcomeReporter::new(metrics.clone()));
    let check_interval = Duration::from_secs(config.health.check_interval_secs.max(1));
    let mut monitor = HealthMonitorActor::new(check_interval, Some(metrics.clone()))
        .with_probe(Arc::new(StoreProbe::new(store.clone())));
    let mut disabled: Vec<ComponentHealth> = Vec::new();

    match notifications.email.as_ref().map(|cfg| HttpMailer::new(cfg, timeout, breaker.clone())) {
        Some(Ok(mailer)) => {
            monitor = monitor.with_probe(Arc::new(BreakerProbe::new(mailer.circuit_breaker().clone(), Some(metrics.clone()))));
            dispatcher = dispatcher.with_channel(Arc::new(EmailChannel::new(
                Arc::new(mailer),
                notifications.admin_email.clone(),
            )));
        }
        Some(Err(e)) => {
            tracing::error!(error = %e, "Email transport failed to initialize, email notifications disabled");
            disabled.push(ComponentHealth::new("email", HealthStatus::Degraded(e.to_string())));
        }
        None => tracing::warn!("Email transport not configured, email notifications disabled"),
    }

    match notifications.whatsapp.as_ref().map(|cfg| WhatsAppClient::new(cfg, timeout, breaker.clone())) {
        Some(Ok(client)) => {
            monitor = monitor.with_probe(Arc::new(BreakerProbe::new(client.circuit_breaker().clone(), Some(metrics.clone()))));
            dispatcher = dispatcher.with_channel(Arc::new(WhatsAppChannel::new(
                Arc::new(client),
                notifications.admin_phone.clone(),
            )));
        }
        Some(Err(e)) => {
            tracing::error!(error = %e, "WhatsApp transport failed to initialize, WhatsApp notifications disabled");
            disabled.push(ComponentHealth::new("whatsapp", HealthStatus::Degraded(e.to_string())));
        }
        None => tracing::warn!("WhatsApp transport not configured, WhatsApp notifications disabled"),
    }

    // Push stays registered either way: without a transport it reports
    // every send as skipped until the process restarts.
    let push = match notifications.push.as_ref().map(|cfg| FcmClient::new(cfg, timeout, breaker.clone())) {
        Some(Ok(client)) => {
            monitor = monitor.with_probe(Arc::new(BreakerProbe::new(client.circuit_breaker().clone(), Some(metrics.clone()))));
            PushChannel::new(Arc::new(client))
        }
        Some(Err(e)) => {
            tracing::error!(error = %e, "Push transport failed to initialize, push notifications disabled");
            disabled.push(ComponentHealth::new("push", HealthStatus::Degraded(e.to_string())));
            PushChannel::unavailable()
        }
        None => {
            tracing::warn!("Push transport not configured, push notifications disabled");
            PushChannel::unavailable()
        }
    };
    dispatcher = dispatcher
        .with_channel(Arc::new(push))
        .with_channel(Arc::new(WebsocketChannel::new(Arc::new(hub.clone()))));
    tracing::info!(channels = ?dispatcher.channel_names(), "Notification fan-out ready");

    // === 5. Health monitor ===
    let monitor = HealthMonitorActor::spawn(monitor);
    for health in disabled {
        if let Err(e) = monitor.tell(UpdateHealth { health }).await {
            tracing::warn!(error = ?e, "Failed to report disabled transport");
        }
    }

    // === 6. Domain services ===
    let orders = OrderCoordinator::new(store.clone(), dispatcher.clone(), config.orders.clone())
        .with_metrics(metrics.clone());
    let deliveries = DeliveryTracker::new(store.clone(), dispatcher).with_metrics(metrics.clone());
    let state = web::Data::new(AppState::new(store, orders, deliveries));

    // === 7. HTTP server ===
    let address = config.server.address.clone();
    tracing::info!("🌐 Listening on http://{}", address);

    let metrics_data = web::Data::new(metrics);
    let monitor_data = web::Data::new(monitor);
    let hub_data = web::Data::new(hub);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .app_data(metrics_data.clone())
            .app_data(monitor_data.clone())
            .app_data(hub_data.clone())
            .configure(api::configure)
            .route("/ws", web::get().to(actors::ws_connect))
            .route("/health", web::get().to(metrics::health_handler))
            .route("/metrics", web::get().to(metrics::metrics_handler))
    })
    .bind(&address)?
    .run()
    .await?;

    tracing::info!("👋 Server stopped");
    Ok(())
}
