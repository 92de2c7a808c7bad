// ============================================================================
// Infrastructure Actors
// ============================================================================
//
// Actors for system concerns:
// - Health monitoring (kameo)
// - Websocket session registry and broadcast (actix)
//
// ============================================================================

// Private module declarations
mod health_monitor;
mod notification_hub;
mod ws_session;

// Re-export for public API
pub use health_monitor::{HealthMonitorActor, UpdateHealth, GetSystemHealth, SystemHealth};
pub use notification_hub::{NotificationHub, Publish, SessionCount};
pub use ws_session::ws_connect;
