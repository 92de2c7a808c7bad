// ============================================================================
// Actors Module
// ============================================================================
//
// Actor-based infrastructure for asynchronous, concurrent operations.
//
// Structure:
// - core/           - Health types and probes (HealthCheckable)
// - infrastructure/ - Concrete infrastructure actors (Health, NotificationHub)
//
// Note: Order and delivery logic lives in the domain services, NOT actors.
//       Actors are reserved for infrastructure concerns only.
//
// ============================================================================

// Private module declarations
mod core;
mod infrastructure;

pub use core::{BreakerProbe, ComponentHealth, HealthCheckable, HealthStatus, StoreProbe};
pub use infrastructure::{
    ws_connect,
    GetSystemHealth,
    HealthMonitorActor,
    NotificationHub,
    Publish,
    SessionCount,
    SystemHealth,
    UpdateHealth,
};
