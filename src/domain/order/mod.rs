// ============================================================================
// Order Domain - Business Logic for the Order Lifecycle
// ============================================================================
//
// This module contains ALL Order-specific code:
// - Value objects (Order, OrderItem, OrderStatus, PaymentMethod)
// - Commands (CreateOrder, AssignOrder, ChangeOrderStatus, ...)
// - Errors (OrderError enum)
// - Coordinator (OrderCoordinator: validation, role rules, persistence, fan-out)
//
// ============================================================================

pub mod value_objects;
pub mod commands;
pub mod errors;
pub mod coordinator;

// Re-export for convenience
pub use value_objects::*;
pub use commands::*;
pub use errors::*;
pub use coordinator::OrderCoordinator;
