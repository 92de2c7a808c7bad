// ============================================================================
// Delivery Domain - Courier-side record of one order's trip
// ============================================================================
//
// - Value objects (Delivery, DeliveryStatus, Location)
// - Commands (UpdateLocation, ChangeDeliveryStatus)
// - Errors (DeliveryError enum)
// - Tracker (DeliveryTracker: ownership rules, location, order sync)
//
// ============================================================================

pub mod value_objects;
pub mod commands;
pub mod errors;
pub mod tracker;

pub use value_objects::*;
pub use commands::*;
pub use errors::*;
pub use tracker::DeliveryTracker;
