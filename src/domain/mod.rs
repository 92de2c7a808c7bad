// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// Each area has its own subdirectory with:
// - Value objects
// - Commands
// - Errors
// - The service that applies the business rules
//
// Persistence goes through `crate::store::OrderStore`; side effects leave
// through `crate::notifications`.
//
// ============================================================================

pub mod order;
pub mod delivery;

#[cfg(test)]
pub(crate) mod testing;
