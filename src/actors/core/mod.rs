// ============================================================================
// Core Actor Abstractions
// ============================================================================
//
// Health types and the probes infrastructure actors poll.
//
// ============================================================================

pub mod health;

// Re-export core types
pub use health::*;
