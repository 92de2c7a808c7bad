use serde::Deserialize;

use super::value_objects::DeliveryStatus;

// ============================================================================
// Delivery Commands - Courier updates
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateLocation {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangeDeliveryStatus {
    pub status: DeliveryStatus,
    #[serde(default)]
    pub comments: Option<String>,
}
