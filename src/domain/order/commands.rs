use serde::Deserialize;
use uuid::Uuid;
use rust_decimal::Decimal;

use super::value_objects::{OrderStatus, PaymentMethod};

// ============================================================================
// Order Commands - Represent caller intent
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct OrderLine {
    pub product_id: Uuid,
    pub quantity: i32,
    /// Price the client displayed. Checked against the catalog when present.
    #[serde(default)]
    pub unit_price: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrder {
    pub items: Vec<OrderLine>,
    pub delivery_address: String,
    #[serde(default)]
    pub contact_phone: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub payment_proof_ref: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssignOrder {
    pub seller_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangeOrderStatus {
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RestockProduct {
    pub quantity: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterPushToken {
    /// Empty or missing clears the stored token.
    #[serde(default)]
    pub token: Option<String>,
}
