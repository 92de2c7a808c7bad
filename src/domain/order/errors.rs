use uuid::Uuid;
use rust_decimal::Decimal;

use crate::store::StoreError;
use super::value_objects::OrderStatus;

// ============================================================================
// Order Business Rule Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Order items cannot be empty")]
    EmptyItems,

    #[error("Invalid quantity {quantity} for product {product_id}")]
    InvalidQuantity { product_id: Uuid, quantity: i32 },

    #[error("Delivery address cannot be empty")]
    MissingAddress,

    #[error("Product not found: {0}")]
    ProductNotFound(Uuid),

    #[error("Insufficient stock for {product}: {available} available, {requested} requested")]
    InsufficientStock {
        product: String,
        available: i32,
        requested: i32,
    },

    #[error("Price for {product} changed: current price is {current}, order used {provided}")]
    PriceMismatch {
        product: String,
        current: Decimal,
        provided: Decimal,
    },

    #[error("Order not found: {0}")]
    NotFound(Uuid),

    #[error("Order {order_id} cannot be assigned in status {status} or is already assigned")]
    OrderNotAssignable { order_id: Uuid, status: OrderStatus },

    #[error("User {0} is not an active seller")]
    InvalidSeller(Uuid),

    #[error("Restock quantity must be positive, got {0}")]
    InvalidRestock(i32),

    #[error("Adding {added} to product {product_id} would exceed the stock limit ({stock} in stock)")]
    StockLimit { product_id: Uuid, stock: i32, added: i32 },

    #[error("{0}")]
    Forbidden(String),

    #[error("Cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Order {0} was modified concurrently")]
    ConcurrentUpdate(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl OrderError {
    pub fn forbidden(message: impl Into<String>) -> Self {
        OrderError::Forbidden(message.into())
    }

    /// Short label for the rejection counter.
    pub fn reason(&self) -> &'static str {
        match self {
            OrderError::EmptyItems
            | OrderError::InvalidQuantity { .. }
            | OrderError::MissingAddress
            | OrderError::InvalidRestock(_)
            | OrderError::StockLimit { .. } => "validation",
            OrderError::ProductNotFound(_) => "product_not_found",
            OrderError::InsufficientStock { .. } => "insufficient_stock",
            OrderError::PriceMismatch { .. } => "price_mismatch",
            OrderError::NotFound(_) => "not_found",
            OrderError::OrderNotAssignable { .. } => "not_assignable",
            OrderError::InvalidSeller(_) => "invalid_seller",
            OrderError::Forbidden(_) => "forbidden",
            OrderError::InvalidTransition { .. } => "invalid_transition",
            OrderError::ConcurrentUpdate(_) => "concurrent_update",
            OrderError::Store(_) => "persistence",
        }
    }
}
