// ============================================================================
// Order Store - Persistence interface
// ============================================================================
//
// Every method that touches more than one row is atomic: callers never
// observe an order without its items, a stock decrement without its order,
// or a delivered delivery whose order is not delivered.
//
// ============================================================================

mod memory;
mod postgres;

pub use memory::MemoryOrderStore;
pub use postgres::PostgresOrderStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::delivery::{Delivery, DeliveryStatus};
use crate::domain::order::{Order, OrderStatus};
use crate::models::{Product, User};

pub type StoreResult<T> = Result<T, StoreError>;

/// Comment left on an open delivery when its order is cancelled.
pub const CANCELLED_COMMENT: &str = "Order cancelled";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("insufficient stock for product {product_id}: {available} available")]
    InsufficientStock { product_id: Uuid, available: i32 },

    #[error("conflicting update: {0}")]
    Conflict(String),

    #[error("restocking product {product_id} by {added} would overflow its stock of {stock}")]
    StockOverflow { product_id: Uuid, stock: i32, added: i32 },

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Requested status change on an order, applied only if the order is still
/// in `from` when the write happens.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub at: DateTime<Utc>,
    /// Put the order's item quantities back on the shelf.
    pub restock_items: bool,
}

/// Which orders a listing returns.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub customer_id: Option<Uuid>,
    /// Orders assigned to this seller, plus unassigned pending orders
    /// when `include_unassigned` is set.
    pub seller_id: Option<Uuid>,
    pub include_unassigned: bool,
    pub status: Option<OrderStatus>,
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn ping(&self) -> StoreResult<()>;

    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>>;

    /// `None` clears the token.
    async fn set_push_token(&self, user_id: Uuid, token: Option<String>) -> StoreResult<()>;

    async fn get_product(&self, id: Uuid) -> StoreResult<Option<Product>>;

    async fn restock_product(&self, id: Uuid, quantity: i32) -> StoreResult<Product>;

    /// Writes the order, its items and every stock decrement, or nothing.
    /// A line whose product no longer has enough stock fails the whole write
    /// with `InsufficientStock`.
    async fn insert_order(&self, order: &Order) -> StoreResult<()>;

    async fn get_order(&self, id: Uuid) -> StoreResult<Option<Order>>;

    async fn list_orders(&self, filter: &OrderFilter) -> StoreResult<Vec<Order>>;

    /// Sets the seller, confirms the order and creates its delivery, only if
    /// the order is still pending and unassigned (`Conflict` otherwise).
    async fn assign_order(&self, order_id: Uuid, delivery: &Delivery) -> StoreResult<Order>;

    /// Moving to `Delivered` stamps the order and its delivery together.
    /// Moving to `Cancelled` fails a delivery that is still open.
    async fn update_order_status(&self, order_id: Uuid, change: &StatusChange) -> StoreResult<Order>;

    async fn get_delivery(&self, id: Uuid) -> StoreResult<Option<Delivery>>;

    async fn get_delivery_for_order(&self, order_id: Uuid) -> StoreResult<Option<Delivery>>;

    /// Saves `delivery` only while the stored row is still in `expected`
    /// and its order is neither delivered nor cancelled (`Conflict` otherwise).
    async fn update_delivery(&self, delivery: &Delivery, expected: DeliveryStatus) -> StoreResult<()>;

    /// Saves a delivered delivery and marks its order delivered in the same
    /// write, under the same conditions as `update_delivery`. Returns the
    /// order and the status it had before.
    async fn complete_delivery(
        &self,
        delivery: &Delivery,
        expected: DeliveryStatus,
    ) -> StoreResult<(Order, OrderStatus)>;
}
