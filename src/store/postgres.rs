use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::delivery::{Delivery, DeliveryStatus, Location};
use crate::domain::order::{Order, OrderItem, OrderStatus};
use crate::models::{Product, User};
use super::{OrderFilter, OrderStore, StatusChange, StoreError, StoreResult, CANCELLED_COMMENT};

// ============================================================================
// Postgres Order Store
// ============================================================================
//
// Multi-row writes run in one transaction. A dropped transaction rolls back,
// so every early `?` return leaves the database untouched.
//
// Stock is only changed by single conditional UPDATE statements; Postgres row
// locks serialize concurrent orders for the same product.
//
// ============================================================================

const USER_COLUMNS: &str =
    "id, name, email, role, phone, address, active, push_token, created_at";

const PRODUCT_COLUMNS: &str =
    "id, name, description, price, stock, image_ref, category, active";

const ORDER_COLUMNS: &str =
    "id, customer_id, seller_id, total, status, delivery_address, contact_phone, notes, \
     payment_method, payment_proof_ref, created_at, estimated_delivery_at, actual_delivery_at";

const DELIVERY_COLUMNS: &str =
    "id, order_id, seller_id, status, latitude, longitude, location_label, comments, \
     assigned_at, started_at, delivered_at";

pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        tracing::info!(max_connections, "Connected to Postgres");
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("Database migrations applied");
        Ok(())
    }

    /// Tells a missing delivery apart from one whose guarded write lost.
    async fn rejected_delivery_write(&self, delivery: &Delivery, expected: DeliveryStatus) -> StoreError {
        match self.get_delivery(delivery.id).await {
            Ok(Some(stored)) => StoreError::Conflict(format!(
                "delivery {} is {} (expected {}) or its order is closed",
                delivery.id, stored.status, expected
            )),
            Ok(None) => StoreError::NotFound { entity: "delivery", id: delivery.id },
            Err(e) => e,
        }
    }

    async fn load_orders(&self, rows: Vec<OrderRow>) -> StoreResult<Vec<Order>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let items = sqlx::query_as::<_, ItemRow>(
            "SELECT order_id, product_id, product_name, quantity, unit_price, subtotal
             FROM order_items
             WHERE order_id = ANY($1)
             ORDER BY order_id, line_no",
        )
        .bind(&ids[..])
        .fetch_all(&self.pool)
        .await?;

        let mut by_order: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for item in items {
            by_order.entry(item.order_id).or_default().push(item.into());
        }

        rows.into_iter()
            .map(|row| {
                let items = by_order.remove(&row.id).unwrap_or_default();
                row.into_order(items)
            })
            .collect()
    }

    async fn fetch_order(&self, id: Uuid) -> StoreResult<Order> {
        self.get_order(id)
            .await?
            .ok_or(StoreError::NotFound { entity: "order", id })
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    async fn set_push_token(&self, user_id: Uuid, token: Option<String>) -> StoreResult<()> {
        let result = sqlx::query("UPDATE users SET push_token = $2 WHERE id = $1")
            .bind(user_id)
            .bind(token)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { entity: "user", id: user_id });
        }
        Ok(())
    }

    async fn get_product(&self, id: Uuid) -> StoreResult<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {} FROM products WHERE id = $1",
            PRODUCT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Product::from))
    }

    async fn restock_product(&self, id: Uuid, quantity: i32) -> StoreResult<Product> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "UPDATE products SET stock = stock + $2
             WHERE id = $1 AND stock <= 2147483647 - $2
             RETURNING {}",
            PRODUCT_COLUMNS
        ))
        .bind(id)
        .bind(quantity)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return Ok(Product::from(row));
        }
        match self.get_product(id).await? {
            Some(product) => Err(StoreError::StockOverflow {
                product_id: id,
                stock: product.stock,
                added: quantity,
            }),
            None => Err(StoreError::NotFound { entity: "product", id }),
        }
    }

    async fn insert_order(&self, order: &Order) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO orders (
                id, customer_id, seller_id, total, status, delivery_address, contact_phone,
                notes, payment_method, payment_proof_ref, created_at, estimated_delivery_at,
                actual_delivery_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(order.id)
        .bind(order.customer_id)
        .bind(order.seller_id)
        .bind(order.total)
        .bind(order.status.as_str())
        .bind(&order.delivery_address)
        .bind(&order.contact_phone)
        .bind(&order.notes)
        .bind(order.payment_method.as_str())
        .bind(&order.payment_proof_ref)
        .bind(order.created_at)
        .bind(order.estimated_delivery_at)
        .bind(order.actual_delivery_at)
        .execute(&mut *tx)
        .await?;

        for (line_no, item) in order.items.iter().enumerate() {
            let decremented = sqlx::query(
                "UPDATE products SET stock = stock - $2 WHERE id = $1 AND stock >= $2",
            )
            .bind(item.product_id)
            .bind(item.quantity)
            .execute(&mut *tx)
            .await?;

            if decremented.rows_affected() == 0 {
                let available: Option<(i32,)> =
                    sqlx::query_as("SELECT stock FROM products WHERE id = $1")
                        .bind(item.product_id)
                        .fetch_optional(&mut *tx)
                        .await?;

                return match available {
                    Some((available,)) => Err(StoreError::InsufficientStock {
                        product_id: item.product_id,
                        available,
                    }),
                    None => Err(StoreError::NotFound { entity: "product", id: item.product_id }),
                };
            }

            sqlx::query(
                "INSERT INTO order_items (
                    order_id, line_no, product_id, product_name, quantity, unit_price, subtotal
                ) VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(order.id)
            .bind(line_no as i32)
            .bind(item.product_id)
            .bind(&item.product_name)
            .bind(item.quantity)
            .bind(item.unit_price)
            .bind(item.subtotal)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::debug!(
            order_id = %order.id,
            item_count = order.items.len(),
            "Order, items and stock decrements committed"
        );
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> StoreResult<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM orders WHERE id = $1",
            ORDER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(self.load_orders(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list_orders(&self, filter: &OrderFilter) -> StoreResult<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM orders
             WHERE ($1::uuid IS NULL OR customer_id = $1)
               AND ($2::uuid IS NULL
                    OR seller_id = $2
                    OR ($3 AND seller_id IS NULL AND status = 'pending'))
               AND ($4::text IS NULL OR status = $4)
             ORDER BY created_at DESC",
            ORDER_COLUMNS
        ))
        .bind(filter.customer_id)
        .bind(filter.seller_id)
        .bind(filter.include_unassigned)
        .bind(filter.status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;

        self.load_orders(rows).await
    }

    async fn assign_order(&self, order_id: Uuid, delivery: &Delivery) -> StoreResult<Order> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE orders SET seller_id = $2, status = 'confirmed'
             WHERE id = $1 AND status = 'pending' AND seller_id IS NULL",
        )
        .bind(order_id)
        .bind(delivery.seller_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!("order {} is not assignable", order_id)));
        }

        sqlx::query(
            "INSERT INTO deliveries (id, order_id, seller_id, status, assigned_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(delivery.id)
        .bind(delivery.order_id)
        .bind(delivery.seller_id)
        .bind(delivery.status.as_str())
        .bind(delivery.assigned_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        self.fetch_order(order_id).await
    }

    async fn update_order_status(&self, order_id: Uuid, change: &StatusChange) -> StoreResult<Order> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE orders
             SET status = $3,
                 actual_delivery_at = CASE WHEN $3 = 'delivered' THEN $4 ELSE actual_delivery_at END
             WHERE id = $1 AND status = $2",
        )
        .bind(order_id)
        .bind(change.from.as_str())
        .bind(change.to.as_str())
        .bind(change.at)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            let exists: Option<(String,)> = sqlx::query_as("SELECT status FROM orders WHERE id = $1")
                .bind(order_id)
                .fetch_optional(&mut *tx)
                .await?;
            return match exists {
                Some((status,)) => Err(StoreError::Conflict(format!(
                    "order {} is {} not {}",
                    order_id, status, change.from
                ))),
                None => Err(StoreError::NotFound { entity: "order", id: order_id }),
            };
        }

        if change.restock_items {
            sqlx::query(
                "UPDATE products p SET stock = p.stock + q.quantity
                 FROM (
                     SELECT product_id, SUM(quantity)::int4 AS quantity
                     FROM order_items WHERE order_id = $1
                     GROUP BY product_id
                 ) q
                 WHERE p.id = q.product_id",
            )
            .bind(order_id)
            .execute(&mut *tx)
            .await?;
        }

        if change.to == OrderStatus::Delivered {
            sqlx::query(
                "UPDATE deliveries SET status = 'delivered', delivered_at = $2
                 WHERE order_id = $1 AND status <> 'delivered'",
            )
            .bind(order_id)
            .bind(change.at)
            .execute(&mut *tx)
            .await?;
        }

        if change.to == OrderStatus::Cancelled {
            sqlx::query(
                "UPDATE deliveries SET status = 'failed', comments = COALESCE(comments, $2)
                 WHERE order_id = $1 AND status IN ('assigned', 'en_route')",
            )
            .bind(order_id)
            .bind(CANCELLED_COMMENT)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        self.fetch_order(order_id).await
    }

    async fn get_delivery(&self, id: Uuid) -> StoreResult<Option<Delivery>> {
        let row = sqlx::query_as::<_, DeliveryRow>(&format!(
            "SELECT {} FROM deliveries WHERE id = $1",
            DELIVERY_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Delivery::try_from).transpose()
    }

    async fn get_delivery_for_order(&self, order_id: Uuid) -> StoreResult<Option<Delivery>> {
        let row = sqlx::query_as::<_, DeliveryRow>(&format!(
            "SELECT {} FROM deliveries WHERE order_id = $1",
            DELIVERY_COLUMNS
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Delivery::try_from).transpose()
    }

    async fn update_delivery(&self, delivery: &Delivery, expected: DeliveryStatus) -> StoreResult<()> {
        if write_delivery(&self.pool, delivery, expected).await? == 0 {
            return Err(self.rejected_delivery_write(delivery, expected).await);
        }
        Ok(())
    }

    async fn complete_delivery(
        &self,
        delivery: &Delivery,
        expected: DeliveryStatus,
    ) -> StoreResult<(Order, OrderStatus)> {
        let mut tx = self.pool.begin().await?;
        let delivered_at = delivery.delivered_at.unwrap_or_else(Utc::now);

        let current: Option<(String,)> =
            sqlx::query_as("SELECT status FROM orders WHERE id = $1 FOR UPDATE")
                .bind(delivery.order_id)
                .fetch_optional(&mut *tx)
                .await?;
        let previous = match current {
            Some((status,)) => parse_column::<OrderStatus>(&status)?,
            None => return Err(StoreError::NotFound { entity: "order", id: delivery.order_id }),
        };

        if previous.is_terminal() {
            return Err(StoreError::Conflict(format!("order {} is {}", delivery.order_id, previous)));
        }

        if write_delivery(&mut *tx, delivery, expected).await? == 0 {
            drop(tx);
            return Err(self.rejected_delivery_write(delivery, expected).await);
        }

        sqlx::query(
            "UPDATE orders SET status = 'delivered', actual_delivery_at = $2 WHERE id = $1",
        )
        .bind(delivery.order_id)
        .bind(delivered_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        let order = self.fetch_order(delivery.order_id).await?;
        Ok((order, previous))
    }
}

/// Writes `delivery` only while the row is still in `expected` and its order
/// is live. Returns the number of rows written.
async fn write_delivery<'e, E>(executor: E, delivery: &Delivery, expected: DeliveryStatus) -> StoreResult<u64>
where
    E: sqlx::postgres::PgExecutor<'e>,
{
    let (latitude, longitude, label) = match &delivery.location {
        Some(loc) => (Some(loc.latitude), Some(loc.longitude), loc.label.clone()),
        None => (None, None, None),
    };

    let result = sqlx::query(
        "UPDATE deliveries d
         SET status = $2, latitude = $3, longitude = $4, location_label = $5,
             comments = $6, started_at = $7, delivered_at = $8
         FROM orders o
         WHERE d.id = $1 AND d.status = $9
           AND o.id = d.order_id AND o.status NOT IN ('delivered', 'cancelled')",
    )
    .bind(delivery.id)
    .bind(delivery.status.as_str())
    .bind(latitude)
    .bind(longitude)
    .bind(label)
    .bind(&delivery.comments)
    .bind(delivery.started_at)
    .bind(delivery.delivered_at)
    .bind(expected.as_str())
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

fn parse_column<T: std::str::FromStr<Err = String>>(value: &str) -> StoreResult<T> {
    value.parse::<T>().map_err(StoreError::Corrupt)
}

// ============================================================================
// Row types
// ============================================================================

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    email: String,
    role: String,
    phone: Option<String>,
    address: Option<String>,
    active: bool,
    push_token: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: row.id,
            name: row.name,
            email: row.email,
            role: parse_column(&row.role)?,
            phone: row.phone,
            address: row.address,
            active: row.active,
            push_token: row.push_token,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    name: String,
    description: String,
    price: Decimal,
    stock: i32,
    image_ref: Option<String>,
    category: String,
    active: bool,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: row.id,
            name: row.name,
            description: row.description,
            price: row.price,
            stock: row.stock,
            image_ref: row.image_ref,
            category: row.category,
            active: row.active,
        }
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    customer_id: Uuid,
    seller_id: Option<Uuid>,
    total: Decimal,
    status: String,
    delivery_address: String,
    contact_phone: Option<String>,
    notes: Option<String>,
    payment_method: String,
    payment_proof_ref: Option<String>,
    created_at: DateTime<Utc>,
    estimated_delivery_at: Option<DateTime<Utc>>,
    actual_delivery_at: Option<DateTime<Utc>>,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> StoreResult<Order> {
        Ok(Order {
            id: self.id,
            customer_id: self.customer_id,
            seller_id: self.seller_id,
            items,
            total: self.total,
            status: parse_column(&self.status)?,
            delivery_address: self.delivery_address,
            contact_phone: self.contact_phone,
            notes: self.notes,
            payment_method: parse_column(&self.payment_method)?,
            payment_proof_ref: self.payment_proof_ref,
            created_at: self.created_at,
            estimated_delivery_at: self.estimated_delivery_at,
            actual_delivery_at: self.actual_delivery_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ItemRow {
    order_id: Uuid,
    product_id: Uuid,
    product_name: String,
    quantity: i32,
    unit_price: Decimal,
    subtotal: Decimal,
}

impl From<ItemRow> for OrderItem {
    fn from(row: ItemRow) -> Self {
        OrderItem {
            product_id: row.product_id,
            product_name: row.product_name,
            quantity: row.quantity,
            unit_price: row.unit_price,
            subtotal: row.subtotal,
        }
    }
}

#[derive(sqlx::FromRow)]
struct DeliveryRow {
    id: Uuid,
    order_id: Uuid,
    seller_id: Uuid,
    status: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    location_label: Option<String>,
    comments: Option<String>,
    assigned_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
}

impl TryFrom<DeliveryRow> for Delivery {
    type Error = StoreError;

    fn try_from(row: DeliveryRow) -> Result<Self, Self::Error> {
        let location = match (row.latitude, row.longitude) {
            (Some(latitude), Some(longitude)) => Some(Location {
                latitude,
                longitude,
                label: row.location_label,
            }),
            _ => None,
        };

        Ok(Delivery {
            id: row.id,
            order_id: row.order_id,
            seller_id: row.seller_id,
            status: parse_column(&row.status)?,
            location,
            comments: row.comments,
            assigned_at: row.assigned_at,
            started_at: row.started_at,
            delivered_at: row.delivered_at,
        })
    }
}
