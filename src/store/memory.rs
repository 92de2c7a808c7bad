use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::delivery::{Delivery, DeliveryStatus};
use crate::domain::order::{Order, OrderStatus};
use crate::models::{Product, Role, User};
use super::{OrderFilter, OrderStore, StatusChange, StoreError, StoreResult, CANCELLED_COMMENT};

// ============================================================================
// In-memory Order Store
// ============================================================================
//
// One mutex guards the whole state, so every trait method is trivially
// atomic. Used by tests and by local runs without a database.
//
// ============================================================================

#[derive(Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    products: HashMap<Uuid, Product>,
    orders: HashMap<Uuid, Order>,
    deliveries: HashMap<Uuid, Delivery>,
}

impl MemoryState {
    fn order_mut(&mut self, id: Uuid) -> StoreResult<&mut Order> {
        self.orders
            .get_mut(&id)
            .ok_or(StoreError::NotFound { entity: "order", id })
    }

    /// Checks the conditions every delivery write shares: the row is still
    /// in `expected` and its order is live.
    fn check_delivery_write(&self, delivery: &Delivery, expected: DeliveryStatus) -> StoreResult<()> {
        let stored = self
            .deliveries
            .get(&delivery.id)
            .ok_or(StoreError::NotFound { entity: "delivery", id: delivery.id })?;
        if stored.status != expected {
            return Err(StoreError::Conflict(format!(
                "delivery {} is {} not {}",
                delivery.id, stored.status, expected
            )));
        }

        let order = self
            .orders
            .get(&delivery.order_id)
            .ok_or(StoreError::NotFound { entity: "order", id: delivery.order_id })?;
        if order.status.is_terminal() {
            return Err(StoreError::Conflict(format!("order {} is {}", order.id, order.status)));
        }
        Ok(())
    }

    fn delivery_id_for_order(&self, order_id: Uuid) -> Option<Uuid> {
        self.deliveries
            .values()
            .find(|d| d.order_id == order_id)
            .map(|d| d.id)
    }
}

#[derive(Default)]
pub struct MemoryOrderStore {
    state: Mutex<MemoryState>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_user(&self, user: User) {
        self.state.lock().await.users.insert(user.id, user);
    }

    pub async fn insert_product(&self, product: Product) {
        self.state.lock().await.products.insert(product.id, product);
    }

    /// Accounts and catalog for running the service without a database.
    pub async fn seed_demo(&self) {
        use rust_decimal::Decimal;

        let users = [
            User::new("Administración", "admin@aguapiatua.local", Role::Admin),
            User::new("Repartidor Demo", "repartidor@aguapiatua.local", Role::Seller),
            User::new("Cliente Demo", "cliente@aguapiatua.local", Role::Customer),
        ];
        let products = [
            Product::new("Botellón 20L", Decimal::new(250, 2), 50),
            Product::new("Recarga 20L", Decimal::new(100, 2), 200),
            Product::new("Paca 12x600ml", Decimal::new(450, 2), 30),
        ];

        for user in users {
            tracing::info!(user_id = %user.id, role = %user.role, email = %user.email, "Seeded demo user");
            self.insert_user(user).await;
        }
        for product in products {
            tracing::info!(product_id = %product.id, name = %product.name, "Seeded demo product");
            self.insert_product(product).await;
        }
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.state.lock().await.users.get(&id).cloned())
    }

    async fn set_push_token(&self, user_id: Uuid, token: Option<String>) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let user = state
            .users
            .get_mut(&user_id)
            .ok_or(StoreError::NotFound { entity: "user", id: user_id })?;
        user.push_token = token;
        Ok(())
    }

    async fn get_product(&self, id: Uuid) -> StoreResult<Option<Product>> {
        Ok(self.state.lock().await.products.get(&id).cloned())
    }

    async fn restock_product(&self, id: Uuid, quantity: i32) -> StoreResult<Product> {
        let mut state = self.state.lock().await;
        let product = state
            .products
            .get_mut(&id)
            .ok_or(StoreError::NotFound { entity: "product", id })?;
        product.stock = product.stock.checked_add(quantity).ok_or(StoreError::StockOverflow {
            product_id: id,
            stock: product.stock,
            added: quantity,
        })?;
        Ok(product.clone())
    }

    async fn insert_order(&self, order: &Order) -> StoreResult<()> {
        let mut state = self.state.lock().await;

        // Check every line before touching anything.
        let mut needed: HashMap<Uuid, i32> = HashMap::new();
        for item in &order.items {
            *needed.entry(item.product_id).or_default() += item.quantity;
        }
        for (product_id, quantity) in &needed {
            let product = state
                .products
                .get(product_id)
                .ok_or(StoreError::NotFound { entity: "product", id: *product_id })?;
            if product.stock < *quantity {
                return Err(StoreError::InsufficientStock {
                    product_id: *product_id,
                    available: product.stock,
                });
            }
        }

        for (product_id, quantity) in needed {
            if let Some(product) = state.products.get_mut(&product_id) {
                product.stock -= quantity;
            }
        }
        state.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> StoreResult<Option<Order>> {
        Ok(self.state.lock().await.orders.get(&id).cloned())
    }

    async fn list_orders(&self, filter: &OrderFilter) -> StoreResult<Vec<Order>> {
        let state = self.state.lock().await;
        let mut orders: Vec<Order> = state
            .orders
            .values()
            .filter(|o| filter.customer_id.map_or(true, |id| o.customer_id == id))
            .filter(|o| match filter.seller_id {
                Some(id) => {
                    o.seller_id == Some(id)
                        || (filter.include_unassigned
                            && o.seller_id.is_none()
                            && o.status == OrderStatus::Pending)
                }
                None => true,
            })
            .filter(|o| filter.status.map_or(true, |s| o.status == s))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn assign_order(&self, order_id: Uuid, delivery: &Delivery) -> StoreResult<Order> {
        let mut state = self.state.lock().await;
        if state.delivery_id_for_order(order_id).is_some() {
            return Err(StoreError::Conflict(format!("order {} already has a delivery", order_id)));
        }

        let order = state.order_mut(order_id)?;
        if order.status != OrderStatus::Pending || order.seller_id.is_some() {
            return Err(StoreError::Conflict(format!("order {} is not assignable", order_id)));
        }
        order.seller_id = Some(delivery.seller_id);
        order.status = OrderStatus::Confirmed;
        let updated = order.clone();

        state.deliveries.insert(delivery.id, delivery.clone());
        Ok(updated)
    }

    async fn update_order_status(&self, order_id: Uuid, change: &StatusChange) -> StoreResult<Order> {
        let mut state = self.state.lock().await;

        let order = state.order_mut(order_id)?;
        if order.status != change.from {
            return Err(StoreError::Conflict(format!(
                "order {} is {} not {}",
                order_id, order.status, change.from
            )));
        }
        order.status = change.to;
        if change.to == OrderStatus::Delivered {
            order.actual_delivery_at = Some(change.at);
        }
        let updated = order.clone();

        if change.restock_items {
            for item in &updated.items {
                if let Some(product) = state.products.get_mut(&item.product_id) {
                    product.stock = product.stock.saturating_add(item.quantity);
                }
            }
        }

        let delivery_id = state.delivery_id_for_order(order_id);
        if let Some(delivery) = delivery_id.and_then(|id| state.deliveries.get_mut(&id)) {
            match change.to {
                OrderStatus::Delivered => {
                    delivery.status = DeliveryStatus::Delivered;
                    delivery.delivered_at = Some(change.at);
                }
                OrderStatus::Cancelled
                    if matches!(delivery.status, DeliveryStatus::Assigned | DeliveryStatus::EnRoute) =>
                {
                    delivery.status = DeliveryStatus::Failed;
                    delivery.comments.get_or_insert_with(|| CANCELLED_COMMENT.to_string());
                }
                _ => {}
            }
        }

        Ok(updated)
    }

    async fn get_delivery(&self, id: Uuid) -> StoreResult<Option<Delivery>> {
        Ok(self.state.lock().await.deliveries.get(&id).cloned())
    }

    async fn get_delivery_for_order(&self, order_id: Uuid) -> StoreResult<Option<Delivery>> {
        let state = self.state.lock().await;
        Ok(state
            .deliveries
            .values()
            .find(|d| d.order_id == order_id)
            .cloned())
    }

    async fn update_delivery(&self, delivery: &Delivery, expected: DeliveryStatus) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        state.check_delivery_write(delivery, expected)?;
        state.deliveries.insert(delivery.id, delivery.clone());
        Ok(())
    }

    async fn complete_delivery(
        &self,
        delivery: &Delivery,
        expected: DeliveryStatus,
    ) -> StoreResult<(Order, OrderStatus)> {
        let mut state = self.state.lock().await;
        state.check_delivery_write(delivery, expected)?;

        let delivered_at = delivery.delivered_at.unwrap_or_else(chrono::Utc::now);
        let order = state.order_mut(delivery.order_id)?;
        let previous = order.status;
        order.status = OrderStatus::Delivered;
        order.actual_delivery_at = Some(delivered_at);
        let updated = order.clone();

        state.deliveries.insert(delivery.id, delivery.clone());
        Ok((updated, previous))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{OrderItem, PaymentMethod, order_total};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn order_for(customer: Uuid, items: Vec<OrderItem>) -> Order {
        Order {
            id: Uuid::new_v4(),
            customer_id: customer,
            seller_id: None,
            total: order_total(&items),
            items,
            status: OrderStatus::Pending,
            delivery_address: "Calle 1".into(),
            contact_phone: None,
            notes: None,
            payment_method: PaymentMethod::Cash,
            payment_proof_ref: None,
            created_at: Utc::now(),
            estimated_delivery_at: None,
            actual_delivery_at: None,
        }
    }

    #[tokio::test]
    async fn test_insert_order_rejects_whole_order_on_short_stock() {
        let store = MemoryOrderStore::new();
        let a = Product::new("A", dec!(2.50), 10);
        let b = Product::new("B", dec!(1.00), 1);
        let (a_id, b_id) = (a.id, b.id);
        store.insert_product(a).await;
        store.insert_product(b).await;

        let order = order_for(
            Uuid::new_v4(),
            vec![
                OrderItem::new(a_id, "A", 2, dec!(2.50)),
                OrderItem::new(b_id, "B", 3, dec!(1.00)),
            ],
        );

        let err = store.insert_order(&order).await.unwrap_err();
        assert!(matches!(err, StoreError::InsufficientStock { available: 1, .. }));
        assert_eq!(store.get_product(a_id).await.unwrap().unwrap().stock, 10);
        assert!(store.get_order(order.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_repeated_product_lines_checked_together() {
        let store = MemoryOrderStore::new();
        let a = Product::new("A", dec!(2.50), 3);
        let a_id = a.id;
        store.insert_product(a).await;

        let order = order_for(
            Uuid::new_v4(),
            vec![
                OrderItem::new(a_id, "A", 2, dec!(2.50)),
                OrderItem::new(a_id, "A", 2, dec!(2.50)),
            ],
        );

        assert!(store.insert_order(&order).await.is_err());
        assert_eq!(store.get_product(a_id).await.unwrap().unwrap().stock, 3);
    }

    #[tokio::test]
    async fn test_assign_twice_conflicts() {
        let store = MemoryOrderStore::new();
        let order = order_for(Uuid::new_v4(), vec![]);
        store.insert_order(&order).await.unwrap();

        let first = Delivery::assigned(order.id, Uuid::new_v4(), Utc::now());
        store.assign_order(order.id, &first).await.unwrap();

        let second = Delivery::assigned(order.id, Uuid::new_v4(), Utc::now());
        let err = store.assign_order(order.id, &second).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_stale_status_change_conflicts() {
        let store = MemoryOrderStore::new();
        let order = order_for(Uuid::new_v4(), vec![]);
        store.insert_order(&order).await.unwrap();

        let change = StatusChange {
            from: OrderStatus::Confirmed,
            to: OrderStatus::EnRoute,
            at: Utc::now(),
            restock_items: false,
        };
        let err = store.update_order_status(order.id, &change).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    async fn assigned(store: &MemoryOrderStore) -> (Order, Delivery) {
        let order = order_for(Uuid::new_v4(), vec![]);
        store.insert_order(&order).await.unwrap();
        let delivery = Delivery::assigned(order.id, Uuid::new_v4(), Utc::now());
        let order = store.assign_order(order.id, &delivery).await.unwrap();
        (order, delivery)
    }

    #[tokio::test]
    async fn test_stale_delivery_write_does_not_undo_delivered_cascade() {
        let store = MemoryOrderStore::new();
        let (order, delivery) = assigned(&store).await;

        // A courier read the delivery before the order was marked delivered.
        let mut stale = store.get_delivery(delivery.id).await.unwrap().unwrap();
        let change = StatusChange {
            from: OrderStatus::Confirmed,
            to: OrderStatus::Delivered,
            at: Utc::now(),
            restock_items: false,
        };
        store.update_order_status(order.id, &change).await.unwrap();

        stale.status = DeliveryStatus::EnRoute;
        let err = store.update_delivery(&stale, DeliveryStatus::Assigned).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let stored = store.get_delivery(delivery.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DeliveryStatus::Delivered);
        assert_eq!(stored.delivered_at, Some(change.at));
    }

    #[tokio::test]
    async fn test_cancelling_order_fails_open_delivery() {
        let store = MemoryOrderStore::new();
        let (order, delivery) = assigned(&store).await;

        let change = StatusChange {
            from: OrderStatus::Confirmed,
            to: OrderStatus::Cancelled,
            at: Utc::now(),
            restock_items: false,
        };
        store.update_order_status(order.id, &change).await.unwrap();

        let stored = store.get_delivery(delivery.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DeliveryStatus::Failed);
        assert_eq!(stored.comments.as_deref(), Some(CANCELLED_COMMENT));

        let err = store.update_delivery(&stored, DeliveryStatus::Failed).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_restock_overflow_leaves_stock_unchanged() {
        let store = MemoryOrderStore::new();
        let product = Product::new("A", dec!(2.50), 10);
        let id = product.id;
        store.insert_product(product).await;

        let err = store.restock_product(id, i32::MAX).await.unwrap_err();
        assert!(matches!(err, StoreError::StockOverflow { stock: 10, .. }));
        assert_eq!(store.get_product(id).await.unwrap().unwrap().stock, 10);
    }
}
