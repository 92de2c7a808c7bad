use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::OrderSettings;
use crate::domain::delivery::Delivery;
use crate::metrics::Metrics;
use crate::models::{Product, Role, User};
use crate::notifications::{NotificationDispatcher, OrderNotification};
use crate::store::{OrderFilter, OrderStore, StatusChange, StoreError};

use super::commands::{AssignOrder, ChangeOrderStatus, CreateOrder, RestockProduct};
use super::errors::OrderError;
use super::value_objects::{order_total, Order, OrderItem, OrderStatus};

// ============================================================================
// Order Lifecycle Coordinator
// ============================================================================
//
// Orchestrates: request → business rules → Order Store → notification fan-out
//
// Notifications are launched after the write commits and are never awaited;
// nothing a channel does can change the result returned here.
//
// ============================================================================

pub struct OrderCoordinator {
    store: Arc<dyn OrderStore>,
    notifier: NotificationDispatcher,
    metrics: Option<Arc<Metrics>>,
    settings: OrderSettings,
}

impl OrderCoordinator {
    pub fn new(store: Arc<dyn OrderStore>, notifier: NotificationDispatcher, settings: OrderSettings) -> Self {
        Self {
            store,
            notifier,
            metrics: None,
            settings,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Places an order for `actor`, snapshotting catalog prices and taking
    /// the stock in the same write.
    pub async fn create(&self, actor: &User, command: CreateOrder) -> Result<Order, OrderError> {
        self.try_create(actor, command)
            .await
            .inspect_err(|e| self.rejected("create", e))
    }

    async fn try_create(&self, actor: &User, command: CreateOrder) -> Result<Order, OrderError> {
        if !matches!(actor.role, Role::Customer | Role::Admin) {
            return Err(OrderError::forbidden("Only customers and admins can place orders"));
        }
        if command.items.is_empty() {
            return Err(OrderError::EmptyItems);
        }
        if let Some(line) = command.items.iter().find(|line| line.quantity <= 0) {
            return Err(OrderError::InvalidQuantity {
                product_id: line.product_id,
                quantity: line.quantity,
            });
        }
        let delivery_address = command.delivery_address.trim();
        if delivery_address.is_empty() {
            return Err(OrderError::MissingAddress);
        }

        let mut requested: HashMap<Uuid, i32> = HashMap::new();
        let mut items = Vec::with_capacity(command.items.len());

        for line in &command.items {
            let product = self.active_product(line.product_id).await?;

            let wanted = requested.entry(product.id).or_default();
            *wanted += line.quantity;
            if *wanted > product.stock {
                return Err(OrderError::InsufficientStock {
                    product: product.name,
                    available: product.stock,
                    requested: *wanted,
                });
            }

            if let Some(provided) = line.unit_price {
                if provided != product.price {
                    return Err(OrderError::PriceMismatch {
                        product: product.name,
                        current: product.price,
                        provided,
                    });
                }
            }

            items.push(OrderItem::new(product.id, product.name, line.quantity, product.price));
        }

        let created_at = Utc::now();
        let order = Order {
            id: Uuid::new_v4(),
            customer_id: actor.id,
            seller_id: None,
            total: order_total(&items),
            status: OrderStatus::Pending,
            delivery_address: delivery_address.to_string(),
            contact_phone: non_empty(command.contact_phone),
            notes: non_empty(command.notes),
            payment_method: command.payment_method,
            payment_proof_ref: non_empty(command.payment_proof_ref),
            created_at,
            estimated_delivery_at: Some(created_at + Duration::minutes(self.settings.estimated_delivery_minutes)),
            actual_delivery_at: None,
            items,
        };

        self.store.insert_order(&order).await.map_err(|e| match e {
            StoreError::InsufficientStock { product_id, available } => {
                let line = order.items.iter().find(|item| item.product_id == product_id);
                OrderError::InsufficientStock {
                    product: line.map(|item| item.product_name.clone()).unwrap_or_else(|| product_id.to_string()),
                    available,
                    requested: requested.get(&product_id).copied().unwrap_or_default(),
                }
            }
            StoreError::NotFound { entity: "product", id } => OrderError::ProductNotFound(id),
            other => OrderError::Store(other),
        })?;

        tracing::info!(
            order_id = %order.id,
            customer_id = %order.customer_id,
            items = order.items.len(),
            total = %order.total,
            "Order created"
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_order_created();
        }

        self.notifier.dispatch(OrderNotification::Created {
            order: order.clone(),
            customer: actor.clone(),
        });
        Ok(order)
    }

    /// Hands a pending order to a seller: confirms it and opens its delivery.
    pub async fn assign(&self, actor: &User, order_id: Uuid, command: AssignOrder) -> Result<Order, OrderError> {
        self.try_assign(actor, order_id, command)
            .await
            .inspect_err(|e| self.rejected("assign", e))
    }

    async fn try_assign(&self, actor: &User, order_id: Uuid, command: AssignOrder) -> Result<Order, OrderError> {
        match actor.role {
            Role::Admin => {}
            Role::Seller if command.seller_id == actor.id => {}
            Role::Seller => return Err(OrderError::forbidden("Sellers can only assign orders to themselves")),
            Role::Customer => return Err(OrderError::forbidden("Customers cannot assign orders")),
        }

        let order = self.load(order_id).await?;
        if order.status != OrderStatus::Pending || order.seller_id.is_some() {
            return Err(OrderError::OrderNotAssignable { order_id, status: order.status });
        }

        let seller = self
            .store
            .get_user(command.seller_id)
            .await?
            .filter(|user| user.active && user.is_seller())
            .ok_or(OrderError::InvalidSeller(command.seller_id))?;

        let delivery = Delivery::assigned(order_id, seller.id, Utc::now());
        let updated = self.store.assign_order(order_id, &delivery).await.map_err(|e| match e {
            StoreError::Conflict(_) => OrderError::OrderNotAssignable { order_id, status: order.status },
            StoreError::NotFound { entity: "order", .. } => OrderError::NotFound(order_id),
            other => OrderError::Store(other),
        })?;

        tracing::info!(
            order_id = %order_id,
            seller_id = %seller.id,
            delivery_id = %delivery.id,
            assigned_by = %actor.id,
            "Order assigned"
        );
        self.transitioned(order.status, updated.status);

        self.notifier.dispatch(OrderNotification::Assigned {
            order: updated.clone(),
            seller,
        });
        Ok(updated)
    }

    pub async fn update_status(
        &self,
        actor: &User,
        order_id: Uuid,
        command: ChangeOrderStatus,
    ) -> Result<Order, OrderError> {
        self.try_update_status(actor, order_id, command.status)
            .await
            .inspect_err(|e| self.rejected("update_status", e))
    }

    async fn try_update_status(&self, actor: &User, order_id: Uuid, next: OrderStatus) -> Result<Order, OrderError> {
        let order = self.load(order_id).await?;

        match actor.role {
            Role::Admin => {}
            Role::Seller => {
                if !order.is_assigned_to(actor.id) {
                    return Err(OrderError::forbidden("Order is not assigned to you"));
                }
            }
            Role::Customer => {
                if order.customer_id != actor.id {
                    return Err(OrderError::forbidden("Order belongs to another customer"));
                }
                if next != OrderStatus::Cancelled || order.status != OrderStatus::Pending {
                    return Err(OrderError::forbidden("Customers can only cancel pending orders"));
                }
            }
        }

        // Leaving Pending needs a seller, so only assignment moves an
        // unassigned order anywhere but Cancelled.
        let needs_seller = order.seller_id.is_none() && next != OrderStatus::Cancelled;
        if next == OrderStatus::Confirmed || needs_seller || !order.status.can_transition_to(next) {
            return Err(OrderError::InvalidTransition { from: order.status, to: next });
        }

        let change = StatusChange {
            from: order.status,
            to: next,
            at: Utc::now(),
            restock_items: next == OrderStatus::Cancelled && order.status == OrderStatus::Pending,
        };
        let updated = self.store.update_order_status(order_id, &change).await.map_err(|e| match e {
            StoreError::Conflict(_) => OrderError::ConcurrentUpdate(order_id),
            StoreError::NotFound { entity: "order", .. } => OrderError::NotFound(order_id),
            other => OrderError::Store(other),
        })?;

        tracing::info!(
            order_id = %order_id,
            from = %order.status,
            to = %updated.status,
            actor_id = %actor.id,
            restocked = change.restock_items,
            "Order status changed"
        );
        self.transitioned(order.status, updated.status);
        self.notify_status_change(&updated, order.status).await;

        Ok(updated)
    }

    pub async fn get(&self, actor: &User, order_id: Uuid) -> Result<Order, OrderError> {
        let order = self.load(order_id).await?;
        if !can_view(actor, &order) {
            return Err(OrderError::forbidden("You cannot view this order"));
        }
        Ok(order)
    }

    /// Orders visible to `actor`, newest first.
    pub async fn list(&self, actor: &User, status: Option<OrderStatus>) -> Result<Vec<Order>, OrderError> {
        let filter = match actor.role {
            Role::Admin => OrderFilter { status, ..Default::default() },
            Role::Seller => OrderFilter {
                seller_id: Some(actor.id),
                include_unassigned: true,
                status,
                ..Default::default()
            },
            Role::Customer => OrderFilter {
                customer_id: Some(actor.id),
                status,
                ..Default::default()
            },
        };
        Ok(self.store.list_orders(&filter).await?)
    }

    pub async fn restock(&self, actor: &User, product_id: Uuid, command: RestockProduct) -> Result<Product, OrderError> {
        if !actor.is_admin() {
            return Err(OrderError::forbidden("Only admins can restock products"));
        }
        if command.quantity <= 0 {
            return Err(OrderError::InvalidRestock(command.quantity));
        }

        let product = self
            .store
            .restock_product(product_id, command.quantity)
            .await
            .map_err(|e| match e {
                StoreError::NotFound { .. } => OrderError::ProductNotFound(product_id),
                StoreError::StockOverflow { stock, added, .. } => OrderError::StockLimit { product_id, stock, added },
                other => OrderError::Store(other),
            })?;

        tracing::info!(product_id = %product_id, added = command.quantity, stock = product.stock, "Product restocked");
        Ok(product)
    }

    /// Stores the device token push notifications go to. Blank clears it.
    pub async fn register_push_token(&self, actor: &User, token: Option<String>) -> Result<(), OrderError> {
        let token = non_empty(token);
        let clearing = token.is_none();
        self.store.set_push_token(actor.id, token).await?;
        tracing::debug!(user_id = %actor.id, clearing, "Push token updated");
        Ok(())
    }

    async fn load(&self, order_id: Uuid) -> Result<Order, OrderError> {
        self.store
            .get_order(order_id)
            .await?
            .ok_or(OrderError::NotFound(order_id))
    }

    async fn active_product(&self, product_id: Uuid) -> Result<Product, OrderError> {
        self.store
            .get_product(product_id)
            .await?
            .filter(|product| product.active)
            .ok_or(OrderError::ProductNotFound(product_id))
    }

    async fn notify_status_change(&self, order: &Order, previous: OrderStatus) {
        notify_status_change(self.store.as_ref(), &self.notifier, order, previous).await;
    }

    fn transitioned(&self, from: OrderStatus, to: OrderStatus) {
        if let Some(metrics) = &self.metrics {
            metrics.record_transition(from.as_str(), to.as_str());
        }
    }

    fn rejected(&self, operation: &'static str, error: &OrderError) {
        match error {
            OrderError::Store(e) => tracing::error!(operation, error = %e, "Order store failure"),
            other => tracing::debug!(operation, error = %other, "Order request rejected"),
        }
        if let Some(metrics) = &self.metrics {
            metrics.record_rejection(error.reason());
        }
    }
}

/// Looks up the customer and launches `OrderStatusChanged`. The change is
/// already committed, so a failed lookup only costs the notification.
pub(crate) async fn notify_status_change(
    store: &dyn OrderStore,
    notifier: &NotificationDispatcher,
    order: &Order,
    previous: OrderStatus,
) {
    match store.get_user(order.customer_id).await {
        Ok(Some(customer)) => {
            notifier.dispatch(OrderNotification::StatusChanged {
                order: order.clone(),
                customer,
                previous,
            });
        }
        Ok(None) => tracing::warn!(order_id = %order.id, customer_id = %order.customer_id, "Customer not found, status notification dropped"),
        Err(e) => tracing::warn!(order_id = %order.id, error = %e, "Customer lookup failed, status notification dropped"),
    }
}

fn can_view(actor: &User, order: &Order) -> bool {
    match actor.role {
        Role::Admin => true,
        Role::Customer => order.customer_id == actor.id,
        Role::Seller => {
            order.is_assigned_to(actor.id) || (order.seller_id.is_none() && order.status == OrderStatus::Pending)
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// ============================================================================
// Unit Tests
// ============================================================================
