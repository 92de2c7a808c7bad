use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::order::coordinator::notify_status_change;
use crate::domain::order::OrderStatus;
use crate::metrics::Metrics;
use crate::models::{Role, User};
use crate::notifications::NotificationDispatcher;
use crate::store::{OrderStore, StoreError};

use super::commands::{ChangeDeliveryStatus, UpdateLocation};
use super::errors::DeliveryError;
use super::value_objects::{Delivery, DeliveryStatus, Location};

// ============================================================================
// Delivery Tracker
// ============================================================================
//
// Couriers report position and progress here. The only point where a
// delivery touches its order is `Delivered`: both records change in one
// store write, then the customer is notified.
//
// ============================================================================

pub struct DeliveryTracker {
    store: Arc<dyn OrderStore>,
    notifier: NotificationDispatcher,
    metrics: Option<Arc<Metrics>>,
}

impl DeliveryTracker {
    pub fn new(store: Arc<dyn OrderStore>, notifier: NotificationDispatcher) -> Self {
        Self {
            store,
            notifier,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn update_location(
        &self,
        actor: &User,
        delivery_id: Uuid,
        command: UpdateLocation,
    ) -> Result<Delivery, DeliveryError> {
        let mut delivery = self.load(delivery_id).await?;
        ensure_courier(actor, &delivery)?;

        let location = Location {
            latitude: command.latitude,
            longitude: command.longitude,
            label: command.label.filter(|label| !label.trim().is_empty()),
        };
        if !location.is_valid() {
            return Err(DeliveryError::InvalidCoordinates {
                latitude: command.latitude,
                longitude: command.longitude,
            });
        }
        if delivery.status == DeliveryStatus::Delivered {
            return Err(DeliveryError::AlreadyDelivered(delivery_id));
        }

        let previous = delivery.status;
        delivery.record_location(location, Utc::now());
        self.save(&delivery, previous).await?;

        if let Some(metrics) = &self.metrics {
            metrics.record_location_update();
        }
        tracing::debug!(
            delivery_id = %delivery_id,
            latitude = command.latitude,
            longitude = command.longitude,
            "Delivery location updated"
        );
        if previous != delivery.status {
            tracing::info!(delivery_id = %delivery_id, order_id = %delivery.order_id, "Delivery started");
        }

        Ok(delivery)
    }

    pub async fn update_status(
        &self,
        actor: &User,
        delivery_id: Uuid,
        command: ChangeDeliveryStatus,
    ) -> Result<Delivery, DeliveryError> {
        let mut delivery = self.load(delivery_id).await?;
        ensure_courier(actor, &delivery)?;

        if delivery.status == DeliveryStatus::Delivered {
            return Err(DeliveryError::AlreadyDelivered(delivery_id));
        }

        let previous = delivery.status;
        let comments = command.comments.filter(|c| !c.trim().is_empty());
        delivery.apply_status(command.status, comments, Utc::now());

        if command.status != DeliveryStatus::Delivered {
            self.save(&delivery, previous).await?;
            tracing::info!(delivery_id = %delivery_id, status = %delivery.status, "Delivery status changed");
            return Ok(delivery);
        }

        let order_id = delivery.order_id;
        let (order, order_was) = match self.store.complete_delivery(&delivery, previous).await {
            Ok(done) => done,
            Err(StoreError::Conflict(_)) => return Err(self.explain_conflict(&delivery).await),
            Err(e) => return Err(e.into()),
        };

        tracing::info!(delivery_id = %delivery_id, order_id = %order_id, "Delivery completed");
        if let Some(metrics) = &self.metrics {
            metrics.record_transition(order_was.as_str(), order.status.as_str());
        }
        notify_status_change(self.store.as_ref(), &self.notifier, &order, order_was).await;

        Ok(delivery)
    }

    /// Readable by the courier, the order's customer and admins.
    pub async fn get(&self, actor: &User, delivery_id: Uuid) -> Result<Delivery, DeliveryError> {
        let delivery = self.load(delivery_id).await?;
        self.ensure_reader(actor, &delivery).await?;
        Ok(delivery)
    }

    pub async fn get_for_order(&self, actor: &User, order_id: Uuid) -> Result<Delivery, DeliveryError> {
        let delivery = self
            .store
            .get_delivery_for_order(order_id)
            .await?
            .ok_or(DeliveryError::NoDeliveryForOrder(order_id))?;
        self.ensure_reader(actor, &delivery).await?;
        Ok(delivery)
    }

    /// Writes a non-final change, guarded on the status it was read in.
    async fn save(&self, delivery: &Delivery, expected: DeliveryStatus) -> Result<(), DeliveryError> {
        match self.store.update_delivery(delivery, expected).await {
            Ok(()) => Ok(()),
            Err(StoreError::Conflict(_)) => Err(self.explain_conflict(delivery).await),
            Err(e) => Err(e.into()),
        }
    }

    /// A guarded write lost against an order change or another courier
    /// update. Re-reads both records to say which.
    async fn explain_conflict(&self, delivery: &Delivery) -> DeliveryError {
        let order = self.store.get_order(delivery.order_id).await.ok().flatten();
        if let Some(order) = order.filter(|o| o.status == OrderStatus::Cancelled) {
            return DeliveryError::OrderClosed { order_id: order.id, status: order.status };
        }

        match self.store.get_delivery(delivery.id).await {
            Ok(Some(stored)) if stored.status == DeliveryStatus::Delivered => {
                DeliveryError::AlreadyDelivered(delivery.id)
            }
            _ => {
                tracing::warn!(delivery_id = %delivery.id, "Delivery write lost to a concurrent update");
                DeliveryError::ConcurrentUpdate(delivery.id)
            }
        }
    }

    async fn load(&self, delivery_id: Uuid) -> Result<Delivery, DeliveryError> {
        self.store
            .get_delivery(delivery_id)
            .await?
            .ok_or(DeliveryError::NotFound(delivery_id))
    }

    async fn ensure_reader(&self, actor: &User, delivery: &Delivery) -> Result<(), DeliveryError> {
        let allowed = match actor.role {
            Role::Admin => true,
            Role::Seller => delivery.seller_id == actor.id,
            Role::Customer => self
                .store
                .get_order(delivery.order_id)
                .await?
                .is_some_and(|order| order.customer_id == actor.id),
        };

        if allowed {
            Ok(())
        } else {
            Err(DeliveryError::Forbidden("You cannot view this delivery".to_string()))
        }
    }
}

fn ensure_courier(actor: &User, delivery: &Delivery) -> Result<(), DeliveryError> {
    if actor.is_admin() || (actor.is_seller() && delivery.seller_id == actor.id) {
        Ok(())
    } else {
        Err(DeliveryError::Forbidden("Delivery is not assigned to you".to_string()))
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{ChangeOrderStatus, Order};
    use crate::domain::testing::Harness;
    use crate::models::Product;
    use crate::notifications::NotificationKind;
    use crate::store::{MemoryOrderStore, OrderFilter, StatusChange, StoreResult};

    fn at(latitude: f64, longitude: f64) -> UpdateLocation {
        UpdateLocation { latitude, longitude, label: Some("Av. Bolívar".into()) }
    }

    async fn delivery_for(h: &Harness) -> Delivery {
        let order = h.assigned_order().await;
        h.store.get_delivery_for_order(order.id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_first_location_starts_delivery() {
        let h = Harness::new().await;
        let delivery = delivery_for(&h).await;

        let updated = h
            .tracker
            .update_location(&h.seller, delivery.id, at(10.48, -66.90))
            .await
            .unwrap();
        assert_eq!(updated.status, DeliveryStatus::EnRoute);
        let started = updated.started_at.unwrap();

        let moved = h
            .tracker
            .update_location(&h.seller, delivery.id, at(10.49, -66.91))
            .await
            .unwrap();
        assert_eq!(moved.started_at, Some(started));
        assert_eq!(moved.location.as_ref().unwrap().latitude, 10.49);

        let stored = h.store.get_delivery(delivery.id).await.unwrap().unwrap();
        assert_eq!(stored.location.unwrap().longitude, -66.91);
        assert_eq!(h.metrics.deliveries_location_updates_total.get(), 2);
    }

    #[tokio::test]
    async fn test_location_rules() {
        let h = Harness::new().await;
        let delivery = delivery_for(&h).await;

        let err = h
            .tracker
            .update_location(&h.other_seller, delivery.id, at(10.0, -66.0))
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::Forbidden(_)));

        let err = h
            .tracker
            .update_location(&h.seller, delivery.id, at(91.0, -66.0))
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::InvalidCoordinates { .. }));

        let err = h
            .tracker
            .update_location(&h.seller, delivery.id, at(f64::NAN, 0.0))
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::InvalidCoordinates { .. }));

        let err = h
            .tracker
            .update_location(&h.seller, Uuid::new_v4(), at(10.0, -66.0))
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::NotFound(_)));

        // Admins may correct a courier's position.
        assert!(h.tracker.update_location(&h.admin, delivery.id, at(10.0, -66.0)).await.is_ok());
    }

    #[tokio::test]
    async fn test_delivered_delivery_completes_order() {
        let mut h = Harness::new().await;
        let delivery = delivery_for(&h).await;
        h.reports(4).await;

        let done = h
            .tracker
            .update_status(
                &h.seller,
                delivery.id,
                ChangeDeliveryStatus { status: DeliveryStatus::Delivered, comments: None },
            )
            .await
            .unwrap();
        assert_eq!(done.status, DeliveryStatus::Delivered);
        assert!(done.delivered_at.is_some());

        let order = h.store.get_order(delivery.order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Delivered);
        assert_eq!(order.actual_delivery_at, done.delivered_at);

        let reports = h.reports(3).await;
        assert!(reports.iter().all(|r| r.event == NotificationKind::OrderStatusChanged));

        let err = h
            .tracker
            .update_location(&h.seller, delivery.id, at(10.0, -66.0))
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::AlreadyDelivered(_)));

        let err = h
            .tracker
            .update_status(
                &h.seller,
                delivery.id,
                ChangeDeliveryStatus { status: DeliveryStatus::Failed, comments: None },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::AlreadyDelivered(_)));
    }

    #[tokio::test]
    async fn test_failed_delivery_records_comments() {
        let h = Harness::new().await;
        let delivery = delivery_for(&h).await;

        let failed = h
            .tracker
            .update_status(
                &h.seller,
                delivery.id,
                ChangeDeliveryStatus {
                    status: DeliveryStatus::Failed,
                    comments: Some("Nadie en casa".into()),
                },
            )
            .await
            .unwrap();
        assert_eq!(failed.status, DeliveryStatus::Failed);
        assert_eq!(failed.comments.as_deref(), Some("Nadie en casa"));

        let order = h.store.get_order(delivery.order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_cannot_deliver_cancelled_order() {
        let h = Harness::new().await;
        let delivery = delivery_for(&h).await;
        h.coordinator
            .update_status(&h.admin, delivery.order_id, ChangeOrderStatus { status: OrderStatus::Cancelled })
            .await
            .unwrap();

        let err = h
            .tracker
            .update_status(
                &h.seller,
                delivery.id,
                ChangeDeliveryStatus { status: DeliveryStatus::Delivered, comments: None },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::OrderClosed { status: OrderStatus::Cancelled, .. }));

        let stored = h.store.get_delivery(delivery.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DeliveryStatus::Failed);
        assert!(stored.delivered_at.is_none());
    }

    #[tokio::test]
    async fn test_cancelled_order_closes_its_delivery() {
        let h = Harness::new().await;
        let delivery = delivery_for(&h).await;
        h.tracker
            .update_location(&h.seller, delivery.id, at(10.48, -66.90))
            .await
            .unwrap();
        h.coordinator
            .update_status(&h.admin, delivery.order_id, ChangeOrderStatus { status: OrderStatus::Cancelled })
            .await
            .unwrap();

        let closed = h.store.get_delivery(delivery.id).await.unwrap().unwrap();
        assert_eq!(closed.status, DeliveryStatus::Failed);
        assert_eq!(closed.comments.as_deref(), Some(crate::store::CANCELLED_COMMENT));

        let err = h
            .tracker
            .update_location(&h.seller, delivery.id, at(10.49, -66.91))
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::OrderClosed { status: OrderStatus::Cancelled, .. }));

        let err = h
            .tracker
            .update_status(
                &h.seller,
                delivery.id,
                ChangeDeliveryStatus { status: DeliveryStatus::EnRoute, comments: None },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::OrderClosed { .. }));

        let stored = h.store.get_delivery(delivery.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DeliveryStatus::Failed);
        assert_eq!(stored.location.unwrap().latitude, 10.48);
    }

    #[tokio::test]
    async fn test_location_update_racing_order_delivery_keeps_cascade() {
        let h = Harness::new().await;
        let delivery = delivery_for(&h).await;
        let racing = Arc::new(RacingStore::new(h.store.clone()));
        racing.deliver_order_on_next_read(delivery.order_id, OrderStatus::Confirmed);
        let tracker = DeliveryTracker::new(racing, h.dispatcher.clone());

        let err = tracker
            .update_location(&h.seller, delivery.id, at(10.48, -66.90))
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::AlreadyDelivered(_)));

        let order = h.store.get_order(delivery.order_id).await.unwrap().unwrap();
        let stored = h.store.get_delivery(delivery.id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Delivered);
        assert_eq!(stored.status, DeliveryStatus::Delivered);
        assert_eq!(stored.delivered_at, order.actual_delivery_at);
        assert!(stored.location.is_none());
    }

    /// Delegates to the in-memory store, but marks an order delivered right
    /// after the next delivery read, as an admin acting between the
    /// tracker's read and its write would.
    struct RacingStore {
        inner: Arc<MemoryOrderStore>,
        pending: std::sync::Mutex<Option<(Uuid, StatusChange)>>,
    }

    impl RacingStore {
        fn new(inner: Arc<MemoryOrderStore>) -> Self {
            Self { inner, pending: std::sync::Mutex::new(None) }
        }

        fn deliver_order_on_next_read(&self, order_id: Uuid, from: OrderStatus) {
            let change = StatusChange {
                from,
                to: OrderStatus::Delivered,
                at: Utc::now(),
                restock_items: false,
            };
            *self.pending.lock().unwrap() = Some((order_id, change));
        }
    }

    #[async_trait::async_trait]
    impl OrderStore for RacingStore {
        async fn ping(&self) -> StoreResult<()> {
            self.inner.ping().await
        }

        async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>> {
            self.inner.get_user(id).await
        }

        async fn set_push_token(&self, user_id: Uuid, token: Option<String>) -> StoreResult<()> {
            self.inner.set_push_token(user_id, token).await
        }

        async fn get_product(&self, id: Uuid) -> StoreResult<Option<Product>> {
            self.inner.get_product(id).await
        }

        async fn restock_product(&self, id: Uuid, quantity: i32) -> StoreResult<Product> {
            self.inner.restock_product(id, quantity).await
        }

        async fn insert_order(&self, order: &Order) -> StoreResult<()> {
            self.inner.insert_order(order).await
        }

        async fn get_order(&self, id: Uuid) -> StoreResult<Option<Order>> {
            self.inner.get_order(id).await
        }

        async fn list_orders(&self, filter: &OrderFilter) -> StoreResult<Vec<Order>> {
            self.inner.list_orders(filter).await
        }

        async fn assign_order(&self, order_id: Uuid, delivery: &Delivery) -> StoreResult<Order> {
            self.inner.assign_order(order_id, delivery).await
        }

        async fn update_order_status(&self, order_id: Uuid, change: &StatusChange) -> StoreResult<Order> {
            self.inner.update_order_status(order_id, change).await
        }

        async fn get_delivery(&self, id: Uuid) -> StoreResult<Option<Delivery>> {
            let delivery = self.inner.get_delivery(id).await?;
            let pending = self.pending.lock().unwrap().take();
            if let Some((order_id, change)) = pending {
                self.inner.update_order_status(order_id, &change).await?;
            }
            Ok(delivery)
        }

        async fn get_delivery_for_order(&self, order_id: Uuid) -> StoreResult<Option<Delivery>> {
            self.inner.get_delivery_for_order(order_id).await
        }

        async fn update_delivery(&self, delivery: &Delivery, expected: DeliveryStatus) -> StoreResult<()> {
            self.inner.update_delivery(delivery, expected).await
        }

        async fn complete_delivery(
            &self,
            delivery: &Delivery,
            expected: DeliveryStatus,
        ) -> StoreResult<(Order, OrderStatus)> {
            self.inner.complete_delivery(delivery, expected).await
        }
    }

    #[tokio::test]
    async fn test_read_access() {
        let h = Harness::new().await;
        let delivery = delivery_for(&h).await;

        assert!(h.tracker.get(&h.seller, delivery.id).await.is_ok());
        assert!(h.tracker.get(&h.customer, delivery.id).await.is_ok());
        assert!(h.tracker.get(&h.admin, delivery.id).await.is_ok());
        assert!(matches!(
            h.tracker.get(&h.other_customer, delivery.id).await,
            Err(DeliveryError::Forbidden(_))
        ));
        assert!(matches!(
            h.tracker.get(&h.other_seller, delivery.id).await,
            Err(DeliveryError::Forbidden(_))
        ));

        let by_order = h.tracker.get_for_order(&h.customer, delivery.order_id).await.unwrap();
        assert_eq!(by_order.id, delivery.id);

        let pending = h.place_order().await;
        assert!(matches!(
            h.tracker.get_for_order(&h.admin, pending.id).await,
            Err(DeliveryError::NoDeliveryForOrder(_))
        ));
    }
}
