//! Wired-up coordinator and tracker over the in-memory store, with recording
//! transports behind every notification channel. WhatsApp always fails.

use rust_decimal_macros::dec;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use uuid::Uuid;

use crate::config::OrderSettings;
use crate::domain::delivery::DeliveryTracker;
use crate::domain::order::{AssignOrder, CreateOrder, Order, OrderCoordinator, OrderLine, PaymentMethod};
use crate::metrics::Metrics;
use crate::models::{Product, Role, User};
use crate::notifications::testing::{
    collect_reports, RecordingBroadcaster, RecordingEmail, RecordingPush, RecordingWhatsApp,
};
use crate::notifications::{
    ChannelReport, EmailChannel, NotificationDispatcher, OutcomeReporter, PushChannel, WebsocketChannel,
    WhatsAppChannel,
};
use crate::store::{MemoryOrderStore, OrderStore};

pub struct Harness {
    pub store: Arc<MemoryOrderStore>,
    pub coordinator: OrderCoordinator,
    pub tracker: DeliveryTracker,
    pub dispatcher: NotificationDispatcher,
    pub metrics: Arc<Metrics>,

    pub admin: User,
    pub seller: User,
    pub other_seller: User,
    pub customer: User,
    pub other_customer: User,

    /// 2.50, stock 10
    pub bottle: Product,
    /// 1.00, stock 5
    pub refill: Product,
    /// 4.00, stock 3
    pub scarce: Product,

    pub email: Arc<RecordingEmail>,
    pub push: Arc<RecordingPush>,
    pub broadcaster: Arc<RecordingBroadcaster>,
    reports: UnboundedReceiver<ChannelReport>,
}

impl Harness {
    pub async fn new() -> Self {
        let store = Arc::new(MemoryOrderStore::new());

        let admin = User::new("Admin", "admin@agua.test", Role::Admin);
        let seller = User::new("Luis", "luis@agua.test", Role::Seller).with_push_token("seller-device");
        let other_seller = User::new("Pedro", "pedro@agua.test", Role::Seller);
        let customer = User::new("Ana", "ana@agua.test", Role::Customer)
            .with_phone("+58 414 5550000")
            .with_push_token("customer-device");
        let other_customer = User::new("Rosa", "rosa@agua.test", Role::Customer);
        for user in [&admin, &seller, &other_seller, &customer, &other_customer] {
            store.insert_user(user.clone()).await;
        }

        let bottle = Product::new("Botellón 20L", dec!(2.50), 10);
        let refill = Product::new("Recarga 20L", dec!(1.00), 5);
        let scarce = Product::new("Garrafón 5L", dec!(4.00), 3);
        for product in [&bottle, &refill, &scarce] {
            store.insert_product(product.clone()).await;
        }

        let metrics = Arc::new(Metrics::new().expect("metrics registry"));
        let email = Arc::new(RecordingEmail::default());
        let push = Arc::new(RecordingPush::default());
        let broadcaster = Arc::new(RecordingBroadcaster::with_subscribers(1));

        let (tx, reports) = mpsc::unbounded_channel();
        let dispatcher = NotificationDispatcher::new(OutcomeReporter::new(metrics.clone()).with_observer(tx))
            .with_channel(Arc::new(EmailChannel::new(email.clone(), Some("pedidos@agua.test".into()))))
            .with_channel(Arc::new(WhatsAppChannel::new(
                Arc::new(RecordingWhatsApp::failing()),
                Some("+58 412 5550001".into()),
            )))
            .with_channel(Arc::new(PushChannel::new(push.clone())))
            .with_channel(Arc::new(WebsocketChannel::new(broadcaster.clone())));

        let shared: Arc<dyn OrderStore> = store.clone();
        let coordinator = OrderCoordinator::new(shared.clone(), dispatcher.clone(), OrderSettings::default())
            .with_metrics(metrics.clone());
        let tracker = DeliveryTracker::new(shared, dispatcher.clone()).with_metrics(metrics.clone());

        Self {
            store,
            coordinator,
            tracker,
            dispatcher,
            metrics,
            admin,
            seller,
            other_seller,
            customer,
            other_customer,
            bottle,
            refill,
            scarce,
            email,
            push,
            broadcaster,
            reports,
        }
    }

    pub fn order_request(&self, lines: &[(Uuid, i32)]) -> CreateOrder {
        CreateOrder {
            items: lines
                .iter()
                .map(|(product_id, quantity)| OrderLine {
                    product_id: *product_id,
                    quantity: *quantity,
                    unit_price: None,
                })
                .collect(),
            delivery_address: "Calle Los Mangos, Casa 7".into(),
            contact_phone: None,
            notes: None,
            payment_method: PaymentMethod::Cash,
            payment_proof_ref: None,
        }
    }

    /// Pending order of two bottles by `customer`.
    pub async fn place_order(&self) -> Order {
        self.coordinator
            .create(&self.customer, self.order_request(&[(self.bottle.id, 2)]))
            .await
            .expect("order placed")
    }

    /// Order placed by `customer` and assigned to `seller`.
    pub async fn assigned_order(&self) -> Order {
        let order = self.place_order().await;
        self.coordinator
            .assign(&self.admin, order.id, AssignOrder { seller_id: self.seller.id })
            .await
            .expect("order assigned")
    }

    pub async fn stock(&self, product_id: Uuid) -> i32 {
        self.store
            .get_product(product_id)
            .await
            .expect("store")
            .expect("product")
            .stock
    }

    pub async fn reports(&mut self, n: usize) -> Vec<ChannelReport> {
        collect_reports(&mut self.reports, n).await
    }
}
