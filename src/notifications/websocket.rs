use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use crate::messaging::Broadcaster;
use super::{ChannelOutcome, NotificationChannel, NotificationKind, OrderNotification};

/// Live dashboard feed. At most once: clients that are not connected when
/// the event fires never see it.
pub struct WebsocketChannel {
    broadcaster: Arc<dyn Broadcaster>,
}

impl WebsocketChannel {
    pub fn new(broadcaster: Arc<dyn Broadcaster>) -> Self {
        Self { broadcaster }
    }
}

#[async_trait]
impl NotificationChannel for WebsocketChannel {
    fn name(&self) -> &'static str {
        "websocket"
    }

    fn handles(&self, kind: NotificationKind) -> bool {
        kind == NotificationKind::OrderCreated
    }

    async fn deliver(&self, notification: &OrderNotification) -> ChannelOutcome {
        let OrderNotification::Created { order, customer } = notification else {
            return ChannelOutcome::skipped("not broadcast");
        };

        let payload = json!({
            "order_id": order.id,
            "customer": customer.name,
            "total": order.total,
            "delivery_address": order.delivery_address,
            "payment_method": order.payment_method,
            "created_at": order.created_at,
        });

        match self.broadcaster.broadcast("new_order", payload).await {
            Ok(0) => ChannelOutcome::skipped("no connected clients"),
            Ok(messages) => ChannelOutcome::Sent { messages },
            Err(e) => ChannelOutcome::Failed(e.to_string()),
        }
    }
}
