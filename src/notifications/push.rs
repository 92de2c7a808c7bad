use async_trait::async_trait;
use std::sync::Arc;

use crate::messaging::PushTransport;
use super::{
    seller_assignment, status_update, ChannelOutcome, NotificationChannel, NotificationKind,
    OrderNotification,
};

/// Mobile push. Built without a transport when FCM failed to initialize at
/// startup; every send is then skipped until the process restarts.
pub struct PushChannel {
    transport: Option<Arc<dyn PushTransport>>,
}

impl PushChannel {
    pub fn new(transport: Arc<dyn PushTransport>) -> Self {
        Self { transport: Some(transport) }
    }

    pub fn unavailable() -> Self {
        Self { transport: None }
    }
}

#[async_trait]
impl NotificationChannel for PushChannel {
    fn name(&self) -> &'static str {
        "push"
    }

    fn handles(&self, kind: NotificationKind) -> bool {
        matches!(kind, NotificationKind::OrderAssigned | NotificationKind::OrderStatusChanged)
    }

    async fn deliver(&self, notification: &OrderNotification) -> ChannelOutcome {
        let Some(transport) = &self.transport else {
            return ChannelOutcome::skipped("push transport not initialized");
        };

        let (token, message) = match notification {
            OrderNotification::Assigned { order, seller } => {
                (seller.push_token.as_deref(), seller_assignment(order))
            }
            OrderNotification::StatusChanged { order, customer, previous } => {
                (customer.push_token.as_deref(), status_update(order, customer, *previous))
            }
            OrderNotification::Created { .. } => return ChannelOutcome::skipped("not sent by push"),
        };

        let Some(token) = token.filter(|t| !t.is_empty()) else {
            return ChannelOutcome::skipped("recipient has no device token");
        };

        match transport
            .send_push(token, &message.title, &message.body, &notification.push_data())
            .await
        {
            Ok(()) => ChannelOutcome::Sent { messages: 1 },
            Err(e) => ChannelOutcome::Failed(e.to_string()),
        }
    }
}
