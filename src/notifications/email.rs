use async_trait::async_trait;
use std::sync::Arc;

use crate::messaging::EmailTransport;
use super::{
    admin_summary, status_update, ChannelOutcome, NotificationChannel, NotificationKind,
    OrderNotification,
};

/// Admin summary for new orders, status updates for customers.
pub struct EmailChannel {
    transport: Arc<dyn EmailTransport>,
    admin_email: Option<String>,
}

impl EmailChannel {
    pub fn new(transport: Arc<dyn EmailTransport>, admin_email: Option<String>) -> Self {
        Self { transport, admin_email }
    }

    async fn send(&self, to: &str, title: &str, body: &str) -> ChannelOutcome {
        match self.transport.send_email(to, title, body).await {
            Ok(()) => ChannelOutcome::Sent { messages: 1 },
            Err(e) => ChannelOutcome::Failed(e.to_string()),
        }
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn name(&self) -> &'static str {
        "email"
    }

    fn handles(&self, kind: NotificationKind) -> bool {
        matches!(kind, NotificationKind::OrderCreated | NotificationKind::OrderStatusChanged)
    }

    async fn deliver(&self, notification: &OrderNotification) -> ChannelOutcome {
        match notification {
            OrderNotification::Created { order, customer } => {
                let Some(admin) = self.admin_email.as_deref() else {
                    return ChannelOutcome::skipped("no admin email configured");
                };
                let message = admin_summary(order, customer);
                self.send(admin, &message.title, &message.body).await
            }
            OrderNotification::StatusChanged { order, customer, previous } => {
                if customer.email.trim().is_empty() {
                    return ChannelOutcome::skipped("customer has no email address");
                }
                let message = status_update(order, customer, *previous);
                self.send(&customer.email, &message.title, &message.body).await
            }
            OrderNotification::Assigned { .. } => ChannelOutcome::skipped("not sent by email"),
        }
    }
}
