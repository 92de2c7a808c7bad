use async_trait::async_trait;
use std::sync::Arc;

use crate::messaging::WhatsAppTransport;
use super::{
    admin_summary, customer_confirmation, customer_phone, status_update, ChannelOutcome,
    NotificationChannel, NotificationKind, OrderNotification,
};

pub struct WhatsAppChannel {
    transport: Arc<dyn WhatsAppTransport>,
    admin_phone: Option<String>,
}

impl WhatsAppChannel {
    pub fn new(transport: Arc<dyn WhatsAppTransport>, admin_phone: Option<String>) -> Self {
        Self { transport, admin_phone }
    }
}

#[async_trait]
impl NotificationChannel for WhatsAppChannel {
    fn name(&self) -> &'static str {
        "whatsapp"
    }

    fn handles(&self, kind: NotificationKind) -> bool {
        matches!(kind, NotificationKind::OrderCreated | NotificationKind::OrderStatusChanged)
    }

    async fn deliver(&self, notification: &OrderNotification) -> ChannelOutcome {
        let mut messages: Vec<(String, String)> = Vec::new();

        match notification {
            OrderNotification::Created { order, customer } => {
                if let Some(admin) = self.admin_phone.as_deref() {
                    messages.push((admin.to_string(), admin_summary(order, customer).body));
                }
                if let Some(phone) = customer_phone(order, customer) {
                    messages.push((phone.to_string(), customer_confirmation(order, customer).body));
                }
            }
            OrderNotification::StatusChanged { order, customer, previous } => {
                if let Some(phone) = customer_phone(order, customer) {
                    messages.push((phone.to_string(), status_update(order, customer, *previous).body));
                }
            }
            OrderNotification::Assigned { .. } => {}
        }

        if messages.is_empty() {
            return ChannelOutcome::skipped("recipient has no phone number");
        }

        // Each recipient is attempted even if an earlier one failed.
        let mut results = Vec::with_capacity(messages.len());
        for (to, body) in &messages {
            results.push(
                self.transport
                    .send_whatsapp(to, body)
                    .await
                    .map_err(|e| e.to_string()),
            );
        }
        ChannelOutcome::from_results(results)
    }
}
