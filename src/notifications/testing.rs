//! In-memory transports and fixtures for notification tests.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

use crate::domain::order::{Order, OrderItem, OrderStatus, PaymentMethod};
use crate::messaging::{
    Broadcaster, EmailTransport, PushTransport, TransportError, WhatsAppTransport,
};
use super::ChannelReport;

pub fn sample_order() -> Order {
    let items = vec![OrderItem::new(Uuid::new_v4(), "Botellón 20L", 2, dec!(2.50))];
    Order {
        id: Uuid::new_v4(),
        customer_id: Uuid::new_v4(),
        seller_id: None,
        total: dec!(5.00),
        items,
        status: OrderStatus::Pending,
        delivery_address: "Calle 5, Casa 3".into(),
        contact_phone: None,
        notes: None,
        payment_method: PaymentMethod::Cash,
        payment_proof_ref: None,
        created_at: Utc::now(),
        estimated_delivery_at: None,
        actual_delivery_at: None,
    }
}

/// Waits for `n` reports, panicking if they do not arrive within two seconds.
pub async fn collect_reports(
    rx: &mut UnboundedReceiver<ChannelReport>,
    n: usize,
) -> Vec<ChannelReport> {
    let mut reports = Vec::with_capacity(n);
    while reports.len() < n {
        let report = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for channel report")
            .expect("reporter dropped");
        reports.push(report);
    }
    reports
}

fn refused() -> TransportError {
    TransportError::Rejected {
        status: 503,
        body: "provider unavailable".into(),
    }
}

#[derive(Default)]
pub struct RecordingEmail {
    fail: bool,
    sent: Mutex<Vec<(String, String, String)>>,
}

impl RecordingEmail {
    pub fn failing() -> Self {
        Self { fail: true, ..Default::default() }
    }

    /// (to, subject, body)
    pub fn sent(&self) -> Vec<(String, String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmailTransport for RecordingEmail {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<(), TransportError> {
        if self.fail {
            return Err(refused());
        }
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), subject.to_string(), body.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingWhatsApp {
    fail: bool,
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingWhatsApp {
    pub fn failing() -> Self {
        Self { fail: true, ..Default::default() }
    }

    /// (to, body)
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl WhatsAppTransport for RecordingWhatsApp {
    async fn send_whatsapp(&self, to: &str, body: &str) -> Result<(), TransportError> {
        if self.fail {
            return Err(refused());
        }
        self.sent.lock().unwrap().push((to.to_string(), body.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingPush {
    fail: bool,
    sent: Mutex<Vec<(String, String, HashMap<String, String>)>>,
}

impl RecordingPush {
    pub fn failing() -> Self {
        Self { fail: true, ..Default::default() }
    }

    /// (token, title, data)
    pub fn sent(&self) -> Vec<(String, String, HashMap<String, String>)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl PushTransport for RecordingPush {
    async fn send_push(
        &self,
        token: &str,
        title: &str,
        _body: &str,
        data: &HashMap<String, String>,
    ) -> Result<(), TransportError> {
        if self.fail {
            return Err(refused());
        }
        self.sent
            .lock()
            .unwrap()
            .push((token.to_string(), title.to_string(), data.clone()));
        Ok(())
    }
}

pub struct RecordingBroadcaster {
    subscribers: usize,
    events: Mutex<Vec<(String, serde_json::Value)>>,
}

impl RecordingBroadcaster {
    pub fn with_subscribers(subscribers: usize) -> Self {
        Self {
            subscribers,
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<(String, serde_json::Value)> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl Broadcaster for RecordingBroadcaster {
    async fn broadcast(&self, event: &str, payload: serde_json::Value) -> Result<usize, TransportError> {
        self.events.lock().unwrap().push((event.to_string(), payload));
        Ok(self.subscribers)
    }
}
