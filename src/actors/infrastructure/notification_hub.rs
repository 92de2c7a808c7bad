use actix::prelude::*;
use async_trait::async_trait;
use std::collections::HashMap;
use uuid::Uuid;

use crate::messaging::{Broadcaster, TransportError};

// ============================================================================
// Notification Hub - registry of live websocket sessions
// ============================================================================
//
// Sessions register on connect and deregister when they stop. A publish is
// pushed to whoever is registered at that moment; nothing is queued for
// clients that connect later.
//
// ============================================================================

/// Serialized event pushed to one session.
#[derive(Message, Debug, Clone)]
#[rtype(result = "()")]
pub struct WsEvent(pub String);

#[derive(Message)]
#[rtype(result = "Uuid")]
pub struct Connect {
    pub addr: Recipient<WsEvent>,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Disconnect {
    pub id: Uuid,
}

/// Replies with the number of sessions the event was pushed to.
#[derive(Message, Debug, Clone)]
#[rtype(result = "usize")]
pub struct Publish {
    pub event: String,
    pub payload: serde_json::Value,
}

#[derive(Message)]
#[rtype(result = "usize")]
pub struct SessionCount;

#[derive(Default)]
pub struct NotificationHub {
    sessions: HashMap<Uuid, Recipient<WsEvent>>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Actor for NotificationHub {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        tracing::info!("NotificationHub started");
    }
}

impl Handler<Connect> for NotificationHub {
    type Result = MessageResult<Connect>;

    fn handle(&mut self, msg: Connect, _ctx: &mut Self::Context) -> Self::Result {
        let id = Uuid::new_v4();
        self.sessions.insert(id, msg.addr);
        tracing::debug!(session_id = %id, sessions = self.sessions.len(), "Websocket session registered");
        MessageResult(id)
    }
}

impl Handler<Disconnect> for NotificationHub {
    type Result = ();

    fn handle(&mut self, msg: Disconnect, _ctx: &mut Self::Context) {
        if self.sessions.remove(&msg.id).is_some() {
            tracing::debug!(session_id = %msg.id, sessions = self.sessions.len(), "Websocket session removed");
        }
    }
}

impl Handler<Publish> for NotificationHub {
    type Result = usize;

    fn handle(&mut self, msg: Publish, _ctx: &mut Self::Context) -> Self::Result {
        if self.sessions.is_empty() {
            return 0;
        }

        let text = serde_json::json!({ "event": msg.event, "data": msg.payload }).to_string();
        for session in self.sessions.values() {
            session.do_send(WsEvent(text.clone()));
        }
        self.sessions.len()
    }
}

impl Handler<SessionCount> for NotificationHub {
    type Result = usize;

    fn handle(&mut self, _msg: SessionCount, _ctx: &mut Self::Context) -> Self::Result {
        self.sessions.len()
    }
}

#[async_trait]
impl Broadcaster for Addr<NotificationHub> {
    async fn broadcast(&self, event: &str, payload: serde_json::Value) -> Result<usize, TransportError> {
        self.send(Publish { event: event.to_string(), payload })
            .await
            .map_err(|e| TransportError::Hub(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Listener {
        received: Arc<Mutex<Vec<String>>>,
    }

    impl Actor for Listener {
        type Context = Context<Self>;
    }

    impl Handler<WsEvent> for Listener {
        type Result = ();

        fn handle(&mut self, msg: WsEvent, _ctx: &mut Self::Context) {
            self.received.lock().unwrap().push(msg.0);
        }
    }

    #[actix_web::test]
    async fn test_publish_reaches_registered_sessions() {
        let hub = NotificationHub::new().start();
        let received = Arc::new(Mutex::new(Vec::new()));
        let listener = Listener { received: received.clone() }.start();

        let id = hub.send(Connect { addr: listener.recipient() }).await.unwrap();
        let delivered = hub
            .broadcast("new_order", serde_json::json!({ "order_id": "abc" }))
            .await
            .unwrap();
        assert_eq!(delivered, 1);

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let messages = received.lock().unwrap().clone();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("\"event\":\"new_order\""));

        hub.send(Disconnect { id }).await.unwrap();
        assert_eq!(hub.send(SessionCount).await.unwrap(), 0);
    }

    #[actix_web::test]
    async fn test_publish_without_sessions_is_a_noop() {
        let hub = NotificationHub::new().start();
        let delivered = hub.broadcast("new_order", serde_json::json!({})).await.unwrap();
        assert_eq!(delivered, 0);
    }
}
