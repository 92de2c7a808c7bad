use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;

use crate::config::PushConfig;
use crate::utils::{CircuitBreaker, CircuitBreakerConfig};
use super::{http_client, send_guarded, PushTransport, TransportError};

/// Firebase Cloud Messaging over the HTTP send endpoint.
pub struct FcmClient {
    client: reqwest::Client,
    endpoint: String,
    server_key: String,
    circuit_breaker: CircuitBreaker,
}

impl FcmClient {
    /// Fails when no server key is configured. Callers treat that as push
    /// being unavailable for the lifetime of the process.
    pub fn new(
        config: &PushConfig,
        timeout: Duration,
        breaker: CircuitBreakerConfig,
    ) -> Result<Self, TransportError> {
        let server_key = config
            .server_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| TransportError::NotConfigured("FCM server key missing".into()))?;

        Ok(Self {
            client: http_client(timeout)?,
            endpoint: config.endpoint.clone(),
            server_key: server_key.to_string(),
            circuit_breaker: CircuitBreaker::new("push", breaker),
        })
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.circuit_breaker
    }

    async fn post(&self, message: serde_json::Value) -> Result<(), TransportError> {
        let request = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("key={}", self.server_key))
            .json(&message);

        send_guarded(&self.circuit_breaker, request).await
    }
}

#[async_trait]
impl PushTransport for FcmClient {
    async fn send_push(
        &self,
        token: &str,
        title: &str,
        body: &str,
        data: &HashMap<String, String>,
    ) -> Result<(), TransportError> {
        self.post(json!({
            "to": token,
            "notification": { "title": title, "body": body },
            "data": data,
        }))
        .await
    }
}
