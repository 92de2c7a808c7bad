use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

use crate::config::WhatsAppConfig;
use crate::utils::{CircuitBreaker, CircuitBreakerConfig};
use super::{http_client, send_guarded, TransportError, WhatsAppTransport};

/// WhatsApp Cloud API text messages.
pub struct WhatsAppClient {
    client: reqwest::Client,
    messages_url: String,
    access_token: String,
    circuit_breaker: CircuitBreaker,
}

impl WhatsAppClient {
    pub fn new(
        config: &WhatsAppConfig,
        timeout: Duration,
        breaker: CircuitBreakerConfig,
    ) -> Result<Self, TransportError> {
        if config.access_token.trim().is_empty() {
            return Err(TransportError::NotConfigured("whatsapp access token is empty".into()));
        }

        Ok(Self {
            client: http_client(timeout)?,
            messages_url: format!("{}/messages", config.api_url.trim_end_matches('/')),
            access_token: config.access_token.clone(),
            circuit_breaker: CircuitBreaker::new("whatsapp", breaker),
        })
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.circuit_breaker
    }
}

/// Digits only, the form the Cloud API expects for `to`.
pub(crate) fn normalize_phone(phone: &str) -> String {
    phone.chars().filter(|c| c.is_ascii_digit()).collect()
}

#[async_trait]
impl WhatsAppTransport for WhatsAppClient {
    async fn send_whatsapp(&self, to: &str, body: &str) -> Result<(), TransportError> {
        let to = normalize_phone(to);
        let request = self
            .client
            .post(&self.messages_url)
            .bearer_auth(&self.access_token)
            .json(&json!({
                "messaging_product": "whatsapp",
                "to": to,
                "type": "text",
                "text": { "body": body },
            }));

        send_guarded(&self.circuit_breaker, request).await?;
        tracing::debug!(to = %to, "WhatsApp message accepted");
        Ok(())
    }
}
