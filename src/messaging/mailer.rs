use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

use crate::config::EmailConfig;
use crate::utils::{CircuitBreaker, CircuitBreakerConfig};
use super::{http_client, send_guarded, EmailTransport, TransportError};

/// Transactional mail through an HTTP relay (`POST {endpoint}` with a JSON
/// message and optional bearer key).
pub struct HttpMailer {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    from: String,
    circuit_breaker: CircuitBreaker,
}

impl HttpMailer {
    pub fn new(
        config: &EmailConfig,
        timeout: Duration,
        breaker: CircuitBreakerConfig,
    ) -> Result<Self, TransportError> {
        Ok(Self {
            client: http_client(timeout)?,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            from: config.from.clone(),
            circuit_breaker: CircuitBreaker::new("email", breaker),
        })
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.circuit_breaker
    }
}

#[async_trait]
impl EmailTransport for HttpMailer {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<(), TransportError> {
        let mut request = self.client.post(&self.endpoint).json(&json!({
            "from": self.from,
            "to": [to],
            "subject": subject,
            "text": body,
        }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        send_guarded(&self.circuit_breaker, request).await?;
        tracing::debug!(to = %to, subject = %subject, "Email accepted by relay");
        Ok(())
    }
}
