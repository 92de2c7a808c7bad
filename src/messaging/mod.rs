// ============================================================================
// Messaging - Outbound notification transports
// ============================================================================
//
// One trait per transport so channels can be tested against fakes. The HTTP
// implementations each sit behind their own circuit breaker; the websocket
// broadcaster lives with the actors.
//
// ============================================================================

mod fcm;
mod mailer;
mod whatsapp;

pub use fcm::FcmClient;
pub use mailer::HttpMailer;
pub use whatsapp::WhatsAppClient;

use async_trait::async_trait;
use std::collections::HashMap;

use crate::utils::{CircuitBreaker, CircuitBreakerError};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("circuit breaker open for {0}")]
    CircuitOpen(&'static str),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider rejected request with {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("transport not configured: {0}")]
    NotConfigured(String),

    #[error("broadcast hub unavailable: {0}")]
    Hub(String),
}

#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<(), TransportError>;
}

#[async_trait]
pub trait WhatsAppTransport: Send + Sync {
    async fn send_whatsapp(&self, to: &str, body: &str) -> Result<(), TransportError>;
}

#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn send_push(
        &self,
        token: &str,
        title: &str,
        body: &str,
        data: &HashMap<String, String>,
    ) -> Result<(), TransportError>;
}

/// Real-time fan-out to connected clients. Returns how many received it.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn broadcast(&self, event: &str, payload: serde_json::Value) -> Result<usize, TransportError>;
}

/// Sends `request` through `breaker`. Only network errors and 5xx responses
/// count against the provider; a 4xx is our fault and leaves the circuit alone.
pub(crate) async fn send_guarded(
    breaker: &CircuitBreaker,
    request: reqwest::RequestBuilder,
) -> Result<(), TransportError> {
    let result = breaker
        .call(async {
            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => return Err(TransportError::Http(e)),
            };
            let status = response.status();
            if status.is_success() {
                return Ok(Ok(()));
            }

            let body = response.text().await.unwrap_or_default();
            let rejected = TransportError::Rejected { status: status.as_u16(), body };
            if status.is_server_error() {
                Err(rejected)
            } else {
                Ok(Err(rejected))
            }
        })
        .await;

    match result {
        Ok(outcome) => outcome,
        Err(CircuitBreakerError::CircuitOpen) => {
            tracing::warn!(transport = breaker.name(), "Circuit breaker open, provider not called");
            Err(TransportError::CircuitOpen(breaker.name()))
        }
        Err(CircuitBreakerError::OperationFailed(e)) => Err(e),
    }
}

pub(crate) fn http_client(timeout: std::time::Duration) -> Result<reqwest::Client, TransportError> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}
