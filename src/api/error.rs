use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};

use crate::domain::delivery::DeliveryError;
use crate::domain::order::OrderError;
use crate::store::StoreError;

// ============================================================================
// API Errors - HTTP taxonomy for every handler
// ============================================================================
//
// Bodies are always `{"error": "<message>"}`. Persistence failures keep their
// detail in the logs and answer with a generic message.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Internal server error")]
    Persistence(String),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if let ApiError::Persistence(detail) = self {
            tracing::error!(error = %detail, "Request failed on persistence");
        }
        HttpResponse::build(self.status_code()).json(serde_json::json!({ "error": self.to_string() }))
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            StoreError::InsufficientStock { .. } => ApiError::Validation(err.to_string()),
            StoreError::Conflict(_) => ApiError::Conflict(err.to_string()),
            StoreError::StockOverflow { .. } => ApiError::Validation(err.to_string()),
            StoreError::Corrupt(_) | StoreError::Database(_) | StoreError::Migration(_) => {
                ApiError::Persistence(err.to_string())
            }
        }
    }
}

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::Store(store) => store.into(),
            OrderError::EmptyItems
            | OrderError::InvalidQuantity { .. }
            | OrderError::MissingAddress
            | OrderError::InsufficientStock { .. }
            | OrderError::PriceMismatch { .. }
            | OrderError::InvalidSeller(_)
            | OrderError::InvalidRestock(_)
            | OrderError::StockLimit { .. } => ApiError::Validation(err.to_string()),
            OrderError::ProductNotFound(_) | OrderError::NotFound(_) => ApiError::NotFound(err.to_string()),
            OrderError::Forbidden(message) => ApiError::Forbidden(message),
            OrderError::OrderNotAssignable { .. }
            | OrderError::InvalidTransition { .. }
            | OrderError::ConcurrentUpdate(_) => ApiError::Conflict(err.to_string()),
        }
    }
}

impl From<DeliveryError> for ApiError {
    fn from(err: DeliveryError) -> Self {
        match err {
            DeliveryError::Store(store) => store.into(),
            DeliveryError::NotFound(_) | DeliveryError::NoDeliveryForOrder(_) => ApiError::NotFound(err.to_string()),
            DeliveryError::Forbidden(message) => ApiError::Forbidden(message),
            DeliveryError::InvalidCoordinates { .. } => ApiError::Validation(err.to_string()),
            DeliveryError::AlreadyDelivered(_)
            | DeliveryError::OrderClosed { .. }
            | DeliveryError::ConcurrentUpdate(_) => ApiError::Conflict(err.to_string()),
        }
    }
}
