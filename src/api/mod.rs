// ============================================================================
// HTTP API - actix-web routes over the coordinator and the tracker
// ============================================================================
//
// Handlers stay thin: extract the caller and the body, call the domain
// service, serialize the result. Every failure leaves as `ApiError`.
//
// ============================================================================

mod caller;
mod deliveries;
mod error;
mod orders;
mod users;

pub use caller::{Caller, USER_HEADER};
pub use error::ApiError;

use actix_web::web;
use std::sync::Arc;

use crate::domain::delivery::DeliveryTracker;
use crate::domain::order::OrderCoordinator;
use crate::store::OrderStore;

pub struct AppState {
    pub store: Arc<dyn OrderStore>,
    pub orders: OrderCoordinator,
    pub deliveries: DeliveryTracker,
}

impl AppState {
    pub fn new(store: Arc<dyn OrderStore>, orders: OrderCoordinator, deliveries: DeliveryTracker) -> Self {
        Self { store, orders, deliveries }
    }
}

/// Registers the JSON API. Extractor failures answer with the same
/// `{"error": ...}` body as domain errors.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default().error_handler(|err, _req| ApiError::Validation(err.to_string()).into()),
    )
    .app_data(
        web::PathConfig::default().error_handler(|err, _req| ApiError::Validation(err.to_string()).into()),
    )
    .app_data(
        web::QueryConfig::default().error_handler(|err, _req| ApiError::Validation(err.to_string()).into()),
    )
    .route("/orders", web::post().to(orders::create_order))
    .route("/orders", web::get().to(orders::list_orders))
    .route("/orders/{id}", web::get().to(orders::get_order))
    .route("/orders/{id}/assign", web::put().to(orders::assign_order))
    .route("/orders/{id}/status", web::patch().to(orders::update_order_status))
    .route("/orders/{id}/delivery", web::get().to(deliveries::get_order_delivery))
    .route("/deliveries/{id}", web::get().to(deliveries::get_delivery))
    .route("/deliveries/{id}/location", web::patch().to(deliveries::update_location))
    .route("/deliveries/{id}/status", web::patch().to(deliveries::update_delivery_status))
    .route("/products/{id}/restock", web::post().to(orders::restock_product))
    .route("/users/me", web::get().to(users::current_user))
    .route("/users/me/push-token", web::put().to(users::register_push_token));
}
