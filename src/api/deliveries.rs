use actix_web::{web, HttpResponse};
use uuid::Uuid;

use crate::domain::delivery::{ChangeDeliveryStatus, UpdateLocation};
use super::{ApiError, AppState, Caller};

/// `GET /deliveries/{id}`
pub async fn get_delivery(
    state: web::Data<AppState>,
    Caller(actor): Caller,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let delivery = state.deliveries.get(&actor, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(delivery))
}

/// `GET /orders/{id}/delivery`
pub async fn get_order_delivery(
    state: web::Data<AppState>,
    Caller(actor): Caller,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let delivery = state.deliveries.get_for_order(&actor, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(delivery))
}

/// `PATCH /deliveries/{id}/location`
pub async fn update_location(
    state: web::Data<AppState>,
    Caller(actor): Caller,
    path: web::Path<Uuid>,
    body: web::Json<UpdateLocation>,
) -> Result<HttpResponse, ApiError> {
    let delivery = state
        .deliveries
        .update_location(&actor, path.into_inner(), body.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(delivery))
}

/// `PATCH /deliveries/{id}/status`
pub async fn update_delivery_status(
    state: web::Data<AppState>,
    Caller(actor): Caller,
    path: web::Path<Uuid>,
    body: web::Json<ChangeDeliveryStatus>,
) -> Result<HttpResponse, ApiError> {
    let delivery = state
        .deliveries
        .update_status(&actor, path.into_inner(), body.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(delivery))
}
