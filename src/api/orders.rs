use actix_web::{web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::order::{AssignOrder, ChangeOrderStatus, CreateOrder, OrderStatus, RestockProduct};
use super::{ApiError, AppState, Caller};

#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    #[serde(default)]
    pub status: Option<OrderStatus>,
}

/// `POST /orders`
pub async fn create_order(
    state: web::Data<AppState>,
    Caller(actor): Caller,
    body: web::Json<CreateOrder>,
) -> Result<HttpResponse, ApiError> {
    let order = state.orders.create(&actor, body.into_inner()).await?;
    Ok(HttpResponse::Created().json(order))
}

/// `GET /orders?status=`
pub async fn list_orders(
    state: web::Data<AppState>,
    Caller(actor): Caller,
    query: web::Query<ListOrdersQuery>,
) -> Result<HttpResponse, ApiError> {
    let orders = state.orders.list(&actor, query.status).await?;
    Ok(HttpResponse::Ok().json(orders))
}

/// `GET /orders/{id}`
pub async fn get_order(
    state: web::Data<AppState>,
    Caller(actor): Caller,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let order = state.orders.get(&actor, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(order))
}

/// `PUT /orders/{id}/assign`
pub async fn assign_order(
    state: web::Data<AppState>,
    Caller(actor): Caller,
    path: web::Path<Uuid>,
    body: web::Json<AssignOrder>,
) -> Result<HttpResponse, ApiError> {
    let order = state.orders.assign(&actor, path.into_inner(), body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(order))
}

/// `PATCH /orders/{id}/status`
pub async fn update_order_status(
    state: web::Data<AppState>,
    Caller(actor): Caller,
    path: web::Path<Uuid>,
    body: web::Json<ChangeOrderStatus>,
) -> Result<HttpResponse, ApiError> {
    let order = state
        .orders
        .update_status(&actor, path.into_inner(), body.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(order))
}

/// `POST /products/{id}/restock`
pub async fn restock_product(
    state: web::Data<AppState>,
    Caller(actor): Caller,
    path: web::Path<Uuid>,
    body: web::Json<RestockProduct>,
) -> Result<HttpResponse, ApiError> {
    let product = state.orders.restock(&actor, path.into_inner(), body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(product))
}
