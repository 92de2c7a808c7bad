use actix_web::{web, HttpResponse};

use crate::domain::order::RegisterPushToken;
use super::{ApiError, AppState, Caller};

/// `GET /users/me`
pub async fn current_user(Caller(actor): Caller) -> HttpResponse {
    HttpResponse::Ok().json(actor)
}

/// `PUT /users/me/push-token`
pub async fn register_push_token(
    state: web::Data<AppState>,
    Caller(actor): Caller,
    body: web::Json<RegisterPushToken>,
) -> Result<HttpResponse, ApiError> {
    state.orders.register_push_token(&actor, body.into_inner().token).await?;
    Ok(HttpResponse::NoContent().finish())
}
