use actix_web::dev::Payload;
use actix_web::{web, FromRequest, HttpRequest};
use futures_util::future::LocalBoxFuture;
use uuid::Uuid;

use crate::models::User;
use super::{ApiError, AppState};

/// Header carrying the acting user's id. Issuing and checking credentials
/// happens in front of this service.
pub const USER_HEADER: &str = "X-User-Id";

/// The active user a request acts as.
#[derive(Debug, Clone)]
pub struct Caller(pub User);

impl FromRequest for Caller {
    type Error = ApiError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let state = req.app_data::<web::Data<AppState>>().cloned();
        let header = req
            .headers()
            .get(USER_HEADER)
            .map(|value| value.to_str().map(|s| s.trim().to_string()));

        Box::pin(async move {
            let state = state.ok_or_else(|| ApiError::Persistence("application state not configured".into()))?;

            let raw = match header {
                None => return Err(ApiError::Unauthorized(format!("Missing {} header", USER_HEADER))),
                Some(Err(_)) => return Err(ApiError::Unauthorized(format!("Invalid {} header", USER_HEADER))),
                Some(Ok(raw)) => raw,
            };
            let user_id = Uuid::parse_str(&raw)
                .map_err(|_| ApiError::Unauthorized(format!("Invalid {} header", USER_HEADER)))?;

            let user = state
                .store
                .get_user(user_id)
                .await?
                .ok_or_else(|| ApiError::Unauthorized("Unknown user".to_string()))?;
            if !user.active {
                return Err(ApiError::Forbidden("User account is inactive".to_string()));
            }

            Ok(Caller(user))
        })
    }
}
