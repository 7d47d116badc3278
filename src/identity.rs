// ABOUTME: Identity boundary: turns the gateway-supplied user id header into a loaded Caller
// ABOUTME: Authentication itself happens upstream; a missing or unknown id is Unauthorized

use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::entities::user;
use crate::error::AppError;
use crate::AppState;

pub const USER_HEADER: &str = "x-user-id";

/// The authenticated user behind a request.
#[derive(Debug, Clone)]
pub struct Caller(pub user::Model);

#[async_trait::async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_HEADER)
            .ok_or_else(|| AppError::Unauthorized("missing authenticated user".to_string()))?
            .to_str()
            .map_err(|_| AppError::Unauthorized("malformed user header".to_string()))?;
        let user_id = Uuid::parse_str(raw.trim())
            .map_err(|_| AppError::Unauthorized("malformed user id".to_string()))?;

        match state.storage.get_user(user_id).await {
            Ok(user) => Ok(Caller(user)),
            Err(AppError::NotFound(_)) => Err(AppError::Unauthorized(format!("unknown user {}", user_id))),
            Err(err) => Err(err),
        }
    }
}
