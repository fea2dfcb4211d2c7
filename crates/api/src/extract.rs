//! Request extractors.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::UserId;

use crate::error::ApiError;

/// Header carrying the verified caller id, set by the identity proxy.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser(pub UserId);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| ApiError::Unauthorized(format!("missing {USER_ID_HEADER} header")))?;
        let raw = value
            .to_str()
            .map_err(|_| ApiError::Unauthorized(format!("{USER_ID_HEADER} is not valid text")))?;
        let user_id = UserId::parse(raw.trim())
            .map_err(|e| ApiError::Unauthorized(format!("{USER_ID_HEADER} is not a UUID: {e}")))?;
        Ok(CurrentUser(user_id))
    }
}
