use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use super::jwt::Claims;
use crate::error::AppError;

/// Identity attached by `require_auth`. Handlers behind that stage take this
/// instead of re-reading the header.
pub struct AuthUser(pub Claims);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Claims>()
            .cloned()
            .map(AuthUser)
            .ok_or(AppError::Unauthorized)
    }
}
