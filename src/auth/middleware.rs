//! Access-control stages layered in front of protected routes.
//!
//! `require_auth` runs first: a missing or malformed `Authorization` header
//! or a token that fails verification ends the request with 401. On success
//! the verified [`Claims`] are stored in the request extensions. Role gates
//! such as `require_admin` run after it and end the request with 403 when
//! the role does not match.

use axum::{
    extract::{OriginalUri, Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use super::jwt::{Claims, JwtKeys};
use crate::error::AppError;
use crate::users::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// No header, or not `Bearer <token>`.
    MissingToken,
    /// Signature, expiry, issuer or audience check failed.
    InvalidToken,
}

/// Extracts the bearer token from the headers.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

pub fn authenticate(headers: &HeaderMap, keys: &JwtKeys) -> Result<Claims, Rejection> {
    let token = bearer_token(headers).ok_or(Rejection::MissingToken)?;
    keys.verify(token).map_err(|_| Rejection::InvalidToken)
}

/// Full request path as the client sent it, before any `nest` prefix was stripped.
pub fn request_path(req: &Request) -> &str {
    req.extensions()
        .get::<OriginalUri>()
        .map(|OriginalUri(uri)| uri.path())
        .unwrap_or_else(|| req.uri().path())
}

/// Whether `actual` satisfies a gate requiring `required`.
pub fn role_allows(required: Role, actual: Role) -> bool {
    match required {
        Role::User => match actual {
            Role::User | Role::Admin => true,
        },
        Role::Admin => match actual {
            Role::Admin => true,
            Role::User => false,
        },
    }
}

pub async fn require_auth(State(keys): State<JwtKeys>, mut req: Request, next: Next) -> Response {
    match authenticate(req.headers(), &keys) {
        Ok(claims) => {
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        Err(Rejection::MissingToken) => {
            warn!(path = %request_path(&req), "access without token");
            AppError::Unauthorized.into_response()
        }
        Err(Rejection::InvalidToken) => {
            warn!(path = %request_path(&req), "access with invalid token");
            AppError::Unauthorized.into_response()
        }
    }
}

async fn require_role(required: Role, req: Request, next: Next) -> Response {
    let Some(claims) = req.extensions().get::<Claims>() else {
        warn!(path = %request_path(&req), "role gate reached without authentication");
        return AppError::Unauthorized.into_response();
    };
    if !role_allows(required, claims.role) {
        warn!(
            path = %request_path(&req),
            username = %claims.username,
            role = %claims.role,
            required = %required,
            "access denied: insufficient role"
        );
        return AppError::Forbidden.into_response();
    }
    next.run(req).await
}

pub async fn require_admin(req: Request, next: Next) -> Response {
    require_role(Role::Admin, req, next).await
}
