use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header::SET_COOKIE, HeaderValue, StatusCode},
    middleware,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use tracing::instrument;

use super::dto::{AuthResponse, LoginRequest, RegisterRequest};
use crate::{error::AppError, rate_limit::rate_limit, state::AppState};

pub const SESSION_COOKIE: &str = "token";

/// Register and login, both behind the auth limiter.
pub fn auth_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route_layer(middleware::from_fn_with_state(
            state.auth_limiter.clone(),
            rate_limit,
        ))
}

/// HttpOnly mirror of the bearer token for browser clients.
fn session_cookie(state: &AppState, token: &str) -> Result<HeaderValue, AppError> {
    let mut cookie = format!(
        "{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Strict; Max-Age={}",
        state.keys.ttl().as_secs()
    );
    if state.config.environment.is_production() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie).map_err(|e| AppError::Internal(e.into()))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(payload) = payload?;
    let session = state.auth.register(payload).await?;
    let cookie = session_cookie(&state, &session.token)?;
    Ok((
        StatusCode::CREATED,
        [(SET_COOKIE, cookie)],
        Json(AuthResponse::from(session)),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(payload) = payload?;
    let session = state.auth.login(payload).await?;
    let cookie = session_cookie(&state, &session.token)?;
    Ok(([(SET_COOKIE, cookie)], Json(AuthResponse::from(session))))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::{AppConfig, Environment};
    use crate::storage::MemoryStorage;

    #[test]
    fn cookie_is_http_only_and_strict() {
        let state = AppState::fake();
        let cookie = session_cookie(&state, "abc.def.ghi").unwrap();
        let cookie = cookie.to_str().unwrap();
        assert!(cookie.starts_with("token=abc.def.ghi;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Strict"));
        assert!(cookie.contains("Max-Age=86400"));
        assert!(!cookie.contains("Secure"));
    }

    #[test]
    fn cookie_is_secure_in_production() {
        let mut cfg = AppConfig::for_tests();
        cfg.environment = Environment::Production;
        let state = AppState::fake_with_config(cfg, Arc::new(MemoryStorage::new()));
        let cookie = session_cookie(&state, "t").unwrap();
        assert!(cookie.to_str().unwrap().ends_with("; Secure"));
    }
}
