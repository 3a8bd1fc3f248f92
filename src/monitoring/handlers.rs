use std::net::SocketAddr;

use axum::{
    extract::{rejection::JsonRejection, ConnectInfo},
    http::{header::USER_AGENT, HeaderMap},
    routing::{get, post},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{instrument, warn};

use crate::{
    error::{AppError, FieldViolation},
    state::AppState,
};

lazy_static! {
    static ref EVENT_RE: Regex = Regex::new(r"^[A-Za-z0-9_.:-]{1,64}$").unwrap();
}

const DETAILS_MAX: usize = 2000;
const USER_AGENT_MAX: usize = 512;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/security-log", post(security_log))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK",
        timestamp: OffsetDateTime::now_utc(),
    })
}

/// Event reported by the browser, e.g. a blocked XSS attempt in a form.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SecurityEvent {
    pub event: String,
    pub details: Option<serde_json::Value>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Ack {
    pub success: bool,
}

fn validate_event(ev: &SecurityEvent) -> Result<String, Vec<FieldViolation>> {
    let mut violations = Vec::new();
    if !EVENT_RE.is_match(&ev.event) {
        violations.push(FieldViolation::new(
            "event",
            "event must be 1-64 characters of letters, digits, '_', '.', ':' or '-'",
        ));
    }
    let details = ev
        .details
        .as_ref()
        .map(|d| d.to_string())
        .unwrap_or_default();
    if details.len() > DETAILS_MAX {
        violations.push(FieldViolation::new(
            "details",
            "details must be at most 2000 bytes",
        ));
    }
    if violations.is_empty() {
        Ok(details)
    } else {
        Err(violations)
    }
}

#[instrument(skip_all)]
pub async fn security_log(
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    payload: Result<Json<SecurityEvent>, JsonRejection>,
) -> Result<Json<Ack>, AppError> {
    let Json(event) = payload?;
    let details = validate_event(&event).map_err(AppError::Validation)?;

    let user_agent: String = event
        .user_agent
        .as_deref()
        .or_else(|| headers.get(USER_AGENT).and_then(|v| v.to_str().ok()))
        .unwrap_or("-")
        .chars()
        .take(USER_AGENT_MAX)
        .collect();
    let client = connect_info
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".into());

    warn!(
        target: "owasp_lab::security",
        event = %event.event,
        details = %details,
        user_agent = %user_agent,
        client = %client,
        "client security event"
    );
    Ok(Json(Ack { success: true }))
}
