use axum::{extract::State, middleware, routing::get, Json, Router};
use serde::Serialize;
use tracing::{info, instrument};

use crate::{
    auth::{
        middleware::{require_admin, require_auth},
        AuthUser,
    },
    error::AppError,
    state::AppState,
    telemetry::LogEntry,
    users::{User, UserStats},
};

pub fn admin_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/admin/users", get(list_users))
        .route("/admin/stats", get(stats))
        .route("/admin/logs", get(logs))
        .route_layer(middleware::from_fn(require_admin))
        .route_layer(middleware::from_fn_with_state(
            state.keys.clone(),
            require_auth,
        ))
}

#[derive(Debug, Serialize)]
pub struct UsersResponse {
    pub success: bool,
    pub users: Vec<User>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminStats {
    #[serde(flatten)]
    pub users: UserStats,
    pub recent_errors: usize,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub success: bool,
    pub stats: AdminStats,
}

#[derive(Debug, Serialize)]
pub struct LogsResponse {
    pub success: bool,
    pub logs: Vec<LogEntry>,
}

#[instrument(skip(state, admin), fields(admin = %admin.username))]
pub async fn list_users(
    State(state): State<AppState>,
    AuthUser(admin): AuthUser,
) -> Result<Json<UsersResponse>, AppError> {
    let users = state.users.list().await?;
    info!(count = users.len(), "admin listed users");
    Ok(Json(UsersResponse {
        success: true,
        users,
    }))
}

#[instrument(skip(state))]
pub async fn stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, AppError> {
    let users = state.users.list().await?;
    Ok(Json(StatsResponse {
        success: true,
        stats: AdminStats {
            users: UserStats::from_users(&users),
            recent_errors: state.recent_logs.error_count(),
        },
    }))
}

#[instrument(skip(state))]
pub async fn logs(State(state): State<AppState>) -> Json<LogsResponse> {
    Json(LogsResponse {
        success: true,
        logs: state.recent_logs.snapshot(),
    })
}
