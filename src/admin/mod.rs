pub mod handlers;

use crate::state::AppState;
use axum::Router;

/// Admin console endpoints. Every route requires a valid token with the admin role.
pub fn router(state: &AppState) -> Router<AppState> {
    handlers::admin_routes(state)
}
