pub mod handlers;

use crate::state::AppState;
use axum::Router;

/// `/profile*`, mounted under `/api`.
pub fn router(state: &AppState) -> Router<AppState> {
    handlers::profile_routes(state)
}

/// `/uploads/:file`, mounted at the root.
pub fn uploads_router() -> Router<AppState> {
    handlers::upload_routes()
}
