pub mod handlers;

use crate::state::AppState;
use axum::Router;

/// Health probe and client security-event intake.
pub fn router() -> Router<AppState> {
    handlers::routes()
}
