use crate::state::AppState;
use axum::Router;

mod dto;
pub mod extractors;
pub mod handlers;
pub mod jwt;
pub mod middleware;
pub mod password;
pub mod services;
pub mod validation;

pub use dto::{AuthResponse, LoginRequest, RegisterRequest, Session};
pub use extractors::AuthUser;
pub use jwt::{Claims, JwtKeys};

pub fn router(state: &AppState) -> Router<AppState> {
    handlers::auth_routes(state)
}
