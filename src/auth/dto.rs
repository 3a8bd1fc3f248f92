use serde::{Deserialize, Serialize};

use crate::users::User;

/// Request body for user registration. Missing fields read as empty and
/// are reported by validation.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Request body for login. `username` may also hold an email address.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Returned by register and login.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub success: bool,
    pub token: String,
    pub user: User,
}

/// Outcome of a successful register or login before it becomes HTTP.
#[derive(Debug)]
pub struct Session {
    pub token: String,
    pub user: User,
}

impl From<Session> for AuthResponse {
    fn from(s: Session) -> Self {
        Self {
            success: true,
            token: s.token,
            user: s.user,
        }
    }
}
