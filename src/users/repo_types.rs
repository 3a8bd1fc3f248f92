use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Closed set of roles. Every gate matches on it exhaustively.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => anyhow::bail!("unknown role {other:?}"),
        }
    }
}

/// User record as returned by default reads. Carries no secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub profile_image: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_login: Option<OffsetDateTime>,
}

/// A user together with its password hash. Only the login path reads this.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub user: User,
    pub password_hash: String,
}

/// Input for a new account; the hash is already computed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

/// How a login identifier should be matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identifier {
    Username(String),
    Email(String),
}

impl Identifier {
    /// Anything containing `@` is treated as an email and lowercased.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.contains('@') {
            Identifier::Email(raw.to_lowercase())
        } else {
            Identifier::Username(raw.to_string())
        }
    }
}

/// Row shape of the `users` table.
#[derive(Debug, Clone, FromRow)]
pub(crate) struct UserRow {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub profile_image: Option<String>,
    pub created_at: OffsetDateTime,
    pub last_login: Option<OffsetDateTime>,
}

impl UserRow {
    pub(crate) fn into_credentials(self) -> anyhow::Result<Credentials> {
        let role = self.role.parse::<Role>()?;
        Ok(Credentials {
            password_hash: self.password_hash,
            user: User {
                id: self.id,
                username: self.username,
                email: self.email,
                role,
                profile_image: self.profile_image,
                created_at: self.created_at,
                last_login: self.last_login,
            },
        })
    }
}

/// Aggregate figures for the admin console.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub total_users: usize,
    pub total_admins: usize,
    pub users_with_image: usize,
}

impl UserStats {
    pub fn from_users(users: &[User]) -> Self {
        Self {
            total_users: users.len(),
            total_admins: users.iter().filter(|u| u.role == Role::Admin).count(),
            users_with_image: users.iter().filter(|u| u.profile_image.is_some()).count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"admin\"");
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert!("Admin".parse::<Role>().is_err());
    }

    #[test]
    fn identifier_detects_email() {
        assert_eq!(
            Identifier::parse(" Alice@X.com "),
            Identifier::Email("alice@x.com".into())
        );
        assert_eq!(Identifier::parse("alice"), Identifier::Username("alice".into()));
    }

    #[test]
    fn user_json_is_camel_case_without_secret() {
        let user = User {
            id: Uuid::new_v4(),
            username: "alice".into(),
            email: "alice@x.com".into(),
            role: Role::User,
            profile_image: None,
            created_at: OffsetDateTime::now_utc(),
            last_login: None,
        };
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["role"], "user");
        assert!(json.get("profileImage").is_some());
        assert!(json.get("createdAt").is_some());
        assert!(json.get("password_hash").is_none());
        assert!(json.get("passwordHash").is_none());
    }
}
