use std::sync::Arc;

use anyhow::Context;
use time::OffsetDateTime;
use tracing::{error, info, warn};

use super::dto::{LoginRequest, RegisterRequest, Session};
use super::jwt::JwtKeys;
use super::password::PasswordHasher;
use super::validation::{validate_login, validate_registration};
use crate::error::AppError;
use crate::users::{Identifier, NewUser, StoreError, UserStore};

/// Registration and login orchestration over the store, hasher and token keys.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    hasher: Arc<PasswordHasher>,
    keys: JwtKeys,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserStore>, hasher: Arc<PasswordHasher>, keys: JwtKeys) -> Self {
        Self {
            users,
            hasher,
            keys,
        }
    }

    pub async fn register(&self, req: RegisterRequest) -> Result<Session, AppError> {
        let reg = validate_registration(&req).map_err(|v| {
            warn!(violations = v.len(), "registration validation failed");
            AppError::Validation(v)
        })?;

        if self.users.exists(&reg.username, &reg.email).await? {
            warn!("registration rejected: account already exists");
            return Err(AppError::DuplicateAccount);
        }

        let hasher = self.hasher.clone();
        let password = reg.password;
        let password_hash = tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .context("join hash task")??;

        let user = match self
            .users
            .insert(NewUser {
                username: reg.username,
                email: reg.email,
                password_hash,
            })
            .await
        {
            Ok(u) => u,
            Err(StoreError::Duplicate) => {
                warn!("registration lost a uniqueness race");
                return Err(AppError::DuplicateAccount);
            }
            Err(StoreError::Other(e)) => {
                error!(error = %e, "create user failed");
                return Err(AppError::Internal(e));
            }
        };

        let token = self.keys.issue(&user)?;
        info!(user_id = %user.id, username = %user.username, "user registered");
        Ok(Session { token, user })
    }

    pub async fn login(&self, req: LoginRequest) -> Result<Session, AppError> {
        validate_login(&req).map_err(AppError::Validation)?;
        let identifier = Identifier::parse(&req.username);

        let credentials = self.users.find_credentials(&identifier).await?;

        let hasher = self.hasher.clone();
        let stored_hash = credentials.as_ref().map(|c| c.password_hash.clone());
        let password = req.password;
        let verified = tokio::task::spawn_blocking(move || match stored_hash {
            Some(hash) => hasher.verify(&password, &hash),
            None => Ok(hasher.verify_absent(&password)),
        })
        .await
        .context("join verify task")?;

        let mut user = match (credentials, verified) {
            (Some(c), Ok(true)) => c.user,
            (Some(c), Err(e)) => {
                error!(error = %e, user_id = %c.user.id, "stored password hash unreadable");
                return Err(AppError::InvalidCredentials);
            }
            (Some(c), Ok(false)) => {
                warn!(user_id = %c.user.id, "login invalid password");
                return Err(AppError::InvalidCredentials);
            }
            (None, _) => {
                warn!("login unknown account");
                return Err(AppError::InvalidCredentials);
            }
        };

        let now = OffsetDateTime::now_utc();
        self.users.touch_last_login(user.id, now).await?;
        user.last_login = Some(now);

        let token = self.keys.issue(&user)?;
        info!(user_id = %user.id, username = %user.username, "user logged in");
        Ok(Session { token, user })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::users::{MemoryUserStore, Role};

    fn service() -> AuthService {
        let cfg = AppConfig::for_tests();
        AuthService::new(
            Arc::new(MemoryUserStore::new()),
            Arc::new(PasswordHasher::new(cfg.hash).unwrap()),
            JwtKeys::new(&cfg.jwt),
        )
    }

    fn keys() -> JwtKeys {
        JwtKeys::new(&AppConfig::for_tests().jwt)
    }

    fn register_req(username: &str, email: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.into(),
            email: email.into(),
            password: "Passw0rd1".into(),
        }
    }

    fn login_req(username: &str, password: &str) -> LoginRequest {
        LoginRequest {
            username: username.into(),
            password: password.into(),
        }
    }

    #[tokio::test]
    async fn register_then_login_tokens_agree() {
        let svc = service();
        let reg = svc.register(register_req("alice", "alice@x.com")).await.unwrap();
        let login = svc.login(login_req("alice", "Passw0rd1")).await.unwrap();

        let a = keys().verify(&reg.token).unwrap();
        let b = keys().verify(&login.token).unwrap();
        assert_eq!(a.sub, b.sub);
        assert_eq!(a.username, b.username);
        assert_eq!(a.role, b.role);
        assert_eq!(a.role, Role::User);
        assert!(login.user.last_login.is_some());
    }

    #[tokio::test]
    async fn login_by_email_is_case_insensitive() {
        let svc = service();
        svc.register(register_req("alice", "alice@x.com")).await.unwrap();
        let session = svc.login(login_req("ALICE@x.com", "Passw0rd1")).await.unwrap();
        assert_eq!(session.user.username, "alice");
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_user_look_the_same() {
        let svc = service();
        svc.register(register_req("alice", "alice@x.com")).await.unwrap();

        let wrong = svc.login(login_req("alice", "Wr0ngPass")).await.unwrap_err();
        let missing = svc.login(login_req("nobody", "Passw0rd1")).await.unwrap_err();
        assert!(matches!(wrong, AppError::InvalidCredentials));
        assert!(matches!(missing, AppError::InvalidCredentials));
        assert_eq!(wrong.to_string(), missing.to_string());
        assert_eq!(wrong.to_string(), "invalid credentials");
    }

    #[tokio::test]
    async fn duplicate_username_or_email_rejected() {
        let svc = service();
        svc.register(register_req("alice", "alice@x.com")).await.unwrap();

        let by_name = svc.register(register_req("alice", "other@x.com")).await.unwrap_err();
        let by_email = svc.register(register_req("bob", "Alice@X.com")).await.unwrap_err();
        assert!(matches!(by_name, AppError::DuplicateAccount));
        assert!(matches!(by_email, AppError::DuplicateAccount));
    }

    #[tokio::test]
    async fn invalid_input_never_reaches_store() {
        let svc = service();
        let err = svc.register(register_req("a", "bad")).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        let users = svc.users.list().await.unwrap();
        assert!(users.is_empty());
    }
}
