use axum::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{Credentials, Identifier, NewUser, Role, User};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A unique constraint on username or email rejected the write.
    #[error("duplicate account")]
    Duplicate,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Persistence seam for user records. Each call touches exactly one record,
/// except `list`.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `StoreError::Duplicate` when username or email is taken.
    async fn insert(&self, new_user: NewUser) -> Result<User, StoreError>;

    async fn exists(&self, username: &str, email: &str) -> anyhow::Result<bool>;

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>>;

    async fn find_credentials(&self, identifier: &Identifier) -> anyhow::Result<Option<Credentials>>;

    async fn touch_last_login(&self, id: Uuid, at: OffsetDateTime) -> anyhow::Result<()>;

    /// Replaces the stored reference in one step and hands back the one it
    /// displaced. `None` when no such user exists.
    async fn swap_profile_image(
        &self,
        id: Uuid,
        image: Option<&str>,
    ) -> anyhow::Result<Option<Option<String>>>;

    /// Returns `false` when no such username exists.
    async fn set_role(&self, username: &str, role: Role) -> anyhow::Result<bool>;

    /// Newest first.
    async fn list(&self) -> anyhow::Result<Vec<User>>;

    async fn close(&self) {}
}
