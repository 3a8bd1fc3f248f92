use anyhow::Context;
use axum::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo::{StoreError, UserStore};
use super::repo_types::{Credentials, Identifier, NewUser, Role, User, UserRow};

const USER_COLUMNS: &str =
    "id, username, email, password_hash, role, profile_image, created_at, last_login";

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let db = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(std::time::Duration::from_secs(5))
            .connect(database_url)
            .await
            .context("connect to database")?;
        Ok(Self { db })
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.db)
            .await
            .context("run migrations")
    }

    async fn fetch_row(&self, sql: &str, bind: &str) -> anyhow::Result<Option<UserRow>> {
        let row = sqlx::query_as::<_, UserRow>(sql)
            .bind(bind)
            .fetch_optional(&self.db)
            .await?;
        Ok(row)
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|e| e.is_unique_violation())
        .unwrap_or(false)
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn insert(&self, new_user: NewUser) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (id, username, email, password_hash, role)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&new_user.username)
        .bind(&new_user.email)
        .bind(&new_user.password_hash)
        .bind(Role::User.as_str())
        .fetch_one(&self.db)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Duplicate
            } else {
                StoreError::Other(anyhow::Error::new(e).context("insert user"))
            }
        })?;
        Ok(row.into_credentials()?.user)
    }

    async fn exists(&self, username: &str, email: &str) -> anyhow::Result<bool> {
        let (found,): (bool,) = sqlx::query_as(
            r#"SELECT EXISTS (SELECT 1 FROM users WHERE username = $1 OR email = $2)"#,
        )
        .bind(username)
        .bind(email)
        .fetch_one(&self.db)
        .await
        .context("check existing user")?;
        Ok(found)
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find user by id")?;
        row.map(|r| r.into_credentials().map(|c| c.user)).transpose()
    }

    async fn find_credentials(&self, identifier: &Identifier) -> anyhow::Result<Option<Credentials>> {
        let row = match identifier {
            Identifier::Username(name) => {
                self.fetch_row(
                    &format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1"),
                    name,
                )
                .await
            }
            Identifier::Email(email) => {
                self.fetch_row(
                    &format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"),
                    email,
                )
                .await
            }
        }
        .context("find credentials")?;
        row.map(UserRow::into_credentials).transpose()
    }

    async fn touch_last_login(&self, id: Uuid, at: OffsetDateTime) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET last_login = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.db)
            .await
            .context("update last_login")?;
        Ok(())
    }

    async fn swap_profile_image(
        &self,
        id: Uuid,
        image: Option<&str>,
    ) -> anyhow::Result<Option<Option<String>>> {
        // The row lock in the subquery serializes concurrent swaps on one user.
        let previous: Option<(Option<String>,)> = sqlx::query_as(
            r#"
            UPDATE users u SET profile_image = $2
            FROM (SELECT id, profile_image FROM users WHERE id = $1 FOR UPDATE) prev
            WHERE u.id = prev.id
            RETURNING prev.profile_image
            "#,
        )
        .bind(id)
        .bind(image)
        .fetch_optional(&self.db)
        .await
        .context("swap profile_image")?;
        Ok(previous.map(|(old,)| old))
    }

    async fn set_role(&self, username: &str, role: Role) -> anyhow::Result<bool> {
        let result = sqlx::query("UPDATE users SET role = $2 WHERE username = $1")
            .bind(username)
            .bind(role.as_str())
            .execute(&self.db)
            .await
            .context("update role")?;
        Ok(result.rows_affected() == 1)
    }

    async fn list(&self) -> anyhow::Result<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC"
        ))
        .fetch_all(&self.db)
        .await
        .context("list users")?;
        rows.into_iter()
            .map(|r| r.into_credentials().map(|c| c.user))
            .collect()
    }

    async fn close(&self) {
        self.db.close().await;
    }
}
