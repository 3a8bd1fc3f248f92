use std::collections::HashMap;

use axum::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::repo::{StoreError, UserStore};
use super::repo_types::{Credentials, Identifier, NewUser, Role, User};

/// In-process store with the same uniqueness rules as the `users` table.
#[derive(Default)]
pub struct MemoryUserStore {
    records: RwLock<HashMap<Uuid, Credentials>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn insert(&self, new_user: NewUser) -> Result<User, StoreError> {
        let mut records = self.records.write().await;
        let taken = records
            .values()
            .any(|c| c.user.username == new_user.username || c.user.email == new_user.email);
        if taken {
            return Err(StoreError::Duplicate);
        }
        let user = User {
            id: Uuid::new_v4(),
            username: new_user.username,
            email: new_user.email,
            role: Role::User,
            profile_image: None,
            created_at: OffsetDateTime::now_utc(),
            last_login: None,
        };
        records.insert(
            user.id,
            Credentials {
                user: user.clone(),
                password_hash: new_user.password_hash,
            },
        );
        Ok(user)
    }

    async fn exists(&self, username: &str, email: &str) -> anyhow::Result<bool> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .any(|c| c.user.username == username || c.user.email == email))
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        Ok(self.records.read().await.get(&id).map(|c| c.user.clone()))
    }

    async fn find_credentials(&self, identifier: &Identifier) -> anyhow::Result<Option<Credentials>> {
        let records = self.records.read().await;
        let found = records.values().find(|c| match identifier {
            Identifier::Username(name) => &c.user.username == name,
            Identifier::Email(email) => &c.user.email == email,
        });
        Ok(found.cloned())
    }

    async fn touch_last_login(&self, id: Uuid, at: OffsetDateTime) -> anyhow::Result<()> {
        if let Some(c) = self.records.write().await.get_mut(&id) {
            c.user.last_login = Some(at);
        }
        Ok(())
    }

    async fn swap_profile_image(
        &self,
        id: Uuid,
        image: Option<&str>,
    ) -> anyhow::Result<Option<Option<String>>> {
        let mut records = self.records.write().await;
        Ok(records.get_mut(&id).map(|c| {
            std::mem::replace(&mut c.user.profile_image, image.map(str::to_string))
        }))
    }

    async fn set_role(&self, username: &str, role: Role) -> anyhow::Result<bool> {
        let mut records = self.records.write().await;
        match records.values_mut().find(|c| c.user.username == username) {
            Some(c) => {
                c.user.role = role;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list(&self) -> anyhow::Result<Vec<User>> {
        let mut users: Vec<User> = self
            .records
            .read()
            .await
            .values()
            .map(|c| c.user.clone())
            .collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(username: &str, email: &str) -> NewUser {
        NewUser {
            username: username.into(),
            email: email.into(),
            password_hash: "$argon2id$stub".into(),
        }
    }

    #[tokio::test]
    async fn rejects_duplicate_username_or_email() {
        let store = MemoryUserStore::new();
        store.insert(new_user("alice", "alice@x.com")).await.expect("first insert");

        let same_name = store.insert(new_user("alice", "other@x.com")).await;
        assert!(matches!(same_name, Err(StoreError::Duplicate)));

        let same_email = store.insert(new_user("bob", "alice@x.com")).await;
        assert!(matches!(same_email, Err(StoreError::Duplicate)));
    }

    #[tokio::test]
    async fn default_read_has_no_hash_but_credentials_do() {
        let store = MemoryUserStore::new();
        let user = store.insert(new_user("alice", "alice@x.com")).await.unwrap();
        assert_eq!(user.role, Role::User);

        let creds = store
            .find_credentials(&Identifier::Email("alice@x.com".into()))
            .await
            .unwrap()
            .expect("credentials");
        assert_eq!(creds.user.id, user.id);
        assert_eq!(creds.password_hash, "$argon2id$stub");
    }

    #[tokio::test]
    async fn profile_image_and_role_updates() {
        let store = MemoryUserStore::new();
        let user = store.insert(new_user("alice", "alice@x.com")).await.unwrap();

        let swapped = store.swap_profile_image(user.id, Some("/uploads/a.jpg")).await.unwrap();
        assert_eq!(swapped, Some(None));
        let swapped = store.swap_profile_image(user.id, Some("/uploads/b.jpg")).await.unwrap();
        assert_eq!(swapped, Some(Some("/uploads/a.jpg".to_string())));
        assert_eq!(store.swap_profile_image(Uuid::new_v4(), None).await.unwrap(), None);
        assert!(store.set_role("alice", Role::Admin).await.unwrap());

        let loaded = store.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(loaded.profile_image.as_deref(), Some("/uploads/b.jpg"));
        assert_eq!(loaded.role, Role::Admin);
    }
}
