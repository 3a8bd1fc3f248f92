use anyhow::Context;
use tracing::{info, warn};
use uuid::Uuid;

use super::sanitizer::{UploadCandidate, OUTPUT_CONTENT_TYPE};
use crate::error::AppError;
use crate::state::AppState;

pub const PUBLIC_PREFIX: &str = "/uploads/";

/// Reference stored on the user record for a stored object.
pub fn public_path(file_name: &str) -> String {
    format!("{PUBLIC_PREFIX}{file_name}")
}

/// Storage key behind a stored reference.
pub fn key_from_reference(reference: &str) -> Option<&str> {
    reference
        .strip_prefix(PUBLIC_PREFIX)
        .filter(|k| !k.is_empty())
}

async fn discard_object(st: &AppState, key: &str) {
    if let Err(e) = st.storage.delete_object(key).await {
        warn!(error = %e, key = %key, "failed to delete stored image");
    }
}

async fn discard_reference(st: &AppState, reference: Option<String>) {
    if let Some(key) = reference.as_deref().and_then(key_from_reference) {
        discard_object(st, key).await;
    }
}

/// Validates, re-encodes and stores a new profile image, then swaps the
/// user's reference. Whatever reference the swap displaced is deleted after it.
pub async fn replace_profile_image(
    st: &AppState,
    user_id: Uuid,
    candidate: UploadCandidate,
) -> Result<String, AppError> {
    let accepted = st.sanitizer.accept(candidate)?;

    let user = st
        .users
        .find_by_id(user_id)
        .await?
        .ok_or(AppError::NotFound("user"))?;

    let processed = st.sanitizer.process(accepted).await?;
    st.storage
        .put_object(&processed.file_name, processed.body, OUTPUT_CONTENT_TYPE)
        .await
        .with_context(|| format!("put_object {}", processed.file_name))?;

    let reference = public_path(&processed.file_name);
    let previous = match st.users.swap_profile_image(user_id, Some(&reference)).await {
        Ok(Some(previous)) => previous,
        Ok(None) => {
            discard_object(st, &processed.file_name).await;
            return Err(AppError::NotFound("user"));
        }
        Err(e) => {
            discard_object(st, &processed.file_name).await;
            return Err(AppError::Internal(e));
        }
    };
    discard_reference(st, previous).await;

    info!(user_id = %user_id, username = %user.username, reference = %reference, "profile image updated");
    Ok(reference)
}

pub async fn remove_profile_image(st: &AppState, user_id: Uuid) -> Result<(), AppError> {
    let previous = st
        .users
        .swap_profile_image(user_id, None)
        .await?
        .ok_or(AppError::NotFound("user"))?;

    if previous.is_none() {
        return Err(AppError::BadRequest("no profile image to delete".into()));
    }
    discard_reference(st, previous).await;

    info!(user_id = %user_id, "profile image removed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::Arc;

    use bytes::Bytes;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

    use super::*;
    use crate::storage::MemoryStorage;
    use crate::users::NewUser;

    fn png(w: u32, h: u32) -> Bytes {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([0, 90, 200])));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        Bytes::from(buf.into_inner())
    }

    fn candidate(body: Bytes) -> UploadCandidate {
        UploadCandidate {
            file_name: Some("me.png".into()),
            content_type: Some("image/png".into()),
            body,
        }
    }

    async fn seeded() -> (AppState, Uuid, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        let state = AppState::fake_with_storage(storage.clone());
        let user = state
            .users
            .insert(NewUser {
                username: "alice".into(),
                email: "alice@x.com".into(),
                password_hash: "$argon2id$stub".into(),
            })
            .await
            .unwrap();
        (state, user.id, storage)
    }

    #[test]
    fn reference_roundtrip() {
        assert_eq!(public_path("profile-a.jpg"), "/uploads/profile-a.jpg");
        assert_eq!(key_from_reference("/uploads/profile-a.jpg"), Some("profile-a.jpg"));
        assert_eq!(key_from_reference("/elsewhere/x.jpg"), None);
        assert_eq!(key_from_reference("/uploads/"), None);
    }

    #[tokio::test]
    async fn replacing_deletes_the_previous_object() {
        let (state, id, storage) = seeded().await;

        let first = replace_profile_image(&state, id, candidate(png(50, 50))).await.unwrap();
        let second = replace_profile_image(&state, id, candidate(png(60, 40))).await.unwrap();
        assert_ne!(first, second);

        let keys = storage.keys().await;
        assert_eq!(keys, vec![key_from_reference(&second).unwrap().to_string()]);

        let user = state.users.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(user.profile_image.as_deref(), Some(second.as_str()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_replacements_leave_one_object() {
        let (state, id, storage) = seeded().await;
        replace_profile_image(&state, id, candidate(png(20, 20))).await.unwrap();

        let (a, b, c) = tokio::join!(
            replace_profile_image(&state, id, candidate(png(30, 30))),
            replace_profile_image(&state, id, candidate(png(40, 40))),
            replace_profile_image(&state, id, candidate(png(50, 50))),
        );
        a.unwrap();
        b.unwrap();
        c.unwrap();

        let user = state.users.find_by_id(id).await.unwrap().unwrap();
        let current = user.profile_image.expect("reference");
        assert_eq!(
            storage.keys().await,
            vec![key_from_reference(&current).unwrap().to_string()]
        );
    }

    #[tokio::test]
    async fn rejected_upload_leaves_user_untouched() {
        let (state, id, storage) = seeded().await;
        let oversized = Bytes::from(vec![0u8; 2 * 1024 * 1024]);

        let err = replace_profile_image(&state, id, candidate(oversized)).await.unwrap_err();
        assert!(matches!(err, AppError::ImageRejected(_)));

        let user = state.users.find_by_id(id).await.unwrap().unwrap();
        assert!(user.profile_image.is_none());
        assert!(storage.keys().await.is_empty());
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let state = AppState::fake();
        let err = replace_profile_image(&state, Uuid::new_v4(), candidate(png(8, 8)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound("user")));
    }

    #[tokio::test]
    async fn remove_requires_an_existing_image() {
        let (state, id, storage) = seeded().await;
        let err = remove_profile_image(&state, id).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        replace_profile_image(&state, id, candidate(png(8, 8))).await.unwrap();
        remove_profile_image(&state, id).await.unwrap();

        let user = state.users.find_by_id(id).await.unwrap().unwrap();
        assert!(user.profile_image.is_none());
        assert!(storage.keys().await.is_empty());
    }
}
