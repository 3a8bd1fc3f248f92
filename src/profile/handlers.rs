use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path, State},
    http::{
        header::{CACHE_CONTROL, CONTENT_TYPE},
        StatusCode,
    },
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use bytes::BytesMut;
use serde::Serialize;
use tracing::{instrument, warn};

use crate::{
    auth::{middleware::require_auth, AuthUser},
    error::AppError,
    images::{
        sanitizer::{is_generated_file_name, OUTPUT_CONTENT_TYPE, REJECT_TOO_LARGE},
        services::{remove_profile_image, replace_profile_image},
        UploadCandidate,
    },
    state::AppState,
    users::User,
};

pub const IMAGE_FIELD: &str = "image";
// Multipart framing around the file part.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Body ceiling for the upload route: the image cap plus multipart framing.
fn upload_body_limit(max_bytes: usize) -> usize {
    max_bytes.saturating_add(MULTIPART_OVERHEAD)
}

pub fn profile_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/profile", get(get_profile))
        .route(
            "/profile/upload",
            post(upload_image).layer(DefaultBodyLimit::max(upload_body_limit(
                state.sanitizer.max_bytes(),
            ))),
        )
        .route("/profile/image", delete(delete_image))
        .route_layer(middleware::from_fn_with_state(
            state.keys.clone(),
            require_auth,
        ))
}

pub fn upload_routes() -> Router<AppState> {
    Router::new().route("/uploads/:file", get(serve_upload))
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub success: bool,
    pub user: User,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    pub message: &'static str,
    pub profile_image: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: &'static str,
}

#[instrument(skip(state, claims), fields(user_id = %claims.sub))]
pub async fn get_profile(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<Json<ProfileResponse>, AppError> {
    let user = state
        .users
        .find_by_id(claims.sub)
        .await?
        .ok_or(AppError::NotFound("user"))?;
    Ok(Json(ProfileResponse {
        success: true,
        user,
    }))
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        warn!("upload rejected: body limit exceeded");
        AppError::ImageRejected(REJECT_TOO_LARGE)
    } else {
        AppError::BadRequest(e.body_text())
    }
}

/// Pulls the `image` part out of the form, reading chunk by chunk so an
/// oversized body is refused as soon as it crosses `max_bytes`.
async fn read_image_field(mut mp: Multipart, max_bytes: usize) -> Result<UploadCandidate, AppError> {
    while let Some(mut field) = mp.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        let file_name = field.file_name().map(str::to_owned);
        let content_type = field.content_type().map(str::to_owned);

        let mut body = BytesMut::new();
        while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
            if body.len() + chunk.len() > max_bytes {
                warn!(max = max_bytes, "upload rejected: too large");
                return Err(AppError::ImageRejected(REJECT_TOO_LARGE));
            }
            body.extend_from_slice(&chunk);
        }
        return Ok(UploadCandidate {
            file_name,
            content_type,
            body: body.freeze(),
        });
    }
    Err(AppError::BadRequest("no image uploaded".into()))
}

#[instrument(skip(state, claims, mp), fields(user_id = %claims.sub))]
pub async fn upload_image(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    mp: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let candidate = read_image_field(mp, state.sanitizer.max_bytes()).await?;
    let reference = replace_profile_image(&state, claims.sub, candidate).await?;
    Ok(Json(UploadResponse {
        success: true,
        message: "profile image updated",
        profile_image: reference,
    }))
}

#[instrument(skip(state, claims), fields(user_id = %claims.sub))]
pub async fn delete_image(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<Json<MessageResponse>, AppError> {
    remove_profile_image(&state, claims.sub).await?;
    Ok(Json(MessageResponse {
        success: true,
        message: "profile image removed",
    }))
}

/// Serves stored images. Only names the sanitizer could have produced are looked up.
#[instrument(skip(state))]
pub async fn serve_upload(
    State(state): State<AppState>,
    Path(file): Path<String>,
) -> Result<Response, AppError> {
    if !is_generated_file_name(&file) {
        return Err(AppError::NotFound("file"));
    }
    let body = state
        .storage
        .get_object(&file)
        .await?
        .ok_or(AppError::NotFound("file"))?;
    Ok((
        [
            (CONTENT_TYPE, OUTPUT_CONTENT_TYPE),
            (CACHE_CONTROL, "public, max-age=86400"),
        ],
        body,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::AppConfig;
    use crate::storage::MemoryStorage;

    #[test]
    fn upload_limit_adds_framing_without_overflow() {
        assert_eq!(upload_body_limit(1024), 1024 + MULTIPART_OVERHEAD);
        assert_eq!(upload_body_limit(usize::MAX), usize::MAX);
    }

    #[test]
    fn huge_upload_cap_still_builds_routes() {
        let config = AppConfig {
            upload_max_bytes: usize::MAX,
            ..AppConfig::for_tests()
        };
        let state = AppState::fake_with_config(config, Arc::new(MemoryStorage::new()));
        let _ = profile_routes(&state);
    }
}
