use std::sync::Arc;

use axum::{
    async_trait,
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
};
use serde_json::{json, Value};
use time::OffsetDateTime;
use tower::ServiceExt;
use uuid::Uuid;

use owasp_lab::{
    app::build_app,
    config::{AppConfig, Environment},
    state::AppState,
    storage::MemoryStorage,
    telemetry::RecentLogs,
    users::{Credentials, Identifier, NewUser, Role, StoreError, User, UserStore},
};

const DB_DETAIL: &str = "db down at 10.0.0.3:5432";

/// A user store whose backend is unreachable.
struct UnreachableStore;

fn unreachable() -> anyhow::Error {
    anyhow::anyhow!(DB_DETAIL)
}

#[async_trait]
impl UserStore for UnreachableStore {
    async fn insert(&self, _new_user: NewUser) -> Result<User, StoreError> {
        Err(StoreError::Other(unreachable()))
    }

    async fn exists(&self, _username: &str, _email: &str) -> anyhow::Result<bool> {
        Err(unreachable())
    }

    async fn find_by_id(&self, _id: Uuid) -> anyhow::Result<Option<User>> {
        Err(unreachable())
    }

    async fn find_credentials(&self, _identifier: &Identifier) -> anyhow::Result<Option<Credentials>> {
        Err(unreachable())
    }

    async fn touch_last_login(&self, _id: Uuid, _at: OffsetDateTime) -> anyhow::Result<()> {
        Err(unreachable())
    }

    async fn swap_profile_image(
        &self,
        _id: Uuid,
        _image: Option<&str>,
    ) -> anyhow::Result<Option<Option<String>>> {
        Err(unreachable())
    }

    async fn set_role(&self, _username: &str, _role: Role) -> anyhow::Result<bool> {
        Err(unreachable())
    }

    async fn list(&self) -> anyhow::Result<Vec<User>> {
        Err(unreachable())
    }
}

fn state_for(environment: Environment) -> AppState {
    let config = AppConfig {
        environment,
        ..AppConfig::for_tests()
    };
    AppState::from_parts(
        config,
        Arc::new(UnreachableStore),
        Arc::new(MemoryStorage::new()),
        RecentLogs::default(),
    )
    .unwrap()
}

fn token(state: &AppState) -> String {
    let user = User {
        id: Uuid::new_v4(),
        username: "alice".into(),
        email: "alice@x.com".into(),
        role: Role::User,
        profile_image: None,
        created_at: OffsetDateTime::now_utc(),
        last_login: None,
    };
    state.keys.issue(&user).unwrap()
}

async fn call(state: AppState, req: Request<Body>) -> (StatusCode, Value, String) {
    let app = build_app(state).unwrap();
    let res = app.oneshot(req).await.unwrap();
    let status = res.status();
    let raw = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8_lossy(&raw).into_owned();
    (status, serde_json::from_slice(&raw).unwrap(), text)
}

fn profile_request(state: &AppState) -> Request<Body> {
    Request::get("/api/profile")
        .header(header::AUTHORIZATION, format!("Bearer {}", token(state)))
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn production_hides_store_failure_detail() {
    let state = state_for(Environment::Production);
    let req = profile_request(&state);

    let (status, body, text) = call(state, req).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "INTERNAL_ERROR");
    assert_eq!(body["message"], "internal server error");
    assert!(!text.contains("10.0.0.3"));
}

#[tokio::test]
async fn development_shows_store_failure_detail() {
    let state = state_for(Environment::Development);
    let req = profile_request(&state);

    let (status, body, _) = call(state, req).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "INTERNAL_ERROR");
    assert!(body["message"].as_str().unwrap().contains(DB_DETAIL));
}

#[tokio::test]
async fn production_login_failure_is_generic() {
    let state = state_for(Environment::Production);
    let req = Request::post("/api/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({"username": "alice", "password": "Passw0rd1"}).to_string(),
        ))
        .unwrap();

    let (status, body, text) = call(state, req).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "internal server error");
    assert!(!text.contains(DB_DETAIL));
}
