use std::sync::Arc;

use axum::extract::FromRef;
use tracing::{info, warn};

use crate::auth::{jwt::JwtKeys, password::PasswordHasher, services::AuthService};
use crate::catalog::Catalog;
use crate::config::AppConfig;
use crate::images::UploadSanitizer;
use crate::rate_limit::RateLimiter;
use crate::storage::{self, MemoryStorage, StorageClient};
use crate::telemetry::RecentLogs;
use crate::users::{MemoryUserStore, PgUserStore, UserStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserStore>,
    pub storage: Arc<dyn StorageClient>,
    pub keys: JwtKeys,
    pub auth: AuthService,
    pub sanitizer: UploadSanitizer,
    pub catalog: Arc<Catalog>,
    pub global_limiter: Arc<RateLimiter>,
    pub auth_limiter: Arc<RateLimiter>,
    pub recent_logs: RecentLogs,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        state.keys.clone()
    }
}

/// Opens the user store named by `database_url`. `memory://` keeps
/// everything in-process; anything else is a Postgres URL and gets migrated.
pub async fn connect_store(database_url: &str) -> anyhow::Result<Arc<dyn UserStore>> {
    if database_url.starts_with("memory://") {
        warn!("using in-memory user store, accounts are lost on exit");
        return Ok(Arc::new(MemoryUserStore::new()));
    }
    let store = PgUserStore::connect(database_url).await?;
    store.migrate().await?;
    info!("postgres user store ready");
    Ok(Arc::new(store))
}

impl AppState {
    pub async fn init(config: AppConfig, recent_logs: RecentLogs) -> anyhow::Result<Self> {
        let users = connect_store(&config.database_url).await?;
        let storage = storage::from_config(&config.storage).await?;
        Self::from_parts(config, users, storage, recent_logs)
    }

    pub fn from_parts(
        config: AppConfig,
        users: Arc<dyn UserStore>,
        storage: Arc<dyn StorageClient>,
        recent_logs: RecentLogs,
    ) -> anyhow::Result<Self> {
        let keys = JwtKeys::new(&config.jwt);
        let hasher = Arc::new(PasswordHasher::new(config.hash)?);
        let auth = AuthService::new(users.clone(), hasher, keys.clone());
        let sanitizer = UploadSanitizer::new(config.upload_max_bytes);
        let catalog = Arc::new(Catalog::load()?);

        let window = config.rate_limit.window();
        let global_limiter = Arc::new(RateLimiter::new(
            "global",
            config.rate_limit.global_max,
            window,
        ));
        let auth_limiter = Arc::new(
            RateLimiter::new("auth", config.rate_limit.auth_max, window).skip_successful(),
        );

        Ok(Self {
            config: Arc::new(config),
            users,
            storage,
            keys,
            auth,
            sanitizer,
            catalog,
            global_limiter,
            auth_limiter,
            recent_logs,
        })
    }

    /// In-memory wiring with cheap hashing, for tests.
    pub fn fake() -> Self {
        Self::fake_with_storage(Arc::new(MemoryStorage::new()))
    }

    pub fn fake_with_storage(storage: Arc<MemoryStorage>) -> Self {
        Self::fake_with_config(AppConfig::for_tests(), storage)
    }

    pub fn fake_with_config(config: AppConfig, storage: Arc<MemoryStorage>) -> Self {
        Self::from_parts(
            config,
            Arc::new(MemoryUserStore::new()),
            storage,
            RecentLogs::default(),
        )
        .expect("test state")
    }

    pub async fn shutdown(&self) {
        self.users.close().await;
        info!("user store closed");
    }
}
