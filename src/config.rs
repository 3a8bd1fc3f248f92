use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Production,
    Development,
}

impl Environment {
    pub fn is_production(self) -> bool {
        matches!(self, Environment::Production)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct HashConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub enum StorageConfig {
    Local {
        dir: PathBuf,
    },
    S3 {
        endpoint: String,
        bucket: String,
        access_key: String,
        secret_key: String,
        region: String,
    },
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RateLimitConfig {
    pub window_secs: u64,
    pub global_max: u32,
    pub auth_max: u32,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub host: String,
    pub port: u16,
    pub frontend_url: String,
    pub database_url: String,
    pub jwt: JwtConfig,
    pub hash: HashConfig,
    pub upload_max_bytes: usize,
    pub storage: StorageConfig,
    pub rate_limit: RateLimitConfig,
}

/// Parses `key` straight into its target type, so out-of-range values fail
/// instead of wrapping.
fn parse_or<T, F>(lookup: &F, key: &str, default: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key).unwrap_or_else(|| default.to_string());
    raw.parse::<T>()
        .with_context(|| format!("{key} must be a non-negative integer in range, got {raw:?}"))
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup so tests never touch the process env.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> anyhow::Result<String> {
            match lookup(key) {
                Some(v) if !v.trim().is_empty() => Ok(v),
                _ => bail!("{key} must be set"),
            }
        };
        let or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let environment = match or("APP_ENV", "production").to_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            "development" | "dev" | "test" => Environment::Development,
            other => bail!("unknown APP_ENV {other:?}"),
        };

        let port = lookup("PORT")
            .or_else(|| lookup("APP_PORT"))
            .unwrap_or_else(|| "3001".into())
            .parse::<u16>()
            .context("PORT must be a valid port number")?;

        let jwt = JwtConfig {
            secret: required("JWT_SECRET")?,
            issuer: or("JWT_ISSUER", "owasp-lab"),
            audience: or("JWT_AUDIENCE", "owasp-lab-users"),
            ttl_minutes: i64::from(parse_or::<u32, _>(&lookup, "JWT_TTL_MINUTES", "1440")?),
        };

        let hash = HashConfig {
            memory_kib: parse_or(&lookup, "PASSWORD_HASH_MEMORY_KIB", "19456")?,
            iterations: parse_or(&lookup, "PASSWORD_HASH_ITERATIONS", "2")?,
            parallelism: parse_or(&lookup, "PASSWORD_HASH_PARALLELISM", "1")?,
        };

        let storage = match or("STORAGE_BACKEND", "local").as_str() {
            "local" => StorageConfig::Local {
                dir: PathBuf::from(or("UPLOAD_DIR", "uploads")),
            },
            "s3" => StorageConfig::S3 {
                endpoint: required("MINIO_ENDPOINT")?,
                bucket: required("MINIO_BUCKET")?,
                access_key: required("MINIO_ACCESS_KEY")?,
                secret_key: required("MINIO_SECRET_KEY")?,
                region: or("MINIO_REGION", "us-east-1"),
            },
            other => bail!("unknown STORAGE_BACKEND {other:?}"),
        };

        let rate_limit = RateLimitConfig {
            window_secs: parse_or(&lookup, "RATE_LIMIT_WINDOW_SECS", "900")?,
            global_max: parse_or(&lookup, "RATE_LIMIT_GLOBAL_MAX", "100")?,
            auth_max: parse_or(&lookup, "RATE_LIMIT_AUTH_MAX", "5")?,
        };

        Ok(Self {
            environment,
            host: or("APP_HOST", "0.0.0.0"),
            port,
            frontend_url: or("FRONTEND_URL", "http://localhost:4321"),
            database_url: required("DATABASE_URL")?,
            jwt,
            hash,
            upload_max_bytes: parse_or(&lookup, "UPLOAD_MAX_BYTES", "1048576")?,
            storage,
            rate_limit,
        })
    }

    /// Config used by unit and router tests. Cheap hash parameters, in-memory store.
    pub fn for_tests() -> Self {
        Self {
            environment: Environment::Development,
            host: "127.0.0.1".into(),
            port: 0,
            frontend_url: "http://localhost:4321".into(),
            database_url: "memory://".into(),
            jwt: JwtConfig {
                secret: "test-secret".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_minutes: 60 * 24,
            },
            hash: HashConfig {
                memory_kib: 1024,
                iterations: 1,
                parallelism: 1,
            },
            upload_max_bytes: 1024 * 1024,
            storage: StorageConfig::Local {
                dir: PathBuf::from("uploads"),
            },
            rate_limit: RateLimitConfig {
                window_secs: 900,
                global_max: 100,
                auth_max: 5,
            },
        }
    }
}
