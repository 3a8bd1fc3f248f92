//! Fixed-window request limiter keyed by client address.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio::sync::Mutex;
use tracing::warn;

use crate::auth::middleware::request_path;
use crate::error::AppError;

const PRUNE_THRESHOLD: usize = 10_000;
const RATELIMIT_LIMIT: &str = "ratelimit-limit";

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    started: Instant,
}

/// Result of counting one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_after: Duration,
}

#[derive(Debug)]
pub struct RateLimiter {
    name: &'static str,
    max: u32,
    window: Duration,
    skip_successful: bool,
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new(name: &'static str, max: u32, window: Duration) -> Self {
        Self {
            name,
            max,
            window,
            skip_successful: false,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Requests answered below 400 are handed back and do not count.
    pub fn skip_successful(mut self) -> Self {
        self.skip_successful = true;
        self
    }

    pub async fn hit(&self, key: &str) -> Decision {
        self.hit_at(key, Instant::now()).await
    }

    pub async fn hit_at(&self, key: &str, now: Instant) -> Decision {
        let mut windows = self.windows.lock().await;
        if windows.len() > PRUNE_THRESHOLD {
            let window = self.window;
            windows.retain(|_, w| now.duration_since(w.started) < window);
        }

        let entry = windows.entry(key.to_string()).or_insert(Window {
            count: 0,
            started: now,
        });
        if now.duration_since(entry.started) >= self.window {
            *entry = Window {
                count: 0,
                started: now,
            };
        }
        entry.count = entry.count.saturating_add(1);

        Decision {
            allowed: entry.count <= self.max,
            limit: self.max,
            remaining: self.max.saturating_sub(entry.count),
            reset_after: self.window.saturating_sub(now.duration_since(entry.started)),
        }
    }

    pub async fn refund(&self, key: &str) {
        if let Some(w) = self.windows.lock().await.get_mut(key) {
            w.count = w.count.saturating_sub(1);
        }
    }
}

fn client_key(req: &Request) -> String {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn apply_headers(headers: &mut HeaderMap, d: &Decision) {
    let reset_secs = d.reset_after.as_secs() + u64::from(d.reset_after.subsec_nanos() > 0);
    headers.insert(
        HeaderName::from_static(RATELIMIT_LIMIT),
        HeaderValue::from(d.limit),
    );
    headers.insert(
        HeaderName::from_static("ratelimit-remaining"),
        HeaderValue::from(d.remaining),
    );
    headers.insert(
        HeaderName::from_static("ratelimit-reset"),
        HeaderValue::from(reset_secs),
    );
    if !d.allowed {
        headers.insert(axum::http::header::RETRY_AFTER, HeaderValue::from(reset_secs));
    }
}

pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request,
    next: Next,
) -> Response {
    let key = client_key(&req);
    let decision = limiter.hit(&key).await;

    if !decision.allowed {
        warn!(limiter = limiter.name, client = %key, path = %request_path(&req), "rate limit exceeded");
        let mut response = AppError::RateLimited.into_response();
        apply_headers(response.headers_mut(), &decision);
        return response;
    }

    let mut response = next.run(req).await;
    if limiter.skip_successful && response.status().as_u16() < 400 {
        limiter.refund(&key).await;
    }
    // an inner, route-specific limiter already reported its own budget
    if !response.headers().contains_key(RATELIMIT_LIMIT) {
        apply_headers(response.headers_mut(), &decision);
    }
    response
}
