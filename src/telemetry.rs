use std::collections::VecDeque;
use std::fmt::{self, Write as _};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use time::OffsetDateTime;
use tracing::{field::Field, Event, Level, Subscriber};
use tracing_subscriber::{
    field::Visit, layer::Context, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

const DEFAULT_FILTER: &str = "owasp_lab=debug,axum=info,tower_http=info";

/// One captured WARN or ERROR event.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub level: String,
    pub message: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Bounded buffer of recent WARN/ERROR events, readable from the admin API.
#[derive(Clone)]
pub struct RecentLogs {
    entries: Arc<Mutex<VecDeque<LogEntry>>>,
    capacity: usize,
}

impl RecentLogs {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    pub fn push(&self, entry: LogEntry) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Newest first.
    pub fn snapshot(&self) -> Vec<LogEntry> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.iter().rev().cloned().collect()
    }

    pub fn error_count(&self) -> usize {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.iter().filter(|e| e.level == "ERROR").count()
    }
}

impl Default for RecentLogs {
    fn default() -> Self {
        Self::new(200)
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

impl<S: Subscriber> Layer<S> for RecentLogs {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let level = *event.metadata().level();
        if level > Level::WARN {
            return;
        }
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        self.push(LogEntry {
            level: level.to_string(),
            message: format!("{}{}", visitor.message, visitor.fields),
            timestamp: OffsetDateTime::now_utc(),
        });
    }
}

/// Installs the global subscriber. `RUST_LOG` picks the filter,
/// `LOG_FORMAT=json` switches to JSON lines.
pub fn init(recent: RecentLogs) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter).with(recent);
    if json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false).json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_warn_and_error_only() {
        let recent = RecentLogs::new(10);
        let subscriber = tracing_subscriber::registry().with(recent.clone());
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("ignored");
            tracing::warn!(path = "/api/profile", "access without token");
            tracing::error!("boom");
        });

        let logs = recent.snapshot();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].level, "ERROR");
        assert_eq!(logs[0].message, "boom");
        assert_eq!(logs[1].level, "WARN");
        assert!(logs[1].message.starts_with("access without token"));
        assert!(logs[1].message.contains("path=/api/profile"));
        assert_eq!(recent.error_count(), 1);
    }

    #[test]
    fn ring_buffer_drops_oldest() {
        let recent = RecentLogs::new(2);
        for i in 0..3 {
            recent.push(LogEntry {
                level: "WARN".into(),
                message: format!("m{i}"),
                timestamp: OffsetDateTime::now_utc(),
            });
        }
        let logs = recent.snapshot();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].message, "m2");
        assert_eq!(logs[1].message, "m1");
    }
}
