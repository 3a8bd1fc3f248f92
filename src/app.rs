use std::net::SocketAddr;

use axum::{extract::DefaultBodyLimit, middleware, Router};
use tokio::signal;
use tower_http::trace::TraceLayer;

use crate::error::expose_internal_errors;
use crate::rate_limit::rate_limit;
use crate::security::{cors_layer, with_security_headers};
use crate::state::AppState;
use crate::{admin, auth, catalog, monitoring, profile};

pub const JSON_BODY_LIMIT: usize = 10 * 1024;

pub fn build_app(state: AppState) -> anyhow::Result<Router> {
    let api = Router::new()
        .merge(auth::router(&state))
        .merge(profile::router(&state))
        .merge(admin::router(&state))
        .merge(catalog::router())
        .merge(monitoring::router())
        .layer(DefaultBodyLimit::max(JSON_BODY_LIMIT))
        .layer(middleware::from_fn_with_state(
            state.global_limiter.clone(),
            rate_limit,
        ));

    let mut app = Router::new()
        .nest("/api", api)
        .merge(profile::uploads_router())
        .with_state(state.clone());

    if !state.config.environment.is_production() {
        app = app.layer(middleware::from_fn(expose_internal_errors));
    }

    let app = with_security_headers(app)
        .layer(cors_layer(&state.config.frontend_url)?)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!(
                        "http_request",
                        %method,
                        uri = %uri.path(),
                        status = tracing::field::Empty
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        let latency_ms = latency.as_millis() as u64;
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, latency_ms, "response");
                        } else if status.is_client_error() {
                            tracing::warn!(%status, latency_ms, "response");
                        } else {
                            tracing::info!(%status, latency_ms, "response");
                        }
                    },
                ),
        );
    Ok(app)
}

pub async fn serve(app: Router, host: &str, port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{host}:{port}").parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => tracing::error!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received, draining connections");
}
