// Path: crates/telemetry/src/http.rs
//! The telemetry endpoint: `/metrics` in Prometheus text format plus the
//! usual liveness and readiness probes. Intentionally tiny; the CSP's real
//! API surface lives in the embedding application.

use axum::{
    error_handling::HandleErrorLayer,
    http::{header::CONTENT_TYPE, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use prometheus::{Encoder, TextEncoder};
use std::{net::SocketAddr, time::Duration};
use tower::{BoxError, ServiceBuilder};
use tower_http::trace::TraceLayer;

async fn metrics() -> impl IntoResponse {
    let families = prometheus::gather();
    let encoder = TextEncoder::new();
    let mut body = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut body) {
        tracing::error!(error = %e, "prometheus encoding failed");
        return (StatusCode::INTERNAL_SERVER_ERROR, Vec::new()).into_response();
    }
    (
        [(CONTENT_TYPE, encoder.format_type().to_string())],
        body,
    )
        .into_response()
}

async fn probe() -> &'static str {
    "OK"
}

async fn overload(err: BoxError) -> (StatusCode, &'static str) {
    if err.is::<tower::timeout::error::Elapsed>() {
        (StatusCode::REQUEST_TIMEOUT, "request timed out")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "telemetry overloaded")
    }
}

/// Builds the telemetry router. Shed load early: this endpoint must never
/// compete with the CSP for resources.
pub fn router() -> Router {
    Router::new()
        .route("/metrics", get(metrics))
        .route("/healthz", get(probe))
        .route("/readyz", get(probe))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(overload))
                .layer(TraceLayer::new_for_http())
                .load_shed()
                .concurrency_limit(4)
                .timeout(Duration::from_secs(2)),
        )
}

/// Binds and serves the telemetry endpoint until the returned future is
/// dropped or the process receives ctrl-c.
pub async fn run_server(addr: SocketAddr) {
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(target = "telemetry", error = %e, %addr, "bind failed");
            return;
        }
    };
    if let Ok(local) = listener.local_addr() {
        tracing::info!(target = "telemetry", addr = %local, "telemetry listening");
    }
    let serve = axum::serve(listener, router().into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!(target = "telemetry", "telemetry shutting down");
        });
    if let Err(e) = serve.await {
        tracing::error!(target = "telemetry", error = %e, "telemetry server error");
    }
}
