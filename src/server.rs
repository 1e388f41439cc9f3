//! HTTP exposition endpoint.
//!
//! Every `GET` (any path) gathers the registry once and answers with the
//! Prometheus text format.

use std::future::Future;
use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use prometheus::{Encoder, Registry, TextEncoder};
use tokio::net::TcpListener;
use tracing::{debug, error, info};

/// Build the router; any path serves the metrics.
pub fn router(registry: Registry) -> Router {
    Router::new().fallback(metrics_handler).with_state(registry)
}

async fn metrics_handler(State(registry): State<Registry>, method: Method) -> Response {
    if method != Method::GET && method != Method::HEAD {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    let families = registry.gather();
    debug!(families = families.len(), "scrape");

    let encoder = TextEncoder::new();
    match encoder.encode_to_string(&families) {
        Ok(body) => (
            [(header::CONTENT_TYPE, encoder.format_type().to_string())],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to encode metrics: {e}"),
            )
                .into_response()
        }
    }
}

/// Serve `registry` on all interfaces until `shutdown` resolves.
pub async fn serve<F>(registry: Registry, port: u16, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind metrics server on {addr}"))?;

    info!(%addr, "metrics server listening");

    axum::serve(listener, router(registry))
        .with_graceful_shutdown(shutdown)
        .await
        .context("metrics server error")?;

    Ok(())
}
