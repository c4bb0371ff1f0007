//! Liveness probe for external process monitors.
//!
//! Answers `GET` on any path with `200 OK` and the plain-text body `OK`.
//! Other methods get `405`. The listener shares nothing with the query
//! pipeline, so it keeps answering while queries are in flight.

use axum::{
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Router answering every path.
pub fn router() -> Router {
    Router::new()
        .fallback(handle_probe)
        .layer(TraceLayer::new_for_http())
}

async fn handle_probe(method: Method) -> Response {
    if method == Method::GET || method == Method::HEAD {
        (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            "OK",
        )
            .into_response()
    } else {
        StatusCode::METHOD_NOT_ALLOWED.into_response()
    }
}

/// Binds the probe listener. Bind errors are returned so startup can fail fast.
pub async fn bind(addr: &str) -> anyhow::Result<TcpListener> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("cannot bind health server to {}: {}", addr, e))?;
    Ok(listener)
}

/// Serves the probe on an already-bound listener until the process exits.
pub async fn serve(listener: TcpListener) -> anyhow::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "health server listening");
    }
    axum::serve(listener, router()).await?;
    Ok(())
}
