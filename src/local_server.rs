//! Local HTTP endpoint, the seam between a crawler subprocess and its
//! parent supervisor.
//!
//! Grounded in `original_source/pkg/servers/apiserver/server.go`
//! (`UA`, `UploadDomains`, `Pop`). Uses `axum`, the pack's idiomatic
//! choice for small local HTTP surfaces (`sblanchard-SerialAgent`).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::cache::LocalCache;

pub struct LocalServerState {
    pub cache: Arc<LocalCache>,
    pub user_agent: String,
    pub upload_ttl: Duration,
}

#[derive(Debug, Serialize, Deserialize)]
struct UaResponse {
    code: u16,
    message: String,
}

#[derive(Debug, Deserialize, Serialize)]
struct DomainsEnvelope {
    domains: Vec<String>,
}

async fn ua_handler(State(state): State<Arc<LocalServerState>>) -> Json<UaResponse> {
    Json(UaResponse {
        code: 200,
        message: state.user_agent.clone(),
    })
}

async fn upload_handler(
    State(state): State<Arc<LocalServerState>>,
    Json(body): Json<DomainsEnvelope>,
) -> Response {
    if body.domains.is_empty() {
        return (StatusCode::INTERNAL_SERVER_ERROR, "empty domain list").into_response();
    }

    for domain in &body.domains {
        state.cache.set_ex(domain.clone(), "1", state.upload_ttl);
    }
    log::info!("Domains in cache: {}", state.cache.len());

    StatusCode::OK.into_response()
}

pub fn router(state: Arc<LocalServerState>) -> Router {
    Router::new()
        .route("/ua", get(ua_handler))
        .route("/upload", post(upload_handler))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// Bind an ephemeral `127.0.0.1` listener and serve `router` on it in
/// the background, returning the bound address.
pub async fn spawn(state: Arc<LocalServerState>) -> std::io::Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let app = router(state);
    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            log::error!("local server exited: {err}");
        }
    });
    Ok(addr)
}
