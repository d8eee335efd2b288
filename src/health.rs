//! Build-info health surface. Grounded in
//! `original_source/pkg/servers/webserver/webserver.go`; `/metrics` is
//! explicitly out of scope (`spec.md` §6) and is not routed.

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn build_info() -> String {
    format!(
        "idun-fleet {VERSION} (rustc {}, target {})",
        option_env!("RUSTC_VERSION").unwrap_or("unknown"),
        std::env::consts::ARCH,
    )
}

async fn info_handler() -> String {
    build_info()
}

pub fn router() -> Router {
    Router::new()
        .route("/", get(info_handler))
        .route("/health", get(info_handler))
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_info_contains_version() {
        assert!(build_info().contains(VERSION));
    }
}
