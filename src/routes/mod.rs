// Operational HTTP routes: banner, liveness, version, collector status

mod http;

use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::engine::ReportHandle;
use crate::store::SqliteStore;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) store: Arc<SqliteStore>,
    pub(crate) last_report: ReportHandle,
}

pub fn app(store: Arc<SqliteStore>, last_report: ReportHandle) -> Router {
    let state = AppState { store, last_report };
    Router::new()
        .route("/", get(|| async { "capacity-collector" })) // GET /
        .route("/health", get(http::health_handler)) // GET /health
        .route("/version", get(http::version_handler)) // GET /version
        .route("/api/collector/status", get(http::status_handler)) // GET /api/collector/status
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}
