// GET handlers: health, version, collector status

use axum::{extract::State, http::StatusCode, response::IntoResponse};

use super::AppState;
use crate::models::TenantHealthSummary;
use crate::version::{NAME, VERSION};

/// GET /health — liveness only; does not touch the database.
pub(super) async fn health_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": VERSION,
    }))
}

/// GET /version — returns service name and version (from Cargo.toml at build time).
pub(super) async fn version_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "name": NAME,
        "version": VERSION,
    }))
}

/// GET /api/collector/status — last cycle report plus health of every tenant.
pub(super) async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let tenants = match state.store.list_tenants(false).await {
        Ok(t) => t,
        Err(e) => {
            tracing::warn!(error = %e, operation = "list_tenants", "status query failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                axum::Json(serde_json::json!({ "error": "tenant store unavailable" })),
            );
        }
    };
    let summaries: Vec<TenantHealthSummary> = tenants.iter().map(TenantHealthSummary::from).collect();
    let last_cycle = state.last_report.read().await.clone();
    (
        StatusCode::OK,
        axum::Json(serde_json::json!({
            "lastCycle": last_cycle,
            "tenants": summaries,
        })),
    )
}
