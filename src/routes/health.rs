// src/routes/health.rs
//! Service health check.
//!
//! This module defines the `/health` route used by container orchestrators
//! and CI pipelines to verify that the service is running. It follows the
//! Explicit Module Boundary Pattern (EMBP): the handler is internal, the
//! gateway (`mod.rs`) only sees the subrouter.
//!
//! Unlike the API routes it needs no credentials. It reports whether the
//! readings table can currently be loaded, so a deleted or unreadable source
//! shows up as `degraded` without failing the check itself.

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use super::AppState;

/// JSON response body for the `/health` endpoint.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    rows: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Handle `GET /health`.
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    // ---
    let cache = Arc::clone(&state.cache);
    let loaded = match tokio::task::spawn_blocking(move || cache.get()).await {
        Ok(result) => result.map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };

    match loaded {
        Ok(dataset) => Json(HealthResponse {
            status: "ok",
            rows: Some(dataset.len()),
            error: None,
        }),
        Err(error) => Json(HealthResponse {
            status: "degraded",
            rows: None,
            error: Some(error),
        }),
    }
}

/// Create a subrouter containing the `/health` route.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}
