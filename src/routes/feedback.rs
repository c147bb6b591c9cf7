//! Feedback submission (clients) and review (admins).

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, patch},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{blocking, ApiError, ApiJson, ApiPath, AppState};
use crate::aggregate::GroupRow;
use crate::feedback::{
    approvals_over_time, avg_satisfaction_by_client, latest_first, status_breakdown, DateCount,
    FeedbackEntry, FeedbackSubmission,
};

// ---

/// `/api/feedback` listing, submission and admin review.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/feedback", get(list).post(submit))
        .route("/api/feedback/{id}", patch(update))
}

/// Record a client's verdict on their data.
async fn submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(submission): ApiJson<FeedbackSubmission>,
) -> Result<(StatusCode, Json<FeedbackEntry>), ApiError> {
    // ---
    let session = state.authenticate(&headers)?;
    let store = Arc::clone(&state.feedback);
    let entry = blocking(move || Ok(store.submit(&session, submission)?)).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

#[derive(Debug, Serialize)]
struct FeedbackOverview {
    entries: Vec<FeedbackEntry>,
    status_breakdown: Vec<GroupRow<usize>>,
    avg_satisfaction: Vec<GroupRow<f64>>,
    approvals: Vec<DateCount>,
}

/// Admins see every entry; clients only their own.
async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<FeedbackOverview>, ApiError> {
    // ---
    let session = state.authenticate(&headers)?;
    let store = Arc::clone(&state.feedback);
    let mut entries = blocking(move || Ok(store.list()?)).await?;
    if !session.is_admin() {
        entries.retain(|e| e.client == session.client_name);
    }

    Ok(Json(FeedbackOverview {
        status_breakdown: status_breakdown(&entries),
        avg_satisfaction: avg_satisfaction_by_client(&entries),
        approvals: approvals_over_time(&entries),
        entries: latest_first(entries),
    }))
}

#[derive(Debug, Deserialize)]
struct AdminCommentBody {
    admin_comment: String,
}

/// Set or clear the admin comment on one entry.
async fn update(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<AdminCommentBody>,
) -> Result<Json<FeedbackEntry>, ApiError> {
    // ---
    let session = state.authenticate(&headers)?;
    let store = Arc::clone(&state.feedback);
    let entry =
        blocking(move || Ok(store.update_admin_comment(&session, id, &body.admin_comment)?))
            .await?;
    Ok(Json(entry))
}
