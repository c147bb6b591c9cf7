//! Data-quality views: duplicate keys and out-of-range readings.

use axum::{
    extract::State,
    http::HeaderMap,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::{ApiError, ApiQuery, AppState, FilterQuery};
use crate::aggregate::{default_bounds, find_duplicates, flag_out_of_range, Bounds};
use crate::models::Reading;
use crate::schema::{Column, NumericColumn};

// ---

/// Key that identifies a reading: one device, one instant.
const DUPLICATE_KEY: [Column; 2] = [Column::DeviceId, Column::Timestamp];

/// Data-quality views under `/api/quality`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/quality/duplicates", get(duplicates))
        .route("/api/quality/out-of-range", get(out_of_range))
}

#[derive(Debug, Serialize)]
struct DuplicatesResponse {
    key: [Column; 2],
    extra_occurrences: usize,
    all_occurrences: usize,
    rows: Vec<Reading>,
}

/// Rows sharing a device and timestamp.
async fn duplicates(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiQuery(query): ApiQuery<FilterQuery>,
) -> Result<Json<DuplicatesResponse>, ApiError> {
    // ---
    let session = state.authenticate(&headers)?;
    let dataset = state.dataset().await?;
    let subset = query.apply(&dataset, &session)?;

    let report = find_duplicates(&subset, &DUPLICATE_KEY);
    Ok(Json(DuplicatesResponse {
        key: DUPLICATE_KEY,
        extra_occurrences: report.extra_occurrences,
        all_occurrences: report.all_occurrences(),
        rows: report.rows.into_iter().cloned().collect(),
    }))
}

#[derive(Debug, Deserialize)]
struct RangeParams {
    low: Option<f64>,
    high: Option<f64>,
}

#[derive(Debug, Serialize)]
struct OutOfRangeResponse {
    /// Bounds actually applied, after filling in quantile defaults.
    bounds: Bounds,
    flagged_count: usize,
    rows: Vec<Reading>,
}

/// Readings outside `low..=high`, defaulting to the 1st and 99th percentiles.
async fn out_of_range(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiQuery(query): ApiQuery<FilterQuery>,
    ApiQuery(params): ApiQuery<RangeParams>,
) -> Result<Json<OutOfRangeResponse>, ApiError> {
    // ---
    let session = state.authenticate(&headers)?;
    let dataset = state.dataset().await?;
    let subset = query.apply(&dataset, &session)?;

    let defaults = default_bounds(&subset, NumericColumn::WaterLevel);
    let bounds = Bounds::new(
        params.low.unwrap_or(defaults.low),
        params.high.unwrap_or(defaults.high),
    );
    let flagged = flag_out_of_range(&subset, NumericColumn::WaterLevel, bounds);

    Ok(Json(OutOfRangeResponse {
        bounds,
        flagged_count: flagged.len(),
        rows: flagged.into_iter().cloned().collect(),
    }))
}
