//! Dashboard tables: KPIs, status, grouped counts, trends, heatmap, map.

use axum::{
    extract::State,
    http::HeaderMap,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::{ApiError, ApiQuery, AppState, FilterQuery};
use crate::aggregate::{
    bucket_series, compute_kpis, derive_status_counts, device_trend, geo_points, group_aggregate,
    group_count, group_distinct_devices, histogram, top_device_by_readings, top_n,
    weekday_hour_heatmap, Agg, Bucket, BucketPoint, DeviceTrend, GeoPoint, GroupRow, Heatmap,
    HistogramBin, Kpis, StatusCount,
};
use crate::filter::{default_date_range, distinct_values, DateRange};
use crate::models::DeviceType;
use crate::schema::{Column, NumericColumn};

// ---

/// Bars shown on the field officer chart.
const TOP_OFFICERS: usize = 30;

/// Bars shown on the top portable sensors chart.
const TOP_PORTABLE_DEVICES: usize = 15;

const DISTRIBUTION_BINS: usize = 40;

/// Dashboard views under `/api`.
pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/api/options", get(options))
        .route("/api/kpis", get(kpis))
        .route("/api/status", get(status))
        .route("/api/devices/by-client", get(devices_by_client))
        .route("/api/devices/trend", get(device_trend_handler))
        .route("/api/groups", get(groups))
        .route("/api/portable/by-client", get(portable_by_client))
        .route("/api/portable/by-officer", get(portable_by_officer))
        .route("/api/portable/top-devices", get(portable_top_devices))
        .route("/api/distribution", get(distribution))
        .route("/api/trend", get(trend))
        .route("/api/heatmap", get(heatmap))
        .route("/api/map", get(map))
}

#[derive(Debug, Serialize)]
struct Options {
    clients: Vec<String>,
    districts: Vec<String>,
    device_types: Vec<String>,
    farmers: Vec<String>,
    devices: Vec<String>,
    villages: Vec<String>,
    default_range: Option<DateRange>,
}

/// Selection lists for the caller's scope, before any other filter.
async fn options(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Options>, ApiError> {
    // ---
    let session = state.authenticate(&headers)?;
    let dataset = state.dataset().await?;
    let subset = FilterQuery::default().apply(&dataset, &session)?;

    Ok(Json(Options {
        clients: distinct_values(&subset, Column::Client),
        districts: distinct_values(&subset, Column::District),
        device_types: distinct_values(&subset, Column::DeviceType),
        farmers: distinct_values(&subset, Column::FarmerName),
        devices: distinct_values(&subset, Column::DeviceId),
        villages: distinct_values(&subset, Column::Village),
        default_range: default_date_range(&subset),
    }))
}

#[derive(Debug, Serialize)]
struct KpiResponse {
    #[serde(flatten)]
    kpis: Kpis,
    last_ingest_label: String,
}

/// Headline numbers for the filtered scope.
async fn kpis(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiQuery(query): ApiQuery<FilterQuery>,
) -> Result<Json<KpiResponse>, ApiError> {
    // ---
    let session = state.authenticate(&headers)?;
    let dataset = state.dataset().await?;
    let subset = query.apply(&dataset, &session)?;

    let kpis = compute_kpis(&subset);
    Ok(Json(KpiResponse {
        last_ingest_label: kpis.last_ingest_label(),
        kpis,
    }))
}

#[derive(Debug, Deserialize)]
struct StatusParams {
    hours: Option<u32>,
}

/// Active/inactive device counts over the last `hours`.
async fn status(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiQuery(query): ApiQuery<FilterQuery>,
    ApiQuery(params): ApiQuery<StatusParams>,
) -> Result<Json<Vec<StatusCount>>, ApiError> {
    // ---
    let session = state.authenticate(&headers)?;
    let hours = params.hours.unwrap_or(state.config.status_hours);
    if hours == 0 {
        return Err(ApiError::BadRequest("'hours' must be at least 1".to_string()));
    }
    let dataset = state.dataset().await?;
    let subset = query.apply(&dataset, &session)?;

    Ok(Json(derive_status_counts(&subset, hours)))
}

/// Distinct devices per client.
async fn devices_by_client(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiQuery(query): ApiQuery<FilterQuery>,
) -> Result<Json<Vec<GroupRow<usize>>>, ApiError> {
    // ---
    let session = state.authenticate(&headers)?;
    let dataset = state.dataset().await?;
    let subset = query.apply(&dataset, &session)?;

    Ok(Json(group_distinct_devices(&subset, Column::Client)))
}

#[derive(Debug, Deserialize)]
struct GroupParams {
    by: String,
    value: Option<String>,
    agg: Option<String>,
}

/// Row counts per key, or an aggregate of `value` per key when given.
async fn groups(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiQuery(query): ApiQuery<FilterQuery>,
    ApiQuery(params): ApiQuery<GroupParams>,
) -> Result<Json<Value>, ApiError> {
    // ---
    let session = state.authenticate(&headers)?;
    let by = Column::from_param(&params.by)
        .ok_or_else(|| ApiError::BadRequest(format!("unknown column '{}'", params.by)))?;
    let value = params
        .value
        .as_deref()
        .map(|v| {
            NumericColumn::from_param(v)
                .ok_or_else(|| ApiError::BadRequest(format!("unknown numeric column '{v}'")))
        })
        .transpose()?;
    let agg = parse_agg(params.agg.as_deref())?;

    let dataset = state.dataset().await?;
    let subset = query.apply(&dataset, &session)?;

    let body = match value {
        None => json!({ "by": by, "rows": group_count(&subset, by) }),
        Some(value) => json!({
            "by": by,
            "value": value,
            "agg": agg,
            "rows": group_aggregate(&subset, by, value, agg),
        }),
    };
    Ok(Json(body))
}

/// Portable readings per client.
async fn portable_by_client(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiQuery(query): ApiQuery<FilterQuery>,
) -> Result<Json<Vec<GroupRow<usize>>>, ApiError> {
    // ---
    let session = state.authenticate(&headers)?;
    let dataset = state.dataset().await?;
    let subset = query.apply(&dataset, &session)?;

    let portable = subset.only_device_type(&DeviceType::Portable);
    Ok(Json(group_count(&portable, Column::Client)))
}

#[derive(Debug, Serialize)]
struct OfficerCounts {
    /// Header the officer names were read from; `None` when no alias matched.
    column: Option<String>,
    rows: Vec<GroupRow<usize>>,
}

/// Portable readings per field officer, largest first.
async fn portable_by_officer(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiQuery(query): ApiQuery<FilterQuery>,
) -> Result<Json<OfficerCounts>, ApiError> {
    // ---
    let session = state.authenticate(&headers)?;
    let dataset = state.dataset().await?;
    let column = dataset.schema.field_officer_column.clone();
    if column.is_none() {
        debug!("No field officer column in source");
        return Ok(Json(OfficerCounts {
            column,
            rows: Vec::new(),
        }));
    }

    let subset = query.apply(&dataset, &session)?;
    let portable = subset.only_device_type(&DeviceType::Portable);
    Ok(Json(OfficerCounts {
        column,
        rows: top_n(group_count(&portable, Column::FieldOfficer), TOP_OFFICERS),
    }))
}

/// Portable sensors with the most readings.
async fn portable_top_devices(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiQuery(query): ApiQuery<FilterQuery>,
) -> Result<Json<Vec<GroupRow<usize>>>, ApiError> {
    // ---
    let session = state.authenticate(&headers)?;
    let dataset = state.dataset().await?;
    let subset = query.apply(&dataset, &session)?;

    let portable = subset.only_device_type(&DeviceType::Portable);
    Ok(Json(top_n(
        group_count(&portable, Column::DeviceId),
        TOP_PORTABLE_DEVICES,
    )))
}

/// Water level histogram.
async fn distribution(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiQuery(query): ApiQuery<FilterQuery>,
) -> Result<Json<Vec<HistogramBin>>, ApiError> {
    // ---
    let session = state.authenticate(&headers)?;
    let dataset = state.dataset().await?;
    let subset = query.apply(&dataset, &session)?;

    Ok(Json(histogram(
        &subset,
        NumericColumn::WaterLevel,
        DISTRIBUTION_BINS,
    )))
}

#[derive(Debug, Deserialize)]
struct TrendParams {
    bucket: Option<String>,
    agg: Option<String>,
}

/// Water level per time bucket.
async fn trend(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiQuery(query): ApiQuery<FilterQuery>,
    ApiQuery(params): ApiQuery<TrendParams>,
) -> Result<Json<Vec<BucketPoint>>, ApiError> {
    // ---
    let session = state.authenticate(&headers)?;
    let bucket = match params.bucket.as_deref() {
        None => Bucket::default(),
        Some(raw) => Bucket::from_param(raw)
            .ok_or_else(|| ApiError::BadRequest(format!("unknown bucket '{raw}'")))?,
    };
    let agg = parse_agg(params.agg.as_deref())?;
    let dataset = state.dataset().await?;
    let subset = query.apply(&dataset, &session)?;

    Ok(Json(bucket_series(&subset, bucket, agg)))
}

/// Reading counts by weekday and hour.
async fn heatmap(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiQuery(query): ApiQuery<FilterQuery>,
) -> Result<Json<Heatmap>, ApiError> {
    // ---
    let session = state.authenticate(&headers)?;
    let dataset = state.dataset().await?;
    let subset = query.apply(&dataset, &session)?;

    Ok(Json(weekday_hour_heatmap(&subset)))
}

#[derive(Debug, Deserialize)]
struct DeviceParams {
    /// Omitted means the device with the most readings.
    device: Option<String>,
}

/// Water level series for one device.
async fn device_trend_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiQuery(query): ApiQuery<FilterQuery>,
    ApiQuery(params): ApiQuery<DeviceParams>,
) -> Result<Json<DeviceTrend>, ApiError> {
    // ---
    let session = state.authenticate(&headers)?;
    let dataset = state.dataset().await?;
    // The device selector is not a row filter for this view.
    let mut scope = query;
    scope.device = None;
    let subset = scope.apply(&dataset, &session)?;

    let device = match params.device {
        Some(d) if !d.trim().is_empty() => d.trim().to_string(),
        _ => top_device_by_readings(&subset)
            .ok_or_else(|| ApiError::NotFound("no device data available".to_string()))?,
    };
    Ok(Json(device_trend(&subset, &device)))
}

/// Geotagged readings for the map layer.
async fn map(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiQuery(query): ApiQuery<FilterQuery>,
) -> Result<Json<Vec<GeoPoint>>, ApiError> {
    // ---
    let session = state.authenticate(&headers)?;
    let dataset = state.dataset().await?;
    let subset = query.apply(&dataset, &session)?;

    Ok(Json(geo_points(&subset)))
}

fn parse_agg(raw: Option<&str>) -> Result<Agg, ApiError> {
    match raw {
        None => Ok(Agg::default()),
        Some(s) => Agg::from_param(s)
            .ok_or_else(|| ApiError::BadRequest(format!("unknown aggregation '{s}'"))),
    }
}
