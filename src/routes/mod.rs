//! HTTP gateway over the aggregation core.
//!
//! Each sibling module exports a subrouter; this gateway merges them and
//! owns the pieces every handler shares: application state, the per-request
//! session lookup, filter query parsing and the JSON error mapping.
//!
//! Dataset loads and feedback file I/O are blocking; handlers run them
//! through [`blocking`] so they never stall the async workers.

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        FromRequest, FromRequestParts,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, warn};

use crate::auth::{Authenticator, Session};
use crate::cache::DatasetCache;
use crate::error::{FeedbackError, LoadError};
use crate::feedback::FeedbackStore;
use crate::filter::{apply_filters, DateRange, Filter};
use crate::models::{Dataset, WorkingSubset};
use crate::schema::Column;
use crate::Config;

mod dashboard;
mod feedback;
mod health;
mod quality;

// ---

pub const USERNAME_HEADER: &str = "x-username";
pub const PASSWORD_HEADER: &str = "x-password";

/// Shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<DatasetCache>,
    pub feedback: Arc<FeedbackStore>,
    pub auth: Arc<dyn Authenticator>,
    pub config: Config,
}

impl AppState {
    /// Resolve the caller from the credential headers.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<Session, ApiError> {
        // ---
        let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
        let (Some(username), Some(password)) = (header(USERNAME_HEADER), header(PASSWORD_HEADER))
        else {
            return Err(ApiError::Unauthorized);
        };
        self.auth.authenticate(username, password).ok_or_else(|| {
            warn!(username, "Rejected credentials");
            ApiError::Unauthorized
        })
    }

    /// Current dataset, loaded off the async workers.
    pub async fn dataset(&self) -> Result<Arc<Dataset>, ApiError> {
        // ---
        let cache = Arc::clone(&self.cache);
        blocking(move || Ok(cache.get()?)).await
    }
}

/// Run blocking work on the blocking pool and surface its result.
pub async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(|e| {
        error!("Blocking task failed: {}", e);
        ApiError::Internal(e.to_string())
    })?
}

/// Every API route plus `/health`, bound to `state`.
pub fn router(state: AppState) -> Router {
    // ---
    Router::new()
        .merge(dashboard::router())
        .merge(quality::router())
        .merge(feedback::router())
        .merge(health::router())
        .with_state(state)
}

/// Handler failure rendered as `{ "error": ... }`.
#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    Forbidden(String),
    BadRequest(String),
    Invalid { field: &'static str, message: String },
    NotFound(String),
    Internal(String),
    /// An extractor refused the request before the handler ran.
    Rejected { status: StatusCode, message: String },
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // ---
        let (status, body) = match self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                json!({ "error": "invalid or missing credentials" }),
            ),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, json!({ "error": msg })),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            ApiError::Invalid { field, message } => (
                StatusCode::BAD_REQUEST,
                json!({ "error": message, "field": field }),
            ),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            ApiError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": msg }))
            }
            ApiError::Rejected { status, message } => (status, json!({ "error": message })),
        };
        (status, Json(body)).into_response()
    }
}

impl From<LoadError> for ApiError {
    fn from(e: LoadError) -> Self {
        error!("Failed to load dataset: {}", e);
        ApiError::Internal(e.to_string())
    }
}

impl From<FeedbackError> for ApiError {
    fn from(e: FeedbackError) -> Self {
        match e {
            FeedbackError::Validation(v) => ApiError::Invalid {
                field: v.field(),
                message: v.to_string(),
            },
            FeedbackError::NotFound(_) => ApiError::NotFound(e.to_string()),
            FeedbackError::Forbidden(_) => ApiError::Forbidden(e.to_string()),
            other => {
                error!("Feedback store failure: {}", other);
                ApiError::Internal(other.to_string())
            }
        }
    }
}

macro_rules! from_rejection {
    ($($rejection:ty),+) => {$(
        impl From<$rejection> for ApiError {
            fn from(r: $rejection) -> Self {
                ApiError::Rejected {
                    status: r.status(),
                    message: r.body_text(),
                }
            }
        }
    )+};
}

from_rejection!(QueryRejection, PathRejection, JsonRejection);

/// `Query` whose rejection renders as an [`ApiError`].
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

/// `Path` whose rejection renders as an [`ApiError`].
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

/// `Json` body whose rejection renders as an [`ApiError`].
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// Filter selections carried on the query string. Lists are comma-separated.
#[derive(Debug, Default, Deserialize)]
pub struct FilterQuery {
    client: Option<String>,
    district: Option<String>,
    device_type: Option<String>,
    farmer: Option<String>,
    device: Option<String>,
    village: Option<String>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
}

impl FilterQuery {
    /// Selections as a [`Filter`]; a date range needs both ends.
    pub fn to_filter(&self) -> Result<Filter, ApiError> {
        // ---
        let mut filter = Filter::new()
            .with_values(Column::Client, split_list(&self.client))
            .with_values(Column::District, split_list(&self.district))
            .with_values(Column::DeviceType, split_list(&self.device_type))
            .with_values(Column::FarmerName, split_list(&self.farmer))
            .with_values(Column::DeviceId, split_list(&self.device))
            .with_values(Column::Village, split_list(&self.village));

        match (self.start, self.end) {
            (Some(start), Some(end)) => filter = filter.with_date_range(DateRange::new(start, end)),
            (None, None) => {}
            _ => {
                return Err(ApiError::BadRequest(
                    "both 'start' and 'end' are required for a date range".to_string(),
                ))
            }
        }
        Ok(filter)
    }

    /// Rows of `dataset` visible to `session` under these selections.
    pub fn apply<'a>(
        &self,
        dataset: &'a Dataset,
        session: &Session,
    ) -> Result<WorkingSubset<'a>, ApiError> {
        Ok(apply_filters(dataset, session, &self.to_filter()?))
    }
}

fn split_list(raw: &Option<String>) -> Vec<String> {
    raw.iter()
        .flat_map(|s| s.split(','))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
