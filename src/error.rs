//! Error types for the aggregation core and the feedback store.
//!
//! The core never swallows failures: a missing source file or a rejected
//! feedback submission is surfaced to the caller as one of these variants.
//! Non-fatal conditions (bad timestamps, missing columns) are not errors at
//! all; they degrade to null fields during ingestion.

use std::{io, path::PathBuf};

use thiserror::Error;
use uuid::Uuid;

/// Failure while loading the readings table.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("data source not found: {}", .0.display())]
    MissingSource(PathBuf),

    #[error("I/O error reading data source: {0}")]
    Io(#[from] io::Error),

    #[error("malformed delimited data: {0}")]
    Csv(#[from] csv::Error),
}

/// A feedback submission that breaks the required-field rules.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("field '{0}' is required for this status")]
    Missing(&'static str),

    #[error("field '{0}' is not allowed for this status")]
    Unexpected(&'static str),

    #[error("field '{field}' must be between {min} and {max}")]
    OutOfRange {
        field: &'static str,
        min: u8,
        max: u8,
    },
}

impl ValidationError {
    /// Name of the offending field.
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::Missing(f) | ValidationError::Unexpected(f) => f,
            ValidationError::OutOfRange { field, .. } => field,
        }
    }
}

/// Failure in the feedback log.
#[derive(Error, Debug)]
pub enum FeedbackError {
    #[error("invalid feedback: {0}")]
    Validation(#[from] ValidationError),

    #[error("feedback entry {0} not found")]
    NotFound(Uuid),

    #[error("operation not permitted for role '{0}'")]
    Forbidden(String),

    #[error("I/O error in feedback store: {0}")]
    Io(#[from] io::Error),

    #[error("feedback table error: {0}")]
    Csv(#[from] csv::Error),

    #[error("feedback document error: {0}")]
    Json(#[from] serde_json::Error),
}
