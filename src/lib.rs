//! Aggregation core for the IoT water-level dashboard.
//!
//! Loads a delimited table of sensor readings once ([`ingest`]), scopes it
//! to the caller and their selections ([`filter`]), and computes the tables
//! a dashboard charts ([`aggregate`]). Client report approvals go through an
//! append-only [`feedback`] log. The [`routes`] gateway exposes all of it as
//! JSON; nothing in the core renders or performs network I/O.

pub mod aggregate;
pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod feedback;
pub mod filter;
pub mod ingest;
pub mod models;
pub mod routes;
pub mod schema;

pub use config::Config;

// Flat re-exports for the binary and integration tests.
pub use auth::{Authenticator, Role, Session, StaticCredentials};
pub use cache::DatasetCache;
pub use error::{FeedbackError, LoadError, ValidationError};
pub use feedback::{FeedbackEntry, FeedbackStatus, FeedbackStore, FeedbackSubmission};
pub use filter::{apply_filters, DateRange, Filter};
pub use models::{Dataset, DeviceType, Reading, WorkingSubset};
pub use schema::{Column, NumericColumn};
