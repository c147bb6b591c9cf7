//! Configuration loader for the `codemetal-waterlevel` service.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). By consolidating configuration logic here, we
//! avoid scattering `env::var` calls throughout the codebase.
//!
use std::{env, net::SocketAddr, path::PathBuf};

use anyhow::{anyhow, Result};

use crate::aggregate::status::DEFAULT_STATUS_HOURS;

/// Parse an optional integer environment variable with a default value.
macro_rules! parse_env_u32 {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.trim().parse::<u32>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Read an optional string environment variable with a default value.
macro_rules! env_or {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| $default.to_string())
    };
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// Delimited readings table.
    pub data_path: PathBuf,

    /// Directory holding the feedback table and per-entry documents.
    pub feedback_dir: PathBuf,

    /// Default recency window for Online/Offline classification.
    pub status_hours: u32,

    /// Row count above which the dataset is treated as large.
    pub fast_limit_rows: u32,

    /// Address the HTTP server binds to.
    pub bind_addr: SocketAddr,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("iot_water_data_1.csv"),
            feedback_dir: PathBuf::from("feedback"),
            status_hours: DEFAULT_STATUS_HOURS,
            fast_limit_rows: 300_000,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

/// Load configuration from environment variables with defaults.
///
/// Optional:
/// - `DATA_CSV_PATH` – readings table (default: `iot_water_data_1.csv`)
/// - `FEEDBACK_DIR` – feedback store directory (default: `feedback`)
/// - `STATUS_HOURS` – Online threshold in hours (default: 24)
/// - `FAST_LIMIT_ROWS` – large-dataset warning threshold (default: 300000)
/// - `BIND_ADDR` – listen address (default: `0.0.0.0:8080`)
///
/// Returns an error if any variable is present but invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let defaults = Config::default();

    let data_path = PathBuf::from(env_or!("DATA_CSV_PATH", defaults.data_path.display()));
    let feedback_dir = PathBuf::from(env_or!("FEEDBACK_DIR", defaults.feedback_dir.display()));
    let status_hours = parse_env_u32!("STATUS_HOURS", defaults.status_hours);
    let fast_limit_rows = parse_env_u32!("FAST_LIMIT_ROWS", defaults.fast_limit_rows);
    let bind_addr = env_or!("BIND_ADDR", defaults.bind_addr)
        .parse::<SocketAddr>()
        .map_err(|e| anyhow!("Invalid BIND_ADDR: {}", e))?;

    if status_hours == 0 {
        return Err(anyhow!("STATUS_HOURS must be at least 1"));
    }

    Ok(Config {
        data_path,
        feedback_dir,
        status_hours,
        fast_limit_rows,
        bind_addr,
    })
}

impl Config {
    /// Log the loaded configuration for debugging purposes.
    pub fn log_config(&self) {
        // ---
        tracing::info!("Configuration loaded:");
        tracing::info!("  DATA_CSV_PATH   : {}", self.data_path.display());
        tracing::info!("  FEEDBACK_DIR    : {}", self.feedback_dir.display());
        tracing::info!("  STATUS_HOURS    : {}", self.status_hours);
        tracing::info!("  FAST_LIMIT_ROWS : {}", self.fast_limit_rows);
        tracing::info!("  BIND_ADDR       : {}", self.bind_addr);
    }
}
