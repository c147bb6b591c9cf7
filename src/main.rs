//! Entry point for the `codemetal-waterlevel` dashboard service.
//!
//! Startup order: tracing, `.env` and environment configuration, a first
//! load of the readings table (a missing source stops the process here),
//! the feedback store, then the `routes` gateway served by axum.
//!
//! # Environment Variables
//! - `DATA_CSV_PATH` (optional) – readings table (default: `iot_water_data_1.csv`)
//! - `FEEDBACK_DIR` (optional) – feedback store directory (default: `feedback`)
//! - `WATER_LOG_LEVEL` (optional) – log verbosity (default: `debug`)
//! - `WATER_SPAN_EVENTS` (optional) – span event mode for tracing
//! - `STATUS_HOURS`, `FAST_LIMIT_ROWS`, `BIND_ADDR` – see `config`
use std::{env, sync::Arc};

use dotenvy::dotenv;
use is_terminal::IsTerminal;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use anyhow::{Context, Result};

use codemetal_waterlevel::{config, routes, DatasetCache, FeedbackStore, StaticCredentials};

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    init_tracing();
    dotenv().ok();

    let cfg = config::load_from_env()?;
    cfg.log_config();

    let cache = Arc::new(DatasetCache::new(
        cfg.data_path.clone(),
        cfg.fast_limit_rows as usize,
    ));
    let dataset = cache
        .get()
        .with_context(|| format!("Failed to load readings from '{}'", cfg.data_path.display()))?;
    tracing::info!("Dataset ready: {} readings", dataset.len());

    let feedback = Arc::new(
        FeedbackStore::open(cfg.feedback_dir.clone())
            .with_context(|| {
                format!("Failed to open feedback store '{}'", cfg.feedback_dir.display())
            })?,
    );

    let addr = cfg.bind_addr;
    let state = routes::AppState {
        cache,
        feedback,
        auth: Arc::new(StaticCredentials::builtin()),
        config: cfg,
    };

    let app = routes::router(state);

    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ---

/// Install the global `tracing` subscriber. Call once, before any logging.
///
/// Output is compact with target, file and line. `RUST_LOG` takes
/// precedence; otherwise `WATER_LOG_LEVEL` picks the level (default
/// `debug`, with hyper held at `warn`).
fn init_tracing() {
    // ---
    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events_from_env())
        .with_env_filter(log_filter_from_env())
        .with_ansi(color_enabled())
        .compact()
        .init();
}

/// `WATER_SPAN_EVENTS`: `full` for enter/exit/close with timing,
/// `enter_exit` for enter and exit only, anything else for close only.
fn span_events_from_env() -> FmtSpan {
    match env::var("WATER_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    }
}

/// `FORCE_COLOR` (`1|true|yes` or `0|false|no`) overrides TTY detection.
fn color_enabled() -> bool {
    match env::var("FORCE_COLOR").map(|v| v.to_ascii_lowercase()).as_deref() {
        Ok("1" | "true" | "yes") => true,
        Ok("0" | "false" | "no") => false,
        _ => std::io::stdout().is_terminal(),
    }
}

fn log_filter_from_env() -> EnvFilter {
    // ---
    if env::var_os("RUST_LOG").is_some() {
        return EnvFilter::from_default_env();
    }
    let level = env::var("WATER_LOG_LEVEL")
        .ok()
        .map(|v| v.trim().to_ascii_lowercase())
        .filter(|v| matches!(v.as_str(), "trace" | "debug" | "info" | "warn" | "error"))
        .unwrap_or_else(|| "debug".to_string());
    EnvFilter::new(format!("{level},hyper=warn"))
}
