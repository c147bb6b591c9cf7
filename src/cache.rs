//! Process-wide dataset with reload on source change.
//!
//! The dataset is loaded on first use and shared as an `Arc`. Each `get`
//! compares the source file's modification time against the one recorded at
//! load and reloads when it differs.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Arc, PoisonError, RwLock},
    time::SystemTime,
};

use tracing::{info, warn};

use crate::error::LoadError;
use crate::ingest;
use crate::models::Dataset;

// ---

#[derive(Debug)]
struct Loaded {
    modified: Option<SystemTime>,
    dataset: Arc<Dataset>,
}

#[derive(Debug)]
pub struct DatasetCache {
    path: PathBuf,
    /// Datasets larger than this are logged as running in fast mode.
    fast_limit_rows: usize,
    state: RwLock<Option<Loaded>>,
}

impl DatasetCache {
    pub fn new(path: impl Into<PathBuf>, fast_limit_rows: usize) -> Self {
        Self {
            path: path.into(),
            fast_limit_rows,
            state: RwLock::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current dataset, reloading if the source changed since the last load.
    pub fn get(&self) -> Result<Arc<Dataset>, LoadError> {
        // ---
        let modified = self.source_modified()?;

        {
            let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(loaded) = state.as_ref() {
                if modified.is_some() && loaded.modified == modified {
                    return Ok(Arc::clone(&loaded.dataset));
                }
            }
        }

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        // Another caller may have reloaded while we waited for the lock.
        if let Some(loaded) = state.as_ref() {
            if modified.is_some() && loaded.modified == modified {
                return Ok(Arc::clone(&loaded.dataset));
            }
        }

        let reloading = state.is_some();
        *state = None;
        let dataset = Arc::new(ingest::load(&self.path)?);
        if reloading {
            info!("Source changed, dataset reloaded ({} rows)", dataset.len());
        }
        if dataset.len() > self.fast_limit_rows {
            warn!(
                rows = dataset.len(),
                limit = self.fast_limit_rows,
                "Fast mode: dataset exceeds row limit, prefer aggregated views"
            );
        }

        *state = Some(Loaded {
            modified,
            dataset: Arc::clone(&dataset),
        });
        Ok(dataset)
    }

    fn source_modified(&self) -> Result<Option<SystemTime>, LoadError> {
        match fs::metadata(&self.path) {
            Ok(meta) => Ok(meta.modified().ok()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(LoadError::MissingSource(self.path.clone()))
            }
            Err(e) => Err(LoadError::Io(e)),
        }
    }
}
