//! Append-only feedback log.
//!
//! Entries are kept in `feedbacks.csv` (one row per entry, header first)
//! and mirrored as `entries/<id>.json` for audit. The only permitted
//! mutation is an admin setting `AdminComment` on an existing entry. All
//! writes go through one mutex so appends and updates never interleave, and
//! whole-file replacements land atomically via a persisted temp file.

use std::{
    collections::BTreeMap,
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use chrono::{DateTime, NaiveDate, Utc};
use csv::{ReaderBuilder, WriterBuilder};
use tempfile::NamedTempFile;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::aggregate::GroupRow;
use crate::auth::{Role, Session};
use crate::error::{FeedbackError, ValidationError};
use crate::models::ist_date;

// ---

pub const FEEDBACK_TABLE: &str = "feedbacks.csv";
pub const ENTRIES_DIR: &str = "entries";

pub const MIN_SATISFACTION: u8 = 1;
pub const MAX_SATISFACTION: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FeedbackStatus {
    Approved,
    #[serde(rename = "Not Approved")]
    NotApproved,
    #[serde(rename = "Changes Required")]
    ChangesRequired,
}

impl FeedbackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackStatus::Approved => "Approved",
            FeedbackStatus::NotApproved => "Not Approved",
            FeedbackStatus::ChangesRequired => "Changes Required",
        }
    }
}

/// What a client sends.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FeedbackSubmission {
    pub status: FeedbackStatus,
    #[serde(default)]
    pub satisfaction: Option<u8>,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub changes: String,
    #[serde(default)]
    pub comment: String,
}

impl FeedbackSubmission {
    /// Check the status-dependent field rules.
    ///
    /// Satisfaction is present iff Approved, Reason non-blank iff Not
    /// Approved, Changes non-blank iff Changes Required.
    pub fn validate(&self) -> Result<(), ValidationError> {
        // ---
        let approved = self.status == FeedbackStatus::Approved;
        match (approved, self.satisfaction) {
            (true, None) => return Err(ValidationError::Missing("Satisfaction")),
            (false, Some(_)) => return Err(ValidationError::Unexpected("Satisfaction")),
            (true, Some(s)) if !(MIN_SATISFACTION..=MAX_SATISFACTION).contains(&s) => {
                return Err(ValidationError::OutOfRange {
                    field: "Satisfaction",
                    min: MIN_SATISFACTION,
                    max: MAX_SATISFACTION,
                });
            }
            _ => {}
        }

        check_text(
            "Reason",
            &self.reason,
            self.status == FeedbackStatus::NotApproved,
        )?;
        check_text(
            "Changes",
            &self.changes,
            self.status == FeedbackStatus::ChangesRequired,
        )
    }
}

fn check_text(field: &'static str, value: &str, required: bool) -> Result<(), ValidationError> {
    match (required, value.trim().is_empty()) {
        (true, true) => Err(ValidationError::Missing(field)),
        (false, false) => Err(ValidationError::Unexpected(field)),
        _ => Ok(()),
    }
}

/// One persisted entry. Field names match the table header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FeedbackEntry {
    #[serde(rename = "ID")]
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub client: String,
    pub status: FeedbackStatus,
    pub satisfaction: Option<u8>,
    pub reason: String,
    pub changes: String,
    pub comment: String,
    pub admin_comment: Option<String>,
}

/// Directory-backed feedback log.
#[derive(Debug)]
pub struct FeedbackStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FeedbackStore {
    /// Open (creating if needed) the store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, FeedbackError> {
        // ---
        let dir = dir.into();
        fs::create_dir_all(dir.join(ENTRIES_DIR))?;
        info!("Feedback store at {}", dir.display());
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn table_path(&self) -> PathBuf {
        self.dir.join(FEEDBACK_TABLE)
    }

    fn entry_path(&self, id: Uuid) -> PathBuf {
        self.dir.join(ENTRIES_DIR).join(format!("{id}.json"))
    }

    /// Validate and record a client's submission stamped with the current time.
    pub fn submit(
        &self,
        session: &Session,
        submission: FeedbackSubmission,
    ) -> Result<FeedbackEntry, FeedbackError> {
        self.submit_at(session, submission, Utc::now())
    }

    /// Validate and append a client's submission stamped with `now`.
    pub fn submit_at(
        &self,
        session: &Session,
        submission: FeedbackSubmission,
        now: DateTime<Utc>,
    ) -> Result<FeedbackEntry, FeedbackError> {
        // ---
        if session.role != Role::Client {
            return Err(FeedbackError::Forbidden(session.role.as_str().to_string()));
        }
        if let Err(e) = submission.validate() {
            warn!(client = %session.client_name, field = e.field(), "Feedback rejected: {}", e);
            return Err(e.into());
        }

        let entry = FeedbackEntry {
            id: Uuid::new_v4(),
            timestamp: now,
            client: session.client_name.clone(),
            status: submission.status,
            satisfaction: submission.satisfaction,
            reason: submission.reason.trim().to_string(),
            changes: submission.changes.trim().to_string(),
            comment: submission.comment.trim().to_string(),
            admin_comment: None,
        };

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.write_document(&entry)?;
        if let Err(e) = self.append_row(&entry) {
            // A document never outlives a failed append.
            if let Err(cleanup) = fs::remove_file(self.entry_path(entry.id)) {
                warn!(id = %entry.id, "Orphan feedback document left behind: {}", cleanup);
            }
            return Err(e);
        }

        info!(
            id = %entry.id,
            client = %entry.client,
            status = entry.status.as_str(),
            "Feedback recorded"
        );
        Ok(entry)
    }

    /// Every entry in append order. An absent table means no entries yet.
    pub fn list(&self) -> Result<Vec<FeedbackEntry>, FeedbackError> {
        // ---
        let path = self.table_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = ReaderBuilder::new().has_headers(true).from_path(&path)?;
        let entries = reader
            .deserialize()
            .collect::<Result<Vec<FeedbackEntry>, csv::Error>>()?;
        debug!(count = entries.len(), "Feedback entries read");
        Ok(entries)
    }

    /// Read an entry back from its JSON document.
    pub fn get(&self, id: Uuid) -> Result<FeedbackEntry, FeedbackError> {
        // ---
        let text = match fs::read_to_string(self.entry_path(id)) {
            Ok(t) => t,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(FeedbackError::NotFound(id))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&text)?)
    }

    /// Set the admin comment of entry `id`. Blank comments clear it.
    pub fn update_admin_comment(
        &self,
        session: &Session,
        id: Uuid,
        comment: &str,
    ) -> Result<FeedbackEntry, FeedbackError> {
        // ---
        if !session.is_admin() {
            return Err(FeedbackError::Forbidden(session.role.as_str().to_string()));
        }

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.list()?;
        let entry = entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(FeedbackError::NotFound(id))?;

        let trimmed = comment.trim();
        entry.admin_comment = (!trimmed.is_empty()).then(|| trimmed.to_string());
        let updated = entry.clone();

        self.rewrite_table(&entries)?;
        self.write_document(&updated)?;

        info!(id = %id, admin = %session.username, "Admin comment updated");
        Ok(updated)
    }

    fn write_document(&self, entry: &FeedbackEntry) -> Result<(), FeedbackError> {
        let json = serde_json::to_vec_pretty(entry)?;
        write_atomic(&self.entry_path(entry.id), &json)
    }

    fn append_row(&self, entry: &FeedbackEntry) -> Result<(), FeedbackError> {
        // ---
        let path = self.table_path();
        let needs_header = fs::metadata(&path).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        let mut writer = WriterBuilder::new()
            .has_headers(needs_header)
            .from_writer(file);
        writer.serialize(entry)?;
        writer.flush()?;
        Ok(())
    }

    /// Replace the whole table in one step.
    fn rewrite_table(&self, entries: &[FeedbackEntry]) -> Result<(), FeedbackError> {
        // ---
        let mut writer = WriterBuilder::new().has_headers(true).from_writer(Vec::new());
        for entry in entries {
            writer.serialize(entry)?;
        }
        let table = writer.into_inner().map_err(|e| e.into_error())?;
        write_atomic(&self.table_path(), &table)
    }
}

/// Write `content` to `path` through a temp file in the same directory, so
/// readers see either the old file or the complete new one.
fn write_atomic(path: &Path, content: &[u8]) -> Result<(), FeedbackError> {
    // ---
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp_file = NamedTempFile::new_in(parent)?;
    temp_file.write_all(content)?;
    temp_file.as_file().sync_all()?;
    temp_file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Entries newest first.
pub fn latest_first(mut entries: Vec<FeedbackEntry>) -> Vec<FeedbackEntry> {
    entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    entries
}

/// Entries per status, ordered by status.
pub fn status_breakdown(entries: &[FeedbackEntry]) -> Vec<GroupRow<usize>> {
    // ---
    let mut counts: BTreeMap<FeedbackStatus, usize> = BTreeMap::new();
    for e in entries {
        *counts.entry(e.status).or_default() += 1;
    }
    counts
        .into_iter()
        .map(|(status, value)| GroupRow {
            key: status.as_str().to_string(),
            value,
        })
        .collect()
}

/// Mean satisfaction per client over the entries that carry one.
pub fn avg_satisfaction_by_client(entries: &[FeedbackEntry]) -> Vec<GroupRow<f64>> {
    // ---
    let mut totals: BTreeMap<&str, (u32, u32)> = BTreeMap::new();
    for e in entries {
        if let Some(s) = e.satisfaction {
            let (sum, n) = totals.entry(e.client.as_str()).or_default();
            *sum += u32::from(s);
            *n += 1;
        }
    }
    totals
        .into_iter()
        .map(|(client, (sum, n))| GroupRow {
            key: client.to_string(),
            value: f64::from(sum) / f64::from(n),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateCount {
    pub date: NaiveDate,
    pub count: usize,
}

/// Approved entries per IST date.
pub fn approvals_over_time(entries: &[FeedbackEntry]) -> Vec<DateCount> {
    // ---
    let mut counts: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    for e in entries.iter().filter(|e| e.status == FeedbackStatus::Approved) {
        *counts.entry(ist_date(e.timestamp)).or_default() += 1;
    }
    counts
        .into_iter()
        .map(|(date, count)| DateCount { date, count })
        .collect()
}
