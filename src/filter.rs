//! Role scoping and row filters.
//!
//! Every predicate is a pure row test, so the order they are applied in
//! cannot change the result. Role scope for clients is applied first and
//! cannot be widened by the caller's categorical selections.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::auth::{Role, Session};
use crate::models::{ist, ist_date, Dataset, Reading, WorkingSubset};
use crate::schema::Column;

// ---

/// Days covered by the default date selection, ending at the newest reading.
pub const DEFAULT_WINDOW_DAYS: i64 = 30;

/// Closed interval of IST calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// UTC instants bounding the interval: `start 00:00:00 IST` through
    /// `end 23:59:59 IST`, both inclusive.
    pub fn bounds_utc(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        // ---
        let end_of_day = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
        (
            ist_to_utc(self.start.and_time(NaiveTime::MIN)),
            ist_to_utc(self.end.and_time(end_of_day)),
        )
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        let (lo, hi) = self.bounds_utc();
        ts >= lo && ts <= hi
    }
}

fn ist_to_utc(local: NaiveDateTime) -> DateTime<Utc> {
    (local - Duration::seconds(i64::from(ist().local_minus_utc()))).and_utc()
}

/// Caller-selected predicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    /// Accepted values per column. An empty set places no restriction.
    pub categorical: BTreeMap<Column, BTreeSet<String>>,
    pub date_range: Option<DateRange>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values<I, S>(mut self, column: Column, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categorical
            .entry(column)
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self
    }

    pub fn with_date_range(mut self, range: DateRange) -> Self {
        self.date_range = Some(range);
        self
    }

    /// Whether a single row passes every categorical and date predicate.
    pub fn accepts(&self, reading: &Reading) -> bool {
        // ---
        let categorical_ok = self
            .categorical
            .iter()
            .filter(|(_, accepted)| !accepted.is_empty())
            .all(|(column, accepted)| match column {
                Column::Timestamp => reading
                    .key(Column::Timestamp)
                    .is_some_and(|k| accepted.contains(&k)),
                other => reading.text(*other).is_some_and(|v| accepted.contains(v)),
            });
        if !categorical_ok {
            return false;
        }

        match self.date_range {
            None => true,
            Some(range) => reading.timestamp.is_some_and(|ts| range.contains(ts)),
        }
    }
}

/// Whether the session may see a row at all.
pub fn in_scope(session: &Session, reading: &Reading) -> bool {
    match session.role {
        Role::Admin => true,
        Role::Client => reading.client.as_deref() == Some(session.client_name.as_str()),
    }
}

/// Rows visible to `session` that pass `filter`.
pub fn apply_filters<'a>(
    dataset: &'a Dataset,
    session: &Session,
    filter: &Filter,
) -> WorkingSubset<'a> {
    // ---
    let scoped = dataset.all().retain_where(|r| in_scope(session, r));
    let subset = scoped.retain_where(|r| filter.accepts(r));
    debug!(
        role = session.role.as_str(),
        scoped = scoped.len(),
        kept = subset.len(),
        "Filters applied"
    );
    subset
}

/// Sorted distinct non-null values of a column, for selection lists.
pub fn distinct_values(subset: &WorkingSubset<'_>, column: Column) -> Vec<String> {
    // ---
    subset
        .iter()
        .filter_map(|r| r.key(column))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// The last [`DEFAULT_WINDOW_DAYS`] ending at the newest reading's IST date.
pub fn default_date_range(subset: &WorkingSubset<'_>) -> Option<DateRange> {
    // ---
    let latest = subset.iter().filter_map(|r| r.timestamp).max()?;
    let end = ist_date(latest);
    Some(DateRange::new(end - Duration::days(DEFAULT_WINDOW_DAYS), end))
}
