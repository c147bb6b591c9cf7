//! Device status derivation.
//!
//! An explicit `Status` column, when it carries any value, always wins over
//! recency. Only without it are devices classified Online/Offline by how
//! recently they last reported.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::models::{Reading, WorkingSubset};

// ---

pub const ONLINE: &str = "Online";
pub const OFFLINE: &str = "Offline";
pub const NO_DATA: &str = "No Data";

/// Default recency window for the Online classification.
pub const DEFAULT_STATUS_HOURS: u32 = 24;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusCount {
    pub status: String,
    pub device_count: usize,
}

/// Status counts relative to the current time.
pub fn derive_status_counts(subset: &WorkingSubset<'_>, threshold_hours: u32) -> Vec<StatusCount> {
    derive_status_counts_at(subset, threshold_hours, Utc::now())
}

/// Status counts relative to `now`, ordered by status label.
pub fn derive_status_counts_at(
    subset: &WorkingSubset<'_>,
    threshold_hours: u32,
    now: DateTime<Utc>,
) -> Vec<StatusCount> {
    // ---
    if subset.iter().any(|r| r.status.is_some()) {
        return explicit_status_counts(subset);
    }

    if subset.iter().all(|r| r.timestamp.is_none()) {
        return vec![StatusCount {
            status: NO_DATA.to_string(),
            device_count: 0,
        }];
    }

    let mut last_seen: HashMap<&str, DateTime<Utc>> = HashMap::new();
    for r in subset.iter() {
        if let (Some(device), Some(ts)) = (r.device_id.as_deref(), r.timestamp) {
            let entry = last_seen.entry(device).or_insert(ts);
            if ts > *entry {
                *entry = ts;
            }
        }
    }

    let threshold = now - Duration::hours(i64::from(threshold_hours));
    let labels = last_seen
        .values()
        .map(|seen| if *seen >= threshold { ONLINE } else { OFFLINE });
    tally(labels)
}

/// Latest explicit status per device, tie broken by the last row after a
/// stable ascending sort on timestamp (null timestamps sort first).
fn explicit_status_counts(subset: &WorkingSubset<'_>) -> Vec<StatusCount> {
    // ---
    let mut rows: Vec<&Reading> = subset
        .iter()
        .filter(|r| r.device_id.is_some() && r.status.is_some())
        .collect();
    rows.sort_by_key(|r| r.timestamp);

    let mut latest: HashMap<&str, &str> = HashMap::new();
    for r in rows {
        if let (Some(device), Some(status)) = (r.device_id.as_deref(), r.status.as_deref()) {
            latest.insert(device, status);
        }
    }
    tally(latest.into_values())
}

fn tally<'s>(labels: impl Iterator<Item = &'s str>) -> Vec<StatusCount> {
    // ---
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for label in labels {
        *counts.entry(label).or_default() += 1;
    }
    counts
        .into_iter()
        .map(|(status, device_count)| StatusCount {
            status: status.to_string(),
            device_count,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::models::Dataset;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn reading(device: &str, hours_ago: Option<i64>, status: Option<&str>) -> Reading {
        Reading {
            device_id: Some(device.to_string()),
            timestamp: hours_ago.map(|h| now() - Duration::hours(h)),
            status: status.map(str::to_string),
            ..Default::default()
        }
    }

    fn count_of(counts: &[StatusCount], status: &str) -> Option<usize> {
        counts
            .iter()
            .find(|c| c.status == status)
            .map(|c| c.device_count)
    }

    #[test]
    fn test_recency_uses_latest_reading() {
        // ---
        let dataset = Dataset::from_readings(vec![
            reading("D1", Some(3), None),
            reading("D1", Some(30), None),
            reading("D1", Some(50), None),
        ]);

        let counts = derive_status_counts_at(&dataset.all(), 24, now());
        assert_eq!(
            counts,
            vec![StatusCount {
                status: ONLINE.to_string(),
                device_count: 1
            }]
        );
    }

    #[test]
    fn test_online_offline_split() {
        // ---
        let dataset = Dataset::from_readings(vec![
            reading("D1", Some(1), None),
            reading("D2", Some(25), None),
            reading("D3", Some(24), None),
            reading("D4", None, None),
        ]);

        let counts = derive_status_counts_at(&dataset.all(), 24, now());
        assert_eq!(count_of(&counts, ONLINE), Some(2));
        assert_eq!(count_of(&counts, OFFLINE), Some(1));
    }

    #[test]
    fn test_explicit_status_wins() {
        // ---
        // Recency alone would call both devices Online.
        let dataset = Dataset::from_readings(vec![
            reading("D1", Some(1), Some("Maintenance")),
            reading("D2", Some(1), None),
            reading("D2", Some(2), Some("Faulty")),
        ]);

        let counts = derive_status_counts_at(&dataset.all(), 24, now());
        assert_eq!(count_of(&counts, ONLINE), None);
        assert_eq!(count_of(&counts, "Maintenance"), Some(1));
        assert_eq!(count_of(&counts, "Faulty"), Some(1));
    }

    #[test]
    fn test_explicit_status_takes_most_recent() {
        // ---
        let dataset = Dataset::from_readings(vec![
            reading("D1", Some(1), Some("Active")),
            reading("D1", Some(10), Some("Inactive")),
            reading("D1", None, Some("Unknown")),
        ]);

        let counts = derive_status_counts_at(&dataset.all(), 24, now());
        assert_eq!(
            counts,
            vec![StatusCount {
                status: "Active".to_string(),
                device_count: 1
            }]
        );
    }

    #[test]
    fn test_explicit_status_tie_takes_last_row() {
        // ---
        let dataset = Dataset::from_readings(vec![
            reading("D1", Some(5), Some("First")),
            reading("D1", Some(5), Some("Second")),
        ]);

        let counts = derive_status_counts_at(&dataset.all(), 24, now());
        assert_eq!(count_of(&counts, "Second"), Some(1));
        assert_eq!(count_of(&counts, "First"), None);
    }

    #[test]
    fn test_no_data() {
        // ---
        let expected = vec![StatusCount {
            status: NO_DATA.to_string(),
            device_count: 0,
        }];
        assert_eq!(
            derive_status_counts_at(&WorkingSubset::default(), 24, now()),
            expected
        );

        let dataset = Dataset::from_readings(vec![reading("D1", None, None)]);
        assert_eq!(derive_status_counts_at(&dataset.all(), 24, now()), expected);
    }
}
