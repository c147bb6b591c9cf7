//! Headline numbers for the dashboard cards.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{to_ist, DeviceType, WorkingSubset};

// ---

/// Shown in place of the last-ingest time when no row has a timestamp.
pub const NO_INGEST_LABEL: &str = "—";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Kpis {
    pub farmer_count: usize,
    pub device_count: usize,
    pub reading_count: usize,
    /// Percentage of rows with a non-null water level.
    pub completeness_pct: f64,
    pub fixed_device_count: usize,
    pub portable_device_count: usize,
    /// Newest timestamp, `None` when every timestamp is null.
    pub last_ingest: Option<DateTime<Utc>>,
}

impl Kpis {
    /// Last ingest time as shown on the card, e.g. `05 Mar 2025, 14:30 IST`.
    pub fn last_ingest_label(&self) -> String {
        self.last_ingest
            .map(|ts| to_ist(ts).format("%d %b %Y, %H:%M IST").to_string())
            .unwrap_or_else(|| NO_INGEST_LABEL.to_string())
    }
}

/// Headline counts over `subset`. An empty subset yields zeros and no ingest time.
pub fn compute_kpis(subset: &WorkingSubset<'_>) -> Kpis {
    // ---
    let distinct_devices_of = |kind: &DeviceType| {
        subset
            .iter()
            .filter(|r| r.device_type.as_ref() == Some(kind))
            .filter_map(|r| r.device_id.as_deref())
            .collect::<HashSet<_>>()
            .len()
    };

    let reading_count = subset.len();
    let with_level = subset.iter().filter(|r| r.water_level.is_some()).count();
    let completeness_pct = if reading_count == 0 {
        0.0
    } else {
        with_level as f64 * 100.0 / reading_count as f64
    };

    Kpis {
        farmer_count: subset
            .iter()
            .filter_map(|r| r.farmer_name.as_deref())
            .collect::<HashSet<_>>()
            .len(),
        device_count: subset
            .iter()
            .filter_map(|r| r.device_id.as_deref())
            .collect::<HashSet<_>>()
            .len(),
        reading_count,
        completeness_pct,
        fixed_device_count: distinct_devices_of(&DeviceType::Fixed),
        portable_device_count: distinct_devices_of(&DeviceType::Portable),
        last_ingest: subset.iter().filter_map(|r| r.timestamp).max(),
    }
}
