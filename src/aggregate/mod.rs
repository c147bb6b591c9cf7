//! Aggregation engine.
//!
//! Pure functions over a [`WorkingSubset`](crate::models::WorkingSubset)
//! returning ordered, serializable tables ready for charting. None of them
//! panic or error on an empty subset; each returns a defined empty or zero
//! result instead.

use serde::{Deserialize, Serialize};

pub mod device;
pub mod group;
pub mod kpi;
pub mod quality;
pub mod status;
pub mod timeseries;

pub use device::{device_trend, geo_points, top_device_by_readings, DeviceTrend, GeoPoint};
pub use group::{group_aggregate, group_count, group_distinct_devices, top_n, GroupRow};
pub use kpi::{compute_kpis, Kpis};
pub use quality::{
    default_bounds, find_duplicates, flag_out_of_range, histogram, percentile, Bounds,
    DuplicateReport, HistogramBin,
};
pub use status::{derive_status_counts, derive_status_counts_at, StatusCount, NO_DATA};
pub use timeseries::{bucket_series, weekday_hour_heatmap, Bucket, BucketPoint, Heatmap};

// ---

/// Reduction applied to the values of a group or time bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Agg {
    #[default]
    Mean,
    Sum,
    Max,
    Min,
}

impl Agg {
    /// Case-insensitive; `avg` is accepted for `mean`.
    pub fn from_param(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mean" | "avg" => Some(Agg::Mean),
            "sum" => Some(Agg::Sum),
            "max" => Some(Agg::Max),
            "min" => Some(Agg::Min),
            _ => None,
        }
    }

    /// Reduce `values`. `Sum` of nothing is `0.0`; every other reduction of
    /// nothing is `None`.
    pub fn apply(&self, values: &[f64]) -> Option<f64> {
        // ---
        if values.is_empty() {
            return match self {
                Agg::Sum => Some(0.0),
                _ => None,
            };
        }
        let result = match self {
            Agg::Mean => values.iter().sum::<f64>() / values.len() as f64,
            Agg::Sum => values.iter().sum(),
            Agg::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Agg::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        };
        Some(result)
    }
}
