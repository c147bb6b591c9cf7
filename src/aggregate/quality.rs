//! Data-quality checks: out-of-range values, duplicate keys, distribution.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::{Reading, WorkingSubset};
use crate::schema::{Column, NumericColumn};

// ---

/// Bounds used when the column has no values to take quantiles from.
const FALLBACK_BOUNDS: Bounds = Bounds {
    low: 0.0,
    high: 100.0,
};

/// Inclusive allowed range; values strictly outside are flagged.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub low: f64,
    pub high: f64,
}

impl Bounds {
    pub fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    /// Inclusive bounds: values equal to either end are kept.
    pub fn excludes(&self, value: f64) -> bool {
        value < self.low || value > self.high
    }
}

/// Linear-interpolated quantile `q` (0..=1) of `values`.
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    // ---
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let rank = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// 1st and 99th percentile of the column, or `0.0..=100.0` without values.
pub fn default_bounds(subset: &WorkingSubset<'_>, column: NumericColumn) -> Bounds {
    // ---
    let values = column_values(subset, column);
    match (percentile(&values, 0.01), percentile(&values, 0.99)) {
        (Some(low), Some(high)) => Bounds { low, high },
        _ => FALLBACK_BOUNDS,
    }
}

/// Rows with a non-null value outside `bounds`, in subset order.
pub fn flag_out_of_range<'a>(
    subset: &WorkingSubset<'a>,
    column: NumericColumn,
    bounds: Bounds,
) -> Vec<&'a Reading> {
    subset
        .iter()
        .filter(|r| r.number(column).is_some_and(|v| bounds.excludes(v)))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateReport<'a> {
    /// Rows beyond the first occurrence of each repeated key.
    pub extra_occurrences: usize,
    /// Every row whose key occurs more than once, sorted by key.
    pub rows: Vec<&'a Reading>,
}

impl DuplicateReport<'_> {
    /// Total rows involved in a duplicate key.
    pub fn all_occurrences(&self) -> usize {
        self.rows.len()
    }
}

/// Rows sharing identical values across every key column. Nulls match nulls.
pub fn find_duplicates<'a>(
    subset: &WorkingSubset<'a>,
    key_columns: &[Column],
) -> DuplicateReport<'a> {
    // ---
    let key_of = |r: &Reading| -> Vec<Option<String>> {
        key_columns.iter().map(|c| r.key(*c)).collect()
    };

    let mut occurrences: HashMap<Vec<Option<String>>, usize> = HashMap::new();
    for r in subset.iter() {
        *occurrences.entry(key_of(r)).or_default() += 1;
    }

    let extra_occurrences = occurrences.values().map(|n| n.saturating_sub(1)).sum();

    let mut keyed: Vec<(Vec<Option<String>>, &'a Reading)> = subset
        .iter()
        .map(|r| (key_of(r), r))
        .filter(|(k, _)| occurrences.get(k).copied().unwrap_or(0) > 1)
        .collect();
    keyed.sort_by(|a, b| a.0.cmp(&b.0));

    DuplicateReport {
        extra_occurrences,
        rows: keyed.into_iter().map(|(_, r)| r).collect(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramBin {
    pub start: f64,
    pub end: f64,
    pub count: usize,
}

/// Equal-width bins over the column's range; the last bin is closed.
pub fn histogram(
    subset: &WorkingSubset<'_>,
    column: NumericColumn,
    bins: usize,
) -> Vec<HistogramBin> {
    // ---
    let values = column_values(subset, column);
    if values.is_empty() || bins == 0 {
        return Vec::new();
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if min == max {
        return vec![HistogramBin {
            start: min,
            end: max,
            count: values.len(),
        }];
    }

    let width = (max - min) / bins as f64;
    let mut counts = vec![0usize; bins];
    for v in values {
        let idx = (((v - min) / width).floor() as usize).min(bins - 1);
        counts[idx] += 1;
    }
    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| HistogramBin {
            start: min + width * i as f64,
            end: if i + 1 == bins { max } else { min + width * (i + 1) as f64 },
            count,
        })
        .collect()
}

fn column_values(subset: &WorkingSubset<'_>, column: NumericColumn) -> Vec<f64> {
    subset.iter().filter_map(|r| r.number(column)).collect()
}
