//! Grouped counts and aggregates over a categorical column.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;

use super::Agg;
use crate::models::WorkingSubset;
use crate::schema::{Column, NumericColumn};

// ---

/// One bar of a grouped chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupRow<V> {
    pub key: String,
    pub value: V,
}

/// Rows per key, largest first (ties by key). Rows with a null key are
/// left out.
pub fn group_count(subset: &WorkingSubset<'_>, column: Column) -> Vec<GroupRow<usize>> {
    // ---
    let mut counts: HashMap<String, usize> = HashMap::new();
    for key in subset.iter().filter_map(|r| r.key(column)) {
        *counts.entry(key).or_default() += 1;
    }
    sorted_desc(counts)
}

/// Distinct devices per key, largest first (ties by key).
pub fn group_distinct_devices(subset: &WorkingSubset<'_>, column: Column) -> Vec<GroupRow<usize>> {
    // ---
    let mut devices: HashMap<String, HashSet<&str>> = HashMap::new();
    for r in subset.iter() {
        if let (Some(key), Some(device)) = (r.key(column), r.device_id.as_deref()) {
            devices.entry(key).or_default().insert(device);
        }
    }
    sorted_desc(devices.into_iter().map(|(k, set)| (k, set.len())).collect())
}

/// Aggregate of `value` per key, ordered by key. A group whose values are
/// all null reduces per [`Agg::apply`].
pub fn group_aggregate(
    subset: &WorkingSubset<'_>,
    column: Column,
    value: NumericColumn,
    agg: Agg,
) -> Vec<GroupRow<Option<f64>>> {
    // ---
    let mut groups: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for r in subset.iter() {
        if let Some(key) = r.key(column) {
            let values = groups.entry(key).or_default();
            if let Some(v) = r.number(value) {
                values.push(v);
            }
        }
    }
    groups
        .into_iter()
        .map(|(key, values)| GroupRow {
            key,
            value: agg.apply(&values),
        })
        .collect()
}

/// Keep the first `n` rows.
pub fn top_n<V>(mut rows: Vec<GroupRow<V>>, n: usize) -> Vec<GroupRow<V>> {
    rows.truncate(n);
    rows
}

fn sorted_desc(counts: HashMap<String, usize>) -> Vec<GroupRow<usize>> {
    let mut rows: Vec<GroupRow<usize>> = counts
        .into_iter()
        .map(|(key, value)| GroupRow { key, value })
        .collect();
    rows.sort_by(|a, b| b.value.cmp(&a.value).then_with(|| a.key.cmp(&b.key)));
    rows
}
