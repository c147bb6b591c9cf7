//! Per-device irrigation trend and map points.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use super::Agg;
use crate::models::{ist_date, WorkingSubset};

// ---

pub const UNKNOWN_DEVICE_TYPE: &str = "Unknown";

/// Device with the most readings; ties go to the smallest DeviceID.
pub fn top_device_by_readings(subset: &WorkingSubset<'_>) -> Option<String> {
    // ---
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for device in subset.iter().filter_map(|r| r.device_id.as_deref()) {
        *counts.entry(device).or_default() += 1;
    }
    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(device, _)| device.to_string())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub timestamp: DateTime<Utc>,
    pub water_level: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyMean {
    pub date: NaiveDate,
    pub water_level: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceTrend {
    pub device_id: String,
    /// First non-null device type seen for the device, or `Unknown`.
    pub device_type: String,
    /// Readings with a timestamp, oldest first.
    pub points: Vec<TrendPoint>,
    /// Mean water level per IST date.
    pub daily: Vec<DailyMean>,
}

/// Time series and daily means for one device within `subset`.
pub fn device_trend(subset: &WorkingSubset<'_>, device_id: &str) -> DeviceTrend {
    // ---
    let rows = subset.retain_where(|r| r.device_id.as_deref() == Some(device_id));

    let device_type = rows
        .iter()
        .find_map(|r| r.device_type.as_ref())
        .map_or_else(|| UNKNOWN_DEVICE_TYPE.to_string(), |t| t.to_string());

    let mut points: Vec<TrendPoint> = rows
        .iter()
        .filter_map(|r| {
            r.timestamp.map(|timestamp| TrendPoint {
                timestamp,
                water_level: r.water_level,
            })
        })
        .collect();
    points.sort_by_key(|p| p.timestamp);

    let mut by_day: BTreeMap<NaiveDate, Vec<f64>> = BTreeMap::new();
    for p in &points {
        let values = by_day.entry(ist_date(p.timestamp)).or_default();
        if let Some(v) = p.water_level {
            values.push(v);
        }
    }
    let daily = by_day
        .into_iter()
        .map(|(date, values)| DailyMean {
            date,
            water_level: Agg::Mean.apply(&values),
        })
        .collect();

    DeviceTrend {
        device_id: device_id.to_string(),
        device_type,
        points,
        daily,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoPoint {
    pub device_id: Option<String>,
    pub farmer_name: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub water_level: Option<f64>,
}

/// Rows carrying both coordinates.
pub fn geo_points(subset: &WorkingSubset<'_>) -> Vec<GeoPoint> {
    subset
        .iter()
        .filter_map(|r| {
            Some(GeoPoint {
                device_id: r.device_id.clone(),
                farmer_name: r.farmer_name.clone(),
                latitude: r.latitude?,
                longitude: r.longitude?,
                water_level: r.water_level,
            })
        })
        .collect()
}
