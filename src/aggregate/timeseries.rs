//! Time-bucketed trends and the weekday × hour heatmap.
//!
//! Timestamps are converted to IST before bucketing. Rows with a null
//! timestamp never contribute.

use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDateTime, NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};

use super::Agg;
use crate::models::{to_ist, WorkingSubset};

// ---

/// Heatmap row order.
pub const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bucket {
    Hour,
    #[default]
    Day,
    /// Weeks start on Monday.
    Week,
}

impl Bucket {
    pub fn from_param(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hour" | "hourly" => Some(Bucket::Hour),
            "day" | "daily" => Some(Bucket::Day),
            "week" | "weekly" => Some(Bucket::Week),
            _ => None,
        }
    }

    /// Start of the bucket containing `local`.
    pub fn truncate(&self, local: NaiveDateTime) -> NaiveDateTime {
        // ---
        let date = local.date();
        match self {
            Bucket::Hour => date.and_time(
                NaiveTime::from_hms_opt(local.hour(), 0, 0).unwrap_or(NaiveTime::MIN),
            ),
            Bucket::Day => date.and_time(NaiveTime::MIN),
            Bucket::Week => {
                let back = i64::from(date.weekday().num_days_from_monday());
                (date - Duration::days(back)).and_time(NaiveTime::MIN)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketPoint {
    /// Bucket start, IST wall-clock time.
    pub bucket: NaiveDateTime,
    pub value: Option<f64>,
    /// Rows that fell in the bucket, with or without a water level.
    pub readings: usize,
}

/// Water level per time bucket, ordered by bucket start.
pub fn bucket_series(subset: &WorkingSubset<'_>, bucket: Bucket, agg: Agg) -> Vec<BucketPoint> {
    // ---
    let mut groups: BTreeMap<NaiveDateTime, (usize, Vec<f64>)> = BTreeMap::new();
    for r in subset.iter() {
        let Some(ts) = r.timestamp else { continue };
        let key = bucket.truncate(to_ist(ts).naive_local());
        let (rows, values) = groups.entry(key).or_default();
        *rows += 1;
        if let Some(v) = r.water_level {
            values.push(v);
        }
    }

    groups
        .into_iter()
        .map(|(bucket, (readings, values))| BucketPoint {
            bucket,
            value: agg.apply(&values),
            readings,
        })
        .collect()
}

/// Mean water level by IST weekday (rows, Monday first) and hour (columns).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Heatmap {
    pub days: Vec<String>,
    pub hours: Vec<u32>,
    /// `cells[day][hour]`, `None` where there is no value.
    pub cells: Vec<Vec<Option<f64>>>,
}

impl Heatmap {
    pub fn cell(&self, day: Weekday, hour: u32) -> Option<f64> {
        let row = day.num_days_from_monday() as usize;
        self.cells.get(row)?.get(hour as usize).copied().flatten()
    }
}

/// Mean water level per IST weekday and hour, skipping rows without a timestamp or level.
pub fn weekday_hour_heatmap(subset: &WorkingSubset<'_>) -> Heatmap {
    // ---
    let mut sums = [[(0.0f64, 0usize); 24]; 7];
    for r in subset.iter() {
        let (Some(ts), Some(v)) = (r.timestamp, r.water_level) else {
            continue;
        };
        let local = to_ist(ts);
        let day = local.weekday().num_days_from_monday() as usize;
        let cell = &mut sums[day][local.hour() as usize];
        cell.0 += v;
        cell.1 += 1;
    }

    Heatmap {
        days: WEEKDAYS.iter().map(weekday_name).collect(),
        hours: (0..24).collect(),
        cells: sums
            .iter()
            .map(|row| {
                row.iter()
                    .map(|(sum, n)| (*n > 0).then(|| sum / *n as f64))
                    .collect()
            })
            .collect(),
    }
}

fn weekday_name(day: &Weekday) -> String {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::models::{Dataset, Reading};
    use chrono::{NaiveDate, TimeZone, Utc};

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, level: Option<f64>) -> Reading {
        Reading {
            timestamp: Some(Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()),
            water_level: level,
            ..Default::default()
        }
    }

    #[test]
    fn test_daily_buckets_use_ist() {
        // ---
        // 19:00 UTC on Mar 1 is already Mar 2 in IST.
        let dataset = Dataset::from_readings(vec![
            at(2025, 3, 1, 10, 0, Some(10.0)),
            at(2025, 3, 1, 19, 0, Some(30.0)),
            at(2025, 3, 2, 5, 0, Some(50.0)),
            Reading {
                water_level: Some(999.0),
                ..Default::default()
            },
        ]);

        let series = bucket_series(&dataset.all(), Bucket::Day, Agg::Mean);
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].bucket.date(), NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
        assert_eq!(series[0].value, Some(10.0));
        assert_eq!(series[1].value, Some(40.0));
        assert_eq!(series[1].readings, 2);
    }

    #[test]
    fn test_weekly_buckets_start_monday() {
        // ---
        // 2025-03-05 is a Wednesday; 2025-03-03 the Monday before.
        let local = NaiveDate::from_ymd_opt(2025, 3, 5)
            .unwrap()
            .and_hms_opt(15, 20, 0)
            .unwrap();
        let start = Bucket::Week.truncate(local);
        let monday = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
        assert_eq!(start, monday.and_hms_opt(0, 0, 0).unwrap());
        assert_eq!(Bucket::Hour.truncate(local).minute(), 0);
    }

    #[test]
    fn test_bucket_without_levels() {
        // ---
        let dataset = Dataset::from_readings(vec![at(2025, 3, 1, 10, 0, None)]);
        let mean = bucket_series(&dataset.all(), Bucket::Day, Agg::Mean);
        let sum = bucket_series(&dataset.all(), Bucket::Day, Agg::Sum);
        assert_eq!(mean[0].value, None);
        assert_eq!(sum[0].value, Some(0.0));
    }

    #[test]
    fn test_heatmap_monday_first() {
        // ---
        // 2025-03-03 04:00 UTC = Monday 09:30 IST; 2025-03-09 = Sunday.
        let dataset = Dataset::from_readings(vec![
            at(2025, 3, 3, 4, 0, Some(10.0)),
            at(2025, 3, 3, 4, 15, Some(20.0)),
            at(2025, 3, 9, 4, 0, Some(5.0)),
        ]);
        let heatmap = weekday_hour_heatmap(&dataset.all());

        assert_eq!(heatmap.days.first().map(String::as_str), Some("Monday"));
        assert_eq!(heatmap.days.last().map(String::as_str), Some("Sunday"));
        assert_eq!(heatmap.cell(Weekday::Mon, 9), Some(15.0));
        assert_eq!(heatmap.cell(Weekday::Sun, 9), Some(5.0));
        assert_eq!(heatmap.cell(Weekday::Tue, 9), None);
    }

    #[test]
    fn test_empty_subset() {
        // ---
        assert!(bucket_series(&WorkingSubset::default(), Bucket::Hour, Agg::Max).is_empty());
        let heatmap = weekday_hour_heatmap(&WorkingSubset::default());
        assert_eq!(heatmap.cells.len(), 7);
        assert!(heatmap.cells.iter().flatten().all(Option::is_none));
    }
}
