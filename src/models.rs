//! Data model for water-level readings.

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Serialize, Serializer};

use crate::schema::{Column, NumericColumn, Schema};

// ---

/// Offset of India Standard Time from UTC.
const IST_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;

/// India Standard Time (UTC+5:30), the civil timezone for all day/week
/// bucketing and date-range boundaries.
pub fn ist() -> FixedOffset {
    FixedOffset::east_opt(IST_OFFSET_SECS).expect("IST offset is within one day")
}

/// Convert a stored UTC instant to IST.
pub fn to_ist(ts: DateTime<Utc>) -> DateTime<FixedOffset> {
    ts.with_timezone(&ist())
}

/// Calendar date of an instant in IST.
pub fn ist_date(ts: DateTime<Utc>) -> NaiveDate {
    to_ist(ts).date_naive()
}

/// Installation kind of a sensor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeviceType {
    Fixed,
    Portable,
    /// Any other label, kept verbatim.
    Other(String),
}

impl DeviceType {
    /// Classify a raw cell value. Matching of the two known kinds ignores
    /// ASCII case and surrounding whitespace.
    pub fn parse(raw: &str) -> Self {
        // ---
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("fixed") {
            DeviceType::Fixed
        } else if trimmed.eq_ignore_ascii_case("portable") {
            DeviceType::Portable
        } else {
            DeviceType::Other(trimmed.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            DeviceType::Fixed => "Fixed",
            DeviceType::Portable => "Portable",
            DeviceType::Other(label) => label,
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for DeviceType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// One normalized row of the dataset. Immutable once loaded.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Reading {
    // ---
    pub timestamp: Option<DateTime<Utc>>,
    pub client: Option<String>,
    pub district: Option<String>,
    pub village: Option<String>,
    pub device_id: Option<String>,
    pub device_type: Option<DeviceType>,
    pub farmer_name: Option<String>,
    pub water_level: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub status: Option<String>,
    pub field_officer: Option<String>,
}

impl Reading {
    /// Borrow the textual value of a categorical column.
    ///
    /// `Column::Timestamp` has no borrowed text form and yields `None`; use
    /// [`Reading::key`] when timestamps take part in a comparison.
    pub fn text(&self, column: Column) -> Option<&str> {
        // ---
        match column {
            Column::Timestamp => None,
            Column::Client => self.client.as_deref(),
            Column::District => self.district.as_deref(),
            Column::Village => self.village.as_deref(),
            Column::DeviceId => self.device_id.as_deref(),
            Column::DeviceType => self.device_type.as_ref().map(DeviceType::as_str),
            Column::FarmerName => self.farmer_name.as_deref(),
            Column::Status => self.status.as_deref(),
            Column::FieldOfficer => self.field_officer.as_deref(),
        }
    }

    /// Owned, comparable value of any column, including timestamps.
    pub fn key(&self, column: Column) -> Option<String> {
        match column {
            Column::Timestamp => self.timestamp.map(|ts| ts.to_rfc3339()),
            other => self.text(other).map(str::to_string),
        }
    }

    pub fn number(&self, column: NumericColumn) -> Option<f64> {
        match column {
            NumericColumn::WaterLevel => self.water_level,
            NumericColumn::Latitude => self.latitude,
            NumericColumn::Longitude => self.longitude,
        }
    }
}

/// The loaded table: ordered readings plus what the loader learned about
/// the source header.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub readings: Vec<Reading>,
    pub schema: Schema,
}

impl Dataset {
    pub fn new(readings: Vec<Reading>, schema: Schema) -> Self {
        Self { readings, schema }
    }

    /// Build a dataset straight from rows (schema left empty).
    pub fn from_readings(readings: Vec<Reading>) -> Self {
        Self {
            readings,
            schema: Schema::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Unfiltered view over every row.
    pub fn all(&self) -> WorkingSubset<'_> {
        WorkingSubset::new(self.readings.iter().collect())
    }
}

/// Rows of a [`Dataset`] that survived filtering. Borrowed, never copied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkingSubset<'a> {
    rows: Vec<&'a Reading>,
}

impl<'a> WorkingSubset<'a> {
    pub fn new(rows: Vec<&'a Reading>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[&'a Reading] {
        &self.rows
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a Reading> + '_ {
        self.rows.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Keep the rows matching `pred`.
    pub fn retain_where<F>(&self, mut pred: F) -> WorkingSubset<'a>
    where
        F: FnMut(&Reading) -> bool,
    {
        WorkingSubset::new(self.iter().filter(|r| pred(*r)).collect())
    }

    /// Rows whose device is of the given kind.
    pub fn only_device_type(&self, kind: &DeviceType) -> WorkingSubset<'a> {
        self.retain_where(|r| r.device_type.as_ref() == Some(kind))
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn test_ist_conversion() {
        // ---
        let ts = Utc.with_ymd_and_hms(2025, 3, 26, 18, 45, 0).unwrap();
        let local = to_ist(ts);

        // 18:45 UTC is 00:15 the next day in IST
        assert_eq!(local.hour(), 0);
        assert_eq!(local.minute(), 15);
        assert_eq!(ist_date(ts), NaiveDate::from_ymd_opt(2025, 3, 27).unwrap());
    }

    #[test]
    fn test_device_type_parse() {
        // ---
        assert_eq!(DeviceType::parse("Fixed"), DeviceType::Fixed);
        assert_eq!(DeviceType::parse(" portable "), DeviceType::Portable);
        assert_eq!(
            DeviceType::parse("Drone"),
            DeviceType::Other("Drone".to_string())
        );
        assert_eq!(DeviceType::parse("Drone").to_string(), "Drone");
    }

    #[test]
    fn test_reading_key_includes_timestamp() {
        // ---
        let reading = Reading {
            timestamp: Some(Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()),
            device_id: Some("D1".to_string()),
            device_type: Some(DeviceType::Fixed),
            ..Default::default()
        };

        assert_eq!(reading.text(Column::Timestamp), None);
        assert_eq!(
            reading.key(Column::Timestamp).as_deref(),
            Some("2025-01-01T12:00:00+00:00")
        );
        assert_eq!(reading.text(Column::DeviceType), Some("Fixed"));
        assert_eq!(reading.key(Column::Client), None);
    }

    #[test]
    fn test_only_device_type() {
        // ---
        let dataset = Dataset::from_readings(vec![
            Reading {
                device_type: Some(DeviceType::Portable),
                ..Default::default()
            },
            Reading {
                device_type: Some(DeviceType::Fixed),
                ..Default::default()
            },
            Reading::default(),
        ]);

        let portable = dataset.all().only_device_type(&DeviceType::Portable);
        assert_eq!(portable.len(), 1);
    }
}
