//! Column layout of the readings table.
//!
//! Columns are discovered by header name, never by position. The canonical
//! names live here together with the alias lists for the loosely named
//! columns (field officer, village) that historical exports spell in
//! several ways. Aliases are resolved once per load by [`resolve_column`].

use serde::{Deserialize, Serialize};

// ---

pub const TIMESTAMP: &str = "Timestamp";
pub const CLIENT: &str = "Client";
pub const DISTRICT: &str = "District";
pub const DEVICE_ID: &str = "DeviceID";
pub const DEVICE_TYPE: &str = "DeviceType";
pub const FARMER_NAME: &str = "FarmerName";
pub const WATER_LEVEL: &str = "WaterLevel";
pub const LATITUDE: &str = "Latitude";
pub const LONGITUDE: &str = "Longitude";
pub const STATUS: &str = "Status";

/// Columns that are synthesized as all-null when the source lacks them.
pub const EXPECTED_COLUMNS: [&str; 6] = [
    CLIENT,
    DISTRICT,
    DEVICE_ID,
    DEVICE_TYPE,
    FARMER_NAME,
    WATER_LEVEL,
];

/// Priority-ordered header names for the field officer column.
pub const FIELD_OFFICER_CANDIDATES: [&str; 7] = [
    "FieldOfficer",
    "Field Officer",
    "Field_Officer",
    "FOName",
    "Officer",
    "FiledOfficer",
    "FiledOfficer.Name",
];

/// Priority-ordered header names for the village column.
pub const VILLAGE_CANDIDATES: [&str; 4] =
    ["Village", "Village Name", "Village_Name", "VillageName"];

/// Return the first candidate present in `headers`, or `None`.
///
/// Matching is exact (after trimming surrounding whitespace from the header)
/// so the result is deterministic for a fixed candidate order.
pub fn resolve_column<'c, S: AsRef<str>>(headers: &[S], candidates: &[&'c str]) -> Option<&'c str> {
    // ---
    candidates
        .iter()
        .copied()
        .find(|c| headers.iter().any(|h| h.as_ref().trim() == *c))
}

/// What the loader found in the source header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Schema {
    /// Header names exactly as they appeared in the source.
    pub source_columns: Vec<String>,

    /// Expected columns that had to be synthesized as all-null.
    pub synthesized: Vec<String>,

    /// Header name the field officer values were read from.
    pub field_officer_column: Option<String>,

    /// Header name the village values were read from.
    pub village_column: Option<String>,

    pub has_status: bool,
}

impl Schema {
    pub fn has_column(&self, name: &str) -> bool {
        self.source_columns.iter().any(|c| c.trim() == name)
    }
}

/// A categorical column usable for grouping, filtering and duplicate keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    Timestamp,
    Client,
    District,
    Village,
    DeviceId,
    DeviceType,
    FarmerName,
    Status,
    FieldOfficer,
}

impl Column {
    /// Parse the snake_case name used on the query string.
    pub fn from_param(s: &str) -> Option<Self> {
        // ---
        match s.trim().to_ascii_lowercase().as_str() {
            "timestamp" => Some(Column::Timestamp),
            "client" => Some(Column::Client),
            "district" => Some(Column::District),
            "village" => Some(Column::Village),
            "device_id" | "device" | "deviceid" => Some(Column::DeviceId),
            "device_type" | "devicetype" => Some(Column::DeviceType),
            "farmer_name" | "farmer" | "farmername" => Some(Column::FarmerName),
            "status" => Some(Column::Status),
            "field_officer" | "officer" | "fieldofficer" => Some(Column::FieldOfficer),
            _ => None,
        }
    }
}

/// A numeric column usable for aggregation and range checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumericColumn {
    WaterLevel,
    Latitude,
    Longitude,
}

impl NumericColumn {
    pub fn from_param(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "water_level" | "waterlevel" => Some(NumericColumn::WaterLevel),
            "latitude" | "lat" => Some(NumericColumn::Latitude),
            "longitude" | "lon" | "lng" => Some(NumericColumn::Longitude),
            _ => None,
        }
    }
}
