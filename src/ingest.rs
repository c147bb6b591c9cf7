//! Ingestion and normalization of the readings table.
//!
//! Loading never aborts on bad cells: unparseable timestamps and numbers
//! become null, expected columns that are absent are synthesized as all-null,
//! and no row is dropped for missing optional fields. Only a missing source
//! file (or an unreadable one) is fatal.

use std::{collections::HashMap, fs, io, path::Path};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use csv::{ReaderBuilder, StringRecord};
use tracing::{debug, info, warn};

use crate::error::LoadError;
use crate::models::{Dataset, DeviceType, Reading};
use crate::schema::{self, Schema};

// ---

/// Delimiters tried by auto-detection, in tie-break order.
const DELIMITER_CANDIDATES: [u8; 4] = [b',', b';', b'\t', b'|'];

/// Number of lines inspected when sniffing the delimiter.
const SNIFF_LINES: usize = 20;

/// Formats accepted by the strict pass, after RFC 3339. Slashed dates with
/// the year last are month-first here.
const STRICT_DATETIME_FORMATS: [&str; 10] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const STRICT_OFFSET_FORMATS: [&str; 8] = [
    "%Y-%m-%dT%H:%M:%S%:z",
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
];

const STRICT_DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

const DAY_FIRST_DATETIME_FORMATS: [&str; 9] = [
    "%d-%m-%Y %H:%M:%S",
    "%d-%m-%Y %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d.%m.%Y %H:%M:%S",
    "%d.%m.%Y %H:%M",
    "%d-%m-%Y %H:%M:%S%.f",
    "%d/%m/%Y %H:%M:%S%.f",
    "%d-%m-%YT%H:%M:%S",
];

const DAY_FIRST_DATE_FORMATS: [&str; 3] = ["%d-%m-%Y", "%d/%m/%Y", "%d.%m.%Y"];

/// Load and normalize the table at `path`.
pub fn load(path: impl AsRef<Path>) -> Result<Dataset, LoadError> {
    // ---
    let path = path.as_ref();
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(LoadError::MissingSource(path.to_path_buf()));
        }
        Err(e) => return Err(LoadError::Io(e)),
    };

    info!("Loading readings from {}", path.display());
    let dataset = parse_str(&content)?;
    info!(
        rows = dataset.len(),
        columns = dataset.schema.source_columns.len(),
        "Readings loaded from {}",
        path.display()
    );
    Ok(dataset)
}

/// Normalize an in-memory delimited table.
pub fn parse_str(content: &str) -> Result<Dataset, LoadError> {
    // ---
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let delimiter = sniff_delimiter(content);
    debug!("Using delimiter {:?}", delimiter as char);

    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    let layout = Layout::new(&headers);

    let mut readings = Vec::new();
    let mut raw_timestamps = Vec::new();
    for record in reader.records() {
        let record = record?;
        raw_timestamps.push(layout.cell(&record, layout.timestamp));
        readings.push(layout.reading(&record));
    }

    let timestamps = parse_timestamp_column(&raw_timestamps);
    let null_timestamps = timestamps.iter().filter(|t| t.is_none()).count();
    for (reading, ts) in readings.iter_mut().zip(timestamps) {
        reading.timestamp = ts;
    }
    if null_timestamps > 0 {
        debug!(null_timestamps, "Timestamps left null after normalization");
    }

    let schema = layout.into_schema(headers, &readings);
    if !schema.synthesized.is_empty() {
        warn!(
            "Expected columns missing from source, filled with null: {}",
            schema.synthesized.join(", ")
        );
    }

    Ok(Dataset::new(readings, schema))
}

/// Pick the delimiter whose header splits into several fields and whose
/// sampled rows most often match that width. Wider headers win ties, then
/// candidate order. Falls back to comma.
pub fn sniff_delimiter(content: &str) -> u8 {
    // ---
    let sample: Vec<&str> = content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(SNIFF_LINES)
        .collect();
    if sample.is_empty() {
        return b',';
    }
    let sample_text = sample.join("\n");

    // (delimiter, rows matching the header width, header width)
    let mut best: Option<(u8, usize, usize)> = None;
    for delimiter in DELIMITER_CANDIDATES {
        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .from_reader(sample_text.as_bytes());

        let widths: Vec<usize> = reader
            .records()
            .filter_map(Result::ok)
            .map(|r| r.len())
            .collect();
        let Some(&header) = widths.first() else {
            continue;
        };
        if header < 2 {
            continue;
        }
        let matching = widths.iter().filter(|w| **w == header).count();
        if best.map_or(true, |(_, m, h)| (matching, header) > (m, h)) {
            best = Some((delimiter, matching, header));
        }
    }

    best.map_or(b',', |(d, _, _)| d)
}

/// Parse one cell with the strict conventions. Naive values are taken as UTC.
pub fn parse_timestamp_strict(raw: &str) -> Option<DateTime<Utc>> {
    // ---
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in STRICT_OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(raw, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    parse_naive(raw, &STRICT_DATETIME_FORMATS, &STRICT_DATE_FORMATS)
}

/// Parse one cell preferring day-first dates, then the strict conventions.
pub fn parse_timestamp_day_first(raw: &str) -> Option<DateTime<Utc>> {
    // ---
    parse_naive(raw.trim(), &DAY_FIRST_DATETIME_FORMATS, &DAY_FIRST_DATE_FORMATS)
        .or_else(|| parse_timestamp_strict(raw))
}

fn parse_naive(
    raw: &str,
    datetime_formats: &[&str],
    date_formats: &[&str],
) -> Option<DateTime<Utc>> {
    // ---
    datetime_formats
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            date_formats
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .map(|naive| naive.and_utc())
}

/// Normalize a whole timestamp column.
///
/// The strict pass must succeed for every non-null cell; otherwise the whole
/// column is reparsed day-first and cells that still fail become null.
pub fn parse_timestamp_column(raw: &[Option<String>]) -> Vec<Option<DateTime<Utc>>> {
    // ---
    let strict: Option<Vec<Option<DateTime<Utc>>>> = raw
        .iter()
        .map(|cell| match cell {
            None => Some(None),
            Some(s) => parse_timestamp_strict(s).map(Some),
        })
        .collect();

    match strict {
        Some(parsed) => parsed,
        None => {
            debug!("Strict timestamp parse failed, retrying day-first");
            raw.iter()
                .map(|cell| cell.as_deref().and_then(parse_timestamp_day_first))
                .collect()
        }
    }
}

/// Coerce a cell to a finite number.
pub fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Column positions resolved from the header.
struct Layout {
    timestamp: Option<usize>,
    client: Option<usize>,
    district: Option<usize>,
    village: Option<usize>,
    device_id: Option<usize>,
    device_type: Option<usize>,
    farmer_name: Option<usize>,
    water_level: Option<usize>,
    latitude: Option<usize>,
    longitude: Option<usize>,
    status: Option<usize>,
    field_officer: Option<usize>,
    village_column: Option<&'static str>,
    field_officer_column: Option<&'static str>,
}

impl Layout {
    fn new(headers: &[String]) -> Self {
        // ---
        let index: HashMap<&str, usize> = headers
            .iter()
            .enumerate()
            .rev()
            .map(|(i, h)| (h.as_str(), i))
            .collect();
        let pos = |name: &str| index.get(name).copied();

        let village_column = schema::resolve_column(headers, &schema::VILLAGE_CANDIDATES);
        let field_officer_column =
            schema::resolve_column(headers, &schema::FIELD_OFFICER_CANDIDATES);

        Self {
            timestamp: pos(schema::TIMESTAMP),
            client: pos(schema::CLIENT),
            district: pos(schema::DISTRICT),
            village: village_column.and_then(pos),
            device_id: pos(schema::DEVICE_ID),
            device_type: pos(schema::DEVICE_TYPE),
            farmer_name: pos(schema::FARMER_NAME),
            water_level: pos(schema::WATER_LEVEL),
            latitude: pos(schema::LATITUDE),
            longitude: pos(schema::LONGITUDE),
            status: pos(schema::STATUS),
            field_officer: field_officer_column.and_then(pos),
            village_column,
            field_officer_column,
        }
    }

    fn cell(&self, record: &StringRecord, idx: Option<usize>) -> Option<String> {
        idx.and_then(|i| record.get(i))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    fn number(&self, record: &StringRecord, idx: Option<usize>) -> Option<f64> {
        self.cell(record, idx).as_deref().and_then(parse_number)
    }

    /// Build a reading with the timestamp left for the column-level pass.
    fn reading(&self, record: &StringRecord) -> Reading {
        // ---
        Reading {
            timestamp: None,
            client: self.cell(record, self.client),
            district: self.cell(record, self.district),
            village: self.cell(record, self.village),
            device_id: self.cell(record, self.device_id),
            device_type: self
                .cell(record, self.device_type)
                .map(|s| DeviceType::parse(&s)),
            farmer_name: self.cell(record, self.farmer_name),
            water_level: self.number(record, self.water_level),
            latitude: self.number(record, self.latitude),
            longitude: self.number(record, self.longitude),
            status: self.cell(record, self.status),
            field_officer: self.cell(record, self.field_officer),
        }
    }

    fn into_schema(self, headers: Vec<String>, readings: &[Reading]) -> Schema {
        // ---
        let synthesized = schema::EXPECTED_COLUMNS
            .iter()
            .filter(|c| !headers.iter().any(|h| h == *c))
            .map(|c| c.to_string())
            .collect();

        Schema {
            synthesized,
            field_officer_column: self.field_officer_column.map(str::to_string),
            village_column: self.village_column.map(str::to_string),
            has_status: self.status.is_some() && readings.iter().any(|r| r.status.is_some()),
            source_columns: headers,
        }
    }
}
