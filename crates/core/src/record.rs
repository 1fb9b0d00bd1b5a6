use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SchemaError;

/// Column order of the persisted pulse table.
pub const COLUMNS: [&str; 8] = [
    "timestamp",
    "region",
    "sector",
    "visitor_count",
    "top_items",
    "queue_time",
    "payment_modes",
    "crowd_index",
];

/// Upper bound of the crowd index scale (0 = empty, 10 = overwhelmed).
pub const MAX_CROWD_INDEX: u8 = 10;

/// A pulse row exactly as it sits in the store.
///
/// Every column is kept as text. The numeric columns only become numbers
/// through the parsing accessors, so a damaged row surfaces as a
/// [`SchemaError`] at detection time instead of failing the whole read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PulseRecord {
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub sector: String,
    #[serde(default)]
    pub visitor_count: Option<String>,
    #[serde(default)]
    pub top_items: String,
    #[serde(default)]
    pub queue_time: Option<String>,
    #[serde(default)]
    pub payment_modes: String,
    #[serde(default)]
    pub crowd_index: Option<String>,
}

fn required<'a>(
    raw: &'a Option<String>,
    row: usize,
    field: &'static str,
) -> Result<&'a str, SchemaError> {
    match raw.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => Ok(s),
        _ => Err(SchemaError::new(row, field, "is missing")),
    }
}

fn parse_number(raw: &str, row: usize, field: &'static str) -> Result<f64, SchemaError> {
    let value: f64 = raw
        .parse()
        .map_err(|_| SchemaError::new(row, field, format!("is not a number: {raw:?}")))?;
    if !value.is_finite() {
        return Err(SchemaError::new(row, field, format!("is not finite: {raw:?}")));
    }
    if value < 0.0 {
        return Err(SchemaError::new(row, field, format!("is negative: {raw}")));
    }
    Ok(value)
}

impl PulseRecord {
    /// Parse `visitor_count`. Accepts integral floats such as `"12.0"`,
    /// which is how spreadsheet round-trips tend to write counts.
    pub fn visitor_count(&self, row: usize) -> Result<u64, SchemaError> {
        let raw = required(&self.visitor_count, row, "visitor_count")?;
        let value = parse_number(raw, row, "visitor_count")?;
        if value.fract() != 0.0 {
            return Err(SchemaError::new(
                row,
                "visitor_count",
                format!("is not a whole number: {raw}"),
            ));
        }
        Ok(value as u64)
    }

    /// Parse `queue_time` in minutes.
    pub fn queue_time(&self, row: usize) -> Result<f64, SchemaError> {
        let raw = required(&self.queue_time, row, "queue_time")?;
        parse_number(raw, row, "queue_time")
    }

    /// Parse `crowd_index`, which must be a whole number in `0..=10`.
    pub fn crowd_index(&self, row: usize) -> Result<u8, SchemaError> {
        let raw = required(&self.crowd_index, row, "crowd_index")?;
        let value = parse_number(raw, row, "crowd_index")?;
        if value.fract() != 0.0 || value > f64::from(MAX_CROWD_INDEX) {
            return Err(SchemaError::new(
                row,
                "crowd_index",
                format!("is outside 0..={MAX_CROWD_INDEX}: {raw}"),
            ));
        }
        Ok(value as u8)
    }

    /// Parsed timestamp, if the stored text is RFC 3339.
    pub fn recorded_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}
