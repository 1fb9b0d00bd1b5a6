use pulse_core::{PulseRecord, SchemaError};
use serde::Serialize;

/// Feature vector dimensionality.
pub const FEATURE_DIM: usize = 3;

/// Numeric projection of one observation, used verbatim (no scaling).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureVector {
    pub visitor_count: f64,
    pub queue_time: f64,
    pub crowd_index: f64,
}

impl FeatureVector {
    pub fn to_vec(&self) -> Vec<f64> {
        vec![self.visitor_count, self.queue_time, self.crowd_index]
    }
}

/// Project one stored row. `row` is its position in the store snapshot.
pub fn extract(record: &PulseRecord, row: usize) -> Result<FeatureVector, SchemaError> {
    Ok(FeatureVector {
        visitor_count: record.visitor_count(row)? as f64,
        queue_time: record.queue_time(row)?,
        crowd_index: f64::from(record.crowd_index(row)?),
    })
}

/// Project every row, preserving order. The first malformed row aborts
/// extraction; no partial output is returned.
pub fn extract_features(records: &[PulseRecord]) -> Result<Vec<FeatureVector>, SchemaError> {
    records
        .iter()
        .enumerate()
        .map(|(row, record)| extract(record, row))
        .collect()
}
