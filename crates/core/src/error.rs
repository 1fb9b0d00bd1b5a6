use thiserror::Error;

/// Intake rejected an observation before it reached the store.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("unknown region: {0}")]
    UnknownRegion(String),

    #[error("unknown sector: {0}")]
    UnknownSector(String),

    #[error("unknown payment mode: {0}")]
    UnknownPaymentMode(String),

    #[error("queue time must be a finite, non-negative number of minutes (got {0})")]
    InvalidQueueTime(f64),

    #[error("crowd index must be within 0..=10 (got {0})")]
    CrowdIndexOutOfRange(u8),
}

/// A stored row is missing, or carries malformed, numeric data.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("row {row}: field `{field}` {reason}")]
pub struct SchemaError {
    /// Zero-based data row index (header excluded).
    pub row: usize,
    pub field: &'static str,
    pub reason: String,
}

impl SchemaError {
    pub fn new(row: usize, field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            row,
            field,
            reason: reason.into(),
        }
    }
}
