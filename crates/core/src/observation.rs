use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::record::{PulseRecord, MAX_CROWD_INDEX};

/// Payment channels a location can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentMode {
    Cash,
    Card,
    #[serde(rename = "UPI")]
    Upi,
    Wallet,
}

impl PaymentMode {
    pub const ALL: [PaymentMode; 4] = [
        PaymentMode::Cash,
        PaymentMode::Card,
        PaymentMode::Upi,
        PaymentMode::Wallet,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMode::Cash => "Cash",
            PaymentMode::Card => "Card",
            PaymentMode::Upi => "UPI",
            PaymentMode::Wallet => "Wallet",
        }
    }
}

impl std::fmt::Display for PaymentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PaymentMode::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ValidationError::UnknownPaymentMode(s.to_string()))
    }
}

/// The closed region and sector lists an installation accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Taxonomy {
    pub regions: Vec<String>,
    pub sectors: Vec<String>,
}

impl Default for Taxonomy {
    fn default() -> Self {
        Self {
            regions: ["Mumbai", "Delhi", "Chennai", "Kolkata", "Bengaluru", "Lucknow"]
                .map(String::from)
                .to_vec(),
            sectors: ["Retail", "Hospitality", "Finance"].map(String::from).to_vec(),
        }
    }
}

impl Taxonomy {
    pub fn has_region(&self, region: &str) -> bool {
        self.regions.iter().any(|r| r == region)
    }

    pub fn has_sector(&self, sector: &str) -> bool {
        self.sectors.iter().any(|s| s == sector)
    }
}

/// Fields submitted through intake, before validation.
#[derive(Debug, Clone, Deserialize)]
pub struct PulseSubmission {
    pub region: String,
    pub sector: String,
    pub visitor_count: u64,
    #[serde(default)]
    pub top_items: String,
    pub queue_time: f64,
    #[serde(default)]
    pub payment_modes: Vec<PaymentMode>,
    pub crowd_index: u8,
}

/// A validated pulse observation. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    timestamp: DateTime<Utc>,
    region: String,
    sector: String,
    visitor_count: u64,
    top_items: String,
    queue_time: f64,
    payment_modes: Vec<PaymentMode>,
    crowd_index: u8,
}

impl Observation {
    /// Validate a submission against the taxonomy and stamp it with `timestamp`.
    pub fn new(
        submission: PulseSubmission,
        timestamp: DateTime<Utc>,
        taxonomy: &Taxonomy,
    ) -> Result<Self, ValidationError> {
        if !taxonomy.has_region(&submission.region) {
            return Err(ValidationError::UnknownRegion(submission.region));
        }
        if !taxonomy.has_sector(&submission.sector) {
            return Err(ValidationError::UnknownSector(submission.sector));
        }
        if !submission.queue_time.is_finite() || submission.queue_time < 0.0 {
            return Err(ValidationError::InvalidQueueTime(submission.queue_time));
        }
        if submission.crowd_index > MAX_CROWD_INDEX {
            return Err(ValidationError::CrowdIndexOutOfRange(submission.crowd_index));
        }

        // Order-preserving set: keep the first occurrence of each mode.
        let mut payment_modes = Vec::with_capacity(submission.payment_modes.len());
        for mode in submission.payment_modes {
            if !payment_modes.contains(&mode) {
                payment_modes.push(mode);
            }
        }

        Ok(Self {
            timestamp,
            region: submission.region,
            sector: submission.sector,
            visitor_count: submission.visitor_count,
            top_items: submission.top_items,
            queue_time: submission.queue_time,
            payment_modes,
            crowd_index: submission.crowd_index,
        })
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn sector(&self) -> &str {
        &self.sector
    }

    pub fn visitor_count(&self) -> u64 {
        self.visitor_count
    }

    pub fn top_items(&self) -> &str {
        &self.top_items
    }

    pub fn queue_time(&self) -> f64 {
        self.queue_time
    }

    pub fn payment_modes(&self) -> &[PaymentMode] {
        &self.payment_modes
    }

    pub fn crowd_index(&self) -> u8 {
        self.crowd_index
    }

    /// Render as the row shape the store persists.
    pub fn to_record(&self) -> PulseRecord {
        PulseRecord {
            timestamp: self.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
            region: self.region.clone(),
            sector: self.sector.clone(),
            visitor_count: Some(self.visitor_count.to_string()),
            top_items: self.top_items.clone(),
            queue_time: Some(self.queue_time.to_string()),
            payment_modes: self
                .payment_modes
                .iter()
                .map(PaymentMode::as_str)
                .collect::<Vec<_>>()
                .join(","),
            crowd_index: Some(self.crowd_index.to_string()),
        }
    }
}
