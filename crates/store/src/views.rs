//! Read-only reporting views over a store snapshot.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use pulse_core::PulseRecord;
use serde::Serialize;

/// Default number of rows in the recent-submissions view.
pub const DEFAULT_RECENT_LIMIT: usize = 20;

/// Aggregates for one sector across all regions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectorSummary {
    pub sector: String,
    pub observations: usize,
    /// Rows of this sector skipped because a numeric field failed to parse.
    pub unparseable: usize,
    pub avg_crowd_index: Option<f64>,
    pub avg_queue_time: Option<f64>,
    pub visitors_by_region: BTreeMap<String, u64>,
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Summarize every row of `sector`.
pub fn sector_summary(records: &[PulseRecord], sector: &str) -> SectorSummary {
    let mut observations = 0usize;
    let mut unparseable = 0usize;
    let mut crowd_sum = 0.0;
    let mut queue_sum = 0.0;
    let mut visitors_by_region = BTreeMap::new();

    for (row, record) in records.iter().enumerate() {
        if record.sector != sector {
            continue;
        }
        let parsed = record.visitor_count(row).and_then(|v| {
            Ok((v, record.queue_time(row)?, record.crowd_index(row)?))
        });
        match parsed {
            Ok((visitors, queue, crowd)) => {
                observations += 1;
                crowd_sum += f64::from(crowd);
                queue_sum += queue;
                *visitors_by_region.entry(record.region.clone()).or_insert(0) += visitors;
            }
            Err(e) => {
                tracing::debug!(error = %e, "skipping row in sector summary");
                unparseable += 1;
            }
        }
    }

    let mean = |sum: f64| (observations > 0).then(|| round2(sum / observations as f64));
    SectorSummary {
        sector: sector.to_string(),
        observations,
        unparseable,
        avg_crowd_index: mean(crowd_sum),
        avg_queue_time: mean(queue_sum),
        visitors_by_region,
    }
}

/// Rows with an unparseable timestamp sort as the oldest; ties keep
/// insertion order.
fn recency_key(record: &PulseRecord, index: usize) -> (Option<DateTime<Utc>>, usize) {
    (record.recorded_at(), index)
}

/// Most recent row for a region/sector pair.
pub fn latest_for<'a>(
    records: &'a [PulseRecord],
    region: &str,
    sector: &str,
) -> Option<&'a PulseRecord> {
    records
        .iter()
        .enumerate()
        .filter(|(_, r)| r.region == region && r.sector == sector)
        .max_by_key(|(i, r)| recency_key(r, *i))
        .map(|(_, r)| r)
}

/// Up to `limit` rows, newest first.
pub fn recent(records: &[PulseRecord], limit: usize) -> Vec<&PulseRecord> {
    let mut indexed: Vec<(usize, &PulseRecord)> = records.iter().enumerate().collect();
    indexed.sort_by_key(|(i, r)| std::cmp::Reverse(recency_key(r, *i)));
    indexed.into_iter().take(limit).map(|(_, r)| r).collect()
}
