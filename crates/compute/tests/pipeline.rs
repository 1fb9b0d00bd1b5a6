//! End-to-end detection runs against in-memory and CSV stores with a
//! scripted notification sink.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use pulse_compute::{
    AlertComposer, AlertDispatcher, AnomalyDetector, AnomalyLabel, DeliveryOutcome,
    DetectionReport, PipelineError, PipelineOutcome, PulsePipeline,
};
use pulse_core::config::{AlertConfig, DetectionConfig};
use pulse_core::{Observation, PulseRecord, PulseSubmission, Taxonomy};
use pulse_notify::{Dispatcher, Notification, Notifier, NotifyError};
use pulse_store::{CsvObservationStore, MemoryObservationStore, ObservationStore, StoreError};

// ============================================================================
// Test Helpers
// ============================================================================

/// Sink that counts calls and fails on chosen (1-based) call numbers.
struct ScriptedNotifier {
    calls: Arc<AtomicUsize>,
    subjects: Arc<Mutex<Vec<String>>>,
    fail_on: HashSet<usize>,
    fail_all: bool,
}

#[async_trait::async_trait]
impl Notifier for ScriptedNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.subjects
            .lock()
            .unwrap()
            .push(notification.subject.clone());
        if self.fail_all || self.fail_on.contains(&call) {
            Err(NotifyError::Smtp(format!("relay refused call {call}")))
        } else {
            Ok(())
        }
    }

    fn channel_name(&self) -> &str {
        "scripted"
    }
}

struct Sink {
    calls: Arc<AtomicUsize>,
    subjects: Arc<Mutex<Vec<String>>>,
}

impl Sink {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn scripted(fail_on: &[usize], fail_all: bool) -> (Dispatcher, Sink) {
    let calls = Arc::new(AtomicUsize::new(0));
    let subjects = Arc::new(Mutex::new(Vec::new()));
    let notifier = ScriptedNotifier {
        calls: calls.clone(),
        subjects: subjects.clone(),
        fail_on: fail_on.iter().copied().collect(),
        fail_all,
    };
    (
        Dispatcher::new(Box::new(notifier), Duration::from_secs(2)),
        Sink { calls, subjects },
    )
}

fn pipeline(store: Arc<dyn ObservationStore>, dispatcher: Dispatcher) -> PulsePipeline {
    pipeline_with_seed(store, dispatcher, Some(2024))
}

fn pipeline_with_seed(
    store: Arc<dyn ObservationStore>,
    dispatcher: Dispatcher,
    seed: Option<u64>,
) -> PulsePipeline {
    let detection = DetectionConfig {
        contamination: 0.1,
        min_observations: 10,
        random_seed: seed,
        ..DetectionConfig::default()
    };
    PulsePipeline::new(
        store,
        AnomalyDetector::new(&detection).unwrap(),
        AlertDispatcher::new(
            AlertComposer::new(&AlertConfig::default()).unwrap(),
            dispatcher,
        ),
    )
}

fn row(region: &str, visitors: &str, queue: &str, crowd: &str) -> PulseRecord {
    PulseRecord {
        timestamp: "2025-05-01T09:00:00Z".to_string(),
        region: region.to_string(),
        sector: "Retail".to_string(),
        visitor_count: Some(visitors.to_string()),
        top_items: "Groceries".to_string(),
        queue_time: Some(queue.to_string()),
        payment_modes: "UPI,Cash".to_string(),
        crowd_index: Some(crowd.to_string()),
    }
}

/// `n` ordinary rows: crowd index in [2,4], queue time in [5,10].
fn normal_rows(n: usize) -> Vec<PulseRecord> {
    (0..n)
        .map(|i| {
            row(
                "Mumbai",
                &(40 + i).to_string(),
                &(5 + i % 6).to_string(),
                &(2 + i % 3).to_string(),
            )
        })
        .collect()
}

/// Nine ordinary rows followed by one surge row (crowd 10, queue 90).
fn surge_rows() -> Vec<PulseRecord> {
    let mut rows = normal_rows(9);
    rows.push(row("Delhi", "45", "90", "10"));
    rows
}

fn completed(outcome: PipelineOutcome) -> DetectionReport {
    match outcome {
        PipelineOutcome::Completed { report } => report,
        other => panic!("expected a completed run, got {other:?}"),
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn nine_rows_is_insufficient_and_sends_nothing() {
    let (dispatcher, sink) = scripted(&[], false);
    let mut rows = normal_rows(8);
    rows.push(row("Delhi", "45", "90", "10"));
    let store = Arc::new(MemoryObservationStore::from_records(rows));

    let outcome = pipeline(store, dispatcher).run().await.unwrap();
    match outcome {
        PipelineOutcome::InsufficientData { observed, required } => {
            assert_eq!(observed, 9);
            assert_eq!(required, 10);
        }
        other => panic!("expected insufficient data, got {other:?}"),
    }
    assert_eq!(sink.calls(), 0);
}

#[tokio::test]
async fn surge_row_is_flagged_and_alerted_once() {
    let (dispatcher, sink) = scripted(&[], false);
    let store = Arc::new(MemoryObservationStore::from_records(surge_rows()));

    let report = completed(pipeline(store, dispatcher).run().await.unwrap());

    assert_eq!(report.observations.len(), 10);
    for (i, obs) in report.observations.iter().enumerate() {
        assert_eq!(obs.index, i);
    }
    let flagged: Vec<usize> = report.anomalies().map(|o| o.index).collect();
    assert_eq!(flagged, vec![9]);
    assert_eq!(report.observations[9].label, AnomalyLabel::Anomalous);

    assert_eq!(report.alerts.len(), 1);
    assert_eq!(report.alerts[0].observation_index, 9);
    assert_eq!(report.alerts[0].outcome, DeliveryOutcome::Delivered);
    assert_eq!(sink.calls(), 1);
    assert_eq!(
        sink.subjects.lock().unwrap().as_slice(),
        ["Alert: Retail anomaly in Delhi".to_string()]
    );
}

#[tokio::test]
async fn always_failing_sink_still_completes_detection() {
    let (dispatcher, sink) = scripted(&[], true);
    let store = Arc::new(MemoryObservationStore::from_records(surge_rows()));

    let report = completed(pipeline(store, dispatcher).run().await.unwrap());

    assert_eq!(report.observations.len(), 10);
    let anomalies = report.anomaly_count();
    assert!(anomalies >= 1);
    assert_eq!(report.alerts.len(), anomalies);
    assert_eq!(report.delivery_failures().count(), anomalies);
    assert_eq!(sink.calls(), anomalies);
    for alert in &report.alerts {
        match &alert.outcome {
            DeliveryOutcome::Failed { reason } => assert!(reason.contains("relay refused")),
            other => panic!("expected failure, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn malformed_row_aborts_without_labels_or_alerts() {
    let (dispatcher, sink) = scripted(&[], false);
    let mut rows = surge_rows();
    rows[3].crowd_index = Some("abc".to_string());
    let store = Arc::new(MemoryObservationStore::from_records(rows));

    let err = pipeline(store, dispatcher).run().await.unwrap_err();
    match err {
        PipelineError::Schema(e) => {
            assert_eq!(e.row, 3);
            assert_eq!(e.field, "crowd_index");
        }
        other => panic!("expected schema error, got {other:?}"),
    }
    assert_eq!(sink.calls(), 0);
}

#[tokio::test]
async fn short_stored_row_is_a_schema_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pulse.csv");
    let mut csv = String::from(
        "timestamp,region,sector,visitor_count,top_items,queue_time,payment_modes,crowd_index\n",
    );
    for i in 0..10 {
        if i == 4 {
            // Trailing crowd_index cell is absent altogether.
            csv.push_str("2025-05-01T09:04:00Z,Delhi,Retail,20,,5,UPI\n");
        } else {
            csv.push_str(&format!("2025-05-01T09:0{i}:00Z,Delhi,Retail,{},,5,UPI,3\n", 20 + i));
        }
    }
    std::fs::write(&path, csv).unwrap();

    let (dispatcher, sink) = scripted(&[], false);
    let err = pipeline(Arc::new(CsvObservationStore::new(&path)), dispatcher)
        .run()
        .await
        .unwrap_err();
    match err {
        PipelineError::Schema(e) => {
            assert_eq!(e.row, 4);
            assert_eq!(e.field, "crowd_index");
            assert_eq!(e.reason, "is missing");
        }
        other => panic!("expected schema error, got {other:?}"),
    }
    assert_eq!(sink.calls(), 0);
}

#[tokio::test]
async fn failed_delivery_is_isolated_per_alert() {
    // 27 ordinary rows with three far-off surges interleaved at rows 5, 15, 25.
    let mut rows = normal_rows(27);
    rows.insert(5, row("Chennai", "500", "6", "3"));
    rows.insert(15, row("Kolkata", "45", "120", "4"));
    rows.insert(25, row("Lucknow", "900", "150", "10"));
    let store = Arc::new(MemoryObservationStore::from_records(rows));

    let (dispatcher, sink) = scripted(&[2], false);
    let report = completed(pipeline(store, dispatcher).run().await.unwrap());

    let indices: Vec<usize> = report.alerts.iter().map(|a| a.observation_index).collect();
    assert_eq!(indices, vec![5, 15, 25]);
    assert!(report.alerts[0].outcome.is_delivered());
    assert!(!report.alerts[1].outcome.is_delivered());
    assert!(report.alerts[2].outcome.is_delivered());
    assert_eq!(sink.calls(), 3);
}

#[tokio::test]
async fn fixed_seed_runs_agree_and_realert() {
    let (dispatcher, sink) = scripted(&[], false);
    let store = Arc::new(MemoryObservationStore::from_records(surge_rows()));
    let pipeline = pipeline(store, dispatcher);

    let first = completed(pipeline.run().await.unwrap());
    let second = completed(pipeline.run().await.unwrap());

    let labels = |r: &DetectionReport| {
        r.observations.iter().map(|o| o.label).collect::<Vec<_>>()
    };
    assert_eq!(labels(&first), labels(&second));
    assert_ne!(first.run_id, second.run_id);
    // No suppression between runs: the same anomaly is alerted twice.
    assert_eq!(sink.calls(), 2 * first.anomaly_count());
}

#[tokio::test]
async fn unseeded_runs_keep_the_anomaly_count_stable() {
    let store = Arc::new(MemoryObservationStore::from_records(surge_rows()));
    let (dispatcher, _sink) = scripted(&[], false);
    let pipeline = pipeline_with_seed(store, dispatcher, None);

    let mut counts = Vec::new();
    for _ in 0..5 {
        let report = completed(pipeline.run().await.unwrap());
        assert_eq!(report.observations.len(), 10);
        assert!(report.observations[9].label.is_anomalous());
        counts.push(report.anomaly_count());
    }
    let (min, max) = (counts.iter().min().unwrap(), counts.iter().max().unwrap());
    assert!(*min >= 1 && *max <= 2, "anomaly counts drifted: {counts:?}");
}

#[tokio::test]
async fn runs_never_modify_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pulse.csv");
    let store = Arc::new(CsvObservationStore::new(&path));
    let taxonomy = Taxonomy::default();
    for i in 0..12u64 {
        let obs = Observation::new(
            PulseSubmission {
                region: "Bengaluru".to_string(),
                sector: "Finance".to_string(),
                visitor_count: 20 + i,
                top_items: String::new(),
                queue_time: if i == 11 { 75.0 } else { 4.0 + (i % 4) as f64 },
                payment_modes: Vec::new(),
                crowd_index: if i == 11 { 10 } else { 3 },
            },
            Utc.with_ymd_and_hms(2025, 5, 2, 8, i as u32, 0).unwrap(),
            &taxonomy,
        )
        .unwrap();
        store.append(&obs).unwrap();
    }
    let before = std::fs::read(&path).unwrap();

    let (dispatcher, _sink) = scripted(&[], false);
    let pipeline = pipeline(store.clone(), dispatcher);
    for _ in 0..3 {
        completed(pipeline.run().await.unwrap());
    }

    assert_eq!(std::fs::read(&path).unwrap(), before);
    assert_eq!(store.read_all().unwrap().len(), 12);
}

struct UnreadableStore;

impl ObservationStore for UnreadableStore {
    fn append(&self, _observation: &Observation) -> Result<(), StoreError> {
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<PulseRecord>, StoreError> {
        Err(StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "permission denied",
        )))
    }
}

#[tokio::test]
async fn unreadable_store_aborts_the_run() {
    let (dispatcher, sink) = scripted(&[], false);
    let err = pipeline(Arc::new(UnreadableStore), dispatcher)
        .run()
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::StoreRead(_)));
    assert_eq!(sink.calls(), 0);
}

#[tokio::test]
async fn unconfigured_sink_reports_undelivered_alerts() {
    let store = Arc::new(MemoryObservationStore::from_records(surge_rows()));
    let report = completed(
        pipeline(store, Dispatcher::disabled())
            .run()
            .await
            .unwrap(),
    );
    assert_eq!(report.alerts.len(), report.anomaly_count());
    assert!(report.alerts.iter().all(|a| a.channel == "none"));
    assert_eq!(report.delivery_failures().count(), report.alerts.len());
}
