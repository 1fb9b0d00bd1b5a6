//! Pulse pipeline orchestrator.
//!
//! One linear pass per invocation:
//!
//! `Loading → (InsufficientData | Extracting → Detecting → Dispatching) → Done`
//!
//! The whole store is re-read and the model refitted on every run; no
//! state survives between runs. Store and schema failures abort the run.
//! Delivery failures are recorded per alert and never stop the remaining
//! dispatches.

pub mod alerts;
pub mod anomaly;
pub mod features;

use std::sync::Arc;
use std::time::Instant;

use pulse_core::{PulseConfig, PulseRecord, SchemaError};
use pulse_notify::{Dispatcher, NotifyError};
use pulse_store::{ObservationStore, StoreError};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use self::alerts::{AlertComposer, AlertDispatcher, AlertEvent};
use self::anomaly::{AnomalyDetector, AnomalyLabel, DetectorError};
use self::features::{extract_features, FeatureVector};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("store read failed: {0}")]
    StoreRead(#[from] StoreError),

    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("anomaly detector failed: {0}")]
    Detector(#[from] DetectorError),

    #[error("alerting misconfigured: {0}")]
    Alerting(#[from] NotifyError),

    #[error("detection task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// One observation with its per-run derived values.
#[derive(Debug, Clone, Serialize)]
pub struct LabeledObservation {
    pub index: usize,
    pub record: PulseRecord,
    pub features: FeatureVector,
    pub score: f64,
    pub label: AnomalyLabel,
}

/// Everything a completed run produced.
#[derive(Debug, Clone, Serialize)]
pub struct DetectionReport {
    pub run_id: Uuid,
    pub threshold: f64,
    /// Index-aligned with the store snapshot the run read.
    pub observations: Vec<LabeledObservation>,
    /// One entry per anomalous observation, in row order.
    pub alerts: Vec<AlertEvent>,
}

impl DetectionReport {
    pub fn anomalies(&self) -> impl Iterator<Item = &LabeledObservation> {
        self.observations.iter().filter(|o| o.label.is_anomalous())
    }

    pub fn anomaly_count(&self) -> usize {
        self.anomalies().count()
    }

    pub fn delivery_failures(&self) -> impl Iterator<Item = &AlertEvent> {
        self.alerts.iter().filter(|a| !a.outcome.is_delivered())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PipelineOutcome {
    /// Too few observations to fit a model. Not an error.
    InsufficientData { observed: usize, required: usize },
    Completed { report: DetectionReport },
}

/// Result of the blocking half of a run: load, gate, extract, detect.
enum Labelling {
    Insufficient { observed: usize, required: usize },
    Labelled {
        observations: Vec<LabeledObservation>,
        threshold: f64,
    },
}

fn label_snapshot(
    store: &dyn ObservationStore,
    detector: &AnomalyDetector,
    run_id: Uuid,
) -> Result<Labelling, PipelineError> {
    // Loading
    let records = store.read_all().map_err(|e| {
        warn!(%run_id, error = %e, "store read failed, aborting run");
        PipelineError::StoreRead(e)
    })?;
    debug!(%run_id, observations = records.len(), "store loaded");

    let required = detector.min_observations();
    if records.len() < required {
        info!(%run_id, observed = records.len(), required, "not enough data for anomaly detection");
        return Ok(Labelling::Insufficient {
            observed: records.len(),
            required,
        });
    }

    // Extracting
    let features = extract_features(&records).map_err(|e| {
        warn!(%run_id, error = %e, "schema error, aborting run");
        PipelineError::Schema(e)
    })?;

    // Detecting
    let detection = detector.detect(&features)?;

    let observations = records
        .into_iter()
        .zip(features)
        .zip(detection.scores.iter().zip(&detection.labels))
        .enumerate()
        .map(|(index, ((record, features), (&score, &label)))| LabeledObservation {
            index,
            record,
            features,
            score,
            label,
        })
        .collect();
    Ok(Labelling::Labelled {
        observations,
        threshold: detection.threshold,
    })
}

/// Store → features → detector → alerts, run on demand.
pub struct PulsePipeline {
    store: Arc<dyn ObservationStore>,
    detector: Arc<AnomalyDetector>,
    alerts: AlertDispatcher,
}

impl PulsePipeline {
    pub fn new(
        store: Arc<dyn ObservationStore>,
        detector: AnomalyDetector,
        alerts: AlertDispatcher,
    ) -> Self {
        Self {
            store,
            detector: Arc::new(detector),
            alerts,
        }
    }

    /// Wire a pipeline from configuration, with an explicit dispatcher so
    /// callers (and tests) choose the notification sink.
    pub fn from_config(
        store: Arc<dyn ObservationStore>,
        config: &PulseConfig,
        dispatcher: Dispatcher,
    ) -> Result<Self, PipelineError> {
        let detector = AnomalyDetector::new(&config.detection)?;
        let composer = AlertComposer::new(&config.alerting)?;
        Ok(Self::new(
            store,
            detector,
            AlertDispatcher::new(composer, dispatcher),
        ))
    }

    pub fn min_observations(&self) -> usize {
        self.detector.min_observations()
    }

    /// Name of the channel alerts go out on ("none" when disabled).
    pub fn channel_name(&self) -> &str {
        self.alerts.channel_name()
    }

    /// Run one detection cycle.
    ///
    /// The store read and the forest fit run on the blocking pool; only
    /// alert delivery stays on the async runtime.
    pub async fn run(&self) -> Result<PipelineOutcome, PipelineError> {
        let run_id = Uuid::new_v4();
        let start = Instant::now();

        let store = Arc::clone(&self.store);
        let detector = Arc::clone(&self.detector);
        let labelling = tokio::task::spawn_blocking(move || {
            label_snapshot(store.as_ref(), &detector, run_id)
        })
        .await??;

        let (observations, threshold) = match labelling {
            Labelling::Insufficient { observed, required } => {
                return Ok(PipelineOutcome::InsufficientData { observed, required });
            }
            Labelling::Labelled {
                observations,
                threshold,
            } => (observations, threshold),
        };

        // Dispatching
        let mut alerts = Vec::new();
        for obs in observations.iter().filter(|o| o.label.is_anomalous()) {
            let event = self
                .alerts
                .alert(run_id, obs.index, &obs.record, &obs.features, obs.score)
                .await;
            alerts.push(event);
        }

        let report = DetectionReport {
            run_id,
            threshold,
            observations,
            alerts,
        };
        info!(
            %run_id,
            observations = report.observations.len(),
            anomalies = report.anomaly_count(),
            delivery_failures = report.delivery_failures().count(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "detection run complete"
        );
        Ok(PipelineOutcome::Completed { report })
    }
}
