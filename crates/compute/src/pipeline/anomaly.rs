//! Batch anomaly labelling over the full feature set.
//!
//! Every call refits an isolation forest on the batch it is given and
//! scores that same batch. Nothing is carried between calls, so a row's
//! label can change as the store grows.

use pulse_core::config::DetectionConfig;
use serde::Serialize;
use tracing::debug;

use crate::algorithms::isolation_forest::{ForestError, ForestParams, IsolationForest};

use super::features::FeatureVector;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalyLabel {
    Normal,
    Anomalous,
}

impl AnomalyLabel {
    pub fn is_anomalous(&self) -> bool {
        matches!(self, AnomalyLabel::Anomalous)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DetectorError {
    #[error("{observed} observations is below the minimum of {required}")]
    TooFewObservations { observed: usize, required: usize },

    #[error(transparent)]
    Forest(#[from] ForestError),
}

/// Labels and scores for one batch, index-aligned with the input.
#[derive(Debug, Clone)]
pub struct Detection {
    pub labels: Vec<AnomalyLabel>,
    pub scores: Vec<f64>,
    pub threshold: f64,
}

impl Detection {
    pub fn anomaly_count(&self) -> usize {
        self.labels.iter().filter(|l| l.is_anomalous()).count()
    }
}

/// Isolation-forest detector configured once, fitted fresh per batch.
#[derive(Debug, Clone)]
pub struct AnomalyDetector {
    params: ForestParams,
    min_observations: usize,
}

impl AnomalyDetector {
    /// Validate the configuration up front so a bad constant fails at
    /// construction rather than on the first request.
    pub fn new(config: &DetectionConfig) -> Result<Self, DetectorError> {
        let params = ForestParams {
            n_estimators: config.n_estimators,
            max_samples: config.max_samples,
            contamination: config.contamination,
            seed: config.random_seed,
        };
        params.validate()?;
        Ok(Self {
            params,
            // The forest itself cannot work with fewer than two points.
            min_observations: config.min_observations.max(2),
        })
    }

    pub fn min_observations(&self) -> usize {
        self.min_observations
    }

    pub fn detect(&self, features: &[FeatureVector]) -> Result<Detection, DetectorError> {
        if features.len() < self.min_observations {
            return Err(DetectorError::TooFewObservations {
                observed: features.len(),
                required: self.min_observations,
            });
        }

        let points: Vec<Vec<f64>> = features.iter().map(FeatureVector::to_vec).collect();
        let forest = IsolationForest::fit(&points, &self.params)?;
        let scores = forest.score_all(&points);
        let labels: Vec<AnomalyLabel> = scores
            .iter()
            .map(|&s| {
                if forest.is_anomalous(s) {
                    AnomalyLabel::Anomalous
                } else {
                    AnomalyLabel::Normal
                }
            })
            .collect();

        let detection = Detection {
            labels,
            scores,
            threshold: forest.threshold(),
        };
        debug!(
            observations = features.len(),
            anomalies = detection.anomaly_count(),
            threshold = detection.threshold,
            "isolation forest fitted"
        );
        Ok(detection)
    }
}
