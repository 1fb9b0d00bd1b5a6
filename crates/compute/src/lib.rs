pub mod algorithms;
pub mod pipeline;

pub use algorithms::isolation_forest::{ForestError, ForestParams, IsolationForest};
pub use pipeline::alerts::{AlertComposer, AlertDispatcher, AlertEvent, DeliveryOutcome};
pub use pipeline::anomaly::{AnomalyDetector, AnomalyLabel, Detection, DetectorError};
pub use pipeline::features::{extract_features, FeatureVector};
pub use pipeline::{
    DetectionReport, LabeledObservation, PipelineError, PipelineOutcome, PulsePipeline,
};
