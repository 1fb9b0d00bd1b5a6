//! Turns anomalous observations into alert notifications and delivers them.
//!
//! One delivery attempt per anomaly, no retry, no deduplication: a row that
//! stays anomalous is alerted again on every run.

use std::collections::HashMap;

use pulse_core::config::AlertConfig;
use pulse_core::PulseRecord;
use pulse_notify::{AlertContext, Dispatcher, Notification, NotifyError, TemplateRenderer};
use serde::Serialize;
use uuid::Uuid;

use super::features::FeatureVector;

/// What happened to one delivery attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Delivered,
    Failed { reason: String },
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered)
    }
}

/// One alert produced during a run. Not persisted.
#[derive(Debug, Clone, Serialize)]
pub struct AlertEvent {
    /// Row index of the anomalous observation in the run's store snapshot.
    pub observation_index: usize,
    pub subject: String,
    pub body: String,
    pub channel: String,
    pub outcome: DeliveryOutcome,
    pub duration_ms: u64,
}

/// Renders subject and body from the configured templates.
#[derive(Debug)]
pub struct AlertComposer {
    renderer: TemplateRenderer,
    subject_template: String,
    body_template: String,
    recipient: String,
}

impl AlertComposer {
    /// Fails if either template does not parse.
    pub fn new(config: &AlertConfig) -> Result<Self, NotifyError> {
        let renderer = TemplateRenderer::new();
        renderer.validate(&config.subject_template)?;
        renderer.validate(&config.body_template)?;
        Ok(Self {
            renderer,
            subject_template: config.subject_template.clone(),
            body_template: config.body_template.clone(),
            recipient: config.recipient.clone(),
        })
    }

    pub fn compose(
        &self,
        record: &PulseRecord,
        features: &FeatureVector,
        score: f64,
    ) -> Result<Notification, NotifyError> {
        let ctx = AlertContext {
            region: record.region.clone(),
            sector: record.sector.clone(),
            crowd_index: features.crowd_index as u8,
            queue_time: features.queue_time,
            visitor_count: features.visitor_count as u64,
            timestamp: record.timestamp.clone(),
            score,
        };
        Ok(Notification {
            subject: self.renderer.render(&self.subject_template, &ctx)?,
            body: self.renderer.render(&self.body_template, &ctx)?,
            recipient: self.recipient.clone(),
            metadata: HashMap::new(),
        })
    }
}

/// Composes and sends one alert per anomalous observation.
pub struct AlertDispatcher {
    composer: AlertComposer,
    dispatcher: Dispatcher,
}

impl AlertDispatcher {
    pub fn new(composer: AlertComposer, dispatcher: Dispatcher) -> Self {
        Self {
            composer,
            dispatcher,
        }
    }

    pub fn channel_name(&self) -> &str {
        self.dispatcher.channel_name()
    }

    /// Attempt delivery of one alert. Never fails; the outcome is in the event.
    pub async fn alert(
        &self,
        run_id: Uuid,
        index: usize,
        record: &PulseRecord,
        features: &FeatureVector,
        score: f64,
    ) -> AlertEvent {
        let mut notification = match self.composer.compose(record, features, score) {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(%run_id, observation_index = index, error = %e, "alert rendering failed");
                return AlertEvent {
                    observation_index: index,
                    subject: String::new(),
                    body: String::new(),
                    channel: self.dispatcher.channel_name().to_string(),
                    outcome: DeliveryOutcome::Failed {
                        reason: e.to_string(),
                    },
                    duration_ms: 0,
                };
            }
        };
        notification
            .metadata
            .insert("run_id".to_string(), run_id.to_string());
        notification
            .metadata
            .insert("observation_index".to_string(), index.to_string());

        let result = self.dispatcher.dispatch(&notification).await;
        AlertEvent {
            observation_index: index,
            subject: notification.subject,
            body: notification.body,
            channel: result.channel,
            outcome: match result.error {
                None if result.success => DeliveryOutcome::Delivered,
                error => DeliveryOutcome::Failed {
                    reason: error.unwrap_or_else(|| "unknown delivery failure".to_string()),
                },
            },
            duration_ms: result.duration_ms,
        }
    }
}
