use std::sync::Arc;

use pulse_compute::PulsePipeline;
use pulse_core::PulseConfig;
use pulse_notify::Dispatcher;
use pulse_store::{CsvObservationStore, ObservationStore};

pub struct AppState {
    pub config: PulseConfig,
    pub store: Arc<dyn ObservationStore>,
    pub pipeline: PulsePipeline,
}

impl AppState {
    pub fn new(
        config: PulseConfig,
        store: Arc<dyn ObservationStore>,
        dispatcher: Dispatcher,
    ) -> anyhow::Result<Self> {
        let pipeline = PulsePipeline::from_config(store.clone(), &config, dispatcher)?;
        Ok(Self {
            config,
            store,
            pipeline,
        })
    }

    /// CSV-backed store and email (or disabled) alerting, as configured.
    pub fn from_config(config: PulseConfig) -> anyhow::Result<Self> {
        let store: Arc<dyn ObservationStore> =
            Arc::new(CsvObservationStore::new(config.storage.data_file.clone()));
        let dispatcher = Dispatcher::from_config(&config.alerting)?;
        Self::new(config, store, dispatcher)
    }
}
