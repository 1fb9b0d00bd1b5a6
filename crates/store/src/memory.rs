use std::sync::RwLock;

use pulse_core::{Observation, PulseRecord};

use crate::{ObservationStore, StoreError};

/// In-process store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryObservationStore {
    rows: RwLock<Vec<PulseRecord>>,
}

impl MemoryObservationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with raw rows, including ones intake would have rejected.
    pub fn from_records(records: Vec<PulseRecord>) -> Self {
        Self {
            rows: RwLock::new(records),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ObservationStore for MemoryObservationStore {
    fn append(&self, observation: &Observation) -> Result<(), StoreError> {
        self.rows
            .write()
            .map_err(|_| StoreError::Poisoned)?
            .push(observation.to_record());
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<PulseRecord>, StoreError> {
        Ok(self.rows.read().map_err(|_| StoreError::Poisoned)?.clone())
    }
}
