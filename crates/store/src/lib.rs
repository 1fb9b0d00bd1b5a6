//! Append-only observation store and read-only reporting views.
//!
//! The store is the only durable state in the system. Detection runs read
//! it in full and never write back.

pub mod csv_store;
pub mod error;
pub mod memory;
pub mod views;

use pulse_core::{Observation, PulseRecord};

pub use csv_store::CsvObservationStore;
pub use error::StoreError;
pub use memory::MemoryObservationStore;

/// Durable, append-only collection of pulse observations.
///
/// Implementations must keep a concurrent `append` and `read_all` from
/// corrupting each other: a reader sees either the complete row or none of it.
pub trait ObservationStore: Send + Sync {
    /// Append one observation. Existing rows are never touched.
    fn append(&self, observation: &Observation) -> Result<(), StoreError>;

    /// Snapshot every stored row in insertion order.
    fn read_all(&self) -> Result<Vec<PulseRecord>, StoreError>;
}
