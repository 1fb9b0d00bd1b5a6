//! CLI argument parsing and the one-shot `detect` subcommand.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use pulse_core::PulseConfig;
use tracing::info;

use crate::state::AppState;

/// Pulse observation intake and anomaly alerting.
#[derive(Parser, Debug)]
#[command(name = "pulse-server", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Observation CSV file (overrides PULSE_DATA_FILE).
    #[arg(long, global = true)]
    pub data_file: Option<PathBuf>,

    /// Fixed forest seed for reproducible labels (overrides ANOMALY_SEED).
    #[arg(long, global = true)]
    pub seed: Option<u64>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Start the HTTP server.
    Serve,
    /// Run one detection pass and print the outcome as JSON.
    Detect,
}

impl Cli {
    pub fn apply_overrides(&self, config: &mut PulseConfig) {
        if let Some(path) = &self.data_file {
            config.storage.data_file = path.clone();
        }
        if let Some(seed) = self.seed {
            config.detection.random_seed = Some(seed);
        }
    }
}

/// Run the pipeline once against the configured store.
pub async fn detect(config: PulseConfig) -> anyhow::Result<()> {
    info!(data_file = %config.storage.data_file.display(), "running one detection pass");
    let state = AppState::from_config(config)?;
    let outcome = state.pipeline.run().await?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}
