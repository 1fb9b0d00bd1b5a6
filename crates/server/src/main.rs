mod api;
mod cli;
mod router;
mod state;

use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};
use state::AppState;

fn load_config() -> pulse_core::PulseConfig {
    pulse_core::config::load_dotenv();
    pulse_core::PulseConfig::from_env()
}

async fn serve(config: pulse_core::PulseConfig) -> anyhow::Result<()> {
    config.log_summary();
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let port = config.server.port;

    let state = Arc::new(AppState::from_config(config)?);
    let app = router::build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://localhost:{}", port);
    axum::serve(listener, app).await?;

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_level(true)
        .init();

    let args = Cli::parse();
    let mut config = load_config();
    args.apply_overrides(&mut config);

    match args.command {
        Command::Serve => serve(config).await,
        Command::Detect => cli::detect(config).await,
    }
}
