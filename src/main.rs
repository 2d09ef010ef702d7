use std::path::PathBuf;

use anyhow::Context;

use ragserver::config::AppConfig;
use ragserver::logging;
use ragserver::server;
use ragserver::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = AppConfig::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    logging::init(&config.paths);

    let state = AppState::initialize(config)
        .await
        .context("initializing application state")?;

    server::serve(state).await.context("running server")?;

    Ok(())
}
