//! Headless playlist sync daemon.
//!
//! Reads configuration from `PLAYLIST_SYNC_*` environment variables, runs the
//! analysis and executor loops and exits cleanly on Ctrl-C.

use anyhow::Context;
use core_runtime::logging::init_logging;
use core_runtime::EngineConfig;
use core_service::SyncService;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = EngineConfig::from_env().context("invalid configuration")?;
    init_logging(config.logging.clone()).context("failed to initialize logging")?;

    let service = SyncService::bootstrap(config)
        .await
        .context("failed to start sync service")?;

    service
        .run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %err, "Failed to listen for Ctrl-C");
            }
        })
        .await?;

    info!("Stopped");
    Ok(())
}
