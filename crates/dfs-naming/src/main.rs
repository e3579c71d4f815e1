//! dfs naming service binary.
//!
//! ```bash
//! dfs-naming --bind 0.0.0.0
//! ```

use anyhow::{Context, Result};
use clap::Parser;

use dfs_naming::{NamingConfig, NamingServer};

#[tokio::main]
async fn main() -> Result<()> {
    let _telemetry = dfs_telemetry::init_tracing("dfs-naming");
    let config = NamingConfig::parse();

    let server = NamingServer::from_config(&config).context("creating naming server")?;
    server.on_stopped(|cause| match cause {
        Some(e) => tracing::error!("naming server listeners failed: {e}"),
        None => tracing::info!("naming server listeners stopped"),
    });
    server.start().await.with_context(|| {
        format!(
            "binding {} and {}",
            config.service_addr(),
            config.registration_addr()
        )
    })?;
    tracing::info!(
        service = %config.service_addr(),
        registration = %config.registration_addr(),
        "dfs-naming ready"
    );

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    tracing::info!("dfs-naming shutting down");
    server.stop().await;
    Ok(())
}
