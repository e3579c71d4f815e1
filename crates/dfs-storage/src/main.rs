//! dfs storage node binary.
//!
//! ```bash
//! dfs-storage --root /srv/dfs --naming-host naming.local --hostname node1.local
//! ```

use anyhow::{Context, Result};
use clap::Parser;

use dfs_storage::{StorageConfig, StorageNode};

#[tokio::main]
async fn main() -> Result<()> {
    let _telemetry = dfs_telemetry::init_tracing("dfs-storage");
    let config = StorageConfig::parse();

    let node = StorageNode::new(
        &config.root,
        Some(config.storage_addr()),
        Some(config.command_addr()),
    )
    .context("creating storage node")?;
    node.on_stopped(|cause| match cause {
        Some(e) => tracing::error!("storage node listeners failed: {e}"),
        None => tracing::info!("storage node listeners stopped"),
    });

    let naming = config
        .registration_stub()
        .await
        .context("resolving naming service")?;
    node.start(&config.hostname, &naming)
        .await
        .with_context(|| format!("starting storage node on {}", config.root.display()))?;

    tracing::info!(
        storage = ?node.storage_stub().map(|s| s.address()),
        command = ?node.command_stub().map(|c| c.address()),
        "dfs-storage ready"
    );

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    tracing::info!("dfs-storage shutting down");
    node.stop().await;
    Ok(())
}
