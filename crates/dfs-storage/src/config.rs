//! Storage node configuration.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;
use tokio::net::lookup_host;

use dfs_rpc::RpcError;
use dfs_types::constants::{DEFAULT_BIND_ADDRESS, REGISTRATION_PORT};
use dfs_types::{FsResult, RegistrationStub};

/// dfs storage node.
#[derive(Parser, Debug, Clone)]
#[command(name = "dfs-storage")]
#[command(about = "Serve a local directory as a dfs storage node")]
pub struct StorageConfig {
    /// Local directory holding this node's files
    #[arg(long, env = "DFS_STORAGE_ROOT")]
    pub root: PathBuf,

    /// Host running the naming service
    #[arg(long, env = "DFS_NAMING_HOST", default_value = DEFAULT_BIND_ADDRESS)]
    pub naming_host: String,

    /// Naming service registration port
    #[arg(long, env = "DFS_REGISTRATION_PORT", default_value_t = REGISTRATION_PORT)]
    pub registration_port: u16,

    /// Name other processes use to reach this node
    #[arg(long, env = "DFS_HOSTNAME", default_value = DEFAULT_BIND_ADDRESS)]
    pub hostname: String,

    /// Local address to listen on
    #[arg(long, env = "DFS_BIND", default_value = DEFAULT_BIND_ADDRESS)]
    pub bind: IpAddr,

    /// Data-plane port (0 picks a free one)
    #[arg(long, env = "DFS_STORAGE_PORT", default_value_t = 0)]
    pub storage_port: u16,

    /// Control-plane port (0 picks a free one)
    #[arg(long, env = "DFS_COMMAND_PORT", default_value_t = 0)]
    pub command_port: u16,
}

impl StorageConfig {
    pub fn storage_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.storage_port)
    }

    pub fn command_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.command_port)
    }

    /// Stub for the naming service's registration listener.
    pub async fn registration_stub(&self) -> FsResult<RegistrationStub> {
        let host = self.naming_host.as_str();
        let resolve_err = |reason: String| RpcError::Resolve {
            host: host.to_string(),
            reason,
        };
        let addr = lookup_host((host, self.registration_port))
            .await
            .map_err(|e| resolve_err(e.to_string()))?
            .next()
            .ok_or_else(|| resolve_err("no addresses".to_string()))?;
        Ok(RegistrationStub::new(addr))
    }
}
