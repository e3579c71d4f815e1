//! Naming service configuration.

use std::net::{IpAddr, SocketAddr};

use clap::Parser;

use dfs_types::constants::{DEFAULT_BIND_ADDRESS, REGISTRATION_PORT, SERVICE_PORT};

/// dfs naming service.
#[derive(Parser, Debug, Clone)]
#[command(name = "dfs-naming")]
#[command(about = "Run the dfs naming service")]
pub struct NamingConfig {
    /// Local address to listen on
    #[arg(long, env = "DFS_BIND", default_value = DEFAULT_BIND_ADDRESS)]
    pub bind: IpAddr,

    /// Client service port
    #[arg(long, env = "DFS_SERVICE_PORT", default_value_t = SERVICE_PORT)]
    pub service_port: u16,

    /// Storage node registration port
    #[arg(long, env = "DFS_REGISTRATION_PORT", default_value_t = REGISTRATION_PORT)]
    pub registration_port: u16,
}

impl NamingConfig {
    pub fn service_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.service_port)
    }

    pub fn registration_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.registration_port)
    }
}
