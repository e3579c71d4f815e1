//! dfs storage node.
//!
//! A storage node keeps file bytes under a local directory and serves them
//! on two listeners: the data plane ([`dfs_types::Storage`]) for clients and
//! the control plane ([`dfs_types::Command`]) for the naming service. At
//! startup it registers every local file with the naming service and drops
//! the ones some other node already owns.

pub mod config;
pub mod node;
pub mod store;

pub use config::StorageConfig;
pub use node::StorageNode;
pub use store::LocalStore;
