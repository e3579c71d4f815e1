//! dfs naming service.
//!
//! The naming service owns the directory tree. It maps every file to the
//! storage node holding it, serializes access through per-path reader/writer
//! locks, and replicates files that are read often.
//!
//! ```text
//!  clients ──Service──▶ NamingServer ◀──Registration── storage nodes
//!                           │
//!                           └──Command──▶ storage nodes (create, delete, copy)
//! ```
//!
//! Locking is hierarchical: locking `/a/b/c` takes shared locks on `/`,
//! `/a` and `/a/b` first, in that order. Each path's queue is first come,
//! first served, with consecutive shared requests granted together.

pub mod config;
pub mod lock;
pub mod replication;
pub mod server;
pub mod service;
pub mod tree;

pub use config::NamingConfig;
pub use server::NamingServer;
pub use service::NamingService;
pub use tree::NodeHandle;
