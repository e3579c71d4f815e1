//! Well-known ports and tuning constants shared by the naming service and
//! storage nodes.

/// Naming service port for client operations.
pub const SERVICE_PORT: u16 = 6000;

/// Naming service port for storage-node registration.
pub const REGISTRATION_PORT: u16 = 6001;

/// Address servers bind when none is configured.
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1";

/// Bytes moved per read/write round trip when a storage node copies a file.
pub const COPY_CHUNK_SIZE: u32 = 1024 * 1024;

/// Replicas wanted per 100 shared locks on a file.
pub const REPLICATION_PERCENT: u64 = 5;

/// Largest RPC frame accepted on either side.
pub const MAX_FRAME_LEN: usize = dfs_rpc::MAX_FRAME_LEN;

/// Longest single `read` a storage node serves: a frame, less room for the
/// response envelope around the data.
pub const MAX_READ_LEN: u32 = (MAX_FRAME_LEN - 4096) as u32;
