//! File-system error taxonomy.

use std::io;

use dfs_rpc::RpcError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned by every naming and storage operation.
///
/// Crosses the wire unchanged: a failure raised inside a storage node is the
/// same value the naming service or client sees.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum FsError {
    /// Path does not resolve to the expected kind of node.
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed path text.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Argument rejected for this operation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A component that should be a directory is a file.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// Storage node offered a stub that is already on file.
    #[error("storage node already registered: {0}")]
    AlreadyRegistered(String),

    /// No storage node is available to hold a new file.
    #[error("no storage nodes are registered")]
    NoStorage,

    /// Offset or length outside the file.
    #[error("out of bounds: {0}")]
    OutOfBounds(String),

    /// Local I/O failure on a storage node.
    #[error("I/O error: {0}")]
    Io(String),

    /// Transport failure reaching a remote node.
    #[error(transparent)]
    Rpc(#[from] RpcError),
}

/// Coarse classification of an [`FsError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Structural,
    Bounds,
    Io,
    Remote,
}

impl FsError {
    /// Create a NotFound error.
    pub fn not_found(path: impl ToString) -> Self {
        Self::NotFound(path.to_string())
    }

    /// Create an InvalidPath error.
    pub fn invalid_path(msg: impl Into<String>) -> Self {
        Self::InvalidPath(msg.into())
    }

    /// Create an InvalidArgument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a NotADirectory error.
    pub fn not_a_directory(path: impl ToString) -> Self {
        Self::NotADirectory(path.to_string())
    }

    /// Create an OutOfBounds error.
    pub fn out_of_bounds(msg: impl Into<String>) -> Self {
        Self::OutOfBounds(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            FsError::NotFound(_) => ErrorKind::NotFound,
            FsError::InvalidPath(_)
            | FsError::InvalidArgument(_)
            | FsError::NotADirectory(_)
            | FsError::AlreadyRegistered(_)
            | FsError::NoStorage => ErrorKind::Structural,
            FsError::OutOfBounds(_) => ErrorKind::Bounds,
            FsError::Io(_) => ErrorKind::Io,
            FsError::Rpc(_) => ErrorKind::Remote,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

impl From<io::Error> for FsError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => FsError::NotFound(e.to_string()),
            _ => FsError::Io(e.to_string()),
        }
    }
}

/// Result type for file-system operations.
pub type FsResult<T> = Result<T, FsError>;
