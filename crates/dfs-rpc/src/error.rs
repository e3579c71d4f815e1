//! Transport error types.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

/// Remote-failure outcome of an RPC call, plus listener-level failures.
///
/// Serializable so a server can report a transport fault back to the caller,
/// and cloneable so one listener failure can be handed to both the stop hook
/// and anyone waiting on the server.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum RpcError {
    /// The stub could not open a connection.
    #[error("cannot connect to {addr}: {reason}")]
    Connect { addr: String, reason: String },

    /// The stream closed before a full frame arrived.
    #[error("connection closed mid-call")]
    Closed,

    /// Any other stream-level I/O failure.
    #[error("transport I/O error: {0}")]
    Io(String),

    /// A frame could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// The server has no operation with this name and argument types.
    #[error("{interface} has no operation {operation}({args})")]
    UnknownOperation {
        interface: String,
        operation: String,
        args: String,
    },

    /// The request was meant for a different interface than the server speaks.
    #[error("request for {requested} reached a {served} server")]
    InterfaceMismatch { requested: String, served: String },

    /// The interface descriptor is unusable as a remote interface.
    #[error("malformed remote interface {interface}: {reason}")]
    Structural { interface: String, reason: String },

    /// `start` was called on a server whose listener is still running.
    #[error("server already running on {0}")]
    AlreadyRunning(String),

    /// The listening socket could not be bound.
    #[error("cannot bind {addr}: {reason}")]
    Bind { addr: String, reason: String },

    /// A stub was requested for a server that has no address yet.
    #[error("server has no address yet; start it or give it a fixed address")]
    NotBound,

    /// A hostname given for a stub did not resolve.
    #[error("cannot resolve {host}: {reason}")]
    Resolve { host: String, reason: String },

    /// The accept loop itself failed and the server stopped.
    #[error("listener failed: {0}")]
    Listener(String),
}

impl RpcError {
    /// Create a Codec error.
    pub fn codec(msg: impl std::fmt::Display) -> Self {
        Self::Codec(msg.to_string())
    }

    /// Create a Structural error for an interface.
    pub fn structural(interface: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Structural {
            interface: interface.into(),
            reason: reason.into(),
        }
    }
}

impl From<io::Error> for RpcError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::BrokenPipe => RpcError::Closed,
            _ => RpcError::Io(e.to_string()),
        }
    }
}

impl From<postcard::Error> for RpcError {
    fn from(e: postcard::Error) -> Self {
        RpcError::Codec(e.to_string())
    }
}

/// Error type of a remote interface.
///
/// Every remote operation must be able to fail with a transport error, so an
/// interface's error type has to absorb [`RpcError`] and survive the wire.
pub trait RemoteFailure: From<RpcError> + Serialize + DeserializeOwned + Send + 'static {}

impl<T> RemoteFailure for T where T: From<RpcError> + Serialize + DeserializeOwned + Send + 'static {}

/// Transport result type.
pub type RpcResult<T> = Result<T, RpcError>;
