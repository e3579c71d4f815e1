//! Connection-per-call RPC for dfs.
//!
//! A remote interface is declared once as a marker type implementing
//! [`Interface`]: a name, a table of [`Operation`]s, and an error type that
//! can carry [`RpcError`]. The serving side implements [`Dispatch`] for it
//! and hands that to an [`RpcServer`]; callers hold a [`Stub`] and invoke
//! operations with [`Stub::call`].
//!
//! ```text
//! Stub::call ──connect──► RpcServer accept loop
//!            ──Request──►   └─ task per connection ─► Dispatch::dispatch
//!            ◄─Response──                               (Return/Failure/Fault)
//!            ◄──close────
//! ```
//!
//! Every call opens its own TCP connection and carries exactly one request
//! and one response, each a length-prefixed postcard frame (see [`wire`]).

pub mod error;
pub mod interface;
pub mod server;
pub mod stub;
pub mod wire;

pub use error::{RemoteFailure, RpcError, RpcResult};
pub use interface::{Interface, Operation, validate};
pub use server::{Call, DEFAULT_BIND_HOST, Dispatch, RpcServer, StopGroup, StopHook};
pub use stub::Stub;
pub use wire::{MAX_FRAME_LEN, Response};
