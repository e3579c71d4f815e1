//! Client stubs.
//!
//! A [`Stub`] is a serializable reference to a remote server of interface
//! `I`: just an address and the interface name. It can be passed as an
//! argument or returned from a call, and whoever receives it can call the
//! server it points at.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::net::SocketAddr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::net::{TcpStream, lookup_host};

use crate::error::{RpcError, RpcResult};
use crate::interface::{Interface, Operation};
use crate::server::{Dispatch, RpcServer};
use crate::wire::{self, Request, Response};

#[derive(Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Stub<I> {
    address: SocketAddr,
    interface: String,
    #[serde(skip)]
    marker: PhantomData<fn() -> I>,
}

impl<I: Interface> Stub<I> {
    /// Stub for a server of interface `I` at a known address.
    pub fn new(address: SocketAddr) -> Self {
        Self {
            address,
            interface: I::NAME.to_string(),
            marker: PhantomData,
        }
    }

    /// Stub for a local server, using the address it is bound to.
    pub fn for_server<D>(server: &RpcServer<D>) -> RpcResult<Self>
    where
        D: Dispatch<Interface = I>,
    {
        server.local_addr().map(Self::new).ok_or(RpcError::NotBound)
    }

    /// Stub for a local server as reached through `host`.
    ///
    /// The port is the server's; only the host part changes. This is how a
    /// server bound to a wildcard address hands out something remote peers
    /// can actually connect to.
    pub async fn for_server_at<D>(server: &RpcServer<D>, host: &str) -> RpcResult<Self>
    where
        D: Dispatch<Interface = I>,
    {
        let port = server.local_addr().ok_or(RpcError::NotBound)?.port();
        let resolve_err = |reason: String| RpcError::Resolve {
            host: host.to_string(),
            reason,
        };
        let address = lookup_host((host, port))
            .await
            .map_err(|e| resolve_err(e.to_string()))?
            .next()
            .ok_or_else(|| resolve_err("no addresses".to_string()))?;
        Ok(Self::new(address))
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn port(&self) -> u16 {
        self.address.port()
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Call `operation` with an argument tuple.
    ///
    /// Opens a fresh connection, sends the request, and waits for the single
    /// response. An application failure comes back as the interface's error;
    /// anything that goes wrong in transit comes back as that error's
    /// [`RpcError`] conversion.
    pub async fn call<A, R>(&self, operation: &'static Operation, args: &A) -> Result<R, I::Error>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        match self.exchange(operation, args).await? {
            Response::Return(bytes) => Ok(wire::decode(&bytes)?),
            Response::Failure(bytes) => Err(wire::decode::<I::Error>(&bytes)?),
            Response::Fault(fault) => Err(fault.into()),
        }
    }

    async fn exchange<A>(&self, operation: &'static Operation, args: &A) -> RpcResult<Response>
    where
        A: Serialize + ?Sized,
    {
        let (traceparent, tracestate) = dfs_telemetry::inject_trace_context();
        let request = Request {
            interface: self.interface.clone(),
            operation: operation.name.to_string(),
            arg_types: operation.arg_types.iter().map(|t| t.to_string()).collect(),
            args: wire::encode(args)?,
            traceparent,
            tracestate,
        };

        let mut stream = TcpStream::connect(self.address)
            .await
            .map_err(|e| RpcError::Connect {
                addr: self.address.to_string(),
                reason: e.to_string(),
            })?;
        wire::write_frame(&mut stream, &request).await?;
        wire::read_frame(&mut stream).await
    }
}

impl<I> Clone for Stub<I> {
    fn clone(&self) -> Self {
        Self {
            address: self.address,
            interface: self.interface.clone(),
            marker: PhantomData,
        }
    }
}

impl<I> PartialEq for Stub<I> {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address && self.interface == other.interface
    }
}

impl<I> Eq for Stub<I> {}

// Equal stubs share a port, so hashing the port alone stays consistent with Eq.
impl<I> Hash for Stub<I> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address.port().hash(state);
    }
}

impl<I> fmt::Debug for Stub<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stub")
            .field("interface", &self.interface)
            .field("address", &self.address)
            .finish()
    }
}

impl<I> fmt::Display for Stub<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} stub on port {}", self.interface, self.address.port())
    }
}
