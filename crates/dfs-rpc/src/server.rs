//! RPC server (skeleton side).
//!
//! An [`RpcServer`] owns a TCP listener and a [`Dispatch`] implementation.
//! Each accepted connection carries exactly one request; it is served on its
//! own task, answered, and closed. The listener can be stopped and started
//! again, and reports its exit through an optional stop hook.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, warn};

use crate::error::{RpcError, RpcResult};
use crate::interface::{Interface, Operation, validate};
use crate::wire::{self, Request, Response};

/// Host a server binds to when it is not given an explicit address.
pub const DEFAULT_BIND_HOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Pause before accepting again after running out of file descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// A decoded call, handed to the dispatcher after the server has matched it
/// against the interface table.
#[derive(Debug)]
pub struct Call {
    operation: &'static Operation,
    args: Vec<u8>,
}

impl Call {
    pub fn new(operation: &'static Operation, args: Vec<u8>) -> Self {
        Self { operation, args }
    }

    pub fn operation(&self) -> &'static Operation {
        self.operation
    }

    pub fn name(&self) -> &'static str {
        self.operation.name
    }

    /// Decode the argument tuple.
    pub fn args<T: DeserializeOwned>(&self) -> RpcResult<T> {
        wire::decode(&self.args)
    }

    /// Error for a call the dispatcher has no arm for.
    pub fn unknown(&self, interface: &str) -> RpcError {
        RpcError::UnknownOperation {
            interface: interface.to_string(),
            operation: self.operation.name.to_string(),
            args: self.operation.arg_types.join(", "),
        }
    }
}

/// Routes calls on one interface to a local implementation.
#[async_trait]
pub trait Dispatch: Send + Sync + 'static {
    type Interface: Interface;

    /// Run one call. `Err` becomes a transport fault; an application failure
    /// belongs inside the returned [`Response`].
    async fn dispatch(&self, call: Call) -> RpcResult<Response>;
}

/// Callback run once each time a listener exits: `None` after a requested
/// stop, the failure otherwise.
pub type StopHook = Arc<dyn Fn(Option<&RpcError>) + Send + Sync>;

struct Listener {
    cancel: CancellationToken,
    done: watch::Receiver<bool>,
}

#[derive(Default)]
struct ServerState {
    address: Option<SocketAddr>,
    listener: Option<Listener>,
    hook: Option<StopHook>,
}

/// Serves one interface over TCP.
pub struct RpcServer<D: Dispatch> {
    dispatcher: Arc<D>,
    state: Arc<Mutex<ServerState>>,
}

impl<D: Dispatch> RpcServer<D> {
    /// Create a stopped server.
    ///
    /// With no address the first [`start`](Self::start) binds an ephemeral
    /// port on [`DEFAULT_BIND_HOST`]; later restarts reuse whatever address
    /// was bound.
    pub fn new(dispatcher: D, address: Option<SocketAddr>) -> RpcResult<Self> {
        validate::<D::Interface>()?;
        Ok(Self {
            dispatcher: Arc::new(dispatcher),
            state: Arc::new(Mutex::new(ServerState {
                address,
                ..Default::default()
            })),
        })
    }

    pub fn dispatcher(&self) -> &Arc<D> {
        &self.dispatcher
    }

    /// Address the server is (or will be) bound to, once known.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.state.lock().address
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().listener.is_some()
    }

    /// Install the stop hook, replacing any previous one.
    pub fn on_stopped(&self, hook: impl Fn(Option<&RpcError>) + Send + Sync + 'static) {
        self.state.lock().hook = Some(Arc::new(hook));
    }

    /// Bind and start accepting. Returns the bound address.
    pub async fn start(&self) -> RpcResult<SocketAddr> {
        let requested = {
            let state = self.state.lock();
            if state.listener.is_some() {
                return Err(already_running(state.address));
            }
            state
                .address
                .unwrap_or_else(|| SocketAddr::new(DEFAULT_BIND_HOST, 0))
        };

        let listener = TcpListener::bind(requested)
            .await
            .map_err(|e| RpcError::Bind {
                addr: requested.to_string(),
                reason: e.to_string(),
            })?;
        let bound = listener.local_addr()?;

        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(false);
        {
            let mut state = self.state.lock();
            // Lost a race with a concurrent start; our listener is dropped here.
            if state.listener.is_some() {
                return Err(already_running(state.address));
            }
            state.address = Some(bound);
            state.listener = Some(Listener {
                cancel: cancel.clone(),
                done: done_rx,
            });
        }

        info!(interface = D::Interface::NAME, %bound, "RPC server listening");
        tokio::spawn(accept_loop(
            listener,
            Arc::clone(&self.dispatcher),
            cancel,
            Arc::clone(&self.state),
            done_tx,
        ));
        Ok(bound)
    }

    /// Stop accepting and wait for the listener to exit. Calls already being
    /// served finish on their own. Does nothing on a stopped server.
    pub async fn stop(&self) {
        let done = {
            let state = self.state.lock();
            match &state.listener {
                Some(listener) => {
                    listener.cancel.cancel();
                    listener.done.clone()
                }
                None => return,
            }
        };
        wait_done(done).await;
    }

    /// Wait until the current listener exits, however that happens.
    pub async fn wait_stopped(&self) {
        let done = match &self.state.lock().listener {
            Some(listener) => listener.done.clone(),
            None => return,
        };
        wait_done(done).await;
    }
}

impl<D: Dispatch> Drop for RpcServer<D> {
    fn drop(&mut self) {
        if let Some(listener) = &self.state.lock().listener {
            listener.cancel.cancel();
        }
    }
}

fn already_running(address: Option<SocketAddr>) -> RpcError {
    RpcError::AlreadyRunning(address.map(|a| a.to_string()).unwrap_or_default())
}

async fn wait_done(mut done: watch::Receiver<bool>) {
    // An Err means the accept task is gone, which is as stopped as it gets.
    let _ = done.wait_for(|stopped| *stopped).await;
}

/// Source of incoming connections for the accept loop.
#[async_trait]
trait Incoming: Send + 'static {
    async fn accept(&mut self) -> io::Result<(TcpStream, SocketAddr)>;
}

#[async_trait]
impl Incoming for TcpListener {
    async fn accept(&mut self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }
}

/// How the accept loop treats a failed `accept`.
#[derive(Debug, PartialEq, Eq)]
enum AcceptFailure {
    /// One connection went wrong; the listener is fine.
    Connection,
    /// Out of descriptors or memory; worth retrying after a pause.
    Exhausted,
    /// The listener itself is broken.
    Fatal,
}

impl AcceptFailure {
    fn classify(e: &io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut => Self::Connection,
            io::ErrorKind::OutOfMemory => Self::Exhausted,
            _ if out_of_descriptors(e) => Self::Exhausted,
            _ => Self::Fatal,
        }
    }
}

#[cfg(unix)]
fn out_of_descriptors(e: &io::Error) -> bool {
    matches!(
        e.raw_os_error(),
        Some(libc::EMFILE | libc::ENFILE | libc::ENOBUFS | libc::ENOMEM)
    )
}

#[cfg(not(unix))]
fn out_of_descriptors(_e: &io::Error) -> bool {
    false
}

async fn accept_loop<L: Incoming, D: Dispatch>(
    mut listener: L,
    dispatcher: Arc<D>,
    cancel: CancellationToken,
    state: Arc<Mutex<ServerState>>,
    done: watch::Sender<bool>,
) {
    let outcome = loop {
        tokio::select! {
            _ = cancel.cancelled() => break None,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let dispatcher = Arc::clone(&dispatcher);
                    tokio::spawn(async move {
                        if let Err(e) = serve_connection(dispatcher.as_ref(), stream).await {
                            debug!(%peer, "RPC connection ended: {e}");
                        }
                    });
                }
                Err(e) => match AcceptFailure::classify(&e) {
                    AcceptFailure::Connection => {
                        warn!(interface = D::Interface::NAME, "accept error: {e}");
                    }
                    AcceptFailure::Exhausted => {
                        warn!(interface = D::Interface::NAME, "accept error, backing off: {e}");
                        tokio::select! {
                            _ = cancel.cancelled() => break None,
                            _ = tokio::time::sleep(ACCEPT_BACKOFF) => {}
                        }
                    }
                    AcceptFailure::Fatal => break Some(RpcError::Listener(e.to_string())),
                },
            },
        }
    };
    drop(listener);

    let hook = {
        let mut state = state.lock();
        state.listener = None;
        state.hook.clone()
    };

    match &outcome {
        None => info!(interface = D::Interface::NAME, "RPC server stopped"),
        Some(e) => warn!(interface = D::Interface::NAME, "RPC server stopped: {e}"),
    }
    if let Some(hook) = hook {
        hook(outcome.as_ref());
    }
    let _ = done.send(true);
}

async fn serve_connection<D: Dispatch>(dispatcher: &D, mut stream: TcpStream) -> RpcResult<()> {
    let response = match wire::read_frame::<_, Request>(&mut stream).await {
        Ok(request) => {
            let span = dfs_telemetry::serve_span(
                &request.interface,
                &request.operation,
                &request.traceparent,
                &request.tracestate,
            );
            respond(dispatcher, request).instrument(span).await
        }
        // The stream is intact, so the caller can still be told why.
        Err(e @ RpcError::Codec(_)) => Response::Fault(e),
        Err(e) => return Err(e),
    };

    match wire::write_frame(&mut stream, &response).await {
        // Nothing was written yet, so the caller can still get a fault.
        Err(e @ RpcError::Codec(_)) => {
            warn!("response not sent: {e}");
            wire::write_frame(&mut stream, &Response::Fault(e)).await?;
        }
        written => written?,
    }
    stream.shutdown().await?;
    Ok(())
}

async fn respond<D: Dispatch>(dispatcher: &D, request: Request) -> Response {
    let served = D::Interface::NAME;
    if request.interface != served {
        return Response::Fault(RpcError::InterfaceMismatch {
            requested: request.interface,
            served: served.to_string(),
        });
    }

    let Some(operation) = D::Interface::resolve(&request.operation, &request.arg_types) else {
        return Response::Fault(RpcError::UnknownOperation {
            interface: served.to_string(),
            operation: request.operation,
            args: request.arg_types.join(", "),
        });
    };

    match dispatcher.dispatch(Call::new(operation, request.args)).await {
        Ok(response) => response,
        Err(fault) => {
            debug!(operation = %operation.signature(), "call faulted: {fault}");
            Response::Fault(fault)
        }
    }
}

/// Joins the stop hooks of several servers that run as one unit.
///
/// The group's hook fires once all joined listeners have exited, with the
/// first failure any of them reported.
#[derive(Clone)]
pub struct StopGroup {
    inner: Arc<Mutex<GroupState>>,
}

struct GroupState {
    members: usize,
    exited: usize,
    cause: Option<RpcError>,
    hook: Option<StopHook>,
}

impl StopGroup {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(GroupState {
                members: 0,
                exited: 0,
                cause: None,
                hook: None,
            })),
        }
    }

    /// Add a server to the group. Replaces the server's own stop hook.
    pub fn join<D: Dispatch>(&self, server: &RpcServer<D>) {
        self.inner.lock().members += 1;
        let inner = Arc::clone(&self.inner);
        server.on_stopped(move |cause: Option<&RpcError>| {
            let fire = {
                let mut state = inner.lock();
                state.exited += 1;
                if state.cause.is_none() {
                    state.cause = cause.cloned();
                }
                if state.exited < state.members {
                    return;
                }
                state.exited = 0;
                (state.hook.clone(), state.cause.take())
            };
            if let (Some(hook), cause) = fire {
                hook(cause.as_ref());
            }
        });
    }

    pub fn on_stopped(&self, hook: impl Fn(Option<&RpcError>) + Send + Sync + 'static) {
        self.inner.lock().hook = Some(Arc::new(hook));
    }

    /// Forget exits seen so far, for when only part of the group started.
    pub fn reset(&self) {
        let mut state = self.inner.lock();
        state.exited = 0;
        state.cause = None;
    }
}

impl Default for StopGroup {
    fn default() -> Self {
        Self::new()
    }
}
