//! Integration tests for the dfs RPC transport over loopback TCP.
//!
//! Uses a small calculator interface so the transport is exercised without
//! any file-system semantics.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use dfs_rpc::{
    Call, Dispatch, Interface, MAX_FRAME_LEN, Operation, Response, RpcError, RpcResult, RpcServer,
    Stub,
};

#[derive(Debug, Error, Serialize, Deserialize, PartialEq)]
enum CalcError {
    #[error("division by zero")]
    DivideByZero,
    #[error(transparent)]
    Rpc(#[from] RpcError),
}

mod ops {
    use dfs_rpc::Operation;

    pub const ADD: Operation = Operation::new("add", &["i64", "i64"]);
    pub const DIVIDE: Operation = Operation::new("divide", &["i64", "i64"]);
    pub const ECHO: Operation = Operation::new("echo", &["String"]);
    pub const ECHO_BYTES: Operation = Operation::new("echo", &["Vec<u8>"]);
    pub const SLOW: Operation = Operation::new("slow", &["u64"]);
    pub const FILL: Operation = Operation::new("fill", &["usize"]);
}

struct CalcApi;

impl Interface for CalcApi {
    const NAME: &'static str = "Calculator";
    const OPERATIONS: &'static [Operation] =
        &[ops::ADD, ops::DIVIDE, ops::ECHO, ops::ECHO_BYTES, ops::SLOW, ops::FILL];
    type Error = CalcError;
}

/// Second interface, only used to aim a stub at the wrong server.
struct OtherApi;

impl Interface for OtherApi {
    const NAME: &'static str = "Other";
    const OPERATIONS: &'static [Operation] = &[ops::ADD];
    type Error = CalcError;
}

#[derive(Default)]
struct Calculator {
    calls: AtomicUsize,
}

#[async_trait]
impl Dispatch for Calculator {
    type Interface = CalcApi;

    async fn dispatch(&self, call: Call) -> RpcResult<Response> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match (call.name(), call.operation().arg_types) {
            ("add", _) => {
                let (a, b): (i64, i64) = call.args()?;
                Response::encode(Ok::<_, CalcError>(a + b))
            }
            ("divide", _) => {
                let (a, b): (i64, i64) = call.args()?;
                let result = if b == 0 {
                    Err(CalcError::DivideByZero)
                } else {
                    Ok(a / b)
                };
                Response::encode(result)
            }
            ("echo", ["String"]) => {
                let (s,): (String,) = call.args()?;
                Response::encode(Ok::<_, CalcError>(s))
            }
            ("echo", _) => {
                let (b,): (Vec<u8>,) = call.args()?;
                Response::encode(Ok::<_, CalcError>(b.len() as u64))
            }
            ("slow", _) => {
                let (ms,): (u64,) = call.args()?;
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Response::encode(Ok::<_, CalcError>(ms))
            }
            ("fill", _) => {
                let (len,): (usize,) = call.args()?;
                Response::encode(Ok::<_, CalcError>(vec![7u8; len]))
            }
            _ => Err(call.unknown(CalcApi::NAME)),
        }
    }
}

/// Start a calculator on an ephemeral loopback port.
async fn start_calculator() -> (RpcServer<Calculator>, Stub<CalcApi>) {
    let server = RpcServer::new(Calculator::default(), None).unwrap();
    server.start().await.unwrap();
    let stub = Stub::for_server(&server).unwrap();
    (server, stub)
}

#[tokio::test]
async fn test_call_returns_value() {
    let (server, stub) = start_calculator().await;

    let sum: i64 = stub.call(&ops::ADD, &(40i64, 2i64)).await.unwrap();
    assert_eq!(sum, 42);

    let echoed: String = stub.call(&ops::ECHO, &("hello".to_string(),)).await.unwrap();
    assert_eq!(echoed, "hello");

    assert_eq!(server.dispatcher().calls.load(Ordering::SeqCst), 2);
    server.stop().await;
}

#[tokio::test]
async fn test_overload_selected_by_arg_types() {
    let (server, stub) = start_calculator().await;

    let len: u64 = stub.call(&ops::ECHO_BYTES, &(vec![1u8, 2, 3],)).await.unwrap();
    assert_eq!(len, 3);

    server.stop().await;
}

#[tokio::test]
async fn test_application_error_is_reraised() {
    let (server, stub) = start_calculator().await;

    let err = stub.call::<_, i64>(&ops::DIVIDE, &(1i64, 0i64)).await.unwrap_err();
    assert_eq!(err, CalcError::DivideByZero);

    let ok: i64 = stub.call(&ops::DIVIDE, &(9i64, 3i64)).await.unwrap();
    assert_eq!(ok, 3);

    server.stop().await;
}

#[tokio::test]
async fn test_unknown_operation_faults() {
    const MISSING: Operation = Operation::new("subtract", &["i64", "i64"]);
    let (server, stub) = start_calculator().await;

    let err = stub.call::<_, i64>(&MISSING, &(1i64, 1i64)).await.unwrap_err();
    assert!(
        matches!(err, CalcError::Rpc(RpcError::UnknownOperation { ref operation, .. }) if operation == "subtract"),
        "got {err:?}"
    );
    assert_eq!(server.dispatcher().calls.load(Ordering::SeqCst), 0);

    server.stop().await;
}

#[tokio::test]
async fn test_wrong_interface_faults() {
    let (server, _) = start_calculator().await;
    let wrong: Stub<OtherApi> = Stub::new(server.local_addr().unwrap());

    let err = wrong.call::<_, i64>(&ops::ADD, &(1i64, 1i64)).await.unwrap_err();
    assert!(matches!(err, CalcError::Rpc(RpcError::InterfaceMismatch { .. })), "got {err:?}");

    server.stop().await;
}

#[tokio::test]
async fn test_connection_refused_is_transport_error() {
    let (server, stub) = start_calculator().await;
    server.stop().await;

    let err = stub.call::<_, i64>(&ops::ADD, &(1i64, 1i64)).await.unwrap_err();
    assert!(matches!(err, CalcError::Rpc(RpcError::Connect { .. })), "got {err:?}");
}

#[tokio::test]
async fn test_start_twice_is_rejected() {
    let (server, _) = start_calculator().await;

    let err = server.start().await.unwrap_err();
    assert!(matches!(err, RpcError::AlreadyRunning(_)));
    assert!(server.is_running());

    server.stop().await;
}

#[tokio::test]
async fn test_stop_is_idempotent_and_hook_runs_once() {
    let server = RpcServer::new(Calculator::default(), None).unwrap();
    let stops = Arc::new(AtomicUsize::new(0));
    let clean = Arc::new(AtomicUsize::new(0));
    {
        let stops = Arc::clone(&stops);
        let clean = Arc::clone(&clean);
        server.on_stopped(move |cause| {
            stops.fetch_add(1, Ordering::SeqCst);
            if cause.is_none() {
                clean.fetch_add(1, Ordering::SeqCst);
            }
        });
    }

    server.start().await.unwrap();
    server.stop().await;
    server.stop().await;

    assert!(!server.is_running());
    assert_eq!(stops.load(Ordering::SeqCst), 1);
    assert_eq!(clean.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_stop_on_never_started_server() {
    let server = RpcServer::new(Calculator::default(), None).unwrap();
    server.stop().await;
    server.wait_stopped().await;
    assert!(server.local_addr().is_none());
    assert!(matches!(Stub::<CalcApi>::for_server(&server), Err(RpcError::NotBound)));
}

#[tokio::test]
async fn test_restart_keeps_address() {
    let (server, stub) = start_calculator().await;
    let first = server.local_addr().unwrap();
    server.stop().await;

    let second = server.start().await.unwrap();
    assert_eq!(first, second);

    let sum: i64 = stub.call(&ops::ADD, &(2i64, 2i64)).await.unwrap();
    assert_eq!(sum, 4);
    server.stop().await;
}

#[tokio::test]
async fn test_calls_are_served_concurrently() {
    let (server, stub) = start_calculator().await;

    let slow = {
        let stub = stub.clone();
        tokio::spawn(async move { stub.call::<_, u64>(&ops::SLOW, &(300u64,)).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Answered while the slow call is still sleeping.
    let quick = tokio::time::timeout(
        Duration::from_millis(200),
        stub.call::<_, i64>(&ops::ADD, &(1i64, 2i64)),
    )
    .await
    .expect("quick call blocked behind slow call")
    .unwrap();
    assert_eq!(quick, 3);

    assert_eq!(slow.await.unwrap().unwrap(), 300);
    server.stop().await;
}

#[tokio::test]
async fn test_stub_identity() {
    let (server, stub) = start_calculator().await;
    let again: Stub<CalcApi> = Stub::for_server(&server).unwrap();
    let resolved: Stub<CalcApi> = Stub::for_server_at(&server, "127.0.0.1").await.unwrap();

    assert_eq!(stub, again);
    assert_eq!(stub, resolved);
    assert_eq!(stub.interface(), "Calculator");
    assert_eq!(
        stub.to_string(),
        format!("Calculator stub on port {}", stub.port())
    );

    let mut set = std::collections::HashSet::new();
    set.insert(stub.clone());
    assert!(set.contains(&again));

    server.stop().await;
}

#[tokio::test]
async fn test_stub_survives_the_wire() {
    let (server, stub) = start_calculator().await;

    let bytes = dfs_rpc::wire::encode(&stub).unwrap();
    let decoded: Stub<CalcApi> = dfs_rpc::wire::decode(&bytes).unwrap();
    assert_eq!(decoded, stub);

    let sum: i64 = decoded.call(&ops::ADD, &(5i64, 5i64)).await.unwrap();
    assert_eq!(sum, 10);
    server.stop().await;
}

#[tokio::test]
async fn test_oversized_response_faults_instead_of_closing() {
    let (server, stub) = start_calculator().await;

    let err = stub
        .call::<_, Vec<u8>>(&ops::FILL, &(MAX_FRAME_LEN,))
        .await
        .unwrap_err();
    assert!(matches!(err, CalcError::Rpc(RpcError::Codec(_))), "got {err:?}");

    // The server keeps serving afterwards.
    let small: Vec<u8> = stub.call(&ops::FILL, &(3usize,)).await.unwrap();
    assert_eq!(small, vec![7, 7, 7]);
    server.stop().await;
}
