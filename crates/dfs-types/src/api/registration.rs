//! Naming service, storage side: how a storage node announces itself.

use std::sync::Arc;

use async_trait::async_trait;
use dfs_rpc::{Call, Dispatch, Interface, Operation, Response, RpcResult, Stub};

use super::command::CommandStub;
use super::storage::StorageStub;
use crate::error::{FsError, FsResult};
use crate::path::DfsPath;

const REGISTER: Operation =
    Operation::new("register", &["StorageStub", "CommandStub", "Vec<DfsPath>"]);

/// Interface marker for [`Registration`].
pub struct RegistrationApi;

impl Interface for RegistrationApi {
    const NAME: &'static str = "Registration";
    const OPERATIONS: &'static [Operation] = &[REGISTER];
    type Error = FsError;
}

/// Client handle to the naming service's registration port.
pub type RegistrationStub = Stub<RegistrationApi>;

#[async_trait]
pub trait Registration: Send + Sync + 'static {
    /// Register a storage node and the files it already holds.
    ///
    /// Returns the offered paths the naming service already knows about.
    /// The node does not own those and should delete its local copies.
    async fn register(
        &self,
        storage: &StorageStub,
        command: &CommandStub,
        files: &[DfsPath],
    ) -> FsResult<Vec<DfsPath>>;
}

#[async_trait]
impl Registration for RegistrationStub {
    async fn register(
        &self,
        storage: &StorageStub,
        command: &CommandStub,
        files: &[DfsPath],
    ) -> FsResult<Vec<DfsPath>> {
        self.call(&REGISTER, &(storage, command, files)).await
    }
}

/// Serves a [`Registration`] implementation over RPC.
pub struct RegistrationSkeleton<R: ?Sized>(Arc<R>);

impl<R: Registration + ?Sized> RegistrationSkeleton<R> {
    pub fn new(inner: Arc<R>) -> Self {
        Self(inner)
    }
}

#[async_trait]
impl<R: Registration + ?Sized> Dispatch for RegistrationSkeleton<R> {
    type Interface = RegistrationApi;

    async fn dispatch(&self, call: Call) -> RpcResult<Response> {
        match call.name() {
            "register" => {
                let (storage, command, files): (StorageStub, CommandStub, Vec<DfsPath>) =
                    call.args()?;
                Response::encode(self.0.register(&storage, &command, &files).await)
            }
            _ => Err(call.unknown(RegistrationApi::NAME)),
        }
    }
}
