//! Storage control plane, used only by the naming service.

use std::sync::Arc;

use async_trait::async_trait;
use dfs_rpc::{Call, Dispatch, Interface, Operation, Response, RpcResult, Stub};

use super::storage::StorageStub;
use crate::error::{FsError, FsResult};
use crate::path::DfsPath;

const CREATE: Operation = Operation::new("create", &["DfsPath"]);
const DELETE: Operation = Operation::new("delete", &["DfsPath"]);
const COPY: Operation = Operation::new("copy", &["DfsPath", "StorageStub"]);

/// Interface marker for [`Command`].
pub struct CommandApi;

impl Interface for CommandApi {
    const NAME: &'static str = "Command";
    const OPERATIONS: &'static [Operation] = &[CREATE, DELETE, COPY];
    type Error = FsError;
}

/// Client handle to a storage node's control plane.
pub type CommandStub = Stub<CommandApi>;

/// Control-plane operations a storage node performs on behalf of the naming
/// service.
#[async_trait]
pub trait Command: Send + Sync + 'static {
    /// Create an empty file, making parent directories as needed. `false` if
    /// it already exists.
    async fn create(&self, path: &DfsPath) -> FsResult<bool>;

    /// Delete a file or a whole directory. `false` for the root or a missing
    /// path.
    async fn delete(&self, path: &DfsPath) -> FsResult<bool>;

    /// Replace the local copy of `path` with the content held by `source`.
    async fn copy(&self, path: &DfsPath, source: &StorageStub) -> FsResult<bool>;
}

#[async_trait]
impl Command for CommandStub {
    async fn create(&self, path: &DfsPath) -> FsResult<bool> {
        self.call(&CREATE, &(path,)).await
    }

    async fn delete(&self, path: &DfsPath) -> FsResult<bool> {
        self.call(&DELETE, &(path,)).await
    }

    async fn copy(&self, path: &DfsPath, source: &StorageStub) -> FsResult<bool> {
        self.call(&COPY, &(path, source)).await
    }
}

/// Serves a [`Command`] implementation over RPC.
pub struct CommandSkeleton<C: ?Sized>(Arc<C>);

impl<C: Command + ?Sized> CommandSkeleton<C> {
    pub fn new(inner: Arc<C>) -> Self {
        Self(inner)
    }
}

#[async_trait]
impl<C: Command + ?Sized> Dispatch for CommandSkeleton<C> {
    type Interface = CommandApi;

    async fn dispatch(&self, call: Call) -> RpcResult<Response> {
        match call.name() {
            "create" => {
                let (path,): (DfsPath,) = call.args()?;
                Response::encode(self.0.create(&path).await)
            }
            "delete" => {
                let (path,): (DfsPath,) = call.args()?;
                Response::encode(self.0.delete(&path).await)
            }
            "copy" => {
                let (path, source): (DfsPath, StorageStub) = call.args()?;
                Response::encode(self.0.copy(&path, &source).await)
            }
            _ => Err(call.unknown(CommandApi::NAME)),
        }
    }
}
