//! Naming service, client side: locking and directory-tree operations.

use std::sync::Arc;

use async_trait::async_trait;
use dfs_rpc::{Call, Dispatch, Interface, Operation, Response, RpcResult, Stub};

use super::storage::StorageStub;
use crate::error::{FsError, FsResult};
use crate::path::DfsPath;

const LOCK: Operation = Operation::new("lock", &["DfsPath", "bool"]);
const UNLOCK: Operation = Operation::new("unlock", &["DfsPath", "bool"]);
const IS_DIRECTORY: Operation = Operation::new("is_directory", &["DfsPath"]);
const LIST: Operation = Operation::new("list", &["DfsPath"]);
const CREATE_FILE: Operation = Operation::new("create_file", &["DfsPath"]);
const CREATE_DIRECTORY: Operation = Operation::new("create_directory", &["DfsPath"]);
const DELETE: Operation = Operation::new("delete", &["DfsPath"]);
const GET_STORAGE: Operation = Operation::new("get_storage", &["DfsPath"]);

/// Interface marker for [`Service`].
pub struct ServiceApi;

impl Interface for ServiceApi {
    const NAME: &'static str = "Service";
    const OPERATIONS: &'static [Operation] = &[
        LOCK,
        UNLOCK,
        IS_DIRECTORY,
        LIST,
        CREATE_FILE,
        CREATE_DIRECTORY,
        DELETE,
        GET_STORAGE,
    ];
    type Error = FsError;
}

/// Client handle to the naming service.
pub type ServiceStub = Stub<ServiceApi>;

/// Client-facing naming service operations.
///
/// Callers are expected to bracket tree operations with [`lock`](Self::lock)
/// and [`unlock`](Self::unlock): shared for reads, exclusive for writes.
#[async_trait]
pub trait Service: Send + Sync + 'static {
    /// Block until `path` is locked in the requested mode, with every
    /// ancestor locked shared.
    async fn lock(&self, path: &DfsPath, exclusive: bool) -> FsResult<()>;

    /// Release a lock taken with [`lock`](Self::lock) in the same mode.
    async fn unlock(&self, path: &DfsPath, exclusive: bool) -> FsResult<()>;

    async fn is_directory(&self, path: &DfsPath) -> FsResult<bool>;

    /// Names of a directory's children.
    async fn list(&self, directory: &DfsPath) -> FsResult<Vec<String>>;

    /// Create an empty file on some storage node. `false` if the path exists.
    async fn create_file(&self, path: &DfsPath) -> FsResult<bool>;

    /// `false` if the path exists.
    async fn create_directory(&self, path: &DfsPath) -> FsResult<bool>;

    /// Delete a file or directory tree from the naming service and from
    /// every storage node holding it.
    async fn delete(&self, path: &DfsPath) -> FsResult<bool>;

    /// Data-plane stub of the storage node holding a file.
    async fn get_storage(&self, path: &DfsPath) -> FsResult<StorageStub>;
}

#[async_trait]
impl Service for ServiceStub {
    async fn lock(&self, path: &DfsPath, exclusive: bool) -> FsResult<()> {
        self.call(&LOCK, &(path, exclusive)).await
    }

    async fn unlock(&self, path: &DfsPath, exclusive: bool) -> FsResult<()> {
        self.call(&UNLOCK, &(path, exclusive)).await
    }

    async fn is_directory(&self, path: &DfsPath) -> FsResult<bool> {
        self.call(&IS_DIRECTORY, &(path,)).await
    }

    async fn list(&self, directory: &DfsPath) -> FsResult<Vec<String>> {
        self.call(&LIST, &(directory,)).await
    }

    async fn create_file(&self, path: &DfsPath) -> FsResult<bool> {
        self.call(&CREATE_FILE, &(path,)).await
    }

    async fn create_directory(&self, path: &DfsPath) -> FsResult<bool> {
        self.call(&CREATE_DIRECTORY, &(path,)).await
    }

    async fn delete(&self, path: &DfsPath) -> FsResult<bool> {
        self.call(&DELETE, &(path,)).await
    }

    async fn get_storage(&self, path: &DfsPath) -> FsResult<StorageStub> {
        self.call(&GET_STORAGE, &(path,)).await
    }
}

/// Serves a [`Service`] implementation over RPC.
pub struct ServiceSkeleton<S: ?Sized>(Arc<S>);

impl<S: Service + ?Sized> ServiceSkeleton<S> {
    pub fn new(inner: Arc<S>) -> Self {
        Self(inner)
    }
}

#[async_trait]
impl<S: Service + ?Sized> Dispatch for ServiceSkeleton<S> {
    type Interface = ServiceApi;

    async fn dispatch(&self, call: Call) -> RpcResult<Response> {
        let svc = &self.0;
        match call.name() {
            "lock" => {
                let (path, exclusive): (DfsPath, bool) = call.args()?;
                Response::encode(svc.lock(&path, exclusive).await)
            }
            "unlock" => {
                let (path, exclusive): (DfsPath, bool) = call.args()?;
                Response::encode(svc.unlock(&path, exclusive).await)
            }
            "is_directory" => {
                let (path,): (DfsPath,) = call.args()?;
                Response::encode(svc.is_directory(&path).await)
            }
            "list" => {
                let (path,): (DfsPath,) = call.args()?;
                Response::encode(svc.list(&path).await)
            }
            "create_file" => {
                let (path,): (DfsPath,) = call.args()?;
                Response::encode(svc.create_file(&path).await)
            }
            "create_directory" => {
                let (path,): (DfsPath,) = call.args()?;
                Response::encode(svc.create_directory(&path).await)
            }
            "delete" => {
                let (path,): (DfsPath,) = call.args()?;
                Response::encode(svc.delete(&path).await)
            }
            "get_storage" => {
                let (path,): (DfsPath,) = call.args()?;
                Response::encode(svc.get_storage(&path).await)
            }
            _ => Err(call.unknown(ServiceApi::NAME)),
        }
    }
}
