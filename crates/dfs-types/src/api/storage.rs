//! Storage data plane: byte-range access to files on one storage node.

use std::sync::Arc;

use async_trait::async_trait;
use dfs_rpc::{Call, Dispatch, Interface, Operation, Response, RpcResult, Stub};

use crate::error::{FsError, FsResult};
use crate::path::DfsPath;

const SIZE: Operation = Operation::new("size", &["DfsPath"]);
const READ: Operation = Operation::new("read", &["DfsPath", "i64", "u32"]);
const WRITE: Operation = Operation::new("write", &["DfsPath", "i64", "Vec<u8>"]);

/// Interface marker for [`Storage`].
pub struct StorageApi;

impl Interface for StorageApi {
    const NAME: &'static str = "Storage";
    const OPERATIONS: &'static [Operation] = &[SIZE, READ, WRITE];
    type Error = FsError;
}

/// Client handle to a storage node's data plane.
pub type StorageStub = Stub<StorageApi>;

/// Data-plane operations, served by storage nodes to clients.
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    /// Length of a file in bytes.
    async fn size(&self, path: &DfsPath) -> FsResult<u64>;

    /// `length` bytes starting at `offset`.
    async fn read(&self, path: &DfsPath, offset: i64, length: u32) -> FsResult<Vec<u8>>;

    /// Write `data` at `offset`, growing the file if needed.
    async fn write(&self, path: &DfsPath, offset: i64, data: &[u8]) -> FsResult<()>;
}

#[async_trait]
impl Storage for StorageStub {
    async fn size(&self, path: &DfsPath) -> FsResult<u64> {
        self.call(&SIZE, &(path,)).await
    }

    async fn read(&self, path: &DfsPath, offset: i64, length: u32) -> FsResult<Vec<u8>> {
        self.call(&READ, &(path, offset, length)).await
    }

    async fn write(&self, path: &DfsPath, offset: i64, data: &[u8]) -> FsResult<()> {
        self.call(&WRITE, &(path, offset, data)).await
    }
}

/// Serves a [`Storage`] implementation over RPC.
pub struct StorageSkeleton<S: ?Sized>(Arc<S>);

impl<S: Storage + ?Sized> StorageSkeleton<S> {
    pub fn new(inner: Arc<S>) -> Self {
        Self(inner)
    }
}

#[async_trait]
impl<S: Storage + ?Sized> Dispatch for StorageSkeleton<S> {
    type Interface = StorageApi;

    async fn dispatch(&self, call: Call) -> RpcResult<Response> {
        match call.name() {
            "size" => {
                let (path,): (DfsPath,) = call.args()?;
                Response::encode(self.0.size(&path).await)
            }
            "read" => {
                let (path, offset, length): (DfsPath, i64, u32) = call.args()?;
                Response::encode(self.0.read(&path, offset, length).await)
            }
            "write" => {
                let (path, offset, data): (DfsPath, i64, Vec<u8>) = call.args()?;
                Response::encode(self.0.write(&path, offset, &data).await)
            }
            _ => Err(call.unknown(StorageApi::NAME)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dfs_rpc::RpcServer;
    use tokio::sync::Mutex;

    /// One in-memory file at `/f`.
    #[derive(Default)]
    struct MemFile(Mutex<Vec<u8>>);

    impl MemFile {
        fn check(path: &DfsPath) -> FsResult<()> {
            if path.to_string() == "/f" {
                Ok(())
            } else {
                Err(FsError::not_found(path))
            }
        }
    }

    #[async_trait]
    impl Storage for MemFile {
        async fn size(&self, path: &DfsPath) -> FsResult<u64> {
            Self::check(path)?;
            Ok(self.0.lock().await.len() as u64)
        }

        async fn read(&self, path: &DfsPath, offset: i64, length: u32) -> FsResult<Vec<u8>> {
            Self::check(path)?;
            let data = self.0.lock().await;
            let start = usize::try_from(offset).map_err(|_| FsError::out_of_bounds("offset"))?;
            let end = start + length as usize;
            data.get(start..end)
                .map(<[u8]>::to_vec)
                .ok_or_else(|| FsError::out_of_bounds("range"))
        }

        async fn write(&self, path: &DfsPath, offset: i64, bytes: &[u8]) -> FsResult<()> {
            Self::check(path)?;
            let mut data = self.0.lock().await;
            let start = usize::try_from(offset).map_err(|_| FsError::out_of_bounds("offset"))?;
            if data.len() < start + bytes.len() {
                data.resize(start + bytes.len(), 0);
            }
            data[start..start + bytes.len()].copy_from_slice(bytes);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_stub_forwards_to_skeleton() {
        let server = RpcServer::new(StorageSkeleton::new(Arc::new(MemFile::default())), None).unwrap();
        server.start().await.unwrap();
        let stub = StorageStub::for_server(&server).unwrap();
        let f = DfsPath::parse("/f").unwrap();

        stub.write(&f, 0, b"hello").await.unwrap();
        assert_eq!(stub.size(&f).await.unwrap(), 5);
        assert_eq!(stub.read(&f, 1, 3).await.unwrap(), b"ell");

        let err = stub.read(&f, 4, 10).await.unwrap_err();
        assert!(matches!(err, FsError::OutOfBounds(_)));
        let err = stub.size(&DfsPath::parse("/g").unwrap()).await.unwrap_err();
        assert_eq!(err, FsError::NotFound("/g".to_string()));

        server.stop().await;
    }
}
