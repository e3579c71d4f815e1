//! Storage node lifecycle: listeners, registration, startup cleanup.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use dfs_rpc::{RpcError, RpcServer, StopGroup};
use dfs_types::{
    Command, CommandSkeleton, CommandStub, DfsPath, FsResult, Registration, RegistrationStub,
    StorageSkeleton, StorageStub,
};

use crate::store::LocalStore;

/// A storage node: one [`LocalStore`] served on a data-plane listener and a
/// control-plane listener.
pub struct StorageNode {
    store: Arc<LocalStore>,
    storage: RpcServer<StorageSkeleton<LocalStore>>,
    command: RpcServer<CommandSkeleton<LocalStore>>,
    stubs: Mutex<Option<(StorageStub, CommandStub)>>,
    stopped: StopGroup,
}

impl StorageNode {
    /// Create a node serving `root`. Listener addresses default to ephemeral
    /// loopback ports.
    pub fn new(
        root: impl Into<PathBuf>,
        storage_addr: Option<SocketAddr>,
        command_addr: Option<SocketAddr>,
    ) -> FsResult<Self> {
        let store = Arc::new(LocalStore::new(root));
        let storage = RpcServer::new(StorageSkeleton::new(Arc::clone(&store)), storage_addr)?;
        let command = RpcServer::new(CommandSkeleton::new(Arc::clone(&store)), command_addr)?;

        let stopped = StopGroup::new();
        stopped.join(&storage);
        stopped.join(&command);

        Ok(Self {
            store,
            storage,
            command,
            stubs: Mutex::new(None),
            stopped,
        })
    }

    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    /// Data-plane stub handed to the naming service, once started.
    pub fn storage_stub(&self) -> Option<StorageStub> {
        self.stubs.lock().as_ref().map(|(s, _)| s.clone())
    }

    /// Control-plane stub handed to the naming service, once started.
    pub fn command_stub(&self) -> Option<CommandStub> {
        self.stubs.lock().as_ref().map(|(_, c)| c.clone())
    }

    /// Install a hook run once both listeners have exited after a start.
    /// It receives the first listener failure, if any.
    pub fn on_stopped(&self, hook: impl Fn(Option<&RpcError>) + Send + Sync + 'static) {
        self.stopped.on_stopped(hook);
    }

    /// Bring the node up and register it with the naming service.
    ///
    /// `hostname` is how other processes reach this node; the stubs sent
    /// to the naming service carry it. Files the naming service reports as
    /// duplicates are deleted locally and emptied directories are pruned.
    pub async fn start(&self, hostname: &str, naming: &RegistrationStub) -> FsResult<()> {
        let files = DfsPath::scan(self.store.root()).await?;

        self.storage.start().await?;
        if let Err(e) = self.command.start().await {
            self.storage.stop().await;
            self.stopped.reset();
            return Err(e.into());
        }

        let duplicates = match self.register(hostname, naming, &files).await {
            Ok(duplicates) => duplicates,
            Err(e) => {
                self.stop().await;
                return Err(e);
            }
        };

        for duplicate in &duplicates {
            if let Err(e) = self.store.delete(duplicate).await {
                warn!(path = %duplicate, "failed to drop duplicate file: {e}");
            }
        }
        let pruned = self.store.prune_empty_dirs().await?;

        info!(
            root = %self.store.root().display(),
            files = files.len().saturating_sub(duplicates.len()),
            duplicates = duplicates.len(),
            pruned,
            "storage node registered"
        );
        Ok(())
    }

    async fn register(
        &self,
        hostname: &str,
        naming: &RegistrationStub,
        files: &[DfsPath],
    ) -> FsResult<Vec<DfsPath>> {
        let storage_stub = StorageStub::for_server_at(&self.storage, hostname).await?;
        let command_stub = CommandStub::for_server_at(&self.command, hostname).await?;

        let duplicates = naming.register(&storage_stub, &command_stub, files).await?;
        *self.stubs.lock() = Some((storage_stub, command_stub));
        Ok(duplicates)
    }

    /// Stop both listeners. Does nothing if they are not running.
    pub async fn stop(&self) {
        self.storage.stop().await;
        self.command.stop().await;
    }
}
