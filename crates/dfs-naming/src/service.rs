//! The naming service: tree operations, hierarchical locking, registration.
//!
//! All state sits behind one async mutex. Lock waiters never hold it while
//! waiting; they park on a [`Notify`] that is broadcast whenever a lock is
//! released and re-check their request when woken. `create_file` and
//! `delete` keep the mutex across their storage-node calls so the tree and
//! the nodes change together; replica copies and invalidations run with it
//! released.

use std::iter;

use async_trait::async_trait;
use futures::future::join_all;
use rand::seq::SliceRandom;
use tokio::sync::{Mutex, Notify};
use tracing::{Instrument, debug, info, info_span, warn};

use dfs_types::{
    Command, CommandStub, DfsPath, FsError, FsResult, Registration, Service, StorageStub,
};

use crate::lock::{LockMode, LockTable};
use crate::replication;
use crate::tree::{FileEntry, Node, NodeHandle, Tree};

#[derive(Debug, Default)]
struct State {
    tree: Tree,
    locks: LockTable,
    /// Registered storage nodes, in registration order.
    nodes: Vec<NodeHandle>,
}

#[derive(Debug, Default)]
pub struct NamingService {
    state: Mutex<State>,
    released: Notify,
}

impl NamingService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registered storage nodes, in registration order.
    pub async fn nodes(&self) -> Vec<NodeHandle> {
        self.state.lock().await.nodes.clone()
    }

    /// Current replicas of a file. Inspection only; nothing in the service
    /// depends on it.
    pub async fn replicas(&self, path: &DfsPath) -> FsResult<Vec<NodeHandle>> {
        Ok(self.state.lock().await.tree.file(path)?.replicas.clone())
    }

    /// Reads counted toward replication since the file was last written.
    /// Inspection only, like [`replicas`](Self::replicas).
    pub async fn read_count(&self, path: &DfsPath) -> FsResult<u64> {
        Ok(self.state.lock().await.tree.file(path)?.reads)
    }

    /// Queue one lock request on `step` and wait until it is granted.
    ///
    /// If `target` stops resolving while the request waits, the request is
    /// withdrawn, everything in `held` is released, and the call fails
    /// not-found.
    async fn acquire(
        &self,
        target: &DfsPath,
        step: &DfsPath,
        mode: LockMode,
        held: &[(DfsPath, LockMode)],
    ) -> FsResult<()> {
        let ticket = self.state.lock().await.locks.enqueue(step, mode);

        loop {
            // Armed before checking, so a release between the check and the
            // wait still wakes us.
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock().await;
                if !state.tree.exists(target) {
                    state.locks.cancel(step, ticket);
                    for (path, mode) in held {
                        state.locks.release(path, *mode);
                    }
                    drop(state);
                    self.released.notify_waiters();
                    return Err(FsError::not_found(target));
                }
                if state.locks.try_grant(step, ticket) {
                    return Ok(());
                }
            }

            notified.await;
        }
    }

    /// Count a read and, if the file has earned another replica, copy it to
    /// the next node in line.
    async fn replicate_on_read(&self, path: &DfsPath) {
        let (target, source) = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            let Ok(entry) = state.tree.file_mut(path) else {
                return;
            };
            match replication::record_read(entry, &state.nodes) {
                Some(target) => (target, entry.primary.storage.clone()),
                None => return,
            }
        };

        let copied = match target
            .command
            .copy(path, &source)
            .instrument(info_span!("replica.copy", %path, to = %target.command))
            .await
        {
            Ok(true) => true,
            Ok(false) => {
                warn!(%path, to = %target.command, "replica copy refused");
                false
            }
            Err(e) => {
                warn!(%path, to = %target.command, "replica copy failed: {e}");
                false
            }
        };

        let mut state = self.state.lock().await;
        if let Ok(entry) = state.tree.file_mut(path) {
            replication::finish_copy(entry, &target, copied);
            if copied {
                debug!(%path, replicas = entry.replicas.len(), "replica added");
            }
        }
    }

    /// Drop every replica of a file about to be written.
    async fn invalidate_on_write(&self, path: &DfsPath) {
        let stale = match self.state.lock().await.tree.file_mut(path) {
            Ok(entry) => replication::invalidate(entry),
            Err(_) => return,
        };
        if stale.is_empty() {
            return;
        }

        let span = info_span!("replica.invalidate", %path, count = stale.len());
        let results = join_all(stale.iter().map(|node| node.command.delete(path)))
            .instrument(span)
            .await;
        for (node, result) in stale.iter().zip(results) {
            if let Err(e) = result {
                warn!(%path, on = %node.command, "replica delete failed: {e}");
            }
        }
    }
}

#[async_trait]
impl Service for NamingService {
    async fn lock(&self, path: &DfsPath, exclusive: bool) -> FsResult<()> {
        let mode = LockMode::from_exclusive(exclusive);
        let span = info_span!("lock.acquire", %path, ?mode);

        async {
            self.state.lock().await.tree.get(path)?;

            let steps = path
                .ancestors()
                .map(|ancestor| (ancestor, LockMode::Shared))
                .chain(iter::once((path.clone(), mode)));
            let mut held = Vec::with_capacity(path.depth() + 1);
            for (step, step_mode) in steps {
                self.acquire(path, &step, step_mode, &held).await?;
                held.push((step, step_mode));
            }

            match mode {
                LockMode::Shared => self.replicate_on_read(path).await,
                LockMode::Exclusive => self.invalidate_on_write(path).await,
            }
            debug!("granted");
            Ok::<_, FsError>(())
        }
        .instrument(span)
        .await
    }

    async fn unlock(&self, path: &DfsPath, exclusive: bool) -> FsResult<()> {
        let mode = LockMode::from_exclusive(exclusive);
        {
            let mut state = self.state.lock().await;
            let held = state.locks.is_held(path, mode)
                && path
                    .ancestors()
                    .all(|ancestor| state.locks.is_held(&ancestor, LockMode::Shared));
            if !held {
                return Err(FsError::invalid_argument(format!(
                    "{path} is not locked {}",
                    if exclusive { "exclusively" } else { "shared" }
                )));
            }

            state.locks.release(path, mode);
            for ancestor in path.ancestors() {
                state.locks.release(&ancestor, LockMode::Shared);
            }
        }
        self.released.notify_waiters();
        Ok(())
    }

    async fn is_directory(&self, path: &DfsPath) -> FsResult<bool> {
        Ok(self.state.lock().await.tree.get(path)?.is_directory())
    }

    async fn list(&self, directory: &DfsPath) -> FsResult<Vec<String>> {
        let state = self.state.lock().await;
        Ok(state.tree.directory(directory)?.keys().cloned().collect())
    }

    async fn create_file(&self, path: &DfsPath) -> FsResult<bool> {
        // Held across the remote create: a delete of an ancestor in between
        // would otherwise leave a file on the node that the tree never sees.
        let mut state = self.state.lock().await;
        if !state.tree.can_create(path)? {
            return Ok(false);
        }
        let node = state
            .nodes
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or(FsError::NoStorage)?;

        node.command.create(path).await?;
        state.tree.insert(path, Node::File(FileEntry::new(node)))
    }

    async fn create_directory(&self, path: &DfsPath) -> FsResult<bool> {
        self.state
            .lock()
            .await
            .tree
            .insert(path, Node::empty_directory())
    }

    async fn delete(&self, path: &DfsPath) -> FsResult<bool> {
        if path.is_root() {
            return Err(FsError::invalid_argument("the root cannot be deleted"));
        }

        // Held until the subtree is detached, so nothing can be created
        // under `path` between the remote deletes and the detach.
        let mut state = self.state.lock().await;
        let is_directory = state.tree.get(path)?.is_directory();
        let files = state.tree.files_under(path)?;

        let mut hosts: Vec<NodeHandle> = Vec::new();
        for (file, entry) in &files {
            for node in entry.replicas.iter().chain(iter::once(&entry.primary)) {
                if let Err(e) = node.command.delete(file).await {
                    warn!(%file, on = %node.command, "delete failed, stopping: {e}");
                    return Ok(false);
                }
                if !hosts.contains(node) {
                    hosts.push(node.clone());
                }
            }
            state.tree.remove(file);
        }

        if is_directory {
            // Clears the now-empty local directories on each node.
            let results = join_all(hosts.iter().map(|node| node.command.delete(path))).await;
            for (node, result) in hosts.iter().zip(results) {
                if let Err(e) = result {
                    warn!(%path, on = %node.command, "directory cleanup failed: {e}");
                }
            }
            state.tree.remove(path);
        }
        drop(state);

        info!(%path, files = files.len(), "deleted");
        Ok(true)
    }

    async fn get_storage(&self, path: &DfsPath) -> FsResult<StorageStub> {
        let state = self.state.lock().await;
        let entry = state.tree.file(path)?;
        // Replicas only exist while no one holds the file exclusively, so
        // any host serves reads.
        let hosts: Vec<&NodeHandle> = entry.hosts().collect();
        let host = hosts
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(&entry.primary);
        Ok(host.storage.clone())
    }
}

#[async_trait]
impl Registration for NamingService {
    async fn register(
        &self,
        storage: &StorageStub,
        command: &CommandStub,
        files: &[DfsPath],
    ) -> FsResult<Vec<DfsPath>> {
        let mut state = self
            .state
            .lock()
            .instrument(info_span!("register", node = %storage))
            .await;
        if state.nodes.iter().any(|node| node.storage == *storage) {
            return Err(FsError::AlreadyRegistered(storage.to_string()));
        }

        let handle = NodeHandle {
            storage: storage.clone(),
            command: command.clone(),
        };

        let mut offered = files.to_vec();
        offered.sort();
        offered.dedup();

        let mut duplicates = Vec::new();
        for path in offered.into_iter().filter(|path| !path.is_root()) {
            if !state.tree.insert_registered(&path, FileEntry::new(handle.clone())) {
                duplicates.push(path);
            }
        }
        state.nodes.push(handle);

        info!(
            node = %storage,
            files = files.len() - duplicates.len(),
            duplicates = duplicates.len(),
            "storage node registered"
        );
        Ok(duplicates)
    }
}
