//! Local file storage for a storage node.
//!
//! A [`LocalStore`] maps [`DfsPath`]s onto files under one local root
//! directory and serves both the data plane ([`Storage`]) and the control
//! plane ([`Command`]). Every operation holds the store's mutex, so calls
//! on one node run one at a time.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

use dfs_types::constants::{COPY_CHUNK_SIZE, MAX_READ_LEN};
use dfs_types::{Command, DfsPath, FsError, FsResult, Storage, StorageStub};

#[derive(Debug)]
pub struct LocalStore {
    root: PathBuf,
    guard: Mutex<()>,
}

impl LocalStore {
    /// Create a store rooted at `root`. The directory is not touched until
    /// the first operation.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            guard: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Every file currently held, as dfs paths.
    pub async fn files(&self) -> FsResult<Vec<DfsPath>> {
        let _held = self.guard.lock().await;
        DfsPath::scan(&self.root).await
    }

    /// Remove every empty directory below the root, deepest first. The root
    /// itself is kept. Returns how many directories were removed.
    pub async fn prune_empty_dirs(&self) -> FsResult<usize> {
        let _held = self.guard.lock().await;

        // Pre-order walk; visiting it backwards sees children before parents.
        let mut dirs = Vec::new();
        let mut pending = vec![self.root.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                if entry.file_type().await?.is_dir() {
                    dirs.push(entry.path());
                    pending.push(entry.path());
                }
            }
        }

        let mut removed = 0;
        for dir in dirs.iter().rev() {
            let mut entries = fs::read_dir(dir).await?;
            if entries.next_entry().await?.is_none() {
                fs::remove_dir(dir).await?;
                debug!(dir = %dir.display(), "pruned empty directory");
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Length of the regular file at `path`.
    async fn file_len(&self, path: &DfsPath) -> FsResult<u64> {
        match fs::metadata(path.to_local(&self.root)).await {
            Ok(meta) if meta.is_file() => Ok(meta.len()),
            _ => Err(FsError::not_found(path)),
        }
    }

    async fn create_locked(&self, _held: &MutexGuard<'_, ()>, path: &DfsPath) -> FsResult<bool> {
        if path.is_root() {
            return Ok(false);
        }
        let local = path.to_local(&self.root);

        if let Some(parent) = local.parent() {
            if let Err(e) = fs::create_dir_all(parent).await {
                if self.blocked_by_file(path).await {
                    return Ok(false);
                }
                return Err(e.into());
            }
        }

        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&local)
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_locked(&self, _held: &MutexGuard<'_, ()>, path: &DfsPath) -> FsResult<bool> {
        if path.is_root() {
            return Ok(false);
        }
        let local = path.to_local(&self.root);

        let meta = match fs::symlink_metadata(&local).await {
            Ok(meta) => meta,
            Err(_) => return Ok(false),
        };
        if meta.is_dir() {
            fs::remove_dir_all(&local).await?;
        } else {
            fs::remove_file(&local).await?;
        }
        Ok(true)
    }

    /// Whether some proper ancestor of `path` exists locally as a file.
    async fn blocked_by_file(&self, path: &DfsPath) -> bool {
        for ancestor in path.ancestors().skip(1) {
            if let Ok(meta) = fs::metadata(ancestor.to_local(&self.root)).await {
                if meta.is_file() {
                    return true;
                }
            }
        }
        false
    }
}

#[async_trait]
impl Storage for LocalStore {
    async fn size(&self, path: &DfsPath) -> FsResult<u64> {
        let _held = self.guard.lock().await;
        self.file_len(path).await
    }

    async fn read(&self, path: &DfsPath, offset: i64, length: u32) -> FsResult<Vec<u8>> {
        let _held = self.guard.lock().await;
        let len = self.file_len(path).await?;
        if len == 0 {
            return Ok(Vec::new());
        }

        let start = u64::try_from(offset)
            .map_err(|_| FsError::out_of_bounds(format!("negative offset {offset}")))?;
        if length > MAX_READ_LEN {
            return Err(FsError::out_of_bounds(format!(
                "{length} bytes in one read exceeds the limit of {MAX_READ_LEN}"
            )));
        }
        if start >= len || start + u64::from(length) > len {
            return Err(FsError::out_of_bounds(format!(
                "{length} bytes at {offset} past end of {path} ({len} bytes)"
            )));
        }

        let mut file = fs::File::open(path.to_local(&self.root)).await?;
        file.seek(SeekFrom::Start(start)).await?;
        let mut buffer = vec![0u8; length as usize];
        file.read_exact(&mut buffer).await?;
        Ok(buffer)
    }

    async fn write(&self, path: &DfsPath, offset: i64, data: &[u8]) -> FsResult<()> {
        let start = u64::try_from(offset)
            .map_err(|_| FsError::out_of_bounds(format!("negative offset {offset}")))?;

        let _held = self.guard.lock().await;
        self.file_len(path).await?;

        let mut file = fs::OpenOptions::new()
            .write(true)
            .open(path.to_local(&self.root))
            .await?;
        file.seek(SeekFrom::Start(start)).await?;
        file.write_all(data).await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl Command for LocalStore {
    async fn create(&self, path: &DfsPath) -> FsResult<bool> {
        let held = self.guard.lock().await;
        self.create_locked(&held, path).await
    }

    async fn delete(&self, path: &DfsPath) -> FsResult<bool> {
        let held = self.guard.lock().await;
        self.delete_locked(&held, path).await
    }

    async fn copy(&self, path: &DfsPath, source: &StorageStub) -> FsResult<bool> {
        let size = source.size(path).await?;

        {
            let held = self.guard.lock().await;
            self.delete_locked(&held, path).await?;
            if !self.create_locked(&held, path).await? {
                return Ok(false);
            }
        }

        // The lock is taken per chunk so reads from the source never run
        // while this node is locked.
        let mut offset = 0u64;
        while offset < size {
            let chunk = (size - offset).min(u64::from(COPY_CHUNK_SIZE)) as u32;
            let data = source.read(path, offset as i64, chunk).await?;
            self.write(path, offset as i64, &data).await?;
            offset += u64::from(chunk);
        }

        debug!(%path, size, from = %source, "copied file");
        Ok(true)
    }
}
