//! Integration tests for storage nodes over loopback RPC.
//!
//! A recording registration service stands in for the naming server.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;

use dfs_rpc::RpcServer;
use dfs_storage::StorageNode;
use dfs_types::constants::MAX_READ_LEN;
use dfs_types::{
    Command, CommandStub, DfsPath, FsError, FsResult, Registration, RegistrationSkeleton,
    RegistrationStub, Storage, StorageStub,
};

fn p(s: &str) -> DfsPath {
    DfsPath::parse(s).unwrap()
}

/// Accepts every registration and reports a fixed set of duplicates.
#[derive(Default)]
struct FakeNaming {
    duplicates: Vec<DfsPath>,
    seen: Mutex<Vec<(StorageStub, CommandStub, Vec<DfsPath>)>>,
}

#[async_trait]
impl Registration for FakeNaming {
    async fn register(
        &self,
        storage: &StorageStub,
        command: &CommandStub,
        files: &[DfsPath],
    ) -> FsResult<Vec<DfsPath>> {
        let mut seen = self.seen.lock();
        if seen.iter().any(|(s, _, _)| s == storage) {
            return Err(FsError::AlreadyRegistered(storage.to_string()));
        }
        seen.push((storage.clone(), command.clone(), files.to_vec()));
        Ok(self
            .duplicates
            .iter()
            .filter(|d| files.contains(d))
            .cloned()
            .collect())
    }
}

async fn start_naming(
    duplicates: Vec<DfsPath>,
) -> (Arc<FakeNaming>, RpcServer<RegistrationSkeleton<FakeNaming>>, RegistrationStub) {
    let naming = Arc::new(FakeNaming {
        duplicates,
        ..Default::default()
    });
    let server = RpcServer::new(RegistrationSkeleton::new(Arc::clone(&naming)), None).unwrap();
    server.start().await.unwrap();
    let stub = RegistrationStub::for_server(&server).unwrap();
    (naming, server, stub)
}

async fn start_node(dir: &TempDir, naming: &RegistrationStub) -> StorageNode {
    let node = StorageNode::new(dir.path(), None, None).unwrap();
    node.start("127.0.0.1", naming).await.unwrap();
    node
}

#[tokio::test]
async fn test_start_registers_local_files() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("a/b")).unwrap();
    std::fs::write(dir.path().join("a/b/c"), b"abc").unwrap();
    std::fs::write(dir.path().join("top"), b"t").unwrap();
    let (naming, server, stub) = start_naming(vec![]).await;

    let node = start_node(&dir, &stub).await;

    let seen = naming.seen.lock().clone();
    assert_eq!(seen.len(), 1);
    let (storage, command, files) = &seen[0];
    assert_eq!(files, &vec![p("/a/b/c"), p("/top")]);
    assert_eq!(Some(storage.clone()), node.storage_stub());
    assert_eq!(Some(command.clone()), node.command_stub());

    // The registered stub reaches the node's data plane.
    assert_eq!(storage.size(&p("/a/b/c")).await.unwrap(), 3);
    assert_eq!(storage.read(&p("/a/b/c"), 0, 3).await.unwrap(), b"abc");

    node.stop().await;
    server.stop().await;
}

#[tokio::test]
async fn test_duplicates_deleted_and_pruned() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("x/y")).unwrap();
    std::fs::write(dir.path().join("x/y/dup"), b"old").unwrap();
    std::fs::write(dir.path().join("mine"), b"keep").unwrap();
    let (_naming, server, stub) = start_naming(vec![p("/x/y/dup")]).await;

    let node = start_node(&dir, &stub).await;

    assert!(!dir.path().join("x").exists());
    assert!(dir.path().join("mine").exists());
    assert_eq!(node.store().files().await.unwrap(), vec![p("/mine")]);

    node.stop().await;
    server.stop().await;
}

#[tokio::test]
async fn test_start_on_missing_root_fails() {
    let dir = TempDir::new().unwrap();
    let (_naming, server, stub) = start_naming(vec![]).await;

    let node = StorageNode::new(dir.path().join("absent"), None, None).unwrap();
    let err = node.start("127.0.0.1", &stub).await.unwrap_err();
    assert!(err.is_not_found());
    assert!(node.storage_stub().is_none());

    server.stop().await;
}

#[tokio::test]
async fn test_rejected_registration_stops_listeners() {
    let dir = TempDir::new().unwrap();
    let (_naming, server, stub) = start_naming(vec![]).await;
    let node = StorageNode::new(dir.path(), None, None).unwrap();

    // Naming service gone: registration fails with a transport error.
    server.stop().await;
    let err = node.start("127.0.0.1", &stub).await.unwrap_err();
    assert!(matches!(err, FsError::Rpc(_)), "got {err:?}");
    assert!(node.storage_stub().is_none());
}

#[tokio::test]
async fn test_stop_hook_fires_once_for_both_listeners() {
    let dir = TempDir::new().unwrap();
    let (_naming, server, stub) = start_naming(vec![]).await;
    let node = start_node(&dir, &stub).await;

    let fired = Arc::new(AtomicUsize::new(0));
    {
        let fired = Arc::clone(&fired);
        node.on_stopped(move |cause| {
            assert!(cause.is_none());
            fired.fetch_add(1, Ordering::SeqCst);
        });
    }

    node.stop().await;
    node.stop().await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    server.stop().await;
}

#[tokio::test]
async fn test_control_plane_create_write_delete() {
    let dir = TempDir::new().unwrap();
    let (_naming, server, stub) = start_naming(vec![]).await;
    let node = start_node(&dir, &stub).await;
    let command = node.command_stub().unwrap();
    let storage = node.storage_stub().unwrap();

    assert!(command.create(&p("/docs/readme")).await.unwrap());
    assert!(!command.create(&p("/docs/readme")).await.unwrap());

    storage.write(&p("/docs/readme"), 0, b"ab").await.unwrap();
    storage.write(&p("/docs/readme"), 2, b"foo").await.unwrap();
    assert_eq!(storage.read(&p("/docs/readme"), 0, 5).await.unwrap(), b"abfoo");

    let err = storage.read(&p("/docs/readme"), 3, 10).await.unwrap_err();
    assert!(matches!(err, FsError::OutOfBounds(_)));

    assert!(command.delete(&p("/docs")).await.unwrap());
    assert!(!command.delete(&DfsPath::root()).await.unwrap());
    let err = storage.size(&p("/docs/readme")).await.unwrap_err();
    assert!(err.is_not_found());

    node.stop().await;
    server.stop().await;
}

#[tokio::test]
async fn test_copy_between_nodes() {
    let source_dir = TempDir::new().unwrap();
    let target_dir = TempDir::new().unwrap();
    std::fs::create_dir_all(source_dir.path().join("data")).unwrap();
    // Larger than one copy chunk so the transfer takes several round trips.
    let content: Vec<u8> = (0..(2 * 1024 * 1024 + 17)).map(|i| (i % 251) as u8).collect();
    std::fs::write(source_dir.path().join("data/blob"), &content).unwrap();
    std::fs::create_dir_all(target_dir.path().join("data")).unwrap();
    std::fs::write(target_dir.path().join("data/blob"), b"stale and longer?").unwrap();

    let (_naming, server, stub) = start_naming(vec![]).await;
    let source = start_node(&source_dir, &stub).await;
    let target = start_node(&target_dir, &stub).await;

    let copied = target
        .command_stub()
        .unwrap()
        .copy(&p("/data/blob"), &source.storage_stub().unwrap())
        .await
        .unwrap();
    assert!(copied);
    assert_eq!(std::fs::read(target_dir.path().join("data/blob")).unwrap(), content);

    // Copying an empty file leaves an empty file.
    source.command_stub().unwrap().create(&p("/empty")).await.unwrap();
    assert!(
        target
            .command_stub()
            .unwrap()
            .copy(&p("/empty"), &source.storage_stub().unwrap())
            .await
            .unwrap()
    );
    assert_eq!(std::fs::read(target_dir.path().join("empty")).unwrap(), b"");

    // Copying a file the source does not have fails not-found.
    let err = target
        .command_stub()
        .unwrap()
        .copy(&p("/nope"), &source.storage_stub().unwrap())
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    source.stop().await;
    target.stop().await;
    server.stop().await;
}

#[tokio::test]
async fn test_oversized_read_over_rpc_is_out_of_bounds() {
    let dir = TempDir::new().unwrap();
    let len = u64::from(MAX_READ_LEN) + 1024 * 1024;
    std::fs::File::create(dir.path().join("big"))
        .unwrap()
        .set_len(len)
        .unwrap();
    let (_naming, server, stub) = start_naming(vec![]).await;
    let node = start_node(&dir, &stub).await;
    let storage = node.storage_stub().unwrap();

    assert_eq!(storage.size(&p("/big")).await.unwrap(), len);
    let err = storage.read(&p("/big"), 0, len as u32).await.unwrap_err();
    assert!(matches!(err, FsError::OutOfBounds(_)), "got {err:?}");

    // The largest allowed read still fits in one response.
    let data = storage.read(&p("/big"), 0, MAX_READ_LEN).await.unwrap();
    assert_eq!(data.len(), MAX_READ_LEN as usize);

    node.stop().await;
    server.stop().await;
}
