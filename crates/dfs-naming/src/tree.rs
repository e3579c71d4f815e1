//! The naming service's directory tree.

use std::collections::BTreeMap;

use dfs_types::{CommandStub, DfsPath, FsError, FsResult, StorageStub};

/// The two stubs a storage node registers with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeHandle {
    pub storage: StorageStub,
    pub command: CommandStub,
}

/// Where a file lives and how hot it is.
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// Node holding the authoritative bytes.
    pub primary: NodeHandle,
    /// Nodes holding read-only copies, in the order they were added.
    pub replicas: Vec<NodeHandle>,
    /// Nodes a replica copy is currently being made on.
    pub copying: Vec<NodeHandle>,
    /// Shared locks taken on the file since it was last written.
    pub reads: u64,
}

impl FileEntry {
    pub fn new(primary: NodeHandle) -> Self {
        Self {
            primary,
            replicas: Vec::new(),
            copying: Vec::new(),
            reads: 0,
        }
    }

    /// Whether `node` already holds this file, as primary or replica.
    pub fn is_hosted_by(&self, node: &NodeHandle) -> bool {
        self.primary.storage == node.storage
            || self.replicas.iter().any(|r| r.storage == node.storage)
    }

    /// Primary first, then replicas.
    pub fn hosts(&self) -> impl Iterator<Item = &NodeHandle> {
        std::iter::once(&self.primary).chain(&self.replicas)
    }
}

#[derive(Debug, Clone)]
pub enum Node {
    Directory(BTreeMap<String, Node>),
    File(FileEntry),
}

impl Node {
    pub fn empty_directory() -> Self {
        Node::Directory(BTreeMap::new())
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, Node::Directory(_))
    }
}

/// Directory tree rooted at an always-present root directory.
#[derive(Debug)]
pub struct Tree {
    root: Node,
}

impl Default for Tree {
    fn default() -> Self {
        Self {
            root: Node::empty_directory(),
        }
    }
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a path. A missing component is not-found; passing through a
    /// file is not-a-directory.
    pub fn get(&self, path: &DfsPath) -> FsResult<&Node> {
        let mut node = &self.root;
        for name in path.components() {
            node = match node {
                Node::Directory(children) => {
                    children.get(name).ok_or_else(|| FsError::not_found(path))?
                }
                Node::File(_) => return Err(FsError::not_a_directory(path)),
            };
        }
        Ok(node)
    }

    fn get_mut(&mut self, path: &DfsPath) -> FsResult<&mut Node> {
        let mut node = &mut self.root;
        for name in path.components() {
            node = match node {
                Node::Directory(children) => {
                    children.get_mut(name).ok_or_else(|| FsError::not_found(path))?
                }
                Node::File(_) => return Err(FsError::not_a_directory(path)),
            };
        }
        Ok(node)
    }

    pub fn exists(&self, path: &DfsPath) -> bool {
        self.get(path).is_ok()
    }

    /// Children of a directory. A file is not-found here.
    pub fn directory(&self, path: &DfsPath) -> FsResult<&BTreeMap<String, Node>> {
        match self.get(path)? {
            Node::Directory(children) => Ok(children),
            Node::File(_) => Err(FsError::not_found(path)),
        }
    }

    /// A file's entry. A directory is not-found here.
    pub fn file(&self, path: &DfsPath) -> FsResult<&FileEntry> {
        match self.get(path)? {
            Node::File(entry) => Ok(entry),
            Node::Directory(_) => Err(FsError::not_found(path)),
        }
    }

    pub fn file_mut(&mut self, path: &DfsPath) -> FsResult<&mut FileEntry> {
        match self.get_mut(path)? {
            Node::File(entry) => Ok(entry),
            Node::Directory(_) => Err(FsError::not_found(path)),
        }
    }

    /// Check that `path` could be created: its parent is an existing
    /// directory. Returns `false` if `path` itself already exists.
    pub fn can_create(&self, path: &DfsPath) -> FsResult<bool> {
        let Some(parent) = path.parent() else {
            return Ok(false);
        };
        match self.get(&parent)? {
            Node::Directory(children) => {
                Ok(!path.last().is_some_and(|name| children.contains_key(name)))
            }
            Node::File(_) => Err(FsError::not_a_directory(&parent)),
        }
    }

    /// Insert a node under an existing parent directory. `false` if the path
    /// already exists.
    pub fn insert(&mut self, path: &DfsPath, node: Node) -> FsResult<bool> {
        if !self.can_create(path)? {
            return Ok(false);
        }
        let (Some(parent), Some(name)) = (path.parent(), path.last()) else {
            return Ok(false);
        };
        match self.get_mut(&parent)? {
            Node::Directory(children) => {
                children.insert(name.to_string(), node);
                Ok(true)
            }
            Node::File(_) => Err(FsError::not_a_directory(&parent)),
        }
    }

    /// Insert a registered file, creating missing directories on the way.
    /// `false`, leaving the tree unchanged, when the path already exists or
    /// runs through a file.
    pub fn insert_registered(&mut self, path: &DfsPath, entry: FileEntry) -> bool {
        let Some(name) = path.last() else {
            return false;
        };
        let Some(parent) = path.parent() else {
            return false;
        };

        // Check first so a collision never leaves half-built directories.
        let mut node = &self.root;
        for component in parent.components() {
            match node {
                Node::Directory(children) => match children.get(component) {
                    Some(child) => node = child,
                    None => break,
                },
                Node::File(_) => return false,
            }
        }
        if self.exists(path) || matches!(node, Node::File(_)) {
            return false;
        }

        let mut node = &mut self.root;
        for component in parent.components() {
            let Node::Directory(children) = node else {
                return false;
            };
            node = children
                .entry(component.to_string())
                .or_insert_with(Node::empty_directory);
        }
        match node {
            Node::Directory(children) => {
                children.insert(name.to_string(), Node::File(entry));
                true
            }
            Node::File(_) => false,
        }
    }

    /// Detach a node from its parent. The root is never removed.
    pub fn remove(&mut self, path: &DfsPath) -> Option<Node> {
        let parent = path.parent()?;
        let name = path.last()?;
        match self.get_mut(&parent).ok()? {
            Node::Directory(children) => children.remove(name),
            Node::File(_) => None,
        }
    }

    /// Every file at or below `path`, depth first.
    pub fn files_under(&self, path: &DfsPath) -> FsResult<Vec<(DfsPath, FileEntry)>> {
        let mut files = Vec::new();
        let mut pending = vec![(path.clone(), self.get(path)?)];
        while let Some((at, node)) = pending.pop() {
            match node {
                Node::File(entry) => files.push((at, entry.clone())),
                Node::Directory(children) => {
                    for (name, child) in children.iter().rev() {
                        pending.push((at.child(name)?, child));
                    }
                }
            }
        }
        Ok(files)
    }
}
