//! Distributed file-system paths.
//!
//! A [`DfsPath`] is an immutable sequence of components. The root is the
//! empty sequence and prints as `/`. Paths are totally ordered
//! lexicographically by component, so an ancestor always sorts before its
//! descendants; locking several paths in ascending order cannot deadlock.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{FsError, FsResult};

/// Component separator.
pub const SEPARATOR: char = '/';

/// Reserved character, never valid inside a path.
pub const DELIMITER: char = ':';

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DfsPath {
    components: Vec<String>,
}

impl DfsPath {
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse an absolute path string. Repeated and trailing separators are
    /// ignored, so `//a//b/` is `/a/b`.
    pub fn parse(s: &str) -> FsResult<Self> {
        if !s.starts_with(SEPARATOR) {
            return Err(FsError::invalid_path(format!("{s:?} is not absolute")));
        }
        if s.contains(DELIMITER) {
            return Err(FsError::invalid_path(format!("{s:?} contains '{DELIMITER}'")));
        }

        let components = s
            .split(SEPARATOR)
            .filter(|c| !c.is_empty())
            .map(|c| check_component(c).map(|()| c.to_string()))
            .collect::<FsResult<Vec<_>>>()?;
        Ok(Self { components })
    }

    /// This path extended by one component.
    pub fn child(&self, component: &str) -> FsResult<Self> {
        if component.is_empty() {
            return Err(FsError::invalid_path("empty component"));
        }
        if component.contains(SEPARATOR) || component.contains(DELIMITER) {
            return Err(FsError::invalid_path(format!(
                "component {component:?} contains a reserved character"
            )));
        }
        check_component(component)?;

        let mut components = self.components.clone();
        components.push(component.to_string());
        Ok(Self { components })
    }

    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    /// Parent directory; `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        let (_, init) = self.components.split_last()?;
        Some(Self {
            components: init.to_vec(),
        })
    }

    /// Final component; `None` for the root.
    pub fn last(&self) -> Option<&str> {
        self.components.last().map(String::as_str)
    }

    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.components.iter().map(String::as_str)
    }

    /// Number of components (0 for the root).
    pub fn depth(&self) -> usize {
        self.components.len()
    }

    /// Every proper ancestor, root first.
    pub fn ancestors(&self) -> impl Iterator<Item = DfsPath> + '_ {
        (0..self.components.len()).map(|n| Self {
            components: self.components[..n].to_vec(),
        })
    }

    /// True when `other` is a prefix of `self`. Every path is a subpath of
    /// itself and of the root.
    pub fn is_subpath(&self, other: &DfsPath) -> bool {
        self.components.starts_with(&other.components)
    }

    /// The local file this path names under a storage root.
    pub fn to_local(&self, root: &Path) -> PathBuf {
        let mut local = root.to_path_buf();
        local.extend(&self.components);
        local
    }

    /// List every regular file under a local directory, as paths relative to
    /// it, sorted.
    ///
    /// Entries whose names are not valid path components (non UTF-8, or
    /// containing the reserved delimiter) are skipped with a warning.
    pub async fn scan(root: &Path) -> FsResult<Vec<DfsPath>> {
        let meta = tokio::fs::metadata(root)
            .await
            .map_err(|_| FsError::not_found(root.display()))?;
        if !meta.is_dir() {
            return Err(FsError::not_a_directory(root.display()));
        }

        let mut files = Vec::new();
        let mut pending = vec![(root.to_path_buf(), DfsPath::root())];
        while let Some((dir, prefix)) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name();
                let child = match name.to_str().map(|n| prefix.child(n)) {
                    Some(Ok(child)) => child,
                    _ => {
                        warn!(entry = %entry.path().display(), "skipping unrepresentable file name");
                        continue;
                    }
                };

                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push((entry.path(), child));
                } else if file_type.is_file() {
                    files.push(child);
                }
            }
        }

        files.sort();
        Ok(files)
    }
}

fn check_component(component: &str) -> FsResult<()> {
    if component == "." || component == ".." {
        return Err(FsError::invalid_path(format!(
            "component {component:?} is not allowed"
        )));
    }
    Ok(())
}

impl fmt::Display for DfsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.components.is_empty() {
            return write!(f, "{SEPARATOR}");
        }
        for component in &self.components {
            write!(f, "{SEPARATOR}{component}")?;
        }
        Ok(())
    }
}

impl FromStr for DfsPath {
    type Err = FsError;

    fn from_str(s: &str) -> FsResult<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DfsPath {
    type Error = FsError;

    fn try_from(s: String) -> FsResult<Self> {
        Self::parse(&s)
    }
}

impl From<DfsPath> for String {
    fn from(path: DfsPath) -> String {
        path.to_string()
    }
}
