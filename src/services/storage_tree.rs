//! Read-only access to per-project storage trees.
//!
//! Training and processing jobs populate a tree per project:
//!
//! ```text
//! {root}/{project_id}/
//!   models/      trained artifacts, optionally per training job
//!   downloads/   generated scripts and reports
//!   datasets/    processed data files
//! ```
//!
//! The export builder only ever reads from it. "Not found" is reported as
//! an absent value, every other I/O failure is a hard error.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncRead;
use tracing::warn;

use crate::{Error, Result};

/// Streaming reader over one stored file.
pub type StorageReader = Box<dyn AsyncRead + Send + Unpin>;

/// A directory listing item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEntry {
    pub name: String,
    pub is_file: bool,
    pub size: u64,
}

/// Accessor for project storage trees, keyed by `(project_id, subpath)`.
#[async_trait]
pub trait StorageTree: Send + Sync {
    /// Short identifier for logs.
    fn kind(&self) -> &'static str;

    /// Whether `subpath` is an existing regular file.
    async fn exists(&self, project_id: &str, subpath: &str) -> Result<bool>;

    /// List a directory. A missing directory lists as empty.
    async fn list_dir(&self, project_id: &str, subpath: &str) -> Result<Vec<StorageEntry>>;

    /// Open a file for streaming reads.
    async fn open_read(&self, project_id: &str, subpath: &str) -> Result<StorageReader>;

    /// Check that the backing store is reachable.
    async fn health_check(&self) -> Result<()>;
}

/// Storage tree on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalStorageTree {
    root: PathBuf,
}

impl LocalStorageTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a project-relative path, refusing anything that could
    /// escape the project directory.
    fn resolve_path(&self, project_id: &str, subpath: &str) -> Result<PathBuf> {
        if !is_plain_segment(project_id) {
            return Err(Error::InvalidInput(format!(
                "Invalid project id: {}",
                project_id
            )));
        }

        let relative = Path::new(subpath);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(Error::InvalidInput(format!(
                "Invalid storage path: {}",
                subpath
            )));
        }

        Ok(self.root.join(project_id).join(relative))
    }

    fn display_path(project_id: &str, subpath: &str) -> String {
        format!("{}/{}", project_id, subpath)
    }
}

#[async_trait]
impl StorageTree for LocalStorageTree {
    fn kind(&self) -> &'static str {
        "local"
    }

    async fn exists(&self, project_id: &str, subpath: &str) -> Result<bool> {
        let path = self.resolve_path(project_id, subpath)?;

        match fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::storage(Self::display_path(project_id, subpath), e)),
        }
    }

    async fn list_dir(&self, project_id: &str, subpath: &str) -> Result<Vec<StorageEntry>> {
        let path = self.resolve_path(project_id, subpath)?;
        let shown = || Self::display_path(project_id, subpath);

        let mut dir = match fs::read_dir(&path).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(Error::storage(shown(), e)),
        };

        let mut entries = Vec::new();
        while let Some(entry) = dir.next_entry().await.map_err(|e| Error::storage(shown(), e))? {
            // Archive names and later reads go through `&str`, so a name that
            // cannot round-trip is dropped here rather than failing mid-stream
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(raw) => {
                    warn!(
                        dir = %shown(),
                        name = ?raw,
                        "Skipping entry with a non UTF-8 name"
                    );
                    continue;
                }
            };

            // Follow symlinks, like `exists` does
            let meta = match fs::metadata(entry.path()).await {
                Ok(meta) => meta,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    warn!(dir = %shown(), name = %name, "Skipping dangling entry");
                    continue;
                }
                Err(e) => return Err(Error::storage(shown(), e)),
            };

            entries.push(StorageEntry {
                name,
                is_file: meta.is_file(),
                size: meta.len(),
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn open_read(&self, project_id: &str, subpath: &str) -> Result<StorageReader> {
        let path = self.resolve_path(project_id, subpath)?;

        let file = fs::File::open(&path)
            .await
            .map_err(|e| Error::storage(Self::display_path(project_id, subpath), e))?;

        Ok(Box::new(file))
    }

    async fn health_check(&self) -> Result<()> {
        match fs::metadata(&self.root).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(Error::Internal(format!(
                "Storage root is not a directory: {}",
                self.root.display()
            ))),
            Err(e) => Err(Error::storage(self.root.display().to_string(), e)),
        }
    }
}

/// A single path segment with no separators or parent references.
fn is_plain_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment.contains(['/', '\\'])
}
