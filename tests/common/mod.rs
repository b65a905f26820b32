//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use axum_test::TestServer;
use modelkit::api;
use modelkit::config::ExportConfig;
use modelkit::services::{LocalStorageTree, StorageEntry, StorageReader, StorageTree};
use modelkit::{AppState, Error, Result};
use tempfile::TempDir;

/// A temporary storage root holding one or more project trees.
pub struct Fixture {
    pub root: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            root: tempfile::tempdir().expect("Failed to create storage root"),
        }
    }

    /// Write `content` at `{root}/{project}/{path}`, creating directories.
    pub fn write(&self, project: &str, path: &str, content: impl AsRef<[u8]>) -> &Self {
        let full = self.root.path().join(project).join(path);
        std::fs::create_dir_all(full.parent().expect("file has a parent"))
            .expect("Failed to create fixture directory");
        std::fs::write(full, content).expect("Failed to write fixture file");
        self
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }

    pub fn state(&self) -> AppState {
        AppState::with_storage(
            Arc::new(LocalStorageTree::new(self.root.path())),
            test_export_config(),
        )
    }

    pub fn server(&self) -> (TestServer, AppState) {
        server_with(Arc::new(LocalStorageTree::new(self.root.path())))
    }
}

/// Storage tree whose every lookup fails with permission denied.
pub struct DeniedStorage;

fn denied(project_id: &str, subpath: &str) -> Error {
    Error::storage(
        format!("{}/{}", project_id, subpath),
        std::io::Error::from(std::io::ErrorKind::PermissionDenied),
    )
}

#[async_trait]
impl StorageTree for DeniedStorage {
    fn kind(&self) -> &'static str {
        "denied"
    }

    async fn exists(&self, project_id: &str, subpath: &str) -> Result<bool> {
        Err(denied(project_id, subpath))
    }

    async fn list_dir(&self, project_id: &str, subpath: &str) -> Result<Vec<StorageEntry>> {
        Err(denied(project_id, subpath))
    }

    async fn open_read(&self, project_id: &str, subpath: &str) -> Result<StorageReader> {
        Err(denied(project_id, subpath))
    }

    async fn health_check(&self) -> Result<()> {
        Err(denied("", ""))
    }
}

/// Test server over an arbitrary storage tree.
pub fn server_with(storage: Arc<dyn StorageTree>) -> (TestServer, AppState) {
    let state = AppState::with_storage(storage, test_export_config());
    let app = api::routes().with_state(state.clone());
    let server = TestServer::new(app).expect("Failed to create test server");
    (server, state)
}

/// Small chunks and a tight channel so tests exercise back-pressure.
pub fn test_export_config() -> ExportConfig {
    ExportConfig {
        compression_level: 6,
        chunk_size: 4096,
        channel_capacity: 2,
    }
}

/// Entry names of an archive, in central directory order.
pub fn entry_names(archive: &[u8]) -> Vec<String> {
    let mut zip = zip::ZipArchive::new(Cursor::new(archive)).expect("valid zip archive");
    (0..zip.len())
        .map(|i| zip.by_index(i).expect("readable entry").name().to_string())
        .collect()
}

/// Decompressed content of one archive entry.
pub fn read_entry(archive: &[u8], name: &str) -> Vec<u8> {
    let mut zip = zip::ZipArchive::new(Cursor::new(archive)).expect("valid zip archive");
    let mut file = zip
        .by_name(name)
        .unwrap_or_else(|_| panic!("archive has no entry {}", name));
    let mut content = Vec::new();
    file.read_to_end(&mut content).expect("readable entry");
    content
}

pub fn read_entry_string(archive: &[u8], name: &str) -> String {
    String::from_utf8(read_entry(archive, name)).expect("utf-8 entry")
}
