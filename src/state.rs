//! Application state for modelkit.
//!
//! Contains the shared state that is passed to all handlers.

use std::sync::Arc;

use crate::config::{self, ExportConfig};
use crate::services::{ExportService, LocalStorageTree, StorageTree};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Per-project artifact storage.
    pub storage: Arc<dyn StorageTree>,
    /// Export package builder.
    pub exports: ExportService,
}

impl AppState {
    /// Create application state from the global configuration.
    pub fn new() -> Self {
        let config = config::config();
        let storage: Arc<dyn StorageTree> = Arc::new(LocalStorageTree::new(&config.storage.root));

        tracing::info!(
            root = %config.storage.root.display(),
            backend = storage.kind(),
            "Storage tree ready"
        );

        Self::with_storage(storage, config.export.clone())
    }

    /// Build state around an explicit storage tree.
    pub fn with_storage(storage: Arc<dyn StorageTree>, export: ExportConfig) -> Self {
        let exports = ExportService::new(storage.clone(), export);
        Self { storage, exports }
    }
}
