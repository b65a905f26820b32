//! Service layer for modelkit.
//!
//! - StorageTree (read-only view of per-project artifact trees)
//! - BundlePlan (which slots each bundle type carries)
//! - ContentResolver (slot -> concrete archive entries)
//! - Synthetic (generated documents for missing artifacts)
//! - ArchiveWriter (streaming ZIP encoder with back-pressure)
//! - Export (lifecycle orchestration and counters)

pub mod archive_writer;
pub mod bundle_plan;
mod content_resolver;
mod export;
pub mod storage_tree;
pub mod synthetic;

pub use archive_writer::{ArchiveSink, ArchiveStream, ArchiveSummary, ArchiveWriter};
pub use bundle_plan::{BundlePlan, Slot, SlotStrategy};
pub use content_resolver::{ContentResolverService, Probe};
pub use export::{
    ExportOutcome, ExportService, ExportStats, ExportStatsSnapshot, ExportStream, PreparedExport,
};
pub use storage_tree::{LocalStorageTree, StorageEntry, StorageReader, StorageTree};
pub use synthetic::SyntheticDoc;
