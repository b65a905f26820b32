//! Content resolver for export package slots.
//!
//! Turns each slot of a bundle plan into concrete archive entries:
//! - Single slots: first existing candidate file, else a generated document
//! - Directory slots: every qualifying file, nothing when there are none
//! - Generated slots: always a generated document
//!
//! Only existence checks and directory listings happen here; file bytes
//! are streamed later by the archive writer.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::models::ArchiveEntry;
use crate::services::bundle_plan::{Slot, SlotStrategy};
use crate::services::storage_tree::StorageTree;
use crate::Result;

/// Outcome of probing a list of candidate paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    Found(String),
    NotFound,
}

/// Service for resolving bundle slots against a project's storage tree.
#[derive(Clone)]
pub struct ContentResolverService {
    storage: Arc<dyn StorageTree>,
}

impl ContentResolverService {
    /// Create a new content resolver service.
    pub fn new(storage: Arc<dyn StorageTree>) -> Self {
        Self { storage }
    }

    /// Probe candidates in order, stopping at the first existing file.
    ///
    /// Absence is an ordinary outcome; any other storage failure aborts.
    pub async fn first_existing(&self, project_id: &str, candidates: &[String]) -> Result<Probe> {
        for candidate in candidates {
            if self.storage.exists(project_id, candidate).await? {
                return Ok(Probe::Found(candidate.clone()));
            }
        }
        Ok(Probe::NotFound)
    }

    /// Resolve one slot to the entries it contributes.
    pub async fn resolve_slot(&self, project_id: &str, slot: &Slot) -> Result<Vec<ArchiveEntry>> {
        match &slot.strategy {
            SlotStrategy::Single {
                candidates,
                fallback,
            } => match self.first_existing(project_id, candidates).await? {
                Probe::Found(source) => {
                    debug!(
                        project_id,
                        archive_name = slot.archive_name,
                        source = %source,
                        "Using stored artifact"
                    );
                    Ok(vec![ArchiveEntry::file(source, slot.archive_name)])
                }
                Probe::NotFound => {
                    debug!(
                        project_id,
                        archive_name = slot.archive_name,
                        document = %fallback,
                        "No stored artifact, generating placeholder"
                    );
                    Ok(vec![ArchiveEntry::buffer(
                        fallback.render(slot.bundle),
                        slot.archive_name,
                    )])
                }
            },

            SlotStrategy::Directory {
                dir,
                extensions,
                archive_dir,
            } => {
                let listing = self.storage.list_dir(project_id, dir).await?;

                let selected: Vec<_> = listing
                    .into_iter()
                    .filter(|item| item.is_file && has_allowed_extension(&item.name, extensions))
                    .collect();
                let total_bytes: u64 = selected.iter().map(|item| item.size).sum();

                let entries: Vec<ArchiveEntry> = selected
                    .into_iter()
                    .map(|item| {
                        ArchiveEntry::file(
                            format!("{}/{}", dir, item.name),
                            format!("{}/{}", archive_dir, item.name),
                        )
                    })
                    .collect();

                if entries.is_empty() {
                    warn!(project_id, dir = %dir, "No qualifying files for directory slot");
                } else {
                    debug!(
                        project_id,
                        dir = %dir,
                        files = entries.len(),
                        bytes = total_bytes,
                        "Collected directory slot"
                    );
                }
                Ok(entries)
            }

            SlotStrategy::Generated(doc) => Ok(vec![ArchiveEntry::buffer(
                doc.render(slot.bundle),
                slot.archive_name,
            )]),
        }
    }

    /// Resolve every slot in order.
    pub async fn resolve_slots(&self, project_id: &str, slots: &[Slot]) -> Result<Vec<ArchiveEntry>> {
        let mut entries = Vec::with_capacity(slots.len());

        for slot in slots {
            entries.extend(self.resolve_slot(project_id, slot).await?);
        }

        Ok(entries)
    }
}

/// Case-insensitive extension check.
fn has_allowed_extension(name: &str, extensions: &[&str]) -> bool {
    std::path::Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}
