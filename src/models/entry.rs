//! Archive entries and export lifecycle phases.

use serde::Serialize;

/// One named unit of content queued for the output archive.
///
/// File entries reference a path inside the project's storage tree and are
/// streamed when written; buffer entries carry their content already.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveEntry {
    File {
        /// Path relative to the project root in the storage tree.
        source: String,
        archive_name: String,
    },
    Buffer {
        content: Vec<u8>,
        archive_name: String,
    },
}

impl ArchiveEntry {
    pub fn file(source: impl Into<String>, archive_name: impl Into<String>) -> Self {
        Self::File {
            source: source.into(),
            archive_name: archive_name.into(),
        }
    }

    pub fn buffer(content: impl Into<Vec<u8>>, archive_name: impl Into<String>) -> Self {
        Self::Buffer {
            content: content.into(),
            archive_name: archive_name.into(),
        }
    }

    pub fn archive_name(&self) -> &str {
        match self {
            ArchiveEntry::File { archive_name, .. } | ArchiveEntry::Buffer { archive_name, .. } => {
                archive_name
            }
        }
    }

    pub fn is_synthetic(&self) -> bool {
        matches!(self, ArchiveEntry::Buffer { .. })
    }
}

/// Lifecycle of one export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportPhase {
    /// Resolving the bundle plan; a structured error is still possible
    Pending,
    /// Headers sent, entries being written
    Streaming,
    /// All entries queued, trailing metadata being written
    Finalizing,
    Done,
    Failed,
}

impl ExportPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportPhase::Pending => "pending",
            ExportPhase::Streaming => "streaming",
            ExportPhase::Finalizing => "finalizing",
            ExportPhase::Done => "done",
            ExportPhase::Failed => "failed",
        }
    }

    /// Whether being in this phase implies the response headers are on the wire.
    /// `Failed` says nothing on its own; callers check the phase it failed from.
    pub fn headers_sent(&self) -> bool {
        matches!(
            self,
            ExportPhase::Streaming | ExportPhase::Finalizing | ExportPhase::Done
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExportPhase::Done | ExportPhase::Failed)
    }
}

impl std::fmt::Display for ExportPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
