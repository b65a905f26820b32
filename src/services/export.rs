//! Export package assembly.
//!
//! One export runs through `Pending -> Streaming -> Finalizing -> Done`,
//! or ends in `Failed`. Everything that can fail cleanly happens while
//! `Pending`: the bundle plan is resolved to concrete entries (existence
//! probes and directory listings only) before any response header is
//! produced, so storage errors still become structured JSON errors.
//!
//! Once streaming has begun, failures can only be logged and signalled by
//! breaking the body stream; the client sees a truncated archive.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::ExportConfig;
use crate::models::{self, ArchiveEntry, ExportPhase, ExportRequest};
use crate::services::archive_writer::{ArchiveSink, ArchiveStream, ArchiveWriter};
use crate::services::bundle_plan::BundlePlan;
use crate::services::content_resolver::ContentResolverService;
use crate::services::storage_tree::StorageTree;
use crate::{Error, Result};

/// Process-wide export counters.
#[derive(Debug, Default)]
pub struct ExportStats {
    started: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    aborted: AtomicU64,
    bytes_sent: AtomicU64,
}

/// Point-in-time copy of [`ExportStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExportStatsSnapshot {
    pub started: u64,
    pub completed: u64,
    pub failed: u64,
    pub aborted: u64,
    pub bytes_sent: u64,
}

impl ExportStats {
    pub fn snapshot(&self) -> ExportStatsSnapshot {
        ExportStatsSnapshot {
            started: self.started.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            aborted: self.aborted.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
        }
    }
}

/// A request whose plan has been resolved; nothing has been sent yet.
#[derive(Debug, Clone)]
pub struct PreparedExport {
    pub export_id: String,
    pub request: ExportRequest,
    pub plan: BundlePlan,
    pub entries: Vec<ArchiveEntry>,
    /// Download name for the Content-Disposition header.
    pub file_name: String,
}

/// How a streamed export ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOutcome {
    pub phase: ExportPhase,
    /// Phase the export was in when it failed, if it did.
    pub failed_in: Option<ExportPhase>,
    pub entries_written: usize,
    pub bytes_sent: u64,
    pub error: Option<String>,
    /// The client went away before the archive was complete.
    pub client_aborted: bool,
}

/// A started export: headers can be sent and the body consumed.
pub struct ExportStream {
    pub export_id: String,
    pub file_name: String,
    pub stream: ArchiveStream,
    pub task: JoinHandle<ExportOutcome>,
}

/// Tracks the lifecycle of a single export.
#[derive(Debug)]
struct Lifecycle {
    export_id: String,
    phase: ExportPhase,
}

impl Lifecycle {
    fn new(export_id: &str) -> Self {
        Self {
            export_id: export_id.to_string(),
            phase: ExportPhase::Pending,
        }
    }

    fn advance(&mut self, next: ExportPhase) {
        let allowed = matches!(
            (self.phase, next),
            (ExportPhase::Pending, ExportPhase::Streaming)
                | (ExportPhase::Streaming, ExportPhase::Finalizing)
                | (ExportPhase::Finalizing, ExportPhase::Done)
        ) || (next == ExportPhase::Failed && !self.phase.is_terminal());

        if !allowed {
            warn!(
                export_id = %self.export_id,
                from = %self.phase,
                to = %next,
                "Ignoring invalid export phase transition"
            );
            return;
        }

        debug!(export_id = %self.export_id, from = %self.phase, to = %next, "Export phase");
        self.phase = next;
    }
}

/// Export package builder: bundle policy plus orchestration.
#[derive(Clone)]
pub struct ExportService {
    storage: Arc<dyn StorageTree>,
    resolver: ContentResolverService,
    config: ExportConfig,
    stats: Arc<ExportStats>,
}

impl ExportService {
    /// Create a new export service reading from `storage`.
    pub fn new(storage: Arc<dyn StorageTree>, config: ExportConfig) -> Self {
        let resolver = ContentResolverService::new(storage.clone());
        Self {
            storage,
            resolver,
            config,
            stats: Arc::new(ExportStats::default()),
        }
    }

    pub fn stats(&self) -> ExportStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn storage(&self) -> &Arc<dyn StorageTree> {
        &self.storage
    }

    /// Resolve the bundle plan for `request` into concrete entries.
    ///
    /// This is the `Pending` phase; errors here happen before any byte is
    /// sent and can be reported as structured responses.
    pub async fn prepare(&self, request: ExportRequest) -> Result<PreparedExport> {
        let export_id = models::new_id();
        let plan = BundlePlan::for_request(&request);

        debug!(
            export_id = %export_id,
            project_id = %request.project_id,
            bundle_type = %plan.bundle,
            slots = ?plan.archive_names(),
            "Resolving bundle plan"
        );

        let entries = match self
            .resolver
            .resolve_slots(&request.project_id, &plan.slots)
            .await
        {
            Ok(entries) => entries,
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                error!(
                    export_id = %export_id,
                    project_id = %request.project_id,
                    bundle_type = %request.bundle_type,
                    error = %e,
                    "Export failed before streaming"
                );
                return Err(e);
            }
        };

        let file_name = request.archive_file_name(models::now());

        Ok(PreparedExport {
            export_id,
            request,
            plan,
            entries,
            file_name,
        })
    }

    /// Prepare `request` and start streaming it on a background task.
    pub async fn start(&self, request: ExportRequest) -> Result<ExportStream> {
        let prepared = self.prepare(request).await?;
        let (sink, stream) = ArchiveSink::channel(self.config.channel_capacity);

        let span = info_span!(
            "export",
            export_id = %prepared.export_id,
            project_id = %prepared.request.project_id,
            bundle_type = %prepared.request.bundle_type,
        );

        let export_id = prepared.export_id.clone();
        let file_name = prepared.file_name.clone();
        let service = self.clone();
        let task = tokio::spawn(async move { service.stream(prepared, sink).await }.instrument(span));

        Ok(ExportStream {
            export_id,
            file_name,
            stream,
            task,
        })
    }

    /// Write every prepared entry into `sink` and finalize the archive.
    ///
    /// Never panics or returns an error: the outcome records how the
    /// export ended and the body stream carries the failure to the client.
    pub async fn stream(&self, prepared: PreparedExport, sink: ArchiveSink) -> ExportOutcome {
        let mut lifecycle = Lifecycle::new(&prepared.export_id);
        self.stats.started.fetch_add(1, Ordering::Relaxed);

        lifecycle.advance(ExportPhase::Streaming);
        info!(
            entries = prepared.entries.len(),
            file_name = %prepared.file_name,
            "Streaming export package"
        );

        let mut writer = ArchiveWriter::open(
            sink.clone(),
            self.config.compression_level,
            self.config.chunk_size,
        );

        // On failure, keep how far the writer got
        let result = match self.write_entries(&prepared, &mut writer, &sink).await {
            Ok(()) => {
                lifecycle.advance(ExportPhase::Finalizing);
                let progress = writer.progress();
                writer.finalize().await.map_err(|e| (e, progress))
            }
            Err(e) => Err((e, writer.progress())),
        };

        match result {
            Ok(summary) => {
                lifecycle.advance(ExportPhase::Done);
                self.stats.completed.fetch_add(1, Ordering::Relaxed);
                self.stats
                    .bytes_sent
                    .fetch_add(summary.bytes_sent, Ordering::Relaxed);
                info!(
                    entries = summary.entries,
                    bytes = summary.bytes_sent,
                    "Export package complete"
                );

                ExportOutcome {
                    phase: lifecycle.phase,
                    failed_in: None,
                    entries_written: summary.entries,
                    bytes_sent: summary.bytes_sent,
                    error: None,
                    client_aborted: false,
                }
            }
            Err((e, progress)) => {
                let failed_in = lifecycle.phase;
                lifecycle.advance(ExportPhase::Failed);
                self.stats
                    .bytes_sent
                    .fetch_add(progress.bytes_sent, Ordering::Relaxed);

                let client_aborted = matches!(e, Error::SinkClosed);
                if client_aborted {
                    self.stats.aborted.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        phase = %failed_in,
                        entries = progress.entries,
                        bytes = progress.bytes_sent,
                        "Export aborted: client closed the connection"
                    );
                } else {
                    self.stats.failed.fetch_add(1, Ordering::Relaxed);
                    // Headers are already out, so the only signal left is a broken body
                    error!(
                        phase = %failed_in,
                        headers_sent = failed_in.headers_sent(),
                        entries = progress.entries,
                        bytes = progress.bytes_sent,
                        error = %e,
                        "Export failed while streaming"
                    );
                    sink.fail(e.to_string()).await;
                }

                ExportOutcome {
                    phase: lifecycle.phase,
                    failed_in: Some(failed_in),
                    entries_written: progress.entries,
                    bytes_sent: progress.bytes_sent,
                    error: Some(e.to_string()),
                    client_aborted,
                }
            }
        }
    }

    /// Append entries strictly in plan order.
    async fn write_entries(
        &self,
        prepared: &PreparedExport,
        writer: &mut ArchiveWriter,
        sink: &ArchiveSink,
    ) -> Result<()> {
        let project_id = &prepared.request.project_id;

        for entry in &prepared.entries {
            if sink.is_closed() {
                return Err(Error::SinkClosed);
            }

            match entry {
                ArchiveEntry::File {
                    source,
                    archive_name,
                } => {
                    let reader = self.storage.open_read(project_id, source).await?;
                    writer.add_reader(reader, archive_name).await?;
                }
                ArchiveEntry::Buffer {
                    content,
                    archive_name,
                } => {
                    writer.add_buffer(content, archive_name).await?;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BundleType;
    use crate::services::storage_tree::LocalStorageTree;
    use futures::StreamExt;
    use std::io::{Cursor, Read};

    fn service_for(dir: &std::path::Path) -> ExportService {
        ExportService::new(
            Arc::new(LocalStorageTree::new(dir)),
            ExportConfig {
                compression_level: 6,
                chunk_size: 1024,
                channel_capacity: 2,
            },
        )
    }

    fn write(dir: &std::path::Path, path: &str, content: &[u8]) {
        let full = dir.join("p1").join(path);
        std::fs::create_dir_all(full.parent().unwrap()).unwrap();
        std::fs::write(full, content).unwrap();
    }

    async fn drain(mut stream: ArchiveStream) -> std::io::Result<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(chunk) = stream.next().await {
            out.extend_from_slice(&chunk?);
        }
        Ok(out)
    }

    fn entry_names(archive: &[u8]) -> Vec<String> {
        let mut zip = zip::ZipArchive::new(Cursor::new(archive)).unwrap();
        (0..zip.len())
            .map(|i| zip.by_index(i).unwrap().name().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_prepare_resolves_entries_in_order() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "models/best_model.pkl", b"pickle");
        let service = service_for(dir.path());

        let prepared = service
            .prepare(ExportRequest::new("p1", BundleType::TrainedModel))
            .await
            .unwrap();

        let names: Vec<_> = prepared.entries.iter().map(|e| e.archive_name()).collect();
        assert_eq!(
            names,
            vec![
                "model/trained_model.bin",
                "inference.py",
                "requirements.txt",
                "README.md"
            ]
        );
        assert!(!prepared.entries[0].is_synthetic());
        assert!(prepared.file_name.starts_with("trained_model_p1_"));
        assert!(prepared.file_name.ends_with(".zip"));
    }

    #[tokio::test]
    async fn test_start_streams_complete_archive() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "models/best_model.pkl", b"pickle-bytes");
        let service = service_for(dir.path());

        let export = service
            .start(ExportRequest::new("p1", BundleType::TrainedModel))
            .await
            .unwrap();
        let archive = drain(export.stream).await.unwrap();
        let outcome = export.task.await.unwrap();

        assert_eq!(outcome.phase, ExportPhase::Done);
        assert_eq!(outcome.entries_written, 4);
        assert_eq!(outcome.bytes_sent, archive.len() as u64);

        let mut zip = zip::ZipArchive::new(Cursor::new(&archive[..])).unwrap();
        let mut model = Vec::new();
        zip.by_name("model/trained_model.bin")
            .unwrap()
            .read_to_end(&mut model)
            .unwrap();
        assert_eq!(model, b"pickle-bytes");

        let stats = service.stats();
        assert_eq!(stats.started, 1);
        assert_eq!(stats.completed, 1);
    }

    #[tokio::test]
    async fn test_vanished_file_fails_while_streaming() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "models/best_model.pkl", b"pickle");
        let service = service_for(dir.path());

        let prepared = service
            .prepare(ExportRequest::new("p1", BundleType::TrainedModel))
            .await
            .unwrap();
        std::fs::remove_file(dir.path().join("p1/models/best_model.pkl")).unwrap();

        let (sink, stream) = ArchiveSink::channel(4);
        let consumer = tokio::spawn(drain(stream));
        let outcome = service.stream(prepared, sink).await;

        assert_eq!(outcome.phase, ExportPhase::Failed);
        assert_eq!(outcome.failed_in, Some(ExportPhase::Streaming));
        assert!(!outcome.client_aborted);
        assert!(consumer.await.unwrap().is_err(), "body must end with an error");
        assert_eq!(service.stats().failed, 1);
    }

    #[tokio::test]
    async fn test_failure_reports_partial_progress() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "datasets/a.csv", &[b'a'; 8 * 1024]);
        write(dir.path(), "datasets/b.csv", b"b");
        let service = service_for(dir.path());

        let prepared = service
            .prepare(ExportRequest::new("p1", BundleType::PreprocessedData))
            .await
            .unwrap();
        std::fs::remove_file(dir.path().join("p1/datasets/b.csv")).unwrap();

        let (sink, stream) = ArchiveSink::channel(64);
        let consumer = tokio::spawn(async move {
            let mut stream = stream;
            let mut received = 0u64;
            while let Some(Ok(chunk)) = stream.next().await {
                received += chunk.len() as u64;
            }
            received
        });
        let outcome = service.stream(prepared, sink).await;
        let received = consumer.await.unwrap();

        assert_eq!(outcome.failed_in, Some(ExportPhase::Streaming));
        assert_eq!(outcome.entries_written, 1);
        assert!(outcome.bytes_sent > 0);
        assert_eq!(outcome.bytes_sent, received);
        assert_eq!(service.stats().bytes_sent, outcome.bytes_sent);
    }

    #[tokio::test]
    async fn test_client_disconnect_is_clean_abort() {
        let dir = tempfile::tempdir().unwrap();
        // Pseudo-random bytes so the archive spans many chunks
        let mut state = 0x2545_f491_u32;
        let big: Vec<u8> = (0..512 * 1024)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                state as u8
            })
            .collect();
        write(dir.path(), "datasets/big.csv", &big);
        let service = service_for(dir.path());

        let prepared = service
            .prepare(ExportRequest::new("p1", BundleType::PreprocessedData))
            .await
            .unwrap();

        let (sink, mut stream) = ArchiveSink::channel(1);
        let task = tokio::spawn({
            let service = service.clone();
            async move { service.stream(prepared, sink).await }
        });

        // Take one chunk, then hang up
        let first = stream.next().await;
        assert!(first.is_some());
        drop(stream);

        let outcome = task.await.expect("export task must not panic");
        assert_eq!(outcome.phase, ExportPhase::Failed);
        assert!(outcome.client_aborted);
        assert_eq!(service.stats().aborted, 1);
    }

    #[tokio::test]
    async fn test_complete_project_has_single_readme() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "datasets/a.csv", b"x\n1\n");
        let service = service_for(dir.path());

        let export = service
            .start(ExportRequest::new("p1", BundleType::CompleteProject))
            .await
            .unwrap();
        let archive = drain(export.stream).await.unwrap();

        let names = entry_names(&archive);
        assert_eq!(
            names,
            vec![
                "model/trained_model.bin",
                "inference.py",
                "requirements.txt",
                "data/a.csv",
                "processing_notes.md",
                "setup.sh",
                "README.md"
            ]
        );
    }

    #[test]
    fn test_lifecycle_rejects_invalid_transitions() {
        let mut lifecycle = Lifecycle::new("e1");
        lifecycle.advance(ExportPhase::Finalizing);
        assert_eq!(lifecycle.phase, ExportPhase::Pending);

        lifecycle.advance(ExportPhase::Streaming);
        lifecycle.advance(ExportPhase::Failed);
        assert_eq!(lifecycle.phase, ExportPhase::Failed);

        lifecycle.advance(ExportPhase::Done);
        assert_eq!(lifecycle.phase, ExportPhase::Failed);
    }
}
