//! Streaming ZIP writer bound to a response body.
//!
//! The archive is never materialized: compressed bytes collect in a small
//! staging buffer and are handed to a bounded channel as soon as a chunk is
//! full or an entry is complete. The channel capacity is the back-pressure
//! limit, so a slow client stalls the writer instead of growing memory.
//!
//! Entries use data descriptors (the output cannot seek back to patch
//! local headers), and the central directory is written by [`ArchiveWriter::finalize`].

use std::collections::HashSet;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, trace};
use zip::write::{SimpleFileOptions, StreamWriter};
use zip::{CompressionMethod, ZipWriter};

use crate::{Error, Result};

/// One item of the response body stream.
pub type ArchiveChunk = io::Result<Bytes>;

/// Receiving half of an archive stream, ready for `Body::from_stream`.
pub type ArchiveStream = ReceiverStream<ArchiveChunk>;

/// Sending half of an archive stream.
#[derive(Debug, Clone)]
pub struct ArchiveSink {
    tx: mpsc::Sender<ArchiveChunk>,
}

impl ArchiveSink {
    /// Create a bounded sink/stream pair holding at most `capacity` chunks.
    pub fn channel(capacity: usize) -> (ArchiveSink, ArchiveStream) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (ArchiveSink { tx }, ReceiverStream::new(rx))
    }

    /// Whether the consuming side has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn send(&self, chunk: Bytes) -> Result<()> {
        self.tx.send(Ok(chunk)).await.map_err(|_| Error::SinkClosed)
    }

    /// Terminate the body with an error so the client sees a broken transfer.
    pub async fn fail(&self, reason: String) {
        let _ = self
            .tx
            .send(Err(io::Error::new(io::ErrorKind::Other, reason)))
            .await;
    }
}

/// Staging buffer the zip encoder writes into.
#[derive(Clone, Default)]
struct Staging(Arc<Mutex<Vec<u8>>>);

impl Staging {
    fn len(&self) -> usize {
        self.0.lock().map(|buf| buf.len()).unwrap_or(0)
    }

    fn take(&self) -> Vec<u8> {
        match self.0.lock() {
            Ok(mut buf) => std::mem::take(&mut *buf),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl Write for Staging {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut buf = self
            .0
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "archive staging buffer poisoned"))?;
        buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Totals reported once an archive has been finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub entries: usize,
    pub bytes_sent: u64,
}

/// A write-once ZIP archive streaming into an [`ArchiveSink`].
pub struct ArchiveWriter {
    zip: ZipWriter<StreamWriter<Staging>>,
    staging: Staging,
    sink: ArchiveSink,
    options: SimpleFileOptions,
    chunk_size: usize,
    names: HashSet<String>,
    bytes_sent: u64,
    aborted: bool,
}

impl ArchiveWriter {
    /// Begin a new archive bound to `sink`.
    ///
    /// Level 0 stores entries uncompressed, 1..=9 deflates them.
    pub fn open(sink: ArchiveSink, compression_level: i64, chunk_size: usize) -> Self {
        let staging = Staging::default();
        let zip = ZipWriter::new_stream(staging.clone());

        let options = if compression_level <= 0 {
            SimpleFileOptions::default().compression_method(CompressionMethod::Stored)
        } else {
            SimpleFileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .compression_level(Some(compression_level.min(9)))
        };

        Self {
            zip,
            staging,
            sink,
            options,
            chunk_size: chunk_size.max(1),
            names: HashSet::new(),
            bytes_sent: 0,
            aborted: false,
        }
    }

    /// Number of entries started so far.
    pub fn entry_count(&self) -> usize {
        self.names.len()
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    /// Entries started and bytes shipped so far.
    pub fn progress(&self) -> ArchiveSummary {
        ArchiveSummary {
            entries: self.entry_count(),
            bytes_sent: self.bytes_sent,
        }
    }

    /// Stream a local file into the archive under `archive_name`.
    ///
    /// The file is read in chunks; a path that vanished since it was
    /// probed surfaces as a storage error.
    pub async fn add_file(&mut self, source: &Path, archive_name: &str) -> Result<u64> {
        let file = tokio::fs::File::open(source)
            .await
            .map_err(|e| Error::storage(source.display().to_string(), e))?;
        self.add_reader(file, archive_name).await
    }

    /// Stream any async reader into the archive under `archive_name`.
    pub async fn add_reader<R>(&mut self, mut reader: R, archive_name: &str) -> Result<u64>
    where
        R: AsyncRead + Unpin,
    {
        self.start_entry(archive_name)?;

        let mut buf = vec![0u8; self.chunk_size];
        let mut total = 0u64;
        loop {
            let read = match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    self.aborted = true;
                    return Err(Error::storage(archive_name, e));
                }
            };

            self.write_entry_bytes(&buf[..read])?;
            total += read as u64;
            self.ship(false).await?;
        }

        self.ship(true).await?;
        trace!(archive_name, bytes = total, "File entry written");
        Ok(total)
    }

    /// Write an in-memory payload under `archive_name`.
    pub async fn add_buffer(&mut self, content: &[u8], archive_name: &str) -> Result<u64> {
        self.start_entry(archive_name)?;

        for piece in content.chunks(self.chunk_size) {
            self.write_entry_bytes(piece)?;
            self.ship(false).await?;
        }

        self.ship(true).await?;
        trace!(archive_name, bytes = content.len(), "Buffer entry written");
        Ok(content.len() as u64)
    }

    /// Write the central directory and close the stream.
    pub async fn finalize(mut self) -> Result<ArchiveSummary> {
        self.ensure_usable()?;

        let entries = self.names.len();
        // finish() needs ownership; swap in a throwaway encoder
        let zip = std::mem::replace(&mut self.zip, ZipWriter::new_stream(Staging::default()));
        if let Err(e) = zip.finish() {
            self.aborted = true;
            return Err(e.into());
        }
        self.ship(true).await?;

        debug!(entries, bytes = self.bytes_sent, "Archive finalized");

        // Dropping the sink ends the body stream
        Ok(ArchiveSummary {
            entries,
            bytes_sent: self.bytes_sent,
        })
    }

    /// Abandon the archive, pushing an error into the stream so the
    /// consumer never mistakes the truncated output for a complete one.
    pub async fn abort(self, reason: impl Into<String>) {
        self.sink.fail(reason.into()).await;
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.aborted {
            return Err(Error::Archive("archive writer already aborted".into()));
        }
        Ok(())
    }

    fn start_entry(&mut self, archive_name: &str) -> Result<()> {
        self.ensure_usable()?;

        if !self.names.insert(archive_name.to_string()) {
            return Err(Error::Archive(format!(
                "Duplicate archive entry: {}",
                archive_name
            )));
        }

        let options = self.options.unix_permissions(entry_permissions(archive_name));
        if let Err(e) = self.zip.start_file(archive_name, options) {
            self.aborted = true;
            return Err(e.into());
        }
        Ok(())
    }

    fn write_entry_bytes(&mut self, data: &[u8]) -> Result<()> {
        if let Err(e) = self.zip.write_all(data) {
            self.aborted = true;
            return Err(e.into());
        }
        Ok(())
    }

    /// Forward staged bytes to the sink: full chunks only, or everything
    /// when `all` is set.
    async fn ship(&mut self, all: bool) -> Result<()> {
        if self.staging.len() == 0 || (!all && self.staging.len() < self.chunk_size) {
            return Ok(());
        }

        let staged = self.staging.take();
        for piece in staged.chunks(self.chunk_size) {
            if let Err(e) = self.sink.send(Bytes::copy_from_slice(piece)).await {
                self.aborted = true;
                return Err(e);
            }
            self.bytes_sent += piece.len() as u64;
        }
        Ok(())
    }
}

/// Shell scripts ship executable, everything else read-only for others.
fn entry_permissions(archive_name: &str) -> u32 {
    if archive_name.ends_with(".sh") {
        0o755
    } else {
        0o644
    }
}
