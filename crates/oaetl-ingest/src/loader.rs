//! Buffered multi-table batch loader
//!
//! Streams one local JSON-lines file (gzip or plain), normalizes each
//! record into per-table buffers and flushes them through a [`Sink`]:
//!
//! - a bad line or a failed normalization is counted and skipped; the file
//!   fails once the count reaches `max_record_errors`
//! - buffers flush together when the primary table buffer holds
//!   `batch_size` rows, and once more at end of file
//! - the checkpoint marks the file started before its first flush and
//!   complete only after its last flush succeeded
//!
//! A crash between flushes therefore leaves the file incomplete; the rerun
//! loads it again from the start and the upserts overwrite what the first
//! attempt wrote.

use crate::checkpoint::CheckpointStore;
use crate::config::LoaderConfig;
use crate::entity::EntityKind;
use crate::error::{IngestError, Result};
use crate::normalize::Normalizer;
use crate::schema::{tables_for, SqlValue};
use crate::sink::{Sink, TableBatch};
use crate::source::SourceFile;
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Lines buffered between the decompression thread and the loader
const LINE_CHANNEL_CAPACITY: usize = 1024;

/// Outcome of loading one file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileReport {
    /// Records normalized and flushed
    pub records: u64,
    /// Records the normalizer asked to skip
    pub skipped: u64,
    /// Bad lines and failed normalizations
    pub errors: usize,
    pub flushes: usize,
    /// Rows inserted or updated across all tables
    pub rows_written: u64,
}

pub struct BatchLoader<N, S> {
    normalizer: N,
    sink: S,
    checkpoint: CheckpointStore,
    config: LoaderConfig,
}

impl<N: Normalizer, S: Sink> BatchLoader<N, S> {
    pub fn new(normalizer: N, sink: S, checkpoint: CheckpointStore, config: LoaderConfig) -> Self {
        Self {
            normalizer,
            sink,
            checkpoint,
            config,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Load `path`, the local copy of `file`, and mark it complete on success
    #[instrument(skip(self, path, file), fields(entity = %file.entity, file = %file.key()))]
    pub async fn process_file(&self, path: &Path, file: &SourceFile) -> Result<FileReport> {
        let kind = file.entity;
        let key = file.key();
        let mut buffers: Vec<TableBatch> = tables_for(kind).iter().map(TableBatch::new).collect();
        let primary = buffers
            .iter()
            .position(|b| b.table.is_primary())
            .unwrap_or_default();

        let (mut lines, reader) = spawn_line_reader(path.to_path_buf());
        let mut report = FileReport::default();
        let mut started = false;
        let mut line_no = 0usize;

        while let Some(line) = lines.recv().await {
            let line = line?;
            line_no += 1;
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            match self.stage_record(kind, &line, &mut buffers) {
                Ok(true) => report.records += 1,
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    report.errors += 1;
                    warn!(line = line_no, error = %e, "Skipping bad record");
                    if report.errors >= self.config.max_record_errors {
                        return Err(IngestError::RecordLimit {
                            path: path.to_path_buf(),
                            errors: report.errors,
                            limit: self.config.max_record_errors,
                        });
                    }
                },
            }

            if buffers[primary].len() >= self.config.batch_size {
                report.rows_written += self.flush(kind, &key, &mut buffers, &mut started).await?;
                report.flushes += 1;
                debug!(records = report.records, "Flushed batch");
            }
        }

        reader
            .await
            .map_err(|e| IngestError::Io(std::io::Error::other(e)))?;

        if buffers.iter().any(|b| !b.is_empty()) {
            report.rows_written += self.flush(kind, &key, &mut buffers, &mut started).await?;
            report.flushes += 1;
        }

        self.checkpoint
            .mark_file_complete(kind, &key, report.records)?;

        info!(
            records = report.records,
            skipped = report.skipped,
            errors = report.errors,
            flushes = report.flushes,
            rows = report.rows_written,
            "Completed file"
        );
        Ok(report)
    }

    /// Parse and normalize one line into the buffers.
    ///
    /// All rows of a record are converted before any is buffered, so a
    /// record either contributes every row or none.
    fn stage_record(&self, kind: EntityKind, line: &[u8], buffers: &mut [TableBatch]) -> Result<bool> {
        let record: serde_json::Value = serde_json::from_slice(line)?;
        let Some(sets) = self.normalizer.normalize(kind, &record)? else {
            return Ok(false);
        };

        let mut staged: Vec<(usize, Vec<SqlValue>)> = Vec::new();
        for (table_name, set) in sets {
            let Some(slot) = buffers.iter().position(|b| b.table.name == table_name) else {
                debug!(table = %table_name, "Ignoring rows for unknown table");
                continue;
            };
            for row in set.into_vec() {
                staged.push((slot, buffers[slot].table.coerce_row(&row)?));
            }
        }

        for (slot, values) in staged {
            buffers[slot].rows.push(values);
        }
        Ok(true)
    }

    /// Write every buffer in one sink call, then clear them
    async fn flush(
        &self,
        kind: EntityKind,
        key: &str,
        buffers: &mut [TableBatch],
        started: &mut bool,
    ) -> Result<u64> {
        if !*started {
            // A lost "started" mark only affects reporting; completion is what gates reloads.
            if let Err(e) = self.checkpoint.mark_file_started(kind, key) {
                warn!(error = %e, "Could not record file start");
            }
            *started = true;
        }

        for buffer in buffers.iter_mut() {
            buffer.dedup_by_key();
        }
        let rows: usize = buffers.iter().map(TableBatch::len).sum();

        let written = self.sink.write(buffers).await.map_err(|e| IngestError::Flush {
            entity: kind,
            message: e.to_string(),
        })?;

        for buffer in buffers.iter_mut() {
            buffer.rows.clear();
        }
        debug!(rows, written, "Flush committed");
        Ok(written)
    }
}

/// Read `path` line by line on a blocking thread.
///
/// Lines arrive as raw bytes so invalid UTF-8 surfaces as a record error
/// rather than an I/O failure. The reader stops early when the receiver is
/// dropped.
fn spawn_line_reader(path: PathBuf) -> (mpsc::Receiver<std::io::Result<Vec<u8>>>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(LINE_CHANNEL_CAPACITY);

    let handle = tokio::task::spawn_blocking(move || {
        let mut reader = match open_reader(&path) {
            Ok(reader) => reader,
            Err(e) => {
                let _ = tx.blocking_send(Err(e));
                return;
            },
        };

        loop {
            let mut line = Vec::new();
            match reader.read_until(b'\n', &mut line) {
                Ok(0) => break,
                Ok(_) => {
                    if tx.blocking_send(Ok(line)).is_err() {
                        break;
                    }
                },
                Err(e) => {
                    let _ = tx.blocking_send(Err(e));
                    break;
                },
            }
        }
    });

    (rx, handle)
}

fn open_reader(path: &Path) -> std::io::Result<Box<dyn BufRead + Send>> {
    let file = File::open(path)?;
    let inner: Box<dyn Read + Send> = if path.extension().is_some_and(|ext| ext == "gz") {
        Box::new(MultiGzDecoder::new(file))
    } else {
        Box::new(file)
    };
    Ok(Box::new(BufReader::new(inner)))
}
