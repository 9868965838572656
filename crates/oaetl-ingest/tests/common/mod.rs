//! Shared fixtures for the ingestion integration tests
//!
//! [`Harness`] lays out a temporary snapshot mirror next to a checkpoint
//! directory and wires a pipeline over [`LocalSource`] and [`MemorySink`],
//! so whole runs execute without network or database access.

#![allow(dead_code)]

use flate2::write::GzEncoder;
use flate2::Compression;
use oaetl_common::retry::RetryPolicy;
use oaetl_ingest::checkpoint::CheckpointStore;
use oaetl_ingest::config::{LoaderConfig, StateConfig};
use oaetl_ingest::fetch::Fetcher;
use oaetl_ingest::loader::BatchLoader;
use oaetl_ingest::normalize::OpenAlexNormalizer;
use oaetl_ingest::orchestrator::Pipeline;
use oaetl_ingest::sink::{MemorySink, Sink};
use oaetl_ingest::source::{Enumerator, LocalSource, RemoteSource};
use oaetl_ingest::EntityKind;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

pub const PARTITION: &str = "updated_date=2024-02-01";

pub fn init_test_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,oaetl_ingest=debug")),
        )
        .with_test_writer()
        .try_init();
}

pub fn author_line(n: usize) -> String {
    serde_json::json!({
        "id": format!("https://openalex.org/A{}", n),
        "display_name": format!("Author {}", n),
        "works_count": n,
        "ids": {"openalex": format!("https://openalex.org/A{}", n)},
        "counts_by_year": [{"year": 2023, "works_count": n, "cited_by_count": 0}]
    })
    .to_string()
}

pub fn authors(range: std::ops::Range<usize>) -> Vec<String> {
    range.map(author_line).collect()
}

/// Write `lines` gzip-compressed to `path`, creating parent directories
pub fn write_gz(path: &Path, lines: &[String]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let mut encoder = GzEncoder::new(File::create(path).unwrap(), Compression::default());
    for line in lines {
        writeln!(encoder, "{}", line).unwrap();
    }
    encoder.finish().unwrap();
}

pub struct Harness {
    pub root: TempDir,
    pub state: StateConfig,
    pub checkpoint: CheckpointStore,
    pub sink: Arc<MemorySink>,
}

impl Harness {
    pub fn new() -> Self {
        init_test_tracing();
        let root = tempfile::tempdir().unwrap();
        let mut state = StateConfig::with_base_dir(root.path().join("work"));
        state.max_backups = 5;
        let checkpoint = CheckpointStore::open(&state).unwrap();
        Self {
            root,
            state,
            checkpoint,
            sink: Arc::new(MemorySink::new()),
        }
    }

    pub fn mirror(&self) -> PathBuf {
        self.root.path().join("mirror")
    }

    /// Add `<mirror>/<entity>/<partition>/<name>` to the snapshot
    pub fn add_file(&self, kind: EntityKind, partition: &str, name: &str, lines: &[String]) {
        write_gz(
            &self.mirror().join(kind.as_str()).join(partition).join(name),
            lines,
        );
    }

    pub fn key(name: &str) -> String {
        format!("{}/{}", PARTITION, name)
    }

    pub fn pipeline(&self, cancel: CancellationToken) -> Pipeline<OpenAlexNormalizer, Arc<MemorySink>> {
        self.pipeline_with_sink(self.sink.clone(), cancel)
    }

    pub fn pipeline_with_sink<S: Sink>(
        &self,
        sink: S,
        cancel: CancellationToken,
    ) -> Pipeline<OpenAlexNormalizer, S> {
        let source: Arc<dyn RemoteSource> = Arc::new(LocalSource::new(self.mirror()));
        let retry = RetryPolicy::immediate(2);
        Pipeline::new(
            Enumerator::new(source.clone(), self.checkpoint.clone(), "updated_date=", retry),
            Fetcher::new(source, self.state.scratch_dir(), retry),
            BatchLoader::new(
                OpenAlexNormalizer,
                sink,
                self.checkpoint.clone(),
                LoaderConfig {
                    batch_size: 2,
                    max_record_errors: 3,
                },
            ),
            self.checkpoint.clone(),
            cancel,
        )
    }
}
