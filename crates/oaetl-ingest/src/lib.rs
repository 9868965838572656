//! OAETL Ingest Library
//!
//! Resumable ingestion of the OpenAlex snapshot into Postgres.
//!
//! # Pipeline
//!
//! - **Checkpoint**: durable per-entity, per-file progress with backups
//! - **Source**: S3 (anonymous by default) or a local mirror, plus the
//!   enumerator that filters out files already loaded
//! - **Fetch**: retried downloads into scratch files removed after use
//! - **Normalize**: record to per-table row-sets
//! - **Loader**: buffered multi-table upserts, checkpointed per file
//! - **Orchestrator**: fixed entity order, fail-fast, cooperative cancellation
//!
//! # Example
//!
//! ```no_run
//! use oaetl_ingest::checkpoint::CheckpointStore;
//! use oaetl_ingest::config::{LoaderConfig, StateConfig};
//! use oaetl_ingest::fetch::Fetcher;
//! use oaetl_ingest::loader::BatchLoader;
//! use oaetl_ingest::normalize::OpenAlexNormalizer;
//! use oaetl_ingest::orchestrator::Pipeline;
//! use oaetl_ingest::sink::MemorySink;
//! use oaetl_ingest::source::{Enumerator, LocalSource};
//! use oaetl_common::retry::RetryPolicy;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> oaetl_ingest::Result<()> {
//! let state = StateConfig::with_base_dir("/srv/oaetl");
//! let checkpoint = CheckpointStore::open(&state)?;
//! let source = Arc::new(LocalSource::new("/srv/openalex/data"));
//! let retry = RetryPolicy::default();
//!
//! let pipeline = Pipeline::new(
//!     Enumerator::new(source.clone(), checkpoint.clone(), "updated_date=", retry),
//!     Fetcher::new(source, state.scratch_dir(), retry),
//!     BatchLoader::new(OpenAlexNormalizer, MemorySink::new(), checkpoint.clone(), LoaderConfig::default()),
//!     checkpoint,
//!     CancellationToken::new(),
//! );
//! let report = pipeline.run(&[]).await;
//! assert!(report.is_success());
//! # Ok(())
//! # }
//! ```

pub mod checkpoint;
pub mod config;
pub mod entity;
pub mod error;
pub mod fetch;
pub mod loader;
pub mod monitor;
pub mod normalize;
pub mod orchestrator;
pub mod schema;
pub mod sink;
pub mod source;

pub use entity::EntityKind;
pub use error::{IngestError, Result};
