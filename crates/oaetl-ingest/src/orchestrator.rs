//! Pipeline orchestration
//!
//! Entity kinds run strictly in pipeline order, one file at a time:
//! enumerate, fetch, load. The first file that cannot be loaded stops the
//! whole run, since later kinds reference earlier ones. Cancellation is
//! checked between files, so an in-flight flush always finishes.

use crate::checkpoint::CheckpointStore;
use crate::entity::EntityKind;
use crate::error::{IngestError, Result};
use crate::fetch::Fetcher;
use crate::loader::{BatchLoader, FileReport};
use crate::normalize::Normalizer;
use crate::sink::Sink;
use crate::source::{Enumerator, SourceFile};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

/// How one entity kind ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityOutcome {
    /// Checkpoint already had it complete; nothing was listed
    AlreadyComplete,
    /// Every pending file loaded and the entity was marked complete
    Completed,
    /// No partition matched; left as is
    NoPartition,
    Failed(String),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityReport {
    pub kind: EntityKind,
    pub partition: Option<String>,
    pub files_loaded: usize,
    pub files_skipped: usize,
    pub records: u64,
    pub outcome: EntityOutcome,
}

impl EntityReport {
    fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            partition: None,
            files_loaded: 0,
            files_skipped: 0,
            records: 0,
            outcome: EntityOutcome::Completed,
        }
    }
}

/// Overall result of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Succeeded,
    Failed { entity: EntityKind, error: String },
    Cancelled,
}

impl RunOutcome {
    /// Process exit status: 0 success, 1 failure, 130 interrupted
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Succeeded => 0,
            RunOutcome::Failed { .. } => 1,
            RunOutcome::Cancelled => 130,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub entities: Vec<EntityReport>,
    pub outcome: RunOutcome,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.outcome == RunOutcome::Succeeded
    }

    pub fn entity(&self, kind: EntityKind) -> Option<&EntityReport> {
        self.entities.iter().find(|e| e.kind == kind)
    }
}

pub struct Pipeline<N, S> {
    enumerator: Enumerator,
    fetcher: Fetcher,
    loader: BatchLoader<N, S>,
    checkpoint: CheckpointStore,
    cancel: CancellationToken,
}

impl<N: Normalizer, S: Sink> Pipeline<N, S> {
    pub fn new(
        enumerator: Enumerator,
        fetcher: Fetcher,
        loader: BatchLoader<N, S>,
        checkpoint: CheckpointStore,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            enumerator,
            fetcher,
            loader,
            checkpoint,
            cancel,
        }
    }

    pub fn loader(&self) -> &BatchLoader<N, S> {
        &self.loader
    }

    /// Run the selected kinds (all kinds when empty) in pipeline order
    pub async fn run(&self, kinds: &[EntityKind]) -> RunReport {
        let kinds = if kinds.is_empty() {
            EntityKind::ALL.to_vec()
        } else {
            EntityKind::in_pipeline_order(kinds)
        };
        let started = Instant::now();
        info!(entities = ?kinds, "Starting ingestion run");

        let mut entities = Vec::with_capacity(kinds.len());
        for kind in kinds {
            if self.cancel.is_cancelled() {
                warn!(entity = %kind, "Run cancelled before entity started");
                return RunReport {
                    entities,
                    outcome: RunOutcome::Cancelled,
                };
            }

            let report = self.run_entity(kind).await;
            let outcome = match &report.outcome {
                EntityOutcome::Failed(error) => Some(RunOutcome::Failed {
                    entity: kind,
                    error: error.clone(),
                }),
                EntityOutcome::Cancelled => Some(RunOutcome::Cancelled),
                _ => None,
            };
            entities.push(report);

            if let Some(outcome) = outcome {
                error!(entity = %kind, outcome = ?outcome, "Stopping ingestion run");
                return RunReport { entities, outcome };
            }
        }

        info!(elapsed_secs = started.elapsed().as_secs(), "Ingestion run completed");
        RunReport {
            entities,
            outcome: RunOutcome::Succeeded,
        }
    }

    #[instrument(skip(self), fields(entity = %kind))]
    async fn run_entity(&self, kind: EntityKind) -> EntityReport {
        let mut report = EntityReport::new(kind);

        if self.checkpoint.is_entity_complete(kind) {
            info!("Entity already complete, skipping");
            report.outcome = EntityOutcome::AlreadyComplete;
            return report;
        }

        let listing = match self.enumerator.list_pending(kind).await {
            Ok(listing) => listing,
            Err(e) => {
                report.outcome = self.fail(kind, "listing", &e);
                return report;
            },
        };
        report.files_skipped = listing.skipped;

        let Some(partition) = listing.partition else {
            warn!("No partition available, entity left unchanged");
            report.outcome = EntityOutcome::NoPartition;
            return report;
        };
        report.partition = Some(partition.clone());
        info!(partition = %partition, pending = listing.pending.len(), "Processing entity");

        for file in &listing.pending {
            if self.cancel.is_cancelled() {
                warn!(file = %file.key(), "Cancelled between files");
                report.outcome = EntityOutcome::Cancelled;
                return report;
            }

            match self.load_file(file).await {
                Ok(file_report) => {
                    report.files_loaded += 1;
                    report.records += file_report.records;
                },
                Err(e) => {
                    report.outcome = self.fail(kind, &file.key(), &e);
                    return report;
                },
            }
        }

        if let Err(e) = self.checkpoint.mark_entity_complete(kind) {
            report.outcome = self.fail(kind, "completion", &e);
            return report;
        }

        info!(
            files = report.files_loaded,
            skipped = report.files_skipped,
            records = report.records,
            "Entity complete"
        );
        report
    }

    /// Fetch one file to scratch and load it; the scratch copy is removed either way
    async fn load_file(&self, file: &SourceFile) -> Result<FileReport> {
        let scratch = self.fetcher.fetch(file).await?;
        self.loader.process_file(scratch.path(), file).await
    }

    fn fail(&self, kind: EntityKind, stage: &str, e: &IngestError) -> EntityOutcome {
        let message = format!("{}: {}", stage, e);
        error!(entity = %kind, error = %message, "Entity failed");
        if let Err(log_err) = self.checkpoint.log_error(kind.as_str(), &message) {
            warn!(error = %log_err, "Could not record failure in checkpoint");
        }
        EntityOutcome::Failed(message)
    }
}
