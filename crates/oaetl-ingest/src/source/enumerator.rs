//! Pending file discovery

use super::{normalize_partition, RemoteSource, SourceFile};
use crate::checkpoint::CheckpointStore;
use crate::entity::EntityKind;
use crate::error::Result;
use oaetl_common::retry::{retry_with_backoff, RetryPolicy};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Result of enumerating one entity kind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    /// Partition that was selected, `None` when no partition matched
    pub partition: Option<String>,
    /// Files still to load, in listing order
    pub pending: Vec<SourceFile>,
    /// Files dropped because the checkpoint already has them
    pub skipped: usize,
}

impl Listing {
    pub fn is_exhausted(&self) -> bool {
        self.partition.is_some() && self.pending.is_empty()
    }
}

/// Pick the current partition: the string-greatest name containing `marker`.
///
/// Comparison is plain lexicographic, so it is only chronological for
/// zero-padded dates.
pub fn select_latest_partition<S: AsRef<str>>(names: &[S], marker: &str) -> Option<String> {
    names
        .iter()
        .map(AsRef::as_ref)
        .filter(|name| name.contains(marker))
        .max()
        .map(normalize_partition)
}

/// Lists remote files and filters out the ones already loaded
pub struct Enumerator {
    source: Arc<dyn RemoteSource>,
    checkpoint: CheckpointStore,
    marker: String,
    retry: RetryPolicy,
}

impl Enumerator {
    pub fn new(
        source: Arc<dyn RemoteSource>,
        checkpoint: CheckpointStore,
        marker: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            source,
            checkpoint,
            marker: marker.into(),
            retry,
        }
    }

    pub async fn latest_partition(&self, entity: EntityKind) -> Result<Option<String>> {
        let operation = format!("list partitions of {}", entity);
        let names = retry_with_backoff(&self.retry, &operation, |_| {
            self.source.list_partitions(entity)
        })
        .await?;

        Ok(select_latest_partition(&names, &self.marker))
    }

    #[instrument(skip(self), fields(entity = %entity))]
    pub async fn list_pending(&self, entity: EntityKind) -> Result<Listing> {
        let Some(partition) = self.latest_partition(entity).await? else {
            warn!(marker = %self.marker, "No partition found");
            return Ok(Listing::default());
        };

        let operation = format!("list files of {}/{}", entity, partition);
        let mut names = retry_with_backoff(&self.retry, &operation, |_| {
            self.source.list_files(entity, &partition)
        })
        .await?;
        names.sort();
        names.dedup();

        let state = self.checkpoint.load();
        let total = names.len();
        let pending: Vec<SourceFile> = names
            .into_iter()
            .map(|name| SourceFile {
                entity,
                full_path: self.source.location(entity, &partition, &name),
                partition: partition.clone(),
                name,
            })
            .filter(|file| !state.is_file_complete(entity, &file.key()))
            .collect();
        let skipped = total - pending.len();

        info!(
            partition = %partition,
            total,
            pending = pending.len(),
            skipped,
            "Enumerated source files"
        );

        Ok(Listing {
            partition: Some(partition),
            pending,
            skipped,
        })
    }
}
