//! Persisted checkpoint document

use crate::entity::EntityKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Format version written into every checkpoint
pub const CHECKPOINT_VERSION: &str = "1.0";

/// Entries kept in the error log
pub const MAX_ERROR_LOG: usize = 100;

/// Progress of one entity kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
}

impl EntityStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityStatus::NotStarted => "not_started",
            EntityStatus::InProgress => "in_progress",
            EntityStatus::Completed => "completed",
        }
    }
}

/// Checkpoint entry for a single entity kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityState {
    #[serde(default)]
    pub status: EntityStatus,
    /// Idempotency key of the file most recently started
    #[serde(default)]
    pub current_file: Option<String>,
    #[serde(default)]
    pub last_processed: Option<DateTime<Utc>>,
    /// Files whose final flush succeeded; only ever grows
    #[serde(default)]
    pub completed_files: BTreeSet<String>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

/// One recorded failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub timestamp: DateTime<Utc>,
    pub entity_type: String,
    pub error_message: String,
}

/// The whole checkpoint document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointState {
    pub version: String,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub entities: BTreeMap<String, EntityState>,
    /// Records flushed per entity, keyed `<entity>_count`
    #[serde(default)]
    pub total_processed: BTreeMap<String, u64>,
    #[serde(default)]
    pub error_log: Vec<ErrorEntry>,
}

impl Default for CheckpointState {
    fn default() -> Self {
        Self::new()
    }
}

impl CheckpointState {
    /// Fresh state with a zeroed counter for every entity kind
    pub fn new() -> Self {
        Self {
            version: CHECKPOINT_VERSION.to_string(),
            last_updated: Utc::now(),
            entities: BTreeMap::new(),
            total_processed: EntityKind::ALL
                .iter()
                .map(|kind| (kind.count_key(), 0))
                .collect(),
            error_log: Vec::new(),
        }
    }

    pub fn entity(&self, kind: EntityKind) -> Option<&EntityState> {
        self.entities.get(kind.as_str())
    }

    fn entity_mut(&mut self, kind: EntityKind) -> &mut EntityState {
        self.entities.entry(kind.as_str().to_string()).or_default()
    }

    fn touch(&mut self) {
        self.last_updated = Utc::now();
    }

    /// Record that `file_key` is being worked on. A completed entity stays completed.
    pub fn mark_file_started(&mut self, kind: EntityKind, file_key: &str) {
        let now = Utc::now();
        let entity = self.entity_mut(kind);
        entity.current_file = Some(file_key.to_string());
        entity.last_processed = Some(now);
        if entity.status == EntityStatus::NotStarted {
            entity.status = EntityStatus::InProgress;
        }
        self.touch();
    }

    /// Add `file_key` to the completed set and count its records.
    ///
    /// Returns `false` when the file was already complete; the counter is
    /// left alone in that case so re-delivered files are not double counted.
    pub fn mark_file_complete(&mut self, kind: EntityKind, file_key: &str, records: u64) -> bool {
        let now = Utc::now();
        let entity = self.entity_mut(kind);
        let newly_completed = entity.completed_files.insert(file_key.to_string());
        entity.last_processed = Some(now);
        if entity.status == EntityStatus::NotStarted {
            entity.status = EntityStatus::InProgress;
        }

        if newly_completed {
            *self.total_processed.entry(kind.count_key()).or_insert(0) += records;
        }
        self.touch();
        newly_completed
    }

    pub fn mark_entity_complete(&mut self, kind: EntityKind) {
        let now = Utc::now();
        let entity = self.entity_mut(kind);
        entity.status = EntityStatus::Completed;
        entity.completed_at = Some(now);
        self.touch();
    }

    pub fn is_file_complete(&self, kind: EntityKind, file_key: &str) -> bool {
        self.entity(kind)
            .is_some_and(|e| e.completed_files.contains(file_key))
    }

    pub fn is_entity_complete(&self, kind: EntityKind) -> bool {
        self.entity(kind)
            .is_some_and(|e| e.status == EntityStatus::Completed)
    }

    /// Forget everything about `kind` and zero its counter
    pub fn reset_entity(&mut self, kind: EntityKind) {
        self.entities.remove(kind.as_str());
        self.total_processed.insert(kind.count_key(), 0);
        self.touch();
    }

    pub fn log_error(&mut self, entity_type: &str, message: &str) {
        self.error_log.push(ErrorEntry {
            timestamp: Utc::now(),
            entity_type: entity_type.to_string(),
            error_message: message.to_string(),
        });
        if self.error_log.len() > MAX_ERROR_LOG {
            let excess = self.error_log.len() - MAX_ERROR_LOG;
            self.error_log.drain(..excess);
        }
        self.touch();
    }

    pub fn summary(&self) -> CheckpointSummary {
        CheckpointSummary {
            last_updated: self.last_updated,
            total_processed: self.total_processed.clone(),
            entities: self
                .entities
                .iter()
                .map(|(name, state)| {
                    (
                        name.clone(),
                        EntitySummary {
                            status: state.status,
                            last_processed_file: state.current_file.clone(),
                            completed_files_count: state.completed_files.len(),
                            completed_at: state.completed_at,
                        },
                    )
                })
                .collect(),
            recent_errors: self.error_log.iter().rev().take(5).cloned().collect(),
        }
    }
}

/// Read-only progress view
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckpointSummary {
    pub last_updated: DateTime<Utc>,
    pub total_processed: BTreeMap<String, u64>,
    pub entities: BTreeMap<String, EntitySummary>,
    /// Newest first
    pub recent_errors: Vec<ErrorEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntitySummary {
    pub status: EntityStatus,
    pub last_processed_file: Option<String>,
    pub completed_files_count: usize,
    pub completed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_has_all_counters() {
        let state = CheckpointState::new();
        assert_eq!(state.version, CHECKPOINT_VERSION);
        assert_eq!(state.total_processed.len(), EntityKind::ALL.len());
        assert_eq!(state.total_processed["works_count"], 0);
    }

    #[test]
    fn test_status_never_regresses() {
        let mut state = CheckpointState::new();
        state.mark_file_started(EntityKind::Authors, "p/a.gz");
        assert_eq!(
            state.entity(EntityKind::Authors).map(|e| e.status),
            Some(EntityStatus::InProgress)
        );

        state.mark_entity_complete(EntityKind::Authors);
        state.mark_file_started(EntityKind::Authors, "p/c.gz");
        assert!(state.is_entity_complete(EntityKind::Authors));
    }

    #[test]
    fn test_file_completion_counts_once() {
        let mut state = CheckpointState::new();
        assert!(state.mark_file_complete(EntityKind::Works, "p/a.gz", 10));
        assert!(!state.mark_file_complete(EntityKind::Works, "p/a.gz", 10));

        assert!(state.is_file_complete(EntityKind::Works, "p/a.gz"));
        assert!(!state.is_file_complete(EntityKind::Authors, "p/a.gz"));
        assert_eq!(state.total_processed["works_count"], 10);
    }

    #[test]
    fn test_error_log_is_bounded() {
        let mut state = CheckpointState::new();
        for i in 0..(MAX_ERROR_LOG + 7) {
            state.log_error("works", &format!("failure {}", i));
        }
        assert_eq!(state.error_log.len(), MAX_ERROR_LOG);
        assert_eq!(state.error_log[0].error_message, "failure 7");
        assert_eq!(
            state.error_log.last().map(|e| e.error_message.as_str()),
            Some("failure 106")
        );
    }

    #[test]
    fn test_reset_entity_clears_progress() {
        let mut state = CheckpointState::new();
        state.mark_file_complete(EntityKind::Topics, "p/a.gz", 3);
        state.reset_entity(EntityKind::Topics);

        assert!(state.entity(EntityKind::Topics).is_none());
        assert_eq!(state.total_processed["topics_count"], 0);
    }

    #[test]
    fn test_summary_reports_counts() {
        let mut state = CheckpointState::new();
        state.mark_file_started(EntityKind::Sources, "p/b.gz");
        state.mark_file_complete(EntityKind::Sources, "p/a.gz", 4);

        let summary = state.summary();
        let sources = &summary.entities["sources"];
        assert_eq!(sources.status, EntityStatus::InProgress);
        assert_eq!(sources.completed_files_count, 1);
        assert_eq!(sources.last_processed_file.as_deref(), Some("p/b.gz"));
    }

    #[test]
    fn test_parses_document_with_missing_optional_fields() {
        let raw = r#"{
            "version": "1.0",
            "last_updated": "2024-03-01T10:00:00Z",
            "entities": {"authors": {"status": "in_progress", "completed_files": ["x/a.gz"]}}
        }"#;
        let state: CheckpointState = serde_json::from_str(raw).unwrap();
        assert!(state.is_file_complete(EntityKind::Authors, "x/a.gz"));
        assert!(state.error_log.is_empty());
    }
}
