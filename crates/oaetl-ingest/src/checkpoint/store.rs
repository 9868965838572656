//! File-backed checkpoint store
//!
//! Layout under the state directory:
//!
//! ```text
//! data/state/ingestion_state.json         primary checkpoint
//! data/state/ingestion_state.json.tmp     staging file, renamed over the primary
//! data/state/backups/state_backup_<ts>.json
//! ```
//!
//! Every save writes a backup snapshot of the incoming state first, then
//! replaces the primary through a temp file and a rename, so the primary is
//! either the old or the new document and never a torn write. Backups are
//! pruned to the newest `max_backups` by file name, which sorts by timestamp.

use super::state::{CheckpointState, CheckpointSummary};
use crate::config::StateConfig;
use crate::entity::EntityKind;
use crate::error::{IngestError, Result};
use chrono::{NaiveDateTime, Utc};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

const BACKUP_PREFIX: &str = "state_backup_";
const BACKUP_SUFFIX: &str = ".json";
const BACKUP_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Durable record of ingestion progress.
///
/// Clones share one in-process lock so each mutator's load-modify-save runs
/// as a unit. There is no cross-process locking: two processes must not work
/// the same entity kind at once.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
    backup_dir: PathBuf,
    max_backups: usize,
    lock: Arc<Mutex<()>>,
}

impl CheckpointStore {
    /// Open a store at the configured location, creating directories as needed
    pub fn open(config: &StateConfig) -> Result<Self> {
        Self::with_paths(config.checkpoint_path(), config.backup_dir(), config.max_backups)
    }

    pub fn with_paths(
        path: impl Into<PathBuf>,
        backup_dir: impl Into<PathBuf>,
        max_backups: usize,
    ) -> Result<Self> {
        let path = path.into();
        let backup_dir = backup_dir.into();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::create_dir_all(&backup_dir)?;

        Ok(Self {
            path,
            backup_dir,
            max_backups: max_backups.max(1),
            lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Current state; recovers from backups when the primary is corrupt and
    /// persists a fresh state when nothing exists yet.
    pub fn load(&self) -> CheckpointState {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        self.load_unlocked()
    }

    /// Persist `state` (backup first, then atomic replace of the primary).
    ///
    /// Failures are logged and returned; nothing is retried here.
    pub fn save(&self, state: &CheckpointState) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        self.save_unlocked(state)
    }

    pub fn mark_file_started(&self, kind: EntityKind, file_key: &str) -> Result<()> {
        self.update(|state| state.mark_file_started(kind, file_key))?;
        debug!(entity = %kind, file = file_key, "Marked file started");
        Ok(())
    }

    /// Returns whether the file was newly completed
    pub fn mark_file_complete(&self, kind: EntityKind, file_key: &str, records: u64) -> Result<bool> {
        let newly = self.update(|state| state.mark_file_complete(kind, file_key, records))?;
        info!(entity = %kind, file = file_key, records, "Marked file complete");
        Ok(newly)
    }

    pub fn mark_entity_complete(&self, kind: EntityKind) -> Result<()> {
        self.update(|state| state.mark_entity_complete(kind))?;
        info!(entity = %kind, "Marked entity complete");
        Ok(())
    }

    pub fn is_file_complete(&self, kind: EntityKind, file_key: &str) -> bool {
        self.load().is_file_complete(kind, file_key)
    }

    pub fn is_entity_complete(&self, kind: EntityKind) -> bool {
        self.load().is_entity_complete(kind)
    }

    pub fn reset_entity(&self, kind: EntityKind) -> Result<()> {
        self.update(|state| state.reset_entity(kind))?;
        info!(entity = %kind, "Reset entity state");
        Ok(())
    }

    pub fn log_error(&self, entity_type: &str, message: &str) -> Result<()> {
        self.update(|state| state.log_error(entity_type, message))?;
        Ok(())
    }

    /// Progress view. Never writes: safe to call from a monitor while a run is active.
    pub fn summary(&self) -> CheckpointSummary {
        self.read_primary()
            .or_else(|| self.read_latest_backup().map(|(_, state)| state))
            .unwrap_or_default()
            .summary()
    }

    /// Delete backups whose encoded timestamp is older than `days` days
    pub fn cleanup_old_backups(&self, days: i64) -> Result<usize> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let now = Utc::now().naive_utc();
        let mut removed = 0;

        for backup in self.list_backups()? {
            let Some(taken_at) = backup_timestamp(&backup) else {
                warn!(path = %backup.display(), "Skipping backup with unrecognised name");
                continue;
            };
            if (now - taken_at).num_days() > days {
                match fs::remove_file(&backup) {
                    Ok(()) => removed += 1,
                    Err(e) => error!(path = %backup.display(), error = %e, "Failed to remove old backup"),
                }
            }
        }

        info!(removed, days, "Cleaned up old checkpoint backups");
        Ok(removed)
    }

    /// Backup snapshots, oldest first
    pub fn list_backups(&self) -> Result<Vec<PathBuf>> {
        let mut backups: Vec<PathBuf> = fs::read_dir(&self.backup_dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(BACKUP_PREFIX) && n.ends_with(BACKUP_SUFFIX))
            })
            .collect();
        backups.sort();
        Ok(backups)
    }

    fn update<T>(&self, apply: impl FnOnce(&mut CheckpointState) -> T) -> Result<T> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut state = self.load_unlocked();
        let out = apply(&mut state);
        self.save_unlocked(&state)?;
        Ok(out)
    }

    fn load_unlocked(&self) -> CheckpointState {
        if !self.path.exists() {
            info!(path = %self.path.display(), "No checkpoint found, creating initial state");
            return self.initial_state();
        }

        match read_state(&self.path) {
            Ok(state) => state,
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "Checkpoint unreadable, restoring from backup");
                self.restore_from_backup()
            },
        }
    }

    fn initial_state(&self) -> CheckpointState {
        let state = CheckpointState::new();
        // Already logged inside save; the caller still gets a usable state.
        let _ = self.save_unlocked(&state);
        state
    }

    fn restore_from_backup(&self) -> CheckpointState {
        let Some((backup, state)) = self.read_latest_backup() else {
            warn!("No readable checkpoint backup, starting from initial state");
            return self.initial_state();
        };

        if let Err(e) = replace_file(&self.path, |tmp| fs::copy(&backup, tmp).map(|_| ())) {
            error!(backup = %backup.display(), error = %e, "Failed to copy backup over checkpoint");
        } else {
            info!(backup = %backup.display(), "Restored checkpoint from backup");
        }
        state
    }

    fn read_primary(&self) -> Option<CheckpointState> {
        read_state(&self.path).ok()
    }

    /// Newest backup that parses, skipping corrupt ones
    fn read_latest_backup(&self) -> Option<(PathBuf, CheckpointState)> {
        let backups = self.list_backups().ok()?;
        backups.into_iter().rev().find_map(|backup| match read_state(&backup) {
            Ok(state) => Some((backup, state)),
            Err(e) => {
                warn!(backup = %backup.display(), error = %e, "Skipping unreadable backup");
                None
            },
        })
    }

    fn save_unlocked(&self, state: &CheckpointState) -> Result<()> {
        let body = serde_json::to_vec_pretty(state)?;

        if let Err(e) = self.write_backup(&body) {
            error!(error = %e, "Error creating checkpoint backup");
        }
        if let Err(e) = self.prune_backups() {
            warn!(error = %e, "Error pruning checkpoint backups");
        }

        replace_file(&self.path, |tmp| write_synced(tmp, &body)).map_err(|e| {
            error!(path = %self.path.display(), error = %e, "Error saving checkpoint");
            IngestError::Checkpoint(format!("failed to write {}: {}", self.path.display(), e))
        })
    }

    fn write_backup(&self, body: &[u8]) -> std::io::Result<PathBuf> {
        fs::create_dir_all(&self.backup_dir)?;
        let stamp = Utc::now().format("%Y%m%d_%H%M%S_%6f").to_string();

        let mut path = self.backup_dir.join(format!("{BACKUP_PREFIX}{stamp}{BACKUP_SUFFIX}"));
        let mut n = 1;
        while path.exists() {
            path = self
                .backup_dir
                .join(format!("{BACKUP_PREFIX}{stamp}_{n}{BACKUP_SUFFIX}"));
            n += 1;
        }

        write_synced(&path, body)?;
        Ok(path)
    }

    fn prune_backups(&self) -> Result<()> {
        let backups = self.list_backups()?;
        if backups.len() > self.max_backups {
            for old in &backups[..backups.len() - self.max_backups] {
                fs::remove_file(old)?;
            }
        }
        Ok(())
    }
}

fn read_state(path: &Path) -> Result<CheckpointState> {
    let raw = fs::read(path)?;
    Ok(serde_json::from_slice(&raw)?)
}

fn write_synced(path: &Path, body: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(body)?;
    file.sync_all()
}

/// Produce `target` atomically: `fill` writes a sibling temp file which is
/// then renamed over the target.
fn replace_file(
    target: &Path,
    fill: impl FnOnce(&Path) -> std::io::Result<()>,
) -> std::io::Result<()> {
    let mut tmp = target.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    if let Err(e) = fill(&tmp).and_then(|()| fs::rename(&tmp, target)) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(())
}

fn backup_timestamp(path: &Path) -> Option<NaiveDateTime> {
    let name = path.file_name()?.to_str()?;
    let stamp = name.strip_prefix(BACKUP_PREFIX)?.get(..15)?;
    NaiveDateTime::parse_from_str(stamp, BACKUP_TIMESTAMP_FORMAT).ok()
}
