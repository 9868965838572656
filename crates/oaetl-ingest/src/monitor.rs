//! Progress reporting
//!
//! Only ever reads the checkpoint through [`CheckpointStore::summary`], so
//! it can run beside an ingestion run without coordination.

use crate::checkpoint::{CheckpointStore, CheckpointSummary};
use crate::entity::EntityKind;
use std::fmt::Write;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Log a progress snapshot every `every` until `cancel` fires
pub fn spawn_monitor(store: CheckpointStore, every: Duration, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => log_summary(&store.summary()),
            }
        }
    })
}

pub fn log_summary(summary: &CheckpointSummary) {
    for kind in EntityKind::ALL {
        let processed = summary
            .total_processed
            .get(&kind.count_key())
            .copied()
            .unwrap_or_default();
        match summary.entities.get(kind.as_str()) {
            Some(entity) => info!(
                entity = %kind,
                status = entity.status.as_str(),
                completed_files = entity.completed_files_count,
                records = processed,
                current_file = entity.last_processed_file.as_deref().unwrap_or("-"),
                "Progress"
            ),
            None => info!(entity = %kind, status = "not_started", records = processed, "Progress"),
        }
    }
    if let Some(latest) = summary.recent_errors.first() {
        info!(
            errors = summary.recent_errors.len(),
            latest_entity = %latest.entity_type,
            latest_error = %latest.error_message,
            "Recent errors"
        );
    }
}

/// Human-readable state report for the `status` command
pub fn render_report(summary: &CheckpointSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "OpenAlex ingestion state");
    let _ = writeln!(out, "Last updated: {}", summary.last_updated.format("%Y-%m-%d %H:%M:%S UTC"));
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "{:<14} {:<12} {:>8} {:>14}  {}",
        "ENTITY", "STATUS", "FILES", "RECORDS", "CURRENT FILE"
    );

    for kind in EntityKind::ALL {
        let records = summary
            .total_processed
            .get(&kind.count_key())
            .copied()
            .unwrap_or_default();
        let (status, files, current) = match summary.entities.get(kind.as_str()) {
            Some(e) => (
                e.status.as_str(),
                e.completed_files_count,
                e.last_processed_file.as_deref().unwrap_or("-"),
            ),
            None => ("not_started", 0, "-"),
        };
        let _ = writeln!(
            out,
            "{:<14} {:<12} {:>8} {:>14}  {}",
            kind.as_str(),
            status,
            files,
            records,
            current
        );
    }

    if !summary.recent_errors.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Recent errors:");
        for entry in &summary.recent_errors {
            let _ = writeln!(
                out,
                "  {} [{}] {}",
                entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                entry.entity_type,
                entry.error_message
            );
        }
    }
    out
}
