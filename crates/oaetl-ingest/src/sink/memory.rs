//! In-process sink
//!
//! Applies the same conflict rules as the Postgres sink to tables held in
//! memory. Used by `--dry-run` (which only counts rows) and by tests, which
//! can make upcoming writes fail to exercise rollback paths.

use super::{row_key, Sink, TableBatch};
use crate::error::{IngestError, Result};
use crate::schema::{SqlValue, TableSpec};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

#[derive(Debug, Clone, Default)]
struct StoredTable {
    rows: Vec<Vec<SqlValue>>,
    index: HashMap<Vec<String>, usize>,
}

impl StoredTable {
    fn apply(&mut self, table: &TableSpec, rows: &[Vec<SqlValue>]) -> u64 {
        let positions = table.key_positions();
        let overwrite = !table.update_columns().is_empty();
        let mut affected = 0;

        for row in rows {
            if positions.is_empty() {
                self.rows.push(row.clone());
                affected += 1;
                continue;
            }
            let key = row_key(row, &positions);
            match self.index.get(&key) {
                Some(&slot) if overwrite => {
                    self.rows[slot] = row.clone();
                    affected += 1;
                },
                Some(_) => {},
                None => {
                    self.index.insert(key, self.rows.len());
                    self.rows.push(row.clone());
                    affected += 1;
                },
            }
        }
        affected
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: BTreeMap<&'static str, StoredTable>,
    columns: BTreeMap<&'static str, &'static TableSpec>,
    fail_next: usize,
    writes: usize,
    rows_written: u64,
}

#[derive(Debug)]
pub struct MemorySink {
    state: Mutex<MemoryState>,
    retain_rows: bool,
}

impl MemorySink {
    /// Keeps every row, for inspection
    pub fn new() -> Self {
        Self {
            state: Mutex::default(),
            retain_rows: true,
        }
    }

    /// Counts rows without keeping them
    pub fn discarding() -> Self {
        Self {
            state: Mutex::default(),
            retain_rows: false,
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make the next `n` writes fail without applying anything
    pub fn fail_next(&self, n: usize) {
        self.lock().fail_next = n;
    }

    /// Successful writes so far
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    pub fn rows_written(&self) -> u64 {
        self.lock().rows_written
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.lock().tables.get(table).map_or(0, |t| t.rows.len())
    }

    /// Rows of `table` as column-name maps, in insertion order
    pub fn rows(&self, table: &str) -> Vec<BTreeMap<String, SqlValue>> {
        let state = self.lock();
        let (Some(stored), Some(spec)) = (state.tables.get(table), state.columns.get(table)) else {
            return Vec::new();
        };
        stored
            .rows
            .iter()
            .map(|row| {
                spec.columns
                    .iter()
                    .zip(row)
                    .map(|(c, v)| (c.name.to_string(), v.clone()))
                    .collect()
            })
            .collect()
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sink for MemorySink {
    async fn write(&self, batches: &[TableBatch]) -> Result<u64> {
        let mut state = self.lock();

        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(IngestError::Database(sqlx::Error::Protocol(
                "injected write failure".to_string(),
            )));
        }

        let mut affected = 0;
        if self.retain_rows {
            // Stage on copies so a write is all-or-nothing.
            let mut staged: BTreeMap<&'static str, StoredTable> = BTreeMap::new();
            for batch in batches.iter().filter(|b| !b.is_empty()) {
                let name = batch.table.name;
                if !staged.contains_key(name) {
                    let current = state.tables.get(name).cloned().unwrap_or_default();
                    staged.insert(name, current);
                }
                if let Some(table) = staged.get_mut(name) {
                    affected += table.apply(batch.table, &batch.rows);
                }
                state.columns.insert(name, batch.table);
            }
            state.tables.extend(staged);
        } else {
            affected = batches.iter().map(|b| b.len() as u64).sum();
        }

        state.writes += 1;
        state.rows_written += affected;
        debug!(tables = batches.len(), rows = affected, "Memory sink write");
        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityKind;
    use crate::schema::{primary_table, table_for};

    fn author_row(id: &str, name: &str) -> Vec<SqlValue> {
        let table = primary_table(EntityKind::Authors);
        table
            .columns
            .iter()
            .map(|c| match c.name {
                "id" => SqlValue::Text(Some(id.to_string())),
                "display_name" => SqlValue::Text(Some(name.to_string())),
                _ => SqlValue::null(c.ty),
            })
            .collect()
    }

    fn batch(rows: Vec<Vec<SqlValue>>) -> TableBatch {
        TableBatch {
            table: primary_table(EntityKind::Authors),
            rows,
        }
    }

    #[tokio::test]
    async fn test_upsert_overwrites_by_id() {
        let sink = MemorySink::new();
        sink.write(&[batch(vec![author_row("A1", "Ada")])]).await.unwrap();
        sink.write(&[batch(vec![author_row("A1", "Ada L."), author_row("A2", "Bob")])])
            .await
            .unwrap();

        let rows = sink.rows("authors");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["display_name"], SqlValue::Text(Some("Ada L.".into())));
    }

    #[tokio::test]
    async fn test_injected_failure_applies_nothing() {
        let sink = MemorySink::new();
        sink.fail_next(1);

        assert!(sink.write(&[batch(vec![author_row("A1", "Ada")])]).await.is_err());
        assert_eq!(sink.row_count("authors"), 0);

        sink.write(&[batch(vec![author_row("A1", "Ada")])]).await.unwrap();
        assert_eq!(sink.row_count("authors"), 1);
        assert_eq!(sink.write_count(), 1);
    }

    #[tokio::test]
    async fn test_edge_conflict_is_ignored() {
        let table = table_for(EntityKind::Works, "works_referenced_works").unwrap();
        let edge = vec![
            SqlValue::Text(Some("W1".into())),
            SqlValue::Text(Some("W2".into())),
        ];
        let sink = MemorySink::new();
        let batches = [TableBatch { table, rows: vec![edge] }];

        assert_eq!(sink.write(&batches).await.unwrap(), 1);
        assert_eq!(sink.write(&batches).await.unwrap(), 0);
        assert_eq!(sink.row_count("works_referenced_works"), 1);
    }

    #[tokio::test]
    async fn test_discarding_sink_only_counts() {
        let sink = MemorySink::discarding();
        let written = sink
            .write(&[batch(vec![author_row("A1", "Ada"), author_row("A2", "Bob")])])
            .await
            .unwrap();

        assert_eq!(written, 2);
        assert_eq!(sink.rows_written(), 2);
        assert_eq!(sink.row_count("authors"), 0);
    }
}
