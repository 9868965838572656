//! Destination stores
//!
//! One [`Sink::write`] call is one flush: every table batch in it is
//! committed together or not at all.

pub mod memory;
pub mod postgres;

pub use memory::MemorySink;
pub use postgres::PgSink;

use crate::error::Result;
use crate::schema::{SqlValue, TableSpec};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Buffered rows for one table, values in `table.columns` order
#[derive(Debug, Clone, PartialEq)]
pub struct TableBatch {
    pub table: &'static TableSpec,
    pub rows: Vec<Vec<SqlValue>>,
}

impl TableBatch {
    pub fn new(table: &'static TableSpec) -> Self {
        Self { table, rows: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Collapse rows sharing a conflict key, keeping the last values at the
    /// position of the first occurrence. Append-only tables are untouched.
    pub fn dedup_by_key(&mut self) {
        let positions = self.table.key_positions();
        if positions.is_empty() {
            return;
        }

        let mut seen: HashMap<Vec<String>, usize> = HashMap::with_capacity(self.rows.len());
        let mut unique: Vec<Vec<SqlValue>> = Vec::with_capacity(self.rows.len());
        for row in self.rows.drain(..) {
            let key = row_key(&row, &positions);
            match seen.get(&key) {
                Some(&slot) => unique[slot] = row,
                None => {
                    seen.insert(key, unique.len());
                    unique.push(row);
                },
            }
        }
        self.rows = unique;
    }
}

pub(crate) fn row_key(row: &[SqlValue], positions: &[usize]) -> Vec<String> {
    positions
        .iter()
        .map(|&i| row.get(i).map(SqlValue::key_repr).unwrap_or_default())
        .collect()
}

/// Transactional multi-table writer
#[async_trait]
pub trait Sink: Send + Sync {
    /// Write all batches atomically; returns rows inserted or updated
    async fn write(&self, batches: &[TableBatch]) -> Result<u64>;
}

#[async_trait]
impl<T: Sink + ?Sized> Sink for Arc<T> {
    async fn write(&self, batches: &[TableBatch]) -> Result<u64> {
        (**self).write(batches).await
    }
}
