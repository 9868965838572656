//! Destination table registry
//!
//! Every entity kind owns a fixed set of tables. Exactly one of them is the
//! primary table (one row per record); the rest hang off it. A table's
//! [`TableRole`] decides the conflict target of its upserts:
//!
//! | role          | conflict target            | on conflict                  |
//! |---------------|----------------------------|------------------------------|
//! | `Primary`     | record id column           | overwrite all other columns  |
//! | `OneToOne`    | owning entity's id column  | overwrite all other columns  |
//! | `Association` | natural composite key      | overwrite metric columns     |
//! | `Append`      | none                       | ignore                       |

mod tables;
mod value;

pub use tables::{primary_table, table_for, tables_for};
pub use value::SqlValue;

use crate::entity::EntityKind;
use crate::error::{IngestError, Result};
use crate::normalize::Row;
use std::fmt::Write;

/// Postgres column types used by the destination tables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    BigInt,
    Integer,
    Double,
    Boolean,
    Date,
    Timestamp,
    Jsonb,
}

impl ColumnType {
    pub fn sql_name(self) -> &'static str {
        match self {
            ColumnType::Text => "TEXT",
            ColumnType::BigInt => "BIGINT",
            ColumnType::Integer => "INTEGER",
            ColumnType::Double => "DOUBLE PRECISION",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Date => "DATE",
            ColumnType::Timestamp => "TIMESTAMP",
            ColumnType::Jsonb => "JSONB",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub ty: ColumnType,
}

/// How a table relates to the record it was derived from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableRole {
    /// Main entity table keyed by the record id
    Primary { id: &'static str },
    /// At most one row per owning record (`*_ids`, geo)
    OneToOne { owner: &'static str },
    /// Many rows per record, unique on `key`
    Association { key: &'static [&'static str] },
    /// No natural uniqueness
    Append,
}

/// One destination table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSpec {
    pub entity: EntityKind,
    pub name: &'static str,
    pub role: TableRole,
    pub columns: &'static [Column],
}

impl TableSpec {
    /// Columns identifying a row for upserts; empty for append-only tables
    pub fn conflict_target(&self) -> Vec<&'static str> {
        match self.role {
            TableRole::Primary { id } => vec![id],
            TableRole::OneToOne { owner } => vec![owner],
            TableRole::Association { key } => key.to_vec(),
            TableRole::Append => Vec::new(),
        }
    }

    pub fn is_primary(&self) -> bool {
        matches!(self.role, TableRole::Primary { .. })
    }

    /// Columns rewritten when an upsert hits an existing row
    pub fn update_columns(&self) -> Vec<&'static str> {
        let target = self.conflict_target();
        self.columns
            .iter()
            .map(|c| c.name)
            .filter(|name| !target.contains(name))
            .collect()
    }

    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.name).collect()
    }

    /// Positions of the conflict target columns in `columns`
    pub fn key_positions(&self) -> Vec<usize> {
        self.conflict_target()
            .iter()
            .filter_map(|key| self.columns.iter().position(|c| c.name == *key))
            .collect()
    }

    /// Convert a normalized row into column-ordered typed values.
    ///
    /// Missing columns become NULL; unknown keys in `row` are ignored. A NULL
    /// in a conflict target column is rejected since the row could never be
    /// matched again.
    pub fn coerce_row(&self, row: &Row) -> Result<Vec<SqlValue>> {
        let target = self.conflict_target();
        self.columns
            .iter()
            .map(|column| {
                let value = SqlValue::coerce(column.ty, row.get(column.name)).map_err(|e| {
                    IngestError::Normalize(format!("{}.{}: {}", self.name, column.name, e))
                })?;
                if value.is_null() && target.contains(&column.name) {
                    return Err(IngestError::Normalize(format!(
                        "{}.{} is part of the conflict key and must not be null",
                        self.name, column.name
                    )));
                }
                Ok(value)
            })
            .collect()
    }

    /// `CREATE TABLE IF NOT EXISTS` with a constraint matching the conflict target
    pub fn create_table_sql(&self, schema: &str) -> String {
        let mut sql = format!(
            "CREATE TABLE IF NOT EXISTS {}.{} (\n",
            quote_ident(schema),
            quote_ident(self.name)
        );
        let definitions: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("    {} {}", quote_ident(c.name), c.ty.sql_name()))
            .collect();
        sql.push_str(&definitions.join(",\n"));

        let target: Vec<String> = self.conflict_target().iter().map(|c| quote_ident(c)).collect();
        if !target.is_empty() {
            let _ = write!(sql, ",\n    PRIMARY KEY ({})", target.join(", "));
        }
        sql.push_str("\n)");
        sql
    }
}

/// Double-quote a Postgres identifier, escaping embedded quotes
pub(crate) fn quote_ident(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// DDL for the schema and every registered table
pub fn create_schema_sql(schema: &str) -> Vec<String> {
    let mut statements = vec![format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(schema))];
    for kind in EntityKind::ALL {
        statements.extend(tables_for(kind).iter().map(|t| t.create_table_sql(schema)));
    }
    statements
}
