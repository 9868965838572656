//! Postgres sink

use super::{Sink, TableBatch};
use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::schema::{create_schema_sql, quote_ident, SqlValue, TableSpec};
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::query_builder::Separated;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use std::fmt::Display;
use tracing::{debug, info, instrument};

/// Postgres accepts at most this many bind parameters per statement
pub const MAX_BIND_PARAMS: usize = 65_535;

/// Upserts table batches into a Postgres schema
#[derive(Clone)]
pub struct PgSink {
    pool: PgPool,
    schema: String,
}

impl PgSink {
    pub fn new(pool: PgPool, schema: impl Into<String>) -> Self {
        Self {
            pool,
            schema: schema.into(),
        }
    }

    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(config.connect_options()?)
            .await?;
        info!(schema = %config.schema, "Connected to database");
        Ok(Self::new(pool, config.schema.clone()))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the schema and every destination table if missing
    pub async fn ensure_schema(&self) -> Result<()> {
        let statements = create_schema_sql(&self.schema);
        let mut tx = self.pool.begin().await?;
        for statement in &statements {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        info!(schema = %self.schema, statements = statements.len(), "Schema ensured");
        Ok(())
    }

    async fn upsert_chunk(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        table: &TableSpec,
        rows: &[Vec<SqlValue>],
    ) -> Result<u64> {
        let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(insert_prefix(&self.schema, table));

        query_builder.push_values(rows, |mut b, row| {
            for value in row {
                push_value(&mut b, value);
            }
        });
        query_builder.push(conflict_clause(table));

        let result = query_builder.build().execute(&mut **tx).await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl Sink for PgSink {
    #[instrument(skip(self, batches), fields(tables = batches.len()))]
    async fn write(&self, batches: &[TableBatch]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut affected = 0;

        for batch in batches.iter().filter(|b| !b.is_empty()) {
            let chunk_size = rows_per_statement(batch.table);
            for chunk in batch.rows.chunks(chunk_size) {
                affected += self.upsert_chunk(&mut tx, batch.table, chunk).await?;
            }
            debug!(table = batch.table.name, rows = batch.len(), "Upserted table batch");
        }

        // Dropping an uncommitted transaction rolls it back.
        tx.commit().await?;
        Ok(affected)
    }
}

fn insert_prefix(schema: &str, table: &TableSpec) -> String {
    let columns: Vec<String> = table.columns.iter().map(|c| quote_ident(c.name)).collect();
    format!(
        "INSERT INTO {}.{} ({}) ",
        quote_ident(schema),
        quote_ident(table.name),
        columns.join(", ")
    )
}

/// `ON CONFLICT` tail for a table's role
fn conflict_clause(table: &TableSpec) -> String {
    let target = table.conflict_target();
    if target.is_empty() {
        return " ON CONFLICT DO NOTHING".to_string();
    }

    let target: Vec<String> = target.iter().map(|c| quote_ident(c)).collect();
    let updates = table.update_columns();
    if updates.is_empty() {
        return format!(" ON CONFLICT ({}) DO NOTHING", target.join(", "));
    }

    let assignments: Vec<String> = updates
        .iter()
        .map(|c| format!("{0} = EXCLUDED.{0}", quote_ident(c)))
        .collect();
    format!(
        " ON CONFLICT ({}) DO UPDATE SET {}",
        target.join(", "),
        assignments.join(", ")
    )
}

fn rows_per_statement(table: &TableSpec) -> usize {
    (MAX_BIND_PARAMS / table.columns.len().max(1)).max(1)
}

fn push_value<Sep: Display>(b: &mut Separated<'_, '_, Postgres, Sep>, value: &SqlValue) {
    match value {
        SqlValue::Text(v) => b.push_bind(v.clone()),
        SqlValue::BigInt(v) => b.push_bind(*v),
        SqlValue::Integer(v) => b.push_bind(*v),
        SqlValue::Double(v) => b.push_bind(*v),
        SqlValue::Boolean(v) => b.push_bind(*v),
        SqlValue::Date(v) => b.push_bind(*v),
        SqlValue::Timestamp(v) => b.push_bind(*v),
        SqlValue::Json(v) => b.push_bind(v.clone()),
    };
}
