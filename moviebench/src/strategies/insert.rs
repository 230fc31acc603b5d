//! The five insert algorithms.

use super::tvp::{MovieInsertRecord, RecordStream};
use super::{InsertAlgorithm, InsertStrategy};
use crate::{BenchResult, Movie};
use async_trait::async_trait;
use futures_util::pin_mut;
use std::fmt::Write as _;
use tokio_postgres::binary_copy::BinaryCopyInWriter;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::Transaction;
use tracing::debug;

/// Rows per statement for [`BatchedInsert`] unless configured otherwise.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Bind parameters per statement are capped by the wire protocol.
pub const MAX_BATCH_SIZE: usize = u16::MAX as usize;

const INSERT_ONE_SQL: &str = "INSERT INTO movies (name) VALUES ($1)";
const COPY_MOVIES_SQL: &str = "COPY movies (name) FROM STDIN (FORMAT binary)";
const COPY_MOVIES_TYPES: &[Type] = &[Type::VARCHAR];
const INSERT_FROM_TVP_SQL: &str =
    "INSERT INTO movies (name) SELECT name FROM unnest($1::tvp_movies_insert[])";

fn name_params(rows: &[Movie]) -> Vec<&(dyn ToSql + Sync)> {
    rows.iter()
        .map(|movie| &movie.name as &(dyn ToSql + Sync))
        .collect()
}

// ────────────────────────────────────────────────────────────────────────────────
// Normal
// ────────────────────────────────────────────────────────────────────────────────

/// One prepared single-row INSERT executed per row.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalInsert;

#[async_trait]
impl InsertAlgorithm for NormalInsert {
    fn strategy(&self) -> InsertStrategy {
        InsertStrategy::Normal
    }

    async fn insert(&self, tx: &Transaction<'_>, rows: &[Movie]) -> BenchResult<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        let stmt = tx.prepare(INSERT_ONE_SQL).await?;
        let mut written = 0;
        for movie in rows {
            written += tx.execute(&stmt, &[&movie.name]).await?;
        }
        Ok(written)
    }
}

// ────────────────────────────────────────────────────────────────────────────────
// Batched
// ────────────────────────────────────────────────────────────────────────────────

/// How `count` rows split into multi-row statements.
///
/// The remainder (`count % batch_size`) goes first as one short statement so
/// every later statement has exactly `batch_size` rows and can share a single
/// prepared statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPlan {
    pub batch_size: usize,
    pub remainder: usize,
    pub full_batches: usize,
}

impl BatchPlan {
    pub fn new(count: usize, batch_size: usize) -> Self {
        let batch_size = batch_size.clamp(1, MAX_BATCH_SIZE);
        Self {
            batch_size,
            remainder: count % batch_size,
            full_batches: count / batch_size,
        }
    }

    /// Statements the plan sends.
    pub fn statements(&self) -> usize {
        self.full_batches + usize::from(self.remainder > 0)
    }
}

/// `INSERT INTO movies (name) VALUES ($1), ($2), …` for `rows` rows.
pub fn values_insert_sql(rows: usize) -> String {
    let mut sql = String::with_capacity(32 + rows * 7);
    sql.push_str("INSERT INTO movies (name) VALUES ");
    for i in 1..=rows {
        if i > 1 {
            sql.push_str(", ");
        }
        let _ = write!(sql, "(${i})");
    }
    sql
}

/// Multi-row VALUES statements of a fixed batch size.
#[derive(Debug, Clone, Copy)]
pub struct BatchedInsert {
    batch_size: usize,
}

impl BatchedInsert {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.clamp(1, MAX_BATCH_SIZE),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

impl Default for BatchedInsert {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}

#[async_trait]
impl InsertAlgorithm for BatchedInsert {
    fn strategy(&self) -> InsertStrategy {
        InsertStrategy::Batched
    }

    async fn insert(&self, tx: &Transaction<'_>, rows: &[Movie]) -> BenchResult<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        let plan = BatchPlan::new(rows.len(), self.batch_size);
        debug!(
            rows = rows.len(),
            batch_size = plan.batch_size,
            statements = plan.statements(),
            "batched insert plan"
        );

        let (head, tail) = rows.split_at(plan.remainder);
        let mut written = 0;
        if !head.is_empty() {
            let sql = values_insert_sql(head.len());
            written += tx.execute(sql.as_str(), &name_params(head)).await?;
        }
        if tail.is_empty() {
            return Ok(written);
        }

        let stmt = tx.prepare(&values_insert_sql(plan.batch_size)).await?;
        for chunk in tail.chunks_exact(plan.batch_size) {
            written += tx.execute(&stmt, &name_params(chunk)).await?;
        }
        Ok(written)
    }
}

// ────────────────────────────────────────────────────────────────────────────────
// Bulk load
// ────────────────────────────────────────────────────────────────────────────────

/// All rows through one binary COPY.
#[derive(Debug, Clone, Copy, Default)]
pub struct BulkLoadInsert;

#[async_trait]
impl InsertAlgorithm for BulkLoadInsert {
    fn strategy(&self) -> InsertStrategy {
        InsertStrategy::BulkLoad
    }

    async fn insert(&self, tx: &Transaction<'_>, rows: &[Movie]) -> BenchResult<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        let sink = tx.copy_in(COPY_MOVIES_SQL).await?;
        let writer = BinaryCopyInWriter::new(sink, COPY_MOVIES_TYPES);
        pin_mut!(writer);
        for movie in rows {
            writer.as_mut().write(&[&movie.name]).await?;
        }
        Ok(writer.finish().await?)
    }
}

// ────────────────────────────────────────────────────────────────────────────────
// Table-valued parameters
// ────────────────────────────────────────────────────────────────────────────────

/// Rows copied into `Vec<MovieInsertRecord>` and bound as one parameter.
#[derive(Debug, Clone, Copy, Default)]
pub struct TvpTableInsert;

#[async_trait]
impl InsertAlgorithm for TvpTableInsert {
    fn strategy(&self) -> InsertStrategy {
        InsertStrategy::TvpTable
    }

    async fn insert(&self, tx: &Transaction<'_>, rows: &[Movie]) -> BenchResult<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        let table: Vec<MovieInsertRecord> = rows.iter().map(MovieInsertRecord::from).collect();
        Ok(tx.execute(INSERT_FROM_TVP_SQL, &[&table]).await?)
    }
}

/// Same statement as [`TvpTableInsert`], with records encoded straight from
/// the borrowed rows.
#[derive(Debug, Clone, Copy, Default)]
pub struct TvpRecordStreamInsert;

#[async_trait]
impl InsertAlgorithm for TvpRecordStreamInsert {
    fn strategy(&self) -> InsertStrategy {
        InsertStrategy::TvpRecordStream
    }

    async fn insert(&self, tx: &Transaction<'_>, rows: &[Movie]) -> BenchResult<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        let records = RecordStream::new(rows);
        Ok(tx.execute(INSERT_FROM_TVP_SQL, &[&records]).await?)
    }
}
