//! Bulk insert/delete algorithms and the selector → algorithm mapping.
//!
//! Every algorithm runs inside a transaction it does not own; committing or
//! rolling back is left to [`crate::txn::TransactionManager`].

pub mod delete;
pub mod insert;
pub mod tvp;

use crate::{BenchError, BenchResult, Movie};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio_postgres::Transaction;

pub use delete::{TempTableBulkDelete, TvpTableDelete, WhereInDelete};
pub use insert::{
    BatchedInsert, BulkLoadInsert, NormalInsert, TvpRecordStreamInsert, TvpTableInsert,
    DEFAULT_BATCH_SIZE, MAX_BATCH_SIZE,
};

// ────────────────────────────────────────────────────────────────────────────────
// Strategy selectors
// ────────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InsertStrategy {
    /// One INSERT per row.
    #[serde(rename = "normal")]
    Normal,
    /// Multi-row VALUES lists of a fixed batch size.
    #[serde(rename = "batched")]
    Batched,
    /// Binary COPY.
    #[serde(rename = "bulk")]
    BulkLoad,
    /// Rows materialized into a composite-array parameter.
    #[serde(rename = "tvp")]
    TvpTable,
    /// Composite-array parameter encoded lazily from the rows.
    #[serde(rename = "tvp-records")]
    TvpRecordStream,
}

impl InsertStrategy {
    pub const ALL: [InsertStrategy; 5] = [
        InsertStrategy::Normal,
        InsertStrategy::Batched,
        InsertStrategy::BulkLoad,
        InsertStrategy::TvpTable,
        InsertStrategy::TvpRecordStream,
    ];

    pub fn name(self) -> &'static str {
        match self {
            InsertStrategy::Normal => "normal",
            InsertStrategy::Batched => "batched",
            InsertStrategy::BulkLoad => "bulk",
            InsertStrategy::TvpTable => "tvp",
            InsertStrategy::TvpRecordStream => "tvp-records",
        }
    }

    /// Stable numeric selector.
    pub fn ordinal(self) -> i32 {
        match self {
            InsertStrategy::Normal => 0,
            InsertStrategy::Batched => 1,
            InsertStrategy::BulkLoad => 2,
            InsertStrategy::TvpTable => 3,
            InsertStrategy::TvpRecordStream => 4,
        }
    }
}

impl fmt::Display for InsertStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<i32> for InsertStrategy {
    type Error = BenchError;

    fn try_from(raw: i32) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|s| s.ordinal() == raw)
            .ok_or_else(|| BenchError::UnsupportedStrategy {
                kind: "insert",
                value: raw.to_string(),
            })
    }
}

impl FromStr for InsertStrategy {
    type Err = BenchError;

    /// Accepts the strategy name (case-insensitive) or its ordinal.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(raw) = s.parse::<i32>() {
            return Self::try_from(raw);
        }
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| BenchError::UnsupportedStrategy {
                kind: "insert",
                value: s.to_string(),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeleteStrategy {
    /// `id = ANY($1)` membership predicate.
    #[serde(rename = "in")]
    WhereIn,
    /// Ids materialized into a composite-array parameter and joined.
    #[serde(rename = "tvp")]
    TvpTable,
    /// Ids copied into a transaction-scoped temp table and joined.
    #[serde(rename = "bulk")]
    TempTableBulk,
}

impl DeleteStrategy {
    pub const ALL: [DeleteStrategy; 3] = [
        DeleteStrategy::WhereIn,
        DeleteStrategy::TvpTable,
        DeleteStrategy::TempTableBulk,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DeleteStrategy::WhereIn => "in",
            DeleteStrategy::TvpTable => "tvp",
            DeleteStrategy::TempTableBulk => "bulk",
        }
    }

    pub fn ordinal(self) -> i32 {
        match self {
            DeleteStrategy::WhereIn => 0,
            DeleteStrategy::TvpTable => 1,
            DeleteStrategy::TempTableBulk => 2,
        }
    }
}

impl fmt::Display for DeleteStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<i32> for DeleteStrategy {
    type Error = BenchError;

    fn try_from(raw: i32) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|s| s.ordinal() == raw)
            .ok_or_else(|| BenchError::UnsupportedStrategy {
                kind: "delete",
                value: raw.to_string(),
            })
    }
}

impl FromStr for DeleteStrategy {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(raw) = s.parse::<i32>() {
            return Self::try_from(raw);
        }
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| BenchError::UnsupportedStrategy {
                kind: "delete",
                value: s.to_string(),
            })
    }
}

// ────────────────────────────────────────────────────────────────────────────────
// Delete range
// ────────────────────────────────────────────────────────────────────────────────

/// Contiguous id interval `[start_id, start_id + count)` plus the strategy
/// used to delete it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawDeleteRange")]
pub struct DeleteRange {
    start_id: i32,
    count: usize,
    strategy: DeleteStrategy,
}

impl DeleteRange {
    pub fn new(start_id: i32, count: usize, strategy: DeleteStrategy) -> BenchResult<Self> {
        if start_id < 1 {
            return Err(BenchError::InvalidRange(format!(
                "start id must be >= 1, got {start_id}"
            )));
        }
        let fits = i64::try_from(count)
            .ok()
            .and_then(|count| (start_id as i64).checked_add(count))
            .is_some_and(|end| end <= i32::MAX as i64 + 1);
        if !fits {
            return Err(BenchError::InvalidRange(format!(
                "[{start_id}, {start_id} + {count}) exceeds the id space"
            )));
        }
        Ok(Self {
            start_id,
            count,
            strategy,
        })
    }

    pub fn start_id(&self) -> i32 {
        self.start_id
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn strategy(&self) -> DeleteStrategy {
        self.strategy
    }

    /// Exclusive upper bound, widened so `i32::MAX` stays representable.
    pub fn end_id(&self) -> i64 {
        self.start_id as i64 + self.count as i64
    }

    pub fn contains(&self, id: i32) -> bool {
        id >= self.start_id && (id as i64) < self.end_id()
    }
}

/// Unchecked wire form; deserialized ranges are validated through `new`.
#[derive(Deserialize)]
struct RawDeleteRange {
    start_id: i32,
    count: usize,
    strategy: DeleteStrategy,
}

impl TryFrom<RawDeleteRange> for DeleteRange {
    type Error = BenchError;

    fn try_from(raw: RawDeleteRange) -> Result<Self, Self::Error> {
        DeleteRange::new(raw.start_id, raw.count, raw.strategy)
    }
}

// ────────────────────────────────────────────────────────────────────────────────
// Algorithm traits + dispatch
// ────────────────────────────────────────────────────────────────────────────────

/// Writes a set of rows inside the caller's transaction.
#[async_trait]
pub trait InsertAlgorithm: Send + Sync {
    fn strategy(&self) -> InsertStrategy;

    /// Insert every row, returning the number written. An empty slice issues
    /// no statement.
    async fn insert(&self, tx: &Transaction<'_>, rows: &[Movie]) -> BenchResult<u64>;
}

/// Removes a set of ids inside the caller's transaction.
#[async_trait]
pub trait DeleteAlgorithm: Send + Sync {
    fn strategy(&self) -> DeleteStrategy;

    /// Delete every row whose id is in `ids`, returning the number removed.
    /// An empty slice issues no statement.
    async fn delete(&self, tx: &Transaction<'_>, ids: &[i32]) -> BenchResult<u64>;
}

pub fn insert_algorithm(strategy: InsertStrategy, batch_size: usize) -> Box<dyn InsertAlgorithm> {
    match strategy {
        InsertStrategy::Normal => Box::new(NormalInsert),
        InsertStrategy::Batched => Box::new(BatchedInsert::new(batch_size)),
        InsertStrategy::BulkLoad => Box::new(BulkLoadInsert),
        InsertStrategy::TvpTable => Box::new(TvpTableInsert),
        InsertStrategy::TvpRecordStream => Box::new(TvpRecordStreamInsert),
    }
}

pub fn delete_algorithm(strategy: DeleteStrategy) -> Box<dyn DeleteAlgorithm> {
    match strategy {
        DeleteStrategy::WhereIn => Box::new(WhereInDelete),
        DeleteStrategy::TvpTable => Box::new(TvpTableDelete),
        DeleteStrategy::TempTableBulk => Box::new(TempTableBulkDelete),
    }
}

/// Map a raw numeric selector straight to its insert algorithm.
pub fn resolve_insert(raw: i32, batch_size: usize) -> BenchResult<Box<dyn InsertAlgorithm>> {
    Ok(insert_algorithm(InsertStrategy::try_from(raw)?, batch_size))
}

/// Map a raw numeric selector straight to its delete algorithm.
pub fn resolve_delete(raw: i32) -> BenchResult<Box<dyn DeleteAlgorithm>> {
    Ok(delete_algorithm(DeleteStrategy::try_from(raw)?))
}
