//! The three delete algorithms.

use super::tvp::IdRecord;
use super::{DeleteAlgorithm, DeleteStrategy};
use crate::BenchResult;
use async_trait::async_trait;
use futures_util::pin_mut;
use tokio_postgres::binary_copy::BinaryCopyInWriter;
use tokio_postgres::types::Type;
use tokio_postgres::Transaction;
use tracing::debug;

const DELETE_ANY_SQL: &str = "DELETE FROM movies WHERE id = ANY($1)";
const DELETE_USING_TVP_SQL: &str =
    "DELETE FROM movies m USING unnest($1::tvp_ids[]) AS ids WHERE ids.id = m.id";

// ────────────────────────────────────────────────────────────────────────────────
// Membership predicate
// ────────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct WhereInDelete;

#[async_trait]
impl DeleteAlgorithm for WhereInDelete {
    fn strategy(&self) -> DeleteStrategy {
        DeleteStrategy::WhereIn
    }

    async fn delete(&self, tx: &Transaction<'_>, ids: &[i32]) -> BenchResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        Ok(tx.execute(DELETE_ANY_SQL, &[&ids]).await?)
    }
}

// ────────────────────────────────────────────────────────────────────────────────
// Table-valued parameter
// ────────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct TvpTableDelete;

#[async_trait]
impl DeleteAlgorithm for TvpTableDelete {
    fn strategy(&self) -> DeleteStrategy {
        DeleteStrategy::TvpTable
    }

    async fn delete(&self, tx: &Transaction<'_>, ids: &[i32]) -> BenchResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let table: Vec<IdRecord> = ids.iter().map(|&id| IdRecord { id }).collect();
        Ok(tx.execute(DELETE_USING_TVP_SQL, &[&table]).await?)
    }
}

// ────────────────────────────────────────────────────────────────────────────────
// Temp table + bulk load
// ────────────────────────────────────────────────────────────────────────────────

/// Transaction-scoped scratch table holding the ids to delete.
///
/// The table is created `ON COMMIT DROP`, so it never outlives the
/// transaction even when [`TempIdTable::release`] is skipped by an error.
#[must_use = "release the temp table once the delete has run"]
pub struct TempIdTable<'t, 'c> {
    tx: &'t Transaction<'c>,
}

impl<'t, 'c> TempIdTable<'t, 'c> {
    pub const NAME: &'static str = "tmp_delete_ids";

    const CREATE_SQL: &'static str =
        "CREATE TEMPORARY TABLE tmp_delete_ids (id INTEGER NOT NULL PRIMARY KEY) ON COMMIT DROP";
    const COPY_SQL: &'static str = "COPY tmp_delete_ids (id) FROM STDIN (FORMAT binary)";
    const DELETE_SQL: &'static str = "DELETE FROM movies m USING tmp_delete_ids t WHERE t.id = m.id";
    const DROP_SQL: &'static str = "DROP TABLE tmp_delete_ids";

    pub async fn create(tx: &'t Transaction<'c>) -> BenchResult<Self> {
        tx.batch_execute(Self::CREATE_SQL).await?;
        Ok(Self { tx })
    }

    /// Bulk-load `ids` through binary COPY.
    pub async fn load(&self, ids: &[i32]) -> BenchResult<u64> {
        let sink = self.tx.copy_in(Self::COPY_SQL).await?;
        let writer = BinaryCopyInWriter::new(sink, &[Type::INT4]);
        pin_mut!(writer);
        for id in ids {
            writer.as_mut().write(&[id]).await?;
        }
        Ok(writer.finish().await?)
    }

    pub async fn delete_matching(&self) -> BenchResult<u64> {
        Ok(self.tx.execute(Self::DELETE_SQL, &[]).await?)
    }

    pub async fn release(self) -> BenchResult<()> {
        self.tx.batch_execute(Self::DROP_SQL).await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TempTableBulkDelete;

#[async_trait]
impl DeleteAlgorithm for TempTableBulkDelete {
    fn strategy(&self) -> DeleteStrategy {
        DeleteStrategy::TempTableBulk
    }

    async fn delete(&self, tx: &Transaction<'_>, ids: &[i32]) -> BenchResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let table = TempIdTable::create(tx).await?;
        let loaded = table.load(ids).await?;
        let deleted = table.delete_matching().await?;
        table.release().await?;
        debug!(
            table = TempIdTable::NAME,
            loaded, deleted, "temp table delete"
        );
        Ok(deleted)
    }
}
