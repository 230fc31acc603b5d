//! Caller-facing operations on the `movies` table.
//!
//! Every call opens its own connection; bulk mutations additionally run in a
//! single transaction through [`TransactionManager`].

use crate::config::BenchConfig;
use crate::connection::ConnectionFactory;
use crate::metrics::{MetricsSnapshot, MutationMetrics};
use crate::strategies::{delete_algorithm, insert_algorithm, DeleteRange, InsertStrategy};
use crate::txn::{
    BatchMutation, DeleteMany, InsertMany, MutationKind, MutationOutcome, TransactionManager,
};
use crate::{BenchError, BenchResult, DataGen, Movie};
use std::sync::Arc;
use std::time::Duration;
use tokio_postgres::Row;
use tracing::{debug, info, warn};

fn movie_from_row(row: &Row) -> Movie {
    Movie {
        id: row.get("id"),
        name: row.get("name"),
    }
}

pub struct MovieService {
    factory: ConnectionFactory,
    txn: TransactionManager,
    batch_size: usize,
    shuffle_seed: u64,
}

impl MovieService {
    pub fn new(factory: ConnectionFactory, config: &BenchConfig) -> Self {
        Self {
            factory,
            txn: TransactionManager::new(Arc::new(MutationMetrics::new())),
            batch_size: config.batch_size,
            shuffle_seed: config.shuffle_seed,
        }
    }

    pub fn from_config(config: &BenchConfig) -> BenchResult<Self> {
        config.validate()?;
        Ok(Self::new(ConnectionFactory::new(config)?, config))
    }

    pub fn factory(&self) -> &ConnectionFactory {
        &self.factory
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.txn.metrics().snapshot()
    }

    // ────────────────────────────────────────────────────────────────────────
    // Single-row operations
    // ────────────────────────────────────────────────────────────────────────

    /// Insert one row, returning the id the server assigned.
    pub async fn create(&self, name: &str) -> BenchResult<i32> {
        let client = self.factory.connect().await?;
        let row = client
            .query_one("INSERT INTO movies (name) VALUES ($1) RETURNING id", &[&name])
            .await?;
        Ok(row.get(0))
    }

    pub async fn get_all(&self) -> BenchResult<Vec<Movie>> {
        let client = self.factory.connect().await?;
        let rows = client
            .query("SELECT id, name FROM movies ORDER BY id", &[])
            .await?;
        Ok(rows.iter().map(movie_from_row).collect())
    }

    pub async fn get_by_id(&self, id: i32) -> BenchResult<Option<Movie>> {
        let client = self.factory.connect().await?;
        let row = client
            .query_opt("SELECT id, name FROM movies WHERE id = $1", &[&id])
            .await?;
        Ok(row.as_ref().map(movie_from_row))
    }

    /// Rename a row. Returns false when no row has `movie.id`.
    pub async fn update(&self, movie: &Movie) -> BenchResult<bool> {
        let client = self.factory.connect().await?;
        let n = client
            .execute(
                "UPDATE movies SET name = $2 WHERE id = $1",
                &[&movie.id, &movie.name],
            )
            .await?;
        Ok(n > 0)
    }

    pub async fn delete(&self, id: i32) -> BenchResult<bool> {
        let client = self.factory.connect().await?;
        let n = client
            .execute("DELETE FROM movies WHERE id = $1", &[&id])
            .await?;
        Ok(n > 0)
    }

    pub async fn count(&self) -> BenchResult<i64> {
        let client = self.factory.connect().await?;
        let row = client.query_one("SELECT count(*) FROM movies", &[]).await?;
        Ok(row.get(0))
    }

    pub async fn server_version(&self) -> BenchResult<String> {
        let client = self.factory.connect().await?;
        let row = client.query_one("SHOW server_version", &[]).await?;
        Ok(row.get(0))
    }

    // ────────────────────────────────────────────────────────────────────────
    // Table-wide operations
    // ────────────────────────────────────────────────────────────────────────

    /// Remove every row. The identity counter is left alone.
    pub async fn delete_all(&self) -> BenchResult<u64> {
        let client = self.factory.connect().await?;
        let n = client.execute("DELETE FROM movies", &[]).await?;
        info!(rows = n, "deleted all rows");
        Ok(n)
    }

    /// Restart the identity so the next inserted row gets id 1.
    ///
    /// Refused with [`BenchError::EmptyTableRequired`] while rows remain, since
    /// a restarted counter would collide with existing keys. The emptiness
    /// check and the restart happen under an exclusive lock.
    pub async fn reset_identity(&self) -> BenchResult<()> {
        let mut client = self.factory.connect().await?;
        let tx = client.transaction().await?;
        tx.batch_execute("LOCK TABLE movies IN ACCESS EXCLUSIVE MODE")
            .await?;
        let rows: i64 = tx
            .query_one("SELECT count(*) FROM movies", &[])
            .await?
            .get(0);
        if rows > 0 {
            if let Err(e) = tx.rollback().await {
                warn!(error = %e, "rollback failed after identity reset check");
            }
            return Err(BenchError::EmptyTableRequired { rows });
        }
        tx.batch_execute("ALTER TABLE movies ALTER COLUMN id RESTART WITH 1")
            .await?;
        tx.commit().await?;
        info!("identity reset");
        Ok(())
    }

    // ────────────────────────────────────────────────────────────────────────
    // Bulk mutations
    // ────────────────────────────────────────────────────────────────────────

    /// Generate `count` rows and insert them with `strategy` in one transaction.
    pub async fn create_many(
        &self,
        count: usize,
        strategy: InsertStrategy,
    ) -> BenchResult<MutationOutcome> {
        let rows = DataGen::from_entropy().movies(count);
        self.create_rows(&rows, strategy).await
    }

    /// Insert caller-supplied rows with `strategy` in one transaction.
    pub async fn create_rows(
        &self,
        rows: &[Movie],
        strategy: InsertStrategy,
    ) -> BenchResult<MutationOutcome> {
        let algorithm = insert_algorithm(strategy, self.batch_size);
        self.apply(&InsertMany {
            algorithm: algorithm.as_ref(),
            rows,
        })
        .await
    }

    /// Delete the ids of `range`, shuffled with the configured seed, in one
    /// transaction. Ids with no matching row are skipped.
    pub async fn delete_many(&self, range: DeleteRange) -> BenchResult<MutationOutcome> {
        let ids = DataGen::new(self.shuffle_seed).shuffled_ids(range.start_id(), range.count());
        let algorithm = delete_algorithm(range.strategy());
        self.apply(&DeleteMany {
            algorithm: algorithm.as_ref(),
            ids: &ids,
        })
        .await
    }

    /// Run any batch mutation inside its own transaction. An empty mutation
    /// returns immediately without touching the store.
    pub async fn apply(&self, mutation: &dyn BatchMutation) -> BenchResult<MutationOutcome> {
        if mutation.is_empty() {
            debug!(strategy = mutation.label(), "empty mutation skipped");
            return Ok(empty_outcome(mutation.label(), mutation.kind()));
        }
        let mut client = self.factory.connect().await?;
        self.txn.execute(&mut client, mutation).await
    }
}

fn empty_outcome(strategy: &str, kind: MutationKind) -> MutationOutcome {
    MutationOutcome {
        strategy: strategy.to_string(),
        kind,
        rows: 0,
        elapsed: Duration::ZERO,
    }
}
