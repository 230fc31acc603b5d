//! Transaction boundary around one batch mutation.
//!
//! ```text
//!   Idle ──begin──▶ Open ──apply ok, commit──▶ Committed
//!                     │
//!                     └──apply err──rollback──▶ RolledBack
//! ```
//!
//! A mutation runs entirely inside one transaction on one connection. Either
//! every row it touches is committed, or none are: a failed statement aborts
//! the transaction, the manager rolls back, and the original error is returned
//! unchanged. A rollback failure is logged and otherwise ignored; the session
//! is left to discard the transaction when it is dropped.

use crate::metrics::MutationMetrics;
use crate::strategies::{DeleteAlgorithm, InsertAlgorithm};
use crate::{BenchResult, Movie};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_postgres::{Client, Transaction};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Insert,
    Delete,
}

/// Work that runs inside a transaction it does not own.
#[async_trait]
pub trait BatchMutation: Send + Sync {
    /// Strategy name reported in logs and outcomes.
    fn label(&self) -> &'static str;

    fn kind(&self) -> MutationKind;

    /// Rows handed to the mutation.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn apply(&self, tx: &Transaction<'_>) -> BenchResult<u64>;
}

pub struct InsertMany<'a> {
    pub algorithm: &'a dyn InsertAlgorithm,
    pub rows: &'a [Movie],
}

#[async_trait]
impl BatchMutation for InsertMany<'_> {
    fn label(&self) -> &'static str {
        self.algorithm.strategy().name()
    }

    fn kind(&self) -> MutationKind {
        MutationKind::Insert
    }

    fn len(&self) -> usize {
        self.rows.len()
    }

    async fn apply(&self, tx: &Transaction<'_>) -> BenchResult<u64> {
        self.algorithm.insert(tx, self.rows).await
    }
}

pub struct DeleteMany<'a> {
    pub algorithm: &'a dyn DeleteAlgorithm,
    pub ids: &'a [i32],
}

#[async_trait]
impl BatchMutation for DeleteMany<'_> {
    fn label(&self) -> &'static str {
        self.algorithm.strategy().name()
    }

    fn kind(&self) -> MutationKind {
        MutationKind::Delete
    }

    fn len(&self) -> usize {
        self.ids.len()
    }

    async fn apply(&self, tx: &Transaction<'_>) -> BenchResult<u64> {
        self.algorithm.delete(tx, self.ids).await
    }
}

/// Result of a committed mutation. `elapsed` spans begin through commit.
#[derive(Debug, Clone, Serialize)]
pub struct MutationOutcome {
    pub strategy: String,
    pub kind: MutationKind,
    pub rows: u64,
    pub elapsed: Duration,
}

impl MutationOutcome {
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1_000.0
    }
}

#[derive(Debug, Clone, Default)]
pub struct TransactionManager {
    metrics: Arc<MutationMetrics>,
}

impl TransactionManager {
    pub fn new(metrics: Arc<MutationMetrics>) -> Self {
        Self { metrics }
    }

    pub fn metrics(&self) -> &Arc<MutationMetrics> {
        &self.metrics
    }

    pub async fn execute(
        &self,
        client: &mut Client,
        mutation: &dyn BatchMutation,
    ) -> BenchResult<MutationOutcome> {
        let started = Instant::now();
        let tx = client.transaction().await?;
        self.metrics.record_begin();
        debug!(strategy = mutation.label(), rows = mutation.len(), "transaction open");

        let rows = match mutation.apply(&tx).await {
            Ok(rows) => rows,
            Err(err) => {
                self.metrics.record_rollback();
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(
                        strategy = mutation.label(),
                        error = %rollback_err,
                        "rollback failed after mutation error"
                    );
                }
                debug!(strategy = mutation.label(), error = %err, "transaction rolled back");
                return Err(err);
            }
        };

        let commit_started = Instant::now();
        if let Err(err) = tx.commit().await {
            self.metrics.record_rollback();
            return Err(err.into());
        }
        let elapsed = started.elapsed();
        self.metrics
            .record_commit(mutation.kind(), rows, commit_started.elapsed(), elapsed);

        let outcome = MutationOutcome {
            strategy: mutation.label().to_string(),
            kind: mutation.kind(),
            rows,
            elapsed,
        };
        info!(
            strategy = %outcome.strategy,
            kind = ?outcome.kind,
            rows = outcome.rows,
            elapsed_ms = outcome.elapsed_ms(),
            "mutation committed"
        );
        Ok(outcome)
    }
}
