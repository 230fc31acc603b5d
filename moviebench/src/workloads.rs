//! Benchmark workload definitions.
//!
//! Each workload drives one strategy through a number of rounds against a
//! [`MovieService`] and returns a `WorkloadResult`. Only the mutation itself is
//! timed; table preparation between rounds is not.

use crate::service::MovieService;
use crate::strategies::{DeleteRange, DeleteStrategy, InsertStrategy};
use crate::{BenchResult, LatencyRecorder, WorkloadResult};
use tracing::{info, warn};

// ────────────────────────────────────────────────────────────────────────────────
// Config
// ────────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct WorkloadConfig {
    pub count: usize,  // rows per round
    pub rounds: usize, // measured mutations per strategy
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            count: 10_000,
            rounds: 5,
        }
    }
}

/// Empty the table and restart ids at 1.
async fn reset_table(service: &MovieService) -> BenchResult<()> {
    service.delete_all().await?;
    service.reset_identity().await
}

fn check_rows(strategy: &str, expected: usize, actual: u64) {
    if actual != expected as u64 {
        warn!(strategy, expected, actual, "row count mismatch");
    }
}

// ────────────────────────────────────────────────────────────────────────────────
// Insert workloads
// ────────────────────────────────────────────────────────────────────────────────

/// Insert `count` fresh rows per round into an emptied table.
pub async fn insert_workload(
    service: &MovieService,
    strategy: InsertStrategy,
    cfg: &WorkloadConfig,
) -> BenchResult<WorkloadResult> {
    let mut rec = LatencyRecorder::new();

    for round in 0..cfg.rounds {
        reset_table(service).await?;
        let outcome = service.create_many(cfg.count, strategy).await?;
        check_rows(strategy.name(), cfg.count, outcome.rows);
        info!(
            strategy = strategy.name(),
            round,
            elapsed_ms = outcome.elapsed_ms(),
            "insert round"
        );
        rec.record_outcome(&outcome);
    }

    Ok(
        WorkloadResult::from_recorder(strategy.name(), "create_many", &rec)
            .with_extra("rows_per_round", &cfg.count.to_string()),
    )
}

// ────────────────────────────────────────────────────────────────────────────────
// Delete workloads
// ────────────────────────────────────────────────────────────────────────────────

/// Seed `count` rows (ids 1..=count) with the bulk loader, then delete the
/// whole range with `strategy`.
pub async fn delete_workload(
    service: &MovieService,
    strategy: DeleteStrategy,
    cfg: &WorkloadConfig,
) -> BenchResult<WorkloadResult> {
    let mut rec = LatencyRecorder::new();
    let range = DeleteRange::new(1, cfg.count, strategy)?;

    for round in 0..cfg.rounds {
        reset_table(service).await?;
        service
            .create_many(cfg.count, InsertStrategy::BulkLoad)
            .await?;
        let outcome = service.delete_many(range).await?;
        check_rows(strategy.name(), cfg.count, outcome.rows);
        info!(
            strategy = strategy.name(),
            round,
            elapsed_ms = outcome.elapsed_ms(),
            "delete round"
        );
        rec.record_outcome(&outcome);
    }

    Ok(
        WorkloadResult::from_recorder(strategy.name(), "delete_many", &rec)
            .with_extra("rows_per_round", &cfg.count.to_string()),
    )
}

// ────────────────────────────────────────────────────────────────────────────────
// Full comparison
// ────────────────────────────────────────────────────────────────────────────────

/// Every insert strategy, then every delete strategy. The table is left empty.
pub async fn compare_all(
    service: &MovieService,
    cfg: &WorkloadConfig,
) -> BenchResult<Vec<WorkloadResult>> {
    let mut results = Vec::with_capacity(InsertStrategy::ALL.len() + DeleteStrategy::ALL.len());
    for strategy in InsertStrategy::ALL {
        results.push(insert_workload(service, strategy, cfg).await?);
    }
    for strategy in DeleteStrategy::ALL {
        results.push(delete_workload(service, strategy, cfg).await?);
    }
    reset_table(service).await?;
    Ok(results)
}
