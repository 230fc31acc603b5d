mod common;

use anyhow::Result;
use async_trait::async_trait;
use common::TestDb;
use futures_util::future::try_join_all;
use moviebench::strategies::delete::TempIdTable;
use moviebench::strategies::{
    delete_algorithm, DeleteAlgorithm, DeleteRange, DeleteStrategy, InsertStrategy,
    TempTableBulkDelete,
};
use moviebench::txn::{DeleteMany, TransactionManager};
use moviebench::{BenchError, BenchResult};
use tokio_postgres::error::SqlState;
use tokio_postgres::{Client, Transaction};

async fn seed(db: &TestDb, count: usize) -> Result<()> {
    db.reset().await?;
    db.service
        .create_many(count, InsertStrategy::BulkLoad)
        .await?;
    Ok(())
}

#[tokio::test]
#[ignore = "needs MOVIEBENCH_TEST_DATABASE_URL"]
async fn every_strategy_removes_exactly_the_range() -> Result<()> {
    let db = TestDb::open().await?;

    for strategy in DeleteStrategy::ALL {
        seed(&db, 1_100).await?;
        let range = DeleteRange::new(99, 999, strategy)?;
        let outcome = db.service.delete_many(range).await?;
        assert_eq!(outcome.rows, 999, "{strategy}");

        let ids = db.ids().await?;
        assert_eq!(ids.len(), 101, "{strategy}");
        assert!(ids.iter().all(|&id| !range.contains(id)), "{strategy}");
        let expected: Vec<i32> = (1..99).chain(1098..=1100).collect();
        assert_eq!(ids, expected, "{strategy}");
    }

    db.teardown().await
}

#[tokio::test]
#[ignore = "needs MOVIEBENCH_TEST_DATABASE_URL"]
async fn range_past_last_row_deletes_what_exists() -> Result<()> {
    let db = TestDb::open().await?;

    for strategy in DeleteStrategy::ALL {
        seed(&db, 120).await?;
        let outcome = db
            .service
            .delete_many(DeleteRange::new(101, 500, strategy)?)
            .await?;
        assert_eq!(outcome.rows, 20, "{strategy}");
        assert_eq!(db.ids().await?, (1..=100).collect::<Vec<_>>(), "{strategy}");
    }

    db.teardown().await
}

#[tokio::test]
#[ignore = "needs MOVIEBENCH_TEST_DATABASE_URL"]
async fn empty_range_is_a_no_op() -> Result<()> {
    let db = TestDb::open().await?;
    seed(&db, 10).await?;

    for strategy in DeleteStrategy::ALL {
        let outcome = db
            .service
            .delete_many(DeleteRange::new(1, 0, strategy)?)
            .await?;
        assert_eq!(outcome.rows, 0);
    }
    assert_eq!(db.service.count().await?, 10);
    assert_eq!(db.service.metrics().rows_deleted, 0);

    db.teardown().await
}

/// Runs a real strategy, then fails inside the same transaction.
struct FailAfter(Box<dyn DeleteAlgorithm>);

#[async_trait]
impl DeleteAlgorithm for FailAfter {
    fn strategy(&self) -> DeleteStrategy {
        self.0.strategy()
    }

    async fn delete(&self, tx: &Transaction<'_>, ids: &[i32]) -> BenchResult<u64> {
        let deleted = self.0.delete(tx, ids).await?;
        tx.batch_execute("SELECT 1 / 0").await?;
        Ok(deleted)
    }
}

fn assert_division_by_zero(err: &BenchError, label: &str) {
    assert!(matches!(err, BenchError::Statement(_)), "{label}: {err}");
    assert_eq!(
        err.db_error().map(|e| e.code()),
        Some(&SqlState::DIVISION_BY_ZERO),
        "{label}"
    );
}

#[tokio::test]
#[ignore = "needs MOVIEBENCH_TEST_DATABASE_URL"]
async fn failing_delete_leaves_table_unchanged() -> Result<()> {
    let db = TestDb::open().await?;
    seed(&db, 50).await?;
    let ids: Vec<i32> = (10..30).collect();

    for strategy in DeleteStrategy::ALL {
        let err = db
            .service
            .apply(&DeleteMany {
                algorithm: &FailAfter(delete_algorithm(strategy)),
                ids: &ids,
            })
            .await
            .expect_err("division by zero must fail");
        assert_division_by_zero(&err, strategy.name());
        assert_eq!(db.ids().await?, (1..=50).collect::<Vec<_>>(), "{strategy}");
    }
    assert_eq!(
        db.service.metrics().rollbacks,
        DeleteStrategy::ALL.len() as u64
    );

    db.teardown().await
}

/// Drives the scratch table by hand and fails after the join delete.
struct TempTableThenFail;

#[async_trait]
impl DeleteAlgorithm for TempTableThenFail {
    fn strategy(&self) -> DeleteStrategy {
        DeleteStrategy::TempTableBulk
    }

    async fn delete(&self, tx: &Transaction<'_>, ids: &[i32]) -> BenchResult<u64> {
        let table = TempIdTable::create(tx).await?;
        table.load(ids).await?;
        let deleted = table.delete_matching().await?;
        tx.batch_execute("SELECT 1 / 0").await?;
        table.release().await?;
        Ok(deleted)
    }
}

async fn temp_tables_visible(client: &Client) -> Result<i64> {
    let row = client
        .query_one(
            "SELECT count(*) FROM pg_class \
             WHERE relname = $1 AND relnamespace = pg_my_temp_schema()",
            &[&TempIdTable::NAME],
        )
        .await?;
    Ok(row.get(0))
}

#[tokio::test]
#[ignore = "needs MOVIEBENCH_TEST_DATABASE_URL"]
async fn failed_temp_table_delete_leaves_session_reusable() -> Result<()> {
    let db = TestDb::open().await?;
    seed(&db, 60).await?;
    let ids: Vec<i32> = (5..45).rev().collect();
    let manager = TransactionManager::default();
    let mut client = db.factory.connect().await?;

    let err = manager
        .execute(
            &mut client,
            &DeleteMany {
                algorithm: &TempTableThenFail,
                ids: &ids,
            },
        )
        .await
        .expect_err("division by zero must fail");
    assert_division_by_zero(&err, "temp table");
    assert_eq!(db.ids().await?, (1..=60).collect::<Vec<_>>());
    assert_eq!(temp_tables_visible(&client).await?, 0);

    let outcome = manager
        .execute(
            &mut client,
            &DeleteMany {
                algorithm: &TempTableBulkDelete,
                ids: &ids,
            },
        )
        .await?;
    assert_eq!(outcome.rows, ids.len() as u64);
    assert_eq!(temp_tables_visible(&client).await?, 0);
    assert_eq!(
        db.ids().await?,
        (1..5).chain(45..=60).collect::<Vec<_>>()
    );

    let metrics = manager.metrics().snapshot();
    assert_eq!(metrics.rollbacks, 1);
    assert_eq!(metrics.commits, 1);

    db.teardown().await
}

#[tokio::test]
#[ignore = "needs MOVIEBENCH_TEST_DATABASE_URL"]
async fn concurrent_temp_table_deletes_stay_isolated() -> Result<()> {
    let db = TestDb::open().await?;
    seed(&db, 350).await?;

    let deletes = [1, 101, 201].map(|start| {
        let range = DeleteRange::new(start, 100, DeleteStrategy::TempTableBulk);
        let service = &db.service;
        async move { service.delete_many(range?).await }
    });
    let outcomes = try_join_all(deletes).await?;

    let removed: u64 = outcomes.iter().map(|o| o.rows).sum();
    assert_eq!(removed, 300);
    assert!(outcomes.iter().all(|o| o.rows == 100));
    assert_eq!(db.ids().await?, (301..=350).collect::<Vec<_>>());

    db.teardown().await
}

/// Runs the temp-table delete twice in one transaction.
struct TwiceInOneTransaction;

#[async_trait]
impl DeleteAlgorithm for TwiceInOneTransaction {
    fn strategy(&self) -> DeleteStrategy {
        DeleteStrategy::TempTableBulk
    }

    async fn delete(&self, tx: &Transaction<'_>, ids: &[i32]) -> BenchResult<u64> {
        let (head, tail) = ids.split_at(ids.len() / 2);
        Ok(TempTableBulkDelete.delete(tx, head).await? + TempTableBulkDelete.delete(tx, tail).await?)
    }
}

#[tokio::test]
#[ignore = "needs MOVIEBENCH_TEST_DATABASE_URL"]
async fn temp_table_is_dropped_after_each_use() -> Result<()> {
    let db = TestDb::open().await?;
    seed(&db, 40).await?;
    let ids: Vec<i32> = (1..=40).rev().collect();

    let outcome = db
        .service
        .apply(&DeleteMany {
            algorithm: &TwiceInOneTransaction,
            ids: &ids,
        })
        .await?;
    assert_eq!(outcome.rows, 40);
    assert_eq!(db.service.count().await?, 0);

    db.teardown().await
}

#[tokio::test]
async fn invalid_ranges_are_rejected_before_connecting() -> Result<()> {
    assert!(matches!(
        DeleteRange::new(0, 5, DeleteStrategy::TvpTable),
        Err(BenchError::InvalidRange(_))
    ));
    assert!(matches!(
        "merge".parse::<DeleteStrategy>(),
        Err(BenchError::UnsupportedStrategy { kind: "delete", .. })
    ));
    Ok(())
}
