mod common;

use anyhow::Result;
use common::TestDb;
use moviebench::strategies::InsertStrategy;
use moviebench::{BenchError, DataGen, Movie, MAX_NAME_LEN};
use std::collections::HashSet;
use tokio_postgres::error::SqlState;

#[tokio::test]
#[ignore = "needs MOVIEBENCH_TEST_DATABASE_URL"]
async fn every_strategy_inserts_exact_count_with_unique_names() -> Result<()> {
    let db = TestDb::open().await?;

    for strategy in InsertStrategy::ALL {
        for count in [0usize, 1, 23, 1_000] {
            db.reset().await?;
            let outcome = db.service.create_many(count, strategy).await?;
            assert_eq!(outcome.rows, count as u64, "{strategy} x {count}");
            assert_eq!(outcome.strategy, strategy.name());

            let names = db.names().await?;
            assert_eq!(names.len(), count, "{strategy} x {count}");
            let unique: HashSet<_> = names.iter().collect();
            assert_eq!(unique.len(), count, "{strategy} x {count}");
            assert_eq!(db.ids().await?, (1..=count as i32).collect::<Vec<_>>());
        }
    }

    db.teardown().await
}

#[tokio::test]
#[ignore = "needs MOVIEBENCH_TEST_DATABASE_URL"]
async fn strategies_write_identical_row_sets() -> Result<()> {
    let db = TestDb::open().await?;
    let rows = DataGen::new(2024).movies(257);
    let mut expected: Vec<String> = rows.iter().map(|m| m.name.clone()).collect();
    expected.sort();

    for strategy in InsertStrategy::ALL {
        db.reset().await?;
        db.service.create_rows(&rows, strategy).await?;
        assert_eq!(db.names().await?, expected, "{strategy}");
    }

    db.teardown().await
}

#[tokio::test]
#[ignore = "needs MOVIEBENCH_TEST_DATABASE_URL"]
async fn batched_insert_handles_remainder_and_custom_batch_size() -> Result<()> {
    let db = TestDb::open_with(|cfg| cfg.batch_size = 7).await?;

    // remainder + full batches, full batches only, remainder only
    for count in [52usize, 49, 6] {
        db.reset().await?;
        let outcome = db
            .service
            .create_many(count, InsertStrategy::Batched)
            .await?;
        assert_eq!(outcome.rows, count as u64);
        assert_eq!(db.service.count().await?, count as i64);
    }

    db.teardown().await
}

#[tokio::test]
#[ignore = "needs MOVIEBENCH_TEST_DATABASE_URL"]
async fn sequential_creates_accumulate() -> Result<()> {
    let db = TestDb::open().await?;

    db.service.create_many(3, InsertStrategy::Normal).await?;
    db.service.create_many(2, InsertStrategy::BulkLoad).await?;
    assert_eq!(db.service.count().await?, 5);
    assert_eq!(db.ids().await?, vec![1, 2, 3, 4, 5]);

    db.teardown().await
}

#[tokio::test]
#[ignore = "needs MOVIEBENCH_TEST_DATABASE_URL"]
async fn failing_insert_leaves_table_unchanged() -> Result<()> {
    let db = TestDb::open().await?;
    db.service.create_many(5, InsertStrategy::BulkLoad).await?;
    let before = db.names().await?;

    let mut rows = DataGen::new(9).movies(40);
    rows[31] = Movie::unsaved("x".repeat(MAX_NAME_LEN + 1));

    for strategy in InsertStrategy::ALL {
        let err = db
            .service
            .create_rows(&rows, strategy)
            .await
            .expect_err("oversized name must fail");
        assert!(matches!(err, BenchError::Statement(_)), "{strategy}: {err}");
        assert_eq!(
            err.db_error().map(|e| e.code()),
            Some(&SqlState::STRING_DATA_RIGHT_TRUNCATION),
            "{strategy}"
        );
        assert!(err.to_string().contains("SQLSTATE 22001"), "{strategy}: {err}");
        assert_eq!(db.names().await?, before, "{strategy}");
    }

    let metrics = db.service.metrics();
    assert_eq!(metrics.rollbacks, InsertStrategy::ALL.len() as u64);
    assert_eq!(metrics.commits, 1);
    assert_eq!(metrics.rows_inserted, 5);

    db.teardown().await
}
