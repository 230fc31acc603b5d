//! Shared helpers for integration tests.
//!
//! Tests run against the server named by `MOVIEBENCH_TEST_DATABASE_URL`. Each
//! test gets its own freshly created schema, dropped again in
//! [`TestDb::teardown`]. The database-backed tests are `#[ignore]`d; run them
//! with `cargo test -- --ignored` once the variable is set.

#![allow(dead_code)]

use anyhow::{Context, Result};
use moviebench::config::BenchConfig;
use moviebench::connection::ConnectionFactory;
use moviebench::schema;
use moviebench::service::MovieService;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub const TEST_DATABASE_URL: &str = "MOVIEBENCH_TEST_DATABASE_URL";

static NEXT_SCHEMA: AtomicU32 = AtomicU32::new(0);

fn unique_schema() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    format!(
        "moviebench_t{}_{}_{}",
        std::process::id(),
        NEXT_SCHEMA.fetch_add(1, Ordering::Relaxed),
        nanos
    )
}

pub struct TestDb {
    pub service: MovieService,
    pub factory: ConnectionFactory,
    pub schema: String,
}

impl TestDb {
    pub async fn open() -> Result<Self> {
        Self::open_with(|_| {}).await
    }

    /// Like [`TestDb::open`], with a hook to adjust the config first.
    pub async fn open_with(adjust: impl FnOnce(&mut BenchConfig)) -> Result<Self> {
        let url = std::env::var(TEST_DATABASE_URL)
            .with_context(|| format!("{TEST_DATABASE_URL} must name a PostgreSQL server"))?;
        let schema_name = unique_schema();
        let mut config = BenchConfig {
            database_url: url,
            schema: Some(schema_name.clone()),
            ..BenchConfig::default()
        };
        adjust(&mut config);
        config.validate()?;

        let factory = ConnectionFactory::new(&config)?;
        let admin = factory.clone().with_schema(None).connect().await?;
        schema::create_schema(&admin, &schema_name)
            .await
            .context("create test schema")?;
        let client = factory.connect().await?;
        schema::install(&client).await.context("install movies ddl")?;

        Ok(Self {
            service: MovieService::new(factory.clone(), &config),
            factory,
            schema: schema_name,
        })
    }

    /// All ids currently in the table, ascending.
    pub async fn ids(&self) -> Result<Vec<i32>> {
        Ok(self.service.get_all().await?.into_iter().map(|m| m.id).collect())
    }

    /// All names currently in the table, sorted.
    pub async fn names(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .service
            .get_all()
            .await?
            .into_iter()
            .map(|m| m.name)
            .collect();
        names.sort();
        Ok(names)
    }

    /// Empty the table and restart ids at 1.
    pub async fn reset(&self) -> Result<()> {
        self.service.delete_all().await?;
        self.service.reset_identity().await?;
        Ok(())
    }

    pub async fn teardown(self) -> Result<()> {
        let admin = self.factory.with_schema(None).connect().await?;
        schema::drop_schema(&admin, &self.schema)
            .await
            .context("drop test schema")?;
        Ok(())
    }
}
