//! Idempotent DDL for the `movies` table and its table-valued parameter types.

use crate::connection::quote_ident;
use crate::BenchResult;
use tokio_postgres::Client;
use tracing::info;

pub const MOVIES_DDL: &str = "
CREATE TABLE IF NOT EXISTS movies (
    id   INTEGER GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY,
    name VARCHAR(50) NOT NULL
);

DO $$ BEGIN
    CREATE TYPE tvp_movies_insert AS (name VARCHAR(50));
EXCEPTION WHEN duplicate_object THEN NULL;
END $$;

DO $$ BEGIN
    CREATE TYPE tvp_ids AS (id INTEGER);
EXCEPTION WHEN duplicate_object THEN NULL;
END $$;
";

/// Create the table and types in the first schema of the search path.
pub async fn install(client: &Client) -> BenchResult<()> {
    client.batch_execute(MOVIES_DDL).await?;
    info!("movies schema installed");
    Ok(())
}

pub async fn create_schema(client: &Client, schema: &str) -> BenchResult<()> {
    client
        .batch_execute(&format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(schema)))
        .await?;
    Ok(())
}

pub async fn drop_schema(client: &Client, schema: &str) -> BenchResult<()> {
    client
        .batch_execute(&format!("DROP SCHEMA IF EXISTS {} CASCADE", quote_ident(schema)))
        .await?;
    Ok(())
}
