//! Opening ready-to-use connections from a [`BenchConfig`].

use crate::config::BenchConfig;
use crate::{BenchError, BenchResult};
use std::str::FromStr;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, warn};

const APPLICATION_NAME: &str = "moviebench";

/// Builds connections with the configured session settings applied.
///
/// Each call to [`ConnectionFactory::connect`] opens a new physical
/// connection; the driver's connection future runs on its own task until
/// the returned [`Client`] is dropped.
#[derive(Debug, Clone)]
pub struct ConnectionFactory {
    pg: tokio_postgres::Config,
    schema: Option<String>,
    statement_timeout_ms: u64,
}

impl ConnectionFactory {
    pub fn new(config: &BenchConfig) -> BenchResult<Self> {
        let mut pg = tokio_postgres::Config::from_str(&config.database_url)
            .map_err(|e| BenchError::Config(format!("database_url: {e}")))?;
        pg.connect_timeout(config.connect_timeout());
        if pg.get_application_name().is_none() {
            pg.application_name(APPLICATION_NAME);
        }
        Ok(Self {
            pg,
            schema: config.schema.clone(),
            statement_timeout_ms: config.statement_timeout_ms,
        })
    }

    /// Same server, different search path.
    pub fn with_schema(mut self, schema: Option<String>) -> Self {
        self.schema = schema;
        self
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    pub async fn connect(&self) -> BenchResult<Client> {
        let (client, connection) = self.pg.connect(NoTls).await?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!(error = %e, "postgres connection closed with error");
            }
        });

        let session = self.session_sql();
        if !session.is_empty() {
            debug!(sql = %session, "applying session settings");
            client.batch_execute(&session).await?;
        }
        Ok(client)
    }

    fn session_sql(&self) -> String {
        let mut sql = String::new();
        if let Some(schema) = &self.schema {
            sql.push_str(&format!("SET search_path TO {};", quote_ident(schema)));
        }
        if self.statement_timeout_ms > 0 {
            sql.push_str(&format!(
                "SET statement_timeout = {};",
                self.statement_timeout_ms
            ));
        }
        sql
    }
}

/// Quote an identifier for interpolation into DDL.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}
