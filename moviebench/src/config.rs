//! Harness configuration.
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! `MOVIEBENCH_*` environment variables, then command-line flags (applied by
//! the binary).

use crate::strategies::{DEFAULT_BATCH_SIZE, MAX_BATCH_SIZE};
use crate::{BenchError, BenchResult, DEFAULT_SHUFFLE_SEED};
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub const ENV_DATABASE_URL: &str = "MOVIEBENCH_DATABASE_URL";
pub const ENV_SCHEMA: &str = "MOVIEBENCH_SCHEMA";
pub const ENV_BATCH_SIZE: &str = "MOVIEBENCH_BATCH_SIZE";
pub const ENV_SHUFFLE_SEED: &str = "MOVIEBENCH_SHUFFLE_SEED";
pub const ENV_STATEMENT_TIMEOUT_MS: &str = "MOVIEBENCH_STATEMENT_TIMEOUT_MS";

const DEFAULT_DATABASE_URL: &str = "host=localhost user=postgres dbname=movies";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BenchConfig {
    /// libpq-style key/value string or `postgres://` URL.
    pub database_url: String,
    /// Schema placed first on the search path.
    pub schema: Option<String>,
    /// Rows per statement for the batched insert strategy.
    pub batch_size: usize,
    /// Seed for shuffling delete ranges.
    pub shuffle_seed: u64,
    /// Server-side statement timeout; 0 leaves the server default.
    pub statement_timeout_ms: u64,
    pub connect_timeout_secs: u64,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            schema: None,
            batch_size: DEFAULT_BATCH_SIZE,
            shuffle_seed: DEFAULT_SHUFFLE_SEED,
            statement_timeout_ms: 0,
            connect_timeout_secs: 10,
        }
    }
}

impl BenchConfig {
    pub fn from_toml_str(raw: &str) -> BenchResult<Self> {
        toml::from_str(raw).map_err(|e| BenchError::Config(e.to_string()))
    }

    pub fn load_toml(path: &Path) -> BenchResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| BenchError::Config(format!("{}: {e}", path.display())))
    }

    /// Overlay values from the process environment.
    pub fn apply_env(&mut self) -> BenchResult<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Overlay values from `lookup`, keyed by the `MOVIEBENCH_*` names.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> BenchResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_DATABASE_URL) {
            self.database_url = url;
        }
        if let Some(schema) = lookup(ENV_SCHEMA) {
            self.schema = Some(schema).filter(|s| !s.is_empty());
        }
        if let Some(raw) = lookup(ENV_BATCH_SIZE) {
            self.batch_size = parse_var(ENV_BATCH_SIZE, &raw)?;
        }
        if let Some(raw) = lookup(ENV_SHUFFLE_SEED) {
            self.shuffle_seed = parse_var(ENV_SHUFFLE_SEED, &raw)?;
        }
        if let Some(raw) = lookup(ENV_STATEMENT_TIMEOUT_MS) {
            self.statement_timeout_ms = parse_var(ENV_STATEMENT_TIMEOUT_MS, &raw)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> BenchResult<()> {
        if self.database_url.trim().is_empty() {
            return Err(BenchError::Config("database_url is empty".into()));
        }
        if !(1..=MAX_BATCH_SIZE).contains(&self.batch_size) {
            return Err(BenchError::Config(format!(
                "batch_size must be in 1..={MAX_BATCH_SIZE}, got {}",
                self.batch_size
            )));
        }
        if self.schema.as_deref().is_some_and(|s| s.trim().is_empty()) {
            return Err(BenchError::Config("schema is empty".into()));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn statement_timeout(&self) -> Option<Duration> {
        (self.statement_timeout_ms > 0).then(|| Duration::from_millis(self.statement_timeout_ms))
    }
}

fn parse_var<T: FromStr>(key: &str, raw: &str) -> BenchResult<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| BenchError::Config(format!("invalid {key} value {raw:?}: {e}")))
}
