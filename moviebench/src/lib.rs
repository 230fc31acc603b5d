//! Shared types, errors, data generators and latency recording for moviebench.

pub mod config;
pub mod connection;
pub mod metrics;
pub mod report;
pub mod schema;
pub mod service;
pub mod strategies;
pub mod txn;
pub mod workloads;

use hdrhistogram::Histogram;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::time::Duration;

use crate::txn::MutationOutcome;

// ────────────────────────────────────────────────────────────────────────────────
// Error type
// ────────────────────────────────────────────────────────────────────────────────

pub type BenchResult<T> = std::result::Result<T, BenchError>;

#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    /// Driver or constraint failure, passed through unchanged.
    #[error("statement failed: {}", describe_pg_error(.0))]
    Statement(#[from] tokio_postgres::Error),
    #[error("unsupported {kind} strategy: {value}")]
    UnsupportedStrategy { kind: &'static str, value: String },
    #[error("identity reset requires an empty table ({rows} rows present)")]
    EmptyTableRequired { rows: i64 },
    #[error("invalid delete range: {0}")]
    InvalidRange(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The driver's own `Display` hides the server message behind "db error".
fn describe_pg_error(e: &tokio_postgres::Error) -> String {
    match e.as_db_error() {
        Some(db) => format!(
            "{}: {} (SQLSTATE {})",
            db.severity(),
            db.message(),
            db.code().code()
        ),
        None => e.to_string(),
    }
}

impl BenchError {
    /// Server-side error details when the failure came from the database.
    pub fn db_error(&self) -> Option<&tokio_postgres::error::DbError> {
        match self {
            BenchError::Statement(e) => e.as_db_error(),
            _ => None,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────────
// Row model
// ────────────────────────────────────────────────────────────────────────────────

/// Longest name the `movies.name` column accepts.
pub const MAX_NAME_LEN: usize = 50;

/// One row of the `movies` table. `id` is 0 until the store assigns it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Movie {
    pub id: i32,
    pub name: String,
}

impl Movie {
    /// A row that has not been written yet.
    pub fn unsaved(name: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────────
// Data generator (deterministic via ChaCha8Rng)
// ────────────────────────────────────────────────────────────────────────────────

/// Seed used for delete-range shuffles unless configured otherwise.
pub const DEFAULT_SHUFFLE_SEED: u64 = 420;

pub struct DataGen {
    rng: ChaCha8Rng,
}

impl DataGen {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Generator with a fresh OS-provided seed. Used for row names, where
    /// successive runs must not repeat each other.
    pub fn from_entropy() -> Self {
        Self {
            rng: ChaCha8Rng::from_entropy(),
        }
    }

    /// Opaque 36-char token laid out like a version-4 UUID.
    pub fn name_token(&mut self) -> String {
        let mut bytes = [0u8; 16];
        self.rng.fill_bytes(&mut bytes);
        bytes[6] = (bytes[6] & 0x0f) | 0x40;
        bytes[8] = (bytes[8] & 0x3f) | 0x80;

        let mut out = String::with_capacity(36);
        for (i, byte) in bytes.iter().enumerate() {
            if matches!(i, 4 | 6 | 8 | 10) {
                out.push('-');
            }
            let _ = write!(out, "{:02x}", byte);
        }
        out
    }

    /// Generate `count` unsaved rows in insertion order.
    pub fn movies(&mut self, count: usize) -> Vec<Movie> {
        (0..count).map(|_| Movie::unsaved(self.name_token())).collect()
    }

    /// Permutation of `[start_id, start_id + count)`.
    ///
    /// Callers validate the range first (see `DeleteRange::new`); ids past
    /// `i32::MAX` are not produced.
    pub fn shuffled_ids(&mut self, start_id: i32, count: usize) -> Vec<i32> {
        let mut ids: Vec<i32> = (0..count)
            .map_while(|offset| i32::try_from(offset).ok()?.checked_add(start_id))
            .collect();
        ids.shuffle(&mut self.rng);
        ids
    }
}

/// Shuffle a contiguous id range with a caller-supplied seed.
pub fn shuffled_id_range(seed: u64, start_id: i32, count: usize) -> Vec<i32> {
    DataGen::new(seed).shuffled_ids(start_id, count)
}

// ────────────────────────────────────────────────────────────────────────────────
// Latency recorder (HDR histogram)
// ────────────────────────────────────────────────────────────────────────────────

/// Records one sample per committed mutation; `rows` accumulates the rows
/// those mutations touched so throughput is reported in rows per second.
pub struct LatencyRecorder {
    hist: Histogram<u64>,
    total: Duration,
    rounds: u64,
    rows: u64,
}

impl LatencyRecorder {
    pub fn new() -> Self {
        Self {
            hist: Histogram::<u64>::new_with_bounds(1, 3_600_000_000_000, 3)
                .expect("constant histogram bounds are valid"),
            total: Duration::ZERO,
            rounds: 0,
            rows: 0,
        }
    }

    /// Record one mutation that touched `rows` rows.
    pub fn record(&mut self, elapsed: Duration, rows: u64) {
        let nanos = elapsed.as_nanos().min(u64::MAX as u128) as u64;
        let _ = self.hist.record(nanos.max(1));
        self.total += elapsed;
        self.rounds += 1;
        self.rows += rows;
    }

    pub fn record_outcome(&mut self, outcome: &MutationOutcome) {
        self.record(outcome.elapsed, outcome.rows);
    }

    pub fn rounds(&self) -> u64 {
        self.rounds
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn total_secs(&self) -> f64 {
        self.total.as_secs_f64()
    }

    /// Rows per second across all recorded rounds.
    pub fn throughput(&self) -> f64 {
        if self.total.as_secs_f64() > 0.0 {
            self.rows as f64 / self.total.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Percentile in milliseconds.
    pub fn percentile_ms(&self, p: f64) -> f64 {
        self.hist.value_at_percentile(p) as f64 / 1_000_000.0
    }

    /// Mean round latency in milliseconds.
    pub fn mean_ms(&self) -> f64 {
        self.hist.mean() / 1_000_000.0
    }

    pub fn max_ms(&self) -> f64 {
        self.hist.max() as f64 / 1_000_000.0
    }
}

impl Default for LatencyRecorder {
    fn default() -> Self {
        Self::new()
    }
}

// ────────────────────────────────────────────────────────────────────────────────
// Benchmark output types
// ────────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct WorkloadResult {
    pub strategy: String,
    pub workload: String,
    pub rounds: u64,
    pub rows: u64,
    pub total_secs: f64,
    pub throughput: f64, // rows/sec
    pub p50_ms: f64,
    pub p99_ms: f64,
    pub max_ms: f64,
    pub mean_ms: f64,
    pub extra: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BenchSuite {
    pub system_info: SystemInfo,
    pub results: Vec<WorkloadResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemInfo {
    pub os: String,
    pub arch: String,
    pub cpus: usize,
    pub server_version: Option<String>,
    pub timestamp: String,
}

impl SystemInfo {
    pub fn collect(server_version: Option<String>) -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            cpus: std::thread::available_parallelism()
                .map(|p| p.get())
                .unwrap_or(1),
            server_version,
            timestamp: epoch_timestamp(),
        }
    }
}

fn epoch_timestamp() -> String {
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("{}s-since-epoch", secs)
}

impl WorkloadResult {
    pub fn from_recorder(strategy: &str, workload: &str, rec: &LatencyRecorder) -> Self {
        Self {
            strategy: strategy.to_string(),
            workload: workload.to_string(),
            rounds: rec.rounds(),
            rows: rec.rows(),
            total_secs: rec.total_secs(),
            throughput: rec.throughput(),
            p50_ms: rec.percentile_ms(50.0),
            p99_ms: rec.percentile_ms(99.0),
            max_ms: rec.max_ms(),
            mean_ms: rec.mean_ms(),
            extra: HashMap::new(),
        }
    }

    pub fn with_extra(mut self, key: &str, val: &str) -> Self {
        self.extra.insert(key.to_string(), val.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generated_rows_are_unsaved_and_unique() {
        let movies = DataGen::new(7).movies(1_000);
        assert_eq!(movies.len(), 1_000);
        assert!(movies.iter().all(|m| m.id == 0));
        assert!(movies.iter().all(|m| m.name.len() == 36));
        assert!(movies.iter().all(|m| m.name.len() <= MAX_NAME_LEN));
        let names: HashSet<_> = movies.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names.len(), 1_000);
    }

    #[test]
    fn test_name_token_layout() {
        let token = DataGen::new(1).name_token();
        let groups: Vec<_> = token.split('-').map(str::len).collect();
        assert_eq!(groups, vec![8, 4, 4, 4, 12]);
        assert_eq!(&token[14..15], "4");
    }

    #[test]
    fn test_generate_zero_rows() {
        assert!(DataGen::from_entropy().movies(0).is_empty());
    }

    #[test]
    fn test_shuffle_is_permutation_of_range() {
        let mut ids = shuffled_id_range(DEFAULT_SHUFFLE_SEED, 99, 999);
        assert_eq!(ids.len(), 999);
        ids.sort_unstable();
        assert_eq!(ids, (99..1098).collect::<Vec<_>>());
    }

    #[test]
    fn test_shuffle_is_deterministic_for_seed() {
        let a = shuffled_id_range(DEFAULT_SHUFFLE_SEED, 1, 500);
        let b = shuffled_id_range(DEFAULT_SHUFFLE_SEED, 1, 500);
        assert_eq!(a, b);
        // Not left in sequential order.
        assert_ne!(a, (1..501).collect::<Vec<_>>());

        let other = shuffled_id_range(DEFAULT_SHUFFLE_SEED + 1, 1, 500);
        assert_ne!(a, other);
    }

    #[test]
    fn test_shuffle_stops_at_i32_max() {
        let ids = shuffled_id_range(3, i32::MAX - 1, 5);
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn test_latency_recorder_throughput() {
        let mut rec = LatencyRecorder::new();
        rec.record(Duration::from_millis(500), 1_000);
        rec.record(Duration::from_millis(500), 1_000);
        assert_eq!(rec.rounds(), 2);
        assert_eq!(rec.rows(), 2_000);
        assert!((rec.throughput() - 2_000.0).abs() < 1.0);
        assert!((rec.percentile_ms(50.0) - 500.0).abs() < 1.0);
    }

    #[test]
    fn test_empty_recorder_reports_zero() {
        let rec = LatencyRecorder::default();
        assert_eq!(rec.throughput(), 0.0);
        let result = WorkloadResult::from_recorder("bulk", "create_many", &rec);
        assert_eq!(result.rows, 0);
        assert_eq!(result.workload, "create_many");
    }

    #[test]
    fn test_driver_error_without_server_details_keeps_driver_text() {
        use std::str::FromStr;
        let driver = tokio_postgres::Config::from_str("port=notaport").unwrap_err();
        let err = BenchError::from(driver);
        assert!(err.db_error().is_none());
        let text = err.to_string();
        assert!(text.starts_with("statement failed: "), "{text}");
        assert!(text.contains("port"), "{text}");
    }

    #[test]
    fn test_statement_error_has_no_db_error_for_other_variants() {
        let err = BenchError::Config("x".into());
        assert!(err.db_error().is_none());
    }
}
