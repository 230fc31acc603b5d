//! Bulk mutation strategy benchmark runner
//!
//! Usage:
//!   moviebench setup                                  # install table + types
//!   moviebench create-many --count 10000 --strategy bulk
//!   moviebench delete-many --start-id 99 --count 999 --strategy tvp
//!   moviebench compare --count 10000 --rounds 5 --export out/

use clap::{Parser, Subcommand};
use colored::Colorize;
use moviebench::config::BenchConfig;
use moviebench::connection::ConnectionFactory;
use moviebench::report;
use moviebench::schema;
use moviebench::service::MovieService;
use moviebench::strategies::{DeleteRange, DeleteStrategy, InsertStrategy};
use moviebench::txn::MutationOutcome;
use moviebench::workloads::{self, WorkloadConfig};
use moviebench::{BenchResult, BenchSuite, SystemInfo};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "moviebench", about = "Bulk insert/delete strategy benchmarks")]
#[command(version)]
struct Cli {
    /// TOML config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Connection string; overrides config and environment.
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Schema to run in (search path).
    #[arg(long, global = true)]
    schema: Option<String>,

    /// Rows per statement for the batched insert strategy.
    #[arg(long, global = true)]
    batch_size: Option<usize>,

    /// Seed for delete-range shuffling.
    #[arg(long, global = true)]
    shuffle_seed: Option<u64>,

    /// Enable debug logging.
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the movies table and parameter types.
    Setup,
    /// Insert generated rows with one strategy.
    CreateMany {
        #[arg(long)]
        count: usize,
        /// normal | batched | bulk | tvp | tvp-records, or 0-4.
        #[arg(long, default_value = "bulk")]
        strategy: InsertStrategy,
    },
    /// Delete a contiguous id range with one strategy.
    DeleteMany {
        #[arg(long)]
        start_id: i32,
        #[arg(long)]
        count: usize,
        /// in | tvp | bulk, or 0-2.
        #[arg(long, default_value = "in")]
        strategy: DeleteStrategy,
    },
    /// Restart ids at 1 (table must be empty).
    ResetIdentity,
    /// Delete every row.
    DeleteAll,
    /// Print every row.
    List,
    /// Run every strategy and print a comparison.
    Compare {
        #[arg(long, default_value = "10000")]
        count: usize,
        #[arg(long, default_value = "5")]
        rounds: usize,
        /// Export directory for CSV + JSON results.
        #[arg(long)]
        export: Option<PathBuf>,
    },
}

impl Cli {
    fn bench_config(&self) -> BenchResult<BenchConfig> {
        let mut config = match &self.config {
            Some(path) => BenchConfig::load_toml(path)?,
            None => BenchConfig::default(),
        };
        config.apply_env()?;
        if let Some(url) = &self.database_url {
            config.database_url = url.clone();
        }
        if let Some(schema) = &self.schema {
            config.schema = Some(schema.clone());
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(seed) = self.shuffle_seed {
            config.shuffle_seed = seed;
        }
        config.validate()?;
        Ok(config)
    }
}

fn print_outcome(outcome: &MutationOutcome) {
    println!(
        "  {} {} rows in {:.2} ms",
        outcome.strategy.bold(),
        outcome.rows,
        outcome.elapsed_ms()
    );
}

#[tokio::main]
async fn main() -> BenchResult<()> {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("moviebench=info,warn"))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = cli.bench_config()?;
    let service = MovieService::from_config(&config)?;

    match cli.command {
        Command::Setup => {
            let client = ConnectionFactory::new(&config)?.connect().await?;
            if let Some(name) = &config.schema {
                schema::create_schema(&client, name).await?;
            }
            schema::install(&client).await?;
            println!("  schema ready");
        }
        Command::CreateMany { count, strategy } => {
            print_outcome(&service.create_many(count, strategy).await?);
        }
        Command::DeleteMany {
            start_id,
            count,
            strategy,
        } => {
            let range = DeleteRange::new(start_id, count, strategy)?;
            print_outcome(&service.delete_many(range).await?);
        }
        Command::ResetIdentity => {
            service.reset_identity().await?;
            println!("  identity reset");
        }
        Command::DeleteAll => {
            let rows = service.delete_all().await?;
            println!("  deleted {rows} rows");
        }
        Command::List => {
            for movie in service.get_all().await? {
                println!("{:>10}  {}", movie.id, movie.name);
            }
        }
        Command::Compare {
            count,
            rounds,
            export,
        } => {
            let cfg = WorkloadConfig { count, rounds };
            println!(
                "  Rows: {}  Rounds: {}  Batch size: {}  Shuffle seed: {}",
                cfg.count, cfg.rounds, config.batch_size, config.shuffle_seed
            );
            let suite = BenchSuite {
                system_info: SystemInfo::collect(service.server_version().await.ok()),
                results: workloads::compare_all(&service, &cfg).await?,
            };

            report::print_suite(&suite);
            let metrics = service.metrics();
            println!(
                "\n  {} commits, {} rollbacks, mean commit {:.2} ms",
                metrics.commits,
                metrics.rollbacks,
                metrics.mean_commit_latency().as_secs_f64() * 1_000.0
            );

            if let Some(dir) = export {
                std::fs::create_dir_all(&dir)?;
                report::export_csv(&suite, &dir.join("benchmark_results.csv"))?;
                report::export_json(&suite, &dir.join("benchmark_results.json"))?;
            }
        }
    }

    Ok(())
}
