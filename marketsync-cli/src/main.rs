//! MarketSync CLI — bulk loads, bulk updates, snapshots and market-data pulls.
//!
//! Commands:
//! - `columns` — list a table's columns as the catalog reports them
//! - `load` — write a CSV file into a table (append, replace or fail)
//! - `update` — bulk-update a table from a CSV file, matched on key columns
//! - `snapshot` — issue a new snapshot id
//! - `staging` — list leftover staging tables visible to the session
//! - `pull prices|instruments|fundamentals` — fetch market data, optionally
//!   staging it under a fresh snapshot id

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use marketsync_core::config::DEFAULT_CONFIG_FILE;
use marketsync_core::{
    Backend, Config, Connector, PgBackend, SqliteBackend, UpdateOutcome, WriteMode, WriteOutcome,
};
use marketsync_feed::{
    stage_frame, CircuitBreaker, FrequencyType, MarketDataClient, PeriodType, PriceHistoryRequest,
    ReqwestTransport, StaticToken,
};
use polars::prelude::*;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "marketsync",
    about = "MarketSync CLI — bulk synchronization of frames with a relational store"
)]
struct Cli {
    /// Config file. Defaults to ./marketsync.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use a local SQLite database file instead of Postgres.
    #[arg(long, global = true)]
    sqlite: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List a table's columns in ordinal order.
    Columns { table: String },
    /// Write a CSV file into a table.
    Load {
        table: String,
        csv: PathBuf,

        /// append, replace or fail.
        #[arg(long, default_value = "append")]
        mode: WriteMode,

        /// Rows per transaction. Omit for a single load.
        #[arg(long)]
        chunk_size: Option<NonZeroUsize>,
    },
    /// Bulk-update a table from a CSV file.
    Update {
        table: String,
        csv: PathBuf,

        /// Key column (repeat for composite keys).
        #[arg(long = "key", required = true)]
        keys: Vec<String>,

        /// Column to update (repeatable). Defaults to every non-key column.
        #[arg(long = "set")]
        updates: Vec<String>,
    },
    /// Issue a new snapshot id.
    Snapshot,
    /// List staging tables visible to this session.
    Staging,
    /// Fetch market data.
    Pull {
        #[command(subcommand)]
        what: PullTarget,

        /// Append the result to this table under a fresh snapshot id.
        #[arg(long, global = true)]
        stage: Option<String>,
    },
}

#[derive(Subcommand)]
enum PullTarget {
    /// Price history candles for one symbol.
    Prices {
        symbol: String,

        #[arg(long, default_value = "month")]
        period_type: String,

        #[arg(long, default_value_t = 1)]
        period: u32,

        #[arg(long, default_value = "daily")]
        frequency_type: String,

        #[arg(long, default_value_t = 1)]
        frequency: u32,

        /// Start date (YYYY-MM-DD). Defaults to 30 days ago.
        #[arg(long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        end: Option<String>,
    },
    /// Instrument reference data.
    Instruments {
        #[arg(required = true)]
        symbols: Vec<String>,

        #[arg(long, default_value_t = 500)]
        chunk_size: usize,
    },
    /// Instrument fundamentals.
    Fundamentals {
        #[arg(required = true)]
        symbols: Vec<String>,

        #[arg(long, default_value_t = 500)]
        chunk_size: usize,
    },
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let settings = config.sync.settings()?;

    match &cli.sqlite {
        Some(path) => {
            let backend = SqliteBackend::open(path)
                .with_context(|| format!("open sqlite database {}", path.display()))?;
            run(Connector::new(backend, settings), cli.command, &config)
        }
        None => {
            let backend = PgBackend::connect(&config.database)?;
            run(Connector::new(backend, settings), cli.command, &config)
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let default = Path::new(DEFAULT_CONFIG_FILE);
    let path = path.or_else(|| default.exists().then_some(default));
    Ok(Config::load(path)?)
}

fn run<B: Backend>(mut db: Connector<B>, command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Columns { table } => {
            let columns = db.try_columns_of(&table)?;
            if columns.is_empty() {
                bail!("table '{table}' not found");
            }
            for column in columns {
                println!("{column}");
            }
        }
        Commands::Load {
            table,
            csv,
            mode,
            chunk_size,
        } => {
            let batch = read_csv(&csv)?;
            report_write(&db.write(&batch, &table, mode, chunk_size)?);
        }
        Commands::Update {
            table,
            csv,
            keys,
            updates,
        } => {
            let batch = read_csv(&csv)?;
            let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
            let updates: Vec<&str> = updates.iter().map(String::as_str).collect();
            let explicit = (!updates.is_empty()).then_some(updates.as_slice());
            match db.bulk_update(&batch, &table, &keys, explicit)? {
                UpdateOutcome::Applied(report) => println!(
                    "Updated {table}: {} staged rows ({} duplicates dropped), {} matched; columns {:?}",
                    report.staged_rows,
                    report.duplicates_dropped,
                    report.rows_matched,
                    report.update_columns
                ),
                UpdateOutcome::Skipped(reason) => println!("Nothing to update: {reason:?}"),
            }
        }
        Commands::Snapshot => println!("{}", db.next_snapshot_id()?),
        Commands::Staging => {
            let leftovers = db.staging_relations()?;
            if leftovers.is_empty() {
                println!("No staging tables.");
            }
            for name in leftovers {
                println!("{name}");
            }
        }
        Commands::Pull { what, stage } => {
            let frame = pull(what, config)?;
            match stage {
                Some(table) => {
                    let report = stage_frame(&mut db, frame, &table, None)?;
                    if let Some(id) = report.snapshot_id {
                        println!("Snapshot {id}");
                    }
                    report_write(&report.outcome);
                }
                None => println!("{frame}"),
            }
        }
    }
    Ok(())
}

fn pull(what: PullTarget, config: &Config) -> Result<DataFrame> {
    let breaker = Arc::new(CircuitBreaker::default_api());
    let transport = ReqwestTransport::new(&config.feed, breaker)?;
    let token = StaticToken::from_config(&config.feed)?;
    let client = MarketDataClient::new(transport, token);

    let frame = match what {
        PullTarget::Prices {
            symbol,
            period_type,
            period,
            frequency_type,
            frequency,
            start,
            end,
        } => {
            let today = chrono::Local::now().date_naive();
            let request = PriceHistoryRequest {
                symbol,
                period_type: period_type.parse::<PeriodType>()?,
                period,
                frequency_type: frequency_type.parse::<FrequencyType>()?,
                frequency,
                start_date: parse_date(start.as_deref())?
                    .unwrap_or(today - chrono::Duration::days(30)),
                end_date: parse_date(end.as_deref())?.unwrap_or(today),
                need_extended_hours_data: true,
                need_previous_close: true,
            };
            client.price_history(&request)?
        }
        PullTarget::Instruments {
            symbols,
            chunk_size,
        } => client.instruments(&symbols, chunk_size.min(config.feed.symbols_per_request()))?,
        PullTarget::Fundamentals {
            symbols,
            chunk_size,
        } => client.fundamentals(&symbols, chunk_size.min(config.feed.symbols_per_request()))?,
    };
    info!(rows = frame.height(), "pull complete");
    Ok(frame)
}

fn parse_date(raw: Option<&str>) -> Result<Option<NaiveDate>> {
    Ok(raw
        .map(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
        .transpose()?)
}

fn read_csv(path: &Path) -> Result<DataFrame> {
    CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()
        .with_context(|| format!("read CSV {}", path.display()))
}

fn report_write(outcome: &WriteOutcome) {
    match outcome {
        WriteOutcome::Written(report) => {
            println!(
                "Wrote {} rows to {} in {} chunk(s)",
                report.rows_written, report.table, report.chunks
            );
            if !report.dropped_columns.is_empty() {
                println!("Dropped columns: {}", report.dropped_columns.join(", "));
            }
        }
        WriteOutcome::Skipped(reason) => println!("Nothing written: {reason:?}"),
    }
}
