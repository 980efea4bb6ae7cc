//! # Plenary CLI (`plenary`)
//!
//! Ingests parliamentary plenary-protocol XML into a local document store.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `plenary init` | Create the SQLite database and collection tables |
//! | `plenary ingest` | Parse every transcript in the input directory and upsert the records |
//! | `plenary parse <file>` | Parse one transcript and print the records as JSON |
//! | `plenary stats` | Record counts per collection |
//! | `plenary get <collection> <id>` | Print one stored record |
//!
//! ## Examples
//!
//! ```bash
//! plenary init --config ./config/plenary.toml
//! plenary ingest --dir ./protocols --workers 8
//! plenary ingest --dry-run --progress json
//! plenary get speeches ID2011400100
//! ```
//!
//! Logs go to stderr; `RUST_LOG` overrides `[logging] filter`.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use plenary_ingest::config::{self, Config};
use plenary_ingest::ingest::{self, IngestOptions, IngestSummary};
use plenary_ingest::progress::ProgressMode;
use plenary_ingest::store::{MemoryStore, SqliteStore};
use plenary_ingest::{get, migrate, runtime, stats, transcript};

/// Plenary: parliamentary transcript ingestion.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/plenary.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "plenary",
    about = "Plenary: parse parliamentary plenary protocols into speeches, agenda items and comments",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/plenary.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and one table per collection.
    /// Safe to run repeatedly.
    Init,

    /// Parse and persist every transcript in the input directory.
    ///
    /// Files are parsed in parallel, then speeches, agenda items and
    /// comments are upserted by id in batches. Re-running on the same
    /// files replaces the stored records.
    Ingest {
        /// Input directory (overrides `[ingest] input_dir`).
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Parallel parse workers; 0 uses every available CPU.
        #[arg(long)]
        workers: Option<usize>,

        /// Records per upsert batch.
        #[arg(long)]
        batch_size: Option<usize>,

        /// Deadline for the parse phase, in seconds.
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Maximum number of files to ingest.
        #[arg(long)]
        limit: Option<usize>,

        /// Parse and aggregate, but write to a throwaway in-memory store.
        #[arg(long)]
        dry_run: bool,

        /// Progress output on stderr. Defaults to `human` on a TTY, else `off`.
        #[arg(long, value_enum)]
        progress: Option<ProgressArg>,

        /// Print the summary as JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Parse a single transcript and print its records as JSON.
    ///
    /// Does not touch the database.
    Parse {
        /// Transcript XML file.
        file: PathBuf,
    },

    /// Show record counts per collection.
    Stats,

    /// Print one stored record as JSON.
    Get {
        /// Collection: `speeches`, `agenda` or `comments`.
        collection: String,

        /// Record id.
        id: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgressArg {
    Off,
    Human,
    Json,
}

impl From<ProgressArg> for ProgressMode {
    fn from(arg: ProgressArg) -> Self {
        match arg {
            ProgressArg::Off => ProgressMode::Off,
            ProgressArg::Human => ProgressMode::Human,
            ProgressArg::Json => ProgressMode::Json,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    runtime::block_on(run(cli))
}

async fn run(cli: Cli) -> Result<()> {
    // `parse` works without a config file.
    let cfg = match &cli.command {
        Commands::Parse { .. } => {
            config::load_config(&cli.config).unwrap_or_else(|_| Config::minimal())
        }
        _ => config::load_config(&cli.config)?,
    };
    init_tracing(&cfg.logging.filter);

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest {
            dir,
            workers,
            batch_size,
            timeout_secs,
            limit,
            dry_run,
            progress,
            json,
        } => {
            let mut cfg = cfg;
            if let Some(dir) = dir {
                cfg.ingest.input_dir = dir;
            }
            if let Some(workers) = workers {
                cfg.ingest.workers = workers;
            }
            if let Some(batch_size) = batch_size {
                cfg.ingest.batch_size = batch_size;
            }
            if let Some(timeout_secs) = timeout_secs {
                cfg.ingest.timeout_secs = timeout_secs;
            }
            cfg.validate()?;

            let mut options = IngestOptions::from_config(&cfg);
            options.limit = limit;
            let mode = progress
                .map(ProgressMode::from)
                .unwrap_or_else(ProgressMode::default_for_tty);

            let summary = run_ingest(&cfg, &options, dry_run, mode).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                if dry_run {
                    println!("(dry-run: nothing written to {})", cfg.db.path.display());
                }
                println!("{}", summary);
            }
        }
        Commands::Parse { file } => {
            let parsed = transcript::parse_file(&file)?;
            println!("{}", serde_json::to_string_pretty(&parsed)?);
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Get { collection, id } => {
            get::run_get(&cfg, &collection, &id).await?;
        }
    }

    Ok(())
}

async fn run_ingest(
    cfg: &Config,
    options: &IngestOptions,
    dry_run: bool,
    mode: ProgressMode,
) -> Result<IngestSummary> {
    let reporter = mode.reporter();

    if dry_run {
        let store = MemoryStore::new();
        return Ok(ingest::ingest_directory(&store, options, reporter.as_ref()).await?);
    }

    let store = match SqliteStore::open(cfg).await {
        Ok(store) => store,
        Err(e) => bail!(
            "document store unavailable ({}): {}",
            cfg.db.path.display(),
            e
        ),
    };
    let summary = ingest::ingest_directory(&store, options, reporter.as_ref()).await;
    store.close().await;
    Ok(summary?)
}

/// Install the stderr log subscriber. `RUST_LOG` wins over the config file.
fn init_tracing(config_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
