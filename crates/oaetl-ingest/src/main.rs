//! OAETL Ingest - OpenAlex snapshot loader

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use oaetl_common::logging::{init_logging, LogConfig, LogLevel};
use oaetl_ingest::checkpoint::CheckpointStore;
use oaetl_ingest::config::{EtlConfig, SourceConfig};
use oaetl_ingest::fetch::Fetcher;
use oaetl_ingest::loader::BatchLoader;
use oaetl_ingest::monitor::{render_report, spawn_monitor};
use oaetl_ingest::normalize::OpenAlexNormalizer;
use oaetl_ingest::orchestrator::Pipeline;
use oaetl_ingest::sink::{MemorySink, PgSink, Sink};
use oaetl_ingest::source::{Enumerator, LocalSource, RemoteSource, S3Source};
use oaetl_ingest::EntityKind;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "oaetl-ingest")]
#[command(author, version, about = "Resumable OpenAlex snapshot ingestion")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding data/state and data/temp
    #[arg(long, global = true, env = "ETL_BASE_DIR")]
    base_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load pending snapshot files
    Run {
        /// Entity kinds to load (default: all, in pipeline order)
        #[arg(short, long = "entity", value_delimiter = ',')]
        entities: Vec<EntityKind>,

        /// Normalize and count rows without writing to the database
        #[arg(long)]
        dry_run: bool,

        /// Log a progress snapshot every N seconds
        #[arg(long, value_name = "SECS")]
        monitor_interval: Option<u64>,

        /// Create destination tables before loading
        #[arg(long)]
        init_schema: bool,

        /// Read from a local mirror instead of S3
        #[arg(long, env = "LOCAL_SOURCE_DIR")]
        local_dir: Option<PathBuf>,

        /// Primary-table rows per flush
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Print the checkpoint state report
    Status {
        /// Emit the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Forget all progress for one entity kind
    Reset { entity: EntityKind },

    /// Create the destination schema and tables
    InitSchema,

    /// Delete checkpoint backups older than N days
    CleanupBackups {
        #[arg(long, default_value_t = 30)]
        days: i64,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence over the defaults below
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("oaetl-ingest")
        .build()
        .merge_env()?;
    let _log_guard = init_logging(&log_config)?;

    let mut config = EtlConfig::from_env().context("Invalid configuration")?;
    if let Some(base_dir) = cli.base_dir {
        config.state.base_dir = base_dir;
    }

    match cli.command {
        Command::Run {
            entities,
            dry_run,
            monitor_interval,
            init_schema,
            local_dir,
            batch_size,
        } => {
            if let Some(dir) = local_dir {
                config.source.local_dir = Some(dir);
            }
            if let Some(size) = batch_size {
                config.loader.batch_size = size;
            }
            config.validate()?;
            run(config, &entities, dry_run, monitor_interval, init_schema).await
        },
        Command::Status { json } => {
            let store = CheckpointStore::open(&config.state)?;
            let summary = store.summary();
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print!("{}", render_report(&summary));
            }
            Ok(ExitCode::SUCCESS)
        },
        Command::Reset { entity } => {
            let store = CheckpointStore::open(&config.state)?;
            store.reset_entity(entity)?;
            info!(entity = %entity, "Entity reset");
            Ok(ExitCode::SUCCESS)
        },
        Command::InitSchema => {
            let sink = PgSink::connect(&config.database).await?;
            sink.ensure_schema().await?;
            Ok(ExitCode::SUCCESS)
        },
        Command::CleanupBackups { days } => {
            let store = CheckpointStore::open(&config.state)?;
            let removed = store.cleanup_old_backups(days)?;
            info!(removed, days, "Backup cleanup finished");
            Ok(ExitCode::SUCCESS)
        },
    }
}

async fn run(
    config: EtlConfig,
    entities: &[EntityKind],
    dry_run: bool,
    monitor_interval: Option<u64>,
    init_schema: bool,
) -> Result<ExitCode> {
    let live = CheckpointStore::open(&config.state)?;

    // Dry runs progress a throwaway copy so the real checkpoint never records
    // files that were not written.
    let (checkpoint, dry_run_dir) = if dry_run {
        let dir = config.state.scratch_dir().join("dry_run_state");
        let copy = CheckpointStore::with_paths(dir.join("ingestion_state.json"), dir.join("backups"), 1)?;
        copy.save(&live.load())?;
        (copy, Some(dir))
    } else {
        (live, None)
    };
    let source = build_source(&config.source).await?;
    let retry = config.fetch.retry_policy();

    let sink: Arc<dyn Sink> = if dry_run {
        info!("Dry run: rows are counted, not written");
        Arc::new(MemorySink::discarding())
    } else {
        let pg = PgSink::connect(&config.database)
            .await
            .context("Failed to connect to database")?;
        if init_schema {
            pg.ensure_schema().await?;
        }
        Arc::new(pg)
    };

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current file");
            interrupt.cancel();
        }
    });

    let monitor_stop = CancellationToken::new();
    let monitor = monitor_interval.map(|secs| {
        spawn_monitor(
            checkpoint.clone(),
            Duration::from_secs(secs.max(1)),
            monitor_stop.clone(),
        )
    });

    let pipeline = Pipeline::new(
        Enumerator::new(
            source.clone(),
            checkpoint.clone(),
            config.source.partition_marker.clone(),
            retry,
        ),
        Fetcher::new(source, config.state.scratch_dir(), retry),
        BatchLoader::new(OpenAlexNormalizer, sink, checkpoint.clone(), config.loader),
        checkpoint,
        cancel,
    );

    let report = pipeline.run(entities).await;

    monitor_stop.cancel();
    if let Some(handle) = monitor {
        let _ = handle.await;
    }

    for entity in &report.entities {
        info!(
            entity = %entity.kind,
            outcome = ?entity.outcome,
            files = entity.files_loaded,
            skipped = entity.files_skipped,
            records = entity.records,
            "Entity summary"
        );
    }
    info!(outcome = ?report.outcome, "Run finished");

    if let Some(dir) = dry_run_dir {
        if let Err(e) = std::fs::remove_dir_all(&dir) {
            warn!(dir = %dir.display(), error = %e, "Failed to remove dry-run state");
        }
    }

    let code = u8::try_from(report.outcome.exit_code()).unwrap_or(1);
    Ok(ExitCode::from(code))
}

async fn build_source(config: &SourceConfig) -> Result<Arc<dyn RemoteSource>> {
    match &config.local_dir {
        Some(dir) => {
            info!(dir = %dir.display(), "Reading snapshot from local mirror");
            Ok(Arc::new(LocalSource::new(dir)))
        },
        None => Ok(Arc::new(S3Source::new(config).await?)),
    }
}
