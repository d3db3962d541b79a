mod reconcile;

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use mpdb_core::StoreKind;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "mpdb-cli")]
#[command(about = "Media plan reconciliation command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Rebuild every entity collection from a source export.
    Reconcile {
        /// Directory holding the export files; overrides `MPDB_SOURCE_DIR`.
        #[arg(long)]
        source: Option<PathBuf>,
        /// Target namespace; overrides `MPDB_NAMESPACE`.
        #[arg(long)]
        namespace: Option<String>,
        /// Target store (`file`, `memory`, `postgres`); overrides `MPDB_STORE`.
        #[arg(long)]
        store: Option<StoreKind>,
        /// Clear each collection before loading it.
        #[arg(long)]
        full_replace: bool,
        /// Compare stored keys against the run's keys after loading.
        #[arg(long)]
        verify: bool,
        /// Transform and resolve identity without writing anything.
        #[arg(long)]
        dry_run: bool,
        /// Reference date for flight-based statuses (`YYYY-MM-DD`); defaults to today.
        #[arg(long)]
        as_of: Option<NaiveDate>,
        /// Print the full run report as JSON instead of a summary table.
        #[arg(long)]
        json: bool,
    },
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Apply pending migrations to `DATABASE_URL`.
    Migrate,
    /// Check that `DATABASE_URL` is reachable.
    Ping,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let mut config = mpdb_core::load_pipeline_config_from_env()?;

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command {
        Some(Commands::Reconcile {
            source,
            namespace,
            store,
            full_replace,
            verify,
            dry_run,
            as_of,
            json,
        }) => {
            if let Some(source) = source {
                config.source_dir = source;
            }
            if let Some(namespace) = namespace {
                config.namespace = namespace;
            }
            if let Some(store) = store {
                config.store = store;
            }
            let args = reconcile::ReconcileArgs {
                full_replace,
                verify,
                dry_run,
                as_of,
                json,
            };
            let code = reconcile::run_reconcile(&config, &args).await?;
            Ok(ExitCode::from(u8::try_from(code).unwrap_or(1)))
        }
        Some(Commands::Db {
            command: DbCommands::Migrate,
        }) => {
            let pool = mpdb_db::connect_pool_from_config(&config).await?;
            let applied = mpdb_db::run_migrations(&pool).await?;
            println!("applied {applied} migration(s)");
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Db {
            command: DbCommands::Ping,
        }) => {
            let pool = mpdb_db::connect_pool_from_config(&config).await?;
            mpdb_db::ping(&pool).await?;
            println!("database reachable");
            Ok(ExitCode::SUCCESS)
        }
        None => {
            println!("mpdb-cli: run `mpdb-cli reconcile --help` to get started");
            Ok(ExitCode::SUCCESS)
        }
    }
}
