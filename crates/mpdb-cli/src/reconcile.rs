//! `reconcile` command: picks the target store, wires Ctrl-C to the cancel
//! flag, runs the pipeline and prints the outcome.

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use mpdb_core::{PipelineConfig, StoreKind};
use mpdb_db::{CancelFlag, DocumentStore, JsonFileStore, LoadMode, MemoryStore, PgDocumentStore};
use mpdb_etl::{Pipeline, PipelineReport, RunOptions};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ReconcileArgs {
    pub(crate) full_replace: bool,
    pub(crate) verify: bool,
    pub(crate) dry_run: bool,
    pub(crate) as_of: Option<NaiveDate>,
    pub(crate) json: bool,
}

pub(crate) fn run_options(config: &PipelineConfig, args: &ReconcileArgs) -> RunOptions {
    RunOptions {
        mode: if args.full_replace {
            LoadMode::Replace
        } else {
            LoadMode::Upsert
        },
        verify: args.verify,
        dry_run: args.dry_run,
        as_of: args.as_of.unwrap_or_else(|| Utc::now().date_naive()),
        id_map_dir: Some(config.output_dir.join(&config.namespace).join("id_map")),
    }
}

/// Run the pipeline against the configured store and return the process exit
/// code. Dry runs never open the configured store.
///
/// # Errors
///
/// Returns an error if the Postgres store cannot be reached or migrated, the
/// pipeline cannot be built, or the JSON report cannot be rendered.
pub(crate) async fn run_reconcile(config: &PipelineConfig, args: &ReconcileArgs) -> anyhow::Result<i32> {
    let options = run_options(config, args);
    let cancel = CancelFlag::new();
    spawn_cancel_on_ctrl_c(cancel.clone());

    let report = if args.dry_run {
        execute(config, &MemoryStore::new(), options, cancel).await?
    } else {
        match config.store {
            StoreKind::File => {
                let store = JsonFileStore::new(&config.output_dir, &config.namespace);
                execute(config, &store, options, cancel).await?
            }
            StoreKind::Memory => execute(config, &MemoryStore::new(), options, cancel).await?,
            StoreKind::Postgres => {
                let pool = mpdb_db::connect_pool_from_config(config)
                    .await
                    .context("connecting to the postgres store")?;
                mpdb_db::run_migrations(&pool)
                    .await
                    .context("migrating the postgres store")?;
                let store = PgDocumentStore::new(pool, config.namespace.clone());
                execute(config, &store, options, cancel).await?
            }
        }
    };

    if args.json {
        let rendered =
            serde_json::to_string_pretty(&report).context("rendering the run report")?;
        println!("{rendered}");
    } else {
        print_summary(&report);
    }
    Ok(report.exit_code())
}

async fn execute<S: DocumentStore>(
    config: &PipelineConfig,
    store: &S,
    options: RunOptions,
    cancel: CancelFlag,
) -> anyhow::Result<PipelineReport> {
    let mut pipeline = Pipeline::new(config, store, options)?.with_cancel_flag(cancel);
    Ok(pipeline.run().await)
}

fn spawn_cancel_on_ctrl_c(cancel: CancelFlag) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("received ctrl-c, stopping after the current batch");
            cancel.cancel();
        }
    });
}

pub(crate) fn summary_lines(report: &PipelineReport) -> Vec<String> {
    let mut lines = vec![format!(
        "{:<10} {:<17} {:>7} {:>7} {:>7} {:>7} {:>7} {:>8} {:>8}",
        "entity", "state", "read", "insert", "update", "failed", "reject", "orphans", "warnings"
    )];
    for e in &report.entities {
        let warnings: usize = e.warnings.values().sum();
        lines.push(format!(
            "{:<10} {:<17} {:>7} {:>7} {:>7} {:>7} {:>7} {:>8} {:>8}",
            e.entity.as_str(),
            e.state.label(),
            e.rows_read,
            e.inserted(),
            e.updated(),
            e.failed(),
            e.rejected,
            e.orphans,
            warnings
        ));
    }
    lines
}

fn print_summary(report: &PipelineReport) {
    if report.dry_run {
        println!("dry-run: nothing was written to namespace '{}'", report.namespace);
    }
    for line in summary_lines(report) {
        println!("{line}");
    }
    for e in report.failed_entities() {
        if let mpdb_etl::RunState::Failed { reason } = &e.state {
            eprintln!("error: {} failed: {reason}", e.entity);
        }
    }
}
