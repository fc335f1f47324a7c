use std::sync::Arc;

use anyhow::Result;
use caed::config::DaemonConfig;
use caed::docstore::InMemoryDocumentStore;
use caed::queue::report::status_label;
use caed::uploader::SimulatedUploader;
use caed::AppContext;
use clap::{Parser, Subcommand};
use tracing::info;

#[derive(Parser)]
#[command(
    name = "caed",
    about = "caed — always-on daemon that files subcontractor compliance documents under guarded execution",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Data directory for plans, jobs, challenges, and run evidence
    #[arg(long, env = "CAED_DATA_DIR")]
    data_dir: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "CAED_LOG")]
    log: Option<String>,

    /// Write logs to this file path (rotated daily). Optional.
    #[arg(long, env = "CAED_LOG_FILE")]
    log_file: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the daemon in the foreground (default when no subcommand given).
    ///
    /// Starts the job queue worker against the simulated executor. Real
    /// portal deployments embed this crate and inject their own uploader.
    Serve,
    /// Inspect the persisted job table.
    Jobs {
        #[command(subcommand)]
        action: JobsAction,
    },
    /// Print the human-readable report for one job.
    Report {
        /// Job id (ULID)
        job_id: String,
    },
}

#[derive(Subcommand)]
enum JobsAction {
    /// List all known jobs in enqueue order.
    List,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = DaemonConfig::new(args.data_dir.clone(), args.log.clone());

    let _log_guard = setup_logging(&config.log, args.log_file.as_deref(), &config.log_format);

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        match args.command.unwrap_or(Command::Serve) {
            Command::Serve => serve(config).await,
            Command::Jobs { action: JobsAction::List } => jobs_list(config),
            Command::Report { job_id } => report(config, &job_id),
        }
    })
}

async fn serve(config: DaemonConfig) -> Result<()> {
    let ctx = build_context(config)?;
    let worker = ctx.queue.spawn_worker();

    info!("caed running — press ctrl-c to stop");
    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    worker.abort();
    Ok(())
}

fn jobs_list(config: DaemonConfig) -> Result<()> {
    let ctx = build_context(config)?;
    let jobs = ctx.queue.list();
    if jobs.is_empty() {
        println!("no jobs");
        return Ok(());
    }
    for job in jobs {
        println!(
            "{}  {:<16} {:>3}%  {}",
            job.job_id,
            status_label(job.status),
            job.progress.percent,
            job.scope_summary
        );
    }
    Ok(())
}

fn report(config: DaemonConfig, job_id: &str) -> Result<()> {
    let ctx = build_context(config)?;
    print!("{}", ctx.job_report(job_id)?);
    Ok(())
}

/// The daemon binary always wires the simulated capability pair; a real
/// portal deployment embeds [`caed::AppContext`] with its own implementations.
fn build_context(config: DaemonConfig) -> Result<AppContext> {
    AppContext::initialize(
        config,
        Arc::new(InMemoryDocumentStore::new()),
        Arc::new(SimulatedUploader),
    )
}

/// Configure tracing. Returns the file-appender guard which must stay alive
/// for the process lifetime.
fn setup_logging(
    log_level: &str,
    log_file: Option<&std::path::Path>,
    log_format: &str,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let use_json = log_format == "json";

    if let Some(path) = log_file {
        let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
        let filename = path
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("caed.log"));

        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!(
                "warn: could not create log directory '{}': {e} — falling back to stdout",
                dir.display()
            );
            if use_json {
                tracing_subscriber::fmt().json().with_env_filter(log_level).init();
            } else {
                tracing_subscriber::fmt().with_env_filter(log_level).compact().init();
            }
            return None;
        }

        let appender = tracing_appender::rolling::daily(dir, filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);

        if use_json {
            tracing_subscriber::registry()
                .with(EnvFilter::new(log_level))
                .with(fmt::layer().json())
                .with(fmt::layer().json().with_writer(non_blocking))
                .init();
        } else {
            tracing_subscriber::registry()
                .with(EnvFilter::new(log_level))
                .with(fmt::layer().compact())
                .with(fmt::layer().with_ansi(false).with_writer(non_blocking))
                .init();
        }
        return Some(guard);
    }

    if use_json {
        tracing_subscriber::fmt().json().with_env_filter(log_level).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(log_level).compact().init();
    }
    None
}
