//! CLI entry point for the releasegate tool.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use releasegate_core::{
    Candidate, ChannelPublisher, Database, DownloadFailedEvent, EvaluationContext,
    FailedDownloadError, FailedDownloadService, LibraryItem, QualityProfile, QueueEntry,
    ReleaseSource, SharedQueue, SqliteHistory, TrackedDownload, build_default_admission_chain,
    cutoff_unmet, plan_redownload,
};
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

mod cli;
mod config;

use cli::{
    Args, CheckArgs, Command, CutoffUnmetArgs, EvaluateArgs, MarkFailedArgs, RecordGrabArgs,
};
use config::{DEFAULT_DATABASE_PATH, FileConfig};

/// Exit code for a rejected candidate.
const EXIT_REJECTED: u8 = 2;

/// Exit code for a failure pass that should be retried later (`EX_TEMPFAIL`).
const EXIT_RETRY_LATER: u8 = 75;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let loaded = config::load_config(args.config.as_deref())?;
    debug!(
        path = ?loaded.path,
        from_file = loaded.loaded_from_file,
        "configuration resolved"
    );

    match args.command {
        Command::Evaluate(evaluate) => run_evaluate(&evaluate, &loaded.config),
        Command::CutoffUnmet(cutoff) => run_cutoff_unmet(&cutoff),
        Command::RecordGrab(grab) => run_record_grab(&grab, &loaded.config).await,
        Command::Check(check) => run_check(&check, &loaded.config).await,
        Command::MarkFailed(mark) => run_mark_failed(&mark, &loaded.config).await,
    }
}

fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {what} file '{}'", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse {what} file '{}'", path.display()))
}

fn read_profile(path: &Path) -> Result<QualityProfile> {
    let profile: QualityProfile = read_json(path, "profile")?;
    profile
        .validate()
        .with_context(|| format!("Invalid profile in '{}'", path.display()))?;
    Ok(profile)
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_evaluate(args: &EvaluateArgs, config: &FileConfig) -> Result<ExitCode> {
    let profile = read_profile(&args.profile)?;
    let candidate: Candidate = read_json(&args.candidate, "candidate")?;
    let held: Vec<LibraryItem> = match &args.held {
        Some(path) => read_json(path, "held items")?,
        None => Vec::new(),
    };
    let queue: Vec<QueueEntry> = match &args.queue {
        Some(path) => read_json(path, "queue")?,
        None => Vec::new(),
    };

    let chain = build_default_admission_chain(
        &config.decision_settings(),
        Arc::new(SharedQueue::new(queue)),
    );
    let context = EvaluationContext::new(args.search_kind, &held);
    let verdict = chain.evaluate(&candidate, &profile, &context);
    print_json(&verdict)?;

    if verdict.is_accepted() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(EXIT_REJECTED))
    }
}

fn run_cutoff_unmet(args: &CutoffUnmetArgs) -> Result<ExitCode> {
    let profile = read_profile(&args.profile)?;
    let items: Vec<LibraryItem> = read_json(&args.items, "library items")?;
    let unmet = cutoff_unmet(&profile, &items);
    info!(total = items.len(), unmet = unmet.len(), "cutoff check complete");
    print_json(&unmet)?;
    Ok(ExitCode::SUCCESS)
}

fn database_path(explicit: Option<&PathBuf>, config: &FileConfig) -> PathBuf {
    explicit
        .or(config.database_path.as_ref())
        .cloned()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH))
}

/// History store and failure service sharing one database.
struct FailurePipeline {
    history: Arc<SqliteHistory>,
    service: FailedDownloadService,
    events: mpsc::UnboundedReceiver<DownloadFailedEvent>,
}

impl FailurePipeline {
    async fn open(path: &Path) -> Result<Self> {
        let db = Database::new(path)
            .await
            .with_context(|| format!("Failed to open history database '{}'", path.display()))?;
        let history = Arc::new(SqliteHistory::new(db));
        let (publisher, events) = ChannelPublisher::channel();
        let service = FailedDownloadService::new(history.clone(), Arc::new(publisher));
        Ok(Self {
            history,
            service,
            events,
        })
    }

    /// Records published failures in history and plans replacement searches.
    async fn finish(self, auto_redownload: bool) -> Result<serde_json::Value> {
        let Self {
            history,
            service,
            mut events,
        } = self;
        drop(service);

        let mut published = Vec::new();
        let mut searches = Vec::new();
        while let Some(event) = events.recv().await {
            history.record_failure(&event).await?;
            if let Some(search) = plan_redownload(&event, auto_redownload) {
                searches.push(search);
            }
            published.push(event);
        }
        Ok(json!({ "events": published, "searches": searches }))
    }
}

/// Turns a retryable failure into [`EXIT_RETRY_LATER`]; other errors propagate.
fn retry_later(outcome: Result<(), FailedDownloadError>) -> Result<Option<ExitCode>> {
    match outcome {
        Ok(()) => Ok(None),
        Err(error) if error.is_retryable() => {
            warn!(error = %error, "failure handling deferred, retry on the next pass");
            Ok(Some(ExitCode::from(EXIT_RETRY_LATER)))
        }
        Err(error) => Err(error.into()),
    }
}

async fn run_record_grab(args: &RecordGrabArgs, config: &FileConfig) -> Result<ExitCode> {
    let candidate: Candidate = read_json(&args.candidate, "candidate")?;
    let path = database_path(args.db.as_ref(), config);
    let db = Database::new(&path)
        .await
        .with_context(|| format!("Failed to open history database '{}'", path.display()))?;
    let history = SqliteHistory::new(db);

    let ids = history
        .record_grab(
            &candidate,
            &args.download_id,
            &args.download_client,
            ReleaseSource::parse_lossy(&args.source),
        )
        .await?;
    info!(download_id = %args.download_id, rows = ids.len(), "grab recorded");
    print_json(&json!({ "history_ids": ids }))?;
    Ok(ExitCode::SUCCESS)
}

async fn run_check(args: &CheckArgs, config: &FileConfig) -> Result<ExitCode> {
    let mut tracked: TrackedDownload = read_json(&args.tracked, "tracked download")?;
    let pipeline = FailurePipeline::open(&database_path(args.db.as_ref(), config)).await?;

    let outcome = match pipeline.service.check(&mut tracked).await {
        Ok(()) => pipeline.service.process_failed(&mut tracked).await,
        Err(error) => Err(error),
    };
    if let Some(code) = retry_later(outcome)? {
        return Ok(code);
    }
    info!(download_id = %tracked.download_id(), state = %tracked.state, "check complete");

    let mut output = pipeline.finish(config.auto_redownload()).await?;
    output["tracked"] = serde_json::to_value(&tracked)?;
    print_json(&output)?;
    Ok(ExitCode::SUCCESS)
}

async fn run_mark_failed(args: &MarkFailedArgs, config: &FileConfig) -> Result<ExitCode> {
    let pipeline = FailurePipeline::open(&database_path(args.db.as_ref(), config)).await?;

    let outcome = if let Some(history_id) = args.history_id {
        pipeline
            .service
            .mark_as_failed_by_history_id(history_id, args.skip_redownload)
            .await
    } else if let Some(download_id) = &args.download_id {
        pipeline
            .service
            .mark_as_failed_by_download_id(download_id, args.skip_redownload)
            .await
            .map(|marked| {
                if !marked {
                    info!(download_id = %download_id, "no grab history for download");
                }
            })
    } else {
        Ok(())
    };
    if let Some(code) = retry_later(outcome)? {
        return Ok(code);
    }

    let output = pipeline.finish(config.auto_redownload()).await?;
    print_json(&output)?;
    Ok(ExitCode::SUCCESS)
}
