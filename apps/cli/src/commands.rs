//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use jobpilot_core::{
    Decision, EventKind, Orchestrator, RunContext, RunEvent, RunSummary, SkipReason, SystemClock,
    decide, next_allowed,
};
use jobpilot_session::{SessionManager, SessionOptions, WebDriverBackend, reclaim_orphan};
use jobpilot_shared::{
    AppConfig, RunOptions, db_path, init_config, load_config, load_config_from, load_credentials,
};
use jobpilot_storage::Storage;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// JobPilot: apply to matching jobs within a daily budget.
#[derive(Parser)]
#[command(
    name = "jobpilot",
    version,
    about = "Search, score and apply to job postings within a daily quota and schedule.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.jobpilot/jobpilot.toml).
    #[arg(long, global = true, env = "JOBPILOT_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Command-line overrides for one run.
#[derive(clap::Args, Debug, Default, Clone)]
pub(crate) struct RunFlags {
    /// Evaluate and filter postings without submitting anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Maximum applications for this run.
    #[arg(long)]
    pub max: Option<u32>,

    /// Minimum match score (0-100).
    #[arg(long, conflicts_with = "no_filter")]
    pub threshold: Option<f64>,

    /// Apply to every eligible posting regardless of score.
    #[arg(long)]
    pub no_filter: bool,

    /// Print progress events as JSON lines instead of a spinner.
    #[arg(long)]
    pub events_json: bool,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Search, score and apply.
    Run(RunFlags),

    /// Show today's quota and the next allowed submission time.
    Quota,

    /// List indeterminate submissions that need a manual check.
    Review {
        /// Mark an attempt as checked.
        #[arg(long)]
        resolve: Option<String>,
    },

    /// Show recent runs.
    Runs {
        #[arg(long, default_value = "10")]
        limit: u32,
    },

    /// Release a browser session left behind by a crashed run.
    Reclaim,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "jobpilot=info",
        1 => "jobpilot=debug",
        _ => "jobpilot=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Run(flags) => cmd_run(config_path, &flags).await,
        Command::Quota => cmd_quota(config_path).await,
        Command::Review { resolve } => cmd_review(config_path, resolve.as_deref()).await,
        Command::Runs { limit } => cmd_runs(config_path, limit).await,
        Command::Reclaim => cmd_reclaim(config_path).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path).await,
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    Ok(match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    })
}

/// Merge command-line flags over the file's run options.
fn run_options(config: &AppConfig, flags: &RunFlags) -> Result<RunOptions> {
    let mut options = RunOptions::try_from(config)?;
    options.dry_run |= flags.dry_run;
    if let Some(max) = flags.max {
        options.max_applications = max;
    }
    if let Some(threshold) = flags.threshold {
        options.match_threshold = Some(threshold);
    }
    if flags.no_filter {
        options.match_threshold = None;
    }
    options.validate()?;
    Ok(options)
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

async fn cmd_run(config_path: Option<&Path>, flags: &RunFlags) -> Result<()> {
    let config = resolve_config(config_path)?;
    let options = run_options(&config, flags)?;
    let credentials = load_credentials(&config.session)?;
    let dry_run = options.dry_run;

    let storage = Arc::new(Storage::open(&db_path(&config.storage)?).await?);
    let backend = Arc::new(WebDriverBackend::new(&config.session)?);
    let mut session = SessionManager::new(backend, SessionOptions::from_config(&config)?);
    let mut orchestrator = Orchestrator::from_config(&config, options, storage.clone())?;

    let cancel = CancellationToken::new();
    let (ctx, events) = RunContext::new(Arc::new(SystemClock))
        .with_cancel(cancel.clone())
        .with_events();
    let run_id = ctx.run_id;
    storage.insert_run(run_id, ctx.clock.now(), dry_run).await?;

    info!(%run_id, dry_run, "starting run");

    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; finishing the current job before stopping");
            cancel.cancel();
        }
    });
    let progress = tokio::spawn(report_progress(events, flags.events_json));

    let result = orchestrator.run(&mut session, &credentials, &ctx).await;
    drop(ctx);
    interrupt.abort();
    if let Err(e) = progress.await {
        warn!(error = %e, "progress reporter stopped unexpectedly");
    }

    let summary = result?;
    let summary_json = serde_json::to_string(&summary)?;
    let finished_at = summary.finished_at.unwrap_or_else(chrono::Utc::now);
    storage.finish_run(run_id, finished_at, &summary_json).await?;

    if !flags.events_json {
        print_summary(&summary);
    }

    match &summary.halt {
        Some(halt) if halt.is_error() => Err(eyre!("run halted: {halt}")),
        _ => Ok(()),
    }
}

/// Drain run events until the orchestrator drops its sender.
async fn report_progress(mut events: UnboundedReceiver<RunEvent>, json: bool) {
    if json {
        while let Some(event) = events.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!(error = %e, "could not serialize event"),
            }
        }
        return;
    }

    let progress = CliProgress::new();
    while let Some(event) = events.recv().await {
        progress.handle(&event);
    }
    progress.finish();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        spinner.set_message("Signing in");
        Self { spinner }
    }

    fn handle(&self, event: &RunEvent) {
        match &event.kind {
            EventKind::JobFound { posting } => {
                self.spinner
                    .set_message(format!("Found {} at {}", posting.title, posting.company));
            }
            EventKind::JobSkipped {
                reason: SkipReason::DryRun,
                posting_id: Some(id),
                ..
            } => self.spinner.println(format!("  would apply: {id}")),
            EventKind::JobSkipped { .. } => {}
            EventKind::ApplicationAttempted {
                title,
                company,
                score,
                ..
            } => {
                let score = score.map(|s| format!(" ({s:.0})")).unwrap_or_default();
                self.spinner
                    .set_message(format!("Applying: {title} at {company}{score}"));
            }
            EventKind::ApplicationResult {
                posting_id,
                outcome,
                reason,
            } => {
                let reason = reason.map(|r| format!(" [{}]", r.as_str())).unwrap_or_default();
                self.spinner
                    .println(format!("  {}: {posting_id}{reason}", outcome.as_str()));
            }
            EventKind::ApplyStep { posting_id, state } => {
                self.spinner.set_message(format!("{state}: {posting_id}"));
            }
            EventKind::QuotaReached { count, limit } => {
                self.spinner
                    .println(format!("  daily quota reached ({count}/{limit})"));
            }
            EventKind::SessionError { message, halted } => {
                let prefix = if *halted { "halted" } else { "waiting" };
                self.spinner.println(format!("  {prefix}: {message}"));
            }
            EventKind::RunFinished { .. } => self.spinner.set_message("Done"),
        }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

fn print_summary(summary: &RunSummary) {
    println!();
    if summary.dry_run {
        println!("  Dry run finished.");
        println!("  Eligible:      {}", summary.dry_run_eligible);
    } else {
        println!("  Run finished.");
        println!("  Succeeded:     {}", summary.succeeded);
        println!("  Failed:        {}", summary.failed);
        println!("  Indeterminate: {}", summary.indeterminate);
    }
    println!("  Candidates:    {}", summary.candidates);
    println!("  Skipped:       {}", summary.skipped.total());
    println!("    duplicate:         {}", summary.skipped.duplicate);
    println!("    not easy apply:    {}", summary.skipped.not_easy_apply);
    println!("    blacklisted:       {}", summary.skipped.blacklisted);
    println!("    below threshold:   {}", summary.skipped.below_threshold);
    println!("    extraction failed: {}", summary.skipped.extraction_failed);
    if let Some(halt) = &summary.halt {
        println!("  Stopped:       {halt}");
    }
    if summary.indeterminate > 0 {
        println!("  Run `jobpilot review` to check indeterminate submissions.");
    }
    println!();
}

// ---------------------------------------------------------------------------
// Reporting commands
// ---------------------------------------------------------------------------

async fn cmd_quota(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let options = RunOptions::try_from(&config)?;
    let storage = Storage::open(&db_path(&config.storage)?).await?;

    let now = Local::now().naive_local();
    let used = storage.succeeded_on(now.date()).await?;

    println!();
    println!("  Today:    {used}/{} applications", options.daily_limit);
    match decide(
        now,
        used,
        options.daily_limit,
        &options.allowed_windows,
        &options.weekday_policy,
    ) {
        Decision::Allow => println!("  Status:   open"),
        Decision::Deny(reason) => {
            println!("  Status:   closed ({reason})");
            match next_allowed(now, &options.allowed_windows, &options.weekday_policy) {
                Some(next) if next > now => {
                    println!("  Next:     {}", next.format("%a %Y-%m-%d %H:%M"));
                }
                _ => {}
            }
        }
    }
    println!();
    Ok(())
}

async fn cmd_review(config_path: Option<&Path>, resolve: Option<&str>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let storage = Storage::open(&db_path(&config.storage)?).await?;

    if let Some(id) = resolve {
        if !storage.resolve_review(id).await? {
            return Err(eyre!("no pending review with id '{id}'"));
        }
        println!("Marked {id} as reviewed.");
        return Ok(());
    }

    let items = storage.pending_reviews().await?;
    if items.is_empty() {
        println!("Nothing to review.");
        return Ok(());
    }
    for item in items {
        println!(
            "{}  {}  {} at {}",
            item.attempt_id,
            item.attempted_at.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
            item.title.as_deref().unwrap_or("?"),
            item.company.as_deref().unwrap_or("?"),
        );
        println!("    {}", item.posting_id);
        if let Some(detail) = item.detail {
            println!("    {detail}");
        }
    }
    Ok(())
}

async fn cmd_runs(config_path: Option<&Path>, limit: u32) -> Result<()> {
    let config = resolve_config(config_path)?;
    let storage = Storage::open(&db_path(&config.storage)?).await?;

    for run in storage.recent_runs(limit).await? {
        let summary = run
            .summary_json
            .as_deref()
            .and_then(|s| serde_json::from_str::<RunSummary>(s).ok());
        let started = run.started_at.with_timezone(&Local).format("%Y-%m-%d %H:%M");
        let mode = if run.dry_run { "dry-run" } else { "live" };
        match summary {
            Some(s) => println!(
                "{}  {started}  {mode}  candidates={} succeeded={} failed={} indeterminate={}{}",
                run.id,
                s.candidates,
                s.succeeded,
                s.failed,
                s.indeterminate,
                s.halt.map(|h| format!("  ({h})")).unwrap_or_default(),
            ),
            None => println!("{}  {started}  {mode}  (did not finish)", run.id),
        }
    }
    Ok(())
}

async fn cmd_reclaim(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let backend = WebDriverBackend::new(&config.session)?;
    let options = SessionOptions::from_config(&config)?;

    match reclaim_orphan(&backend, &options).await? {
        Some(lock) => println!(
            "Released session {} ({} {}).",
            lock.session_id, lock.handle.backend, lock.handle.id
        ),
        None => println!("No orphaned session found."),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
