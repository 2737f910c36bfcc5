// src/main.rs
//
// CLI entrypoint for the textlab harness.
//
// Modes:
// - train:           run RL training with event logging + telemetry
// - generate-report: render the latest insights into a Markdown guide
// - health-check:    verify memory and directory prerequisites
// - cleanup-logs:    apply the log retention policy
//
// Fatal configuration or persistence errors print one diagnostic line to
// stderr and exit non-zero. Training progress is preserved up to the
// last checkpoint.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::info;

use textlab::analyzer::{ApiFeedbackReport, InsightAnalyzer};
use textlab::cleanup;
use textlab::clock::{Clock, SystemClock};
use textlab::config::SystemConfig;
use textlab::event_log::InsightLogger;
use textlab::persist::{load_model, save_final_model};
use textlab::report::render_usage_guide;
use textlab::runner::TrainingSystem;
use textlab::telemetry::TelemetryClient;

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Mode {
    Train,
    GenerateReport,
    HealthCheck,
    CleanupLogs,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "textlab",
    about = "RL experimentation harness for text-processing API usage patterns",
    version
)]
struct Args {
    /// Operating mode.
    #[arg(long, value_enum)]
    mode: Mode,

    /// Training episode count.
    #[arg(long, default_value_t = 10_000)]
    episodes: u64,

    /// Logging verbosity (RUST_LOG overrides).
    #[arg(long, value_enum, default_value = "info")]
    log_level: LogLevel,

    /// Checkpoint directory.
    #[arg(long, default_value = "./models")]
    checkpoint_dir: String,

    /// Enable CPU/memory profiling hooks.
    #[arg(long)]
    profile: bool,

    /// JSON config file path.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Report-mode input file (defaults to ./logs/insights.json).
    #[arg(long)]
    input: Option<PathBuf>,

    /// Report-mode output file (defaults to ./api-usage-guide.md).
    #[arg(long)]
    output: Option<PathBuf>,

    /// Report-mode model file.
    #[arg(long)]
    model: Option<PathBuf>,

    /// Deterministic seed for all PRNGs.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// cleanup-logs: print deletions without applying them.
    #[arg(long)]
    dry_run: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.log_level);

    let result = match args.mode {
        Mode::Train => run_training(&args),
        Mode::GenerateReport => generate_report(&args),
        Mode::HealthCheck => return health_check(),
        Mode::CleanupLogs => cleanup_logs(&args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("textlab: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(level: LogLevel) {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_training(args: &Args) -> Result<()> {
    let config = SystemConfig::resolve(
        args.config.as_deref(),
        Some(args.episodes),
        Some(&args.checkpoint_dir),
        args.profile,
    )?;

    // Trim the log directory before a long run fills it further.
    if let Err(err) = cleanup::auto_cleanup(Path::new(&config.log_dir), 50.0, 200) {
        tracing::warn!(error = %err, "log cleanup failed, continuing");
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let mut logger = InsightLogger::start(
        &config.log_dir,
        100,
        Duration::from_secs(5),
        Arc::clone(&clock),
    )?;
    let mut telemetry =
        TelemetryClient::from_env(1_000, Duration::from_secs(10), Arc::clone(&clock));

    info!(
        episodes = config.max_episodes,
        checkpoint_dir = %config.checkpoint_dir,
        seed = args.seed,
        "starting training"
    );

    let mut system = TrainingSystem::new(config.clone(), args.seed, Arc::clone(&clock));
    let cancel = AtomicBool::new(false);
    let summary = system.train(&logger, Some(&telemetry), &cancel)?;

    // Final insight pass over everything the run produced.
    let analyzer = InsightAnalyzer::new(logger.store(), summary.episodes_run, Arc::clone(&clock));
    logger.log_insights(&analyzer.generate_insights());

    let model_path = save_final_model(Path::new(&config.checkpoint_dir), &system.checkpoint())?;

    logger.stop();
    telemetry.stop();

    info!(
        episodes = summary.episodes_run,
        q_table_states = summary.q_table_states,
        dropped_events = summary.dropped_events,
        model = %model_path.display(),
        "training complete"
    );
    Ok(())
}

fn generate_report(args: &Args) -> Result<()> {
    let input = args
        .input
        .clone()
        .unwrap_or_else(|| PathBuf::from("./logs/insights.json"));
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from("./api-usage-guide.md"));

    let data = std::fs::read_to_string(&input)
        .with_context(|| format!("failed to read insights file {}", input.display()))?;
    let report: ApiFeedbackReport = serde_json::from_str(&data)
        .with_context(|| format!("invalid insights file {}", input.display()))?;

    let model = match &args.model {
        Some(path) => Some(load_model(path)?),
        None => None,
    };

    let guide = render_usage_guide(&report, model.as_ref());
    std::fs::write(&output, guide)
        .with_context(|| format!("failed to write report {}", output.display()))?;

    info!(output = %output.display(), "usage guide generated");
    Ok(())
}

fn cleanup_logs(args: &Args) -> Result<()> {
    let report = cleanup::auto_cleanup_with(Path::new("./logs"), 10.0, 100, args.dry_run)?;
    println!(
        "cleanup {}: {} files, {:.1} MB",
        if report.dry_run { "(dry run)" } else { "done" },
        report.deleted_files,
        report.bytes_freed as f64 / (1024.0 * 1024.0)
    );
    Ok(())
}

fn health_check() -> ExitCode {
    let checks: [(&str, fn() -> Result<()>); 4] = [
        ("memory", check_memory),
        ("disk space", check_disk_writable),
        ("logs directory", || check_directory("./logs")),
        ("models directory", || check_directory("./models")),
    ];

    let mut all_passed = true;
    for (name, check) in checks {
        match check() {
            Ok(()) => println!("PASS: {name}"),
            Err(err) => {
                println!("FAIL: {name} - {err}");
                all_passed = false;
            }
        }
    }

    if all_passed {
        println!("All health checks passed");
        ExitCode::SUCCESS
    } else {
        println!("Some health checks failed");
        ExitCode::FAILURE
    }
}

/// Resident memory under 400 MiB. Platforms without /proc pass.
fn check_memory() -> Result<()> {
    let Ok(status) = std::fs::read_to_string("/proc/self/status") else {
        return Ok(());
    };
    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            let kb: u64 = rest
                .trim()
                .trim_end_matches("kB")
                .trim()
                .parse()
                .unwrap_or(0);
            let mb = kb / 1024;
            anyhow::ensure!(mb < 400, "memory usage too high: {mb} MB");
        }
    }
    Ok(())
}

fn check_disk_writable() -> Result<()> {
    let probe = "./health_check_temp.txt";
    std::fs::write(probe, "test").context("cannot write to current directory")?;
    let _ = std::fs::remove_file(probe);
    Ok(())
}

fn check_directory(dir: &str) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("cannot create {dir}"))?;
    let probe = Path::new(dir).join(".health_check");
    std::fs::write(&probe, "test").with_context(|| format!("cannot write to {dir}"))?;
    let _ = std::fs::remove_file(probe);
    Ok(())
}
