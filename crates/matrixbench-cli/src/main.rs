//! # matrixbench-cli
//!
//! Binary entry point for matrixbench.
//!
//! This crate provides:
//! - CLI argument parsing using `clap`
//! - Configuration loading with command-line overrides
//! - Timing instrument selection
//! - Summary printing and the process exit status

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use matrixbench_adapters::{GnuTimeInstrument, detect_instrument_default, is_instrument_available};
use matrixbench_core::{IdScheme, Orchestrator, RangeSweep, ResultStore, RunConfig, Summary};
use matrixbench_proto::TaskRecord;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Task id scheme selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum IdSchemeArg {
    /// Per-task hash of command, group and repetition
    Stable,
    /// Running hash over all tasks generated in the run
    Cumulative,
}

impl From<IdSchemeArg> for IdScheme {
    fn from(arg: IdSchemeArg) -> Self {
        match arg {
            IdSchemeArg::Stable => IdScheme::Stable,
            IdSchemeArg::Cumulative => IdScheme::Cumulative,
        }
    }
}

/// matrixbench - Benchmark matrix runner
#[derive(Parser, Debug)]
#[command(name = "matrixbench", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    // ─────────────────────────────────────────────────────────────────────────
    // Global options (available for all subcommands)
    // ─────────────────────────────────────────────────────────────────────────

    /// Path to configuration file (loaded only if it exists)
    #[arg(short, long, default_value = "matrixbench.yml", global = true)]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate and run a benchmark matrix (default if no subcommand given)
    Run(RunArgs),

    /// Re-read timing outputs of stored tasks without running anything
    Reconcile(ReconcileArgs),
}

/// Arguments for the run subcommand.
#[derive(Parser, Debug, Default)]
struct RunArgs {
    /// Command to benchmark
    command: Option<String>,

    /// Literal parameter appended to the command (repeatable)
    #[arg(short = 'p', long = "param", conflicts_with_all = ["min", "max"])]
    params: Vec<String>,

    /// Range sweep start (inclusive)
    #[arg(long, requires = "max", allow_negative_numbers = true)]
    min: Option<i64>,

    /// Range sweep end (exclusive)
    #[arg(long, requires = "min", allow_negative_numbers = true)]
    max: Option<i64>,

    /// Range sweep step (default: 1)
    #[arg(long, requires = "min", allow_negative_numbers = true)]
    step: Option<i64>,

    /// Text placed before each range value, e.g. "-n"
    #[arg(long, requires = "min", allow_hyphen_values = true)]
    prefix: Option<String>,

    /// Repetitions per sweep point
    #[arg(short, long)]
    repetitions: Option<u32>,

    /// Directory holding the result store and artifacts
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Keep existing results and add the new tasks alongside them
    #[arg(long)]
    merge: bool,

    /// Re-run only stored tasks that have no timing result
    #[arg(long)]
    retry_failed: bool,

    /// Per-task timeout in seconds (0 disables)
    #[arg(long)]
    timeout: Option<u64>,

    /// Task id scheme
    #[arg(long, value_enum)]
    id_scheme: Option<IdSchemeArg>,

    /// Record metrics even when the command exits non-zero
    #[arg(long)]
    allow_nonzero_exit: bool,

    /// Shell used to run the command
    #[arg(long)]
    shell: Option<String>,

    /// GNU time binary
    #[arg(long)]
    time_binary: Option<String>,

    /// Dry run - print the task matrix without running it
    #[arg(long)]
    dry_run: bool,
}

impl RunArgs {
    /// Applies command-line overrides on top of the loaded configuration.
    fn apply(self, config: &mut RunConfig) {
        if let Some(command) = self.command {
            config.command = Some(command);
        }

        // A sweep on the command line replaces whatever sweep the file had.
        if !self.params.is_empty() {
            config.params = self.params;
            config.range = None;
        } else if let (Some(min), Some(max)) = (self.min, self.max) {
            config.range = Some(RangeSweep::new(
                min,
                max,
                self.step.unwrap_or(1),
                self.prefix.unwrap_or_default(),
            ));
            config.params.clear();
        }

        if let Some(repetitions) = self.repetitions {
            config.repetitions = repetitions;
        }
        if let Some(output_dir) = self.output_dir {
            config.output_dir = output_dir;
        }
        if self.merge {
            config.merge = true;
        }
        if self.retry_failed {
            config.retry_failed = true;
        }
        if let Some(timeout) = self.timeout {
            config.timeout_seconds = Some(timeout);
        }
        if let Some(scheme) = self.id_scheme {
            config.id_scheme = scheme.into();
        }
        if self.allow_nonzero_exit {
            config.allow_nonzero_exit = true;
        }
        if let Some(shell) = self.shell {
            config.shell = shell;
        }
        if let Some(time_binary) = self.time_binary {
            config.time_binary = time_binary;
        }
    }
}

/// Arguments for the reconcile subcommand.
#[derive(Parser, Debug)]
struct ReconcileArgs {
    /// Directory holding the result store and artifacts
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Accept timing outputs of commands that exited non-zero
    #[arg(long)]
    allow_nonzero_exit: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let exit_code = match cli.command {
        Some(Commands::Run(args)) => run_command(&cli.config, args).await?,
        Some(Commands::Reconcile(args)) => reconcile_command(&cli.config, args).await?,
        None => run_command(&cli.config, RunArgs::default()).await?,
    };

    // Use explicit exit for non-zero codes to ensure proper exit status
    if exit_code != 0 {
        std::process::exit(exit_code);
    }

    Ok(())
}

fn load_config(config_path: &Path) -> Result<RunConfig> {
    if config_path.exists() {
        RunConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))
    } else {
        debug!(path = %config_path.display(), "Config file not found, using defaults");
        Ok(RunConfig::default())
    }
}

async fn run_command(config_path: &Path, args: RunArgs) -> Result<i32> {
    let mut config = load_config(config_path)?;
    let dry_run = args.dry_run;
    args.apply(&mut config);

    if dry_run {
        let warnings = config.validate().context("Configuration validation failed")?;
        for warning in &warnings {
            eprintln!("{warning}");
        }
        dry_run_report(&config)?;
        return Ok(0);
    }

    // Fail on configuration errors before looking for an instrument.
    config.validate().context("Configuration validation failed")?;

    let instrument = resolve_instrument(&config)?;
    let orchestrator = Orchestrator::new(config, Arc::new(instrument));
    let summary = orchestrator
        .generate_and_run()
        .await
        .context("Benchmark run failed")?;

    Ok(report(&summary))
}

async fn reconcile_command(config_path: &Path, args: ReconcileArgs) -> Result<i32> {
    let mut config = load_config(config_path)?;
    if let Some(output_dir) = args.output_dir {
        config.output_dir = output_dir;
    }
    if args.allow_nonzero_exit {
        config.allow_nonzero_exit = true;
    }

    let instrument = GnuTimeInstrument::from_config(&config);
    let summary = Orchestrator::new(config, Arc::new(instrument))
        .reconcile_existing()
        .await
        .context("Reconcile failed")?;

    Ok(report(&summary))
}

/// Picks the configured `time` binary, falling back to auto-detection.
fn resolve_instrument(config: &RunConfig) -> Result<GnuTimeInstrument> {
    let configured = GnuTimeInstrument::from_config(config);
    if is_instrument_available(&configured.binary) {
        return Ok(configured);
    }

    match detect_instrument_default() {
        Ok(binary) => {
            info!(
                configured = %configured.binary,
                detected = %binary,
                "Configured time binary unavailable, using detected one"
            );
            Ok(GnuTimeInstrument::new(binary, config.effective_shell()))
        }
        Err(e) => {
            eprintln!("{e}");
            Err(anyhow::Error::new(e))
        }
    }
}

fn dry_run_report(config: &RunConfig) -> Result<()> {
    println!("Dry run mode - configuration:");
    println!("  Output dir: {}", config.output_dir.display());
    println!("  Time binary: {}", config.time_binary);
    println!("  Shell: {}", config.effective_shell());
    match config.timeout() {
        Some(timeout) => println!("  Timeout: {}s", timeout.as_secs()),
        None => println!("  Timeout: none"),
    }

    if config.retry_failed {
        let store_path = config.store_path();
        // Opening a missing store would create it.
        let tasks = if store_path.exists() {
            ResultStore::open(&store_path, false)
                .with_context(|| format!("Failed to open {}", store_path.display()))?
                .pending_or_failed()
        } else {
            warn!(path = %store_path.display(), "No result store to retry from");
            Vec::new()
        };
        println!("  Mode: retry failed");
        print_tasks(&tasks);
        return Ok(());
    }

    let mode = if config.merge { "merge" } else { "purge" };
    println!("  Mode: {mode}");
    let tasks = Orchestrator::new(config.clone(), Arc::new(GnuTimeInstrument::from_config(config)))
        .plan()
        .context("Failed to generate tasks")?;
    print_tasks(&tasks);
    Ok(())
}

fn print_tasks(tasks: &[TaskRecord]) {
    println!("  Tasks: {}", tasks.len());
    for task in tasks {
        println!(
            "    [{}] rep {}: {}",
            task.id, task.repetition_id, task.command_with_param
        );
    }
}

fn report(summary: &Summary) -> i32 {
    print!("{summary}");
    summary.exit_code()
}
