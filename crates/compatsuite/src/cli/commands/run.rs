//! Run command: execute the task matrix against a toolchain

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use console::style;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use compatsuite_core::config::{load_config_or_default, RunConfig};
use compatsuite_core::ConfigError;
use compatsuite_tasks::{
    Aggregator, OutputMode, RunSummary, SchedulerOptions, SwiftPlanner, TaskEvent, TaskReporter,
    TaskReporterRegistry, TaskScheduler, ToolchainOptions,
};

use super::selection::{host_platform, SelectionArgs};
use crate::cli::{output, Cli, OutputFormat};
use crate::exit_codes;

/// Expand, execute and classify the task matrix
#[derive(Debug, Args)]
pub struct RunCommand {
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Compiler under test (default: swiftc on PATH)
    #[arg(long, env = "COMPATSUITE_SWIFTC")]
    pub swiftc: Option<PathBuf>,

    /// Language mode forced on every task
    #[arg(long)]
    pub swift_version: Option<String>,

    /// Compiler used for SWIFT_EXEC instead of --swiftc
    #[arg(long)]
    pub override_swift_exec: Option<PathBuf>,

    /// Extra compiler flags; {field} placeholders are substituted
    #[arg(long, allow_hyphen_values = true)]
    pub add_swift_flags: Option<String>,

    /// Extra xcodebuild arguments; {field} placeholders are substituted
    #[arg(long, allow_hyphen_values = true)]
    pub add_xcodebuild_flags: Option<String>,

    /// Do not clean checkouts or build products
    #[arg(long)]
    pub skip_clean: bool,

    /// Per-task timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub default_timeout: Option<u64>,

    /// Maximum concurrent tasks
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,

    /// Root directory for project checkouts
    #[arg(long)]
    pub project_cache_path: Option<PathBuf>,

    /// Directory for per-task logs and summary.json
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Sandbox profile for package builds
    #[arg(long)]
    pub sandbox_profile_package: Option<PathBuf>,

    /// Sandbox profile for xcodebuild
    #[arg(long)]
    pub sandbox_profile_xcodebuild: Option<PathBuf>,
}

impl RunCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<i32> {
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(self.execute_async(cli))
    }

    async fn execute_async(&self, cli: &Cli) -> anyhow::Result<i32> {
        let cwd = std::env::current_dir()?;
        let (config, config_path) = load_config_or_default(&cwd)?;
        let run = &config.run;
        info!(
            config = ?config_path.as_ref().map(|p| p.display().to_string()),
            "executing run command"
        );

        let platform = host_platform()?;
        let tasks = self.selection.select(run, platform)?;
        if tasks.is_empty() {
            if !cli.quiet {
                output::warning("No tasks selected");
            }
            return Ok(exit_codes::SUCCESS);
        }

        let options = self.scheduler_options(run, cli.verbose)?;
        let log_dir = self.log_dir.clone().unwrap_or_else(|| run.log_dir.clone());
        let planner = SwiftPlanner::new(ToolchainOptions {
            swiftc: resolve_swiftc(self.swiftc.as_deref()),
            swift_version: self.swift_version.clone(),
            override_swift_exec: self.override_swift_exec.clone(),
            added_swift_flags: self.add_swift_flags.clone(),
            added_xcodebuild_flags: self.add_xcodebuild_flags.clone(),
            skip_clean: self.skip_clean,
            sandbox_profile_package: self.sandbox_profile_package.clone(),
            sandbox_profile_xcodebuild: self.sandbox_profile_xcodebuild.clone(),
            host: Some(platform),
        });

        if !cli.quiet && cli.format == OutputFormat::Text {
            println!();
            println!(
                "{} {} task{} on {} ({} at a time)",
                style("→").blue(),
                tasks.len(),
                if tasks.len() == 1 { "" } else { "s" },
                style(platform).bold(),
                options.concurrency
            );
            println!();
        }

        // Set up reporters
        let mut reporters = TaskReporterRegistry::new();
        if !cli.quiet && cli.format == OutputFormat::Text {
            reporters.register(ConsoleReporter::new(cli.verbose));
        }

        let scheduler = TaskScheduler::new(options, Arc::new(planner), Arc::new(reporters));

        let (cancel_tx, cancel_rx) = watch::channel(false);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling run");
                let _ = cancel_tx.send(true);
            }
        });

        let (tx, rx) = mpsc::channel(64);
        let aggregator = tokio::spawn(Aggregator::new().consume(rx));
        scheduler.execute(tasks, cancel_rx, tx).await;
        let summary = aggregator.await?;

        write_summary(&summary, &log_dir);
        self.print_summary(cli, &summary, &log_dir)?;

        let code = if summary.was_cancelled() {
            exit_codes::CANCELLED
        } else if summary.is_clean() {
            exit_codes::SUCCESS
        } else {
            exit_codes::FAILED
        };
        Ok(code)
    }

    /// Scheduler settings; flags win over the config file
    fn scheduler_options(&self, run: &RunConfig, verbose: bool) -> anyhow::Result<SchedulerOptions> {
        let concurrency = self.concurrency.unwrap_or(run.concurrency);
        if concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "concurrency".to_string(),
                message: "must be greater than zero".to_string(),
            }
            .into());
        }
        let timeout = self.default_timeout.unwrap_or(run.default_timeout_secs);
        if timeout == 0 {
            return Err(ConfigError::InvalidValue {
                field: "default_timeout".to_string(),
                message: "must be greater than zero".to_string(),
            }
            .into());
        }

        let output = if verbose {
            OutputMode::Stream
        } else {
            OutputMode::LogFiles {
                dir: self.log_dir.clone().unwrap_or_else(|| run.log_dir.clone()),
            }
        };

        Ok(SchedulerOptions {
            concurrency,
            timeout: Duration::from_secs(timeout),
            output,
            project_cache_path: self
                .project_cache_path
                .clone()
                .unwrap_or_else(|| run.project_cache_path.clone()),
        })
    }

    fn print_summary(&self, cli: &Cli, summary: &RunSummary, log_dir: &Path) -> anyhow::Result<()> {
        match cli.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&summary.to_json())?);
            }
            OutputFormat::Text => {
                if cli.quiet {
                    return Ok(());
                }
                println!();
                print!("{}", summary.render_text());
                if !cli.verbose {
                    println!(
                        "Logs: {}",
                        output::path_style().apply_to(log_dir.display())
                    );
                }
                output::verdict(summary);
            }
        }
        Ok(())
    }
}

/// Absolute path of the compiler, or the name as given when not found
fn resolve_swiftc(swiftc: Option<&Path>) -> PathBuf {
    let requested = swiftc.unwrap_or_else(|| Path::new("swiftc"));
    match which::which(requested) {
        Ok(path) => path,
        Err(e) => {
            warn!(swiftc = %requested.display(), "could not resolve compiler: {}", e);
            requested.to_path_buf()
        }
    }
}

fn write_summary(summary: &RunSummary, log_dir: &Path) {
    if let Err(e) = std::fs::create_dir_all(log_dir) {
        warn!(dir = %log_dir.display(), "failed to create log directory: {}", e);
        return;
    }
    if let Err(e) = summary.write_json(&log_dir.join("summary.json")) {
        warn!(dir = %log_dir.display(), "failed to write summary: {}", e);
    }
}

/// Console reporter with live output
struct ConsoleReporter {
    verbose: bool,
}

impl ConsoleReporter {
    fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl TaskReporter for ConsoleReporter {
    fn report(&self, event: &TaskEvent) {
        match event {
            TaskEvent::Started { id, command } => {
                println!(
                    "  {} {} {}",
                    style("▸").dim(),
                    style(id).bold(),
                    if self.verbose {
                        style(format!("({})", command)).dim().to_string()
                    } else {
                        String::new()
                    }
                );
            }
            TaskEvent::Output {
                id,
                line,
                is_stderr,
            } => {
                if self.verbose {
                    if *is_stderr {
                        println!("    {} {}", style(format!("[{}]", id)).red().dim(), line);
                    } else {
                        println!("    {} {}", style(format!("[{}]", id)).dim(), line);
                    }
                }
            }
            TaskEvent::Finished {
                id,
                status,
                duration,
            } => {
                if status.is_success() {
                    println!(
                        "  {} {} {}",
                        style("✓").green(),
                        style(id).green(),
                        style(format!("{:.1}s", duration.as_secs_f64())).dim()
                    );
                } else {
                    println!(
                        "  {} {} {} {}",
                        style("✗").red(),
                        style(id).red(),
                        style(format!("{:.1}s", duration.as_secs_f64())).dim(),
                        style(status).red().dim()
                    );
                }
            }
            TaskEvent::Cancelled { id } => {
                println!(
                    "  {} {} {}",
                    style("○").yellow(),
                    style(id).yellow(),
                    style("(cancelled)").dim()
                );
            }
            TaskEvent::AllCompleted {
                total,
                succeeded,
                failed,
                cancelled,
                duration,
            } => {
                println!();
                println!(
                    "  {} {}/{} succeeded, {} failed, {} cancelled ({:.1}s)",
                    if *failed == 0 {
                        style("✓").green().bold()
                    } else {
                        style("✗").red().bold()
                    },
                    succeeded,
                    total,
                    failed,
                    cancelled,
                    duration.as_secs_f64()
                );
            }
        }
    }
}
