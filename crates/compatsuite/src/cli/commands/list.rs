//! List command: print the task plan without executing it

use clap::{Args, ValueEnum};
use console::style;
use serde::Serialize;
use tracing::info;

use compatsuite_core::config::load_config_or_default;
use compatsuite_core::index::Platform;
use compatsuite_tasks::logs::assign_log_names;
use compatsuite_tasks::{ExecutionTask, TaskId};

use super::selection::{host_platform, SelectionArgs};
use crate::cli::{output, Cli, OutputFormat};
use crate::exit_codes;

/// Print the task matrix without executing it
#[derive(Debug, Args)]
pub struct ListCommand {
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Preview the matrix for another host platform
    #[arg(long, value_enum)]
    pub platform: Option<PlatformArg>,
}

/// Platform choices for `--platform`
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PlatformArg {
    Darwin,
    Linux,
    Windows,
}

impl From<PlatformArg> for Platform {
    fn from(arg: PlatformArg) -> Self {
        match arg {
            PlatformArg::Darwin => Platform::Darwin,
            PlatformArg::Linux => Platform::Linux,
            PlatformArg::Windows => Platform::Windows,
        }
    }
}

#[derive(Debug, Serialize)]
struct ListedTask<'a> {
    seq: usize,
    id: &'a TaskId,
    commit: &'a str,
    configuration: Option<&'a str>,
    target: &'a str,
    destination: Option<&'a str>,
    xfail_rules: usize,
    log: String,
}

impl<'a> ListedTask<'a> {
    fn new(task: &'a ExecutionTask, log: String) -> Self {
        Self {
            seq: task.seq,
            id: &task.id,
            commit: &task.compatibility.commit,
            configuration: task.configuration(),
            target: task.target_label(),
            destination: task.action().destination.as_deref(),
            xfail_rules: task.action().xfail.len(),
            log,
        }
    }
}

impl ListCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<i32> {
        let cwd = std::env::current_dir()?;
        let (config, _) = load_config_or_default(&cwd)?;
        let platform = match self.platform {
            Some(platform) => platform.into(),
            None => host_platform()?,
        };
        info!(platform = %platform, "executing list command");

        let tasks = self.selection.select(&config.run, platform)?;
        let listed: Vec<_> = tasks
            .iter()
            .zip(assign_log_names(&tasks))
            .map(|(task, log)| ListedTask::new(task, log))
            .collect();

        match cli.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&listed)?);
            }
            OutputFormat::Text => {
                if cli.quiet {
                    return Ok(exit_codes::SUCCESS);
                }
                println!(
                    "{}",
                    output::header(&format!("Tasks on {} ({})", platform, listed.len()))
                );
                println!();
                for task in &listed {
                    let mut detail = vec![task.target.to_string()];
                    if let Some(destination) = task.destination {
                        detail.push(destination.to_string());
                    }
                    if let Some(configuration) = task.configuration {
                        detail.push(configuration.to_string());
                    }
                    println!(
                        "  {:>4} {} {}{}",
                        style(task.seq).dim(),
                        style(task.id).bold(),
                        style(format!("({})", detail.join(", "))).dim(),
                        if task.xfail_rules > 0 {
                            style(" xfail").yellow().to_string()
                        } else {
                            String::new()
                        }
                    );
                }
                if listed.is_empty() {
                    output::info("No tasks selected");
                }
            }
        }

        Ok(exit_codes::SUCCESS)
    }
}
