//! Validate command

use std::path::PathBuf;

use clap::Args;
use console::style;
use tracing::info;

use compatsuite_core::config::load_config_or_default;
use compatsuite_core::index::{load_index, ActionKind, Index};

use crate::cli::{output, Cli, OutputFormat};
use crate::exit_codes;

/// Validate the project index and configuration
#[derive(Debug, Args)]
pub struct ValidateCommand {
    /// Project index (JSON)
    #[arg(default_value = "projects.json")]
    pub projects: PathBuf,

    /// Strict mode - treat warnings as errors
    #[arg(long)]
    pub strict: bool,
}

#[derive(Debug, Default, serde::Serialize)]
struct IndexStats {
    projects: usize,
    versions: usize,
    actions: usize,
    xcode_actions: usize,
    xfail_rules: usize,
}

impl IndexStats {
    fn of(index: &Index) -> Self {
        let mut stats = Self {
            projects: index.len(),
            ..Default::default()
        };
        for project in index.projects() {
            stats.versions += project.compatibility.len();
            stats.actions += project.actions.len();
            for action in &project.actions {
                if matches!(action.kind, ActionKind::Xcode { .. }) {
                    stats.xcode_actions += 1;
                }
                stats.xfail_rules += action.xfail.len();
            }
        }
        stats
    }
}

/// Expected failures nobody can track
fn untracked_rules(index: &Index) -> Vec<String> {
    let mut warnings = Vec::new();
    for project in index.projects() {
        for action in &project.actions {
            let untracked = action.xfail.iter().filter(|r| r.issue.is_none()).count();
            if untracked > 0 {
                warnings.push(format!(
                    "{}: {} has {} xfail rule(s) without an issue",
                    project.path, action.kind, untracked
                ));
            }
        }
    }
    warnings
}

impl ValidateCommand {
    /// Execute the validate command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<i32> {
        info!(
            projects = %self.projects.display(),
            strict = self.strict,
            "executing validate command"
        );
        let cwd = std::env::current_dir()?;

        let mut errors: Vec<String> = Vec::new();
        let mut warnings: Vec<String> = Vec::new();
        let mut code = exit_codes::SUCCESS;

        // Validate configuration
        let config_path = match load_config_or_default(&cwd) {
            Ok((_, path)) => path,
            Err(e) => {
                errors.push(format!("Configuration: {}", e));
                code = exit_codes::CONFIG_ERROR;
                None
            }
        };

        // Validate index
        let stats = match load_index(&self.projects) {
            Ok(index) => {
                warnings.extend(untracked_rules(&index));
                Some(IndexStats::of(&index))
            }
            Err(e) => {
                errors.push(format!("Project index: {}", e));
                code = exit_codes::LOAD_ERROR;
                None
            }
        };

        // If strict, promote warnings to errors
        if self.strict {
            errors.append(&mut warnings);
        }

        let passed = errors.is_empty();
        if !passed && code == exit_codes::SUCCESS {
            code = exit_codes::FAILED;
        }

        match cli.format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "valid": passed,
                    "config_path": config_path.map(|p| p.to_string_lossy().to_string()),
                    "index": stats,
                    "errors": errors,
                    "warnings": warnings
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Text => {
                if !cli.quiet {
                    println!("{}", output::header("Validation Results"));
                    println!();

                    if let Some(path) = config_path {
                        println!("Config: {}", output::path_style().apply_to(path.display()));
                    }
                    println!(
                        "Index:  {}",
                        output::path_style().apply_to(self.projects.display())
                    );
                    println!();

                    if let Some(stats) = &stats {
                        println!("{}", output::stat("Projects", stats.projects));
                        println!("{}", output::stat("Versions", stats.versions));
                        println!("{}", output::stat("Actions", stats.actions));
                        println!("{}", output::stat("Xcode actions", stats.xcode_actions));
                        println!("{}", output::stat("XFail rules", stats.xfail_rules));
                        println!();
                    }

                    if !errors.is_empty() {
                        println!("{}", style("Errors:").red().bold());
                        for error in &errors {
                            println!("  {} {}", style("✗").red(), error);
                        }
                        println!();
                    }

                    if !warnings.is_empty() {
                        println!("{}", style("Warnings:").yellow().bold());
                        for warning in &warnings {
                            println!("  {} {}", style("!").yellow(), warning);
                        }
                        println!();
                    }

                    if passed {
                        if warnings.is_empty() {
                            println!("{}", style("✓ All checks passed").green().bold());
                        } else {
                            println!(
                                "{} with {} warning(s)",
                                style("✓ Validation passed").green().bold(),
                                warnings.len()
                            );
                        }
                    } else {
                        println!(
                            "{} with {} error(s)",
                            style("✗ Validation failed").red().bold(),
                            errors.len()
                        );
                    }
                }
            }
        }

        Ok(code)
    }
}
