//! Init command

use std::path::PathBuf;

use clap::Args;
use console::style;
use tracing::info;

use compatsuite_core::config::{default_config_toml, DEFAULT_CONFIG_TOML};

use crate::cli::{output, Cli};
use crate::exit_codes;

/// Write a default compatsuite.toml
#[derive(Debug, Args)]
pub struct InitCommand {
    /// Force overwrite existing configuration
    #[arg(short, long)]
    pub force: bool,

    /// Output file path
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl InitCommand {
    /// Execute the init command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<i32> {
        info!(force = self.force, "executing init command");
        let cwd = std::env::current_dir()?;
        let config_path = self
            .output
            .clone()
            .unwrap_or_else(|| cwd.join(DEFAULT_CONFIG_TOML));

        if config_path.exists() && !self.force {
            anyhow::bail!(
                "Configuration file already exists at {}. Use --force to overwrite.",
                config_path.display()
            );
        }

        std::fs::write(&config_path, default_config_toml())?;

        if !cli.quiet {
            output::success(&format!(
                "Created configuration at {}",
                output::path_style().apply_to(config_path.display())
            ));
            println!();
            println!("Next steps:");
            println!("  1. Edit {} to set concurrency and timeouts", config_path.display());
            println!("  2. Run {} to check your project index", style("compatsuite validate").cyan());
            println!("  3. Run {} to preview the task matrix", style("compatsuite list").cyan());
        }

        Ok(exit_codes::SUCCESS)
    }
}
