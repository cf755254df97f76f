//! Fmt command - rewrite the project index in canonical form

use std::path::{Path, PathBuf};

use clap::Args;
use console::style;
use tracing::info;

use compatsuite_core::index::{format_index, parse_index};
use compatsuite_core::LoadError;

use crate::cli::{output, Cli};
use crate::exit_codes;

/// Rewrite the project index sorted by path with stable indentation
#[derive(Debug, Args)]
pub struct FmtCommand {
    /// Project index (JSON)
    #[arg(default_value = "projects.json")]
    pub projects: PathBuf,

    /// Verify formatting without applying changes (for CI / hooks)
    #[arg(long)]
    pub check: bool,
}

/// Current and canonical text of the index at `path`, validated first
fn canonical(path: &Path) -> Result<(String, String), LoadError> {
    let content = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_index(&content)?;
    let formatted = format_index(&content)?;
    Ok((content, formatted))
}

impl FmtCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<i32> {
        info!(
            projects = %self.projects.display(),
            check = self.check,
            "executing fmt command"
        );

        let (content, formatted) = canonical(&self.projects)?;
        let path = output::path_style().apply_to(self.projects.display());

        if content == formatted {
            if !cli.quiet {
                output::success(&format!("{} is already formatted", path));
            }
            return Ok(exit_codes::SUCCESS);
        }

        if self.check {
            if !cli.quiet {
                output::warning(&format!("{} is not formatted", path));
                println!("  run {} to fix", style("compatsuite fmt").bold());
            }
            return Ok(exit_codes::FAILED);
        }

        std::fs::write(&self.projects, &formatted)?;
        if !cli.quiet {
            output::success(&format!("Formatted {}", path));
        }
        Ok(exit_codes::SUCCESS)
    }
}
