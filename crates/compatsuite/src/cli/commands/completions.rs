//! Completions command: shell completion scripts for compatsuite

use std::io::Write;
use std::path::PathBuf;

use clap::{Args, CommandFactory};
use clap_complete::{generate, Shell};
use tracing::info;

use crate::cli::{output, Cli};
use crate::exit_codes;

const BIN_NAME: &str = "compatsuite";

/// Print a completion script for the given shell
#[derive(Debug, Args)]
pub struct CompletionsCommand {
    /// Target shell
    #[arg(value_enum)]
    pub shell: Shell,

    /// Write the script here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Completion script for `shell`, covering every subcommand and flag
fn script(shell: Shell) -> Vec<u8> {
    let mut buf = Vec::new();
    generate(shell, &mut Cli::command(), BIN_NAME, &mut buf);
    buf
}

impl CompletionsCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<i32> {
        info!(shell = %self.shell, "executing completions command");
        let script = script(self.shell);

        match &self.output {
            Some(path) => {
                std::fs::write(path, &script)?;
                if !cli.quiet {
                    output::success(format!(
                        "{} completions written to {}",
                        self.shell,
                        output::path_style().apply_to(path.display())
                    ));
                }
            }
            None => std::io::stdout().lock().write_all(&script)?,
        }

        Ok(exit_codes::SUCCESS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_shell_names_parse() {
        for (name, shell) in [
            ("bash", Shell::Bash),
            ("zsh", Shell::Zsh),
            ("fish", Shell::Fish),
            ("powershell", Shell::PowerShell),
        ] {
            let cli = Cli::try_parse_from([BIN_NAME, "completions", name]).unwrap();
            let crate::cli::Commands::Completions(cmd) = &cli.command else {
                panic!("expected completions command");
            };
            assert_eq!(cmd.shell, shell);
        }
        assert!(Cli::try_parse_from([BIN_NAME, "completions", "tcsh"]).is_err());
    }

    #[test]
    fn test_script_covers_subcommands() {
        let script = String::from_utf8(script(Shell::Bash)).unwrap();
        for sub in ["run", "list", "validate", "fmt", "init"] {
            assert!(script.contains(sub), "missing {}", sub);
        }
    }

    #[test]
    fn test_writes_script_to_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("compatsuite.fish");
        let cli = Cli::try_parse_from([
            BIN_NAME,
            "-q",
            "completions",
            "fish",
            "--output",
            path.to_str().unwrap(),
        ])
        .unwrap();
        let crate::cli::Commands::Completions(cmd) = &cli.command else {
            panic!("expected completions command");
        };

        assert_eq!(cmd.execute(&cli).unwrap(), exit_codes::SUCCESS);
        assert!(std::fs::read_to_string(&path).unwrap().contains(BIN_NAME));
    }
}
