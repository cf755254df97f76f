//! compatsuite - source compatibility test-matrix runner

mod cli;
mod exit_codes;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use compatsuite_core::{CompatError, ConfigError, LoadError, PredicateError};

use cli::{output, Cli};

fn main() {
    let guard = init_tracing();

    let cli = Cli::parse();
    let code = match cli.execute() {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            output::error(&format!("{:#}", e));
            exit_code_for(&e)
        }
    };

    drop(guard);
    std::process::exit(code);
}

/// Map a fatal error to its exit code
fn exit_code_for(error: &anyhow::Error) -> i32 {
    if error.downcast_ref::<LoadError>().is_some() {
        return exit_codes::LOAD_ERROR;
    }
    if error.downcast_ref::<PredicateError>().is_some() {
        return exit_codes::PREDICATE_ERROR;
    }
    if error.downcast_ref::<ConfigError>().is_some() {
        return exit_codes::CONFIG_ERROR;
    }
    match error.downcast_ref::<CompatError>() {
        Some(CompatError::Load(_)) => exit_codes::LOAD_ERROR,
        Some(CompatError::Predicate(_)) => exit_codes::PREDICATE_ERROR,
        Some(CompatError::Config(_)) => exit_codes::CONFIG_ERROR,
        _ => exit_codes::ERROR,
    }
}

/// Set up tracing with two layers:
/// - Console: controlled by RUST_LOG (default: warn)
/// - File: always debug-level JSON to ~/.compatsuite/logs/
fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    if let Some(log_dir) = log_directory() {
        let file_appender = tracing_appender::rolling::daily(&log_dir, "compatsuite.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .with_filter(console_filter),
            )
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(non_blocking)
                    .with_target(true)
                    .with_filter(EnvFilter::new("debug")),
            )
            .init();

        return Some(guard);
    }

    // Fallback: console only
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .init();

    None
}

/// Returns the log directory path, creating it if needed.
fn log_directory() -> Option<std::path::PathBuf> {
    let log_dir = dirs::home_dir()?.join(".compatsuite").join("logs");
    std::fs::create_dir_all(&log_dir).ok()?;
    Some(log_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_mapping() {
        let load = anyhow::Error::from(LoadError::Parse("bad".to_string()));
        assert_eq!(exit_code_for(&load), exit_codes::LOAD_ERROR);

        let predicate = anyhow::Error::from(PredicateError::UnexpectedEnd {
            expr: "path ==".to_string(),
            expected: "expression".to_string(),
        });
        assert_eq!(exit_code_for(&predicate), exit_codes::PREDICATE_ERROR);

        let config = anyhow::Error::from(CompatError::Config(ConfigError::NotFound(
            std::path::PathBuf::from("."),
        )));
        assert_eq!(exit_code_for(&config), exit_codes::CONFIG_ERROR);

        let other = anyhow::anyhow!("boom");
        assert_eq!(exit_code_for(&other), exit_codes::ERROR);
        assert_ne!(exit_code_for(&other), exit_codes::FAILED);
    }
}
