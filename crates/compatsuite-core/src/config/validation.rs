//! Configuration validation

use tracing::debug;

use crate::error::{ConfigError, Result};

use super::types::Config;

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    debug!("validating configuration");
    validate_run(config)?;
    debug!("configuration validation passed");
    Ok(())
}

fn validate_run(config: &Config) -> Result<()> {
    let run = &config.run;

    if run.concurrency == 0 {
        return Err(invalid("run.concurrency", "must be greater than zero"));
    }

    if run.default_timeout_secs == 0 {
        return Err(invalid("run.default_timeout_secs", "must be greater than zero"));
    }

    if run.job_type.trim().is_empty() {
        return Err(invalid("run.job_type", "job type cannot be empty"));
    }

    if run.branch.trim().is_empty() {
        return Err(invalid("run.branch", "branch cannot be empty"));
    }

    Ok(())
}

fn invalid(field: &str, message: &str) -> crate::error::CompatError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    }
    .into()
}
