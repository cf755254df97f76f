//! Configuration types

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::defaults::{
    default_concurrency, DEFAULT_BRANCH, DEFAULT_JOB_TYPE, DEFAULT_PROJECT_CACHE,
    DEFAULT_TIMEOUT_SECS,
};

/// Top-level configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Settings for `run` and `list`
    pub run: RunConfig,
}

/// `[run]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Maximum number of tasks executing at once
    pub concurrency: usize,

    /// Per-task timeout in seconds
    pub default_timeout_secs: u64,

    /// Job type matched against xfail `job` fields
    pub job_type: String,

    /// Branch of the toolchain under test
    pub branch: String,

    /// Root directory for project checkouts
    pub project_cache_path: PathBuf,

    /// Directory receiving per-task logs and the summary
    pub log_dir: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            default_timeout_secs: DEFAULT_TIMEOUT_SECS,
            job_type: DEFAULT_JOB_TYPE.to_string(),
            branch: DEFAULT_BRANCH.to_string(),
            project_cache_path: PathBuf::from(DEFAULT_PROJECT_CACHE),
            log_dir: PathBuf::from("."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_section_keeps_defaults() {
        let config: Config = toml::from_str("[run]\nbranch = \"release/6.0\"\n").unwrap();
        assert_eq!(config.run.branch, "release/6.0");
        assert_eq!(config.run.default_timeout_secs, 3600);
        assert_eq!(config.run.project_cache_path, PathBuf::from("project_cache"));
        assert!(config.run.concurrency > 0);
    }

    #[test]
    fn test_empty_document_is_default() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config, Config::default());
    }
}
