//! Default configuration values

use super::types::Config;

/// Default configuration file name (TOML)
pub const DEFAULT_CONFIG_TOML: &str = "compatsuite.toml";

/// Default configuration file name (YAML)
pub const DEFAULT_CONFIG_YAML: &str = "compatsuite.yaml";

/// Per-task timeout when none is configured
pub const DEFAULT_TIMEOUT_SECS: u64 = 3600;

/// Job type used for xfail matching when none is configured
pub const DEFAULT_JOB_TYPE: &str = "source-compat";

/// Toolchain branch assumed when none is configured
pub const DEFAULT_BRANCH: &str = "main";

/// Where project checkouts live, relative to the working directory
pub const DEFAULT_PROJECT_CACHE: &str = "project_cache";

/// Exit code recorded for a task killed by its timeout
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Config file names to search for, in priority order
pub fn config_file_names() -> Vec<&'static str> {
    vec![
        DEFAULT_CONFIG_TOML,
        DEFAULT_CONFIG_YAML,
        ".compatsuite.toml",
        ".compatsuite.yaml",
    ]
}

/// Worker count matching the host's parallelism
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Render the default configuration as TOML
pub fn default_config_toml() -> String {
    toml::to_string_pretty(&Config::default()).unwrap_or_else(|_| DEFAULT_CONFIG_TEMPLATE.to_string())
}

/// Fallback template when serialization is unavailable
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# compatsuite configuration

[run]
default_timeout_secs = 3600
job_type = "source-compat"
branch = "main"
project_cache_path = "project_cache"
log_dir = "."
"#;
