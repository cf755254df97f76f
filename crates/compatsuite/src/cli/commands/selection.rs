//! Task selection flags shared by `run` and `list`

use std::path::PathBuf;

use clap::{Args, ValueEnum};
use tracing::info;

use compatsuite_core::config::RunConfig;
use compatsuite_core::index::{load_index, Platform};
use compatsuite_core::predicate::Filter;
use compatsuite_core::PredicateError;
use compatsuite_tasks::{expand, ExecutionTask, ExpandOptions, RunContext, TaskFilters};

/// Which tasks to consider and the context they run in
#[derive(Debug, Args)]
pub struct SelectionArgs {
    /// Project index (JSON)
    #[arg(default_value = "projects.json")]
    pub projects: PathBuf,

    /// Keep projects matching this expression (repeatable)
    #[arg(long, value_name = "EXPR")]
    pub include_repos: Vec<String>,

    /// Drop projects matching this expression (repeatable)
    #[arg(long, value_name = "EXPR")]
    pub exclude_repos: Vec<String>,

    /// Keep compatibility versions matching this expression (repeatable)
    #[arg(long, value_name = "EXPR")]
    pub include_versions: Vec<String>,

    /// Drop compatibility versions matching this expression (repeatable)
    #[arg(long, value_name = "EXPR")]
    pub exclude_versions: Vec<String>,

    /// Keep actions matching this expression (repeatable)
    #[arg(long, value_name = "EXPR")]
    pub include_actions: Vec<String>,

    /// Drop actions matching this expression (repeatable)
    #[arg(long, value_name = "EXPR")]
    pub exclude_actions: Vec<String>,

    /// Only the highest compatibility version of each project
    #[arg(long)]
    pub only_latest_versions: bool,

    /// Branch of the toolchain under test
    #[arg(long, env = "COMPATSUITE_SWIFT_BRANCH")]
    pub swift_branch: Option<String>,

    /// Job type matched against xfail rules
    #[arg(long)]
    pub job_type: Option<String>,

    /// Force a build configuration on every action
    #[arg(long, value_enum)]
    pub build_config: Option<BuildConfig>,
}

/// Build configuration override
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BuildConfig {
    Debug,
    Release,
}

impl BuildConfig {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Release => "release",
        }
    }
}

impl SelectionArgs {
    /// Compile all three filter levels
    pub fn filters(&self) -> Result<TaskFilters, PredicateError> {
        Ok(TaskFilters {
            repos: Filter::new(&self.include_repos, &self.exclude_repos)?,
            versions: Filter::new(&self.include_versions, &self.exclude_versions)?,
            actions: Filter::new(&self.include_actions, &self.exclude_actions)?,
        })
    }

    /// Run context for `platform`; flags override the config file
    pub fn run_context(&self, config: &RunConfig, platform: Platform) -> RunContext {
        let branch = self.swift_branch.as_ref().unwrap_or(&config.branch);
        let job = self.job_type.as_ref().unwrap_or(&config.job_type);
        RunContext::new(branch.as_str(), platform, job.as_str())
            .with_build_config(self.build_config.map(|c| c.as_str().to_string()))
    }

    /// Compile filters, load the index and expand it.
    ///
    /// Filters are compiled first so a bad expression fails before any
    /// file is read.
    pub fn select(
        &self,
        config: &RunConfig,
        platform: Platform,
    ) -> anyhow::Result<Vec<ExecutionTask>> {
        let filters = self.filters()?;
        let index = load_index(&self.projects)?;
        let context = self.run_context(config, platform);
        let tasks = expand(
            &index,
            &context,
            &filters,
            ExpandOptions {
                only_latest_versions: self.only_latest_versions,
            },
        );
        info!(
            projects = index.len(),
            tasks = tasks.len(),
            platform = %platform,
            "selected tasks"
        );
        Ok(tasks)
    }
}

/// Platform of the running host
pub fn host_platform() -> anyhow::Result<Platform> {
    Platform::host().ok_or_else(|| {
        anyhow::anyhow!(
            "unsupported host OS '{}' (expected Darwin, Linux or Windows)",
            std::env::consts::OS
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Debug, Parser)]
    struct Harness {
        #[command(flatten)]
        selection: SelectionArgs,
    }

    fn parse(args: &[&str]) -> SelectionArgs {
        let mut argv = vec!["harness"];
        argv.extend_from_slice(args);
        Harness::try_parse_from(argv).unwrap().selection
    }

    #[test]
    fn test_run_context_precedence() {
        let config = RunConfig {
            branch: "release/6.0".to_string(),
            ..Default::default()
        };

        let from_config = parse(&[]).run_context(&config, Platform::Linux);
        assert_eq!(from_config.branch, "release/6.0");
        assert_eq!(from_config.job, "source-compat");
        assert_eq!(from_config.build_config, None);

        let from_flags = parse(&["--swift-branch", "main", "--build-config", "release"])
            .run_context(&config, Platform::Linux);
        assert_eq!(from_flags.branch, "main");
        assert_eq!(from_flags.build_config.as_deref(), Some("release"));
    }

    #[test]
    fn test_bad_expression_is_predicate_error() {
        let args = parse(&["--exclude-repos", "path ="]);
        assert!(args.filters().is_err());

        let err = args
            .select(&RunConfig::default(), Platform::Linux)
            .unwrap_err();
        assert!(err.downcast_ref::<PredicateError>().is_some());
    }

    #[test]
    fn test_select_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("projects.json");
        std::fs::write(
            &path,
            r#"[{"path": "Kit", "url": "u",
                 "compatibility": [{"version": "5.0", "commit": "0123456789abcdef0123456789abcdef01234567"}],
                 "actions": [{"action": "BuildSwiftPackage"}, {"action": "TestSwiftPackage"}]}]"#,
        )
        .unwrap();

        let args = parse(&[
            path.to_str().unwrap(),
            "--include-actions",
            "action.startswith('Test')",
        ]);
        let tasks = args.select(&RunConfig::default(), Platform::Linux).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id.action, "TestSwiftPackage");
    }
}
