//! Execution task types

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use compatsuite_core::index::{Action, CompatibilityEntry, Platform, Project};
use compatsuite_core::predicate::Attributes;
use compatsuite_core::xfail::MatchContext;

/// Unique identifier for a task within a run
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct TaskId {
    /// Project path
    pub project: String,
    /// Compatibility version
    pub version: String,
    /// Position of the action within the project
    pub action_index: usize,
    /// Action tag
    pub action: String,
    pub platform: Platform,
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}:{}#{}",
            self.project, self.version, self.action, self.action_index
        )
    }
}

/// Values shared by every task of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunContext {
    /// Branch of the toolchain under test
    pub branch: String,
    /// Platform the run executes on
    pub platform: Platform,
    /// Job type
    pub job: String,
    /// Build configuration forced on every action
    pub build_config: Option<String>,
}

impl RunContext {
    pub fn new(branch: impl Into<String>, platform: Platform, job: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
            platform,
            job: job.into(),
            build_config: None,
        }
    }

    pub fn with_build_config(mut self, config: Option<String>) -> Self {
        self.build_config = config;
        self
    }
}

/// Checkout shared by all tasks of one (project, version) pair
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct CheckoutKey {
    pub project: String,
    pub version: String,
}

/// One (project, compatibility entry, action, platform) unit of work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionTask {
    /// Position in enumeration order
    pub seq: usize,
    pub id: TaskId,
    pub project: Arc<Project>,
    pub compatibility: CompatibilityEntry,
    pub platform: Platform,
    pub context: Arc<RunContext>,
}

impl ExecutionTask {
    /// The action this task runs
    pub fn action(&self) -> &Action {
        &self.project.actions[self.id.action_index]
    }

    /// Configuration after applying the run-wide override
    pub fn configuration(&self) -> Option<&str> {
        self.context
            .build_config
            .as_deref()
            .or(self.action().configuration.as_deref())
    }

    /// Attribute mapping seen by filter expressions
    pub fn attributes(&self) -> Attributes {
        let mut attrs: Attributes = self.project.fields().into_iter().collect();
        attrs.insert("version", self.compatibility.version.clone());
        attrs.insert("commit", self.compatibility.commit.clone());
        for (name, value) in self.action().fields() {
            attrs.insert(name, value);
        }
        if let Some(configuration) = self.configuration() {
            attrs.insert("configuration", configuration);
        }
        attrs.insert("platform", self.platform.as_str());
        attrs.insert("job", self.context.job.clone());
        attrs
    }

    /// Values the xfail resolver matches rules against
    pub fn match_context(&self) -> MatchContext {
        MatchContext::new(
            self.compatibility.version.clone(),
            self.context.branch.clone(),
            self.platform.as_str(),
            self.configuration(),
            self.context.job.clone(),
        )
    }

    pub fn checkout_key(&self) -> CheckoutKey {
        CheckoutKey {
            project: self.project.path.clone(),
            version: self.compatibility.version.clone(),
        }
    }

    /// `<cache_root>/<version>/<path>`
    pub fn checkout_dir(&self, cache_root: &Path) -> PathBuf {
        cache_root
            .join(&self.compatibility.version)
            .join(&self.project.path)
    }

    /// Scheme or target name, or "Swift Package" for package actions
    pub fn target_label(&self) -> &str {
        self.action().scheme_or_target().unwrap_or("Swift Package")
    }
}

impl fmt::Display for ExecutionTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.id.fmt(f)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use compatsuite_core::index::parse_index;

    pub const SHA: &str = "0123456789abcdef0123456789abcdef01234567";

    /// Single-project index mirroring the common Alamofire example
    pub fn alamofire_index() -> compatsuite_core::index::Index {
        parse_index(&format!(
            r#"[{{
                "repository": "Git",
                "url": "https://github.com/Alamofire/Alamofire.git",
                "path": "Alamofire",
                "branch": "master",
                "maintainer": "dev@example.com",
                "compatibility": [{{ "version": "5.0", "commit": "{SHA}" }}],
                "platforms": ["Darwin"],
                "actions": [
                    {{ "action": "BuildSwiftPackage", "configuration": "release" }},
                    {{ "action": "TestSwiftPackage", "xfail": {{ "issue": "X", "platform": "Linux" }} }}
                ]
            }}]"#
        ))
        .unwrap()
    }

    pub fn task(index: &compatsuite_core::index::Index, action_index: usize) -> ExecutionTask {
        let project = Arc::new(index.projects()[0].clone());
        let compatibility = project.compatibility[0].clone();
        ExecutionTask {
            seq: action_index,
            id: TaskId {
                project: project.path.clone(),
                version: compatibility.version.clone(),
                action_index,
                action: project.actions[action_index].kind.name(),
                platform: Platform::Darwin,
            },
            project,
            compatibility,
            platform: Platform::Darwin,
            context: Arc::new(RunContext::new("main", Platform::Darwin, "source-compat")),
        }
    }
}
