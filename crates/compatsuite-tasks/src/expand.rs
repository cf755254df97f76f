//! Index to task-list expansion

use std::cmp::Ordering;
use std::sync::Arc;

use tracing::{debug, instrument};

use compatsuite_core::index::{CompatibilityEntry, Index, Platform, Project};
use compatsuite_core::predicate::Filter;

use crate::task::{ExecutionTask, RunContext, TaskId};

/// Include/exclude filters for the three selection levels
#[derive(Debug, Clone, Default)]
pub struct TaskFilters {
    pub repos: Filter,
    pub versions: Filter,
    pub actions: Filter,
}

impl TaskFilters {
    /// Whether a task passes every level
    pub fn allows(&self, task: &ExecutionTask) -> bool {
        let attrs = task.attributes();
        self.repos.allows(&attrs) && self.versions.allows(&attrs) && self.actions.allows(&attrs)
    }
}

/// Expansion switches
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpandOptions {
    /// Keep only the highest compatibility version of each project
    pub only_latest_versions: bool,
}

/// Expand the index into concrete tasks for one run.
///
/// Order is project, then compatibility entry, then action, then
/// platform, all in index order. The result depends only on the inputs.
#[instrument(skip_all, fields(projects = index.len(), platform = %context.platform))]
pub fn expand(
    index: &Index,
    context: &RunContext,
    filters: &TaskFilters,
    options: ExpandOptions,
) -> Vec<ExecutionTask> {
    let context = Arc::new(context.clone());
    let mut tasks = Vec::new();
    let mut candidates = 0usize;

    for project in index.projects() {
        if !project.supports(context.platform) {
            debug!(
                project = %project.path,
                platform = %context.platform,
                "platform not declared, skipping project"
            );
            continue;
        }

        let project = Arc::new(project.clone());
        for compatibility in selected_versions(&project, options) {
            for (action_index, action) in project.actions.iter().enumerate() {
                let platforms =
                    task_platforms(&project, action.kind.applicable_platforms(), context.platform);
                for platform in platforms {
                    candidates += 1;
                    let task = ExecutionTask {
                        seq: tasks.len(),
                        id: TaskId {
                            project: project.path.clone(),
                            version: compatibility.version.clone(),
                            action_index,
                            action: action.kind.name(),
                            platform,
                        },
                        project: Arc::clone(&project),
                        compatibility: compatibility.clone(),
                        platform,
                        context: Arc::clone(&context),
                    };
                    if filters.allows(&task) {
                        tasks.push(task);
                    }
                }
            }
        }
    }

    debug!(candidates, selected = tasks.len(), "task expansion complete");
    tasks
}

/// Platforms a task is emitted for: action kind, project and host agree
fn task_platforms(project: &Project, applicable: &[Platform], host: Platform) -> Vec<Platform> {
    Platform::ALL
        .into_iter()
        .filter(|p| applicable.contains(p) && project.supports(*p) && *p == host)
        .collect()
}

fn selected_versions(project: &Project, options: ExpandOptions) -> Vec<&CompatibilityEntry> {
    if !options.only_latest_versions {
        return project.compatibility.iter().collect();
    }
    project
        .compatibility
        .iter()
        .max_by(|a, b| compare_versions(&a.version, &b.version))
        .into_iter()
        .collect()
}

/// Compare dot-separated versions component by component.
///
/// Numeric components compare numerically; anything else compares as
/// text. A missing component sorts before a present one.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) => {
                let ord = match (l.parse::<u64>(), r.parse::<u64>()) {
                    (Ok(l), Ok(r)) => l.cmp(&r),
                    _ => l.cmp(r),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}
