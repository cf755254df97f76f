//! Per-task log file naming

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use compatsuite_core::xfail::Outcome;

use crate::task::ExecutionTask;

static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_.]+").expect("Invalid regex"));

/// Base log file name for a task, without any outcome prefix.
///
/// Built from the project path, the first component of the Xcode project
/// name, the version, the action, the scheme or target and the
/// destination. Runs of unsafe characters collapse to `-`.
pub fn log_file_name(task: &ExecutionTask) -> String {
    let action = task.action();
    let project_stem = action
        .project
        .as_deref()
        .and_then(|p| p.split('-').next())
        .unwrap_or("");
    let mut parts = vec![
        format!("{} {}", task.project.path, project_stem).trim().to_string(),
        task.compatibility.version.clone(),
        task.id.action.clone(),
    ];
    if let Some(name) = action.scheme_or_target() {
        parts.push(name.to_string());
    }
    if let Some(destination) = &action.destination {
        parts.push(destination.clone());
    }

    let joined = parts.join("_");
    let safe = UNSAFE_CHARS.replace_all(&joined, "-");
    format!("{}.log", safe.trim_matches(|c| c == '-' || c == '_'))
}

/// Log names for a task list, unique within the run.
///
/// Later collisions get `-2`, `-3`, ... before the extension, in
/// enumeration order.
pub fn assign_log_names(tasks: &[ExecutionTask]) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    tasks
        .iter()
        .map(|task| {
            let name = log_file_name(task);
            let count = seen.entry(name.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                name
            } else {
                let stem = name.strip_suffix(".log").unwrap_or(&name);
                format!("{}-{}.log", stem, count)
            }
        })
        .collect()
}

/// Final log name once the outcome is known
pub fn outcome_log_name(name: &str, outcome: &Outcome) -> String {
    format!("{}_{}", outcome.label(), name)
}
