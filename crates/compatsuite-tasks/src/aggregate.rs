//! Result aggregation and run reports
//!
//! A single [`Aggregator`] owns every result of the run. Workers reach it
//! only through the results channel.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use compatsuite_core::xfail::{classify, Outcome};

use crate::logs::outcome_log_name;
use crate::scheduler::{ExecutionResult, RawStatus};
use crate::task::{ExecutionTask, TaskId};

const SEPARATOR: &str = "========================================";

/// Classified result of one executed task
#[derive(Debug, Clone)]
pub struct TaskReport {
    pub task: ExecutionTask,
    pub status: RawStatus,
    pub outcome: Outcome,
    pub duration: Duration,
    /// Log file after the outcome prefix was applied
    pub log_path: Option<PathBuf>,
    pub failed_step: Option<String>,
}

impl TaskReport {
    /// `<path>, <version>, <commit>, <target>[, <destination>]`
    pub fn describe(&self) -> String {
        let task = &self.task;
        let mut line = format!(
            "{}, {}, {}, {}",
            task.project.path,
            task.compatibility.version,
            task.compatibility.short_commit(),
            task.target_label()
        );
        if let Some(destination) = &task.action().destination {
            line.push_str(", ");
            line.push_str(destination);
        }
        line
    }
}

/// Collects results and classifies them
pub struct Aggregator {
    reports: Vec<TaskReport>,
    cancelled: Vec<ExecutionTask>,
    started_at: DateTime<Utc>,
    start: Instant,
}

impl Aggregator {
    pub fn new() -> Self {
        Self {
            reports: Vec::new(),
            cancelled: Vec::new(),
            started_at: Utc::now(),
            start: Instant::now(),
        }
    }

    /// Classify one result and rename its log with the outcome label
    pub fn record(&mut self, result: ExecutionResult) {
        let ExecutionResult {
            task,
            status,
            duration,
            log_path,
            failed_step,
        } = result;

        if status == RawStatus::Cancelled {
            debug!(task = %task.id, "recording cancelled task");
            self.cancelled.push(task);
            return;
        }

        let outcome = classify(
            status.is_success(),
            &task.action().xfail,
            &task.match_context(),
        );
        debug!(task = %task.id, outcome = %outcome, status = %status, "classified");

        let log_path = log_path.map(|path| label_log(path, &outcome));
        self.reports.push(TaskReport {
            task,
            status,
            outcome,
            duration,
            log_path,
            failed_step,
        });
    }

    /// Drain the results channel until every sender is gone
    pub async fn consume(mut self, mut results: mpsc::Receiver<ExecutionResult>) -> RunSummary {
        while let Some(result) = results.recv().await {
            self.record(result);
        }
        self.finish()
    }

    pub fn finish(mut self) -> RunSummary {
        self.reports.sort_by_key(|r| r.task.seq);
        self.cancelled.sort_by_key(|t| t.seq);
        RunSummary {
            tasks: self.reports,
            cancelled: self.cancelled,
            started_at: self.started_at,
            duration: self.start.elapsed(),
        }
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}

fn label_log(path: PathBuf, outcome: &Outcome) -> PathBuf {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return path;
    };
    let labelled = path.with_file_name(outcome_log_name(name, outcome));
    match std::fs::rename(&path, &labelled) {
        Ok(()) => labelled,
        Err(e) => {
            warn!(path = %path.display(), "failed to rename log: {}", e);
            path
        }
    }
}

/// Outcome counts of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub passed: usize,
    pub failed: usize,
    pub xfailed: usize,
    pub upassed: usize,
    pub cancelled: usize,
}

impl Counts {
    /// Executed tasks; cancelled ones are not included
    pub fn total(&self) -> usize {
        self.passed + self.failed + self.xfailed + self.upassed
    }
}

/// Everything known about a finished run
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Executed tasks in enumeration order
    pub tasks: Vec<TaskReport>,
    /// Tasks stopped by cancellation, in enumeration order
    pub cancelled: Vec<ExecutionTask>,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
}

impl RunSummary {
    pub fn counts(&self) -> Counts {
        let mut counts = Counts {
            cancelled: self.cancelled.len(),
            ..Default::default()
        };
        for report in &self.tasks {
            match report.outcome {
                Outcome::Pass => counts.passed += 1,
                Outcome::UnexpectedFail => counts.failed += 1,
                Outcome::ExpectedFail { .. } => counts.xfailed += 1,
                Outcome::UnexpectedPass { .. } => counts.upassed += 1,
            }
        }
        counts
    }

    /// Overall label: FAIL, then UPASS, then XFAIL, then PASS
    pub fn result(&self) -> &'static str {
        let counts = self.counts();
        if counts.failed > 0 {
            "FAIL"
        } else if counts.upassed > 0 {
            "UPASS"
        } else if counts.xfailed > 0 {
            "XFAIL"
        } else {
            "PASS"
        }
    }

    /// No unexpected failures or passes
    pub fn is_clean(&self) -> bool {
        !self.tasks.iter().any(|r| r.outcome.is_unexpected())
    }

    pub fn was_cancelled(&self) -> bool {
        !self.cancelled.is_empty()
    }

    /// Distinct projects with at least one executed task
    pub fn repository_count(&self) -> usize {
        self.tasks
            .iter()
            .map(|r| r.task.project.path.as_str())
            .collect::<BTreeSet<_>>()
            .len()
    }

    fn with_outcome<'a>(
        &'a self,
        pred: impl Fn(&Outcome) -> bool + 'a,
    ) -> impl Iterator<Item = &'a TaskReport> + 'a {
        self.tasks.iter().filter(move |r| pred(&r.outcome))
    }

    /// Human-readable report
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let issue = |r: &TaskReport| r.outcome.issue().unwrap_or("untracked").to_string();

        let xfails: Vec<_> = self
            .with_outcome(|o| matches!(o, Outcome::ExpectedFail { .. }))
            .map(|r| format!("{}, {}", issue(r), r.describe()))
            .collect();
        let upasses: Vec<_> = self
            .with_outcome(|o| matches!(o, Outcome::UnexpectedPass { .. }))
            .map(|r| format!("{}, {}", issue(r), r.describe()))
            .collect();
        let failures: Vec<_> = self
            .with_outcome(|o| *o == Outcome::UnexpectedFail)
            .map(TaskReport::describe)
            .collect();
        let cancelled: Vec<_> = self.cancelled.iter().map(|t| t.id.to_string()).collect();

        for (title, lines) in [
            ("XFailures", &xfails),
            ("UPasses", &upasses),
            ("Failures", &failures),
            ("Cancelled", &cancelled),
        ] {
            if lines.is_empty() {
                continue;
            }
            let _ = writeln!(out, "{}", SEPARATOR);
            let _ = writeln!(out, "{}:", title);
            for line in lines {
                let _ = writeln!(out, "  {}", line);
            }
        }

        let counts = self.counts();
        let _ = writeln!(out, "{}", SEPARATOR);
        let _ = writeln!(out, "Action Summary:");
        let _ = writeln!(out, "     Passed: {}", counts.passed);
        let _ = writeln!(out, "     Failed: {}", counts.failed);
        let _ = writeln!(out, "    XFailed: {}", counts.xfailed);
        let _ = writeln!(out, "    UPassed: {}", counts.upassed);
        if counts.cancelled > 0 {
            let _ = writeln!(out, "  Cancelled: {}", counts.cancelled);
        }
        let _ = writeln!(out, "      Total: {}", counts.total());
        let _ = writeln!(out, "{}", SEPARATOR);
        let _ = writeln!(out, "Repository Summary:");
        let _ = writeln!(out, "      Total: {}", self.repository_count());
        let _ = writeln!(out, "{}", SEPARATOR);
        let _ = writeln!(out, "Result: {}", self.result());
        let _ = writeln!(out, "{}", SEPARATOR);
        out
    }

    /// Machine-readable view of the run
    pub fn to_json(&self) -> JsonSummary<'_> {
        JsonSummary {
            started_at: self.started_at,
            duration_ms: self.duration.as_millis() as u64,
            result: self.result(),
            clean: self.is_clean(),
            counts: self.counts(),
            repositories: self.repository_count(),
            tasks: self
                .tasks
                .iter()
                .map(|r| JsonTask {
                    seq: r.task.seq,
                    id: &r.task.id,
                    outcome: r.outcome.label(),
                    issue: r.outcome.issue(),
                    status: &r.status,
                    exit_code: r.status.exit_code(),
                    duration_ms: r.duration.as_millis() as u64,
                    log_path: r.log_path.as_deref(),
                    failed_step: r.failed_step.as_deref(),
                })
                .collect(),
            cancelled: self.cancelled.iter().map(|t| &t.id).collect(),
        }
    }

    /// Write the JSON summary to `path`
    pub fn write_json(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(&self.to_json())?;
        std::fs::write(path, json + "\n")?;
        info!(path = %path.display(), "wrote run summary");
        Ok(())
    }
}

/// JSON form of [`RunSummary`]
#[derive(Debug, Serialize)]
pub struct JsonSummary<'a> {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub result: &'static str,
    pub clean: bool,
    pub counts: Counts,
    pub repositories: usize,
    pub tasks: Vec<JsonTask<'a>>,
    pub cancelled: Vec<&'a TaskId>,
}

#[derive(Debug, Serialize)]
pub struct JsonTask<'a> {
    pub seq: usize,
    pub id: &'a TaskId,
    pub outcome: &'static str,
    pub issue: Option<&'a str>,
    pub status: &'a RawStatus,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    pub log_path: Option<&'a Path>,
    pub failed_step: Option<&'a str>,
}
