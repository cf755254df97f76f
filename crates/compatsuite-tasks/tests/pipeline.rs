//! End-to-end runs of the expand, schedule, aggregate pipeline

#![cfg(unix)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::{mpsc, watch};

use compatsuite_core::index::{parse_index, Platform};
use compatsuite_core::predicate::Filter;
use compatsuite_core::xfail::Outcome;
use compatsuite_tasks::{
    expand, Aggregator, CollectingReporter, ExecutionTask, ExpandOptions, Invocation,
    InvocationPlanner, OutputMode, PlanError, RunContext, RunSummary, SchedulerOptions,
    TaskEvent, TaskFilters, TaskPlan, TaskScheduler,
};

const SHA: &str = "0123456789abcdef0123456789abcdef01234567";

/// Succeeds for build actions and fails for test actions
struct FakeToolchain;

impl InvocationPlanner for FakeToolchain {
    fn plan(
        &self,
        task: &ExecutionTask,
        checkout_dir: &Path,
        _checkout_exists: bool,
    ) -> Result<TaskPlan, PlanError> {
        let checkout = Invocation::new("mkdir")
            .arg("-p")
            .arg(checkout_dir.display().to_string());
        let script = if task.id.action.starts_with("Build") {
            format!("echo compiling {}", task.project.path)
        } else {
            "echo 'error: tests failed' >&2; exit 1".to_string()
        };
        Ok(TaskPlan {
            checkout: vec![checkout],
            steps: vec![Invocation::new("sh").args(["-c", script.as_str()])],
        })
    }
}

fn index() -> compatsuite_core::index::Index {
    parse_index(&format!(
        r#"[
          {{
            "path": "Alamofire", "url": "https://github.com/Alamofire/Alamofire.git",
            "compatibility": [{{ "version": "5.0", "commit": "{SHA}" }}],
            "actions": [
              {{ "action": "BuildSwiftPackage", "configuration": "release" }},
              {{ "action": "TestSwiftPackage", "xfail": {{ "issue": "https://bugs.example.com/1" }} }}
            ]
          }},
          {{
            "path": "Kingfisher", "url": "https://github.com/onevcat/Kingfisher.git",
            "compatibility": [
              {{ "version": "4.2", "commit": "{SHA}" }},
              {{ "version": "5.0", "commit": "{SHA}" }}
            ],
            "actions": [
              {{ "action": "BuildSwiftPackage" }},
              {{ "action": "TestSwiftPackage" }}
            ]
          }}
        ]"#
    ))
    .unwrap()
}

async fn run(dir: &TempDir, tasks: Vec<ExecutionTask>) -> (RunSummary, Vec<TaskEvent>) {
    let reporter = Arc::new(CollectingReporter::default());
    let scheduler = TaskScheduler::new(
        SchedulerOptions {
            concurrency: 2,
            timeout: Duration::from_secs(30),
            output: OutputMode::LogFiles {
                dir: dir.path().join("logs"),
            },
            project_cache_path: dir.path().join("cache"),
        },
        Arc::new(FakeToolchain),
        reporter.clone(),
    );

    let (_cancel_tx, cancel_rx) = watch::channel(false);
    let (tx, rx) = mpsc::channel(8);
    let consumer = tokio::spawn(Aggregator::new().consume(rx));
    scheduler.execute(tasks, cancel_rx, tx).await;
    let summary = consumer.await.unwrap();
    (summary, reporter.events())
}

#[tokio::test]
async fn test_full_run_classifies_every_task() {
    let dir = TempDir::new().unwrap();
    let context = RunContext::new("main", Platform::Linux, "source-compat");
    let tasks = expand(
        &index(),
        &context,
        &TaskFilters::default(),
        ExpandOptions::default(),
    );
    assert_eq!(tasks.len(), 6);

    let (summary, events) = run(&dir, tasks).await;
    let outcomes: Vec<_> = summary
        .tasks
        .iter()
        .map(|r| (r.task.id.to_string(), r.outcome.label()))
        .collect();
    assert_eq!(
        outcomes,
        vec![
            ("Alamofire@5.0:BuildSwiftPackage#0".to_string(), "PASS"),
            ("Alamofire@5.0:TestSwiftPackage#1".to_string(), "XFAIL"),
            ("Kingfisher@4.2:BuildSwiftPackage#0".to_string(), "PASS"),
            ("Kingfisher@4.2:TestSwiftPackage#1".to_string(), "FAIL"),
            ("Kingfisher@5.0:BuildSwiftPackage#0".to_string(), "PASS"),
            ("Kingfisher@5.0:TestSwiftPackage#1".to_string(), "FAIL"),
        ]
    );
    assert_eq!(
        summary.tasks[1].outcome,
        Outcome::ExpectedFail {
            issue: Some("https://bugs.example.com/1".to_string())
        }
    );
    assert!(!summary.is_clean());
    assert_eq!(summary.repository_count(), 2);

    let xfail_log = dir
        .path()
        .join("logs")
        .join("XFAIL_Alamofire_5.0_TestSwiftPackage.log");
    let log = std::fs::read_to_string(xfail_log).unwrap();
    assert!(log.contains("error: tests failed"));
    assert!(dir.path().join("cache").join("4.2").join("Kingfisher").is_dir());

    let started = events
        .iter()
        .filter(|e| matches!(e, TaskEvent::Started { .. }))
        .count();
    assert_eq!(started, 6);
}

#[tokio::test]
async fn test_filtered_run_is_clean() {
    let dir = TempDir::new().unwrap();
    let context = RunContext::new("main", Platform::Linux, "source-compat");
    let filters = TaskFilters {
        actions: Filter::new(&[r#"action.startswith("Build")"#], &[]).unwrap(),
        versions: Filter::new(&[], &["version == '4.2'"]).unwrap(),
        ..Default::default()
    };
    let tasks = expand(&index(), &context, &filters, ExpandOptions::default());
    assert_eq!(tasks.len(), 2);

    let (summary, _) = run(&dir, tasks).await;
    assert!(summary.is_clean());
    assert_eq!(summary.result(), "PASS");
    assert!(summary.render_text().ends_with("Result: PASS\n========================================\n"));
}
