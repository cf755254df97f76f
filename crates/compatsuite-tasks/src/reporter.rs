//! Task execution reporting

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::scheduler::RawStatus;
use crate::task::TaskId;

/// Events emitted during task execution
#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    /// A task acquired its checkout and a worker slot
    Started { id: TaskId, command: String },
    /// A task produced output
    Output {
        id: TaskId,
        line: String,
        is_stderr: bool,
    },
    /// A task ran to completion, failed to spawn or timed out
    Finished {
        id: TaskId,
        status: RawStatus,
        duration: Duration,
    },
    /// A task was stopped by run-level cancellation
    Cancelled { id: TaskId },
    /// All tasks completed
    AllCompleted {
        total: usize,
        succeeded: usize,
        failed: usize,
        cancelled: usize,
        duration: Duration,
    },
}

/// Trait for reporting task execution progress
pub trait TaskReporter: Send + Sync {
    /// Handle a task event
    fn report(&self, event: &TaskEvent);
}

/// Reporter that logs to tracing
#[derive(Debug, Default)]
pub struct TracingReporter;

impl TaskReporter for TracingReporter {
    fn report(&self, event: &TaskEvent) {
        match event {
            TaskEvent::Started { id, command } => {
                tracing::info!(task = %id, "Starting: {}", command);
            }
            TaskEvent::Output {
                id,
                line,
                is_stderr,
            } => {
                if *is_stderr {
                    tracing::trace!(task = %id, stderr = true, "{}", line);
                } else {
                    tracing::trace!(task = %id, "{}", line);
                }
            }
            TaskEvent::Finished {
                id,
                status,
                duration,
            } => {
                if status.is_success() {
                    tracing::info!(task = %id, "succeeded in {:.1}s", duration.as_secs_f64());
                } else {
                    tracing::warn!(
                        task = %id,
                        "{} after {:.1}s",
                        status,
                        duration.as_secs_f64()
                    );
                }
            }
            TaskEvent::Cancelled { id } => {
                tracing::warn!(task = %id, "cancelled");
            }
            TaskEvent::AllCompleted {
                total,
                succeeded,
                failed,
                cancelled,
                duration,
            } => {
                tracing::info!(
                    "All tasks complete: {}/{} succeeded, {} failed, {} cancelled ({:.1}s)",
                    succeeded,
                    total,
                    failed,
                    cancelled,
                    duration.as_secs_f64()
                );
            }
        }
    }
}

/// Reporter that collects events for later inspection
#[derive(Debug, Default)]
pub struct CollectingReporter {
    events: Mutex<Vec<TaskEvent>>,
}

impl CollectingReporter {
    /// Get all collected events
    pub fn events(&self) -> Vec<TaskEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl TaskReporter for CollectingReporter {
    fn report(&self, event: &TaskEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

/// Fan-out over several reporters
pub struct TaskReporterRegistry {
    reporters: Vec<Arc<dyn TaskReporter>>,
}

impl TaskReporterRegistry {
    pub fn new() -> Self {
        Self {
            reporters: vec![Arc::new(TracingReporter)],
        }
    }

    pub fn empty() -> Self {
        Self {
            reporters: Vec::new(),
        }
    }

    pub fn register<R: TaskReporter + 'static>(&mut self, reporter: R) {
        self.reporters.push(Arc::new(reporter));
    }

    pub fn register_shared(&mut self, reporter: Arc<dyn TaskReporter>) {
        self.reporters.push(reporter);
    }

    pub fn all(&self) -> &[Arc<dyn TaskReporter>] {
        &self.reporters
    }

    /// Broadcast an event to all registered reporters
    pub fn broadcast(&self, event: &TaskEvent) {
        for reporter in &self.reporters {
            reporter.report(event);
        }
    }
}

impl TaskReporter for TaskReporterRegistry {
    fn report(&self, event: &TaskEvent) {
        self.broadcast(event);
    }
}

impl Default for TaskReporterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
