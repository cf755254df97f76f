//! compatsuite tasks - expansion, execution and aggregation
//!
//! This crate turns a validated index into concrete tasks, plans the
//! toolchain processes for each, runs them with bounded concurrency and
//! per-checkout exclusion, and classifies the results.

pub mod aggregate;
pub mod expand;
pub mod invocation;
pub mod logs;
pub mod reporter;
pub mod scheduler;
pub mod task;

pub use aggregate::{Aggregator, Counts, RunSummary, TaskReport};
pub use expand::{expand, ExpandOptions, TaskFilters};
pub use invocation::{
    Invocation, InvocationPlanner, PlanError, SwiftPlanner, TaskPlan, ToolchainOptions,
};
pub use reporter::{CollectingReporter, TaskEvent, TaskReporter, TaskReporterRegistry, TracingReporter};
pub use scheduler::{ExecutionResult, OutputMode, RawStatus, SchedulerOptions, TaskScheduler};
pub use task::{CheckoutKey, ExecutionTask, RunContext, TaskId};
