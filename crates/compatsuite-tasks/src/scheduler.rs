//! Task scheduler: async executor using tokio
//!
//! Every task is spawned up front. A task first takes the lock of its
//! checkout, then a slot from the global semaphore, so tasks sharing a
//! (project, version) checkout never overlap while unrelated checkouts
//! run side by side up to the concurrency ceiling.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch, Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

use compatsuite_core::config::{
    default_concurrency, DEFAULT_PROJECT_CACHE, DEFAULT_TIMEOUT_SECS, TIMEOUT_EXIT_CODE,
};

use crate::invocation::{Invocation, InvocationPlanner};
use crate::logs::assign_log_names;
use crate::reporter::{TaskEvent, TaskReporter};
use crate::task::{CheckoutKey, ExecutionTask, TaskId};

/// How long output may keep arriving after a step has exited
const OUTPUT_GRACE: Duration = Duration::from_secs(1);

/// Where task output goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputMode {
    /// One log file per task in `dir`
    LogFiles { dir: PathBuf },
    /// Output only travels as reporter events
    Stream,
}

/// Options for the task scheduler
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Maximum concurrent tasks
    pub concurrency: usize,
    /// Wall-clock limit per task, checkout included
    pub timeout: Duration,
    pub output: OutputMode,
    /// Root of the per-version checkouts
    pub project_cache_path: PathBuf,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            output: OutputMode::LogFiles {
                dir: PathBuf::from("."),
            },
            project_cache_path: PathBuf::from(DEFAULT_PROJECT_CACHE),
        }
    }
}

/// How a task's processes ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum RawStatus {
    /// Every step ran; the code is the last step's
    Exited(i32),
    /// A step could not be started
    SpawnFailed(String),
    TimedOut,
    Cancelled,
}

impl RawStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Exited(0))
    }

    /// Exit code recorded for the task
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Exited(code) => Some(*code),
            Self::TimedOut => Some(TIMEOUT_EXIT_CODE),
            Self::SpawnFailed(_) | Self::Cancelled => None,
        }
    }
}

impl fmt::Display for RawStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited(code) => write!(f, "exited with code {}", code),
            Self::SpawnFailed(reason) => write!(f, "failed to start: {}", reason),
            Self::TimedOut => f.write_str("timed out"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Result of a single task execution
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub task: ExecutionTask,
    pub status: RawStatus,
    /// Time from acquiring a worker slot to the last step ending
    pub duration: Duration,
    /// Log file, when output goes to files
    pub log_path: Option<PathBuf>,
    /// Command line of the step that failed
    pub failed_step: Option<String>,
}

/// Task scheduler
pub struct TaskScheduler {
    worker: Worker,
}

impl TaskScheduler {
    pub fn new(
        options: SchedulerOptions,
        planner: Arc<dyn InvocationPlanner>,
        reporter: Arc<dyn TaskReporter>,
    ) -> Self {
        Self {
            worker: Worker {
                options,
                planner,
                reporter,
            },
        }
    }

    pub fn options(&self) -> &SchedulerOptions {
        &self.worker.options
    }

    /// Run every task, sending each result to `sink` as it completes.
    ///
    /// Flipping `cancel` to `true` kills running processes; tasks still
    /// waiting are reported as cancelled without running.
    #[instrument(skip_all, fields(tasks = tasks.len(), concurrency = self.worker.options.concurrency))]
    pub async fn execute(
        &self,
        tasks: Vec<ExecutionTask>,
        cancel: watch::Receiver<bool>,
        sink: mpsc::Sender<ExecutionResult>,
    ) {
        let start = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.worker.options.concurrency.max(1)));
        let mut checkouts: HashMap<CheckoutKey, Arc<Mutex<()>>> = HashMap::new();

        if let OutputMode::LogFiles { dir } = &self.worker.options.output {
            if let Err(e) = tokio::fs::create_dir_all(dir).await {
                warn!(dir = %dir.display(), "failed to create log directory: {}", e);
            }
        }

        let log_names = assign_log_names(&tasks);
        let mut handles = Vec::with_capacity(tasks.len());

        for (task, log_name) in tasks.into_iter().zip(log_names) {
            let lock = Arc::clone(checkouts.entry(task.checkout_key()).or_default());
            let semaphore = Arc::clone(&semaphore);
            let worker = self.worker.clone();
            let cancel = cancel.clone();
            let sink = sink.clone();
            let spawned = task.clone();

            let handle = tokio::spawn(async move {
                let result = worker.run(spawned, log_name, lock, semaphore, cancel).await;
                let status = result.status.clone();
                if sink.send(result).await.is_err() {
                    debug!("result receiver dropped");
                }
                status
            });
            handles.push((task, handle));
        }

        let total = handles.len();
        let mut succeeded = 0;
        let mut failed = 0;
        let mut cancelled = 0;

        for (task, handle) in handles {
            match handle.await {
                Ok(RawStatus::Cancelled) => cancelled += 1,
                Ok(status) if status.is_success() => succeeded += 1,
                Ok(_) => failed += 1,
                Err(e) => {
                    error!(task = %task.id, "task panicked: {}", e);
                    failed += 1;
                    let result = ExecutionResult {
                        task,
                        status: RawStatus::SpawnFailed(format!("task panicked: {}", e)),
                        duration: Duration::ZERO,
                        log_path: None,
                        failed_step: None,
                    };
                    let _ = sink.send(result).await;
                }
            }
        }

        self.worker.reporter.report(&TaskEvent::AllCompleted {
            total,
            succeeded,
            failed,
            cancelled,
            duration: start.elapsed(),
        });
    }
}

#[derive(Clone)]
struct Worker {
    options: SchedulerOptions,
    planner: Arc<dyn InvocationPlanner>,
    reporter: Arc<dyn TaskReporter>,
}

impl Worker {
    async fn run(
        &self,
        task: ExecutionTask,
        log_name: String,
        lock: Arc<Mutex<()>>,
        semaphore: Arc<Semaphore>,
        mut cancel: watch::Receiver<bool>,
    ) -> ExecutionResult {
        let _checkout = tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => return self.cancelled_before_start(task),
            guard = lock.lock_owned() => guard,
        };
        let _permit = tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => return self.cancelled_before_start(task),
            permit = semaphore.acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return self.cancelled_before_start(task),
            },
        };

        let start = Instant::now();
        let deadline = tokio::time::Instant::now() + self.options.timeout;
        let checkout_dir = task.checkout_dir(&self.options.project_cache_path);
        let finish = |status: RawStatus, log_path: Option<PathBuf>, failed_step: Option<String>| {
            self.finish(task.clone(), status, start, log_path, failed_step)
        };

        if let Some(parent) = checkout_dir.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                let status = RawStatus::SpawnFailed(format!(
                    "failed to create {}: {}",
                    parent.display(),
                    e
                ));
                return finish(status, None, None);
            }
        }

        let exists = checkout_dir.exists();
        let plan = match self.planner.plan(&task, &checkout_dir, exists) {
            Ok(plan) => plan,
            Err(e) => return finish(RawStatus::SpawnFailed(e.to_string()), None, None),
        };

        self.reporter.report(&TaskEvent::Started {
            id: task.id.clone(),
            command: plan.headline(),
        });

        let mut log = TaskLog::open(&self.options.output, &log_name).await;
        let mut status = RawStatus::Exited(0);
        let mut failed_step = None;

        for invocation in plan.all() {
            log.write_line(&format!("$ {}", invocation)).await;
            status = self
                .run_invocation(&task.id, invocation, &mut log, deadline, &mut cancel)
                .await;
            if !status.is_success() {
                log.write_line(&format!("# {}", status)).await;
                failed_step = Some(invocation.to_string());
                break;
            }
        }

        let log_path = log.close().await;
        finish(status, log_path, failed_step)
    }

    async fn run_invocation(
        &self,
        id: &TaskId,
        invocation: &Invocation,
        log: &mut TaskLog,
        deadline: tokio::time::Instant,
        cancel: &mut watch::Receiver<bool>,
    ) -> RawStatus {
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .envs(&invocation.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &invocation.cwd {
            command.current_dir(cwd);
        }
        // Own process group, so helpers the step forks can be killed with it
        #[cfg(unix)]
        command.process_group(0);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                return RawStatus::SpawnFailed(format!("{}: {}", invocation.program, e));
            }
        };
        let group = child.id();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_reader(stdout, false, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_reader(stderr, true, tx.clone()));
        }
        drop(tx);

        // The exit status decides the result. Output still arriving after
        // the step exits is collected until the pipes close or
        // OUTPUT_GRACE runs out, whichever comes first.
        let mut exited: Option<RawStatus> = None;
        let mut drained = false;
        let mut grace_until = deadline;

        let status = loop {
            tokio::select! {
                biased;
                _ = cancelled(cancel) => break RawStatus::Cancelled,
                _ = tokio::time::sleep_until(deadline), if exited.is_none() => {
                    break RawStatus::TimedOut
                }
                _ = tokio::time::sleep_until(grace_until), if exited.is_some() => {
                    if let Some(status) = exited.take() {
                        debug!(task = %id, "output still open after exit, closing");
                        break status;
                    }
                }
                waited = child.wait(), if exited.is_none() => {
                    let status = match waited {
                        Ok(exit) => RawStatus::Exited(exit.code().unwrap_or(-1)),
                        Err(e) => RawStatus::SpawnFailed(format!("{}: {}", invocation.program, e)),
                    };
                    if drained {
                        break status;
                    }
                    exited = Some(status);
                    grace_until = tokio::time::Instant::now() + OUTPUT_GRACE;
                }
                line = rx.recv(), if !drained => match line {
                    Some((line, is_stderr)) => {
                        log.write_line(&line).await;
                        self.reporter.report(&TaskEvent::Output {
                            id: id.clone(),
                            line,
                            is_stderr,
                        });
                    }
                    None => {
                        drained = true;
                        if let Some(status) = exited.take() {
                            break status;
                        }
                    }
                },
            }
        };

        // Nothing the step started outlives it
        terminate(&mut child, group, id).await;
        for reader in readers {
            reader.abort();
        }
        status
    }

    fn finish(
        &self,
        task: ExecutionTask,
        status: RawStatus,
        start: Instant,
        log_path: Option<PathBuf>,
        failed_step: Option<String>,
    ) -> ExecutionResult {
        let duration = start.elapsed();
        let event = match status {
            RawStatus::Cancelled => TaskEvent::Cancelled {
                id: task.id.clone(),
            },
            _ => TaskEvent::Finished {
                id: task.id.clone(),
                status: status.clone(),
                duration,
            },
        };
        self.reporter.report(&event);
        ExecutionResult {
            task,
            status,
            duration,
            log_path,
            failed_step,
        }
    }

    fn cancelled_before_start(&self, task: ExecutionTask) -> ExecutionResult {
        self.finish(task, RawStatus::Cancelled, Instant::now(), None, None)
    }
}

/// Kill everything in the step's process group, then the step itself
async fn terminate(child: &mut Child, group: Option<u32>, id: &TaskId) {
    #[cfg(unix)]
    if let Some(pgid) = group.and_then(|pid| i32::try_from(pid).ok()) {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
            Ok(()) | Err(nix::errno::Errno::ESRCH) => {}
            Err(e) => debug!(task = %id, "failed to kill process group {}: {}", pgid, e),
        }
    }
    #[cfg(not(unix))]
    let _ = group;

    // No id once the step has been reaped
    if child.id().is_some() {
        if let Err(e) = child.kill().await {
            debug!(task = %id, "kill failed: {}", e);
        }
    }
}

/// Resolves once the run is cancelled; never resolves if the sender is gone
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

fn spawn_reader<R>(
    stream: R,
    is_stderr: bool,
    tx: mpsc::UnboundedSender<(String, bool)>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send((line, is_stderr)).is_err() {
                break;
            }
        }
    })
}

/// Output file of one task
struct TaskLog {
    writer: Option<BufWriter<File>>,
    path: Option<PathBuf>,
}

impl TaskLog {
    async fn open(output: &OutputMode, name: &str) -> Self {
        let OutputMode::LogFiles { dir } = output else {
            return Self {
                writer: None,
                path: None,
            };
        };
        let path = dir.join(name);
        match File::create(&path).await {
            Ok(file) => Self {
                writer: Some(BufWriter::new(file)),
                path: Some(path),
            },
            Err(e) => {
                warn!(path = %path.display(), "failed to create log file: {}", e);
                Self {
                    writer: None,
                    path: None,
                }
            }
        }
    }

    async fn write_line(&mut self, line: &str) {
        let Some(writer) = self.writer.as_mut() else {
            return;
        };
        let written = async {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await
        }
        .await;
        if let Err(e) = written {
            warn!(
                path = %self.path.as_ref().map(|p| p.display().to_string()).unwrap_or_default(),
                "failed to write log: {}",
                e
            );
            self.writer = None;
        }
    }

    async fn close(mut self) -> Option<PathBuf> {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.flush().await {
                warn!("failed to flush log: {}", e);
            }
        }
        self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invocation::{PlanError, TaskPlan};
    use crate::reporter::CollectingReporter;
    use crate::task::fixtures::{alamofire_index, task};
    use std::path::Path;
    use tempfile::TempDir;

    /// Runs `sh -c <script>` where the script is picked by task sequence
    struct ScriptPlanner(Vec<String>);

    impl InvocationPlanner for ScriptPlanner {
        fn plan(
            &self,
            task: &ExecutionTask,
            _checkout_dir: &Path,
            _checkout_exists: bool,
        ) -> Result<TaskPlan, PlanError> {
            Ok(TaskPlan {
                checkout: Vec::new(),
                steps: vec![Invocation::new("sh").args(["-c", self.0[task.seq].as_str()])],
            })
        }
    }

    fn scheduler(
        dir: &TempDir,
        scripts: &[&str],
        timeout: Duration,
    ) -> (TaskScheduler, Arc<CollectingReporter>) {
        let reporter = Arc::new(CollectingReporter::default());
        let options = SchedulerOptions {
            concurrency: 4,
            timeout,
            output: OutputMode::LogFiles {
                dir: dir.path().join("logs"),
            },
            project_cache_path: dir.path().join("cache"),
        };
        let planner = ScriptPlanner(scripts.iter().map(|s| s.to_string()).collect());
        (
            TaskScheduler::new(options, Arc::new(planner), reporter.clone()),
            reporter,
        )
    }

    async fn run_all(
        scheduler: &TaskScheduler,
        tasks: Vec<ExecutionTask>,
        cancel: watch::Receiver<bool>,
    ) -> Vec<ExecutionResult> {
        let (tx, mut rx) = mpsc::channel(16);
        scheduler.execute(tasks, cancel, tx).await;
        let mut results = Vec::new();
        while let Some(result) = rx.recv().await {
            results.push(result);
        }
        results.sort_by_key(|r| r.task.seq);
        results
    }

    #[test]
    fn test_raw_status() {
        assert!(RawStatus::Exited(0).is_success());
        assert!(!RawStatus::Exited(1).is_success());
        assert!(!RawStatus::TimedOut.is_success());
        assert_eq!(RawStatus::TimedOut.exit_code(), Some(124));
        assert_eq!(RawStatus::Cancelled.exit_code(), None);
    }

    #[test]
    fn test_scheduler_options_default() {
        let opts = SchedulerOptions::default();
        assert!(opts.concurrency > 0);
        assert_eq!(opts.timeout, Duration::from_secs(3600));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_codes_and_log_files() {
        let dir = TempDir::new().unwrap();
        let (scheduler, reporter) = scheduler(
            &dir,
            &["echo building; exit 0", "echo broken >&2; exit 3"],
            Duration::from_secs(30),
        );
        let index = alamofire_index();
        let (_tx, rx) = watch::channel(false);
        let results = run_all(&scheduler, vec![task(&index, 0), task(&index, 1)], rx).await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].status, RawStatus::Exited(0));
        assert_eq!(results[1].status, RawStatus::Exited(3));
        assert!(results[1].failed_step.as_deref().unwrap().contains("exit 3"));

        let log = std::fs::read_to_string(results[0].log_path.as_ref().unwrap()).unwrap();
        assert!(log.contains("building"));
        assert!(results[1]
            .log_path
            .as_ref()
            .unwrap()
            .ends_with("Alamofire_5.0_TestSwiftPackage.log"));

        let events = reporter.events();
        assert!(matches!(
            events.last(),
            Some(TaskEvent::AllCompleted {
                total: 2,
                succeeded: 1,
                failed: 1,
                cancelled: 0,
                ..
            })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_process() {
        let dir = TempDir::new().unwrap();
        let (scheduler, _) = scheduler(&dir, &["sleep 30"], Duration::from_millis(200));
        let index = alamofire_index();
        let (_tx, rx) = watch::channel(false);

        let started = Instant::now();
        let results = run_all(&scheduler, vec![task(&index, 0)], rx).await;

        assert_eq!(results[0].status, RawStatus::TimedOut);
        assert_eq!(results[0].status.exit_code(), Some(124));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_background_child_holding_stdout_does_not_block_exit() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("M");
        let script = format!("(sleep 3; touch {}) & exit 0", marker.display());
        let (scheduler, _) = scheduler(&dir, &[&script], Duration::from_secs(10));
        let index = alamofire_index();
        let (_tx, rx) = watch::channel(false);

        let started = Instant::now();
        let results = run_all(&scheduler, vec![task(&index, 0)], rx).await;

        assert_eq!(results[0].status, RawStatus::Exited(0));
        assert!(started.elapsed() < Duration::from_secs(3));

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(!marker.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_whole_process_group() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("M");
        let script = format!("(sleep 2; touch {}) & sleep 30", marker.display());
        let (scheduler, _) = scheduler(&dir, &[&script], Duration::from_millis(300));
        let index = alamofire_index();
        let (_tx, rx) = watch::channel(false);

        let results = run_all(&scheduler, vec![task(&index, 0)], rx).await;
        assert_eq!(results[0].status, RawStatus::TimedOut);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!marker.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancellation_stops_running_and_waiting_tasks() {
        let dir = TempDir::new().unwrap();
        let (scheduler, _) = scheduler(&dir, &["sleep 30", "sleep 30"], Duration::from_secs(60));
        let index = alamofire_index();
        let (tx, rx) = watch::channel(false);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            let _ = tx.send(true);
        });
        let results = run_all(&scheduler, vec![task(&index, 0), task(&index, 1)], rx).await;

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.status == RawStatus::Cancelled));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shared_checkout_is_serialized() {
        let dir = TempDir::new().unwrap();
        let trace = dir.path().join("trace");
        let script = format!(
            "echo start >> {0}; sleep 0.2; echo end >> {0}",
            trace.display()
        );
        let (scheduler, _) = scheduler(&dir, &[&script, &script], Duration::from_secs(30));
        let index = alamofire_index();
        let (_tx, rx) = watch::channel(false);

        let results = run_all(&scheduler, vec![task(&index, 0), task(&index, 1)], rx).await;
        assert!(results.iter().all(|r| r.status.is_success()));

        let lines: Vec<_> = std::fs::read_to_string(&trace)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect();
        assert_eq!(lines, vec!["start", "end", "start", "end"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_missing_program_is_spawn_failure() {
        struct Missing;
        impl InvocationPlanner for Missing {
            fn plan(
                &self,
                _task: &ExecutionTask,
                _dir: &Path,
                _exists: bool,
            ) -> Result<TaskPlan, PlanError> {
                Ok(TaskPlan {
                    checkout: Vec::new(),
                    steps: vec![Invocation::new("/nonexistent/compatsuite-swift")],
                })
            }
        }

        let dir = TempDir::new().unwrap();
        let scheduler = TaskScheduler::new(
            SchedulerOptions {
                output: OutputMode::Stream,
                project_cache_path: dir.path().to_path_buf(),
                ..Default::default()
            },
            Arc::new(Missing),
            Arc::new(CollectingReporter::default()),
        );
        let index = alamofire_index();
        let (_tx, rx) = watch::channel(false);
        let results = run_all(&scheduler, vec![task(&index, 0)], rx).await;

        assert!(matches!(results[0].status, RawStatus::SpawnFailed(_)));
        assert!(results[0].log_path.is_none());
    }
}
