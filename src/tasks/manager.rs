//! Task Manager
//!
//! Tracks long-running operations started by REST handlers. A task is
//! identified by its name and metadata; starting a task that is already
//! executing returns the running instance. Finished tasks are kept in a
//! bounded history, newest first.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use prometheus::IntGauge;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default number of finished tasks kept
pub const DEFAULT_FINISHED_HISTORY: usize = 100;

/// Task metadata (parameter name → value)
pub type TaskMetadata = BTreeMap<String, String>;

// =============================================================================
// Progress
// =============================================================================

/// Receiver of progress updates for a running operation
pub trait ProgressSink: Send + Sync {
    /// Report completion percentage (0-100)
    fn set_progress(&self, percent: u8);
}

// =============================================================================
// Task Outcome
// =============================================================================

/// Serializable description of a task failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskException {
    pub detail: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    pub status: u16,
}

impl From<&Error> for TaskException {
    fn from(e: &Error) -> Self {
        Self {
            detail: e.to_string(),
            code: e.code().to_string(),
            component: e.component().map(str::to_string),
            status: e.status_code().as_u16(),
        }
    }
}

/// How a task finished
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Success(serde_json::Value),
    Failure(TaskException),
}

/// Snapshot of a task for listings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInfo {
    pub name: String,
    pub metadata: TaskMetadata,
    pub begin_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Seconds between begin and end
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ret_value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<TaskException>,
}

/// Executing and finished tasks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSummary {
    pub executing_tasks: Vec<TaskInfo>,
    pub finished_tasks: Vec<TaskInfo>,
}

// =============================================================================
// Task
// =============================================================================

/// A tracked long-running operation
#[derive(Debug)]
pub struct Task {
    name: String,
    metadata: TaskMetadata,
    begin_time: DateTime<Utc>,
    progress: AtomicU8,
    end_time: Mutex<Option<DateTime<Utc>>>,
    outcome: watch::Sender<Option<TaskOutcome>>,
    cancel: CancellationToken,
}

impl Task {
    fn new(name: &str, metadata: TaskMetadata, cancel: CancellationToken) -> Self {
        let (outcome, _) = watch::channel(None);
        Self {
            name: name.to_string(),
            metadata,
            begin_time: Utc::now(),
            progress: AtomicU8::new(0),
            end_time: Mutex::new(None),
            outcome,
            cancel,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metadata(&self) -> &TaskMetadata {
        &self.metadata
    }

    pub fn progress(&self) -> u8 {
        self.progress.load(Ordering::Relaxed)
    }

    /// Outcome if the task has finished
    pub fn outcome(&self) -> Option<TaskOutcome> {
        self.outcome.borrow().clone()
    }

    /// Request cancellation of the task
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait up to `timeout` for the task to finish
    pub async fn wait(&self, timeout: Duration) -> Option<TaskOutcome> {
        let mut rx = self.outcome.subscribe();
        let finished = tokio::time::timeout(timeout, rx.wait_for(Option::is_some)).await;
        match finished {
            Ok(Ok(outcome)) => outcome.clone(),
            _ => self.outcome(),
        }
    }

    fn matches(&self, name: &str, metadata: &TaskMetadata) -> bool {
        self.name == name && &self.metadata == metadata
    }

    /// Publish the outcome; called with the registry lock held
    fn finish(&self, result: Result<serde_json::Value>) {
        let outcome = match result {
            Ok(value) => TaskOutcome::Success(value),
            Err(e) => TaskOutcome::Failure(TaskException::from(&e)),
        };
        if matches!(outcome, TaskOutcome::Success(_)) {
            self.set_progress(100);
        }
        *self.end_time.lock() = Some(Utc::now());
        self.outcome.send_replace(Some(outcome));
    }

    /// Snapshot for listings
    pub fn info(&self) -> TaskInfo {
        let end_time = *self.end_time.lock();
        let outcome = self.outcome();
        let duration = end_time
            .map(|end| (end - self.begin_time).num_milliseconds() as f64 / 1000.0);

        let (success, ret_value, exception) = match outcome {
            Some(TaskOutcome::Success(value)) => (Some(true), Some(value), None),
            Some(TaskOutcome::Failure(exc)) => (Some(false), None, Some(exc)),
            None => (None, None, None),
        };

        TaskInfo {
            name: self.name.clone(),
            metadata: self.metadata.clone(),
            begin_time: self.begin_time,
            end_time,
            duration,
            progress: self.progress(),
            success,
            ret_value,
            exception,
        }
    }
}

impl ProgressSink for Task {
    fn set_progress(&self, percent: u8) {
        self.progress.store(percent.min(100), Ordering::Relaxed);
    }
}

// =============================================================================
// Task Manager
// =============================================================================

#[derive(Default)]
struct TaskRegistry {
    executing: Vec<Arc<Task>>,
    finished: VecDeque<Arc<Task>>,
}

struct Inner {
    registry: RwLock<TaskRegistry>,
    max_finished: usize,
    shutdown: CancellationToken,
    running_gauge: Option<IntGauge>,
}

/// Registry of executing and finished tasks
#[derive(Clone)]
pub struct TaskManager {
    inner: Arc<Inner>,
}

impl TaskManager {
    /// Create a manager keeping at most `max_finished` finished tasks
    pub fn new(max_finished: usize) -> Self {
        Self::build(max_finished, None)
    }

    /// Export the number of executing tasks through a gauge
    pub fn with_running_gauge(max_finished: usize, gauge: IntGauge) -> Self {
        Self::build(max_finished, Some(gauge))
    }

    fn build(max_finished: usize, running_gauge: Option<IntGauge>) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry: RwLock::new(TaskRegistry::default()),
                max_finished,
                shutdown: CancellationToken::new(),
                running_gauge,
            }),
        }
    }

    /// Start a task unless one with the same name and metadata is executing.
    ///
    /// `f` receives the task (for progress reporting) and a cancellation
    /// token that fires on `shutdown` or `Task::cancel`.
    pub fn run<F, Fut>(&self, name: &str, metadata: TaskMetadata, f: F) -> Arc<Task>
    where
        F: FnOnce(Arc<Task>, CancellationToken) -> Fut,
        Fut: Future<Output = Result<serde_json::Value>> + Send + 'static,
    {
        let task = {
            let mut registry = self.inner.registry.write();
            if let Some(existing) = registry
                .executing
                .iter()
                .find(|t| t.matches(name, &metadata))
            {
                debug!("Task {} {:?} already executing", name, metadata);
                return existing.clone();
            }

            let task = Arc::new(Task::new(name, metadata, self.inner.shutdown.child_token()));
            registry.executing.push(task.clone());
            task
        };

        if let Some(gauge) = &self.inner.running_gauge {
            gauge.inc();
        }
        info!("Starting task {} {:?}", task.name, task.metadata);

        let fut = f(task.clone(), task.cancel.clone());
        let inner = self.inner.clone();
        let running = task.clone();
        tokio::spawn(async move {
            let result = match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => Err(Error::Internal(format!(
                    "task panicked: {}",
                    panic_message(panic.as_ref())
                ))),
            };
            if let Err(e) = &result {
                warn!("Task {} failed: {}", running.name, e);
            } else {
                info!("Task {} finished", running.name);
            }
            inner.complete(&running, result);
        });

        task
    }

    /// Executing and finished tasks, optionally filtered by name
    pub fn list(&self, name: Option<&str>) -> TaskSummary {
        let registry = self.inner.registry.read();
        let keep = |t: &&Arc<Task>| name.map_or(true, |n| t.name == n);

        TaskSummary {
            executing_tasks: registry.executing.iter().filter(keep).map(|t| t.info()).collect(),
            finished_tasks: registry.finished.iter().filter(keep).map(|t| t.info()).collect(),
        }
    }

    /// Number of executing tasks
    pub fn executing_count(&self) -> usize {
        self.inner.registry.read().executing.len()
    }

    /// Cancel every executing task
    pub fn shutdown(&self) {
        info!("Cancelling {} executing task(s)", self.executing_count());
        self.inner.shutdown.cancel();
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new(DEFAULT_FINISHED_HISTORY)
    }
}

impl Inner {
    /// Move a task from executing to finished and publish its outcome.
    ///
    /// Both happen under the registry lock so `run` never joins a task whose
    /// outcome is already visible.
    fn complete(&self, task: &Arc<Task>, result: Result<serde_json::Value>) {
        let mut registry = self.registry.write();
        registry.executing.retain(|t| !Arc::ptr_eq(t, task));
        task.finish(result);
        registry.finished.push_front(task.clone());
        registry.finished.truncate(self.max_finished);

        if let Some(gauge) = &self.running_gauge {
            gauge.dec();
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
