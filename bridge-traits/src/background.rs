//! Background Execution and Job Scheduling
//!
//! Abstracts the job substrate that runs deferred work under network
//! constraints, collapses duplicate requests for the same job identity and
//! retries failed runs with backoff.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Network condition a job requires before it may start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NetworkRequirement {
    /// Runs regardless of connectivity.
    None,
    /// Any connected network.
    #[default]
    Connected,
    /// Connected and not metered.
    Unmetered,
}

/// Task execution constraints
#[derive(Debug, Clone, Default)]
pub struct TaskConstraints {
    pub network: NetworkRequirement,
}

impl TaskConstraints {
    pub fn connected() -> Self {
        Self {
            network: NetworkRequirement::Connected,
        }
    }

    pub fn unmetered() -> Self {
        Self {
            network: NetworkRequirement::Unmetered,
        }
    }
}

/// Exponential backoff applied between retried runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
}

impl BackoffPolicy {
    pub fn exponential(initial: Duration, max: Duration) -> Self {
        Self { initial, max }
    }

    /// Delay before the `attempt`-th retry (1-based): `initial * 2^(attempt - 1)`,
    /// capped at `max`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let shift = (attempt - 1).min(31);
        self.initial
            .checked_mul(1u32 << shift)
            .map(|delay| delay.min(self.max))
            .unwrap_or(self.max)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(10 * 60),
            max: Duration::from_secs(5 * 60 * 60),
        }
    }
}

/// What to do when work with the same identity is already pending or running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistingWorkPolicy {
    /// Cancel the existing request and enqueue the new one.
    Replace,
    /// Keep the existing request and drop the new one.
    Keep,
}

/// A one-shot unit of deferred work.
#[derive(Debug, Clone)]
pub struct WorkRequest {
    pub work_id: String,
    pub initial_delay: Duration,
    pub constraints: TaskConstraints,
    pub backoff: BackoffPolicy,
}

impl WorkRequest {
    pub fn new(work_id: impl Into<String>) -> Self {
        Self {
            work_id: work_id.into(),
            initial_delay: Duration::ZERO,
            constraints: TaskConstraints::default(),
            backoff: BackoffPolicy::default(),
        }
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_constraints(mut self, constraints: TaskConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }
}

/// Scheduled task identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Task execution status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    /// Task is scheduled but not yet running
    Scheduled,
    /// Task is currently executing
    Running,
    /// Task completed successfully
    Completed,
    /// Task failed and will not be retried
    Failed,
    /// Task was cancelled
    Cancelled,
}

/// Per-run context handed to a work handler.
#[derive(Debug, Clone)]
pub struct WorkContext {
    pub work_id: String,
    /// Zero on the first run, incremented on every retry.
    pub run_attempt: u32,
    pub cancellation: CancellationToken,
}

impl WorkContext {
    pub fn new(work_id: impl Into<String>, run_attempt: u32) -> Self {
        Self {
            work_id: work_id.into(),
            run_attempt,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// Result reported by a work handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkOutcome {
    Success,
    /// Run again after the request's backoff delay.
    Retry,
    Failure,
}

pub type WorkHandler = Arc<dyn Fn(WorkContext) -> BoxFuture<'static, WorkOutcome> + Send + Sync>;

/// Background job substrate
///
/// Abstracts platform-specific deferred execution:
/// - **Android**: WorkManager unique work
/// - **iOS**: BGTaskScheduler
/// - **Desktop**: in-process Tokio executor
///
/// Implementations guarantee that runs of the same work id never overlap.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::background::{BackgroundExecutor, ExistingWorkPolicy, TaskConstraints, WorkRequest};
/// use std::time::Duration;
///
/// async fn schedule_sync(executor: &dyn BackgroundExecutor) -> Result<()> {
///     let request = WorkRequest::new("podsync.sync")
///         .with_initial_delay(Duration::from_secs(5))
///         .with_constraints(TaskConstraints::unmetered());
///     executor.enqueue_unique_work(request, ExistingWorkPolicy::Replace).await?;
///     Ok(())
/// }
/// ```
#[async_trait::async_trait]
pub trait BackgroundExecutor: Send + Sync {
    /// Register the handler invoked for every run of `work_id`.
    async fn register_handler(&self, work_id: &str, handler: WorkHandler) -> Result<()>;

    /// Enqueue one-shot work, resolving clashes with `policy`.
    async fn enqueue_unique_work(
        &self,
        request: WorkRequest,
        policy: ExistingWorkPolicy,
    ) -> Result<TaskId>;

    /// Cancel a scheduled task
    async fn cancel_task(&self, task_id: &TaskId) -> Result<()>;

    /// Get status of a task
    async fn get_task_status(&self, task_id: &TaskId) -> Result<TaskStatus>;

    /// Check if background execution is available
    async fn is_available(&self) -> bool {
        true
    }
}
