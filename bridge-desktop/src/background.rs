//! Background Task Execution Implementation

use async_trait::async_trait;
use bridge_traits::{
    background::{
        BackgroundExecutor, ExistingWorkPolicy, TaskConstraints, TaskId, TaskStatus,
        WorkContext, WorkHandler, WorkOutcome, WorkRequest,
    },
    error::{BridgeError, Result},
    network::NetworkMonitor,
};
use futures_util::FutureExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const DEFAULT_CONSTRAINT_POLL: Duration = Duration::from_secs(5);

/// Bookkeeping for the latest request of one work id.
struct WorkSlot {
    generation: u64,
    status: TaskStatus,
    cancel: CancellationToken,
}

#[derive(Clone)]
struct Shared {
    slots: Arc<Mutex<HashMap<String, WorkSlot>>>,
    /// One lock per work id so runs never overlap, even across replacements.
    run_locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
    network_monitor: Option<Arc<dyn NetworkMonitor>>,
    constraint_poll: Duration,
}

impl Shared {
    async fn set_status(&self, work_id: &str, generation: u64, status: TaskStatus) {
        let mut slots = self.slots.lock().await;
        if let Some(slot) = slots.get_mut(work_id) {
            if slot.generation == generation {
                slot.status = status;
            }
        }
    }

    async fn run_lock(&self, work_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.run_locks.lock().await;
        Arc::clone(
            locks
                .entry(work_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    async fn constraints_satisfied(&self, constraints: &TaskConstraints) -> bool {
        let Some(monitor) = &self.network_monitor else {
            return true;
        };

        match monitor.get_network_info().await {
            Ok(info) => info.satisfies(constraints.network),
            Err(err) => {
                warn!(error = %err, "Network monitor error; treating constraints as unmet");
                false
            }
        }
    }

    /// Sleep for `duration` unless `cancel` fires first. Returns `false` when cancelled.
    async fn pause(cancel: &CancellationToken, duration: Duration) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = sleep(duration) => true,
        }
    }

    async fn drive(
        self,
        request: WorkRequest,
        generation: u64,
        handler: WorkHandler,
        cancel: CancellationToken,
    ) {
        let work_id = request.work_id.clone();
        let mut attempt: u32 = 0;
        let mut delay = request.initial_delay;

        loop {
            if !Self::pause(&cancel, delay).await {
                debug!(work_id = %work_id, generation, "Pending work cancelled");
                return;
            }

            while !self.constraints_satisfied(&request.constraints).await {
                debug!(work_id = %work_id, "Constraints not satisfied; deferring run");
                if !Self::pause(&cancel, self.constraint_poll).await {
                    return;
                }
            }

            let run_lock = self.run_lock(&work_id).await;
            let _guard = tokio::select! {
                _ = cancel.cancelled() => return,
                guard = run_lock.lock() => guard,
            };
            if cancel.is_cancelled() {
                return;
            }

            self.set_status(&work_id, generation, TaskStatus::Running)
                .await;
            debug!(work_id = %work_id, attempt, "Running work");

            let ctx = WorkContext {
                work_id: work_id.clone(),
                run_attempt: attempt,
                cancellation: cancel.clone(),
            };
            let outcome = handler(ctx).await;

            if cancel.is_cancelled() {
                debug!(work_id = %work_id, ?outcome, "Run finished after replacement; outcome ignored");
                return;
            }

            match outcome {
                WorkOutcome::Success => {
                    self.set_status(&work_id, generation, TaskStatus::Completed)
                        .await;
                    return;
                }
                WorkOutcome::Failure => {
                    self.set_status(&work_id, generation, TaskStatus::Failed)
                        .await;
                    return;
                }
                WorkOutcome::Retry => {
                    attempt = attempt.saturating_add(1);
                    delay = request.backoff.delay_for_attempt(attempt);
                    info!(
                        work_id = %work_id,
                        attempt,
                        delay_secs = delay.as_secs(),
                        "Work requested retry"
                    );
                    self.set_status(&work_id, generation, TaskStatus::Scheduled)
                        .await;
                }
            }
        }
    }
}

/// Tokio-based job substrate for desktop.
///
/// Each work id has at most one live request. Replacing a pending request
/// cancels it before it runs; replacing a running one signals its
/// cancellation token and starts the replacement once the run returns.
pub struct TokioBackgroundExecutor {
    shared: Shared,
    handlers: RwLock<HashMap<String, WorkHandler>>,
}

impl TokioBackgroundExecutor {
    /// Create a new background executor with no network monitoring.
    pub fn new() -> Self {
        Self::with_network_monitor(None)
    }

    /// Create a background executor with an optional network monitor.
    pub fn with_network_monitor(monitor: Option<Arc<dyn NetworkMonitor>>) -> Self {
        Self {
            shared: Shared {
                slots: Arc::new(Mutex::new(HashMap::new())),
                run_locks: Arc::new(Mutex::new(HashMap::new())),
                network_monitor: monitor,
                constraint_poll: DEFAULT_CONSTRAINT_POLL,
            },
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// How often unmet network constraints are re-checked.
    pub fn with_constraint_poll_interval(mut self, interval: Duration) -> Self {
        self.shared.constraint_poll = interval;
        self
    }

    /// Register a handler from an async closure.
    pub async fn register_task_handler<F, Fut>(&self, work_id: &str, handler: F) -> Result<()>
    where
        F: Fn(WorkContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = WorkOutcome> + Send + 'static,
    {
        let handler: WorkHandler = Arc::new(move |ctx| handler(ctx).boxed());
        self.register_handler(work_id, handler).await
    }
}

impl Default for TokioBackgroundExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BackgroundExecutor for TokioBackgroundExecutor {
    async fn register_handler(&self, work_id: &str, handler: WorkHandler) -> Result<()> {
        let mut handlers = self.handlers.write().await;
        handlers.insert(work_id.to_string(), handler);
        Ok(())
    }

    async fn enqueue_unique_work(
        &self,
        request: WorkRequest,
        policy: ExistingWorkPolicy,
    ) -> Result<TaskId> {
        let work_id = request.work_id.clone();
        let handler = {
            let handlers = self.handlers.read().await;
            handlers.get(&work_id).cloned().ok_or_else(|| {
                BridgeError::OperationFailed(format!("No handler registered for work: {}", work_id))
            })?
        };

        let mut slots = self.shared.slots.lock().await;
        let mut generation = 0;
        if let Some(existing) = slots.get(&work_id) {
            let live = matches!(existing.status, TaskStatus::Scheduled | TaskStatus::Running);
            if live && policy == ExistingWorkPolicy::Keep {
                debug!(work_id = %work_id, "Keeping existing work");
                return Ok(TaskId::new(work_id));
            }
            if live {
                debug!(work_id = %work_id, status = ?existing.status, "Replacing existing work");
                existing.cancel.cancel();
            }
            generation = existing.generation.wrapping_add(1);
        }

        let cancel = CancellationToken::new();
        slots.insert(
            work_id.clone(),
            WorkSlot {
                generation,
                status: TaskStatus::Scheduled,
                cancel: cancel.clone(),
            },
        );
        drop(slots);

        debug!(
            work_id = %work_id,
            delay_ms = request.initial_delay.as_millis() as u64,
            network = ?request.constraints.network,
            "Enqueued unique work"
        );

        let shared = self.shared.clone();
        tokio::spawn(shared.drive(request, generation, handler, cancel));

        Ok(TaskId::new(work_id))
    }

    async fn cancel_task(&self, task_id: &TaskId) -> Result<()> {
        let mut slots = self.shared.slots.lock().await;
        let slot = slots
            .get_mut(&task_id.0)
            .ok_or_else(|| BridgeError::OperationFailed(format!("Task not found: {}", task_id)))?;

        slot.cancel.cancel();
        slot.status = TaskStatus::Cancelled;
        debug!(task_id = %task_id, "Cancelled task");
        Ok(())
    }

    async fn get_task_status(&self, task_id: &TaskId) -> Result<TaskStatus> {
        let slots = self.shared.slots.lock().await;
        slots
            .get(&task_id.0)
            .map(|slot| slot.status.clone())
            .ok_or_else(|| BridgeError::OperationFailed(format!("Task not found: {}", task_id)))
    }
}
