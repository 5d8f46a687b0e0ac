//! The upload lock.
//!
//! One [`UploadLock`] guards every read-modify-clear sequence around a
//! remote upload, the first-sync seeding and any enqueue that is followed by
//! a sync trigger. Fetches are not guarded.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::error::Result;

/// How [`UploadLock::execute_locked`] ran its task.
#[derive(Debug)]
pub enum LockedRun {
    /// The lock was free; the task ran on the caller.
    Inline,
    /// The lock was held; the task was spawned and waits for it.
    HandedOff(JoinHandle<()>),
}

impl LockedRun {
    /// Wait for a handed-off task. No-op for inline runs.
    pub async fn join(self) {
        if let LockedRun::HandedOff(handle) = self {
            if let Err(e) = handle.await {
                error!(error = %e, "Handed-off locked task panicked");
            }
        }
    }
}

#[derive(Clone, Default)]
pub struct UploadLock {
    inner: Arc<Mutex<()>>,
}

impl UploadLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self) -> OwnedMutexGuard<()> {
        self.inner.clone().lock_owned().await
    }

    pub fn is_locked(&self) -> bool {
        self.inner.try_lock().is_err()
    }

    /// Run `task` under the lock without ever blocking the caller.
    ///
    /// Uncontended: runs inline and returns its result. Contended: the task
    /// is spawned onto the runtime, acquires the lock there, and its error,
    /// if any, is logged.
    pub async fn execute_locked<F, Fut>(&self, label: &'static str, task: F) -> Result<LockedRun>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        match self.inner.clone().try_lock_owned() {
            Ok(_guard) => {
                task().await?;
                Ok(LockedRun::Inline)
            }
            Err(_) => {
                debug!(task = label, "Upload lock busy, handing off");
                let lock = self.inner.clone();
                let handle = tokio::spawn(async move {
                    let _guard = lock.lock_owned().await;
                    if let Err(e) = task().await {
                        error!(task = label, error = %e, "Locked task failed");
                    }
                });
                Ok(LockedRun::HandedOff(handle))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_runs_inline_when_free() {
        let lock = UploadLock::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let c = counter.clone();
        let run = lock
            .execute_locked("count", move || async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap();

        assert!(matches!(run, LockedRun::Inline));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(!lock.is_locked());
    }

    #[tokio::test]
    async fn test_inline_error_is_returned() {
        let lock = UploadLock::new();
        let result = lock
            .execute_locked("fail", || async { Err(SyncError::NoProvider) })
            .await;
        assert!(matches!(result, Err(SyncError::NoProvider)));
    }

    #[tokio::test]
    async fn test_hands_off_when_contended() {
        let lock = UploadLock::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let guard = lock.acquire().await;

        let c = counter.clone();
        let run = lock
            .execute_locked("count", move || async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap();

        assert!(matches!(run, LockedRun::HandedOff(_)));
        tokio::task::yield_now().await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        drop(guard);
        run.join().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
