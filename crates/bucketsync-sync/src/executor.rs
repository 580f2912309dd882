//! Bounded executor - spawns tasks behind a fixed pool of permits
//!
//! ```text
//!   producer ──submit()──► [semaphore: capacity permits] ──spawn──► tokio task
//!      ▲                                                              │
//!      └────────── permit released when the task ends ◄───────────────┘
//! ```
//!
//! `submit` waits for a permit before spawning, so at most `capacity` tasks
//! exist at any time and the producer cannot run arbitrarily far ahead of
//! the workers. The permit is moved into the spawned task and dropped when
//! the task finishes, fails, panics or is cancelled.
//!
//! Task failures are recorded and never propagated to the producer; query
//! them with [`BoundedExecutor::failures`] after [`BoundedExecutor::shutdown`].

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};

use futures::FutureExt;
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

use crate::SyncError;

/// A task that returned an error or panicked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    /// Label given at submission
    pub label: String,
    /// Error chain or panic message
    pub message: String,
}

/// Permit-bounded task spawner
#[derive(Debug)]
pub struct BoundedExecutor {
    semaphore: Arc<Semaphore>,
    capacity: u32,
    failures: Arc<Mutex<Vec<TaskFailure>>>,
}

impl BoundedExecutor {
    /// Creates an executor allowing `capacity` tasks at once (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = u32::try_from(capacity.max(1)).unwrap_or(u32::MAX);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity as usize)),
            capacity,
            failures: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    /// Permits currently free
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Tasks currently holding a permit
    pub fn in_flight(&self) -> usize {
        self.capacity().saturating_sub(self.available_permits())
    }

    /// Waits for a permit, then spawns `task` on the current runtime
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// [`SyncError::ExecutorShutDown`] once [`shutdown`](Self::shutdown) has run.
    pub async fn submit<F>(&self, label: impl Into<String>, task: F) -> Result<(), SyncError>
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let label = label.into();
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| SyncError::ExecutorShutDown)?;
        let failures = Arc::clone(&self.failures);

        debug!(task = %label, "Spawning task");
        tokio::spawn(async move {
            let outcome = AssertUnwindSafe(task).catch_unwind().await;
            let failure = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(err)) => {
                    warn!(task = %label, error = %format!("{err:#}"), "Task failed");
                    Some(format!("{err:#}"))
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    error!(task = %label, panic = %message, "Task panicked");
                    Some(message)
                }
            };
            if let Some(message) = failure {
                failures
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(TaskFailure { label, message });
            }
            drop(permit);
        });

        Ok(())
    }

    /// Stops accepting tasks and waits until every spawned task has finished
    ///
    /// Calling it again is a no-op.
    pub async fn shutdown(&self) {
        match self.semaphore.acquire_many(self.capacity).await {
            Ok(all) => {
                self.semaphore.close();
                drop(all);
                debug!("Executor drained and shut down");
            }
            Err(_) => debug!("Executor already shut down"),
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.semaphore.is_closed()
    }

    /// Failures recorded so far
    pub fn failures(&self) -> Vec<TaskFailure> {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_string()
    }
}
