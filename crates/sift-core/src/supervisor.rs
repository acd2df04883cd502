//! Supervision of detached, webhook-bound scrapes.
//!
//! Every task is tracked from spawn until it settles and is dropped from the
//! live set the moment it does, so memory is bounded by in-flight work.
//! Shutdown cancels a shared token that every task body races against, then
//! waits on the tracker until all of them have settled.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use crate::error::{AppError, ScrapeError};

/// Lifecycle state of a background task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Running => "running",
            TaskState::Succeeded => "succeeded",
            TaskState::Failed => "failed",
            TaskState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Failed | TaskState::Cancelled
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Returned to the caller as soon as a task is scheduled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskHandle {
    pub task_id: Uuid,
    pub webhook: String,
}

/// Point-in-time view of a live task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskSnapshot {
    pub task_id: Uuid,
    pub url: String,
    pub webhook: String,
    pub state: TaskState,
    pub submitted_at: DateTime<Utc>,
}

/// Events emitted by the supervisor for monitoring/logging.
#[derive(Debug, Clone)]
pub enum TaskEvent<'a> {
    Spawned {
        task_id: Uuid,
        url: &'a str,
        webhook: &'a str,
    },
    Started {
        task_id: Uuid,
    },
    Settled {
        task_id: Uuid,
        state: TaskState,
        error: Option<&'a str>,
    },
    ShuttingDown {
        active: usize,
    },
    Drained,
}

/// Trait for receiving task events (decoupled logging).
pub trait TaskReporter: Send + Sync {
    fn report(&self, event: TaskEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTaskReporter;

impl TaskReporter for TracingTaskReporter {
    fn report(&self, event: TaskEvent<'_>) {
        match event {
            TaskEvent::Spawned {
                task_id,
                url,
                webhook,
            } => {
                tracing::info!(%task_id, %url, %webhook, "Background task scheduled");
            }
            TaskEvent::Started { task_id } => {
                tracing::debug!(%task_id, "Background task running");
            }
            TaskEvent::Settled {
                task_id,
                state,
                error,
            } => match error {
                Some(error) => tracing::warn!(%task_id, %state, %error, "Background task settled"),
                None => tracing::info!(%task_id, %state, "Background task settled"),
            },
            TaskEvent::ShuttingDown { active } => {
                tracing::info!(active, "Cancelling background tasks");
            }
            TaskEvent::Drained => {
                tracing::info!("All background tasks settled");
            }
        }
    }
}

/// Owns the live set of background tasks.
#[derive(Clone)]
pub struct TaskSupervisor {
    tracker: TaskTracker,
    cancel_token: CancellationToken,
    tasks: Arc<Mutex<HashMap<Uuid, TaskSnapshot>>>,
    reporter: Arc<dyn TaskReporter>,
}

impl Default for TaskSupervisor {
    fn default() -> Self {
        Self::new(Arc::new(TracingTaskReporter))
    }
}

impl TaskSupervisor {
    pub fn new(reporter: Arc<dyn TaskReporter>) -> Self {
        Self {
            tracker: TaskTracker::new(),
            cancel_token: CancellationToken::new(),
            tasks: Arc::new(Mutex::new(HashMap::new())),
            reporter,
        }
    }

    /// Schedules `work` as a detached task and returns its handle at once.
    ///
    /// The task settles as Succeeded or Failed from the outcome of `work`, or
    /// as Cancelled if shutdown begins first, in which case `work` is dropped
    /// wherever it was suspended.
    pub fn spawn<F>(&self, url: &str, webhook: &str, work: F) -> Result<TaskHandle, AppError>
    where
        F: Future<Output = Result<(), ScrapeError>> + Send + 'static,
    {
        let task_id = Uuid::new_v4();
        {
            // Shutdown cancels under this lock, so a task is either rejected
            // here or registered with the tracker before the drain starts.
            let mut tasks = self.lock_tasks();
            if self.cancel_token.is_cancelled() {
                return Err(AppError::Generic("task supervisor is shutting down".into()));
            }
            tasks.insert(
                task_id,
                TaskSnapshot {
                    task_id,
                    url: url.to_string(),
                    webhook: webhook.to_string(),
                    state: TaskState::Pending,
                    submitted_at: Utc::now(),
                },
            );
            self.reporter.report(TaskEvent::Spawned {
                task_id,
                url,
                webhook,
            });

            let supervisor = self.clone();
            self.tracker.spawn(async move {
                supervisor.mark_running(task_id);

                let (state, error) = tokio::select! {
                    biased;
                    () = supervisor.cancel_token.cancelled() => (TaskState::Cancelled, None),
                    outcome = AssertUnwindSafe(work).catch_unwind() => match outcome {
                        Ok(Ok(())) => (TaskState::Succeeded, None),
                        Ok(Err(e)) => (TaskState::Failed, Some(e.to_string())),
                        Err(panic) => (TaskState::Failed, Some(panic_message(panic.as_ref()))),
                    },
                };

                supervisor.settle(task_id, state, error.as_deref());
            });
        }

        Ok(TaskHandle {
            task_id,
            webhook: webhook.to_string(),
        })
    }

    /// State of a live task. Settled tasks are no longer tracked.
    pub fn state(&self, task_id: Uuid) -> Option<TaskState> {
        self.lock_tasks().get(&task_id).map(|task| task.state)
    }

    pub fn snapshot(&self, task_id: Uuid) -> Option<TaskSnapshot> {
        self.lock_tasks().get(&task_id).cloned()
    }

    pub fn active_count(&self) -> usize {
        self.lock_tasks().len()
    }

    /// Cancels every outstanding task and returns once all have settled.
    pub async fn shutdown(&self) {
        {
            let tasks = self.lock_tasks();
            self.reporter.report(TaskEvent::ShuttingDown { active: tasks.len() });
            self.cancel_token.cancel();
            self.tracker.close();
        }
        self.tracker.wait().await;
        self.reporter.report(TaskEvent::Drained);
    }

    fn mark_running(&self, task_id: Uuid) {
        if let Some(task) = self.lock_tasks().get_mut(&task_id) {
            task.state = TaskState::Running;
        }
        self.reporter.report(TaskEvent::Started { task_id });
    }

    fn settle(&self, task_id: Uuid, state: TaskState, error: Option<&str>) {
        debug_assert!(state.is_terminal());
        self.lock_tasks().remove(&task_id);
        self.reporter.report(TaskEvent::Settled {
            task_id,
            state,
            error,
        });
    }

    fn lock_tasks(&self) -> MutexGuard<'_, HashMap<Uuid, TaskSnapshot>> {
        self.tasks.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Recovered from poisoned task registry");
            poisoned.into_inner()
        })
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string payload");
    format!("task panicked: {detail}")
}
