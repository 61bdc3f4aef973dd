//! Bounded-concurrency FIFO task queue.
//!
//! The [`TaskQueue`] runs at most `capacity` tasks at once. Extra submissions
//! wait in a FIFO pending list and are admitted, oldest first, as running
//! tasks settle. A task's work closure is not invoked until it is admitted.
//!
//! # Example
//!
//! ```rust,ignore
//! let queue = TaskQueue::new(4)?;
//! let handle = queue.enqueue(|| async { convert(input).await })?;
//! let output = handle.await?;
//! ```

use std::any::Any;
use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{info, warn};

use mm_core::config::QueueConfig;
use mm_core::{Error, Result};

use crate::task::{SharedState, TaskHandle, TaskId, TaskState};

/// Snapshot of queue counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Tasks accepted since the queue was created.
    pub total: u64,
    pub completed: u64,
    pub failed: u64,
    pub running: usize,
    pub queued: usize,
}

/// What a settled job hands back to the queue: its outcome, and a closure
/// that delivers the result to the caller once counters are updated.
struct Settled {
    ok: bool,
    deliver: Box<dyn FnOnce() + Send>,
}

type Job = Box<dyn FnOnce() -> BoxFuture<'static, Settled> + Send>;

struct Pending {
    id: TaskId,
    job: Job,
    state: SharedState,
}

#[derive(Default)]
struct QueueState {
    running: usize,
    pending: VecDeque<Pending>,
    submitted: u64,
    completed: u64,
    failed: u64,
}

struct Inner {
    capacity: usize,
    max_pending: Option<usize>,
    state: Mutex<QueueState>,
}

/// Handle to a bounded task queue. Cloning shares the same queue.
///
/// Enqueueing spawns onto the current Tokio runtime, so it must be called
/// from within one.
#[derive(Clone)]
pub struct TaskQueue {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("capacity", &self.inner.capacity)
            .field("max_pending", &self.inner.max_pending)
            .field("stats", &self.stats())
            .finish()
    }
}

impl TaskQueue {
    /// Create an unbounded queue running at most `capacity` tasks at once.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfiguration`] if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self> {
        Self::with_limits(capacity, None)
    }

    /// Create a queue that also rejects submissions with
    /// [`Error::QueueFull`] once `max_pending` tasks are waiting.
    pub fn with_limits(capacity: usize, max_pending: Option<usize>) -> Result<Self> {
        if capacity < 1 {
            return Err(Error::InvalidConfiguration(
                "concurrency must be a positive integer".into(),
            ));
        }
        if max_pending == Some(0) {
            return Err(Error::InvalidConfiguration(
                "max_pending must be at least 1 when set".into(),
            ));
        }
        Ok(Self {
            inner: Arc::new(Inner {
                capacity,
                max_pending,
                state: Mutex::new(QueueState::default()),
            }),
        })
    }

    /// Create a queue from the `[queue]` config section.
    pub fn from_config(config: &QueueConfig) -> Result<Self> {
        Self::with_limits(config.concurrency, config.max_pending)
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Submit work. `work` is invoked once, when the task is admitted.
    ///
    /// A panic inside the work is caught and reported as
    /// [`Error::Internal`] through the handle; it never affects other tasks.
    ///
    /// # Errors
    ///
    /// [`Error::QueueFull`] when the pending list is at its bound.
    pub fn enqueue<F, Fut, T>(&self, work: F) -> Result<TaskHandle<T>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let state: SharedState = Arc::new(Mutex::new(TaskState::Queued));

        let id = {
            let mut st = self.inner.state.lock();
            if let Some(limit) = self.inner.max_pending {
                if st.running >= self.inner.capacity && st.pending.len() >= limit {
                    warn!(
                        pending = st.pending.len(),
                        limit, "Queue full; rejecting task"
                    );
                    return Err(Error::QueueFull {
                        pending: st.pending.len(),
                        limit,
                    });
                }
            }

            st.submitted += 1;
            let id = st.submitted;

            let job: Job = Box::new(move || {
                async move {
                    let result = match AssertUnwindSafe(async move { work().await })
                        .catch_unwind()
                        .await
                    {
                        Ok(result) => result,
                        Err(panic) => Err(Error::Internal(format!(
                            "task {id} panicked: {}",
                            panic_message(panic.as_ref())
                        ))),
                    };
                    if let Err(ref e) = result {
                        warn!(task_id = id, error = %e, "Task failed");
                    }
                    Settled {
                        ok: result.is_ok(),
                        deliver: Box::new(move || {
                            // The caller may have dropped its handle.
                            let _ = tx.send(result);
                        }),
                    }
                }
                .boxed()
            });

            st.pending.push_back(Pending {
                id,
                job,
                state: state.clone(),
            });
            info!(
                task_id = id,
                queued = st.pending.len(),
                running = st.running,
                "Task enqueued"
            );
            id
        };

        self.inner.pump();
        Ok(TaskHandle::new(id, state, rx))
    }

    /// Current counters.
    pub fn stats(&self) -> QueueStats {
        let st = self.inner.state.lock();
        QueueStats {
            total: st.submitted,
            completed: st.completed,
            failed: st.failed,
            running: st.running,
            queued: st.pending.len(),
        }
    }
}

impl Inner {
    /// Admit pending tasks, oldest first, while slots are free.
    fn pump(self: &Arc<Self>) {
        loop {
            let task = {
                let mut st = self.state.lock();
                if st.running >= self.capacity {
                    return;
                }
                let Some(task) = st.pending.pop_front() else {
                    return;
                };
                st.running += 1;
                info!(
                    task_id = task.id,
                    running = st.running,
                    capacity = self.capacity,
                    "Task started"
                );
                task
            };

            *task.state.lock() = TaskState::Running;
            tokio::spawn(self.clone().run(task));
        }
    }

    async fn run(self: Arc<Self>, task: Pending) {
        let Pending { id, job, state } = task;
        let settled = job().await;

        {
            let mut st = self.state.lock();
            st.running -= 1;
            if settled.ok {
                st.completed += 1;
                info!(task_id = id, completed = st.completed, "Task completed");
            } else {
                st.failed += 1;
            }
        }

        *state.lock() = if settled.ok {
            TaskState::Completed
        } else {
            TaskState::Failed
        };
        (settled.deliver)();
        self.pump();
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
