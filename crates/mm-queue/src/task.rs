//! Task identity, lifecycle state and the caller-side handle.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::oneshot;

use mm_core::{Error, Result};

/// Strictly increasing task identifier, starting at 1.
pub type TaskId = u64;

/// Lifecycle of a queued task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Queued,
    Running,
    Completed,
    Failed,
}

impl TaskState {
    /// Whether the task has settled.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }
}

pub(crate) type SharedState = Arc<Mutex<TaskState>>;

/// Caller's view of an enqueued task. Await it for the task's result.
///
/// Dropping the handle does not cancel the task; it still runs to
/// completion and is counted in the queue's statistics.
#[derive(Debug)]
pub struct TaskHandle<T> {
    id: TaskId,
    state: SharedState,
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> TaskHandle<T> {
    pub(crate) fn new(id: TaskId, state: SharedState, rx: oneshot::Receiver<Result<T>>) -> Self {
        Self { id, state, rx }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TaskState {
        *self.state.lock()
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(Error::Internal(format!(
                "task {} dropped its result",
                this.id
            )))),
            Poll::Pending => Poll::Pending,
        }
    }
}
