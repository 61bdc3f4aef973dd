//! # mm-queue
//!
//! Bounded-concurrency FIFO task queue used by mediamill to cap how many
//! external conversions run at once.

pub mod queue;
pub mod task;

pub use queue::{QueueStats, TaskQueue};
pub use task::{TaskHandle, TaskId, TaskState};
