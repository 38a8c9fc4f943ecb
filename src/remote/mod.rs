pub mod eta;
pub mod scripted;
mod task;
mod waiter;

pub use eta::{Estimate, estimate};
pub use scripted::ScriptedSource;
pub use task::{RemoteTask, SourceError, TaskSource, TaskState};
pub use waiter::{
    ProgressReporter, ProgressSnapshot, RemoteTaskWaiter, RetryPolicy, Silent, TaskWait,
    WaitError, WaitOptions, WaitSummary,
};
