use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle state reported by a remote task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
    Idle,
    InProgress,
    Success,
    Error,
    Completed,
    Unknown,
}

impl TaskState {
    /// `Success`, `Error` and `Completed` never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Success | TaskState::Error | TaskState::Completed)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Idle => write!(f, "Idle"),
            TaskState::InProgress => write!(f, "InProgress"),
            TaskState::Success => write!(f, "Success"),
            TaskState::Error => write!(f, "Error"),
            TaskState::Completed => write!(f, "Completed"),
            TaskState::Unknown => write!(f, "Unknown"),
        }
    }
}

impl FromStr for TaskState {
    type Err = std::convert::Infallible;

    /// Case-insensitive; anything unrecognised is `Unknown`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let state = match s.trim().to_ascii_lowercase().as_str() {
            "idle" => TaskState::Idle,
            "inprogress" | "in_progress" | "in progress" => TaskState::InProgress,
            "success" => TaskState::Success,
            "error" => TaskState::Error,
            "completed" => TaskState::Completed,
            _ => TaskState::Unknown,
        };
        Ok(state)
    }
}

/// Snapshot of a server-side asynchronous operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTask {
    pub path: String,
    pub state: TaskState,
    /// Percent complete, 0 through 100.
    pub progress: u8,
    pub error_code: Option<String>,
    pub error_text: Option<String>,
    pub output_path: Option<String>,
    /// Whether the remote object can be asked to clean itself up.
    pub can_cleanup: bool,
}

impl RemoteTask {
    pub fn new(path: impl Into<String>, state: TaskState, progress: u8) -> Self {
        Self {
            path: path.into(),
            state,
            progress: progress.min(100),
            error_code: None,
            error_text: None,
            output_path: None,
            can_cleanup: false,
        }
    }

    pub fn with_error(mut self, code: impl Into<String>, text: impl Into<String>) -> Self {
        self.error_code = Some(code.into());
        self.error_text = Some(text.into());
        self
    }

    pub fn with_output_path(mut self, path: impl Into<String>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    pub fn with_cleanup(mut self, can_cleanup: bool) -> Self {
        self.can_cleanup = can_cleanup;
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn failed(&self) -> bool {
        self.state == TaskState::Error
    }
}

/// Errors a [`TaskSource`] can report for a single request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("no task found at {0}")]
    NotFound(String),

    #[error("{path} is a {kind}, not a task")]
    NotATask { path: String, kind: String },

    #[error("communication failure: {0}")]
    Communication(String),
}

impl SourceError {
    /// Communication failures may clear up on their own; resolution failures
    /// will not.
    pub fn is_transient(&self) -> bool {
        matches!(self, SourceError::Communication(_))
    }
}

/// The remote system that owns the tasks being waited on.
#[allow(async_fn_in_trait)]
pub trait TaskSource {
    /// Resolves `path` and reads the task's current state.
    async fn fetch(&self, path: &str) -> Result<RemoteTask, SourceError>;

    /// Asks the remote system to discard a finished task. Must be idempotent.
    async fn cleanup(&self, path: &str) -> Result<(), SourceError>;

    /// Re-establishes the connection after a communication failure.
    async fn reconnect(&self) -> Result<(), SourceError> {
        Ok(())
    }
}

impl<T: TaskSource> TaskSource for &T {
    async fn fetch(&self, path: &str) -> Result<RemoteTask, SourceError> {
        (**self).fetch(path).await
    }

    async fn cleanup(&self, path: &str) -> Result<(), SourceError> {
        (**self).cleanup(path).await
    }

    async fn reconnect(&self) -> Result<(), SourceError> {
        (**self).reconnect().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(TaskState::Success.is_terminal());
        assert!(TaskState::Error.is_terminal());
        assert!(TaskState::Completed.is_terminal());
        assert!(!TaskState::Idle.is_terminal());
        assert!(!TaskState::InProgress.is_terminal());
        assert!(!TaskState::Unknown.is_terminal());
    }

    #[test]
    fn parse_state_is_lenient() {
        assert_eq!("Success".parse::<TaskState>().unwrap(), TaskState::Success);
        assert_eq!("INPROGRESS".parse::<TaskState>().unwrap(), TaskState::InProgress);
        assert_eq!(" completed ".parse::<TaskState>().unwrap(), TaskState::Completed);
        assert_eq!("paused".parse::<TaskState>().unwrap(), TaskState::Unknown);
    }

    #[test]
    fn progress_is_clamped() {
        let task = RemoteTask::new("Task[1]", TaskState::InProgress, 250);
        assert_eq!(task.progress, 100);
    }

    #[test]
    fn error_task_is_failed() {
        let task = RemoteTask::new("Task[2]", TaskState::Error, 40).with_error("0x12", "license expired");
        assert!(task.is_terminal());
        assert!(task.failed());
        assert_eq!(task.error_text.as_deref(), Some("license expired"));
    }

    #[test]
    fn source_error_classification() {
        assert!(SourceError::Communication("reset".into()).is_transient());
        assert!(!SourceError::NotFound("Task[9]".into()).is_transient());
        let err = SourceError::NotATask {
            path: "Camera[4]".into(),
            kind: "Camera".into(),
        };
        assert_eq!(err.to_string(), "Camera[4] is a Camera, not a task");
    }
}
