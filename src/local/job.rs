use std::any::Any;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::env::{ExecutionEnvironment, Parameters};

/// Handle to a job submitted to a [`LocalJobRunner`](super::LocalJobRunner).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(Uuid);

impl JobId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How an [`ErrorRecord`] came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// The unit of work returned `Err`.
    Failed,
    /// The unit of work panicked.
    Panicked,
    /// The unit of work wrote the record itself and kept going.
    Reported,
    /// The job never ran because the worker pool was released first.
    Cancelled,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Failed => write!(f, "Failed"),
            ErrorCategory::Panicked => write!(f, "Panicked"),
            ErrorCategory::Reported => write!(f, "Reported"),
            ErrorCategory::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// A structured error captured from a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub message: String,
    pub category: ErrorCategory,
    /// The object the error is about, when the job names one.
    pub target: Option<String>,
    /// Underlying causes, outermost first, not including `message`.
    pub causes: Vec<String>,
}

impl ErrorRecord {
    /// A record written explicitly by a job.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            category: ErrorCategory::Reported,
            target: None,
            causes: Vec::new(),
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub(crate) fn from_failure(err: &anyhow::Error) -> Self {
        Self {
            message: err.to_string(),
            category: ErrorCategory::Failed,
            target: None,
            causes: err.chain().skip(1).map(ToString::to_string).collect(),
        }
    }

    pub(crate) fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "job panicked".to_string()
        };
        Self {
            message,
            category: ErrorCategory::Panicked,
            target: None,
            causes: Vec::new(),
        }
    }

    pub(crate) fn cancelled() -> Self {
        Self {
            message: "worker pool was released before the job started".to_string(),
            category: ErrorCategory::Cancelled,
            target: None,
            causes: Vec::new(),
        }
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            Some(target) => write!(f, "[{}] {target}: {}", self.category, self.message),
            None => write!(f, "[{}] {}", self.category, self.message),
        }
    }
}

/// The captured outcome of one finished job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub id: JobId,
    pub output: Vec<Value>,
    pub errors: Vec<ErrorRecord>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: i64,
}

impl JobResult {
    pub(crate) fn from_context(id: JobId, ctx: JobContext, started_at: DateTime<Utc>) -> Self {
        let completed_at = Utc::now();
        Self {
            id,
            output: ctx.output,
            errors: ctx.errors,
            started_at,
            completed_at,
            duration_ms: (completed_at - started_at).num_milliseconds(),
        }
    }

    /// A result for a job that produced nothing but a single error.
    pub(crate) fn failed(id: JobId, error: ErrorRecord) -> Self {
        let now = Utc::now();
        Self {
            id,
            output: Vec::new(),
            errors: vec![error],
            started_at: now,
            completed_at: now,
            duration_ms: 0,
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// What a unit of work sees while it runs.
///
/// Parameters and the shared environment are read-only. Output and error
/// records are appended in the order the job writes them.
pub struct JobContext {
    params: Parameters,
    env: Arc<ExecutionEnvironment>,
    output: Vec<Value>,
    errors: Vec<ErrorRecord>,
}

impl JobContext {
    pub(crate) fn new(params: Parameters, env: Arc<ExecutionEnvironment>) -> Self {
        Self {
            params,
            env,
            output: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    pub fn env(&self) -> &ExecutionEnvironment {
        &self.env
    }

    pub fn write_output(&mut self, value: impl Into<Value>) {
        self.output.push(value.into());
    }

    pub fn write_error(&mut self, record: ErrorRecord) {
        self.errors.push(record);
    }

    pub(crate) fn record_failure(&mut self, err: &anyhow::Error) {
        self.errors.push(ErrorRecord::from_failure(err));
    }

    pub(crate) fn record_panic(&mut self, payload: &(dyn Any + Send)) {
        self.errors.push(ErrorRecord::from_panic(payload));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn failure_record_keeps_cause_chain() {
        let err = Err::<(), _>(anyhow::anyhow!("connection refused"))
            .context("loading camera list")
            .unwrap_err();
        let record = ErrorRecord::from_failure(&err);
        assert_eq!(record.message, "loading camera list");
        assert_eq!(record.causes, vec!["connection refused".to_string()]);
        assert_eq!(record.category, ErrorCategory::Failed);
    }

    #[test]
    fn panic_record_reads_str_and_string_payloads() {
        let from_str = ErrorRecord::from_panic(&"kaboom");
        assert_eq!(from_str.message, "kaboom");
        assert_eq!(from_str.category, ErrorCategory::Panicked);

        let from_string = ErrorRecord::from_panic(&String::from("index out of range"));
        assert_eq!(from_string.message, "index out of range");

        let opaque = ErrorRecord::from_panic(&42u32);
        assert_eq!(opaque.message, "job panicked");
    }

    #[test]
    fn error_record_display() {
        let record = ErrorRecord::new("disk full").with_target("recorder-1");
        assert_eq!(record.to_string(), "[Reported] recorder-1: disk full");
        assert_eq!(ErrorRecord::cancelled().category.to_string(), "Cancelled");
    }

    #[test]
    fn context_collects_in_write_order() {
        let mut ctx = JobContext::new(Parameters::new(), Arc::new(ExecutionEnvironment::default()));
        ctx.write_output(1);
        ctx.write_error(ErrorRecord::new("first"));
        ctx.write_output("two");
        let started = Utc::now();
        let result = JobResult::from_context(JobId::new(), ctx, started);
        assert_eq!(result.output, vec![Value::from(1), Value::from("two")]);
        assert_eq!(result.errors.len(), 1);
        assert!(result.has_errors());
        assert!(result.duration_ms >= 0);
    }
}
