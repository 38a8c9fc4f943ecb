mod env;
mod job;
mod runner;

pub use env::{ExecutionEnvironment, Parameters};
pub use job::{ErrorCategory, ErrorRecord, JobContext, JobId, JobResult};
pub use runner::{LocalJobRunner, RunnerOptions};
