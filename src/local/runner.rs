use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::runtime::Handle;
use tokio::sync::{Semaphore, oneshot};
use tokio::task::JoinHandle;

use super::env::{ExecutionEnvironment, Parameters};
use super::job::{ErrorCategory, ErrorRecord, JobContext, JobId, JobResult};
use crate::error::JobyardError;

/// Construction options for a [`LocalJobRunner`].
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// Upper bound on jobs running at once. `None` uses the number of logical
    /// processors.
    pub max_pool_size: Option<usize>,
    /// How often [`LocalJobRunner::wait`] checks for completion.
    pub poll_interval: Duration,
    /// Modules every job starts with.
    pub modules: Vec<String>,
    /// Variables every job can read.
    pub variables: Parameters,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            max_pool_size: None,
            poll_interval: Duration::from_secs(1),
            modules: Vec::new(),
            variables: Parameters::new(),
        }
    }
}

fn default_pool_size() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

/// A submitted job the runner still owns.
struct WorkItem {
    handle: JoinHandle<()>,
    result_rx: oneshot::Receiver<JobResult>,
}

impl WorkItem {
    fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    fn into_result(mut self, id: JobId) -> JobResult {
        match self.result_rx.try_recv() {
            Ok(result) => result,
            Err(_) => JobResult::failed(
                id,
                ErrorRecord {
                    message: "job ended without producing a result".to_string(),
                    category: ErrorCategory::Failed,
                    target: None,
                    causes: Vec::new(),
                },
            ),
        }
    }
}

/// Runs independent jobs on a bounded worker pool and hands back their
/// results once they finish.
///
/// Jobs execute on tokio's blocking pool, gated by a semaphore with one permit
/// per worker slot, so at most `pool_size` of them run at once and the rest
/// queue. Bookkeeping takes `&mut self`: one caller orchestrates the runner
/// while the jobs themselves run concurrently.
pub struct LocalJobRunner {
    runtime: Handle,
    slots: Arc<Semaphore>,
    pool_size: usize,
    poll_interval: Duration,
    env: Arc<ExecutionEnvironment>,
    items: HashMap<JobId, WorkItem>,
}

impl LocalJobRunner {
    /// Creates a runner bound to the current tokio runtime.
    pub fn new(options: RunnerOptions) -> Result<Self, JobyardError> {
        let pool_size = match options.max_pool_size {
            Some(0) => {
                return Err(JobyardError::Config(
                    "max pool size must be at least 1".to_string(),
                ));
            }
            Some(n) => n,
            None => default_pool_size(),
        };
        if options.poll_interval.is_zero() {
            return Err(JobyardError::Config(
                "job poll interval must be greater than zero".to_string(),
            ));
        }
        let runtime = Handle::try_current()?;
        let env = ExecutionEnvironment::new(options.modules, options.variables);

        tracing::debug!(pool_size, modules = ?env.modules(), "created job runner");

        Ok(Self {
            runtime,
            slots: Arc::new(Semaphore::new(pool_size)),
            pool_size,
            poll_interval: options.poll_interval,
            env: Arc::new(env),
            items: HashMap::new(),
        })
    }

    pub fn with_defaults() -> Result<Self, JobyardError> {
        Self::new(RunnerOptions::default())
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn environment(&self) -> &ExecutionEnvironment {
        &self.env
    }

    /// Schedules `work` and returns immediately.
    ///
    /// Whatever the job does, including returning `Err` or panicking, ends up
    /// in its [`JobResult`]; nothing is reported here.
    pub fn add_job<F>(&mut self, work: F, params: Option<Parameters>) -> JobId
    where
        F: FnOnce(&mut JobContext) -> anyhow::Result<()> + Send + 'static,
    {
        let id = JobId::new();
        let (result_tx, result_rx) = oneshot::channel();
        let slots = Arc::clone(&self.slots);
        let ctx = JobContext::new(params.unwrap_or_default(), Arc::clone(&self.env));

        let handle = self.runtime.spawn(async move {
            let result = match slots.acquire_owned().await {
                Ok(_permit) => {
                    match tokio::task::spawn_blocking(move || execute(id, work, ctx)).await {
                        Ok(result) => result,
                        Err(e) => JobResult::failed(
                            id,
                            ErrorRecord {
                                message: format!("job worker failed: {e}"),
                                category: ErrorCategory::Failed,
                                target: None,
                                causes: Vec::new(),
                            },
                        ),
                    }
                }
                Err(_) => JobResult::failed(id, ErrorRecord::cancelled()),
            };
            let _ = result_tx.send(result);
        });

        self.items.insert(id, WorkItem { handle, result_rx });
        tracing::debug!(job_id = %id, pending = self.items.len(), "job submitted");
        id
    }

    /// Collects the results of the given jobs that have finished.
    ///
    /// Unfinished and unknown ids are ignored and stay as they are. Collected
    /// jobs stop being tracked, so each result is handed out once.
    pub fn receive_jobs(&mut self, ids: &[JobId]) -> Vec<JobResult> {
        let finished: Vec<JobId> = ids
            .iter()
            .copied()
            .filter(|id| self.items.get(id).is_some_and(WorkItem::is_finished))
            .collect();
        self.collect(finished)
    }

    /// Collects every finished job.
    pub fn receive_all_jobs(&mut self) -> Vec<JobResult> {
        let finished: Vec<JobId> = self
            .items
            .iter()
            .filter(|(_, item)| item.is_finished())
            .map(|(id, _)| *id)
            .collect();
        self.collect(finished)
    }

    fn collect(&mut self, ids: Vec<JobId>) -> Vec<JobResult> {
        let mut results: Vec<JobResult> = ids
            .into_iter()
            .filter_map(|id| self.items.remove(&id).map(|item| item.into_result(id)))
            .collect();
        results.sort_by_key(|r| r.completed_at);

        for result in &results {
            tracing::debug!(
                job_id = %result.id,
                outputs = result.output.len(),
                errors = result.errors.len(),
                duration_ms = result.duration_ms,
                "job collected"
            );
        }
        results
    }

    /// Waits until every given job has finished running. Results are left
    /// for [`receive_jobs`](Self::receive_jobs).
    pub async fn wait(&self, ids: &[JobId]) {
        loop {
            let running = ids
                .iter()
                .filter(|id| self.items.get(id).is_some_and(|item| !item.is_finished()))
                .count();
            if running == 0 {
                return;
            }
            tracing::trace!(running, "waiting for jobs");
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    pub async fn wait_all(&self) {
        let ids: Vec<JobId> = self.items.keys().copied().collect();
        self.wait(&ids).await;
    }

    /// True while any submitted job has not been collected.
    pub fn has_pending_jobs(&self) -> bool {
        !self.items.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.items.len()
    }

    /// Forgets every tracked job and releases the worker pool.
    ///
    /// Queued jobs never start. Jobs already running are abandoned rather
    /// than awaited; their results are discarded.
    pub fn dispose(&mut self) {
        self.slots.close();
        let abandoned = self.items.len();
        for (_, item) in self.items.drain() {
            item.handle.abort();
        }
        if abandoned > 0 {
            tracing::info!(abandoned, "job runner disposed with uncollected jobs");
        }
    }
}

impl Drop for LocalJobRunner {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn execute<F>(id: JobId, work: F, mut ctx: JobContext) -> JobResult
where
    F: FnOnce(&mut JobContext) -> anyhow::Result<()>,
{
    let started_at = Utc::now();
    match panic::catch_unwind(AssertUnwindSafe(|| work(&mut ctx))) {
        Ok(Ok(())) => {}
        Ok(Err(err)) => ctx.record_failure(&err),
        Err(payload) => ctx.record_panic(payload.as_ref()),
    }
    JobResult::from_context(id, ctx, started_at)
}
