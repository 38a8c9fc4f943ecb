use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use futures::Stream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::eta::{self, Estimate};
use super::task::{RemoteTask, SourceError, TaskSource};

/// How hard to try when the remote system cannot be reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Attempts per poll, the first one included.
    pub max_attempts: u32,
    /// Fixed pause between attempts, in milliseconds.
    pub delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay_ms: 2000,
        }
    }
}

impl RetryPolicy {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[derive(Debug, Clone)]
pub struct WaitOptions {
    /// Label shown next to the progress indicator.
    pub title: String,
    /// Ask the remote system to discard each task once it finishes.
    pub cleanup: bool,
    pub poll_interval: Duration,
    pub retry: RetryPolicy,
    /// Longest a single cleanup call may take before it is abandoned.
    pub cleanup_timeout: Duration,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            title: "Waiting for tasks".to_string(),
            cleanup: false,
            poll_interval: Duration::from_millis(500),
            retry: RetryPolicy::default(),
            cleanup_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WaitError {
    /// The handle does not lead to a task. Other handles are unaffected.
    #[error("could not resolve task {path}: {source}")]
    Resolution {
        path: String,
        #[source]
        source: SourceError,
    },

    /// The remote system stayed unreachable through every retry. Ends the wait.
    #[error("gave up polling {path} after {attempts} failed attempts: {source}")]
    Communication {
        path: String,
        attempts: u32,
        #[source]
        source: SourceError,
    },
}

impl WaitError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, WaitError::Communication { .. })
    }

    pub fn path(&self) -> &str {
        match self {
            WaitError::Resolution { path, .. } | WaitError::Communication { path, .. } => path,
        }
    }
}

/// Progress of a wait, as handed to a [`ProgressReporter`].
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    pub total: usize,
    pub completed: usize,
    pub estimate: Estimate,
}

/// Receives progress updates while a wait is running.
pub trait ProgressReporter {
    fn report(&self, title: &str, snapshot: &ProgressSnapshot);

    /// Called once when the wait ends, however it ends.
    fn finish(&self) {}
}

/// Discards progress updates.
#[derive(Debug, Clone, Copy, Default)]
pub struct Silent;

impl ProgressReporter for Silent {
    fn report(&self, _title: &str, _snapshot: &ProgressSnapshot) {}
}

/// Everything a completed wait produced.
#[derive(Debug, Default)]
pub struct WaitSummary {
    /// Tasks in the order they reached a terminal state.
    pub tasks: Vec<RemoteTask>,
    /// Handles that could not be resolved.
    pub unresolved: Vec<WaitError>,
}

/// Waits for remote tasks to reach a terminal state.
pub struct RemoteTaskWaiter<S> {
    source: S,
    options: WaitOptions,
    progress: Box<dyn ProgressReporter>,
}

impl<S: TaskSource> RemoteTaskWaiter<S> {
    pub fn new(source: S, options: WaitOptions) -> Self {
        Self {
            source,
            options,
            progress: Box::new(Silent),
        }
    }

    pub fn with_progress(mut self, reporter: impl ProgressReporter + 'static) -> Self {
        self.progress = Box::new(reporter);
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn options(&self) -> &WaitOptions {
        &self.options
    }

    /// Starts waiting on `paths`. Nothing is polled until the returned
    /// [`TaskWait`] is advanced.
    ///
    /// A handle given more than once is tracked once.
    pub fn wait<I, P>(&self, paths: I) -> TaskWait<'_, S>
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::new();
        for path in paths {
            let path = path.into();
            if seen.insert(path.clone()) {
                queue.push_back(path);
            } else {
                tracing::debug!(%path, "ignoring duplicate task handle");
            }
        }

        TaskWait {
            waiter: self,
            total: queue.len(),
            queue,
            round_left: 0,
            polled: false,
            completed: 0,
            last_progress: HashMap::new(),
            pending_cleanup: None,
            started: Instant::now(),
            finished: false,
        }
    }

    async fn fetch_with_retry(&self, path: &str) -> Result<RemoteTask, WaitError> {
        let retry = &self.options.retry;
        let max_attempts = retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.source.fetch(path).await {
                Ok(task) => return Ok(task),
                Err(err) if err.is_transient() => {
                    if attempt >= max_attempts {
                        return Err(WaitError::Communication {
                            path: path.to_string(),
                            attempts: attempt,
                            source: err,
                        });
                    }
                    tracing::warn!(path, attempt, max_attempts, error = %err, "poll failed, reconnecting");
                    tokio::time::sleep(retry.delay()).await;
                    if let Err(e) = self.source.reconnect().await {
                        tracing::warn!(error = %e, "reconnect failed");
                    }
                    attempt += 1;
                }
                Err(err) => {
                    return Err(WaitError::Resolution {
                        path: path.to_string(),
                        source: err,
                    });
                }
            }
        }
    }

    // Best effort: a failed or stalled cleanup never fails the wait.
    async fn cleanup(&self, path: &str) {
        let timeout = self.options.cleanup_timeout;
        match tokio::time::timeout(timeout, self.source.cleanup(path)).await {
            Ok(Ok(())) => tracing::debug!(path, "task cleaned up"),
            Ok(Err(err)) => tracing::warn!(path, error = %err, "task cleanup failed, ignoring"),
            Err(_) => tracing::warn!(path, ?timeout, "task cleanup timed out, ignoring"),
        }
    }
}

/// A wait in progress. Yields one item per handle, in completion order.
///
/// Items are `Ok` for tasks that reached a terminal state and
/// [`WaitError::Resolution`] for handles that could not be resolved. A
/// [`WaitError::Communication`] is yielded at most once and ends the sequence.
///
/// A handle leaves the queue only once its poll has resolved, so dropping a
/// `next()` future part way (a timeout, `select!`) loses nothing. Cleanup of a
/// finished task runs after the task has been yielded, at the start of the
/// following `next()` call.
pub struct TaskWait<'a, S> {
    waiter: &'a RemoteTaskWaiter<S>,
    queue: VecDeque<String>,
    // Polls left before the current round ends and the waiter sleeps.
    round_left: usize,
    polled: bool,
    total: usize,
    completed: usize,
    last_progress: HashMap<String, u8>,
    // Finished task whose cleanup is still owed.
    pending_cleanup: Option<String>,
    started: Instant,
    finished: bool,
}

impl<'a, S: TaskSource> TaskWait<'a, S> {
    pub fn total(&self) -> usize {
        self.total
    }

    /// Handles not yet reported.
    pub fn remaining(&self) -> usize {
        self.queue.len()
    }

    pub async fn next(&mut self) -> Option<Result<RemoteTask, WaitError>> {
        if self.finished {
            return None;
        }
        if let Some(path) = self.pending_cleanup.take() {
            self.waiter.cleanup(&path).await;
        }
        loop {
            if self.queue.is_empty() {
                self.finish();
                return None;
            }
            if self.round_left == 0 {
                if self.polled {
                    tokio::time::sleep(self.waiter.options.poll_interval).await;
                }
                self.round_left = self.queue.len();
            }
            let path = self.queue.front().cloned()?;
            let polled = self.waiter.fetch_with_retry(&path).await;
            self.queue.pop_front();
            self.round_left -= 1;
            self.polled = true;

            match polled {
                Ok(task) if task.is_terminal() => {
                    tracing::debug!(path = %path, state = %task.state, "task finished");
                    self.completed += 1;
                    self.last_progress.remove(&path);
                    if self.waiter.options.cleanup && task.can_cleanup {
                        self.pending_cleanup = Some(path);
                    }
                    self.report();
                    return Some(Ok(task));
                }
                Ok(task) => {
                    tracing::trace!(path = %path, state = %task.state, progress = task.progress, "task still running");
                    self.last_progress.insert(path.clone(), task.progress);
                    self.queue.push_back(path);
                    self.report();
                }
                Err(err) if err.is_fatal() => {
                    tracing::error!(error = %err, "abandoning wait");
                    self.finish();
                    return Some(Err(err));
                }
                Err(err) => {
                    tracing::warn!(error = %err, "skipping unresolvable task");
                    self.completed += 1;
                    self.last_progress.remove(&path);
                    self.report();
                    return Some(Err(err));
                }
            }
        }
    }

    /// Drains the wait. Unresolvable handles are collected; a communication
    /// failure is returned as the error.
    pub async fn collect_all(mut self) -> Result<WaitSummary, WaitError> {
        let mut summary = WaitSummary::default();
        while let Some(item) = self.next().await {
            match item {
                Ok(task) => summary.tasks.push(task),
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => summary.unresolved.push(err),
            }
        }
        Ok(summary)
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<RemoteTask, WaitError>> {
        futures::stream::unfold(self, |mut wait| async move {
            let item = wait.next().await?;
            Some((item, wait))
        })
    }

    fn report(&self) {
        let current_percent = match self.queue.len() {
            1 => self
                .queue
                .front()
                .and_then(|path| self.last_progress.get(path).copied()),
            _ => None,
        };
        let snapshot = ProgressSnapshot {
            total: self.total,
            completed: self.completed,
            estimate: eta::estimate(
                self.started.elapsed(),
                self.total,
                self.completed,
                current_percent,
            ),
        };
        self.waiter.progress.report(&self.waiter.options.title, &snapshot);
    }

    fn finish(&mut self) {
        if !self.finished {
            self.finished = true;
            self.waiter.progress.finish();
        }
    }
}
