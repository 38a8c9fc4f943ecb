//! An in-process [`TaskSource`] that replays scripted task states.
//!
//! Backs the `tasks` demo command and the waiter tests. Each path plays its
//! steps one per fetch and then keeps repeating the last one; paths with no
//! script resolve as not found.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::task::{RemoteTask, SourceError, TaskSource, TaskState};

#[derive(Default)]
struct Inner {
    scripts: HashMap<String, VecDeque<Result<RemoteTask, SourceError>>>,
    pending_failures: u32,
    failing_cleanups: HashSet<String>,
    fetches: HashMap<String, u32>,
    cleanups: HashMap<String, u32>,
    reconnects: u32,
}

#[derive(Default)]
pub struct ScriptedSource {
    inner: Mutex<Inner>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn inner_mut(&mut self) -> &mut Inner {
        self.inner.get_mut().unwrap_or_else(PoisonError::into_inner)
    }

    /// Scripts `path` to report the given states in order.
    pub fn task<I>(mut self, path: &str, steps: I) -> Self
    where
        I: IntoIterator<Item = (TaskState, u8)>,
    {
        let steps = steps
            .into_iter()
            .map(|(state, progress)| {
                let task = RemoteTask::new(path, state, progress).with_cleanup(true);
                Ok(match state {
                    TaskState::Error => task.with_error("E_TASK", "task reported an error"),
                    TaskState::Success | TaskState::Completed => {
                        task.with_output_path(format!("{path}/Output"))
                    }
                    _ => task,
                })
            })
            .collect();
        self.inner_mut().scripts.insert(path.to_string(), steps);
        self
    }

    /// Scripts `path` to take `polls` fetches to reach `final_state`, with
    /// progress rising evenly on the way.
    pub fn ramp(self, path: &str, polls: u32, final_state: TaskState) -> Self {
        let polls = polls.max(1);
        let steps = (1..polls)
            .map(|i| (TaskState::InProgress, (i * 100 / polls) as u8))
            .chain(std::iter::once((final_state, 100)));
        self.task(path, steps)
    }

    /// Makes `path` resolve to something that is not a task.
    pub fn not_a_task(mut self, path: &str, kind: &str) -> Self {
        let err = SourceError::NotATask {
            path: path.to_string(),
            kind: kind.to_string(),
        };
        self.inner_mut()
            .scripts
            .insert(path.to_string(), VecDeque::from([Err(err)]));
        self
    }

    /// Marks `path` as offering no cleanup capability.
    pub fn without_cleanup(mut self, path: &str) -> Self {
        if let Some(steps) = self.inner_mut().scripts.get_mut(path) {
            for task in steps.iter_mut().flatten() {
                task.can_cleanup = false;
            }
        }
        self
    }

    /// Makes cleanup of `path` fail.
    pub fn failing_cleanup(mut self, path: &str) -> Self {
        self.inner_mut().failing_cleanups.insert(path.to_string());
        self
    }

    /// Fails the next `n` fetches, whatever their path, with a communication
    /// error.
    pub fn fail_next(&self, n: u32) {
        self.lock().pending_failures = n;
    }

    /// Fetch attempts for `path`, failed ones included.
    pub fn fetch_count(&self, path: &str) -> u32 {
        self.lock().fetches.get(path).copied().unwrap_or(0)
    }

    pub fn cleanup_count(&self, path: &str) -> u32 {
        self.lock().cleanups.get(path).copied().unwrap_or(0)
    }

    pub fn reconnect_count(&self) -> u32 {
        self.lock().reconnects
    }
}

impl TaskSource for ScriptedSource {
    async fn fetch(&self, path: &str) -> Result<RemoteTask, SourceError> {
        let mut inner = self.lock();
        *inner.fetches.entry(path.to_string()).or_default() += 1;

        if inner.pending_failures > 0 {
            inner.pending_failures -= 1;
            return Err(SourceError::Communication("connection reset by peer".to_string()));
        }

        let Some(steps) = inner.scripts.get_mut(path) else {
            return Err(SourceError::NotFound(path.to_string()));
        };
        let step = if steps.len() > 1 {
            steps.pop_front()
        } else {
            steps.front().cloned()
        };
        step.unwrap_or_else(|| Err(SourceError::NotFound(path.to_string())))
    }

    async fn cleanup(&self, path: &str) -> Result<(), SourceError> {
        let mut inner = self.lock();
        *inner.cleanups.entry(path.to_string()).or_default() += 1;
        if inner.failing_cleanups.contains(path) {
            return Err(SourceError::Communication(format!("cleanup of {path} rejected")));
        }
        Ok(())
    }

    async fn reconnect(&self) -> Result<(), SourceError> {
        self.lock().reconnects += 1;
        Ok(())
    }
}
