//! Demo commands behind the `jobyard` binary.

use std::time::Duration;

use anyhow::{Result, bail};
use serde_json::json;

use crate::config::JobyardConfig;
use crate::local::{LocalJobRunner, Parameters};
use crate::remote::{RemoteTaskWaiter, ScriptedSource, TaskState};
use crate::ui::{JobsProgress, WaitProgress};

/// Submits `count` synthetic jobs, then collects results as they finish.
///
/// Returns how many jobs reported errors.
pub async fn run_jobs(
    config: &JobyardConfig,
    count: usize,
    sleep_ms: u64,
    fail_every: Option<usize>,
) -> Result<usize> {
    let options = config.runner_options();
    let poll_interval = options.poll_interval;
    let mut runner = LocalJobRunner::new(options)?;
    tracing::info!(count, pool_size = runner.pool_size(), "submitting jobs");

    for index in 0..count {
        let mut params = Parameters::new();
        params.insert("index".into(), json!(index));
        params.insert("sleep_ms".into(), json!(sleep_ms));
        params.insert(
            "fail".into(),
            json!(fail_every.is_some_and(|n| n > 0 && (index + 1) % n == 0)),
        );
        runner.add_job(synthetic_job, Some(params));
    }

    let progress = JobsProgress::start(count);
    let mut failed = 0;
    while runner.has_pending_jobs() {
        for result in runner.receive_all_jobs() {
            if result.has_errors() {
                failed += 1;
            }
            progress.record(&result);
        }
        if runner.has_pending_jobs() {
            tokio::time::sleep(poll_interval).await;
        }
    }
    progress.complete(failed);
    runner.dispose();
    Ok(failed)
}

fn synthetic_job(ctx: &mut crate::local::JobContext) -> Result<()> {
    let index = ctx.param("index").and_then(|v| v.as_u64()).unwrap_or_default();
    let sleep_ms = ctx.param("sleep_ms").and_then(|v| v.as_u64()).unwrap_or_default();
    std::thread::sleep(Duration::from_millis(sleep_ms));

    if ctx.param("fail").and_then(|v| v.as_bool()).unwrap_or(false) {
        bail!("job {index} was told to fail");
    }
    ctx.write_output(json!({ "index": index, "modules": ctx.env().modules() }));
    Ok(())
}

/// Waits on `count` scripted remote tasks, printing each as it finishes.
///
/// Returns how many tasks ended in the `Error` state or could not be
/// resolved.
pub async fn run_tasks(
    config: &JobyardConfig,
    count: usize,
    polls: u32,
    title: &str,
    cleanup: bool,
    fail_first: u32,
) -> Result<usize> {
    let mut source = ScriptedSource::new();
    let mut paths = Vec::with_capacity(count);
    for i in 0..count {
        let path = format!("Task[{}]", i + 1);
        // Every fourth task fails and later tasks take longer.
        let final_state = if (i + 1) % 4 == 0 {
            TaskState::Error
        } else {
            TaskState::Success
        };
        source = source.ramp(&path, polls.saturating_add(i as u32), final_state);
        paths.push(path);
    }
    source.fail_next(fail_first);

    let progress = WaitProgress::start(title);
    let waiter = RemoteTaskWaiter::new(source, config.wait_options(title, cleanup))
        .with_progress(progress.clone());

    let mut failed = 0;
    let mut wait = waiter.wait(paths);
    while let Some(item) = wait.next().await {
        match item {
            Ok(task) => {
                if task.failed() {
                    failed += 1;
                }
                progress.task_finished(&task);
                tracing::debug!(path = %task.path, remaining = wait.remaining(), "task finished");
            }
            Err(err) if err.is_fatal() => return Err(err.into()),
            Err(err) => {
                failed += 1;
                progress.task_skipped(&err);
            }
        }
    }
    Ok(failed)
}
