use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use jobyard::local::{LocalJobRunner, Parameters, RunnerOptions};
use jobyard::remote::{
    RemoteTaskWaiter, RetryPolicy, ScriptedSource, TaskState, WaitError, WaitOptions,
};
use serde_json::json;

fn runner(pool: usize) -> LocalJobRunner {
    LocalJobRunner::new(RunnerOptions {
        max_pool_size: Some(pool),
        poll_interval: Duration::from_millis(10),
        ..Default::default()
    })
    .unwrap()
}

fn wait_options() -> WaitOptions {
    WaitOptions {
        poll_interval: Duration::from_millis(1),
        retry: RetryPolicy {
            max_attempts: 5,
            delay_ms: 1,
        },
        ..Default::default()
    }
}

#[tokio::test]
async fn sleeping_jobs_all_return_their_index() {
    let mut runner = runner(2);
    for i in 0..5 {
        let mut params = Parameters::new();
        params.insert("index".into(), json!(i));
        runner.add_job(
            |ctx| {
                std::thread::sleep(Duration::from_millis(100));
                let index = ctx.param("index").cloned().unwrap_or_default();
                ctx.write_output(index);
                Ok(())
            },
            Some(params),
        );
    }

    runner.wait_all().await;
    let results = runner.receive_all_jobs();
    assert_eq!(results.len(), 5);
    assert!(results.iter().all(|r| r.errors.is_empty()));

    let mut indexes: Vec<i64> = results
        .iter()
        .flat_map(|r| r.output.iter().filter_map(|v| v.as_i64()))
        .collect();
    indexes.sort();
    assert_eq!(indexes, vec![0, 1, 2, 3, 4]);

    assert!(runner.receive_all_jobs().is_empty());
    assert!(!runner.has_pending_jobs());
}

#[tokio::test]
async fn failing_job_is_captured_as_error() {
    let mut runner = runner(1);
    runner.add_job(|_| anyhow::bail!("boom"), None);
    runner.wait_all().await;

    let results = runner.receive_all_jobs();
    assert_eq!(results.len(), 1);
    assert!(results[0].output.is_empty());
    assert_eq!(results[0].errors.len(), 1);
    assert_eq!(results[0].errors[0].message, "boom");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrency_never_exceeds_pool_size() {
    for pool in [1, 3] {
        let mut runner = runner(pool);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for _ in 0..8 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            runner.add_job(
                move |_| {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(30));
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                },
                None,
            );
        }

        runner.wait_all().await;
        assert_eq!(runner.receive_all_jobs().len(), 8);
        assert!(peak.load(Ordering::SeqCst) <= pool);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }
}

#[tokio::test]
async fn dispose_with_jobs_in_flight() {
    let mut runner = runner(2);
    for _ in 0..4 {
        runner.add_job(
            |_| {
                std::thread::sleep(Duration::from_millis(200));
                Ok(())
            },
            None,
        );
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
    runner.dispose();
    assert!(!runner.has_pending_jobs());
    assert!(runner.receive_all_jobs().is_empty());
}

#[tokio::test]
async fn mixed_outcomes_are_each_reported_once() {
    let source = ScriptedSource::new()
        .ramp("Task[1]", 2, TaskState::Success)
        .ramp("Task[2]", 2, TaskState::Success)
        .ramp("Task[3]", 1, TaskState::Error);
    let waiter = RemoteTaskWaiter::new(&source, wait_options());

    let summary = waiter
        .wait(["Task[1]", "Task[2]", "Task[3]"])
        .collect_all()
        .await
        .unwrap();

    assert_eq!(summary.tasks.len(), 3);
    assert!(summary.unresolved.is_empty());
    let mut paths: Vec<&str> = summary.tasks.iter().map(|t| t.path.as_str()).collect();
    paths.sort();
    assert_eq!(paths, ["Task[1]", "Task[2]", "Task[3]"]);

    let failed: Vec<&str> = summary
        .tasks
        .iter()
        .filter(|t| t.failed())
        .map(|t| t.path.as_str())
        .collect();
    assert_eq!(failed, ["Task[3]"]);
    assert_eq!(summary.tasks[0].path, "Task[3]");
    assert_eq!(source.fetch_count("Task[1]"), 2);
    assert_eq!(source.fetch_count("Task[3]"), 1);
}

#[tokio::test]
async fn transient_failures_below_budget_are_masked() {
    let source = ScriptedSource::new().ramp("Task[1]", 1, TaskState::Success);
    source.fail_next(4);
    let waiter = RemoteTaskWaiter::new(&source, wait_options());

    let summary = waiter.wait(["Task[1]"]).collect_all().await.unwrap();
    assert_eq!(summary.tasks.len(), 1);
    assert_eq!(summary.tasks[0].state, TaskState::Success);
    assert_eq!(source.fetch_count("Task[1]"), 5);
    assert_eq!(source.reconnect_count(), 4);
}

#[tokio::test]
async fn transient_failures_at_budget_are_fatal() {
    let source = ScriptedSource::new().ramp("Task[1]", 1, TaskState::Success);
    source.fail_next(5);
    let waiter = RemoteTaskWaiter::new(&source, wait_options());

    let err = waiter.wait(["Task[1]"]).collect_all().await.unwrap_err();
    assert!(matches!(err, WaitError::Communication { attempts: 5, .. }));
}
