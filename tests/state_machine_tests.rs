mod support;

use chrono::{Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use support::{calls, counting_task, declare};
use taskflow_core::cache::{validators, CacheStore, CachedResult, InMemoryCacheStore};
use taskflow_core::state_machine::{RunContext, StateMachineError, TaskRunner, TaskState};
use taskflow_core::task::{TaskArguments, TaskId, TaskOptions, TaskOutcome, TaskSignature};
use taskflow_core::triggers::{self, Trigger, UpstreamStates};
use tokio_test::{assert_err, assert_ok};

fn no_upstream() -> UpstreamStates {
    UpstreamStates::new()
}

fn upstream_with(state: TaskState) -> UpstreamStates {
    [(TaskId::new(), state)].into_iter().collect()
}

fn nightly() -> RunContext {
    RunContext {
        flow_name: "nightly".to_string(),
        ..RunContext::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_always_failing_task_runs_three_attempts_with_two_retries() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let observed = Arc::clone(&seen);
    let task = declare(
        "flaky",
        TaskSignature::empty(),
        TaskOptions::new()
            .max_retries(2)
            .retry_delay(Duration::from_secs(1)),
        move |ctx, _args| {
            observed.lock().push(ctx.attempt);
            async { Ok(TaskOutcome::fail("always fails")) }
        },
    );

    let start = tokio::time::Instant::now();
    let report = assert_ok!(
        TaskRunner::new(task)
            .run(&no_upstream(), TaskArguments::new(), RunContext::default())
            .await
    );

    assert_eq!(*seen.lock(), vec![1, 2, 3]);
    assert_eq!(report.attempts(), 3);
    assert_eq!(report.state, TaskState::failed("always fails"));
    let retries: Vec<u32> = report
        .states()
        .filter_map(|state| match state {
            TaskState::Retrying { attempt, .. } => Some(*attempt),
            _ => None,
        })
        .collect();
    assert_eq!(retries, vec![2, 3]);
    assert!(start.elapsed() >= Duration::from_secs(2));
}

#[tokio::test]
async fn test_single_attempt_reports_retry_schedule() {
    let task = declare(
        "flaky",
        TaskSignature::empty(),
        TaskOptions::new()
            .max_retries(1)
            .retry_delay(Duration::from_secs(30)),
        |_ctx, _args| async { Ok(TaskOutcome::fail("nope")) },
    );

    let runner = TaskRunner::new(task);
    let before = Utc::now();
    let first = assert_ok!(
        runner
            .run_attempt(&no_upstream(), &TaskArguments::new(), &RunContext::default())
            .await
    );
    assert!(first.is_retry_scheduled());
    match first.state {
        TaskState::Retrying {
            attempt,
            scheduled_at,
        } => {
            assert_eq!(attempt, 2);
            assert!(scheduled_at >= before + ChronoDuration::seconds(30));
        }
        other => panic!("unexpected state {other}"),
    }

    let second_ctx = RunContext {
        attempt: 2,
        ..RunContext::default()
    };
    let second = assert_ok!(
        runner
            .run_attempt(&no_upstream(), &TaskArguments::new(), &second_ctx)
            .await
    );
    assert_eq!(second.state, TaskState::failed("nope"));
}

#[tokio::test]
async fn test_cached_result_replayed_within_window() {
    let store = Arc::new(InMemoryCacheStore::new());
    let (task, counter) = counting_task(
        "expensive",
        TaskOptions::new()
            .slug("expensive")
            .cache_for(Duration::from_secs(10 * 60))
            .cache_validator(validators::duration_only()),
        json!(42),
    );
    let cached_at = Utc::now() - ChronoDuration::minutes(5);
    assert_eq!(task.cache_key("nightly"), "nightly/expensive");
    store
        .put("nightly/expensive", CachedResult::new(json!(7), cached_at))
        .await
        .unwrap();

    let report = TaskRunner::new(task)
        .with_cache_store(store.clone())
        .run(&no_upstream(), TaskArguments::new(), nightly())
        .await
        .unwrap();

    assert_eq!(
        report.state,
        TaskState::Cached {
            result: json!(7),
            cached_at,
        }
    );
    assert!(!report.entered_running());
    assert_eq!(calls(&counter), 0);
    assert_eq!(store.write_count(), 1);
}

#[tokio::test]
async fn test_expired_cache_entry_is_recomputed() {
    let store = Arc::new(InMemoryCacheStore::new());
    let (task, counter) = counting_task(
        "expensive",
        TaskOptions::new()
            .slug("expensive")
            .cache_for(Duration::from_secs(10 * 60)),
        json!(42),
    );
    store
        .put(
            "nightly/expensive",
            CachedResult::new(json!(7), Utc::now() - ChronoDuration::minutes(11)),
        )
        .await
        .unwrap();

    let report = TaskRunner::new(task)
        .with_cache_store(store.clone())
        .run(&no_upstream(), TaskArguments::new(), nightly())
        .await
        .unwrap();

    assert!(report.entered_running());
    assert_eq!(report.state, TaskState::success(json!(42)));
    assert_eq!(calls(&counter), 1);
    // one seed write plus exactly one write for the successful attempt
    assert_eq!(store.write_count(), 2);
    let stored = store.get("nightly/expensive").await.unwrap().unwrap();
    assert_eq!(stored.value, json!(42));
}

#[tokio::test]
async fn test_no_cache_for_means_no_cache_writes() {
    let store = Arc::new(InMemoryCacheStore::new());
    let (task, _) = counting_task(
        "uncached",
        TaskOptions::new().cache_validator(validators::duration_only()),
        json!(1),
    );
    TaskRunner::new(task)
        .with_cache_store(store.clone())
        .run(&no_upstream(), TaskArguments::new(), RunContext::default())
        .await
        .unwrap();
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_skipped_upstream_skips_without_trigger_or_entrypoint() {
    let trigger_calls = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&trigger_calls);
    let trigger = Trigger::custom("counting", move |upstream| {
        counted.fetch_add(1, Ordering::SeqCst);
        triggers::all_successful().evaluate(upstream)
    });
    let (task, counter) = counting_task("downstream", TaskOptions::new().trigger(trigger), json!(1));

    let report = TaskRunner::new(task)
        .run(
            &upstream_with(TaskState::skipped("upstream skipped")),
            TaskArguments::new(),
            RunContext::default(),
        )
        .await
        .unwrap();

    assert!(report.state.is_skipped());
    assert_eq!(trigger_calls.load(Ordering::SeqCst), 0);
    assert_eq!(calls(&counter), 0);
}

#[tokio::test]
async fn test_skipped_upstream_satisfies_all_successful_when_not_skipping() {
    let (task, counter) = counting_task(
        "downstream",
        TaskOptions::new().skip_on_upstream_skip(false),
        json!("ran"),
    );

    let report = TaskRunner::new(task)
        .run(
            &upstream_with(TaskState::skipped("upstream skipped")),
            TaskArguments::new(),
            RunContext::default(),
        )
        .await
        .unwrap();

    assert!(report.entered_running());
    assert_eq!(report.state, TaskState::success(json!("ran")));
    assert_eq!(calls(&counter), 1);
}

#[tokio::test]
async fn test_failed_upstream_fails_trigger() {
    let (task, counter) = counting_task("downstream", TaskOptions::new(), json!(1));
    let report = TaskRunner::new(task)
        .run(
            &upstream_with(TaskState::failed("boom")),
            TaskArguments::new(),
            RunContext::default(),
        )
        .await
        .unwrap();
    assert_eq!(
        report.state,
        TaskState::skipped("Trigger 'all_successful' was not satisfied")
    );
    assert_eq!(calls(&counter), 0);
}

#[tokio::test]
async fn test_upstream_must_be_terminal() {
    let (task, _) = counting_task("downstream", TaskOptions::new(), json!(1));
    let err = assert_err!(
        TaskRunner::new(task)
            .run(&upstream_with(TaskState::Running), TaskArguments::new(), RunContext::default())
            .await
    );
    assert!(matches!(err, StateMachineError::UpstreamNotFinished { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_timeout_aborts_entrypoint_and_retries() {
    let finished = Arc::new(AtomicUsize::new(0));
    let marker = Arc::clone(&finished);
    let task = declare(
        "slow",
        TaskSignature::empty(),
        TaskOptions::new()
            .timeout(Duration::from_millis(50))
            .max_retries(1)
            .retry_delay(Duration::from_millis(10)),
        move |_ctx, _args| {
            let marker = Arc::clone(&marker);
            async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                marker.fetch_add(1, Ordering::SeqCst);
                Ok(TaskOutcome::empty())
            }
        },
    );

    let start = std::time::Instant::now();
    let report = TaskRunner::new(task)
        .run(&no_upstream(), TaskArguments::new(), RunContext::default())
        .await
        .unwrap();

    assert!(matches!(report.state, TaskState::TimedOut { .. }));
    assert_eq!(report.attempts(), 2);
    assert!(start.elapsed() < Duration::from_secs(2));
    assert_eq!(finished.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_errors_and_panics_fold_into_failed() {
    let erroring = declare("erroring", TaskSignature::empty(), TaskOptions::new(), |_ctx, _args| async {
        Err(anyhow::anyhow!("database unavailable"))
    });
    let report = TaskRunner::new(erroring)
        .run(&no_upstream(), TaskArguments::new(), RunContext::default())
        .await
        .unwrap();
    assert_eq!(report.state, TaskState::failed("database unavailable"));

    let panicking = declare("panicking", TaskSignature::empty(), TaskOptions::new(), |_ctx, _args| async {
        if true {
            panic!("exploded");
        }
        Ok(TaskOutcome::empty())
    });
    let report = TaskRunner::new(panicking)
        .run(&no_upstream(), TaskArguments::new(), RunContext::default())
        .await
        .unwrap();
    assert!(report.state.is_failed());
    assert!(report.state.message().unwrap().contains("exploded"));
}

#[tokio::test]
async fn test_signals_set_outcome() {
    let succeeding = declare("succeeding", TaskSignature::empty(), TaskOptions::new(), |_ctx, _args| async {
        Ok(TaskOutcome::succeed(json!("early")))
    });
    let report = TaskRunner::new(succeeding)
        .run(&no_upstream(), TaskArguments::new(), RunContext::default())
        .await
        .unwrap();
    assert_eq!(report.state, TaskState::success(json!("early")));

    let waiting = declare(
        "waiting",
        TaskSignature::empty(),
        TaskOptions::new().max_retries(3),
        |_ctx, _args| async { Ok(TaskOutcome::wait("approval pending")) },
    );
    let report = TaskRunner::new(waiting)
        .run(&no_upstream(), TaskArguments::new(), RunContext::default())
        .await
        .unwrap();
    assert_eq!(report.state, TaskState::waiting("approval pending"));
    assert_eq!(report.attempts(), 1);
}

#[tokio::test]
async fn test_waiting_upstream_propagates_unless_resuming() {
    let (task, counter) = counting_task("downstream", TaskOptions::new(), json!(1));
    let runner = TaskRunner::new(task);
    let upstream = upstream_with(TaskState::waiting("approval pending"));

    let report = runner
        .run(&upstream, TaskArguments::new(), RunContext::default())
        .await
        .unwrap();
    assert!(report.state.is_waiting());
    assert_eq!(calls(&counter), 0);

    let resumed = RunContext {
        is_waiting: true,
        ..RunContext::default()
    };
    let report = runner.run(&upstream, TaskArguments::new(), resumed).await.unwrap();
    assert_eq!(report.state, TaskState::success(json!(1)));
    assert_eq!(calls(&counter), 1);
}

#[tokio::test]
async fn test_records_follow_transition_order() {
    let (task, _) = counting_task("simple", TaskOptions::new(), json!(3));
    let report = TaskRunner::new(task)
        .run(&no_upstream(), TaskArguments::new(), RunContext::default())
        .await
        .unwrap();
    let names: Vec<&str> = report.states().map(TaskState::name).collect();
    assert_eq!(names, vec!["running", "success"]);
    assert!(report.records.iter().all(|record| record.attempt == 1));
}

#[tokio::test]
async fn test_waiting_upstream_does_not_hold_back_always_run() {
    let (cleanup, counter) = counting_task(
        "cleanup",
        TaskOptions::new().trigger(triggers::always_run()),
        json!("cleaned"),
    );
    let upstream = upstream_with(TaskState::waiting("approval pending"));

    let report = TaskRunner::new(cleanup)
        .run(&upstream, TaskArguments::new(), RunContext::default())
        .await
        .unwrap();
    assert_eq!(report.state, TaskState::success(json!("cleaned")));
    assert_eq!(calls(&counter), 1);

    let (strict, strict_counter) = counting_task(
        "strict",
        TaskOptions::new().trigger(triggers::all_failed()),
        json!(0),
    );
    let report = TaskRunner::new(strict)
        .run(&upstream, TaskArguments::new(), RunContext::default())
        .await
        .unwrap();
    assert_eq!(report.state, TaskState::waiting("Upstream task is waiting"));
    assert_eq!(calls(&strict_counter), 0);
}

#[tokio::test]
async fn test_timeout_bounds_entrypoint_that_never_yields() {
    let task = declare(
        "spinning",
        TaskSignature::empty(),
        TaskOptions::new().timeout(Duration::from_millis(50)),
        |_ctx, _args| async {
            std::thread::sleep(Duration::from_millis(1500));
            Ok(TaskOutcome::value(json!("too late")))
        },
    );

    let start = std::time::Instant::now();
    let report = TaskRunner::new(task)
        .run(&no_upstream(), TaskArguments::new(), RunContext::default())
        .await
        .unwrap();

    assert!(matches!(report.state, TaskState::TimedOut { .. }));
    assert!(start.elapsed() < Duration::from_secs(1));
    let names: Vec<&str> = report.states().map(TaskState::name).collect();
    assert_eq!(names, vec!["running", "timed_out"]);
}
