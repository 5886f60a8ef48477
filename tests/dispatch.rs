//! Job dispatcher behaviour under throttling, rejection and outages.

use std::time::Duration;

use extraction_dispatch::config::{CircuitBreakerConfig, DispatchConfig, RetryConfig};
use extraction_dispatch::error::{ErrorKind, PipelineError};
use extraction_dispatch::queue::{Priority, WorkQueue};
use extraction_dispatch::resilience::{Breaker, CircuitStatus};

mod common;

use common::{doc, Harness, HarnessOptions, DEP};

#[tokio::test]
async fn test_throttled_dispatch_retries_then_succeeds() {
    let h = Harness::new();
    h.set_retry(&RetryConfig {
        max_attempts: 5,
        ..RetryConfig::default()
    });
    h.api.fail_starts(ErrorKind::Throttling, 3);

    let job_id = h.dispatcher.dispatch(&doc("a.pdf"), Priority::Standard).await.unwrap();

    assert_eq!(job_id, "job-4");
    assert_eq!(h.api.starts(), 4);

    let sleeps = h.clock.sleeps();
    assert_eq!(sleeps.len(), 3);
    for (attempt, delay) in sleeps.iter().enumerate() {
        let base = 1_000u64 * 2u64.pow(attempt as u32);
        let ms = delay.as_millis() as u64;
        assert!(ms >= base && ms <= base + 500, "attempt {attempt}: {ms}ms");
    }

    let batch = h.queue.receive_batch(Priority::Standard, 10).await.unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].body.job_id, "job-4");
    assert_eq!(batch[0].body.retry_count, 3);
    assert_eq!(batch[0].body.source_ref.key, "a.pdf");
}

#[tokio::test]
async fn test_validation_error_is_not_retried() {
    let h = Harness::new();
    h.api.fail_starts(ErrorKind::Validation, 1);

    let err = h
        .dispatcher
        .dispatch(&doc("bad.pdf"), Priority::Standard)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(h.api.starts(), 1);
    assert!(h.clock.sleeps().is_empty());
    assert_eq!(h.queue.depth(Priority::Standard), 0);

    // Still counted against the dependency.
    assert_eq!(h.breaker.snapshot(DEP).failures_in_window, 1);
}

#[tokio::test]
async fn test_exhausted_retries_surface_last_error() {
    let h = Harness::new();
    h.set_retry(&RetryConfig {
        max_attempts: 3,
        ..RetryConfig::default()
    });
    h.api.fail_starts(ErrorKind::TransientUpstream, 10);

    let err = h
        .dispatcher
        .dispatch(&doc("a.pdf"), Priority::High)
        .await
        .unwrap_err();

    match err {
        PipelineError::DispatchFailed { attempts, last } => {
            assert_eq!(attempts, 3);
            assert_eq!(last.kind(), ErrorKind::TransientUpstream);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(h.api.starts(), 3);
    assert_eq!(h.clock.sleeps().len(), 2);
    assert_eq!(h.queue.depth(Priority::High), 0);
}

#[tokio::test]
async fn test_open_circuit_fails_fast_then_recovers() {
    let h = Harness::new();
    h.set_breaker(&CircuitBreakerConfig {
        failure_threshold: 2,
        min_calls_to_evaluate: 2,
        recovery_timeout_secs: 30,
        ..CircuitBreakerConfig::default()
    });
    h.api.fail_starts(ErrorKind::Throttling, 2);

    // Two failures open the circuit; the third attempt never reaches upstream.
    let err = h
        .dispatcher
        .dispatch(&doc("a.pdf"), Priority::Standard)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unavailable);
    assert_eq!(h.api.starts(), 2);
    assert_eq!(h.breaker.state(DEP).await, CircuitStatus::Open);
    let opened = h.breaker.snapshot(DEP);

    let err = h
        .dispatcher
        .dispatch(&doc("b.pdf"), Priority::Standard)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unavailable);
    assert_eq!(h.api.starts(), 2);
    assert_eq!(h.queue.depth(Priority::Standard), 0);

    // Rejections leave the breaker untouched.
    assert_eq!(h.breaker.snapshot(DEP), opened);

    h.clock.advance(Duration::from_secs(31));
    let job_id = h.dispatcher.dispatch(&doc("c.pdf"), Priority::High).await.unwrap();

    assert_eq!(job_id, "job-3");
    assert_eq!(h.breaker.state(DEP).await, CircuitStatus::Closed);
    assert_eq!(h.queue.depth(Priority::High), 1);
}

#[tokio::test]
async fn test_failed_probe_reopens_circuit() {
    let h = Harness::new();
    h.set_breaker(&CircuitBreakerConfig {
        failure_threshold: 2,
        min_calls_to_evaluate: 2,
        recovery_timeout_secs: 30,
        ..CircuitBreakerConfig::default()
    });
    h.set_retry(&RetryConfig {
        max_attempts: 1,
        ..RetryConfig::default()
    });
    h.api.fail_starts(ErrorKind::TransientUpstream, 3);

    for key in ["a.pdf", "b.pdf"] {
        let err = h.dispatcher.dispatch(&doc(key), Priority::Standard).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DispatchFailed);
    }
    assert_eq!(h.breaker.state(DEP).await, CircuitStatus::Open);

    h.clock.advance(Duration::from_secs(30));
    let err = h.dispatcher.dispatch(&doc("c.pdf"), Priority::Standard).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DispatchFailed);
    assert_eq!(h.api.starts(), 3);
    assert_eq!(h.breaker.state(DEP).await, CircuitStatus::Open);

    let err = h.dispatcher.dispatch(&doc("d.pdf"), Priority::Standard).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unavailable);
    assert_eq!(h.api.starts(), 3);
}

#[tokio::test]
async fn test_retry_policy_edits_apply_to_next_dispatch() {
    let h = Harness::new();
    h.set_retry(&RetryConfig {
        max_attempts: 1,
        ..RetryConfig::default()
    });
    h.api.fail_starts(ErrorKind::Throttling, 1);

    let err = h.dispatcher.dispatch(&doc("a.pdf"), Priority::Standard).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DispatchFailed);

    h.set_retry(&RetryConfig {
        max_attempts: 2,
        jitter_max_ms: 0,
        ..RetryConfig::default()
    });
    h.api.fail_starts(ErrorKind::Throttling, 1);

    h.dispatcher.dispatch(&doc("a.pdf"), Priority::Standard).await.unwrap();
    assert_eq!(h.clock.sleeps(), vec![Duration::from_millis(1_000)]);
}

#[tokio::test(start_paused = true)]
async fn test_slow_submission_times_out_and_is_retried() {
    let h = Harness::new();
    h.api.slow_starts(Duration::from_secs(60), 1);

    let job_id = h.dispatcher.dispatch(&doc("a.pdf"), Priority::Standard).await.unwrap();

    // The first call is cut off at call_timeout_secs; the second is answered.
    assert_eq!(job_id, "job-2");
    assert_eq!(h.api.starts(), 2);
    assert_eq!(h.clock.sleeps().len(), 1);
    assert_eq!(h.breaker.snapshot(DEP).failures_in_window, 1);

    let batch = h.queue.receive_batch(Priority::Standard, 10).await.unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].body.retry_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_total_timeout_ends_retrying_dispatch() {
    let h = Harness::with_options(HarnessOptions {
        dispatch: DispatchConfig {
            call_timeout_secs: 10,
            total_timeout_secs: 25,
            ..DispatchConfig::default()
        },
        ..HarnessOptions::default()
    });
    h.set_retry(&RetryConfig {
        max_attempts: 10,
        ..RetryConfig::default()
    });
    h.api.slow_starts(Duration::from_secs(60), 10);

    let started = tokio::time::Instant::now();
    let err = h
        .dispatcher
        .dispatch(&doc("a.pdf"), Priority::High)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Timeout);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(25) && elapsed < Duration::from_secs(26));
    assert_eq!(h.api.starts(), 3);
    assert_eq!(h.queue.depth(Priority::High), 0);
    assert_eq!(h.queue.depth(Priority::Standard), 0);
}
