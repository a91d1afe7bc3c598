use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::retry::{RetryConfig, RetryMetrics, RetryPolicy};

#[derive(Debug)]
struct TestError(bool);

impl std::error::Error for TestError {}

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TestError({})", self.0)
    }
}

impl crate::retry::Retryable for TestError {
    fn is_recoverable(&self) -> bool {
        self.0
    }
}

#[test]
fn retry_success_first_attempt() {
    let call_count = AtomicUsize::new(0);
    let policy = RetryPolicy::new();

    let result = policy.execute(|| {
        let count = call_count.fetch_add(1, Ordering::SeqCst);
        if count == 0 {
            Ok("success")
        } else {
            Err(TestError(true))
        }
    });

    assert_eq!(result.unwrap(), "success");
    assert_eq!(call_count.load(Ordering::SeqCst), 1);
}

#[test]
fn retry_success_after_failures() {
    let call_count = AtomicUsize::new(0);
    let policy = RetryPolicy::new().with_config(
        RetryConfig::new()
            .with_max_retries(3)
            .with_base_delay(Duration::from_millis(1)),
    );

    let result = policy.execute(|| {
        let count = call_count.fetch_add(1, Ordering::SeqCst);
        if count < 2 {
            Err(TestError(true))
        } else {
            Ok("success")
        }
    });

    assert_eq!(result.unwrap(), "success");
    assert_eq!(call_count.load(Ordering::SeqCst), 3);
}

#[test]
fn retry_non_recoverable_error_gives_up_immediately() {
    let call_count = AtomicUsize::new(0);
    let policy = RetryPolicy::new().with_config(RetryConfig::new().with_max_retries(3));

    let result = policy.execute(|| {
        call_count.fetch_add(1, Ordering::SeqCst);
        Err::<(), _>(TestError(false))
    });

    assert!(result.is_err());
    assert_eq!(call_count.load(Ordering::SeqCst), 1);
}

#[test]
fn retry_max_retries_exceeded() {
    let call_count = AtomicUsize::new(0);
    let policy = RetryPolicy::new().with_config(
        RetryConfig::new()
            .with_max_retries(2)
            .with_base_delay(Duration::from_millis(1)),
    );

    let result = policy.execute(|| {
        call_count.fetch_add(1, Ordering::SeqCst);
        Err::<(), _>(TestError(true))
    });

    assert!(result.is_err());
    assert_eq!(call_count.load(Ordering::SeqCst), 3);
}

#[test]
fn retry_records_metrics() {
    let metrics = RetryMetrics::new();
    let call_count = AtomicUsize::new(0);
    let policy = RetryPolicy::new()
        .with_config(RetryConfig::new().with_max_retries(3).with_base_delay(Duration::from_millis(1)))
        .with_metrics(metrics);

    let outcome = policy.execute(|| {
        let count = call_count.fetch_add(1, Ordering::SeqCst);
        if count < 2 {
            Err(TestError(true))
        } else {
            Ok("success")
        }
    });

    assert!(outcome.is_ok());
}

#[test]
fn retry_budget_caps_attempts_below_max_retries() {
    let call_count = AtomicUsize::new(0);
    let policy = RetryPolicy::new()
        .with_config(RetryConfig::new().with_max_retries(10).with_base_delay(Duration::from_millis(1)))
        .with_retry_budget(2);

    let result = policy.execute(|| {
        call_count.fetch_add(1, Ordering::SeqCst);
        Err::<(), _>(TestError(true))
    });

    assert!(result.is_err());
    assert_eq!(call_count.load(Ordering::SeqCst), 3);
}

#[test]
fn retry_with_jitter_still_converges() {
    let call_count = AtomicUsize::new(0);
    let policy = RetryPolicy::new().with_config(
        RetryConfig::new()
            .with_max_retries(3)
            .with_base_delay(Duration::from_millis(1))
            .with_jitter(0.5),
    );

    let result = policy.execute(|| {
        let count = call_count.fetch_add(1, Ordering::SeqCst);
        if count < 2 {
            Err(TestError(true))
        } else {
            Ok("success")
        }
    });

    assert_eq!(result.unwrap(), "success");
    assert_eq!(call_count.load(Ordering::SeqCst), 3);
}
