use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::time::Instant;

use testpad_rounds::testpad::error::TestpadError;
use testpad_rounds::testpad::retry::{with_backoff, RetryPolicy};

#[tokio::test(start_paused = true)]
async fn test_always_rate_limited_is_attempted_max_times() {
    let counter = AtomicU32::new(0);
    let attempts = &counter;
    let policy = RetryPolicy::default();

    let result: Result<(), _> = with_backoff(&policy, move || async move {
        attempts.fetch_add(1, Ordering::SeqCst);
        Err(TestpadError::RateLimited {
            retry_after_secs: 1,
        })
    })
    .await;

    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(
        result.unwrap_err(),
        TestpadError::RateLimited {
            retry_after_secs: 1
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_retry_after_is_honoured_then_succeeds() {
    let counter = AtomicU32::new(0);
    let attempts = &counter;
    let policy = RetryPolicy::default();
    let start = Instant::now();

    let result = with_backoff(&policy, move || async move {
        if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(TestpadError::RateLimited {
                retry_after_secs: 5,
            })
        } else {
            Ok("projects")
        }
    })
    .await;

    assert_eq!(result, Ok("projects"));
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(5));
    // Exactly one wait, no trailing sleep
    assert!(elapsed < Duration::from_secs(6));
}

#[tokio::test(start_paused = true)]
async fn test_exponential_waits_when_hint_is_short() {
    let counter = AtomicU32::new(0);
    let attempts = &counter;
    let policy = RetryPolicy::new(4, Duration::from_secs(2));
    let start = Instant::now();

    let _: Result<(), _> = with_backoff(&policy, move || async move {
        attempts.fetch_add(1, Ordering::SeqCst);
        Err(TestpadError::RateLimited {
            retry_after_secs: 1,
        })
    })
    .await;

    assert_eq!(attempts.load(Ordering::SeqCst), 4);
    // 2 + 4 + 8 seconds between the four attempts
    assert_eq!(start.elapsed().as_secs(), 14);
}

#[tokio::test]
async fn test_other_errors_are_not_retried() {
    let counter = AtomicU32::new(0);
    let attempts = &counter;
    let policy = RetryPolicy::default();

    let result: Result<(), _> = with_backoff(&policy, move || async move {
        attempts.fetch_add(1, Ordering::SeqCst);
        Err(TestpadError::InvalidCredential)
    })
    .await;

    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(result.unwrap_err(), TestpadError::InvalidCredential);
}
