use anyhow::Result;
use std::time::Duration;
use tokio::time::sleep;

/// Retry budget and delay schedule for a fetch task.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: usize,
}

/// Runs `operation` up to `max_attempts` times, sleeping an exponentially
/// growing delay between attempts. `on_retry` is invoked after every failed
/// attempt with the delay that will precede the next one (or the final
/// error when the budget is exhausted).
pub(crate) async fn retry_with_backoff<T, F, Fut, L>(
    policy: RetryPolicy,
    mut operation: F,
    mut on_retry: L,
) -> Result<T>
where
    F: FnMut(usize) -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
    L: FnMut(usize, Duration, &anyhow::Error, bool),
{
    let max_attempts = policy.max_attempts.max(1);
    let mut delay = policy.initial_delay;

    for attempt in 1..=max_attempts {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let will_retry = attempt < max_attempts;
                on_retry(attempt, delay, &err, will_retry);
                if !will_retry {
                    return Err(err);
                }
                sleep(delay).await;
                delay = next_backoff(delay, policy.max_delay);
            }
        }
    }

    unreachable!("retry loop returns on the final attempt")
}

/// Doubles `current` and caps it at `max_backoff`. After `k` consecutive
/// failures the delay equals `min(initial * 2^k, max)`.
pub(crate) fn next_backoff(current: Duration, max_backoff: Duration) -> Duration {
    if current.is_zero() {
        return max_backoff.min(Duration::from_millis(1));
    }

    let mut next = current.saturating_mul(2);
    if next > max_backoff {
        next = max_backoff;
    }
    next
}
