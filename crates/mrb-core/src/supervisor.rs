//! Keeping the retrieval loop alive: bounded connect retries with
//! exponential backoff, and a rolling-window restart rate limit for whole
//! bot-loop incarnations.
//!
//! The two disciplines are orthogonal: the retry handles connection
//! flakiness, the limiter handles crash flakiness.

use std::{
    future::Future,
    time::{Duration, Instant},
};

use tokio_util::sync::CancellationToken;

use crate::{errors::Error, Result};

/// Connect-attempt retry policy: `max_attempts` tries, waiting
/// `base_delay * factor^(n-1)` after the n-th failure.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub factor: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(5),
            factor: 2,
        }
    }
}

impl RetryPolicy {
    /// Backoff delay after the n-th failed attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let multiplier = self.factor.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(multiplier)
    }
}

/// Try to establish the retrieval loop, retrying on failure with
/// exponential backoff. Exhausting the budget is fatal and surfaced to the
/// caller; the backoff waits abort on shutdown.
pub async fn connect_with_retry<T, E, F, Fut>(
    policy: RetryPolicy,
    shutdown: &CancellationToken,
    mut op: F,
) -> Result<T>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
{
    for attempt in 1..=policy.max_attempts {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    attempt,
                    max = policy.max_attempts,
                    delay_secs = delay.as_secs(),
                    error = %e,
                    "connection attempt failed"
                );

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown.cancelled() => {
                        return Err(Error::External("shutdown during reconnect".to_string()));
                    }
                }

                if attempt == policy.max_attempts {
                    return Err(Error::External(format!(
                        "connection failed after {} attempts: {e}",
                        policy.max_attempts
                    )));
                }
            }
        }
    }

    Err(Error::Config("retry policy with zero attempts".to_string()))
}

/// Rolling-window cap on process restarts: at most `cap` restarts per
/// `window`; further attempts are withheld (logged by the caller) until
/// the window rolls over.
#[derive(Debug)]
pub struct RestartLimiter {
    cap: u32,
    window: Duration,
    state: RestartState,
}

#[derive(Debug, Default)]
struct RestartState {
    attempt_count: u32,
    window_start: Option<Instant>,
    last_restart: Option<Instant>,
}

impl RestartLimiter {
    pub fn new(cap: u32, window: Duration) -> Self {
        Self {
            cap,
            window,
            state: RestartState::default(),
        }
    }

    /// Record a restart attempt; `false` means the attempt is withheld.
    pub fn try_restart(&mut self) -> bool {
        self.try_restart_at(Instant::now())
    }

    pub fn try_restart_at(&mut self, now: Instant) -> bool {
        // Window rollover resets the counter.
        if let Some(start) = self.state.window_start {
            if now.duration_since(start) >= self.window {
                self.state.attempt_count = 0;
                self.state.window_start = None;
            }
        }

        if self.state.attempt_count >= self.cap {
            return false;
        }

        if self.state.window_start.is_none() {
            self.state.window_start = Some(now);
        }
        self.state.attempt_count += 1;
        self.state.last_restart = Some(now);
        true
    }

    pub fn attempts_in_window(&self) -> u32 {
        self.state.attempt_count
    }

    /// Time left until the current window rolls over (zero if no window is
    /// open).
    pub fn until_rollover(&self, now: Instant) -> Duration {
        match self.state.window_start {
            Some(start) => self.window.saturating_sub(now.duration_since(start)),
            None => Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn five_attempts_with_doubling_waits_then_fatal() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_secs(5),
            factor: 2,
        };
        let shutdown = CancellationToken::new();

        let started = tokio::time::Instant::now();
        let result: Result<()> = connect_with_retry(policy, &shutdown, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>("connection refused") }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 5);
        // Waits 5 + 10 + 20 + 40 + 80 seconds, then fatal; a 6th attempt
        // never happens.
        assert_eq!(started.elapsed(), Duration::from_secs(155));
    }

    #[tokio::test(start_paused = true)]
    async fn success_stops_retrying() {
        let attempts = AtomicU32::new(0);
        let shutdown = CancellationToken::new();

        let result = connect_with_retry(RetryPolicy::default(), &shutdown, || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err("flaky")
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_interrupts_backoff_wait() {
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let result: Result<()> =
            connect_with_retry(RetryPolicy::default(), &shutdown, || async {
                Err::<(), _>("down")
            })
            .await;

        let err = result.unwrap_err();
        assert!(err.to_string().contains("shutdown"));
    }

    #[test]
    fn delay_doubles_per_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(5));
        assert_eq!(policy.delay_for(2), Duration::from_secs(10));
        assert_eq!(policy.delay_for(5), Duration::from_secs(80));
    }

    #[test]
    fn restart_limiter_caps_within_window() {
        let mut limiter = RestartLimiter::new(10, Duration::from_secs(3600));
        let t0 = Instant::now();

        for i in 0..10 {
            assert!(
                limiter.try_restart_at(t0 + Duration::from_secs(i * 60)),
                "restart {i} should be allowed"
            );
        }
        assert!(!limiter.try_restart_at(t0 + Duration::from_secs(11 * 60)));
        assert_eq!(limiter.attempts_in_window(), 10);
    }

    #[test]
    fn restart_limiter_resets_after_window() {
        let mut limiter = RestartLimiter::new(2, Duration::from_secs(3600));
        let t0 = Instant::now();

        assert!(limiter.try_restart_at(t0));
        assert!(limiter.try_restart_at(t0 + Duration::from_secs(1)));
        assert!(!limiter.try_restart_at(t0 + Duration::from_secs(2)));

        // Window elapses; counter resets.
        assert!(limiter.try_restart_at(t0 + Duration::from_secs(3601)));
        assert_eq!(limiter.attempts_in_window(), 1);
    }
}
