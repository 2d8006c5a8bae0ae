//! Per-action retry policy.

use std::{fmt::Display, future::Future, time::Duration};

use {
    pilot_config::{BackoffKind, RetryConfig},
    tracing::debug,
};

use crate::error::BrowserError;

/// Errors that know whether another attempt could succeed.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for BrowserError {
    fn is_retryable(&self) -> bool {
        BrowserError::is_retryable(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: BackoffKind,
    initial: Duration,
    max: Duration,
}

impl RetryPolicy {
    /// Single attempt, no backoff.
    pub fn none() -> Self {
        Self::from(&RetryConfig::default())
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before attempt `attempt + 1`, where `attempt` starts at 1.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let delay = match self.backoff {
            BackoffKind::Fixed => self.initial,
            BackoffKind::Exponential => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                self.initial.saturating_mul(factor)
            },
        };
        delay.min(self.max)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempts are used up. Returns the outcome and the attempts made.
    pub async fn run<T, E, F, Fut>(&self, action: &str, mut op: F) -> (Result<T, E>, u32)
    where
        E: Retryable + Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return (Ok(value), attempt),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.backoff_for(attempt);
                    debug!(
                        action,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying action"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                },
                Err(e) => return (Err(e), attempt),
            }
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(cfg: &RetryConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            backoff: cfg.backoff,
            initial: Duration::from_millis(cfg.initial_backoff_ms),
            max: Duration::from_millis(cfg.max_backoff_ms),
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        std::sync::atomic::{AtomicU32, Ordering},
    };

    fn policy(max_attempts: u32, backoff: BackoffKind) -> RetryPolicy {
        RetryPolicy::from(&RetryConfig {
            max_attempts,
            backoff,
            initial_backoff_ms: 100,
            max_backoff_ms: 350,
        })
    }

    #[test]
    fn exponential_backoff_is_clamped() {
        let p = policy(5, BackoffKind::Exponential);
        assert_eq!(p.backoff_for(1), Duration::from_millis(100));
        assert_eq!(p.backoff_for(2), Duration::from_millis(200));
        assert_eq!(p.backoff_for(3), Duration::from_millis(350));
        assert_eq!(p.backoff_for(30), Duration::from_millis(350));
    }

    #[test]
    fn fixed_backoff_is_constant() {
        let p = policy(3, BackoffKind::Fixed);
        assert_eq!(p.backoff_for(1), p.backoff_for(2));
    }

    #[test]
    fn zero_attempts_means_one() {
        assert_eq!(policy(0, BackoffKind::Fixed).max_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_retryable_errors_until_success() {
        let calls = AtomicU32::new(0);
        let (result, attempts) = policy(3, BackoffKind::Fixed)
            .run("click", |_| async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(BrowserError::ElementNotFound("#x".into()))
                } else {
                    Ok("clicked")
                }
            })
            .await;
        assert_eq!(result.unwrap(), "clicked");
        assert_eq!(attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_after_max_attempts() {
        let (result, attempts) = policy(2, BackoffKind::Exponential)
            .run("navigate", |_| async {
                Err::<(), _>(BrowserError::Timeout("load".into()))
            })
            .await;
        assert!(matches!(result, Err(BrowserError::Timeout(_))));
        assert_eq!(attempts, 2);
    }

    #[tokio::test]
    async fn non_retryable_error_is_not_retried() {
        let (result, attempts) = policy(5, BackoffKind::Fixed)
            .run("type", |_| async {
                Err::<(), _>(BrowserError::InvalidAction("empty".into()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(attempts, 1);
    }
}
