use std::{future::Future, time::Duration};

use tracing::warn;

/// Exponential backoff for transient failures: the delay starts at
/// `initial_backoff` and doubles after every failed attempt, capped at
/// `max_backoff`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

/// Failure after the policy gave up, with the number of attempts made.
#[derive(Debug)]
pub struct RetryExhausted {
    pub attempts: u32,
    pub error: crate::Error,
}

impl RetryPolicy {
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Runs `job` until it succeeds, fails with a non-retryable error, or
    /// `max_retries` retries have been spent.
    pub async fn run<T, F, Fut>(&self, label: &str, mut job: F) -> Result<T, RetryExhausted>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = crate::Result<T>>,
    {
        let mut retry = 0;
        loop {
            match job().await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_retryable() && retry < self.max_retries => {
                    let delay = self.backoff(retry);
                    warn!(
                        %label,
                        attempt = retry + 1,
                        delay = %humantime::format_duration(delay),
                        %error,
                        "request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
                Err(error) => {
                    return Err(RetryExhausted {
                        attempts: retry + 1,
                        error,
                    })
                }
            }
        }
    }
}
