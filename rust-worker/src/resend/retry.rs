//! Shared retry wrapper for outbound Resend calls.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::warn;

use super::client::ResendError;

/// Fixed attempt count with exponential backoff from a base delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Never less than 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Backoff before retry number `retry` (1-based): base, 2x base, 4x base...
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32 << retry.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(1000))
    }
}

/// Run `call` until it succeeds, fails with a non-retryable error, or the
/// policy's attempts are used up. The last error is returned.
pub async fn run_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut call: F,
) -> Result<T, ResendError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ResendError>>,
{
    let mut attempt = 1;

    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_retryable() || attempt >= policy.max_attempts => return Err(e),
            Err(e) => {
                let backoff = policy.backoff(attempt);
                // ThreadRng is not Send, so draw the jitter before awaiting.
                let jitter_ms = {
                    let max_jitter = (backoff.as_millis() / 4) as u64;
                    if max_jitter == 0 {
                        0
                    } else {
                        rand::thread_rng().gen_range(0..=max_jitter)
                    }
                };
                let delay = backoff + Duration::from_millis(jitter_ms);

                warn!(
                    operation = operation,
                    attempt = attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "resend_call_retrying"
                );

                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
