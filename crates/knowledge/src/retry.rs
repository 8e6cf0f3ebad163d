//! Bounded waiting for resources that appear asynchronously.
//!
//! Index files may live on storage that is mounted after the process starts.
//! [`RetryPolicy::wait_until`] polls a readiness probe a bounded number of
//! times; it knows nothing about what is being waited for.

use std::future::Future;
use std::time::Duration;

/// Attempts, delay and backoff for a readiness wait.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total probes, including the first one
    pub attempts: u32,

    /// Delay before the second probe
    pub delay: Duration,

    /// Multiplier applied to the delay after each failed probe (1.0 = fixed)
    pub backoff_factor: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(2),
            backoff_factor: 1.0,
        }
    }
}

impl RetryPolicy {
    /// Fixed-delay policy.
    pub fn fixed(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts,
            delay,
            backoff_factor: 1.0,
        }
    }

    /// Probe once, no waiting.
    pub fn no_wait() -> Self {
        Self::fixed(1, Duration::ZERO)
    }

    pub fn with_backoff(mut self, factor: f32) -> Self {
        self.backoff_factor = factor.max(1.0);
        self
    }

    /// Delay before probe number `attempt + 2` (zero-based failed `attempt`).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = f64::from(self.backoff_factor).powi(attempt as i32);
        Duration::from_millis((self.delay.as_millis() as f64 * factor).round() as u64)
    }

    /// Run `probe` until it returns `true` or the attempts are used up.
    ///
    /// Returns whether the probe ever succeeded. At least one probe is
    /// always made, even when `attempts` is zero.
    pub async fn wait_until<F, Fut>(&self, what: &str, mut probe: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        let attempts = self.attempts.max(1);

        for attempt in 0..attempts {
            if probe().await {
                if attempt > 0 {
                    tracing::debug!("{} became available after {} retries", what, attempt);
                }
                return true;
            }

            if attempt + 1 < attempts {
                let delay = self.delay_for(attempt);
                tracing::debug!(
                    "{} not available (attempt {}/{}), retrying in {:?}",
                    what,
                    attempt + 1,
                    attempts,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
        }

        false
    }
}
