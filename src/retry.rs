//! Retry executor shared by page fetches and delivery polling.

use std::future::Future;
use std::time::Duration;

use tokio_retry::RetryIf;

/// Attempt budget plus exponential delay schedule.
///
/// The delay before retry `n` (0-based) is `base_delay * 2^n`, clamped to `max_delay` when set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Option<Duration>,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: None,
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    pub fn delay(&self, retry_index: u32) -> Duration {
        let factor = 2u32.checked_pow(retry_index).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor);
        match self.max_delay {
            Some(max) => delay.min(max),
            None => delay,
        }
    }

    /// Delays between consecutive attempts; one fewer than the attempt budget.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + use<> {
        let policy = *self;
        (0..policy.max_attempts.saturating_sub(1)).map(move |index| policy.delay(index))
    }

    /// Run `operation` until it succeeds, fails with an error `is_retryable` rejects, or the
    /// attempt budget runs out. The last error is returned in the latter two cases.
    pub async fn run<T, E, F, Fut, R>(&self, operation: F, mut is_retryable: R) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        R: FnMut(&E) -> bool,
    {
        RetryIf::start(self.delays(), operation, move |error: &E| is_retryable(error)).await
    }
}
