use std::future::Future;
use std::time::Duration;

/// Bounded retry with a fixed (optionally backing-off) inter-attempt delay.
///
/// Used where an operation races an out-of-band writer, e.g. webhook order
/// lookups racing the checkout commit. Waits are non-blocking
/// (`tokio::time::sleep`), so concurrent work on the same worker proceeds.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    pub backoff: f64,
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            backoff: 1.0,
        }
    }

    pub fn with_backoff(mut self, backoff: f64) -> Self {
        self.backoff = backoff;
        self
    }

    /// Runs `op` until it yields `Some`, an error, or attempts are
    /// exhausted. Errors propagate immediately; only `None` is retried.
    pub async fn until_some<T, E, F, Fut>(&self, mut op: F) -> Result<Option<T>, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut delay = self.delay;

        for attempt in 1..=attempts {
            if let Some(value) = op().await? {
                return Ok(Some(value));
            }
            if attempt < attempts {
                tokio::time::sleep(delay).await;
                delay = delay.mul_f64(self.backoff);
            }
        }

        Ok(None)
    }
}
