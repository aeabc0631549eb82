use std::future::Future;
use std::time::Duration;

/// Retry decision returned by the error classifier callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    Retry,
    Abort,
}

/// Fixed-interval retry configuration. No jitter, no exponential growth:
/// every failed attempt waits exactly `delay_secs` before the next one.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_secs: 5,
        }
    }
}

impl RetryConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }
}

/// Returned when an operation did not succeed within its attempt budget,
/// or when the classifier rejected an error as not worth retrying.
#[derive(Debug, thiserror::Error)]
#[error("gave up after {attempts} attempt(s): {last_error}")]
pub struct Exhausted<E> {
    pub attempts: u32,
    pub last_error: E,
}

/// Bounded-attempt wrapper around a fallible async operation.
///
/// Holds no per-call state: the attempt counter lives on the stack of each
/// `attempt` call, so one `Retrier` can be shared by every stage of a run.
#[derive(Debug, Clone)]
pub struct Retrier {
    config: RetryConfig,
}

impl Retrier {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Retry `operation` on every error until it succeeds or the attempt
    /// budget is spent.
    pub async fn attempt<F, Fut, T, E>(&self, operation: F) -> Result<T, Exhausted<E>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        self.attempt_with(|_| RetryAction::Retry, operation).await
    }

    /// Retry `operation` while `classifier` says the error is transient.
    ///
    /// The operation is invoked at most `max_attempts` times and never again
    /// once this returns. No sleep follows the final failed attempt.
    pub async fn attempt_with<F, Fut, T, E, C>(
        &self,
        classifier: C,
        operation: F,
    ) -> Result<T, Exhausted<E>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> RetryAction,
        E: std::fmt::Display,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let err = match operation().await {
                Ok(val) => return Ok(val),
                Err(e) => e,
            };

            if classifier(&err) == RetryAction::Abort {
                tracing::warn!("Request failed with a non-retryable error: {}", err);
                return Err(Exhausted {
                    attempts: attempt,
                    last_error: err,
                });
            }
            if attempt >= max_attempts {
                return Err(Exhausted {
                    attempts: attempt,
                    last_error: err,
                });
            }

            let delay = self.config.delay();
            tracing::warn!(
                "Request failed (attempt {}/{}), retrying in {}s: {}",
                attempt,
                max_attempts,
                delay.as_secs(),
                err
            );
            tokio::time::sleep(delay).await;
        }
    }
}
