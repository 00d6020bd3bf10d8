//! Fixed-cooldown retry policy for remote calls.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{Span, debug, error, warn};

use vigil_client::ServiceError;

/// Default pause after the server signals throttling.
pub const DEFAULT_RATE_LIMIT_COOLDOWN: Duration = Duration::from_secs(30);

/// Default pause after any other remote failure.
pub const DEFAULT_ERROR_COOLDOWN: Duration = Duration::from_secs(10);

/// Repeats an operation until it succeeds.
///
/// There is no attempt cap: a remote service that never recovers stalls the
/// calling account until the operator intervenes. The policy only carries
/// the two cooldowns; it has no per-call state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    rate_limit_cooldown: Duration,
    error_cooldown: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RATE_LIMIT_COOLDOWN, DEFAULT_ERROR_COOLDOWN)
    }
}

impl RetryPolicy {
    pub fn new(rate_limit_cooldown: Duration, error_cooldown: Duration) -> Self {
        Self {
            rate_limit_cooldown,
            error_cooldown,
        }
    }

    pub fn rate_limit_cooldown(&self) -> Duration {
        self.rate_limit_cooldown
    }

    pub fn error_cooldown(&self) -> Duration {
        self.error_cooldown
    }

    /// How long to wait after `err` before the next attempt.
    pub fn cooldown_for(&self, err: &ServiceError) -> Duration {
        match err {
            ServiceError::RateLimited => self.rate_limit_cooldown,
            ServiceError::Service { .. } => self.error_cooldown,
        }
    }

    /// Run `op` until it returns `Ok`, logging each failure under `span`.
    ///
    /// `op` is invoked once per attempt and must produce a fresh future.
    pub async fn execute<T, F, Fut>(&self, span: &Span, stage: &str, mut op: F) -> T
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let mut attempt: u64 = 0;

        loop {
            attempt += 1;

            let err = match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(parent: span, stage, attempt, "succeeded after retries");
                    }
                    return value;
                }
                Err(err) => err,
            };

            let cooldown = self.cooldown_for(&err);
            match &err {
                ServiceError::RateLimited => {
                    warn!(
                        parent: span,
                        stage,
                        attempt,
                        cooldown_secs = cooldown.as_secs(),
                        "too many requests, backing off"
                    );
                }
                ServiceError::Service { message } => {
                    error!(
                        parent: span,
                        stage,
                        attempt,
                        error = %message,
                        cooldown_secs = cooldown.as_secs(),
                        "remote call failed, retrying"
                    );
                }
            }

            sleep(cooldown).await;
        }
    }
}
