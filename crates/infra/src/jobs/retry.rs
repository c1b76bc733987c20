//! Bounded retry with backoff for "still running" conditions.
//!
//! The attempt function reports one of three outcomes through [`Attempt`];
//! only [`Attempt::StillRunning`] is retried. Waits between attempts go through
//! a pluggable [`Sleeper`] and race the caller's [`CancellationToken`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Backoff strategy for retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackoffStrategy {
    /// Same delay before every retry
    Fixed,
    /// initial * retry
    Linear,
    /// initial * 2^(retry - 1)
    #[default]
    Exponential,
}

/// Retry policy configuration.
///
/// `max_retries` counts retries, not attempts: a policy with `max_retries = 10`
/// calls the attempt function at most 11 times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    /// Cap applied to every computed delay
    pub max_delay: Duration,
    pub strategy: BackoffStrategy,
}

impl Default for RetryPolicy {
    /// Export polling defaults: 10 retries, 30s growing to 60s.
    fn default() -> Self {
        Self {
            max_retries: 10,
            initial_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(60),
            strategy: BackoffStrategy::Exponential,
        }
    }
}

impl RetryPolicy {
    /// Exponential policy with the given bounds.
    pub fn new(max_retries: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
            max_delay,
            strategy: BackoffStrategy::Exponential,
        }
    }

    /// Single attempt, never waits.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay: delay,
            max_delay: delay,
            strategy: BackoffStrategy::Fixed,
        }
    }

    pub fn with_strategy(mut self, strategy: BackoffStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Upper bound on calls to the attempt function.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `retry` (1-indexed; 0 means no wait).
    ///
    /// Non-decreasing in `retry` and never above `max_delay`.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }

        let delay = match self.strategy {
            BackoffStrategy::Fixed => self.initial_delay,
            BackoffStrategy::Linear => self.initial_delay.saturating_mul(retry),
            BackoffStrategy::Exponential => {
                let factor = 1u32.checked_shl(retry - 1).unwrap_or(u32::MAX);
                self.initial_delay.saturating_mul(factor)
            }
        };

        delay.min(self.max_delay)
    }

    /// Whether another attempt is allowed after `attempts_made` attempts.
    pub fn should_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts()
    }
}

/// Outcome of one attempt.
#[derive(Debug)]
pub enum Attempt<T, P, E> {
    /// Done; returned to the caller as-is.
    Ready(T),
    /// Not done yet; back off and try again. Carries a hint kept for reporting.
    StillRunning(P),
    /// Not retryable; returned to the caller immediately.
    Fatal(E),
}

/// Why [`RetryExecutor::run`] gave up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError<P, E> {
    Fatal(E),
    /// Every allowed attempt reported still running; `last` is the final hint.
    Exhausted { attempts: u32, last: P },
    /// The cancellation token fired before a result was available.
    Cancelled { attempts: u32 },
}

/// Non-blocking wait used between attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, delay: Duration);
}

/// Tokio timer sleeper.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// Runs an attempt function under a [`RetryPolicy`].
#[derive(Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("policy", &self.policy)
            .field("sleeper", &"<sleeper>")
            .finish()
    }
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Call `attempt` (with the 1-indexed attempt number) until it is ready,
    /// fails fatally, the policy runs out, or `cancel` fires.
    pub async fn run<T, P, E, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut attempt: F,
    ) -> Result<T, RetryError<P, E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Attempt<T, P, E>>,
    {
        let max_attempts = self.policy.max_attempts();
        let mut made = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled { attempts: made });
            }
            made += 1;

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RetryError::Cancelled { attempts: made }),
                outcome = attempt(made) => outcome,
            };

            match outcome {
                Attempt::Ready(value) => {
                    if made > 1 {
                        debug!(attempts = made, "attempt succeeded after retries");
                    }
                    return Ok(value);
                }
                Attempt::Fatal(error) => return Err(RetryError::Fatal(error)),
                Attempt::StillRunning(hint) => {
                    if !self.policy.should_retry(made) {
                        warn!(attempts = made, "retries exhausted while still running");
                        return Err(RetryError::Exhausted {
                            attempts: made,
                            last: hint,
                        });
                    }

                    let delay = self.policy.delay_for_retry(made);
                    debug!(
                        attempt = made,
                        delay_ms = delay.as_millis() as u64,
                        "still running; backing off"
                    );

                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(RetryError::Cancelled { attempts: made }),
                        _ = self.sleeper.sleep(delay) => {}
                    }
                }
            }
        }
    }
}
