//! Retry logic with classified failures, exponential backoff and jitter.
//!
//! One [`RetryExecutor`] serves every resource manager. The policy decides,
//! per failure kind, whether to retry and how long to wait:
//!
//! - `RateLimited`: `rate_limit_base * 2^attempt`, capped
//! - `Transient` and `Unclassified`: a fixed delay
//! - `Permanent`: returned immediately
//!
//! No sleep happens after the final attempt.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::api_error::{ApiError, ApiErrorKind};
use crate::clock::{Clock, SystemClock};
use crate::throttling::SharedRateLimiter;

/// Backoff strategy for retrying failed requests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Uses a fixed delay between retries.
    Fixed {
        /// Delay between retries.
        delay: Duration,
    },
    /// Uses an exponential delay between retries.
    ///
    /// The delay is calculated as `base * (factor ^ attempt)`.
    Exponential {
        /// The initial backoff duration.
        base: Duration,
        /// The multiplicative factor for each subsequent retry.
        factor: f64,
        /// The maximum duration to wait between retries.
        max: Duration,
        /// Whether to apply random jitter (+/- 25%) to the delay.
        jitter: bool,
    },
}

impl Backoff {
    /// Calculate the delay for a given retry attempt.
    ///
    /// # Arguments
    ///
    /// * `attempt` - The retry attempt number (0-based)
    pub fn delay(self, attempt: u32) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Exponential {
                base,
                factor,
                max,
                jitter,
            } => {
                let scale = factor.powi(attempt.min(i32::MAX as u32) as i32);
                let seconds = base.as_secs_f64() * scale;
                let capped_seconds = seconds.min(max.as_secs_f64());

                let mut delay = Duration::from_secs_f64(capped_seconds);

                if jitter {
                    let jitter_ms = (delay.as_millis() as f64 * 0.25) as u64;
                    let random_offset = fastrand::u64(0..=(jitter_ms * 2));
                    let total_ms =
                        delay.as_millis() as i64 + (random_offset as i64 - jitter_ms as i64);
                    delay = Duration::from_millis(total_ms.max(0) as u64);
                }

                delay
            }
        }
    }
}

/// Serializable retry settings shared by every call site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Enables or disables retrying. Disabled means one attempt only.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Attempt budget for list/get/batch reads.
    #[serde(default = "default_read_attempts")]
    pub read_attempts: u32,

    /// Attempt budget for mutations.
    #[serde(default = "default_mutation_attempts")]
    pub mutation_attempts: u32,

    /// First rate-limit delay in milliseconds; doubles on every retry.
    #[serde(default = "default_rate_limit_base_ms")]
    pub rate_limit_base_ms: u64,

    /// Upper bound for a single rate-limit delay in milliseconds.
    #[serde(default = "default_rate_limit_max_ms")]
    pub rate_limit_max_ms: u64,

    /// Fixed delay after a transient failure in milliseconds.
    #[serde(default = "default_transient_delay_ms")]
    pub transient_delay_ms: u64,

    /// Randomize rate-limit delays so concurrent callers spread out.
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            read_attempts: default_read_attempts(),
            mutation_attempts: default_mutation_attempts(),
            rate_limit_base_ms: default_rate_limit_base_ms(),
            rate_limit_max_ms: default_rate_limit_max_ms(),
            transient_delay_ms: default_transient_delay_ms(),
            jitter: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_read_attempts() -> u32 {
    5
}

fn default_mutation_attempts() -> u32 {
    3
}

fn default_rate_limit_base_ms() -> u64 {
    10_000
}

fn default_rate_limit_max_ms() -> u64 {
    300_000
}

fn default_transient_delay_ms() -> u64 {
    5_000
}

/// Which operations a policy is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallClass {
    Read,
    Mutation,
}

/// Retry decision table: attempt budget, per-kind backoff, retried kinds.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub rate_limited: Backoff,
    pub transient: Backoff,
    pub retry_on: Vec<ApiErrorKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default(), CallClass::Read)
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig, class: CallClass) -> Self {
        let max_attempts = if !config.enabled {
            1
        } else {
            match class {
                CallClass::Read => config.read_attempts,
                CallClass::Mutation => config.mutation_attempts,
            }
        };

        Self {
            max_attempts: max_attempts.max(1),
            rate_limited: Backoff::Exponential {
                base: Duration::from_millis(config.rate_limit_base_ms),
                factor: 2.0,
                max: Duration::from_millis(config.rate_limit_max_ms),
                jitter: config.jitter,
            },
            transient: Backoff::Fixed {
                delay: Duration::from_millis(config.transient_delay_ms),
            },
            retry_on: vec![
                ApiErrorKind::RateLimited,
                ApiErrorKind::Transient,
                ApiErrorKind::Unclassified,
            ],
        }
    }

    /// Single attempt, no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Delay to wait after `attempt` (0-based) failed with `error`, or `None`
    /// when the error kind is not retried.
    pub fn delay_for(&self, error: &ApiError, attempt: u32) -> Option<Duration> {
        if !self.retry_on.contains(&error.kind()) {
            return None;
        }

        let computed = match error.kind() {
            ApiErrorKind::RateLimited => self.rate_limited.delay(attempt),
            ApiErrorKind::Transient | ApiErrorKind::Unclassified => self.transient.delay(attempt),
            ApiErrorKind::Permanent => return None,
        };

        Some(match error.retry_after() {
            Some(hint) => computed.max(hint),
            None => computed,
        })
    }
}

/// Per-invocation retry bookkeeping, discarded when the call settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryState {
    pub attempt: u32,
    pub last_failure: Option<ApiErrorKind>,
    pub delay: Duration,
}

/// Runs a remote operation under a [`RetryPolicy`].
#[derive(Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
    limiter: Option<SharedRateLimiter>,
}

impl std::fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("policy", &self.policy)
            .field("limited", &self.limiter.is_some())
            .finish()
    }
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            clock: Arc::new(SystemClock),
            limiter: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Routes every attempt through a limiter shared with other executors.
    pub fn with_limiter(mut self, limiter: SharedRateLimiter) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Same clock and limiter, different policy.
    pub fn with_policy(&self, policy: RetryPolicy) -> Self {
        Self {
            policy,
            clock: Arc::clone(&self.clock),
            limiter: self.limiter.clone(),
        }
    }

    /// Executes `operation` until it succeeds, fails permanently, or the
    /// attempt budget runs out. The last error is returned on exhaustion.
    pub async fn execute<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut state = RetryState::default();

        loop {
            if let Some(limiter) = &self.limiter {
                limiter.acquire(self.clock.as_ref()).await;
            }

            state.attempt += 1;
            let error = match operation().await {
                Ok(value) => {
                    if state.attempt > 1 {
                        debug!(operation = label, attempts = state.attempt, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            state.last_failure = Some(error.kind());
            let Some(delay) = self.policy.delay_for(&error, state.attempt - 1) else {
                error!(
                    operation = label,
                    kind = %error.kind(),
                    code = ?error.code(),
                    "remote call failed without retry: {}",
                    error.message()
                );
                return Err(error);
            };

            if state.attempt >= self.policy.max_attempts {
                error!(
                    operation = label,
                    kind = %error.kind(),
                    attempts = state.attempt,
                    "retry budget exhausted: {}",
                    error.message()
                );
                return Err(error);
            }

            if error.kind() == ApiErrorKind::RateLimited {
                if let Some(limiter) = &self.limiter {
                    limiter.report_rate_limited(self.clock.now() + delay);
                }
            }

            state.delay = delay;
            warn!(
                operation = label,
                kind = %error.kind(),
                attempt = state.attempt,
                max_attempts = self.policy.max_attempts,
                delay_ms = delay.as_millis() as u64,
                "retrying remote call: {}",
                error.message()
            );
            self.clock.sleep(delay).await;
        }
    }
}
