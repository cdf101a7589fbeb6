use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::Clock;

/// Request quota for the whole platform account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Whether the quota is enforced locally.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Maximum requests per minute across every manager and worker.
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            requests_per_minute: default_requests_per_minute(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_requests_per_minute() -> u32 {
    200
}

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

#[derive(Debug, Default)]
struct Cooldown {
    until: Option<Instant>,
}

/// One rate-limit gate shared by every executor talking to the same account.
///
/// Two mechanisms stack: a local quota that spaces requests out before the
/// platform complains, and a cooldown that any caller arms after seeing a
/// rate-limit error. While the cooldown is armed every other caller waits it
/// out instead of hammering the limit independently.
#[derive(Clone)]
pub struct SharedRateLimiter {
    limiter: Option<Arc<DirectRateLimiter>>,
    cooldown: Arc<Mutex<Cooldown>>,
    throttled: Arc<AtomicU64>,
}

impl std::fmt::Debug for SharedRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedRateLimiter")
            .field("quota", &self.limiter.is_some())
            .field("throttled", &self.throttled_count())
            .finish()
    }
}

impl SharedRateLimiter {
    pub fn new(quota_window: Duration, quota_limit: u32) -> Self {
        let quota = quota_from_window(quota_window, quota_limit);
        Self {
            limiter: Some(Arc::new(RateLimiter::direct(quota))),
            cooldown: Arc::new(Mutex::new(Cooldown::default())),
            throttled: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Cooldown coordination only, no local quota.
    pub fn unlimited() -> Self {
        Self {
            limiter: None,
            cooldown: Arc::new(Mutex::new(Cooldown::default())),
            throttled: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        if config.enabled {
            Self::new(Duration::from_secs(60), config.requests_per_minute)
        } else {
            Self::unlimited()
        }
    }

    /// Waits out any armed cooldown, then for local quota budget.
    pub async fn acquire(&self, clock: &dyn Clock) {
        if let Some(wait) = self.cooldown_remaining(clock.now()) {
            self.throttled.fetch_add(1, Ordering::Relaxed);
            debug!(wait_ms = wait.as_millis() as u64, "waiting for shared rate-limit cooldown");
            clock.sleep(wait).await;
        }

        if let Some(limiter) = &self.limiter {
            if limiter.check().is_err() {
                self.throttled.fetch_add(1, Ordering::Relaxed);
                limiter.until_ready().await;
            }
        }
    }

    /// Arms (or extends) the shared cooldown.
    pub fn report_rate_limited(&self, until: Instant) {
        let mut cooldown = self
            .cooldown
            .lock()
            .expect("rate-limit cooldown lock is not poisoned");
        if cooldown.until.map_or(true, |current| until > current) {
            cooldown.until = Some(until);
        }
    }

    pub fn cooldown_remaining(&self, now: Instant) -> Option<Duration> {
        let cooldown = self
            .cooldown
            .lock()
            .expect("rate-limit cooldown lock is not poisoned");
        cooldown
            .until
            .filter(|until| *until > now)
            .map(|until| until - now)
    }

    /// Number of times a caller had to wait.
    pub fn throttled_count(&self) -> u64 {
        self.throttled.load(Ordering::Relaxed)
    }
}

fn quota_from_window(quota_window: Duration, quota_limit: u32) -> Quota {
    let safe_limit = quota_limit.max(1);
    let burst = NonZeroU32::new(safe_limit).unwrap_or(NonZeroU32::MIN);

    let seconds_per_cell = (quota_window.as_secs_f64() / f64::from(safe_limit)).max(0.001);
    let period = Duration::from_secs_f64(seconds_per_cell);

    Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
        .allow_burst(burst)
}
