//! Time source shared by the cache and the retry executor.
//!
//! Production code uses [`SystemClock`]. Tests inject a [`ManualClock`], where
//! sleeping advances time instantly and every requested delay is recorded.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Monotonic time plus the ability to wait.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    fn sleep<'a>(&'a self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;
}

/// Wall-clock time backed by the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep<'a>(&'a self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(tokio::time::sleep(duration))
    }
}

#[derive(Debug, Default)]
struct ManualInner {
    elapsed: Duration,
    sleeps: Vec<Duration>,
}

/// Deterministic clock for tests.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    inner: Mutex<ManualInner>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            inner: Mutex::new(ManualInner::default()),
        }
    }

    pub fn advance(&self, duration: Duration) {
        let mut inner = self.inner.lock().expect("manual clock lock is not poisoned");
        inner.elapsed += duration;
    }

    /// Every delay passed to [`Clock::sleep`], in call order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.inner
            .lock()
            .expect("manual clock lock is not poisoned")
            .sleeps
            .clone()
    }

    pub fn elapsed(&self) -> Duration {
        self.inner
            .lock()
            .expect("manual clock lock is not poisoned")
            .elapsed
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn sleep<'a>(&'a self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        {
            let mut inner = self.inner.lock().expect("manual clock lock is not poisoned");
            inner.elapsed += duration;
            inner.sleeps.push(duration);
        }
        Box::pin(std::future::ready(()))
    }
}
