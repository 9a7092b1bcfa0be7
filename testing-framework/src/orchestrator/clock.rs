// File: testing-framework/src/orchestrator/clock.rs
//
// Clock Abstraction
//
// Every wait in the framework reads time and sleeps through this trait, so
// convergence loops can be driven by tokio's paused clock in tests and by
// real time against node processes.

use std::future::Future;
use std::pin::Pin;
use tokio::time::{self, Duration, Instant};

/// Source of time for waiters and the scenario driver.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use tokio::time::Duration;
/// use dagnet_testing_framework::orchestrator::clock::{Clock, SystemClock};
///
/// #[tokio::main]
/// async fn main() {
///     let clock: Arc<dyn Clock> = Arc::new(SystemClock);
///     let start = clock.now();
///     clock.sleep(Duration::from_millis(10)).await;
///     assert!(clock.now() - start >= Duration::from_millis(10));
/// }
/// ```
pub trait Clock: Send + Sync {
    /// Current instant
    fn now(&self) -> Instant;

    /// Sleep for `d`. Boxed so the trait stays object safe.
    fn sleep(&self, d: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Real wall-clock time, used against node processes.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        time::Instant::now()
    }

    fn sleep(&self, d: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(time::sleep(d))
    }
}

/// Tokio's paused clock.
///
/// Construction pauses the runtime clock, so it must be created inside a
/// current-thread runtime. With the clock paused, tokio auto-advances to the
/// next timer whenever every task is idle, which lets waiters run their full
/// timeout budget instantly.
pub struct PausedClock;

impl PausedClock {
    /// Pause the runtime clock
    pub fn new() -> Self {
        time::pause();
        Self
    }

    /// Move simulated time forward by `d`
    pub async fn advance(&self, d: Duration) {
        time::advance(d).await
    }
}

impl Clock for PausedClock {
    fn now(&self) -> Instant {
        time::Instant::now()
    }

    fn sleep(&self, d: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(time::sleep(d))
    }
}

impl Default for PausedClock {
    fn default() -> Self {
        Self::new()
    }
}
