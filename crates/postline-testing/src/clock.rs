//! Manually gated clock for freezing retry workers mid-backoff.

use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use postline_core::Clock;
use tokio::sync::Semaphore;

/// Clock whose sleeps park until released.
///
/// Lets a test hold retry workers inside their backoff sleep, so queue and
/// worker bounds can be observed in a fixed state. `release` lets a number of
/// sleepers through; `open` lets every current and future sleeper through.
#[derive(Debug, Clone)]
pub struct GatedClock {
    gate: Arc<Semaphore>,
    sleeping: Arc<AtomicUsize>,
}

impl GatedClock {
    /// Creates a closed gate.
    pub fn new() -> Self {
        Self { gate: Arc::new(Semaphore::new(0)), sleeping: Arc::new(AtomicUsize::new(0)) }
    }

    /// Lets `count` sleepers through.
    pub fn release(&self, count: usize) {
        self.gate.add_permits(count);
    }

    /// Releases every sleeper, now and later.
    pub fn open(&self) {
        self.gate.close();
    }

    /// Number of tasks currently parked in `sleep`.
    pub fn sleeping(&self) -> usize {
        self.sleeping.load(Ordering::Acquire)
    }
}

impl Default for GatedClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for GatedClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, _duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            self.sleeping.fetch_add(1, Ordering::AcqRel);
            // A closed gate fails the acquire, which ends the sleep.
            if let Ok(permit) = self.gate.acquire().await {
                permit.forget();
            }
            self.sleeping.fetch_sub(1, Ordering::AcqRel);
        })
    }
}
