//! Test infrastructure for postline delivery.
//!
//! Provides a wiremock-backed destination, clocks that make backoff sleeps
//! instant or manually gated, and a `TestEnv` that wires a real
//! `DeliveryCoordinator` to both.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

use std::{future::Future, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use postline_delivery::{
    ClientConfig, DeliveryClient, DeliveryConfig, DeliveryCoordinator, RetryPolicy,
};

pub mod clock;
pub mod http;

pub use clock::GatedClock;
pub use http::MockDestination;
pub use postline_core::{Clock, TestClock};

/// Test environment with a mock destination and a virtual clock.
///
/// Coordinators built from the environment talk to the mock destination over
/// real HTTP while their backoff sleeps complete instantly on `clock`.
pub struct TestEnv {
    /// Mock HTTP destination receiving every POST
    pub destination: MockDestination,
    /// Virtual clock recording every backoff sleep
    pub clock: TestClock,
}

impl TestEnv {
    /// Starts a mock destination and installs test tracing.
    pub async fn new() -> Self {
        init_test_tracing();
        Self { destination: MockDestination::start().await, clock: TestClock::new() }
    }

    /// Default coordinator configuration with a short client timeout.
    pub fn config(&self) -> DeliveryConfig {
        DeliveryConfig {
            client_config: ClientConfig { timeout: Duration::from_secs(5), ..Default::default() },
            ..Default::default()
        }
    }

    /// Builds a coordinator for the mock destination using `self.clock`.
    ///
    /// # Errors
    ///
    /// Returns error if the client or coordinator rejects `config`.
    pub fn coordinator(&self, config: DeliveryConfig) -> Result<DeliveryCoordinator> {
        self.coordinator_with_clock(config, Arc::new(self.clock.clone()))
    }

    /// Builds a coordinator for the mock destination using `clock`.
    ///
    /// # Errors
    ///
    /// Returns error if the client or coordinator rejects `config`.
    pub fn coordinator_with_clock(
        &self,
        config: DeliveryConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<DeliveryCoordinator> {
        let client = DeliveryClient::new(config.client_config.clone())
            .context("failed to build delivery client")?;
        DeliveryCoordinator::with_transport(self.destination.url(), config, Arc::new(client), clock)
            .context("failed to build delivery coordinator")
    }

    /// Coordinator configuration with custom bounds and default backoff.
    pub fn bounded_config(
        &self,
        max_workers: usize,
        queue_capacity: usize,
        max_attempts: u32,
    ) -> DeliveryConfig {
        DeliveryConfig {
            max_workers,
            queue_capacity,
            retry_policy: RetryPolicy { max_attempts, ..Default::default() },
            ..self.config()
        }
    }
}

/// Polls `condition` until it holds or `timeout` elapses.
///
/// # Errors
///
/// Returns error naming `what` if the condition never held.
pub async fn wait_until<F, Fut>(what: &str, timeout: Duration, mut condition: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        if condition().await {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            anyhow::bail!("timed out after {timeout:?} waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("error")),
        )
        .with_test_writer()
        .try_init();
}
