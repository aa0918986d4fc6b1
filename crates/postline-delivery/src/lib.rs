//! Reliable POST delivery to a single destination.
//!
//! This crate implements a small retry engine: a POST is attempted once, and
//! on any non-2xx response (or transport failure) it is queued for retry with
//! exponential backoff. Both the retry queue and the number of retry workers
//! are bounded.
//!
//! # Architecture
//!
//! 1. **Send** - `DeliveryCoordinator::send` dispatches the first attempt
//! 2. **Handle** - success finishes the send; failure queues a retry
//! 3. **Retry** - workers drain the queue, sleeping each record's backoff
//! 4. **Terminate** - success, exhausted attempts, or a full queue end a send
//!
//! # Key Features
//!
//! - **Bounded Workers** - at most `max_workers` retry workers, enforced by a
//!   semaphore
//! - **Bounded Queue** - at most `queue_capacity` records wait for retry; any
//!   overflow is dropped and reported as `AttemptOutcome::Dropped`
//! - **Exponential Backoff** - 1s base, doubling after every failure
//! - **Observable Outcomes** - every send exposes its latest `AttemptOutcome`
//!
//! # Example
//!
//! ```no_run
//! use postline_delivery::{DeliveryConfig, DeliveryCoordinator, DeliveryError};
//!
//! # async fn example() -> Result<(), DeliveryError> {
//! let coordinator =
//!     DeliveryCoordinator::with_config("http://localhost:8080/", DeliveryConfig::default())?;
//!
//! let response = coordinator.send("payload").await?;
//! assert!(response.status_code > 0);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod coordinator;
pub mod error;
pub mod queue;
pub mod retry;
pub mod transport;
mod worker;
mod worker_pool;

// Re-export main public API
pub use client::{ClientConfig, DeliveryClient};
pub use coordinator::{
    CoordinatorStats, DeliveryConfig, DeliveryCoordinator, SendHandle, SendStatus,
};
pub use error::{DeliveryError, Result};
pub use postline_core::PostRequest;
pub use retry::{AttemptOutcome, RetryPolicy};
pub use transport::{DeliveryResponse, Transport};

/// Default number of concurrent retry workers.
pub const DEFAULT_MAX_WORKERS: usize = 3;

/// Default number of records waiting for retry.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

/// Largest accepted retry queue capacity. The queue is allocated up front.
pub const MAX_QUEUE_CAPACITY: usize = 1 << 20;

/// Default number of attempts per send, first attempt included.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Default HTTP request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
