//! Core primitives for reliable POST delivery.
//!
//! Provides the immutable request description, the per-request retry state
//! carried between attempts, and the clock abstraction used to time backoff
//! sleeps. The delivery crate builds its coordinator on these types.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod models;
pub mod time;

pub use models::{PostRequest, RetryRecord, DEFAULT_BASE_DELAY};
pub use time::{Clock, RealClock, TestClock};
