//! Request and retry-state models.
//!
//! A `PostRequest` is built once per logical send and never changes. The
//! `RetryRecord` wrapping it is the only thing that moves between the response
//! handler, the pending queue and the retry workers.

use std::time::Duration;

use bytes::Bytes;

/// Delay before the first retry is derived from this base.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Immutable description of an HTTP POST to a single destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostRequest {
    url: String,
    body: Bytes,
}

impl PostRequest {
    /// HTTP method used for every delivery attempt.
    pub const METHOD: &'static str = "POST";

    /// Creates a POST request for `url` carrying `body`.
    pub fn new(url: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self { url: url.into(), body: body.into() }
    }

    /// Destination URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// HTTP method, always `POST`.
    pub fn method(&self) -> &'static str {
        Self::METHOD
    }

    /// Raw request body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

/// Retry state for one logical send.
///
/// Holds the request together with the number of failed attempts and the
/// delay to wait before the next attempt. The delay always equals
/// `base * 2^attempts`; it saturates at `Duration::MAX` instead of
/// overflowing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryRecord {
    request: PostRequest,
    attempts: u32,
    wait_time: Duration,
}

impl RetryRecord {
    /// Wraps `request` with fresh retry state and the default base delay.
    pub fn new(request: PostRequest) -> Self {
        Self::with_base_delay(request, DEFAULT_BASE_DELAY)
    }

    /// Wraps `request` with fresh retry state and a custom base delay.
    pub fn with_base_delay(request: PostRequest, base_delay: Duration) -> Self {
        Self { request, attempts: 0, wait_time: base_delay }
    }

    /// Records one failed attempt.
    ///
    /// Doubles the wait time, then increments the attempt count, so the
    /// updated delay applies to the next attempt.
    pub fn record_failure(&mut self) {
        self.wait_time = self.wait_time.saturating_mul(2);
        self.attempts = self.attempts.saturating_add(1);
    }

    /// Number of failed attempts so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Delay to wait before the next attempt.
    pub fn wait_time(&self) -> Duration {
        self.wait_time
    }

    /// The request resent on every attempt.
    pub fn request(&self) -> &PostRequest {
        &self.request
    }
}
