//! HTTP mock destination for delivery testing.

use bytes::Bytes;
use wiremock::{matchers::method, Mock, MockServer, ResponseTemplate};

/// Mock destination answering POSTs with configured statuses.
pub struct MockDestination {
    server: MockServer,
}

impl MockDestination {
    /// Starts a new mock destination on a random port.
    pub async fn start() -> Self {
        Self { server: MockServer::start().await }
    }

    /// Base URL of the destination.
    pub fn url(&self) -> String {
        format!("{}/", self.server.uri())
    }

    /// Answers every POST with `status`.
    pub async fn always_respond(&self, status: u16) {
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Answers POSTs with `statuses` in order, then `fallback` forever.
    pub async fn respond_sequence(&self, statuses: &[u16], fallback: u16) {
        for status in statuses {
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(*status))
                .up_to_n_times(1)
                .mount(&self.server)
                .await;
        }
        self.always_respond(fallback).await;
    }

    /// Number of POSTs received so far.
    pub async fn request_count(&self) -> usize {
        self.server.received_requests().await.map_or(0, |requests| requests.len())
    }

    /// Bodies of every POST received, in arrival order.
    pub async fn received_bodies(&self) -> Vec<Bytes> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .map(|request| Bytes::from(request.body))
            .collect()
    }

    /// Number of POSTs received with `body`.
    pub async fn count_with_body(&self, body: &[u8]) -> usize {
        self.received_bodies().await.iter().filter(|received| received.as_ref() == body).count()
    }

    /// Asserts that exactly `expected` POSTs were received.
    pub async fn assert_request_count(&self, expected: usize) {
        let received = self.request_count().await;
        assert_eq!(received, expected, "expected {expected} requests, received {received}");
    }
}
