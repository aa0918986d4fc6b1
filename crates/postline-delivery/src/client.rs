//! HTTP client for POST delivery with configurable timeouts.
//!
//! Handles request construction and response processing. Every HTTP status
//! is handed back to the coordinator, which decides whether to retry.

use std::{future::Future, pin::Pin, time::Duration};

use postline_core::PostRequest;
use reqwest::Response;
use serde::{Deserialize, Serialize};

use crate::{
    error::{DeliveryError, Result},
    transport::{DeliveryResponse, Transport},
};

const MAX_RESPONSE_BODY_SIZE: usize = 64 * 1024;
const TRUNCATION_SUFFIX: &str = "... (truncated)";

/// Configuration for the delivery client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Timeout for a single HTTP request.
    pub timeout: Duration,
    /// User agent string for requests.
    pub user_agent: String,
    /// Maximum number of redirects to follow.
    pub max_redirects: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(crate::DEFAULT_TIMEOUT_SECONDS),
            user_agent: concat!("postline/", env!("CARGO_PKG_VERSION")).to_string(),
            max_redirects: 3,
        }
    }
}

/// reqwest-backed `Transport`.
///
/// Uses a pooled client so repeated attempts to the same destination reuse
/// connections.
#[derive(Debug, Clone)]
pub struct DeliveryClient {
    client: reqwest::Client,
    config: ClientConfig,
}

impl DeliveryClient {
    /// Creates a new delivery client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::ConfigurationError` if the HTTP client cannot
    /// be configured with the provided settings.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects as usize))
            .build()
            .map_err(|e| {
                DeliveryError::configuration(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self { client, config })
    }

    /// Creates a new delivery client with default configuration.
    pub fn with_defaults() -> Result<Self> {
        Self::new(ClientConfig::default())
    }

    /// Issues one POST for `request`.
    ///
    /// # Errors
    ///
    /// - `Timeout` when the configured request timeout elapses
    /// - `NetworkError` for connection and other transport failures
    pub async fn post(&self, request: &PostRequest) -> Result<DeliveryResponse> {
        let start_time = std::time::Instant::now();

        tracing::debug!(url = %request.url(), bytes = request.body().len(), "sending POST");

        let response =
            match self.client.post(request.url()).body(request.body().clone()).send().await {
                Ok(response) => response,
                Err(e) => {
                    let duration = start_time.elapsed();
                    tracing::warn!(duration_ms = duration.as_millis(), "request failed: {}", e);

                    if e.is_timeout() {
                        return Err(DeliveryError::timeout(self.config.timeout));
                    }
                    if e.is_connect() {
                        return Err(DeliveryError::network(format!("connection failed: {e}")));
                    }
                    return Err(DeliveryError::network(e.to_string()));
                },
            };

        let delivery_response = parse_response(response, start_time.elapsed()).await;

        tracing::debug!(
            status = delivery_response.status_code,
            duration_ms = delivery_response.duration.as_millis(),
            "received response"
        );

        Ok(delivery_response)
    }
}

impl Transport for DeliveryClient {
    fn execute<'a>(
        &'a self,
        request: &'a PostRequest,
    ) -> Pin<Box<dyn Future<Output = Result<DeliveryResponse>> + Send + 'a>> {
        Box::pin(self.post(request))
    }
}

/// Converts a reqwest response, reading at most a bounded amount of body.
async fn parse_response(response: Response, duration: Duration) -> DeliveryResponse {
    let status_code = response.status().as_u16();

    let body = match response.bytes().await {
        Ok(bytes) => truncate_body(&bytes),
        Err(e) => {
            tracing::warn!("failed to read response body: {}", e);
            format!("[failed to read response body: {e}]")
        },
    };

    DeliveryResponse::new(status_code, body, duration)
}

fn truncate_body(bytes: &[u8]) -> String {
    if bytes.len() > MAX_RESPONSE_BODY_SIZE {
        let kept = &bytes[..MAX_RESPONSE_BODY_SIZE - TRUNCATION_SUFFIX.len()];
        format!("{}{TRUNCATION_SUFFIX}", String::from_utf8_lossy(kept))
    } else {
        String::from_utf8_lossy(bytes).into_owned()
    }
}
