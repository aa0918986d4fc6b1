//! Transport abstraction for issuing POST requests.
//!
//! The coordinator only needs to execute a POST without blocking the caller
//! and learn the resulting status code. Production code uses the reqwest
//! backed `DeliveryClient`; tests can substitute the scripted transport from
//! the `mock` module.

use std::{future::Future, pin::Pin, time::Duration};

use postline_core::PostRequest;

use crate::error::Result;

/// Response from a single POST attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryResponse {
    /// HTTP status code.
    pub status_code: u16,
    /// Response body (limited size).
    pub body: String,
    /// Total duration of the request.
    pub duration: Duration,
    /// Whether the request was successful (2xx status).
    pub is_success: bool,
}

impl DeliveryResponse {
    /// Builds a response, deriving `is_success` from the status class.
    pub fn new(status_code: u16, body: impl Into<String>, duration: Duration) -> Self {
        Self {
            status_code,
            body: body.into(),
            duration,
            is_success: (200..300).contains(&status_code),
        }
    }
}

/// Capability to execute a POST request asynchronously.
pub trait Transport: Send + Sync + 'static {
    /// Sends `request` and yields the destination's response.
    ///
    /// Any HTTP status is returned as `Ok`; only failures to obtain a
    /// response at all are errors.
    fn execute<'a>(
        &'a self,
        request: &'a PostRequest,
    ) -> Pin<Box<dyn Future<Output = Result<DeliveryResponse>> + Send + 'a>>;
}

pub mod mock {
    //! Scripted transport for testing coordinator logic without a network.
    //!
    //! Replies are consumed from a script in order; once the script runs out
    //! the fallback status is used for every further request.

    use std::{
        collections::VecDeque,
        future::Future,
        pin::Pin,
        sync::{Mutex, PoisonError},
        time::Duration,
    };

    use postline_core::PostRequest;

    use super::{DeliveryResponse, Transport};
    use crate::error::{DeliveryError, Result};

    /// A single scripted reply.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum ScriptedReply {
        /// Respond with this HTTP status.
        Status(u16),
        /// Fail without a response.
        NetworkError,
    }

    /// In-memory transport with scripted replies and a request log.
    #[derive(Debug)]
    pub struct ScriptedTransport {
        script: Mutex<VecDeque<ScriptedReply>>,
        fallback: ScriptedReply,
        requests: Mutex<Vec<PostRequest>>,
    }

    impl ScriptedTransport {
        /// Transport that answers every request with `status`.
        pub fn always(status: u16) -> Self {
            Self::with_script([], ScriptedReply::Status(status))
        }

        /// Transport that fails every request at the network level.
        pub fn unreachable() -> Self {
            Self::with_script([], ScriptedReply::NetworkError)
        }

        /// Transport answering with `statuses` in order, then `fallback`.
        pub fn sequence(statuses: impl IntoIterator<Item = u16>, fallback: u16) -> Self {
            Self::with_script(
                statuses.into_iter().map(ScriptedReply::Status),
                ScriptedReply::Status(fallback),
            )
        }

        /// Transport answering with `script` in order, then `fallback`.
        pub fn with_script(
            script: impl IntoIterator<Item = ScriptedReply>,
            fallback: ScriptedReply,
        ) -> Self {
            Self {
                script: Mutex::new(script.into_iter().collect()),
                fallback,
                requests: Mutex::new(Vec::new()),
            }
        }

        /// Every request executed so far, in order.
        pub fn requests(&self) -> Vec<PostRequest> {
            self.requests.lock().unwrap_or_else(PoisonError::into_inner).clone()
        }

        /// Number of requests executed so far.
        pub fn request_count(&self) -> usize {
            self.requests.lock().unwrap_or_else(PoisonError::into_inner).len()
        }

        /// Requests executed with the given body.
        pub fn requests_with_body(&self, body: &[u8]) -> Vec<PostRequest> {
            self.requests()
                .into_iter()
                .filter(|request| request.body().as_ref() == body)
                .collect()
        }

        fn next_reply(&self) -> ScriptedReply {
            self.script
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front()
                .unwrap_or(self.fallback)
        }
    }

    impl Transport for ScriptedTransport {
        fn execute<'a>(
            &'a self,
            request: &'a PostRequest,
        ) -> Pin<Box<dyn Future<Output = Result<DeliveryResponse>> + Send + 'a>> {
            Box::pin(async move {
                self.requests.lock().unwrap_or_else(PoisonError::into_inner).push(request.clone());
                let reply = self.next_reply();

                // Completion is observed asynchronously, as with a real client.
                tokio::task::yield_now().await;

                match reply {
                    ScriptedReply::Status(status) => {
                        Ok(DeliveryResponse::new(status, "", Duration::ZERO))
                    },
                    ScriptedReply::NetworkError => {
                        Err(DeliveryError::network("scripted connection failure"))
                    },
                }
            })
        }
    }

}
