//! Delivery coordinator for a single destination.
//!
//! The coordinator accepts POST bodies, dispatches the first attempt of each
//! one, and on failure hands the retry record to a bounded queue drained by a
//! bounded set of retry workers.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐  send   ┌────────────┐  execute  ┌─────────────┐
//! │   caller    │────────▶│ Dispatcher │──────────▶│  Transport  │
//! └─────────────┘         └────────────┘           └─────────────┘
//!                           │       ▲
//!             failure: offer│       │attempt after backoff
//!                           ▼       │
//!                    ┌────────────┐ │  ┌──────────────┐
//!                    │ RetryQueue │─┴─▶│ RetryWorkers │ (≤ max_workers)
//!                    └────────────┘    └──────────────┘
//! ```
//!
//! Each record is owned by exactly one place at a time: the task running its
//! attempt, or the queue. Re-enqueueing happens only after the previous
//! attempt's response was handled, so attempts of one record never overlap.

use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex, PoisonError,
    },
    task::{Context, Poll},
};

use bytes::Bytes;
use postline_core::{Clock, PostRequest, RealClock, RetryRecord};
use serde::{Deserialize, Serialize};
use tokio::{
    runtime::Handle,
    sync::{watch, Semaphore},
    task::JoinHandle,
};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::{
    client::{ClientConfig, DeliveryClient},
    error::{DeliveryError, Result},
    queue::RetryQueue,
    retry::{AttemptOutcome, RetryPolicy},
    transport::{DeliveryResponse, Transport},
    worker::RetryWorker,
    worker_pool::WorkerPool,
};

/// Configuration for a delivery coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Maximum number of concurrently running retry workers.
    pub max_workers: usize,

    /// Maximum number of records waiting for a retry.
    pub queue_capacity: usize,

    /// Attempt budget and backoff base.
    pub retry_policy: RetryPolicy,

    /// HTTP client configuration.
    pub client_config: ClientConfig,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_workers: crate::DEFAULT_MAX_WORKERS,
            queue_capacity: crate::DEFAULT_QUEUE_CAPACITY,
            retry_policy: RetryPolicy::default(),
            client_config: ClientConfig::default(),
        }
    }
}

impl DeliveryConfig {
    /// Validates worker, queue and attempt bounds.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::ConfigurationError` naming the first invalid
    /// field.
    pub fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(DeliveryError::configuration("max_workers must be greater than 0"));
        }
        if self.max_workers > Semaphore::MAX_PERMITS {
            return Err(DeliveryError::configuration(format!(
                "max_workers must not exceed {}",
                Semaphore::MAX_PERMITS
            )));
        }
        if self.queue_capacity == 0 {
            return Err(DeliveryError::configuration("queue_capacity must be greater than 0"));
        }
        if self.queue_capacity > crate::MAX_QUEUE_CAPACITY {
            return Err(DeliveryError::configuration(format!(
                "queue_capacity must not exceed {}",
                crate::MAX_QUEUE_CAPACITY
            )));
        }
        if self.retry_policy.max_attempts == 0 {
            return Err(DeliveryError::configuration("max_attempts must be greater than 0"));
        }
        Ok(())
    }
}

/// Point-in-time view of coordinator activity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoordinatorStats {
    /// Retry workers currently running.
    pub active_workers: usize,
    /// Highest number of simultaneously running workers observed.
    pub peak_workers: usize,
    /// Records currently waiting in the retry queue.
    pub queued_retries: usize,
    /// Highest queue occupancy observed.
    pub peak_queued_retries: usize,
    /// HTTP attempts issued, first attempts included.
    pub attempts_issued: u64,
    /// Sends that reached a 2xx response.
    pub deliveries: u64,
    /// Failed attempts that were queued for another try.
    pub retries_scheduled: u64,
    /// Failed attempts dropped because the queue was full.
    pub dropped: u64,
    /// Sends abandoned after using every attempt.
    pub exhausted: u64,
}

#[derive(Debug, Default)]
struct Counters {
    attempts_issued: AtomicU64,
    deliveries: AtomicU64,
    retries_scheduled: AtomicU64,
    dropped: AtomicU64,
    exhausted: AtomicU64,
    peak_queued_retries: AtomicUsize,
}

/// Completion state shared by every attempt of one logical send.
#[derive(Debug)]
struct SendTracker {
    id: Uuid,
    finished: AtomicBool,
    outcome: watch::Sender<AttemptOutcome>,
}

impl SendTracker {
    fn new() -> Self {
        let (outcome, _) = watch::channel(AttemptOutcome::Pending);
        Self { id: Uuid::new_v4(), finished: AtomicBool::new(false), outcome }
    }

    fn record(&self, outcome: AttemptOutcome) {
        if outcome.finishes_send() {
            self.finished.store(true, Ordering::Release);
        }
        self.outcome.send_replace(outcome);
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}

/// A retry record together with the send it belongs to.
#[derive(Debug)]
pub(crate) struct PendingRetry {
    record: RetryRecord,
    tracker: Arc<SendTracker>,
}

impl PendingRetry {
    pub(crate) fn record(&self) -> &RetryRecord {
        &self.record
    }

    pub(crate) fn send_id(&self) -> Uuid {
        self.tracker.id
    }
}

/// Shared state reached by `send`, response handling and every worker.
pub(crate) struct Dispatcher {
    url: String,
    transport: Arc<dyn Transport>,
    queue: RetryQueue<PendingRetry>,
    workers: WorkerPool,
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
    runtime: Handle,
    counters: Counters,
}

impl Dispatcher {
    pub(crate) fn url(&self) -> &str {
        &self.url
    }

    pub(crate) fn queue(&self) -> &RetryQueue<PendingRetry> {
        &self.queue
    }

    pub(crate) fn workers(&self) -> &WorkerPool {
        &self.workers
    }

    pub(crate) fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Issues one attempt for `pending` and handles its response.
    ///
    /// Returns the transport result of this attempt. The retry decision is
    /// published on the send's status. A transport that panics counts as a
    /// failed attempt.
    pub(crate) async fn attempt(
        self: &Arc<Self>,
        pending: PendingRetry,
    ) -> Result<DeliveryResponse> {
        let PendingRetry { record, tracker } = pending;

        let span = info_span!(
            "post_attempt",
            send_id = %tracker.id,
            url = %self.url,
            attempt = record.attempts() + 1
        );

        self.counters.attempts_issued.fetch_add(1, Ordering::Relaxed);

        let transport = Arc::clone(&self.transport);
        let request = record.request().clone();
        let result = self
            .runtime
            .spawn(async move { transport.execute(&request).await }.instrument(span.clone()))
            .await
            .unwrap_or_else(|e| {
                Err(DeliveryError::internal(format!("transport task failed: {e}")))
            });

        span.in_scope(|| self.handle_response(&result, record, &tracker));
        result
    }

    /// Applies the retry decision for one handled attempt.
    fn handle_response(
        self: &Arc<Self>,
        result: &Result<DeliveryResponse>,
        mut record: RetryRecord,
        tracker: &Arc<SendTracker>,
    ) {
        match result {
            Ok(response) if response.is_success => {
                info!(status = response.status_code, "POST delivered");
                self.counters.deliveries.fetch_add(1, Ordering::Relaxed);
                tracker.record(AttemptOutcome::Delivered);
                return;
            },
            Ok(response) => {
                warn!(status = response.status_code, "POST failed with non-success status");
            },
            Err(error) => {
                warn!(error = %error, "POST failed without a response");
            },
        }

        record.record_failure();
        self.schedule_retry(record, tracker);
    }

    /// Queues a failed record for another attempt, or gives up on it.
    fn schedule_retry(self: &Arc<Self>, record: RetryRecord, tracker: &Arc<SendTracker>) {
        let attempts = record.attempts();

        if !self.policy.allows_retry(attempts) {
            error!(attempts, "POST abandoned, retry budget exhausted");
            self.counters.exhausted.fetch_add(1, Ordering::Relaxed);
            tracker.record(AttemptOutcome::Exhausted { attempts });
            return;
        }

        let wait = record.wait_time();
        // Publish before offering: once queued, a worker may finish the next
        // attempt and record its own outcome.
        tracker.record(AttemptOutcome::Queued { attempts });

        match self.queue.offer(PendingRetry { record, tracker: Arc::clone(tracker) }) {
            Ok(()) => {
                self.counters.peak_queued_retries.fetch_max(self.queue.len(), Ordering::AcqRel);
                self.counters.retries_scheduled.fetch_add(1, Ordering::Relaxed);
                debug!(attempts, wait_ms = wait.as_millis(), "retry queued");
                self.ensure_worker();
            },
            Err(_rejected) => {
                warn!(
                    attempts,
                    capacity = self.queue.capacity(),
                    "retry queue full, dropping POST"
                );
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracker.record(AttemptOutcome::Dropped { attempts });
            },
        }
    }

    /// Starts a retry worker if a slot is free.
    fn ensure_worker(self: &Arc<Self>) {
        let Some(slot) = self.workers.try_claim() else {
            debug!(
                active_workers = self.workers.active(),
                max_workers = self.workers.max_workers(),
                "all retry workers busy"
            );
            return;
        };

        let worker = RetryWorker::new(slot, Arc::clone(self));
        self.runtime.spawn(worker.run());
    }

    fn stats(&self) -> CoordinatorStats {
        CoordinatorStats {
            active_workers: self.workers.active(),
            peak_workers: self.workers.peak(),
            queued_retries: self.queue.len(),
            peak_queued_retries: self.counters.peak_queued_retries.load(Ordering::Acquire),
            attempts_issued: self.counters.attempts_issued.load(Ordering::Relaxed),
            deliveries: self.counters.deliveries.load(Ordering::Relaxed),
            retries_scheduled: self.counters.retries_scheduled.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            exhausted: self.counters.exhausted.load(Ordering::Relaxed),
        }
    }
}

/// Reliable POST delivery to one destination URL.
///
/// `send` returns after dispatching the first attempt. Failed attempts are
/// retried in the background with exponential backoff until the destination
/// answers 2xx, the attempt budget runs out, or the retry queue has no room.
///
/// # Example
///
/// ```no_run
/// use postline_delivery::{DeliveryCoordinator, DeliveryError};
///
/// # async fn example() -> Result<(), DeliveryError> {
/// let coordinator = DeliveryCoordinator::new("https://hooks.example.com/ingest")?;
///
/// let handle = coordinator.send(r#"{"event":"signup"}"#);
/// let status = handle.status();
/// let first = handle.await?;
/// println!("first attempt answered {}", first.status_code);
///
/// let outcome = status.wait_finished().await;
/// println!("send {outcome}");
/// # Ok(())
/// # }
/// ```
pub struct DeliveryCoordinator {
    dispatcher: Arc<Dispatcher>,
    latest: Mutex<Option<Arc<SendTracker>>>,
}

impl DeliveryCoordinator {
    /// Creates a coordinator for `url` with default configuration.
    ///
    /// # Errors
    ///
    /// See [`DeliveryCoordinator::with_transport`].
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Self::with_config(url, DeliveryConfig::default())
    }

    /// Creates a coordinator for `url` backed by a reqwest client.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if the HTTP client cannot be built, or
    /// for any reason listed on [`DeliveryCoordinator::with_transport`].
    pub fn with_config(url: impl Into<String>, config: DeliveryConfig) -> Result<Self> {
        let client = DeliveryClient::new(config.client_config.clone())?;
        Self::with_transport(url, config, Arc::new(client), Arc::new(RealClock::new()))
    }

    /// Creates a coordinator with an explicit transport and clock.
    ///
    /// Must be called from within a tokio runtime; retry workers are spawned
    /// onto it.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if the configuration is invalid, the URL
    /// is not an absolute http(s) URL, or no tokio runtime is running.
    pub fn with_transport(
        url: impl Into<String>,
        config: DeliveryConfig,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let url = url.into();
        let parsed = reqwest::Url::parse(&url)
            .map_err(|e| DeliveryError::configuration(format!("invalid destination URL: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(DeliveryError::configuration(format!(
                "unsupported URL scheme '{}'",
                parsed.scheme()
            )));
        }

        let runtime = Handle::try_current().map_err(|e| {
            DeliveryError::configuration(format!("delivery coordinator requires a tokio runtime: {e}"))
        })?;

        info!(
            url = %url,
            max_workers = config.max_workers,
            queue_capacity = config.queue_capacity,
            max_attempts = config.retry_policy.max_attempts,
            base_delay_ms = config.retry_policy.base_delay.as_millis(),
            "delivery coordinator created"
        );

        let dispatcher = Dispatcher {
            url,
            transport,
            queue: RetryQueue::new(config.queue_capacity),
            workers: WorkerPool::new(config.max_workers),
            policy: config.retry_policy,
            clock,
            runtime,
            counters: Counters::default(),
        };

        Ok(Self { dispatcher: Arc::new(dispatcher), latest: Mutex::new(None) })
    }

    /// Sends `body` as a POST to the configured URL.
    ///
    /// The first attempt is dispatched immediately, whether or not the
    /// returned handle is awaited. The handle resolves with the result of
    /// that first attempt only; retries continue in the background.
    pub fn send(&self, body: impl Into<Bytes>) -> SendHandle {
        let request = PostRequest::new(self.dispatcher.url.clone(), body);
        let record = self.dispatcher.policy.new_record(request);
        let tracker = Arc::new(SendTracker::new());

        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&tracker));

        debug!(send_id = %tracker.id, bytes = record.request().body().len(), "dispatching POST");

        let status = SendStatus {
            tracker: Arc::clone(&tracker),
            outcome: tracker.outcome.subscribe(),
        };
        let dispatcher = Arc::clone(&self.dispatcher);
        let first_attempt = self
            .dispatcher
            .runtime
            .spawn(async move { dispatcher.attempt(PendingRetry { record, tracker }).await });

        SendHandle { first_attempt, status }
    }

    /// Destination URL.
    pub fn url(&self) -> &str {
        &self.dispatcher.url
    }

    /// Retry workers currently running.
    pub fn active_workers(&self) -> usize {
        self.dispatcher.workers.active()
    }

    /// Records currently waiting for a retry.
    pub fn queue_len(&self) -> usize {
        self.dispatcher.queue.len()
    }

    /// Whether the most recent send has finished.
    ///
    /// `false` before the first send.
    pub fn is_finished(&self) -> bool {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|tracker| tracker.is_finished())
    }

    /// Returns current coordinator statistics.
    pub fn stats(&self) -> CoordinatorStats {
        self.dispatcher.stats()
    }
}

impl std::fmt::Debug for DeliveryCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryCoordinator")
            .field("url", &self.dispatcher.url)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

/// Completion state of one logical send.
///
/// Cheap to clone; stays valid after the `SendHandle` has been awaited.
#[derive(Debug, Clone)]
pub struct SendStatus {
    tracker: Arc<SendTracker>,
    outcome: watch::Receiver<AttemptOutcome>,
}

impl SendStatus {
    /// Identifier attached to every log event of this send.
    pub fn id(&self) -> Uuid {
        self.tracker.id
    }

    /// Whether the send was delivered or exhausted its attempts.
    pub fn is_finished(&self) -> bool {
        self.tracker.is_finished()
    }

    /// Outcome of the most recently handled attempt.
    pub fn outcome(&self) -> AttemptOutcome {
        *self.outcome.borrow()
    }

    /// Waits until no further attempt will be made and returns the final
    /// outcome: `Delivered`, `Exhausted` or `Dropped`.
    pub async fn wait_finished(&self) -> AttemptOutcome {
        let mut outcome = self.outcome.clone();
        let terminal =
            outcome.wait_for(AttemptOutcome::is_terminal).await.map(|terminal| *terminal);

        // The sender lives in the tracker this status keeps alive.
        terminal.unwrap_or_else(|_| *self.outcome.borrow())
    }
}

/// Handle to the first attempt of a send.
///
/// Resolves with that attempt's response. Use [`SendHandle::status`] to
/// follow the send through its retries.
#[derive(Debug)]
pub struct SendHandle {
    first_attempt: JoinHandle<Result<DeliveryResponse>>,
    status: SendStatus,
}

impl SendHandle {
    /// Completion state of this send.
    pub fn status(&self) -> SendStatus {
        self.status.clone()
    }
}

impl Future for SendHandle {
    type Output = Result<DeliveryResponse>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.first_attempt).poll(cx).map(|joined| {
            joined.unwrap_or_else(|e| {
                Err(DeliveryError::internal(format!("first attempt task failed: {e}")))
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use postline_core::TestClock;

    use super::*;
    use crate::transport::mock::{ScriptedReply, ScriptedTransport};

    fn coordinator(transport: &Arc<ScriptedTransport>, clock: &TestClock) -> DeliveryCoordinator {
        DeliveryCoordinator::with_transport(
            "http://localhost:1080/",
            DeliveryConfig::default(),
            Arc::clone(transport) as Arc<dyn Transport>,
            Arc::new(clock.clone()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn success_on_first_attempt_never_queues() {
        let transport = Arc::new(ScriptedTransport::always(200));
        let clock = TestClock::new();
        let coordinator = coordinator(&transport, &clock);

        let handle = coordinator.send("hello");
        let status = handle.status();
        let response = handle.await.unwrap();

        assert_eq!(response.status_code, 200);
        assert_eq!(status.wait_finished().await, AttemptOutcome::Delivered);
        assert!(status.is_finished());
        assert!(coordinator.is_finished());

        let stats = coordinator.stats();
        assert_eq!(stats.attempts_issued, 1);
        assert_eq!(stats.retries_scheduled, 0);
        assert_eq!(stats.peak_queued_retries, 0);
        assert_eq!(stats.peak_workers, 0);
        assert!(clock.recorded_sleeps().is_empty());
    }

    #[tokio::test]
    async fn always_failing_destination_exhausts_after_ten_attempts() {
        let transport = Arc::new(ScriptedTransport::always(300));
        let clock = TestClock::new();
        let coordinator = coordinator(&transport, &clock);

        let handle = coordinator.send("never lands");
        let status = handle.status();
        assert_eq!(handle.await.unwrap().status_code, 300);

        assert_eq!(status.wait_finished().await, AttemptOutcome::Exhausted { attempts: 10 });
        assert!(coordinator.is_finished());
        assert_eq!(transport.request_count(), 10);

        let expected_sleeps =
            (1..10).map(|n| Duration::from_millis(1000 * 2u64.pow(n))).collect::<Vec<_>>();
        assert_eq!(clock.recorded_sleeps(), expected_sleeps);
    }

    #[tokio::test]
    async fn recovers_after_transient_failures() {
        let transport = Arc::new(ScriptedTransport::sequence([503, 502, 500], 204));
        let clock = TestClock::new();
        let coordinator = coordinator(&transport, &clock);

        let status = coordinator.send("eventually").status();

        assert_eq!(status.wait_finished().await, AttemptOutcome::Delivered);
        assert_eq!(transport.request_count(), 4);
        assert_eq!(
            clock.recorded_sleeps(),
            vec![Duration::from_millis(2000), Duration::from_millis(4000), Duration::from_millis(8000)]
        );
    }

    #[tokio::test]
    async fn network_errors_are_retried() {
        let transport = Arc::new(ScriptedTransport::with_script(
            [ScriptedReply::NetworkError, ScriptedReply::NetworkError],
            ScriptedReply::Status(200),
        ));
        let clock = TestClock::new();
        let coordinator = coordinator(&transport, &clock);

        let handle = coordinator.send("flaky network");
        let status = handle.status();

        assert!(matches!(handle.await, Err(DeliveryError::NetworkError { .. })));
        assert_eq!(status.wait_finished().await, AttemptOutcome::Delivered);
        assert_eq!(transport.request_count(), 3);
    }

    #[tokio::test]
    async fn request_is_identical_across_attempts() {
        let transport = Arc::new(ScriptedTransport::sequence([500, 500, 500, 500], 200));
        let clock = TestClock::new();
        let coordinator = coordinator(&transport, &clock);

        coordinator.send("same body").status().wait_finished().await;

        let requests = transport.requests();
        assert_eq!(requests.len(), 5);
        assert!(requests.iter().all(|request| request == &requests[0]));
        assert_eq!(requests[0].url(), "http://localhost:1080/");
        assert_eq!(requests[0].method(), "POST");
        assert_eq!(requests[0].body().as_ref(), b"same body");
    }

    #[tokio::test]
    async fn single_attempt_budget_exhausts_immediately() {
        let transport = Arc::new(ScriptedTransport::always(500));
        let config = DeliveryConfig {
            retry_policy: RetryPolicy { max_attempts: 1, ..Default::default() },
            ..Default::default()
        };
        let coordinator = DeliveryCoordinator::with_transport(
            "http://localhost/",
            config,
            Arc::clone(&transport) as Arc<dyn Transport>,
            Arc::new(TestClock::new()),
        )
        .unwrap();

        let handle = coordinator.send("once");
        let status = handle.status();
        handle.await.unwrap();

        assert_eq!(status.outcome(), AttemptOutcome::Exhausted { attempts: 1 });
        assert_eq!(coordinator.stats().retries_scheduled, 0);
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn invalid_configuration_is_rejected() {
        let transport: Arc<dyn Transport> = Arc::new(ScriptedTransport::always(200));
        let clock: Arc<dyn Clock> = Arc::new(TestClock::new());

        let zero_workers = DeliveryConfig { max_workers: 0, ..Default::default() };
        let result = DeliveryCoordinator::with_transport(
            "http://localhost/",
            zero_workers,
            Arc::clone(&transport),
            Arc::clone(&clock),
        );
        assert!(matches!(result, Err(DeliveryError::ConfigurationError { .. })));

        let result = DeliveryCoordinator::with_transport(
            "not a url",
            DeliveryConfig::default(),
            Arc::clone(&transport),
            Arc::clone(&clock),
        );
        assert!(matches!(result, Err(DeliveryError::ConfigurationError { .. })));

        let result = DeliveryCoordinator::with_transport(
            "ftp://localhost/file",
            DeliveryConfig::default(),
            transport,
            clock,
        );
        assert!(matches!(result, Err(DeliveryError::ConfigurationError { .. })));
    }

    #[tokio::test]
    async fn oversized_bounds_are_rejected() {
        let transport: Arc<dyn Transport> = Arc::new(ScriptedTransport::always(200));
        let clock: Arc<dyn Clock> = Arc::new(TestClock::new());

        let too_many_workers = DeliveryConfig { max_workers: usize::MAX, ..Default::default() };
        let result = DeliveryCoordinator::with_transport(
            "http://localhost/",
            too_many_workers,
            Arc::clone(&transport),
            Arc::clone(&clock),
        );
        assert!(matches!(result, Err(DeliveryError::ConfigurationError { .. })));

        let huge_queue = DeliveryConfig { queue_capacity: usize::MAX, ..Default::default() };
        let result =
            DeliveryCoordinator::with_transport("http://localhost/", huge_queue, transport, clock);
        assert!(matches!(result, Err(DeliveryError::ConfigurationError { .. })));

        let largest = DeliveryConfig {
            max_workers: Semaphore::MAX_PERMITS,
            queue_capacity: crate::MAX_QUEUE_CAPACITY,
            ..Default::default()
        };
        assert!(largest.validate().is_ok());
    }

    /// Transport that panics on its first `panics` calls, then answers 200.
    #[derive(Debug)]
    struct PanickingTransport {
        panics: usize,
        calls: AtomicUsize,
    }

    impl PanickingTransport {
        fn new(panics: usize) -> Self {
            Self { panics, calls: AtomicUsize::new(0) }
        }
    }

    impl Transport for PanickingTransport {
        fn execute<'a>(
            &'a self,
            _request: &'a PostRequest,
        ) -> Pin<Box<dyn Future<Output = Result<DeliveryResponse>> + Send + 'a>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let panics = self.panics;
            Box::pin(async move {
                assert!(call >= panics, "transport blew up on call {call}");
                Ok(DeliveryResponse::new(200, "", Duration::ZERO))
            })
        }
    }

    #[tokio::test]
    async fn panicking_transport_counts_as_failed_attempt() {
        let transport = Arc::new(PanickingTransport::new(2));
        let coordinator = DeliveryCoordinator::with_transport(
            "http://localhost/",
            DeliveryConfig::default(),
            Arc::clone(&transport) as Arc<dyn Transport>,
            Arc::new(TestClock::new()),
        )
        .unwrap();

        let handle = coordinator.send("survives");
        let status = handle.status();

        assert!(matches!(handle.await, Err(DeliveryError::InternalError { .. })));

        let outcome =
            tokio::time::timeout(Duration::from_secs(5), status.wait_finished()).await.unwrap();
        assert_eq!(outcome, AttemptOutcome::Delivered);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
        assert_eq!(coordinator.stats().retries_scheduled, 2);
    }

    #[tokio::test]
    async fn always_panicking_transport_exhausts() {
        let transport: Arc<dyn Transport> = Arc::new(PanickingTransport::new(usize::MAX));
        let config = DeliveryConfig {
            retry_policy: RetryPolicy { max_attempts: 3, ..Default::default() },
            ..Default::default()
        };
        let coordinator = DeliveryCoordinator::with_transport(
            "http://localhost/",
            config,
            transport,
            Arc::new(TestClock::new()),
        )
        .unwrap();

        let status = coordinator.send("never").status();

        let outcome =
            tokio::time::timeout(Duration::from_secs(5), status.wait_finished()).await.unwrap();
        assert_eq!(outcome, AttemptOutcome::Exhausted { attempts: 3 });
        assert!(coordinator.is_finished());
        assert_eq!(coordinator.stats().attempts_issued, 3);
    }

    #[test]
    fn construction_outside_runtime_is_rejected() {
        let result = DeliveryCoordinator::with_transport(
            "http://localhost/",
            DeliveryConfig::default(),
            Arc::new(ScriptedTransport::always(200)),
            Arc::new(TestClock::new()),
        );

        assert!(matches!(result, Err(DeliveryError::ConfigurationError { .. })));
    }
}
