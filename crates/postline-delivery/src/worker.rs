//! Retry worker loop.
//!
//! A worker drains the pending queue: it sleeps each record's backoff delay,
//! re-attempts it, and exits as soon as the queue is empty. New failures start
//! a fresh worker when a slot is free.

use std::sync::Arc;

use tracing::{debug, info};

use crate::{coordinator::Dispatcher, worker_pool::WorkerSlot};

pub(crate) struct RetryWorker {
    slot: WorkerSlot,
    dispatcher: Arc<Dispatcher>,
}

impl RetryWorker {
    pub(crate) fn new(slot: WorkerSlot, dispatcher: Arc<Dispatcher>) -> Self {
        Self { slot, dispatcher }
    }

    /// Runs until the queue is empty and the slot has been released.
    pub(crate) async fn run(self) {
        let Self { mut slot, dispatcher } = self;
        info!(worker_id = slot.id(), url = %dispatcher.url(), "retry worker starting");

        loop {
            let processed = drain(&slot, &dispatcher).await;
            let worker_id = slot.id();
            drop(slot);

            // A failure handled between the last poll and the release above
            // could not claim this slot, so look once more before exiting.
            if dispatcher.queue().is_empty() {
                info!(worker_id, processed, "retry worker stopped, queue empty");
                return;
            }

            match dispatcher.workers().try_claim() {
                Some(next) => {
                    debug!(worker_id = next.id(), "retry worker resumed for late arrivals");
                    slot = next;
                },
                None => {
                    info!(worker_id, processed, "retry worker stopped, queue owned by others");
                    return;
                },
            }
        }
    }
}

async fn drain(slot: &WorkerSlot, dispatcher: &Arc<Dispatcher>) -> usize {
    let mut processed = 0;

    while let Some(pending) = dispatcher.queue().poll() {
        let wait = pending.record().wait_time();
        debug!(
            worker_id = slot.id(),
            send_id = %pending.send_id(),
            attempts = pending.record().attempts(),
            wait_ms = wait.as_millis(),
            "backing off before retry"
        );

        dispatcher.clock().sleep(wait).await;
        // The outcome is published on the send's status by `attempt`.
        let _response = dispatcher.attempt(pending).await;
        processed += 1;
    }

    processed
}
