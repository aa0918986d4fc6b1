//! Admission control for retry workers.
//!
//! Each running worker holds one permit of a semaphore sized to
//! `max_workers`, so the bound cannot be exceeded no matter how many response
//! handlers race to start workers.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Bounded set of retry worker slots.
#[derive(Debug)]
pub(crate) struct WorkerPool {
    slots: Arc<Semaphore>,
    max_workers: usize,
    next_worker_id: AtomicUsize,
    peak_workers: AtomicUsize,
}

/// A claimed worker slot. Dropping it frees the slot.
#[derive(Debug)]
pub(crate) struct WorkerSlot {
    id: usize,
    _permit: OwnedSemaphorePermit,
}

impl WorkerSlot {
    pub(crate) fn id(&self) -> usize {
        self.id
    }
}

impl WorkerPool {
    pub(crate) fn new(max_workers: usize) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(max_workers)),
            max_workers,
            next_worker_id: AtomicUsize::new(0),
            peak_workers: AtomicUsize::new(0),
        }
    }

    /// Claims a free slot, or `None` when every slot is taken.
    pub(crate) fn try_claim(&self) -> Option<WorkerSlot> {
        let permit = Arc::clone(&self.slots).try_acquire_owned().ok()?;
        self.peak_workers.fetch_max(self.active(), Ordering::AcqRel);

        let id = self.next_worker_id.fetch_add(1, Ordering::Relaxed);
        Some(WorkerSlot { id, _permit: permit })
    }

    /// Number of slots currently held by workers.
    pub(crate) fn active(&self) -> usize {
        self.max_workers.saturating_sub(self.slots.available_permits())
    }

    /// Highest number of simultaneously held slots observed.
    pub(crate) fn peak(&self) -> usize {
        self.peak_workers.load(Ordering::Acquire)
    }

    pub(crate) fn max_workers(&self) -> usize {
        self.max_workers
    }
}
