//! Bounded-concurrency admission for outbound scrape jobs.
//!
//! Up to `max_active` jobs run at once. Further callers wait in FIFO order
//! (tokio's semaphore is fair), but only `max_queue_depth` of them; anyone
//! beyond that is refused immediately so a burst cannot pile up unbounded
//! work against third-party sites.

use crate::metrics::{GATE_ACTIVE, GATE_QUEUED, GATE_REJECTIONS};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio_util::sync::CancellationToken;
use vitrine_core::config::ScrapeConfig;

/// Why a slot was not granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    #[error("too many scrape jobs queued")]
    QueueFull,

    #[error("scrape job aborted")]
    Aborted,
}

/// Admission gate for scrape jobs.
#[derive(Clone, Debug)]
pub struct ConcurrencyGate {
    inner: Arc<GateInner>,
}

#[derive(Debug)]
struct GateInner {
    semaphore: Arc<Semaphore>,
    max_active: usize,
    max_queue_depth: usize,
    queued: AtomicUsize,
}

/// A held slot. Dropping it hands the slot to the oldest waiter.
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        GATE_ACTIVE.dec();
    }
}

/// Releases a reserved queue position when the waiter leaves the queue,
/// including when its future is dropped.
struct QueueSlot<'a> {
    queued: &'a AtomicUsize,
}

impl Drop for QueueSlot<'_> {
    fn drop(&mut self) {
        self.queued.fetch_sub(1, Ordering::AcqRel);
        GATE_QUEUED.dec();
    }
}

impl ConcurrencyGate {
    pub fn new(max_active: usize, max_queue_depth: usize) -> Self {
        Self {
            inner: Arc::new(GateInner {
                semaphore: Arc::new(Semaphore::new(max_active)),
                max_active,
                max_queue_depth,
                queued: AtomicUsize::new(0),
            }),
        }
    }

    pub fn from_config(config: &ScrapeConfig) -> Self {
        Self::new(config.max_concurrent, config.max_queue_depth)
    }

    /// Acquire a slot, waiting in line if all are taken.
    ///
    /// Fails with `QueueFull` without waiting when the queue is at depth,
    /// and with `Aborted` if `cancel` fires before or while waiting, or is
    /// observed right after the slot is granted (the slot is released).
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<GatePermit, GateError> {
        if cancel.is_cancelled() {
            return Err(reject(GateError::Aborted));
        }

        match self.inner.semaphore.clone().try_acquire_owned() {
            Ok(permit) => return Ok(granted(permit)),
            Err(TryAcquireError::NoPermits) => {}
            // The semaphore is never closed
            Err(TryAcquireError::Closed) => return Err(reject(GateError::Aborted)),
        }

        let _slot = self.reserve_queue_slot()?;

        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(reject(GateError::Aborted)),
            permit = self.inner.semaphore.clone().acquire_owned() => {
                permit.map_err(|_| reject(GateError::Aborted))?
            }
        };

        let permit = granted(permit);
        if cancel.is_cancelled() {
            return Err(reject(GateError::Aborted));
        }
        Ok(permit)
    }

    /// Jobs currently holding a slot.
    pub fn active(&self) -> usize {
        self.inner.max_active - self.inner.semaphore.available_permits()
    }

    /// Jobs currently waiting for a slot.
    pub fn queued(&self) -> usize {
        self.inner.queued.load(Ordering::Acquire)
    }

    fn reserve_queue_slot(&self) -> Result<QueueSlot<'_>, GateError> {
        let max = self.inner.max_queue_depth;
        self.inner
            .queued
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max).then_some(n + 1)
            })
            .map_err(|_| reject(GateError::QueueFull))?;
        GATE_QUEUED.inc();
        Ok(QueueSlot {
            queued: &self.inner.queued,
        })
    }
}

fn granted(permit: OwnedSemaphorePermit) -> GatePermit {
    GATE_ACTIVE.inc();
    GatePermit { _permit: permit }
}

fn reject(err: GateError) -> GateError {
    let reason = match err {
        GateError::QueueFull => "queue_full",
        GateError::Aborted => "aborted",
    };
    GATE_REJECTIONS.with_label_values(&[reason]).inc();
    err
}
