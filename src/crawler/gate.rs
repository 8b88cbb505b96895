//! Admission control for concurrent work
//!
//! An [`AdmissionGate`] is a counting semaphore with a FIFO wait queue. The
//! crawler uses two independent gates: one bounding requests on the wire
//! (owned by the downloader) and one per collection bounding how many crawl
//! units are alive at once.

use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// A granted slot; the slot is released when the permit is dropped
pub type GatePermit = OwnedSemaphorePermit;

/// The gate was closed while a caller was waiting
#[derive(Debug, Clone, Copy, Error)]
#[error("admission gate closed")]
pub struct GateClosed;

/// Counting semaphore with fixed capacity and FIFO wake-up order
///
/// Clones share the same slots.
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl AdmissionGate {
    /// Creates a gate admitting at most `capacity` holders (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Waits for a free slot
    ///
    /// Returns immediately when a slot is free. Otherwise the caller joins the
    /// back of the wait queue and is woken in arrival order.
    pub async fn acquire(&self) -> Result<GatePermit, GateClosed> {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| GateClosed)
    }

    /// Runs `task` while holding a slot
    ///
    /// The slot is released when the task finishes, and also if the returned
    /// future is dropped part-way through.
    pub async fn execute<F>(&self, task: F) -> Result<F::Output, GateClosed>
    where
        F: Future,
    {
        let _permit = self.acquire().await?;
        Ok(task.await)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of slots currently granted
    pub fn active(&self) -> usize {
        self.capacity - self.semaphore.available_permits()
    }
}
