//! Fair counting gate bounding how many workers may run at once.
//!
//! Backed by `tokio::sync::Semaphore`, which queues waiters and hands out
//! permits strictly in request order. A waiter that is cancelled leaves
//! the queue without taking a permit.
//!
//! Permits are scoped: [`Permit`] returns its permit when dropped, so every
//! exit path of a worker (completion, cancellation, panic unwinding) gives
//! the permit back exactly once.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why an acquire did not produce a permit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    #[error("acquire cancelled while waiting for a permit")]
    Cancelled,
    #[error("gate closed")]
    Closed,
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Lifetime counters of a gate. `acquired - released` is the number of
/// permits currently out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GateStats {
    pub acquired: u64,
    pub released: u64,
}

impl GateStats {
    pub fn outstanding(&self) -> u64 {
        self.acquired.saturating_sub(self.released)
    }
}

// ---------------------------------------------------------------------------
// ResourceGate
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct GateInner {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    acquired: AtomicU64,
    released: AtomicU64,
}

/// Cloneable handle to one run's permit pool.
#[derive(Debug, Clone)]
pub struct ResourceGate {
    inner: Arc<GateInner>,
}

impl ResourceGate {
    /// Create a gate with `permits` permits.
    ///
    /// `permits` must not exceed [`Semaphore::MAX_PERMITS`]; the config
    /// layer rejects larger values before a run is built.
    pub fn new(permits: usize) -> Self {
        Self {
            inner: Arc::new(GateInner {
                semaphore: Arc::new(Semaphore::new(permits)),
                capacity: permits,
                acquired: AtomicU64::new(0),
                released: AtomicU64::new(0),
            }),
        }
    }

    /// Wait for a permit in arrival order.
    ///
    /// Resolves to [`GateError::Cancelled`] as soon as `cancel` fires while
    /// queued; in that case no permit was taken. Cancellation wins if both
    /// become ready at the same time.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<Permit, GateError> {
        let acquire = self.inner.semaphore.clone().acquire_owned();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(GateError::Cancelled),
            result = acquire => {
                let permit = result.map_err(|_| GateError::Closed)?;
                self.inner.acquired.fetch_add(1, Ordering::SeqCst);
                Ok(Permit {
                    permit: Some(permit),
                    gate: self.inner.clone(),
                })
            }
        }
    }

    /// Total permits, R.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Permits not currently held.
    pub fn available(&self) -> usize {
        self.inner.semaphore.available_permits()
    }

    /// Permits currently held.
    pub fn outstanding(&self) -> usize {
        self.capacity().saturating_sub(self.available())
    }

    pub fn stats(&self) -> GateStats {
        GateStats {
            acquired: self.inner.acquired.load(Ordering::SeqCst),
            released: self.inner.released.load(Ordering::SeqCst),
        }
    }

    /// Fail every queued and future acquire with [`GateError::Closed`].
    /// Permits already handed out stay valid.
    pub fn close(&self) {
        self.inner.semaphore.close();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.semaphore.is_closed()
    }
}

// ---------------------------------------------------------------------------
// Permit
// ---------------------------------------------------------------------------

/// One held permit. Returned to the gate on drop.
#[derive(Debug)]
#[must_use = "dropping a permit releases it immediately"]
pub struct Permit {
    permit: Option<OwnedSemaphorePermit>,
    gate: Arc<GateInner>,
}

impl Permit {
    /// Return the permit now, waking the longest-waiting acquirer.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        if let Some(permit) = self.permit.take() {
            self.gate.released.fetch_add(1, Ordering::SeqCst);
            drop(permit);
        }
    }
}
