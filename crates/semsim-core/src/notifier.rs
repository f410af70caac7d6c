//! Single-slot change notification.
//!
//! The presentation layer registers one zero-argument callback; the state
//! store invokes it after every successful mutation. Registration replaces
//! any previous callback. The callback runs on the mutating worker's task,
//! so it should only hand off (wake a render loop, send on a channel) and
//! never block.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

/// The registered observer callback.
pub type ChangeListener = Arc<dyn Fn() + Send + Sync>;

struct NotifierInner {
    listener: RwLock<Option<ChangeListener>>,
    notifications: AtomicU64,
}

/// Cloneable handle to a single callback slot. Clones share the slot.
#[derive(Clone)]
pub struct ChangeNotifier {
    inner: Arc<NotifierInner>,
}

impl std::fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field(
                "listener",
                &if self.is_set() { "Some(<fn>)" } else { "None" },
            )
            .field("notifications", &self.notifications())
            .finish()
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeNotifier {
    /// Create an empty notifier. `notify` is a no-op until a listener is set.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(NotifierInner {
                listener: RwLock::new(None),
                notifications: AtomicU64::new(0),
            }),
        }
    }

    /// Register `listener`, replacing whatever was there.
    pub fn set<F>(&self, listener: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.inner.listener.write() = Some(Arc::new(listener));
    }

    /// Remove the current listener, if any.
    pub fn clear(&self) {
        *self.inner.listener.write() = None;
    }

    pub fn is_set(&self) -> bool {
        self.inner.listener.read().is_some()
    }

    /// Invoke the current listener.
    ///
    /// The slot lock is released before the call, so a listener may itself
    /// replace or clear the registration.
    pub fn notify(&self) {
        self.inner.notifications.fetch_add(1, Ordering::Relaxed);
        let listener = self.inner.listener.read().clone();
        if let Some(listener) = listener {
            listener();
        }
    }

    /// Number of `notify` calls since creation, with or without a listener.
    pub fn notifications(&self) -> u64 {
        self.inner.notifications.load(Ordering::Relaxed)
    }
}
