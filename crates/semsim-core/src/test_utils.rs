//! Shared test helpers for unit tests, integration tests, and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]`.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::config::SimConfig;
use crate::id::WorkerId;
use crate::notifier::ChangeNotifier;
use crate::state::SimulationState;
use crate::status::WorkerStatus;

// ===========================================================================
// Config and runtime helpers
// ===========================================================================

pub fn config(resources: usize, processes: usize, duration_ms: u64) -> SimConfig {
    SimConfig::new(resources, processes, duration_ms)
}

/// Single-threaded runtime with a paused clock. Timed pauses complete as
/// soon as every task is idle, so long tasks cost no wall time.
pub fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .expect("failed to build paused runtime")
}

/// Yield enough times for freshly spawned tasks to reach their first
/// suspension point.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

// ===========================================================================
// Recorder
// ===========================================================================

#[derive(Debug, Default)]
struct RecorderInner {
    state: Option<Weak<SimulationState>>,
    statuses: BTreeMap<WorkerId, Vec<WorkerStatus>>,
    progress: BTreeMap<WorkerId, Vec<u8>>,
    admissions: Vec<WorkerId>,
    peak_running: usize,
}

/// Observer that snapshots a store on every notification and keeps what it
/// saw: each worker's status sequence, the progress values seen while it
/// was running, and the largest number of simultaneous `Running` records.
///
/// On a current-thread runtime no worker runs between `Simulation::start`
/// and the caller's next `.await`, so attaching right after start misses
/// nothing.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    inner: Arc<Mutex<RecorderInner>>,
}

impl Recorder {
    /// Register a new recorder as the notifier's listener.
    pub fn install(notifier: &ChangeNotifier) -> Self {
        let recorder = Self::default();
        let r = recorder.clone();
        notifier.set(move || r.observe());
        recorder
    }

    /// Point the recorder at the store it should read, and take a first look.
    pub fn attach(&self, state: &Arc<SimulationState>) {
        self.inner.lock().state = Some(Arc::downgrade(state));
        self.observe();
    }

    fn observe(&self) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let Some(state) = inner.state.as_ref().and_then(Weak::upgrade) else {
            return;
        };
        let snapshot = state.snapshot();
        inner.peak_running = inner.peak_running.max(snapshot.running_count());

        for record in snapshot.records() {
            let statuses = inner.statuses.entry(record.id).or_default();
            if statuses.last() != Some(&record.status) {
                statuses.push(record.status);
                if record.status == WorkerStatus::Running {
                    inner.admissions.push(record.id);
                }
            }
            if record.status == WorkerStatus::Running {
                let trace = inner.progress.entry(record.id).or_default();
                if trace.last() != Some(&record.progress) {
                    trace.push(record.progress);
                }
            }
        }
    }

    /// Distinct consecutive statuses observed for `id`.
    pub fn statuses(&self, id: WorkerId) -> Vec<WorkerStatus> {
        self.inner.lock().statuses.get(&id).cloned().unwrap_or_default()
    }

    /// Progress values observed while `id` was running.
    pub fn progress(&self, id: WorkerId) -> Vec<u8> {
        self.inner.lock().progress.get(&id).cloned().unwrap_or_default()
    }

    /// Workers in the order they were first seen `Running`.
    pub fn admissions(&self) -> Vec<WorkerId> {
        self.inner.lock().admissions.clone()
    }

    pub fn peak_running(&self) -> usize {
        self.inner.lock().peak_running
    }

    /// Every worker id that has been observed at least once.
    pub fn workers(&self) -> Vec<WorkerId> {
        self.inner.lock().statuses.keys().copied().collect()
    }
}

/// True if `seq` is one of the three legal lifecycles.
pub fn is_legal_lifecycle(seq: &[WorkerStatus]) -> bool {
    use WorkerStatus::*;
    matches!(
        seq,
        [Waiting, Running, Finished] | [Waiting, Running, Interrupted] | [Waiting, Interrupted]
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn lifecycle_shapes() {
        use WorkerStatus::*;
        assert!(is_legal_lifecycle(&[Waiting, Running, Finished]));
        assert!(is_legal_lifecycle(&[Waiting, Interrupted]));
        assert!(!is_legal_lifecycle(&[Waiting, Running]));
        assert!(!is_legal_lifecycle(&[Running, Waiting, Running, Finished]));
    }

    #[test]
    fn recorder_tracks_status_and_progress() {
        let notifier = ChangeNotifier::new();
        let recorder = Recorder::install(&notifier);
        let state = Arc::new(SimulationState::new(Duration::ZERO, notifier));
        recorder.attach(&state);

        let id = WorkerId(0);
        state.insert_worker(id).unwrap();
        state.set_status(id, WorkerStatus::Running).unwrap();
        state.set_progress(id, 1).unwrap();
        state.set_progress(id, 2).unwrap();
        state.set_status(id, WorkerStatus::Finished).unwrap();

        assert_eq!(
            recorder.statuses(id),
            vec![WorkerStatus::Waiting, WorkerStatus::Running, WorkerStatus::Finished]
        );
        assert_eq!(recorder.progress(id), vec![0, 1, 2]);
        assert_eq!(recorder.peak_running(), 1);
        assert_eq!(recorder.workers(), vec![id]);
    }
}
