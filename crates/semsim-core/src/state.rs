//! Thread-safe store of per-worker status and progress.
//!
//! # Concurrency
//!
//! All records live behind one `parking_lot::RwLock`. Mutators take the
//! write lock for the duration of a single record update; [`snapshot`]
//! takes the read lock and copies every record out. Status and progress of
//! a record always change together under the same lock, so a reader can
//! never see `Running` paired with progress left over from before the
//! reset.
//!
//! After a mutation succeeds and the lock has been dropped, the store
//! invokes its [`ChangeNotifier`]. Listeners therefore may read the store
//! from inside the callback.
//!
//! [`snapshot`]: SimulationState::snapshot

use std::collections::BTreeMap;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::id::WorkerId;
use crate::notifier::ChangeNotifier;
use crate::query::StateSnapshot;
use crate::status::WorkerStatus;

/// Progress value of a worker that has completed every sub-step.
pub const PROGRESS_MAX: u8 = 100;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Rejected store mutations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    #[error("worker {0} is not registered")]
    UnknownWorker(WorkerId),
    #[error("worker {0} is already registered")]
    DuplicateWorker(WorkerId),
    #[error("worker {id}: illegal transition {from} -> {to}")]
    IllegalTransition {
        id: WorkerId,
        from: WorkerStatus,
        to: WorkerStatus,
    },
    #[error("worker {id}: progress {value} exceeds {max}", max = PROGRESS_MAX)]
    ProgressOutOfRange { id: WorkerId, value: u8 },
    #[error("worker {id}: progress would regress from {current} to {value}")]
    ProgressRegressed { id: WorkerId, current: u8, value: u8 },
    #[error("worker {id}: progress written while {status}")]
    NotRunning { id: WorkerId, status: WorkerStatus },
}

// ---------------------------------------------------------------------------
// WorkerRecord
// ---------------------------------------------------------------------------

/// One worker's observable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerRecord {
    pub id: WorkerId,
    pub status: WorkerStatus,
    /// Sub-steps completed, 0..=100. Only meaningful while `Running`; keeps
    /// its final value once `Finished`.
    pub progress: u8,
}

impl WorkerRecord {
    /// A freshly registered worker: waiting, no progress.
    pub fn new(id: WorkerId) -> Self {
        Self {
            id,
            status: WorkerStatus::Waiting,
            progress: 0,
        }
    }

    /// Progress as a 0..1 fraction, 0 unless running or finished.
    pub fn progress_fraction(&self) -> f64 {
        match self.status {
            WorkerStatus::Running | WorkerStatus::Finished => {
                f64::from(self.progress) / f64::from(PROGRESS_MAX)
            }
            _ => 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// SimulationState
// ---------------------------------------------------------------------------

/// The per-run record store. Shared between workers as
/// `Arc<SimulationState>`; a new run always builds a new one.
#[derive(Debug)]
pub struct SimulationState {
    records: RwLock<BTreeMap<WorkerId, WorkerRecord>>,
    task_duration: Duration,
    notifier: ChangeNotifier,
}

impl SimulationState {
    /// Create an empty store for a run whose tasks take `task_duration`.
    pub fn new(task_duration: Duration, notifier: ChangeNotifier) -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            task_duration,
            notifier,
        }
    }

    /// Task duration shared by every worker of this run.
    pub fn task_duration(&self) -> Duration {
        self.task_duration
    }

    /// Register a worker in `Waiting`. Each id may be registered once.
    pub fn insert_worker(&self, id: WorkerId) -> Result<(), StateError> {
        {
            let mut records = self.records.write();
            if records.contains_key(&id) {
                return Err(StateError::DuplicateWorker(id));
            }
            records.insert(id, WorkerRecord::new(id));
        }
        self.notifier.notify();
        Ok(())
    }

    /// Move a worker to `status`. Entering `Running` resets progress to 0
    /// in the same critical section.
    pub fn set_status(&self, id: WorkerId, status: WorkerStatus) -> Result<(), StateError> {
        {
            let mut records = self.records.write();
            let record = records.get_mut(&id).ok_or(StateError::UnknownWorker(id))?;
            if !record.status.can_transition_to(status) {
                return Err(StateError::IllegalTransition {
                    id,
                    from: record.status,
                    to: status,
                });
            }
            record.status = status;
            if status == WorkerStatus::Running {
                record.progress = 0;
            }
        }
        self.notifier.notify();
        Ok(())
    }

    /// Record `value` sub-steps completed for a running worker.
    pub fn set_progress(&self, id: WorkerId, value: u8) -> Result<(), StateError> {
        if value > PROGRESS_MAX {
            return Err(StateError::ProgressOutOfRange { id, value });
        }
        {
            let mut records = self.records.write();
            let record = records.get_mut(&id).ok_or(StateError::UnknownWorker(id))?;
            if record.status != WorkerStatus::Running {
                return Err(StateError::NotRunning {
                    id,
                    status: record.status,
                });
            }
            if value < record.progress {
                return Err(StateError::ProgressRegressed {
                    id,
                    current: record.progress,
                    value,
                });
            }
            record.progress = value;
        }
        self.notifier.notify();
        Ok(())
    }

    /// Progress of one worker, 0 if it is not registered.
    pub fn get_progress(&self, id: WorkerId) -> u8 {
        self.records.read().get(&id).map_or(0, |r| r.progress)
    }

    pub fn get_status(&self, id: WorkerId) -> Option<WorkerStatus> {
        self.records.read().get(&id).map(|r| r.status)
    }

    pub fn get_record(&self, id: WorkerId) -> Option<WorkerRecord> {
        self.records.read().get(&id).copied()
    }

    /// Number of registered workers.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Point-in-time copy of every record, ordered by id.
    pub fn snapshot(&self) -> StateSnapshot {
        let records: Vec<WorkerRecord> = self.records.read().values().copied().collect();
        StateSnapshot::new(records, self.task_duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn store() -> SimulationState {
        SimulationState::new(Duration::from_millis(1000), ChangeNotifier::new())
    }

    fn running(state: &SimulationState, id: WorkerId) {
        state.insert_worker(id).unwrap();
        state.set_status(id, WorkerStatus::Running).unwrap();
    }

    #[test]
    fn insert_registers_waiting_record() {
        let state = store();
        state.insert_worker(WorkerId(0)).unwrap();
        assert_eq!(state.get_status(WorkerId(0)), Some(WorkerStatus::Waiting));
        assert_eq!(state.get_progress(WorkerId(0)), 0);
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn duplicate_insert_rejected() {
        let state = store();
        state.insert_worker(WorkerId(4)).unwrap();
        assert_eq!(
            state.insert_worker(WorkerId(4)),
            Err(StateError::DuplicateWorker(WorkerId(4)))
        );
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn unknown_worker_rejected() {
        let state = store();
        assert_eq!(
            state.set_status(WorkerId(9), WorkerStatus::Running),
            Err(StateError::UnknownWorker(WorkerId(9)))
        );
        assert_eq!(
            state.set_progress(WorkerId(9), 1),
            Err(StateError::UnknownWorker(WorkerId(9)))
        );
    }

    #[test]
    fn get_progress_defaults_to_zero() {
        let state = store();
        assert_eq!(state.get_progress(WorkerId(42)), 0);
        assert_eq!(state.get_status(WorkerId(42)), None);
    }

    #[test]
    fn entering_running_resets_progress() {
        let state = store();
        let id = WorkerId(0);
        running(&state, id);
        state.set_progress(id, 30).unwrap();
        assert_eq!(state.get_progress(id), 30);

        // Only one Running episode per worker, so a second entry is refused
        // and the progress is left untouched.
        assert!(state.set_status(id, WorkerStatus::Running).is_err());
        assert_eq!(state.get_progress(id), 30);
    }

    #[test]
    fn progress_is_monotonic_while_running() {
        let state = store();
        let id = WorkerId(1);
        running(&state, id);
        state.set_progress(id, 10).unwrap();
        state.set_progress(id, 10).unwrap();
        assert_eq!(
            state.set_progress(id, 9),
            Err(StateError::ProgressRegressed {
                id,
                current: 10,
                value: 9
            })
        );
    }

    #[test]
    fn progress_bounded_to_hundred() {
        let state = store();
        let id = WorkerId(2);
        running(&state, id);
        state.set_progress(id, PROGRESS_MAX).unwrap();
        let err = state.set_progress(id, 101).unwrap_err();
        assert_eq!(err, StateError::ProgressOutOfRange { id, value: 101 });
        assert_eq!(err.to_string(), "worker 2: progress 101 exceeds 100");
    }

    #[test]
    fn progress_requires_running() {
        let state = store();
        let id = WorkerId(3);
        state.insert_worker(id).unwrap();
        assert_eq!(
            state.set_progress(id, 5),
            Err(StateError::NotRunning {
                id,
                status: WorkerStatus::Waiting
            })
        );
    }

    #[test]
    fn finished_keeps_final_progress() {
        let state = store();
        let id = WorkerId(0);
        running(&state, id);
        state.set_progress(id, 100).unwrap();
        state.set_status(id, WorkerStatus::Finished).unwrap();
        let record = state.get_record(id).unwrap();
        assert_eq!(record.status, WorkerStatus::Finished);
        assert_eq!(record.progress, 100);
        assert_eq!(record.progress_fraction(), 1.0);
    }

    #[test]
    fn illegal_transition_reports_both_ends() {
        let state = store();
        let id = WorkerId(0);
        state.insert_worker(id).unwrap();
        state.set_status(id, WorkerStatus::Interrupted).unwrap();
        assert_eq!(
            state.set_status(id, WorkerStatus::Running),
            Err(StateError::IllegalTransition {
                id,
                from: WorkerStatus::Interrupted,
                to: WorkerStatus::Running,
            })
        );
    }

    #[test]
    fn every_successful_write_notifies_once() {
        let notifier = ChangeNotifier::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        notifier.set(move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
        let state = SimulationState::new(Duration::ZERO, notifier);
        let id = WorkerId(0);

        state.insert_worker(id).unwrap();
        state.set_status(id, WorkerStatus::Waiting).unwrap();
        state.set_status(id, WorkerStatus::Running).unwrap();
        state.set_progress(id, 1).unwrap();
        state.set_status(id, WorkerStatus::Finished).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 5);

        // Rejected writes stay silent.
        let _ = state.set_progress(id, 2);
        let _ = state.set_status(id, WorkerStatus::Running);
        assert_eq!(hits.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn listener_can_read_store_without_deadlock() {
        let notifier = ChangeNotifier::new();
        let state = Arc::new(SimulationState::new(Duration::ZERO, notifier.clone()));
        let seen = Arc::new(AtomicUsize::new(0));

        let weak = Arc::downgrade(&state);
        let s = seen.clone();
        notifier.set(move || {
            if let Some(state) = weak.upgrade() {
                s.store(state.snapshot().len(), Ordering::SeqCst);
            }
        });

        state.insert_worker(WorkerId(0)).unwrap();
        state.insert_worker(WorkerId(1)).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn concurrent_writers_on_distinct_ids() {
        let state = Arc::new(store());
        for i in 0..8 {
            state.insert_worker(WorkerId(i)).unwrap();
        }

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let state = state.clone();
                std::thread::spawn(move || {
                    let id = WorkerId(i);
                    state.set_status(id, WorkerStatus::Running).unwrap();
                    for step in 1..=PROGRESS_MAX {
                        state.set_progress(id, step).unwrap();
                    }
                    state.set_status(id, WorkerStatus::Finished).unwrap();
                })
            })
            .collect();

        // Reader racing the writers never sees a torn record.
        for _ in 0..200 {
            for record in state.snapshot().records() {
                assert!(record.progress <= PROGRESS_MAX);
                if record.status == WorkerStatus::Waiting {
                    assert_eq!(record.progress, 0);
                }
            }
        }

        for handle in handles {
            handle.join().unwrap();
        }
        let snap = state.snapshot();
        assert_eq!(snap.count(WorkerStatus::Finished), 8);
        assert!(snap.records().iter().all(|r| r.progress == PROGRESS_MAX));
    }
}
