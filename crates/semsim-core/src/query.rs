//! Read-only views of simulation state for renderers.
//!
//! All types are owned copies. Nothing here borrows the live store, so a
//! snapshot can be handed to another thread or held across redraws.

use std::time::Duration;

use crate::id::WorkerId;
use crate::state::WorkerRecord;
use crate::status::WorkerStatus;

// ---------------------------------------------------------------------------
// State snapshot
// ---------------------------------------------------------------------------

/// Point-in-time copy of every worker record of one run, sorted by id.
#[derive(Debug, Clone, PartialEq)]
pub struct StateSnapshot {
    records: Vec<WorkerRecord>,
    task_duration: Duration,
}

impl StateSnapshot {
    pub(crate) fn new(records: Vec<WorkerRecord>, task_duration: Duration) -> Self {
        debug_assert!(records.windows(2).all(|w| w[0].id < w[1].id));
        Self {
            records,
            task_duration,
        }
    }

    /// Records ordered by worker id.
    pub fn records(&self) -> &[WorkerRecord] {
        &self.records
    }

    pub fn get(&self, id: WorkerId) -> Option<&WorkerRecord> {
        self.records
            .binary_search_by_key(&id, |r| r.id)
            .ok()
            .map(|i| &self.records[i])
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn task_duration(&self) -> Duration {
        self.task_duration
    }

    /// Number of records currently in `status`.
    pub fn count(&self, status: WorkerStatus) -> usize {
        self.records.iter().filter(|r| r.status == status).count()
    }

    pub fn running_count(&self) -> usize {
        self.count(WorkerStatus::Running)
    }

    /// True once every worker is `Finished` or `Interrupted`. An empty run
    /// is trivially complete.
    pub fn all_terminal(&self) -> bool {
        self.records.iter().all(|r| r.status.is_terminal())
    }

    /// Per-status tallies in lifecycle order.
    pub fn tally(&self) -> [(WorkerStatus, usize); 4] {
        WorkerStatus::ALL.map(|s| (s, self.count(s)))
    }
}
