//! Worker lifecycle states and the legal transitions between them.
//!
//! ```text
//! Waiting ──> Running ──> Finished
//!    │           │
//!    │           └──────> Interrupted
//!    └──────────────────> Interrupted
//! ```
//!
//! Transitions only move forward. `Finished` and `Interrupted` are terminal.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// WorkerStatus
// ---------------------------------------------------------------------------

/// Where a worker is in its lifecycle.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum WorkerStatus {
    /// Queued at the gate, no permit held.
    #[default]
    Waiting,
    /// Holding a permit and working through its sub-steps.
    Running,
    /// Completed all sub-steps and returned its permit.
    Finished,
    /// Cancelled, either while queued or while running.
    Interrupted,
}

impl WorkerStatus {
    /// Every status, in lifecycle order. Used for legends and tallies.
    pub const ALL: [WorkerStatus; 4] = [
        WorkerStatus::Waiting,
        WorkerStatus::Running,
        WorkerStatus::Finished,
        WorkerStatus::Interrupted,
    ];

    /// Whether the status can never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, WorkerStatus::Finished | WorkerStatus::Interrupted)
    }

    /// Whether moving from `self` to `next` is allowed.
    ///
    /// Re-entering `Waiting` from `Waiting` is accepted because a worker
    /// announces itself as waiting after its record was registered.
    pub fn can_transition_to(self, next: WorkerStatus) -> bool {
        use WorkerStatus::*;
        matches!(
            (self, next),
            (Waiting, Waiting)
                | (Waiting, Running)
                | (Waiting, Interrupted)
                | (Running, Finished)
                | (Running, Interrupted)
        )
    }

    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            WorkerStatus::Waiting => "Waiting",
            WorkerStatus::Running => "Running",
            WorkerStatus::Finished => "Finished",
            WorkerStatus::Interrupted => "Interrupted",
        }
    }
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use WorkerStatus::*;

    #[test]
    fn terminal_states() {
        assert!(!Waiting.is_terminal());
        assert!(!Running.is_terminal());
        assert!(Finished.is_terminal());
        assert!(Interrupted.is_terminal());
    }

    #[test]
    fn forward_transitions_allowed() {
        assert!(Waiting.can_transition_to(Running));
        assert!(Waiting.can_transition_to(Interrupted));
        assert!(Running.can_transition_to(Finished));
        assert!(Running.can_transition_to(Interrupted));
    }

    #[test]
    fn no_return_to_waiting() {
        for from in [Running, Finished, Interrupted] {
            assert!(!from.can_transition_to(Waiting), "{from} -> Waiting");
        }
    }

    #[test]
    fn terminal_states_are_sticky() {
        for from in [Finished, Interrupted] {
            for to in WorkerStatus::ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn waiting_cannot_skip_to_finished() {
        assert!(!Waiting.can_transition_to(Finished));
        assert!(!Running.can_transition_to(Running));
    }
}
