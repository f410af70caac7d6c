//! The per-process state machine.
//!
//! A worker registers as waiting, queues at the gate, and once admitted
//! works through [`PROGRESS_STEPS`] equal pauses, publishing progress after
//! each one. Cancellation is observed at both suspension points: while
//! queued and during every pause.
//!
//! The permit is a drop guard, and the terminal status is written while the
//! guard is still alive. This keeps the number of `Running` records at or
//! below the gate capacity at every instant, and returns the permit on every
//! exit path after admission.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::gate::{Permit, ResourceGate};
use crate::id::WorkerId;
use crate::state::SimulationState;
use crate::status::WorkerStatus;

/// Number of equal sub-steps a task is divided into.
pub const PROGRESS_STEPS: u8 = 100;

/// Length of one sub-step of a task lasting `task_duration`.
pub fn step_pause(task_duration: Duration) -> Duration {
    task_duration / u32::from(PROGRESS_STEPS)
}

/// How a worker's run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerOutcome {
    Finished,
    /// `held_permit` is true when the cancellation arrived after admission
    /// (the permit was returned on the way out).
    Interrupted { held_permit: bool },
}

impl WorkerOutcome {
    /// The status the worker's record ends in.
    pub fn status(self) -> WorkerStatus {
        match self {
            WorkerOutcome::Finished => WorkerStatus::Finished,
            WorkerOutcome::Interrupted { .. } => WorkerStatus::Interrupted,
        }
    }
}

/// One simulated process bound to a run's gate and store.
#[derive(Debug)]
pub struct Worker {
    id: WorkerId,
    gate: ResourceGate,
    state: Arc<SimulationState>,
    cancel: CancellationToken,
}

impl Worker {
    pub fn new(
        id: WorkerId,
        gate: ResourceGate,
        state: Arc<SimulationState>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            gate,
            state,
            cancel,
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Drive the worker to a terminal state.
    pub async fn run(self) -> WorkerOutcome {
        self.record(WorkerStatus::Waiting);

        let permit = match self.gate.acquire(&self.cancel).await {
            Ok(permit) => permit,
            Err(reason) => {
                tracing::debug!(worker = %self.id, %reason, "left the queue without a permit");
                self.record(WorkerStatus::Interrupted);
                return WorkerOutcome::Interrupted { held_permit: false };
            }
        };
        tracing::debug!(worker = %self.id, "permit granted");
        self.record(WorkerStatus::Running);

        let pause = step_pause(self.state.task_duration());
        for step in 1..=PROGRESS_STEPS {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::debug!(worker = %self.id, step, "cancelled while running");
                    return self.finish(permit, WorkerStatus::Interrupted);
                }
                _ = sub_step(pause) => {}
            }
            if let Err(err) = self.state.set_progress(self.id, step) {
                tracing::warn!(worker = %self.id, %err, "progress write rejected");
            }
        }

        self.finish(permit, WorkerStatus::Finished)
    }

    /// Publish the terminal status, then hand the permit back.
    fn finish(&self, permit: Permit, status: WorkerStatus) -> WorkerOutcome {
        self.record(status);
        permit.release();
        tracing::debug!(worker = %self.id, %status, "permit released");
        match status {
            WorkerStatus::Finished => WorkerOutcome::Finished,
            _ => WorkerOutcome::Interrupted { held_permit: true },
        }
    }

    fn record(&self, status: WorkerStatus) {
        match self.state.set_status(self.id, status) {
            Ok(()) => tracing::debug!(worker = %self.id, %status, "status"),
            Err(err) => tracing::warn!(worker = %self.id, %err, "status write rejected"),
        }
    }
}

/// One timed pause. A zero-length pause still yields so other workers and
/// the cancellation check get a turn.
async fn sub_step(pause: Duration) {
    if pause.is_zero() {
        tokio::task::yield_now().await;
    } else {
        tokio::time::sleep(pause).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::ChangeNotifier;

    fn setup(permits: usize, duration_ms: u64, workers: u32) -> (ResourceGate, Arc<SimulationState>) {
        let gate = ResourceGate::new(permits);
        let state = Arc::new(SimulationState::new(
            Duration::from_millis(duration_ms),
            ChangeNotifier::new(),
        ));
        for i in 0..workers {
            state.insert_worker(WorkerId(i)).unwrap();
        }
        (gate, state)
    }

    #[tokio::test(start_paused = true)]
    async fn uncontended_worker_finishes() {
        let (gate, state) = setup(1, 1000, 1);
        let worker = Worker::new(WorkerId(0), gate.clone(), state.clone(), CancellationToken::new());

        assert_eq!(worker.run().await, WorkerOutcome::Finished);
        let record = state.get_record(WorkerId(0)).unwrap();
        assert_eq!(record.status, WorkerStatus::Finished);
        assert_eq!(record.progress, PROGRESS_STEPS);
        assert_eq!(gate.available(), 1);
        assert_eq!(gate.stats().released, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_duration_finishes_all_steps() {
        let (gate, state) = setup(1, 0, 1);
        let worker = Worker::new(WorkerId(0), gate.clone(), state.clone(), CancellationToken::new());
        assert_eq!(worker.run().await, WorkerOutcome::Finished);
        assert_eq!(state.get_progress(WorkerId(0)), PROGRESS_STEPS);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_before_start_never_runs() {
        let (gate, state) = setup(1, 1000, 1);
        let token = CancellationToken::new();
        token.cancel();
        let worker = Worker::new(WorkerId(0), gate.clone(), state.clone(), token);

        assert_eq!(
            worker.run().await,
            WorkerOutcome::Interrupted { held_permit: false }
        );
        assert_eq!(state.get_status(WorkerId(0)), Some(WorkerStatus::Interrupted));
        assert_eq!(gate.stats().acquired, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_mid_run_returns_permit() {
        let (gate, state) = setup(1, 1000, 1);
        let token = CancellationToken::new();
        let worker = Worker::new(WorkerId(0), gate.clone(), state.clone(), token.clone());
        let handle = tokio::spawn(worker.run());

        // 10 ms per step: after 255 ms roughly a quarter of the work is done.
        tokio::time::sleep(Duration::from_millis(255)).await;
        assert_eq!(state.get_status(WorkerId(0)), Some(WorkerStatus::Running));
        assert_eq!(gate.available(), 0);
        token.cancel();

        assert_eq!(
            handle.await.unwrap(),
            WorkerOutcome::Interrupted { held_permit: true }
        );
        assert_eq!(state.get_status(WorkerId(0)), Some(WorkerStatus::Interrupted));
        assert_eq!(gate.available(), 1);
        assert_eq!(gate.stats().outstanding(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_gate_interrupts_waiter() {
        let (gate, state) = setup(1, 1000, 1);
        gate.close();
        let worker = Worker::new(WorkerId(0), gate, state.clone(), CancellationToken::new());
        assert_eq!(
            worker.run().await,
            WorkerOutcome::Interrupted { held_permit: false }
        );
        assert_eq!(state.get_status(WorkerId(0)), Some(WorkerStatus::Interrupted));
    }

    #[test]
    fn step_pause_matches_config() {
        use crate::config::SimConfig;
        assert_eq!(step_pause(Duration::from_millis(1000)), Duration::from_millis(10));
        assert_eq!(step_pause(Duration::from_millis(150)), Duration::from_micros(1500));
        let config = SimConfig::new(1, 1, 2000);
        assert_eq!(step_pause(config.task_duration()), config.step_pause());
    }

    #[test]
    fn outcome_maps_to_terminal_status() {
        assert_eq!(WorkerOutcome::Finished.status(), WorkerStatus::Finished);
        assert_eq!(
            WorkerOutcome::Interrupted { held_permit: true }.status(),
            WorkerStatus::Interrupted
        );
    }
}
