//! Composition root: one gate, one store, one task per worker.
//!
//! # Runs
//!
//! [`Simulation::start`] builds a fresh [`ResourceGate`] and
//! [`SimulationState`], registers workers `0..N`, spawns them, and returns
//! without waiting. Nothing is shared between runs except the
//! [`ChangeNotifier`] the caller passes in.
//!
//! Dropping a `Simulation` does not stop its workers; they finish against
//! their own gate and store. [`Simulator`] wraps the restart flow of a
//! control layer and can cancel the previous run instead.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::SimConfig;
use crate::gate::ResourceGate;
use crate::id::WorkerId;
use crate::notifier::ChangeNotifier;
use crate::query::StateSnapshot;
use crate::state::{SimulationState, StateError};
use crate::worker::{Worker, WorkerOutcome};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("no tokio runtime is active; use Simulation::start_on with a runtime handle")]
    NoRuntime,

    #[error("worker {id} task failed: {detail}")]
    WorkerFailed { id: WorkerId, detail: String },

    #[error(transparent)]
    State(#[from] StateError),
}

// ---------------------------------------------------------------------------
// Run report
// ---------------------------------------------------------------------------

/// How every worker of a joined run ended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub outcomes: BTreeMap<WorkerId, WorkerOutcome>,
}

impl RunReport {
    pub fn finished(&self) -> usize {
        self.outcomes
            .values()
            .filter(|o| matches!(o, WorkerOutcome::Finished))
            .count()
    }

    pub fn interrupted(&self) -> usize {
        self.outcomes.len() - self.finished()
    }

    /// Interrupted workers that had already been admitted by the gate.
    pub fn interrupted_while_running(&self) -> usize {
        self.outcomes
            .values()
            .filter(|o| matches!(o, WorkerOutcome::Interrupted { held_permit: true }))
            .count()
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct WorkerHandle {
    id: WorkerId,
    cancel: CancellationToken,
    join: JoinHandle<WorkerOutcome>,
}

/// One run in flight.
#[derive(Debug)]
pub struct Simulation {
    config: SimConfig,
    state: Arc<SimulationState>,
    gate: ResourceGate,
    cancel: CancellationToken,
    workers: Vec<WorkerHandle>,
}

impl Simulation {
    /// Start a run on the ambient tokio runtime.
    pub fn start(config: SimConfig, notifier: ChangeNotifier) -> Result<Self, SimulationError> {
        let handle = Handle::try_current().map_err(|_| SimulationError::NoRuntime)?;
        Self::start_on(&handle, config, notifier)
    }

    /// Start a run whose workers are spawned on `runtime`.
    ///
    /// `config` is expected to have passed [`SimConfig::validate`].
    pub fn start_on(
        runtime: &Handle,
        config: SimConfig,
        notifier: ChangeNotifier,
    ) -> Result<Self, SimulationError> {
        let state = Arc::new(SimulationState::new(config.task_duration(), notifier));
        let gate = ResourceGate::new(config.resource_count);
        let cancel = CancellationToken::new();

        tracing::info!(
            resources = config.resource_count,
            processes = config.process_count,
            duration_ms = config.task_duration_ms,
            "starting run"
        );

        // Validated configs never exceed u32 workers.
        let count = u32::try_from(config.process_count).unwrap_or(u32::MAX);
        let ids: Vec<WorkerId> = (0..count).map(WorkerId).collect();

        // Every record exists before the first worker can observe the store.
        for &id in &ids {
            state.insert_worker(id)?;
        }

        let workers = ids
            .into_iter()
            .map(|id| {
                let token = cancel.child_token();
                let worker = Worker::new(id, gate.clone(), state.clone(), token.clone());
                let span = tracing::debug_span!("worker", id = %id);
                let join = runtime.spawn(worker.run().instrument(span));
                WorkerHandle {
                    id,
                    cancel: token,
                    join,
                }
            })
            .collect();

        Ok(Self {
            config,
            state,
            gate,
            cancel,
            workers,
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn state(&self) -> &Arc<SimulationState> {
        &self.state
    }

    pub fn gate(&self) -> &ResourceGate {
        &self.gate
    }

    pub fn snapshot(&self) -> StateSnapshot {
        self.state.snapshot()
    }

    /// Interrupt one worker. Returns false if no such worker exists in
    /// this run. Cancelling a worker that already terminated has no effect.
    pub fn cancel(&self, id: WorkerId) -> bool {
        match self.workers.iter().find(|w| w.id == id) {
            Some(worker) => {
                tracing::debug!(worker = %id, "cancel requested");
                worker.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Interrupt every worker of this run.
    pub fn cancel_all(&self) {
        tracing::debug!(workers = self.workers.len(), "cancelling run");
        self.cancel.cancel();
    }

    /// True once every worker task has returned.
    pub fn is_complete(&self) -> bool {
        self.workers.iter().all(|w| w.join.is_finished())
    }

    /// Wait for every worker and collect their outcomes.
    pub async fn join(self) -> Result<RunReport, SimulationError> {
        let mut report = RunReport::default();
        for worker in self.workers {
            let outcome = worker
                .join
                .await
                .map_err(|err| SimulationError::WorkerFailed {
                    id: worker.id,
                    detail: err.to_string(),
                })?;
            report.outcomes.insert(worker.id, outcome);
        }
        tracing::info!(
            finished = report.finished(),
            interrupted = report.interrupted(),
            permits_available = self.gate.available(),
            "run complete"
        );
        Ok(report)
    }
}

// ---------------------------------------------------------------------------
// Simulator
// ---------------------------------------------------------------------------

/// What happens to the workers of the current run when a new one starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RestartPolicy {
    /// Leave them running against their own gate and store.
    #[default]
    Detach,
    /// Cancel them before the new run starts.
    CancelPrevious,
}

/// Holds the current run and the notifier that outlives it.
#[derive(Debug, Default)]
pub struct Simulator {
    notifier: ChangeNotifier,
    policy: RestartPolicy,
    current: Option<Simulation>,
    runs_started: u64,
}

impl Simulator {
    pub fn new(policy: RestartPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// The notifier handed to every run. Register the observer here once.
    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    /// Replace the current run with a fresh one built from `config`.
    pub fn start(&mut self, config: SimConfig) -> Result<&Simulation, SimulationError> {
        if let Some(previous) = self.current.take() {
            if self.policy == RestartPolicy::CancelPrevious {
                previous.cancel_all();
            }
        }
        let run = Simulation::start(config, self.notifier.clone())?;
        self.runs_started += 1;
        Ok(self.current.insert(run))
    }

    pub fn current(&self) -> Option<&Simulation> {
        self.current.as_ref()
    }

    /// Take ownership of the current run, e.g. to join it.
    pub fn take_current(&mut self) -> Option<Simulation> {
        self.current.take()
    }

    pub fn runs_started(&self) -> u64 {
        self.runs_started
    }
}
