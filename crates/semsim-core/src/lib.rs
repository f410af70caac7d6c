//! Semsim Core -- N workers competing for R permits behind a fair gate.
//!
//! Each worker queues at a FIFO counting semaphore, and once admitted works
//! through one hundred timed sub-steps while publishing its status and
//! progress to a shared store. A presentation layer observes the run
//! through snapshots and a single change callback.
//!
//! # Worker lifecycle
//!
//! 1. **Waiting** -- registered and queued at the gate.
//! 2. **Running** -- holding a permit; progress goes 0 -> 100.
//! 3. **Finished** -- all sub-steps done; permit returned.
//! 4. **Interrupted** -- cancelled while queued or while running; any held
//!    permit is returned.
//!
//! # Usage
//!
//! ```rust,ignore
//! let notifier = ChangeNotifier::new();
//! notifier.set(|| redraw.notify_one());
//! let sim = Simulation::start(SimConfig::new(3, 10, 2000), notifier)?;
//! let frame = sim.snapshot();
//! let report = sim.join().await?;
//! ```
//!
//! # Key Types
//!
//! - [`gate::ResourceGate`] -- fair semaphore with scoped [`gate::Permit`]s.
//! - [`state::SimulationState`] -- lock-protected record store.
//! - [`notifier::ChangeNotifier`] -- single-slot change callback.
//! - [`worker::Worker`] -- the per-process state machine.
//! - [`simulation::Simulation`] -- one run; [`simulation::Simulator`] holds
//!   the current run across restarts.
//! - [`config::SimConfig`] -- run parameters, validation, file loading.

pub mod config;
pub mod gate;
pub mod id;
pub mod notifier;
pub mod query;
pub mod simulation;
pub mod state;
pub mod status;
pub mod worker;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
