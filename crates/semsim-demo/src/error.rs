use semsim_core::config::ConfigError;
use semsim_core::simulation::SimulationError;

#[derive(Debug, thiserror::Error)]
pub enum DemoError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Simulation(#[from] SimulationError),

    #[error("cannot interrupt process {id}: only {processes} processes exist")]
    InterruptOutOfRange { id: u32, processes: usize },

    #[error("--runs must be at least 1")]
    NoRuns,

    #[error("failed to write frame: {0}")]
    Io(#[from] std::io::Error),
}
