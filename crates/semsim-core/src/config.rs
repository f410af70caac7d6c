//! Run configuration and its validation.
//!
//! The core trusts the values it is given; [`SimConfig::validate`] is the
//! check a control layer runs before starting a run. Configs can also be
//! read from RON, TOML, or JSON files, chosen by file extension.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::worker::step_pause;

/// Default permit count.
pub const DEFAULT_RESOURCE_COUNT: usize = 3;
/// Default number of workers per run.
pub const DEFAULT_PROCESS_COUNT: usize = 10;
/// Default task duration in milliseconds.
pub const DEFAULT_TASK_DURATION_MS: u64 = 2000;
/// Upper bound on workers per run. Ids are `u32`.
pub const MAX_PROCESS_COUNT: usize = u32::MAX as usize;

// ===========================================================================
// Errors
// ===========================================================================

/// Errors from validating or loading a config.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("resource count must be at least 1")]
    NoResources,

    #[error("resource count {0} exceeds the maximum of {max}", max = Semaphore::MAX_PERMITS)]
    TooManyResources(usize),

    #[error("process count {0} exceeds the maximum of {max}", max = MAX_PROCESS_COUNT)]
    TooManyProcesses(usize),

    #[error("unsupported config format: {file}")]
    UnsupportedFormat { file: PathBuf },

    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// SimConfig
// ===========================================================================

/// Parameters of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Permits in the gate, R.
    pub resource_count: usize,
    /// Workers to launch, N. Ids are `0..N`.
    pub process_count: usize,
    /// Wall time of one task, split into 100 equal pauses.
    pub task_duration_ms: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            resource_count: DEFAULT_RESOURCE_COUNT,
            process_count: DEFAULT_PROCESS_COUNT,
            task_duration_ms: DEFAULT_TASK_DURATION_MS,
        }
    }
}

impl SimConfig {
    pub fn new(resource_count: usize, process_count: usize, task_duration_ms: u64) -> Self {
        Self {
            resource_count,
            process_count,
            task_duration_ms,
        }
    }

    /// Reject values the core cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resource_count == 0 {
            return Err(ConfigError::NoResources);
        }
        if self.resource_count > Semaphore::MAX_PERMITS {
            return Err(ConfigError::TooManyResources(self.resource_count));
        }
        if self.process_count > MAX_PROCESS_COUNT {
            return Err(ConfigError::TooManyProcesses(self.process_count));
        }
        Ok(())
    }

    pub fn task_duration(&self) -> Duration {
        Duration::from_millis(self.task_duration_ms)
    }

    /// Length of one of the 100 sub-step pauses.
    pub fn step_pause(&self) -> Duration {
        step_pause(self.task_duration())
    }

    /// Read a config file without validating it. Fields missing from the
    /// file take their default values. Callers that layer overrides on top
    /// validate the merged result themselves.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let format = detect_format(path)?;
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content, format).map_err(|detail| ConfigError::Parse {
            file: path.to_path_buf(),
            detail,
        })
    }

    /// Load and validate a config file.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse config text in the given format.
    pub fn parse(content: &str, format: Format) -> Result<Self, String> {
        match format {
            Format::Ron => ron::from_str(content).map_err(|e| e.to_string()),
            Format::Toml => toml::from_str(content).map_err(|e| e.to_string()),
            Format::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
        }
    }
}

// ===========================================================================
// Format detection
// ===========================================================================

/// Supported config file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

/// Detect the format of a file based on its extension.
pub fn detect_format(path: &Path) -> Result<Format, ConfigError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("ron") => Ok(Format::Ron),
        Some("toml") => Ok(Format::Toml),
        Some("json") => Ok(Format::Json),
        _ => Err(ConfigError::UnsupportedFormat {
            file: path.to_path_buf(),
        }),
    }
}
