use serde::{Deserialize, Serialize};

/// Identifies a worker within one run. Assigned at creation as `0..N`,
/// never reused inside the same run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct WorkerId(pub u32);

impl WorkerId {
    /// The raw index, usable for positional layouts.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for WorkerId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}
