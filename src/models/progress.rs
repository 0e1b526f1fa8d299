use serde::{Deserialize, Serialize};

/// Point-in-time report of an in-flight enumeration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub current: u64,
    pub total: u64,
    pub completed: bool,
}

impl ProgressSnapshot {
    pub fn new(current: u64, total: u64, completed: bool) -> Self {
        Self {
            current,
            total,
            completed,
        }
    }

    /// Completion ratio in `0.0..=1.0`. An empty total counts as done only
    /// once the enumeration reports completion.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return if self.completed { 1.0 } else { 0.0 };
        }
        (self.current.min(self.total) as f64) / (self.total as f64)
    }
}
