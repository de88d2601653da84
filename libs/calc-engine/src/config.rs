//! Engine configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default composite deadline (10 seconds)
pub const DEFAULT_DEADLINE_MS: u64 = 10_000;

/// Default SQLite database location
pub const DEFAULT_DATABASE_URL: &str = "sqlite://calculations.db";

/// How submitted text is turned into composite units
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitSplit {
    /// Submitted text is one unit; callers pass several units explicitly
    #[default]
    Explicit,
    /// Legacy mode: every whitespace-separated segment is a unit
    Whitespace,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Shared deadline for one composite request, in milliseconds
    pub deadline_ms: u64,
    /// Result store location
    pub database_url: String,
    /// Unit splitting for single-text submissions
    pub unit_split: UnitSplit,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            deadline_ms: DEFAULT_DEADLINE_MS,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            unit_split: UnitSplit::default(),
        }
    }
}

impl EngineConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}
