//! Engine Configuration

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::cost::CostPolicy;

/// Knobs recognized by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Evict while resident payload bytes exceed this; `None` disables the
    /// automatic reaper.
    pub memory_limit_bytes: Option<usize>,

    /// Number of evictions attempted per overflow event.
    pub eviction_batch: usize,

    /// Greedy-Dual variant ranking evictable entries.
    pub cost_formula: CostPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            memory_limit_bytes: None,
            eviction_batch: 1,
            cost_formula: CostPolicy::default(),
        }
    }
}

/// A configuration the engine refuses to run with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// An overflow event must attempt at least one eviction.
    #[error("eviction batch must be at least 1")]
    ZeroEvictionBatch,

    /// A zero-byte limit would evict every completed step on the spot.
    #[error("memory limit of zero bytes; use a positive limit or None")]
    ZeroMemoryLimit,
}

impl EngineConfig {
    /// Check the knobs against each other.
    pub fn validated(self) -> Result<Self, ConfigError> {
        if self.eviction_batch == 0 {
            return Err(ConfigError::ZeroEvictionBatch);
        }
        if self.memory_limit_bytes == Some(0) {
            return Err(ConfigError::ZeroMemoryLimit);
        }
        Ok(self)
    }
}
