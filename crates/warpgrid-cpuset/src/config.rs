//! Planner configuration (`cpuset.toml`).
//!
//! ```toml
//! mode = "exact"
//! fallback_to_greedy = true
//! verbose = false
//!
//! [weights]
//! numa_spread = 1000.0
//! stability = 2.0
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::weights::CostWeights;

/// Which allocator the planner runs first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocatorMode {
    #[default]
    Exact,
    Greedy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub mode: AllocatorMode,
    /// Retry with the greedy allocator when the solver fails.
    pub fallback_to_greedy: bool,
    pub verbose: bool,
    pub weights: CostWeights,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            mode: AllocatorMode::Exact,
            fallback_to_greedy: true,
            verbose: false,
            weights: CostWeights::default(),
        }
    }
}

impl PlannerConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: PlannerConfig = toml::from_str(content)?;
        config.weights.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
