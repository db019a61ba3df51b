//! Cost weights for the exact allocator's objective.
//!
//! The absolute numbers are operator tuning. What the defaults encode is the
//! rank ordering: NUMA spread dominates, then LLC sharing, then hyperthread
//! splits, then migration (stability), then the deterministic tie-break.

use serde::{Deserialize, Serialize};

use crate::error::{AllocError, AllocResult};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostWeights {
    /// Per socket a workload touches.
    pub numa_spread: f64,
    /// Per extra workload sharing a socket's last-level cache.
    pub llc_sharing: f64,
    /// Per (core, workload) pair where the workload holds one sibling only.
    pub hyperthread_split: f64,
    /// Per thread assignment that differs from the previous allocation.
    pub stability: f64,
    /// Upper bound on the total tie-break contribution.
    pub tie_break: f64,
}

impl Default for CostWeights {
    fn default() -> Self {
        Self {
            numa_spread: 1000.0,
            llc_sharing: 100.0,
            hyperthread_split: 10.0,
            stability: 1.0,
            tie_break: 0.01,
        }
    }
}

impl CostWeights {
    /// Reject negative or non-finite weights.
    pub fn validate(&self) -> AllocResult<()> {
        for (name, value) in self.named() {
            if !value.is_finite() || value < 0.0 {
                return Err(AllocError::InvalidWeights(format!(
                    "{name} must be a finite non-negative number, got {value}"
                )));
            }
        }
        Ok(())
    }

    /// Whether the weights keep the documented rank ordering.
    pub fn rank_ordered(&self) -> bool {
        self.numa_spread > self.llc_sharing
            && self.llc_sharing > self.hyperthread_split
            && self.hyperthread_split > self.stability
            && self.stability > self.tie_break
    }

    fn named(&self) -> [(&'static str, f64); 5] {
        [
            ("numa_spread", self.numa_spread),
            ("llc_sharing", self.llc_sharing),
            ("hyperthread_split", self.hyperthread_split),
            ("stability", self.stability),
            ("tie_break", self.tie_break),
        ]
    }
}
