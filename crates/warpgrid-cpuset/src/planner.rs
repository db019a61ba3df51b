//! Node-level planning entry point.
//!
//! Wraps both allocators behind a [`PlannerConfig`]: runs the configured
//! allocator, falls back from exact to greedy on solver failure if allowed,
//! and carries workload ids so a previous [`Plan`] can be matched to the
//! current workload list by id instead of by position.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{AllocatorMode, PlannerConfig};
use crate::error::{AllocError, AllocResult};
use crate::exact::ExactAllocator;
use crate::greedy::GreedyAllocator;
use crate::matrix::AllocationMatrix;
use crate::model::Solver;

/// A co-resident workload asking for `request` logical CPUs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workload {
    pub id: String,
    pub request: usize,
}

impl Workload {
    pub fn new(id: impl Into<String>, request: usize) -> Self {
        Self {
            id: id.into(),
            request,
        }
    }
}

/// Which allocator produced a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocatorKind {
    Exact,
    Greedy,
}

/// Threads granted to one workload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub workload_id: String,
    pub threads: Vec<usize>,
    /// Same threads in cpuset list syntax, ready for a cgroup `cpuset.cpus`.
    pub cpu_list: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub allocator: AllocatorKind,
    pub total_threads: usize,
    pub sockets: usize,
    pub placements: Vec<Placement>,
}

impl Plan {
    fn from_matrix(
        allocator: AllocatorKind,
        workloads: &[Workload],
        matrix: &AllocationMatrix,
        sockets: usize,
    ) -> Self {
        let placements = workloads
            .iter()
            .enumerate()
            .map(|(j, w)| Placement {
                workload_id: w.id.clone(),
                threads: matrix.threads(j).to_vec(),
                cpu_list: matrix.cpu_list(j),
            })
            .collect();
        Self {
            allocator,
            total_threads: matrix.total_threads(),
            sockets,
            placements,
        }
    }

    /// The plan as a positional matrix (placement order = workload order).
    pub fn matrix(&self) -> AllocResult<AllocationMatrix> {
        let sets = self.placements.iter().map(|p| p.threads.clone()).collect();
        AllocationMatrix::from_thread_sets(self.total_threads, sets)
    }

    pub fn placement(&self, workload_id: &str) -> Option<&Placement> {
        self.placements.iter().find(|p| p.workload_id == workload_id)
    }

    /// Re-index this plan onto `workloads` by id.
    ///
    /// Workloads that were not in this plan start empty; workloads that
    /// disappeared are dropped, as are threads beyond `total_threads`.
    pub fn aligned_to(&self, workloads: &[Workload], total_threads: usize) -> AllocResult<AllocationMatrix> {
        let by_id: HashMap<&str, &Placement> = self
            .placements
            .iter()
            .map(|p| (p.workload_id.as_str(), p))
            .collect();
        let sets = workloads
            .iter()
            .map(|w| {
                by_id
                    .get(w.id.as_str())
                    .map(|p| p.threads.iter().copied().filter(|&t| t < total_threads).collect())
                    .unwrap_or_default()
            })
            .collect();
        AllocationMatrix::from_thread_sets(total_threads, sets)
    }
}

/// Runs the configured allocator for a node.
#[derive(Debug, Clone)]
pub struct CpuPlanner<S> {
    config: PlannerConfig,
    solver: S,
}

impl<S: Solver> CpuPlanner<S> {
    pub fn new(config: PlannerConfig, solver: S) -> Self {
        Self { config, solver }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn plan(
        &self,
        workloads: &[Workload],
        total_threads: usize,
        sockets: usize,
        previous: Option<&Plan>,
    ) -> AllocResult<Plan> {
        let mut seen = HashSet::new();
        if let Some(dup) = workloads.iter().find(|w| !seen.insert(w.id.as_str())) {
            return Err(AllocError::InvalidAllocation(format!(
                "duplicate workload id {:?}",
                dup.id
            )));
        }
        let requests: Vec<usize> = workloads.iter().map(|w| w.request).collect();

        let (kind, matrix) = match self.config.mode {
            AllocatorMode::Greedy => (
                AllocatorKind::Greedy,
                GreedyAllocator::new().allocate(&requests, total_threads, sockets)?,
            ),
            AllocatorMode::Exact => {
                let previous = previous
                    .map(|p| p.aligned_to(workloads, total_threads))
                    .transpose()?;
                let exact = ExactAllocator::new(&self.solver)
                    .with_weights(self.config.weights)
                    .verbose(self.config.verbose);
                match exact.solve(&requests, total_threads, sockets, previous.as_ref()) {
                    Ok(matrix) => (AllocatorKind::Exact, matrix),
                    Err(AllocError::SolverFailure(reason)) if self.config.fallback_to_greedy => {
                        warn!(%reason, "exact allocation failed, falling back to greedy");
                        (
                            AllocatorKind::Greedy,
                            GreedyAllocator::new().allocate(&requests, total_threads, sockets)?,
                        )
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        let plan = Plan::from_matrix(kind, workloads, &matrix, sockets);
        info!(
            allocator = ?plan.allocator,
            workloads = workloads.len(),
            threads = total_threads,
            sockets,
            "cpu plan computed"
        );
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Model, Solution, SolveStatus};
    use crate::solver::BruteForceSolver;

    struct FailingSolver;

    impl Solver for FailingSolver {
        fn minimize(&self, _model: &Model) -> Solution {
            Solution::failed(SolveStatus::Error, "boom")
        }
    }

    fn workloads(entries: &[(&str, usize)]) -> Vec<Workload> {
        entries.iter().map(|&(id, r)| Workload::new(id, r)).collect()
    }

    #[test]
    fn exact_plan_carries_ids_and_cpu_lists() {
        let planner = CpuPlanner::new(PlannerConfig::default(), BruteForceSolver::new());
        let plan = planner
            .plan(&workloads(&[("db", 4), ("web", 4)]), 8, 2, None)
            .unwrap();

        assert_eq!(plan.allocator, AllocatorKind::Exact);
        let db = plan.placement("db").unwrap();
        assert_eq!(db.threads, vec![0, 1, 2, 3]);
        assert_eq!(db.cpu_list, "0-3");
        assert_eq!(plan.placement("web").unwrap().cpu_list, "4-7");
        plan.matrix().unwrap().validate(&[4, 4]).unwrap();
    }

    #[test]
    fn greedy_mode_never_calls_solver() {
        let config = PlannerConfig {
            mode: AllocatorMode::Greedy,
            ..PlannerConfig::default()
        };
        let plan = CpuPlanner::new(config, FailingSolver)
            .plan(&workloads(&[("a", 3)]), 8, 2, None)
            .unwrap();
        assert_eq!(plan.allocator, AllocatorKind::Greedy);
        assert_eq!(plan.placements[0].threads, vec![0, 1, 2]);
    }

    #[test]
    fn falls_back_to_greedy_on_solver_failure() {
        let plan = CpuPlanner::new(PlannerConfig::default(), FailingSolver)
            .plan(&workloads(&[("a", 2)]), 4, 1, None)
            .unwrap();
        assert_eq!(plan.allocator, AllocatorKind::Greedy);
    }

    #[test]
    fn solver_failure_surfaces_without_fallback() {
        let config = PlannerConfig {
            fallback_to_greedy: false,
            ..PlannerConfig::default()
        };
        let err = CpuPlanner::new(config, FailingSolver)
            .plan(&workloads(&[("a", 2)]), 4, 1, None)
            .unwrap_err();
        assert!(matches!(err, AllocError::SolverFailure(_)));
    }

    #[test]
    fn capacity_errors_are_not_masked_by_fallback() {
        let err = CpuPlanner::new(PlannerConfig::default(), FailingSolver)
            .plan(&workloads(&[("a", 5)]), 4, 1, None)
            .unwrap_err();
        assert!(matches!(err, AllocError::CapacityExceeded { .. }));
    }

    #[test]
    fn rejects_duplicate_ids() {
        let err = CpuPlanner::new(PlannerConfig::default(), BruteForceSolver::new())
            .plan(&workloads(&[("a", 1), ("a", 1)]), 4, 1, None)
            .unwrap_err();
        assert!(matches!(err, AllocError::InvalidAllocation(msg) if msg.contains("duplicate")));
    }

    #[test]
    fn previous_plan_is_matched_by_id() {
        let previous = Plan {
            allocator: AllocatorKind::Exact,
            total_threads: 8,
            sockets: 2,
            placements: vec![
                Placement {
                    workload_id: "gone".into(),
                    threads: vec![0, 1],
                    cpu_list: "0-1".into(),
                },
                Placement {
                    workload_id: "web".into(),
                    threads: vec![4, 5, 6, 7],
                    cpu_list: "4-7".into(),
                },
            ],
        };
        let current = workloads(&[("web", 4), ("new", 2)]);
        let aligned = previous.aligned_to(&current, 8).unwrap();
        assert_eq!(aligned.threads(0), &[4, 5, 6, 7]);
        assert!(aligned.threads(1).is_empty());

        // Without the previous plan, "web" would take socket 0.
        let planner = CpuPlanner::new(PlannerConfig::default(), BruteForceSolver::new());
        let plan = planner.plan(&current, 8, 2, Some(&previous)).unwrap();
        assert_eq!(plan.placement("web").unwrap().threads, vec![4, 5, 6, 7]);
        assert_eq!(plan.placement("new").unwrap().threads, vec![0, 1]);
    }

    #[test]
    fn plan_serializes_to_json() {
        let planner = CpuPlanner::new(PlannerConfig::default(), BruteForceSolver::new());
        let plan = planner.plan(&workloads(&[("a", 2)]), 4, 1, None).unwrap();
        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(json["allocator"], "exact");
        assert_eq!(json["placements"][0]["cpu_list"], "0-1");
        let back: Plan = serde_json::from_value(json).unwrap();
        assert_eq!(back, plan);
    }
}
