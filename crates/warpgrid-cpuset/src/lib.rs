//! warpgrid-cpuset: topology-aware CPU placement for a single node.
//!
//! Decides which hardware threads each co-resident workload receives,
//! given per-workload compute-unit requests and the node's socket/core
//! layout. Placement itself (cgroups, pinning) is the caller's job; this
//! crate only computes it.
//!
//! # Components
//!
//! - **`topology`**: sockets → cores → hyperthreads from `(threads, sockets)`
//! - **`matrix`**: allocation matrix, validation, diff, cpuset lists
//! - **`greedy`**: deterministic largest-first packer, no solver
//! - **`exact`**: integer-program formulation over a pluggable [`Solver`]
//! - **`solver`**: solver backends (`good_lp`/microlp, brute force)
//! - **`planner`**: config-driven entry point with exact→greedy fallback
//!
//! # Example
//!
//! ```
//! let cpus = warpgrid_cpuset::allocate_greedy(&[4, 2], 8, 2).unwrap();
//! assert_eq!(cpus[0], vec![true, true, true, true, false, false, false, false]);
//! ```

pub mod config;
pub mod error;
pub mod exact;
pub mod greedy;
pub mod matrix;
pub mod model;
pub mod planner;
pub mod solver;
pub mod topology;
pub mod weights;

pub use config::{AllocatorMode, PlannerConfig};
pub use error::{AllocError, AllocResult};
pub use exact::{ExactAllocator, Formulation};
pub use greedy::GreedyAllocator;
pub use matrix::{AllocationMatrix, diff, format_cpu_list, parse_cpu_list};
pub use model::{Model, Solution, SolveStatus, Solver};
pub use planner::{AllocatorKind, CpuPlanner, Placement, Plan, Workload};
pub use solver::{BruteForceSolver, DefaultSolver};
pub use topology::CpuTopology;
pub use weights::CostWeights;

/// Exact allocation with the default solver and default weights.
///
/// Returns one boolean vector of length `total_threads` per request, in
/// request order.
pub fn allocate_exact(
    requests: &[usize],
    total_threads: usize,
    sockets: usize,
    previous: Option<&[Vec<bool>]>,
    verbose: bool,
) -> AllocResult<Vec<Vec<bool>>> {
    allocate_exact_with(
        DefaultSolver::default(),
        CostWeights::default(),
        requests,
        total_threads,
        sockets,
        previous,
        verbose,
    )
}

/// Exact allocation with an injected solver and weights.
pub fn allocate_exact_with<S: Solver>(
    solver: S,
    weights: CostWeights,
    requests: &[usize],
    total_threads: usize,
    sockets: usize,
    previous: Option<&[Vec<bool>]>,
    verbose: bool,
) -> AllocResult<Vec<Vec<bool>>> {
    let previous = previous.map(AllocationMatrix::from_bool_vectors).transpose()?;
    let matrix = ExactAllocator::new(solver)
        .with_weights(weights)
        .verbose(verbose)
        .solve(requests, total_threads, sockets, previous.as_ref())?;
    Ok(matrix.to_bool_vectors())
}

/// Greedy allocation; never touches a solver.
pub fn allocate_greedy(
    requests: &[usize],
    total_threads: usize,
    sockets: usize,
) -> AllocResult<Vec<Vec<bool>>> {
    let matrix = GreedyAllocator::new().allocate(requests, total_threads, sockets)?;
    Ok(matrix.to_bool_vectors())
}
