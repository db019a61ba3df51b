//! Exact allocator: thread placement as an integer program.
//!
//! # Formulation
//!
//! For every thread `t` and every workload `j` with a non-zero request:
//!
//! ```text
//! x[t][j] ∈ {0,1}                   thread t runs workload j
//! Σ_t x[t][j]  = r_j                 exact demand
//! Σ_j x[t][j] <= 1                   no oversubscription
//!
//! y[s][j] >= x[t][j]   (t in s)      j touches socket s        cost: numa_spread
//! e[s]    >= Σ_j y[s][j] - 1         extra tenants of s's LLC  cost: llc_sharing
//! h[k][j] >= |x[a][j] - x[b][j]|     j holds one sibling of k  cost: hyperthread_split
//! ```
//!
//! With a previous allocation `P`, each `x[t][j]` also costs `-stability`
//! when `P[t][j]` holds and `+stability` otherwise, which is the Hamming
//! distance to `P` up to a constant.
//!
//! The tie-break cost of `x[t][j]` is `(t+1)·p_j`, where `p_0 > p_1 > …` are
//! the smallest primes above `d`. Each cell gets a distinct weight, and
//! swapping threads between two workloads always favours the lower workload
//! on the lower thread. Scaled so the whole term stays below `tie_break`,
//! it never outweighs a placement cost.

use tracing::{debug, info, warn};

use crate::error::{AllocError, AllocResult, check_capacity};
use crate::matrix::AllocationMatrix;
use crate::model::{Constraint, Domain, Model, Solution, SolveStatus, Solver, VarId};
use crate::topology::CpuTopology;
use crate::weights::CostWeights;

/// Integer-programming allocator over an injected [`Solver`].
#[derive(Debug, Clone)]
pub struct ExactAllocator<S> {
    solver: S,
    weights: CostWeights,
    verbose: bool,
}

impl<S: Solver> ExactAllocator<S> {
    pub fn new(solver: S) -> Self {
        Self {
            solver,
            weights: CostWeights::default(),
            verbose: false,
        }
    }

    pub fn with_weights(self, weights: CostWeights) -> Self {
        Self { weights, ..self }
    }

    /// Log model size and objective at `info` instead of `debug`.
    pub fn verbose(self, verbose: bool) -> Self {
        Self { verbose, ..self }
    }

    pub fn weights(&self) -> &CostWeights {
        &self.weights
    }

    /// Compute a minimum-cost allocation.
    ///
    /// `previous` only biases the result. It may cover more or fewer
    /// workloads or threads than this call; entries outside the current
    /// shape are ignored.
    pub fn solve(
        &self,
        requests: &[usize],
        total_threads: usize,
        sockets: usize,
        previous: Option<&AllocationMatrix>,
    ) -> AllocResult<AllocationMatrix> {
        let topo = CpuTopology::build(total_threads, sockets)?;
        self.weights.validate()?;
        if !self.weights.rank_ordered() {
            warn!(weights = ?self.weights, "cost weights break the numa > llc > hyperthread > stability > tie-break ordering");
        }
        check_capacity(requests, total_threads)?;

        let formulation = Formulation::build(&topo, requests, &self.weights, previous);
        if formulation.is_trivial() {
            return Ok(AllocationMatrix::empty(total_threads, requests.len()));
        }

        let model = &formulation.model;
        if self.verbose {
            info!(
                workloads = requests.len(),
                threads = total_threads,
                sockets,
                variables = model.variables().len(),
                constraints = model.constraints().len(),
                stability = previous.is_some(),
                "solving cpu allocation model"
            );
        } else {
            debug!(
                variables = model.variables().len(),
                constraints = model.constraints().len(),
                "solving cpu allocation model"
            );
        }

        let solution = self.solver.minimize(model);
        if solution.status != SolveStatus::Optimal {
            let detail = solution.message.unwrap_or_default();
            return Err(AllocError::SolverFailure(format!(
                "solver returned {:?}: {detail}",
                solution.status
            )));
        }

        if self.verbose {
            info!(objective = solution.objective, "cpu allocation model solved");
        }

        let matrix = formulation.decode(&solution)?;
        for j in 0..matrix.workloads() {
            debug!(workload = j, cpus = %matrix.cpu_list(j), "exact placed workload");
        }
        Ok(matrix)
    }
}

/// A built model plus the handles needed to read the assignment back.
#[derive(Debug, Clone)]
pub struct Formulation {
    pub model: Model,
    total_threads: usize,
    requests: Vec<usize>,
    /// `assign[j][t]`, `None` for workloads that request nothing.
    assign: Vec<Option<Vec<VarId>>>,
}

impl Formulation {
    pub fn build(
        topo: &CpuTopology,
        requests: &[usize],
        weights: &CostWeights,
        previous: Option<&AllocationMatrix>,
    ) -> Self {
        let d = topo.total_threads();
        let workloads = requests.len();
        let active: Vec<usize> = (0..workloads).filter(|&j| requests[j] > 0).collect();
        let previous = previous.map(|p| p.to_grid(workloads, d));
        let mut model = Model::new();

        // x[t][j], created thread-major so a branching solver fixes one
        // thread at a time.
        let mut assign: Vec<Option<Vec<VarId>>> = vec![None; workloads];
        let mut columns: Vec<Vec<VarId>> = vec![Vec::with_capacity(d); workloads];
        let factors = tie_break_factors(d, workloads);
        let largest = factors.first().copied().unwrap_or(1);
        let tie_scale = weights.tie_break / (d * d * largest) as f64;
        for t in 0..d {
            for &j in &active {
                let mut cost = tie_scale * ((t + 1) * factors[j]) as f64;
                if let Some(prev) = &previous {
                    cost += if prev[j][t] { -weights.stability } else { weights.stability };
                }
                columns[j].push(model.add_var(format!("x_{t}_{j}"), Domain::Binary, cost));
            }
        }
        for &j in &active {
            assign[j] = Some(std::mem::take(&mut columns[j]));
        }

        for &j in &active {
            let vars = assign_column(&assign, j);
            let terms = vars.iter().map(|&v| (v, 1.0)).collect();
            model.add_constraint(Constraint::eq(terms, requests[j] as f64));
        }
        for t in 0..d {
            let terms: Vec<(VarId, f64)> = active
                .iter()
                .map(|&j| (assign_column(&assign, j)[t], 1.0))
                .collect();
            model.add_constraint(Constraint::le(terms, 1.0));
        }

        // y[s][j]: socket coverage.
        let mut coverage: Vec<Vec<VarId>> = vec![Vec::new(); topo.sockets()];
        for (s, row) in coverage.iter_mut().enumerate() {
            for &j in &active {
                let y = model.add_derived_var(format!("y_{s}_{j}"), Domain::Binary, weights.numa_spread);
                for t in topo.socket_threads(s) {
                    let x = assign_column(&assign, j)[t];
                    model.add_constraint(Constraint::ge(vec![(y, 1.0), (x, -1.0)], 0.0));
                }
                row.push(y);
            }
        }

        // h[k][j]: workload j holds exactly one sibling of core k.
        for k in 0..topo.cores() {
            let (a, b) = topo.siblings(k);
            for &j in &active {
                let column = assign_column(&assign, j);
                let (xa, xb) = (column[a], column[b]);
                let h = model.add_derived_var(format!("h_{k}_{j}"), Domain::Binary, weights.hyperthread_split);
                model.add_constraint(Constraint::ge(vec![(h, 1.0), (xa, -1.0), (xb, 1.0)], 0.0));
                model.add_constraint(Constraint::ge(vec![(h, 1.0), (xb, -1.0), (xa, 1.0)], 0.0));
            }
        }

        // e[s]: tenants of the socket's LLC beyond the first.
        for (s, row) in coverage.iter().enumerate() {
            let max = active.len().saturating_sub(1) as f64;
            let e = model.add_derived_var(
                format!("e_{s}"),
                Domain::Integer { min: 0.0, max },
                weights.llc_sharing,
            );
            let mut terms = vec![(e, 1.0)];
            terms.extend(row.iter().map(|&y| (y, -1.0)));
            model.add_constraint(Constraint::ge(terms, -1.0));
        }

        Self {
            model,
            total_threads: d,
            requests: requests.to_vec(),
            assign,
        }
    }

    /// No workload asks for anything; nothing to solve.
    pub fn is_trivial(&self) -> bool {
        self.assign.iter().all(Option::is_none)
    }

    /// Read `x > 0.5` back into a matrix and check it against the requests.
    pub fn decode(&self, solution: &Solution) -> AllocResult<AllocationMatrix> {
        let sets = self
            .assign
            .iter()
            .map(|column| match column {
                Some(vars) => vars
                    .iter()
                    .enumerate()
                    .filter(|&(_, &v)| solution.value(v) > 0.5)
                    .map(|(t, _)| t)
                    .collect(),
                None => Vec::new(),
            })
            .collect();
        let violated = |e: AllocError| AllocError::SolverFailure(format!("solution violates the model: {e}"));
        let matrix = AllocationMatrix::from_thread_sets(self.total_threads, sets).map_err(violated)?;
        matrix.validate(&self.requests).map_err(violated)?;
        Ok(matrix)
    }
}

/// One factor per workload: the `workloads` smallest primes above
/// `threads`, largest first.
///
/// `(t+1)·p` with `t < threads < p` determines both `t` and `p`, so no two
/// cells share a weight.
fn tie_break_factors(threads: usize, workloads: usize) -> Vec<usize> {
    let mut primes = Vec::with_capacity(workloads);
    let mut candidate = threads + 1;
    while primes.len() < workloads {
        if is_prime(candidate) {
            primes.push(candidate);
        }
        candidate += 1;
    }
    primes.reverse();
    primes
}

fn is_prime(n: usize) -> bool {
    n >= 2 && (2..).take_while(|k| k * k <= n).all(|k| n % k != 0)
}

fn assign_column(assign: &[Option<Vec<VarId>>], j: usize) -> &[VarId] {
    assign[j].as_deref().unwrap_or(&[])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Relation;
    use crate::solver::BruteForceSolver;

    fn exact() -> ExactAllocator<BruteForceSolver> {
        ExactAllocator::new(BruteForceSolver::new())
    }

    struct FailingSolver;

    impl Solver for FailingSolver {
        fn minimize(&self, _model: &Model) -> Solution {
            Solution::failed(SolveStatus::Error, "timed out")
        }
    }

    struct PanickingSolver;

    impl Solver for PanickingSolver {
        fn minimize(&self, _model: &Model) -> Solution {
            panic!("solver must not be called");
        }
    }

    #[test]
    fn model_shape_for_two_workloads() {
        let topo = CpuTopology::build(4, 1).unwrap();
        let f = Formulation::build(&topo, &[2, 2], &CostWeights::default(), None);
        // 8 x + 2 y + 4 h + 1 e.
        assert_eq!(f.model.variables().len(), 15);
        let demand = f
            .model
            .constraints()
            .iter()
            .filter(|c| c.relation == Relation::Eq)
            .count();
        assert_eq!(demand, 2);
    }

    #[test]
    fn zero_requests_get_no_variables() {
        let topo = CpuTopology::build(4, 1).unwrap();
        let f = Formulation::build(&topo, &[0, 2, 0], &CostWeights::default(), None);
        assert!(f.assign[0].is_none());
        assert!(f.assign[2].is_none());
        assert!(!f.is_trivial());

        let f = Formulation::build(&topo, &[0, 0], &CostWeights::default(), None);
        assert!(f.is_trivial());
    }

    #[test]
    fn stability_rewards_previous_threads() {
        let topo = CpuTopology::build(4, 1).unwrap();
        let prev = AllocationMatrix::from_thread_sets(4, vec![vec![2, 3]]).unwrap();
        let f = Formulation::build(&topo, &[2], &CostWeights::default(), Some(&prev));
        let x = |t: usize| f.model.variable(f.assign[0].as_ref().unwrap()[t]).cost;
        assert!(x(2) < 0.0);
        assert!(x(0) > 0.0);
    }

    #[test]
    fn tie_break_total_stays_below_budget() {
        let topo = CpuTopology::build(8, 2).unwrap();
        let weights = CostWeights {
            stability: 0.0,
            ..CostWeights::default()
        };
        let f = Formulation::build(&topo, &[4, 4], &weights, None);
        // Each thread is held at most once; charge it its costliest workload.
        let worst: f64 = (0..8)
            .map(|t| {
                f.assign
                    .iter()
                    .flatten()
                    .map(|column| f.model.variable(column[t]).cost)
                    .fold(0.0, f64::max)
            })
            .sum();
        assert!(worst > 0.0);
        assert!(worst < weights.tie_break);
    }

    #[test]
    fn tie_break_factors_are_descending_primes_above_threads() {
        assert_eq!(tie_break_factors(8, 3), vec![17, 13, 11]);
        assert_eq!(tie_break_factors(4, 1), vec![5]);
        assert!(tie_break_factors(4, 0).is_empty());
    }

    #[test]
    fn tie_break_weights_are_distinct_per_cell() {
        let topo = CpuTopology::build(8, 2).unwrap();
        let weights = CostWeights {
            stability: 0.0,
            ..CostWeights::default()
        };
        let f = Formulation::build(&topo, &[1, 1, 1, 1], &weights, None);
        let cost = |t: usize, j: usize| f.model.variable(f.assign[j].as_ref().unwrap()[t]).cost;

        let mut all: Vec<f64> = (0..8).flat_map(|t| (0..4).map(move |j| (t, j))).map(|(t, j)| cost(t, j)).collect();
        all.sort_by(f64::total_cmp);
        assert!(all.windows(2).all(|w| w[0] < w[1]), "duplicate tie-break weight");

        for j in 0..4 {
            assert!((1..8).all(|t| cost(t, j) > cost(t - 1, j)));
        }
        // Swapping threads 0 and 5 between workloads 1 and 3 costs more.
        assert!(cost(0, 1) + cost(5, 3) < cost(5, 1) + cost(0, 3));
    }

    #[test]
    fn lower_workloads_settle_on_lower_threads() {
        let m = exact().solve(&[1, 1], 4, 1, None).unwrap();
        assert_eq!(m.threads(0), &[0]);
        assert_eq!(m.threads(1), &[1]);
    }

    #[test]
    fn overflowing_requests_are_over_capacity() {
        let err = ExactAllocator::new(PanickingSolver)
            .solve(&[usize::MAX, 1], 4, 1, None)
            .unwrap_err();
        assert!(matches!(err, AllocError::CapacityExceeded { requested: usize::MAX, available: 4 }));
    }

    #[test]
    fn solves_single_core_pairs() {
        let m = exact().solve(&[2, 2], 4, 1, None).unwrap();
        assert_eq!(m.threads(0), &[0, 1]);
        assert_eq!(m.threads(1), &[2, 3]);
    }

    #[test]
    fn all_zero_requests_skip_the_solver() {
        let m = ExactAllocator::new(PanickingSolver)
            .solve(&[0, 0], 4, 1, None)
            .unwrap();
        assert_eq!(m.workloads(), 2);
        assert!(m.threads(0).is_empty());
    }

    #[test]
    fn capacity_checked_before_solver() {
        let err = ExactAllocator::new(PanickingSolver)
            .solve(&[5], 4, 1, None)
            .unwrap_err();
        assert!(matches!(err, AllocError::CapacityExceeded { requested: 5, available: 4 }));
    }

    #[test]
    fn solver_error_becomes_solver_failure() {
        let err = ExactAllocator::new(FailingSolver)
            .solve(&[1], 4, 1, None)
            .unwrap_err();
        assert!(matches!(err, AllocError::SolverFailure(msg) if msg.contains("timed out")));
    }

    #[test]
    fn invalid_weights_rejected() {
        let weights = CostWeights {
            llc_sharing: -5.0,
            ..CostWeights::default()
        };
        let err = exact()
            .with_weights(weights)
            .solve(&[1], 4, 1, None)
            .unwrap_err();
        assert!(matches!(err, AllocError::InvalidWeights(_)));
    }

    #[test]
    fn bogus_solution_is_rejected() {
        let topo = CpuTopology::build(4, 1).unwrap();
        let f = Formulation::build(&topo, &[2], &CostWeights::default(), None);
        let values = vec![0.0; f.model.variables().len()];
        let err = f.decode(&Solution::optimal(values, 0.0)).unwrap_err();
        assert!(matches!(err, AllocError::SolverFailure(_)));
    }
}
