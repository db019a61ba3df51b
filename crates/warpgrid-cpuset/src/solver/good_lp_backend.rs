//! `good_lp` adapter using the pure-Rust `microlp` branch-and-bound backend.

use good_lp::{
    Expression, ProblemVariables, ResolutionError, Solution as _, SolverModel, Variable,
    constraint, microlp, variable,
};
use tracing::debug;

use crate::model::{Domain, Model, Relation, Solution, SolveStatus, Solver};

/// MILP backend backed by `good_lp` + `microlp`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GoodLpSolver;

impl GoodLpSolver {
    pub fn new() -> Self {
        Self
    }
}

impl Solver for GoodLpSolver {
    fn minimize(&self, model: &Model) -> Solution {
        let mut problem = ProblemVariables::new();
        let vars: Vec<Variable> = model
            .variables()
            .iter()
            .map(|v| {
                let def = match v.domain {
                    Domain::Binary => variable().binary(),
                    Domain::Integer { min, max } => variable().integer().min(min).max(max),
                    Domain::Continuous { min, max } => variable().min(min).max(max),
                };
                problem.add(def)
            })
            .collect();

        let objective: Expression = vars
            .iter()
            .zip(model.variables())
            .filter(|(_, def)| def.cost != 0.0)
            .map(|(&var, def)| def.cost * var)
            .sum();

        let mut lp = problem.minimise(objective).using(microlp);
        for row in model.constraints() {
            let lhs: Expression = row
                .terms
                .iter()
                .map(|&(v, c)| c * vars[v.index()])
                .sum();
            let c = match row.relation {
                Relation::Le => constraint::leq(lhs, row.rhs),
                Relation::Ge => constraint::geq(lhs, row.rhs),
                Relation::Eq => constraint::eq(lhs, row.rhs),
            };
            lp = lp.with(c);
        }

        match lp.solve() {
            Ok(solution) => {
                let values: Vec<f64> = vars.iter().map(|&v| solution.value(v)).collect();
                let objective = model.objective(&values);
                debug!(objective, "microlp returned optimal solution");
                Solution::optimal(values, objective)
            }
            Err(ResolutionError::Infeasible) => {
                Solution::failed(SolveStatus::Infeasible, "microlp: problem is infeasible")
            }
            Err(e) => Solution::failed(SolveStatus::Error, format!("microlp: {e}")),
        }
    }
}
