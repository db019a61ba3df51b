//! Exhaustive solver for small models.
//!
//! Enumerates every non-derived variable depth-first (lowest value first),
//! pruning a branch as soon as a constraint over branching variables can no
//! longer be met. Derived variables are then set to the smallest value
//! their constraints allow, which is optimal because their cost is
//! non-negative. Ties keep the first assignment found, so results are
//! reproducible.

use tracing::debug;

use crate::model::{Constraint, Model, Relation, Solution, SolveStatus, Solver};

const TOLERANCE: f64 = 1e-9;

/// Enumerating MILP backend with no external dependency.
#[derive(Debug, Clone, Copy)]
pub struct BruteForceSolver {
    /// Models with more branching variables are refused with
    /// [`SolveStatus::Error`].
    pub max_branching_vars: usize,
}

impl Default for BruteForceSolver {
    fn default() -> Self {
        Self {
            max_branching_vars: 64,
        }
    }
}

impl BruteForceSolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_branching_vars(max_branching_vars: usize) -> Self {
        Self { max_branching_vars }
    }
}

impl Solver for BruteForceSolver {
    fn minimize(&self, model: &Model) -> Solution {
        let search = match Search::prepare(model, self.max_branching_vars) {
            Ok(search) => search,
            Err(msg) => return Solution::failed(SolveStatus::Error, msg),
        };
        search.run()
    }
}

struct Search<'m> {
    model: &'m Model,
    /// Non-derived variables in branching order.
    branching: Vec<usize>,
    /// Rows touching each variable that mention branching variables only.
    prune_rows: Vec<Vec<usize>>,
    /// Derived variables in index order with the rows that bound them.
    derived: Vec<(usize, Vec<usize>)>,
    values: Vec<f64>,
    fixed: Vec<bool>,
    best: Option<(f64, Vec<f64>)>,
    leaves: u64,
}

impl<'m> Search<'m> {
    fn prepare(model: &'m Model, max_branching: usize) -> Result<Self, String> {
        let vars = model.variables();
        let branching: Vec<usize> = (0..vars.len()).filter(|&i| !vars[i].derived).collect();
        if branching.len() > max_branching {
            return Err(format!(
                "{} branching variables exceed the limit of {max_branching}",
                branching.len()
            ));
        }
        for &i in &branching {
            if !vars[i].domain.is_integral() {
                return Err(format!("cannot enumerate continuous variable {}", vars[i].name));
            }
        }

        let mut prune_rows = vec![Vec::new(); vars.len()];
        for (r, row) in model.constraints().iter().enumerate() {
            if row.terms.iter().all(|(v, _)| !vars[v.index()].derived) {
                for (v, _) in &row.terms {
                    prune_rows[v.index()].push(r);
                }
            }
        }

        let mut derived = Vec::new();
        for (i, var) in vars.iter().enumerate().filter(|(_, v)| v.derived) {
            if var.cost < 0.0 {
                return Err(format!("derived variable {} has negative cost", var.name));
            }
            let mut rows = Vec::new();
            for (r, row) in model.constraints().iter().enumerate() {
                let Some(coef) = coefficient(row, i) else { continue };
                let bounds_below = match row.relation {
                    Relation::Ge => coef > 0.0,
                    Relation::Le => coef < 0.0,
                    Relation::Eq => true,
                };
                if !bounds_below {
                    continue;
                }
                // Lower bounds may only read variables already settled.
                let later = row
                    .terms
                    .iter()
                    .any(|(v, _)| v.index() > i && vars[v.index()].derived);
                if later {
                    return Err(format!(
                        "derived variable {} is bounded by a later derived variable",
                        var.name
                    ));
                }
                rows.push(r);
            }
            derived.push((i, rows));
        }

        let values = vars.iter().map(|v| v.domain.bounds().0).collect();
        Ok(Self {
            model,
            branching,
            prune_rows,
            derived,
            values,
            fixed: vec![false; vars.len()],
            best: None,
            leaves: 0,
        })
    }

    fn run(mut self) -> Solution {
        self.descend(0);
        debug!(leaves = self.leaves, "brute-force search finished");
        match self.best {
            Some((objective, values)) => Solution::optimal(values, objective),
            None => Solution::failed(SolveStatus::Infeasible, "no assignment satisfies the constraints"),
        }
    }

    fn descend(&mut self, depth: usize) {
        let Some(&var) = self.branching.get(depth) else {
            self.evaluate_leaf();
            return;
        };
        let (lo, hi) = self.model.variables()[var].domain.bounds();
        let (lo, hi) = ((lo - TOLERANCE).ceil() as i64, (hi + TOLERANCE).floor() as i64);
        self.fixed[var] = true;
        for value in lo..=hi {
            self.values[var] = value as f64;
            if self.still_feasible(var) {
                self.descend(depth + 1);
            }
        }
        self.fixed[var] = false;
        self.values[var] = self.model.variables()[var].domain.bounds().0;
    }

    fn still_feasible(&self, var: usize) -> bool {
        let vars = self.model.variables();
        self.prune_rows[var].iter().all(|&r| {
            let row = &self.model.constraints()[r];
            let (mut min, mut max) = (0.0, 0.0);
            for &(v, c) in &row.terms {
                let i = v.index();
                if self.fixed[i] {
                    min += c * self.values[i];
                    max += c * self.values[i];
                } else {
                    let (lo, hi) = vars[i].domain.bounds();
                    min += (c * lo).min(c * hi);
                    max += (c * lo).max(c * hi);
                }
            }
            match row.relation {
                Relation::Le => min <= row.rhs + TOLERANCE,
                Relation::Ge => max >= row.rhs - TOLERANCE,
                Relation::Eq => min <= row.rhs + TOLERANCE && max >= row.rhs - TOLERANCE,
            }
        })
    }

    fn evaluate_leaf(&mut self) {
        self.leaves += 1;
        let vars = self.model.variables();
        let constraints = self.model.constraints();

        for (i, rows) in &self.derived {
            let (lo, hi) = vars[*i].domain.bounds();
            let mut value = lo;
            for &r in rows {
                let row = &constraints[r];
                let Some(coef) = coefficient(row, *i) else { continue };
                let others: f64 = row
                    .terms
                    .iter()
                    .filter(|(v, _)| v.index() != *i)
                    .map(|&(v, c)| c * self.values[v.index()])
                    .sum();
                value = value.max((row.rhs - others) / coef);
            }
            if vars[*i].domain.is_integral() {
                value = (value - TOLERANCE).ceil();
            }
            if value > hi + TOLERANCE {
                return;
            }
            self.values[*i] = value;
        }

        if !constraints.iter().all(|c| c.is_satisfied(&self.values, 1e-6)) {
            return;
        }
        let objective = self.model.objective(&self.values);
        let improves = self
            .best
            .as_ref()
            .is_none_or(|(best, _)| objective < best - TOLERANCE);
        if improves {
            self.best = Some((objective, self.values.clone()));
        }
    }
}

fn coefficient(row: &Constraint, var: usize) -> Option<f64> {
    let coef: f64 = row
        .terms
        .iter()
        .filter(|(v, _)| v.index() == var)
        .map(|(_, c)| c)
        .sum();
    (coef != 0.0).then_some(coef)
}
