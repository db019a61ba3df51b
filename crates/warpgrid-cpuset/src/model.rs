//! Linear-program model handed to a MILP solver.
//!
//! The exact allocator only builds a [`Model`] and reads back a
//! [`Solution`]; any backend implementing [`Solver`] can be plugged in.
//! The objective is always minimized and is the sum of per-variable costs.

use std::fmt;

/// Handle to a variable inside a [`Model`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub(crate) usize);

impl VarId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Domain {
    Binary,
    Integer { min: f64, max: f64 },
    Continuous { min: f64, max: f64 },
}

impl Domain {
    pub fn bounds(&self) -> (f64, f64) {
        match *self {
            Domain::Binary => (0.0, 1.0),
            Domain::Integer { min, max } | Domain::Continuous { min, max } => (min, max),
        }
    }

    pub fn is_integral(&self) -> bool {
        !matches!(self, Domain::Continuous { .. })
    }
}

#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub domain: Domain,
    /// Objective coefficient.
    pub cost: f64,
    /// The variable's optimal value is the smallest one allowed by the
    /// constraints it shares with lower-indexed variables. Solvers that do
    /// their own search are free to ignore this.
    pub derived: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Le,
    Ge,
    Eq,
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Relation::Le => "<=",
            Relation::Ge => ">=",
            Relation::Eq => "=",
        })
    }
}

/// `Σ coef · var  <relation>  rhs`
#[derive(Debug, Clone)]
pub struct Constraint {
    pub terms: Vec<(VarId, f64)>,
    pub relation: Relation,
    pub rhs: f64,
}

impl Constraint {
    pub fn le(terms: Vec<(VarId, f64)>, rhs: f64) -> Self {
        Self { terms, relation: Relation::Le, rhs }
    }

    pub fn ge(terms: Vec<(VarId, f64)>, rhs: f64) -> Self {
        Self { terms, relation: Relation::Ge, rhs }
    }

    pub fn eq(terms: Vec<(VarId, f64)>, rhs: f64) -> Self {
        Self { terms, relation: Relation::Eq, rhs }
    }

    pub fn lhs(&self, values: &[f64]) -> f64 {
        self.terms.iter().map(|&(v, c)| c * values[v.0]).sum()
    }

    pub fn is_satisfied(&self, values: &[f64], tolerance: f64) -> bool {
        let lhs = self.lhs(values);
        match self.relation {
            Relation::Le => lhs <= self.rhs + tolerance,
            Relation::Ge => lhs >= self.rhs - tolerance,
            Relation::Eq => (lhs - self.rhs).abs() <= tolerance,
        }
    }
}

/// A minimization problem over bounded variables and linear constraints.
#[derive(Debug, Clone, Default)]
pub struct Model {
    variables: Vec<Variable>,
    constraints: Vec<Constraint>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_var(&mut self, name: impl Into<String>, domain: Domain, cost: f64) -> VarId {
        self.push_var(name.into(), domain, cost, false)
    }

    /// Add an auxiliary variable whose value is pinned by constraints over
    /// variables added before it.
    pub fn add_derived_var(&mut self, name: impl Into<String>, domain: Domain, cost: f64) -> VarId {
        self.push_var(name.into(), domain, cost, true)
    }

    fn push_var(&mut self, name: String, domain: Domain, cost: f64, derived: bool) -> VarId {
        let id = VarId(self.variables.len());
        self.variables.push(Variable { name, domain, cost, derived });
        id
    }

    /// Add `delta` to a variable's objective coefficient.
    pub fn add_cost(&mut self, var: VarId, delta: f64) {
        self.variables[var.0].cost += delta;
    }

    pub fn add_constraint(&mut self, constraint: Constraint) {
        self.constraints.push(constraint);
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn variable(&self, var: VarId) -> &Variable {
        &self.variables[var.0]
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn objective(&self, values: &[f64]) -> f64 {
        self.variables
            .iter()
            .zip(values)
            .map(|(var, value)| var.cost * value)
            .sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    Optimal,
    Infeasible,
    Error,
}

#[derive(Debug, Clone)]
pub struct Solution {
    pub status: SolveStatus,
    /// One value per model variable, in [`VarId`] order. Empty unless
    /// `status` is [`SolveStatus::Optimal`].
    pub values: Vec<f64>,
    pub objective: f64,
    /// Backend-specific detail for non-optimal outcomes.
    pub message: Option<String>,
}

impl Solution {
    pub fn optimal(values: Vec<f64>, objective: f64) -> Self {
        Self {
            status: SolveStatus::Optimal,
            values,
            objective,
            message: None,
        }
    }

    pub fn failed(status: SolveStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            values: Vec::new(),
            objective: f64::NAN,
            message: Some(message.into()),
        }
    }

    pub fn value(&self, var: VarId) -> f64 {
        self.values.get(var.0).copied().unwrap_or(0.0)
    }
}

/// A MILP backend: minimize the model's objective subject to its
/// constraints. Implementations must be deterministic for identical models.
pub trait Solver {
    fn minimize(&self, model: &Model) -> Solution;
}

impl<S: Solver + ?Sized> Solver for &S {
    fn minimize(&self, model: &Model) -> Solution {
        (**self).minimize(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constraint_evaluation() {
        let mut model = Model::new();
        let a = model.add_var("a", Domain::Binary, 1.0);
        let b = model.add_var("b", Domain::Binary, 2.0);
        let c = Constraint::le(vec![(a, 1.0), (b, 1.0)], 1.0);
        assert!(c.is_satisfied(&[1.0, 0.0], 1e-9));
        assert!(!c.is_satisfied(&[1.0, 1.0], 1e-9));
        assert_eq!(model.objective(&[1.0, 1.0]), 3.0);
    }

    #[test]
    fn add_cost_accumulates() {
        let mut model = Model::new();
        let a = model.add_var("a", Domain::Binary, 1.0);
        model.add_cost(a, 0.5);
        model.add_cost(a, -2.0);
        assert_eq!(model.variable(a).cost, -0.5);
    }

    #[test]
    fn derived_flag_is_recorded() {
        let mut model = Model::new();
        let a = model.add_var("a", Domain::Binary, 0.0);
        let b = model.add_derived_var("b", Domain::Integer { min: 0.0, max: 3.0 }, 1.0);
        assert!(!model.variable(a).derived);
        assert!(model.variable(b).derived);
        assert_eq!(model.variable(b).domain.bounds(), (0.0, 3.0));
    }
}
