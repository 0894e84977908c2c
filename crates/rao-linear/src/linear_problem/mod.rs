//! Linear problem: a sparse LP/MIP addressed by structural keys.
//!
//! The model is stored in its own row-wise sparse form and only handed over to
//! a `good_lp` backend when [`LinearProblem::solve`] is called. Fillers never
//! hold solver objects; they create variables and constraints under a
//! [`VariableKey`] / [`ConstraintKey`] and look them up again by key.
//!
//! # Conventions
//!
//! - Every constraint is two-sided: `lb ≤ Σ coef·var ≤ ub`, infinite sides
//!   are left open in the solver model
//! - The objective is always minimised
//! - A coefficient set to `0.0` stays in the row (so it can be read back) but
//!   is not passed to the solver
//!
//! # Example
//!
//! ```
//! use rao_linear::linear_problem::{LinearProblem, VariableKey, VariableKind};
//!
//! let mut lp = LinearProblem::default();
//! let mm = lp.add_variable(VariableKey::MinimumMargin, 0.0, 10.0, VariableKind::Continuous)?;
//! lp.set_objective_coefficient(mm, -1.0);
//! lp.solve()?;
//! assert!((lp.value(mm)? - 10.0).abs() < 1e-6);
//! # Ok::<(), rao_core::RaoError>(())
//! ```

mod keys;
mod solve;
mod status;

pub use keys::{
    AbsExtension, BoundExtension, ConstraintKey, MarginExtension, RaRangeShrinking, VariableKey,
    VariationDirection,
};
pub use status::LinearProblemStatus;

use crate::parameters::SolverParameters;
use rao_core::{RaoError, RaoResult};
use std::collections::{BTreeMap, HashMap};

/// Handle of a variable, valid for the problem that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariableId(usize);

/// Handle of a constraint, valid for the problem that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConstraintId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    Continuous,
    Integer,
    /// Integer in `[0, 1]`; bounds passed at creation are ignored
    Binary,
}

#[derive(Debug, Clone)]
struct VariableData {
    key: VariableKey,
    lb: f64,
    ub: f64,
    kind: VariableKind,
}

#[derive(Debug, Clone)]
struct ConstraintData {
    key: ConstraintKey,
    lb: f64,
    ub: f64,
    coefficients: BTreeMap<VariableId, f64>,
}

#[derive(Debug, Clone)]
struct SolutionValues {
    values: Vec<f64>,
    objective: f64,
}

/// Mutable LP/MIP shared by all fillers of one optimisation perimeter.
#[derive(Debug, Clone, Default)]
pub struct LinearProblem {
    variables: Vec<VariableData>,
    variable_index: HashMap<VariableKey, VariableId>,
    constraints: Vec<ConstraintData>,
    constraint_index: HashMap<ConstraintKey, ConstraintId>,
    objective: BTreeMap<VariableId, f64>,
    solver: SolverParameters,
    status: Option<LinearProblemStatus>,
    solution: Option<SolutionValues>,
}

impl LinearProblem {
    pub fn new(solver: SolverParameters) -> Self {
        Self {
            solver,
            ..Self::default()
        }
    }

    pub fn solver_parameters(&self) -> &SolverParameters {
        &self.solver
    }

    // === Variables ===

    /// Create a variable. Fails if `key` already names a variable.
    pub fn add_variable(
        &mut self,
        key: VariableKey,
        lb: f64,
        ub: f64,
        kind: VariableKind,
    ) -> RaoResult<VariableId> {
        if self.variable_index.contains_key(&key) {
            return Err(RaoError::DuplicateHandle(key.to_string()));
        }
        let (lb, ub) = match kind {
            VariableKind::Binary => (0.0, 1.0),
            _ => (lb, ub),
        };
        let id = VariableId(self.variables.len());
        self.variable_index.insert(key.clone(), id);
        self.variables.push(VariableData { key, lb, ub, kind });
        Ok(id)
    }

    pub fn get_variable(&self, key: &VariableKey) -> RaoResult<VariableId> {
        self.variable_index
            .get(key)
            .copied()
            .ok_or_else(|| RaoError::UndefinedHandle(key.to_string()))
    }

    pub fn has_variable(&self, key: &VariableKey) -> bool {
        self.variable_index.contains_key(key)
    }

    /// Look a variable up, creating it on first use.
    pub fn get_or_add_variable(
        &mut self,
        key: VariableKey,
        lb: f64,
        ub: f64,
        kind: VariableKind,
    ) -> RaoResult<VariableId> {
        match self.variable_index.get(&key) {
            Some(id) => Ok(*id),
            None => self.add_variable(key, lb, ub, kind),
        }
    }

    pub fn set_variable_bounds(&mut self, variable: VariableId, lb: f64, ub: f64) {
        let data = &mut self.variables[variable.0];
        data.lb = lb;
        data.ub = ub;
    }

    pub fn variable_lb(&self, variable: VariableId) -> f64 {
        self.variables[variable.0].lb
    }

    pub fn variable_ub(&self, variable: VariableId) -> f64 {
        self.variables[variable.0].ub
    }

    pub fn variable_kind(&self, variable: VariableId) -> VariableKind {
        self.variables[variable.0].kind
    }

    pub fn variable_key(&self, variable: VariableId) -> &VariableKey {
        &self.variables[variable.0].key
    }

    pub fn variable_count(&self) -> usize {
        self.variables.len()
    }

    // === Constraints ===

    /// Create an empty constraint `lb ≤ · ≤ ub`. Fails if `key` already exists.
    pub fn add_constraint(&mut self, key: ConstraintKey, lb: f64, ub: f64) -> RaoResult<ConstraintId> {
        if self.constraint_index.contains_key(&key) {
            return Err(RaoError::DuplicateHandle(key.to_string()));
        }
        let id = ConstraintId(self.constraints.len());
        self.constraint_index.insert(key.clone(), id);
        self.constraints.push(ConstraintData {
            key,
            lb,
            ub,
            coefficients: BTreeMap::new(),
        });
        Ok(id)
    }

    pub fn get_constraint(&self, key: &ConstraintKey) -> RaoResult<ConstraintId> {
        self.constraint_index
            .get(key)
            .copied()
            .ok_or_else(|| RaoError::UndefinedHandle(key.to_string()))
    }

    pub fn has_constraint(&self, key: &ConstraintKey) -> bool {
        self.constraint_index.contains_key(key)
    }

    /// Set (replace) the coefficient of `variable` in `constraint`.
    pub fn set_coefficient(&mut self, constraint: ConstraintId, variable: VariableId, value: f64) {
        self.constraints[constraint.0]
            .coefficients
            .insert(variable, value);
    }

    /// Coefficient of `variable` in `constraint`, `0.0` when never set.
    pub fn coefficient(&self, constraint: ConstraintId, variable: VariableId) -> f64 {
        self.constraints[constraint.0]
            .coefficients
            .get(&variable)
            .copied()
            .unwrap_or(0.0)
    }

    pub fn set_constraint_bounds(&mut self, constraint: ConstraintId, lb: f64, ub: f64) {
        let data = &mut self.constraints[constraint.0];
        data.lb = lb;
        data.ub = ub;
    }

    pub fn set_constraint_lb(&mut self, constraint: ConstraintId, lb: f64) {
        self.constraints[constraint.0].lb = lb;
    }

    pub fn set_constraint_ub(&mut self, constraint: ConstraintId, ub: f64) {
        self.constraints[constraint.0].ub = ub;
    }

    pub fn constraint_lb(&self, constraint: ConstraintId) -> f64 {
        self.constraints[constraint.0].lb
    }

    pub fn constraint_ub(&self, constraint: ConstraintId) -> f64 {
        self.constraints[constraint.0].ub
    }

    pub fn constraint_key(&self, constraint: ConstraintId) -> &ConstraintKey {
        &self.constraints[constraint.0].key
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    // === Objective ===

    pub fn set_objective_coefficient(&mut self, variable: VariableId, value: f64) {
        self.objective.insert(variable, value);
    }

    pub fn objective_coefficient(&self, variable: VariableId) -> f64 {
        self.objective.get(&variable).copied().unwrap_or(0.0)
    }

    // === Solution ===

    /// Status of the last solve, `NotSolved` before the first one.
    pub fn status(&self) -> LinearProblemStatus {
        self.status.unwrap_or(LinearProblemStatus::NotSolved)
    }

    /// Value of `variable` in the last successful solve.
    pub fn value(&self, variable: VariableId) -> RaoResult<f64> {
        let solution = self.solution_values()?;
        solution
            .values
            .get(variable.0)
            .copied()
            .ok_or_else(|| RaoError::NotSolved(format!("{} was created after the last solve", self.variable_key(variable))))
    }

    /// Value of the variable named `key` in the last successful solve.
    pub fn value_of(&self, key: &VariableKey) -> RaoResult<f64> {
        self.value(self.get_variable(key)?)
    }

    pub fn objective_value(&self) -> RaoResult<f64> {
        Ok(self.solution_values()?.objective)
    }

    fn solution_values(&self) -> RaoResult<&SolutionValues> {
        self.solution
            .as_ref()
            .ok_or_else(|| RaoError::NotSolved(self.status().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rao_core::{CnecId, Side};

    fn flow_key(cnec: &str) -> VariableKey {
        VariableKey::Flow {
            cnec: CnecId::new(cnec),
            side: Side::One,
        }
    }

    #[test]
    fn test_undefined_variable_is_an_error() {
        let lp = LinearProblem::default();
        let err = lp.get_variable(&flow_key("cnec1")).unwrap_err();
        assert!(matches!(err, RaoError::UndefinedHandle(_)));
        assert_eq!(err.to_string(), "Variable cnec1 (side one) flow has not been created yet");
    }

    #[test]
    fn test_duplicate_variable_is_an_error() {
        let mut lp = LinearProblem::default();
        lp.add_variable(flow_key("cnec1"), f64::NEG_INFINITY, f64::INFINITY, VariableKind::Continuous)
            .expect("first creation");
        let err = lp
            .add_variable(flow_key("cnec1"), 0.0, 1.0, VariableKind::Continuous)
            .unwrap_err();
        assert!(matches!(err, RaoError::DuplicateHandle(_)));
    }

    #[test]
    fn test_get_or_add_variable_reuses_existing() {
        let mut lp = LinearProblem::default();
        let a = lp
            .get_or_add_variable(VariableKey::MinimumMargin, -1.0, 1.0, VariableKind::Continuous)
            .expect("created");
        let b = lp
            .get_or_add_variable(VariableKey::MinimumMargin, -5.0, 5.0, VariableKind::Continuous)
            .expect("reused");
        assert_eq!(a, b);
        assert_eq!(lp.variable_lb(a), -1.0);
        assert_eq!(lp.variable_count(), 1);
    }

    #[test]
    fn test_binary_bounds_forced() {
        let mut lp = LinearProblem::default();
        let b = lp
            .add_variable(VariableKey::MinimumRelativeMarginSignBinary, -3.0, 7.0, VariableKind::Binary)
            .expect("binary");
        assert_eq!((lp.variable_lb(b), lp.variable_ub(b)), (0.0, 1.0));
    }

    #[test]
    fn test_coefficients_and_bounds() {
        let mut lp = LinearProblem::default();
        let f = lp
            .add_variable(flow_key("cnec1"), f64::NEG_INFINITY, f64::INFINITY, VariableKind::Continuous)
            .expect("flow");
        let c = lp
            .add_constraint(
                ConstraintKey::Flow {
                    cnec: CnecId::new("cnec1"),
                    side: Side::One,
                },
                100.0,
                100.0,
            )
            .expect("constraint");
        assert_eq!(lp.coefficient(c, f), 0.0);
        lp.set_coefficient(c, f, 1.0);
        lp.set_constraint_bounds(c, 50.0, 60.0);
        assert_eq!(lp.coefficient(c, f), 1.0);
        assert_eq!((lp.constraint_lb(c), lp.constraint_ub(c)), (50.0, 60.0));
    }

    #[test]
    fn test_value_before_solve() {
        let mut lp = LinearProblem::default();
        let mm = lp
            .add_variable(VariableKey::MinimumMargin, 0.0, 1.0, VariableKind::Continuous)
            .expect("mm");
        assert_eq!(lp.status(), LinearProblemStatus::NotSolved);
        assert!(matches!(lp.value(mm), Err(RaoError::NotSolved(_))));
    }
}
