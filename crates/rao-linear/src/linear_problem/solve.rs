//! Translation of the sparse model into a `good_lp` backend.

use super::{LinearProblem, LinearProblemStatus, SolutionValues, VariableData, VariableKind};
use crate::parameters::SolverBackend;
use good_lp::{constraint, variable, variables, Constraint, Expression, ResolutionError, Solution, SolverModel, Variable};
use rao_core::{RaoError, RaoResult};
use std::time::Instant;
use tracing::{debug, warn};

/// Tolerance under which a variable-free row is considered satisfied
const EMPTY_ROW_TOLERANCE: f64 = 1e-9;

impl LinearProblem {
    /// Solve the model with the configured backend.
    ///
    /// Infeasible and unbounded models are reported through the returned
    /// status; NaN data in the model is an error.
    pub fn solve(&mut self) -> RaoResult<LinearProblemStatus> {
        let start = Instant::now();
        self.check_numbers()?;
        self.solution = None;

        let mut vars = variables!();
        let handles: Vec<Variable> = self.variables.iter().map(|v| vars.add(definition(v))).collect();

        let mut objective = Expression::from(0.0);
        for (id, coefficient) in &self.objective {
            if *coefficient != 0.0 {
                objective += *coefficient * handles[id.0];
            }
        }

        let mut constraints = Vec::with_capacity(self.constraints.len());
        let mut unsatisfiable = false;
        for row in &self.constraints {
            let active: Vec<(Variable, f64)> = row
                .coefficients
                .iter()
                .filter(|(_, c)| **c != 0.0)
                .map(|(id, c)| (handles[id.0], *c))
                .collect();
            if active.is_empty() {
                if row.lb > EMPTY_ROW_TOLERANCE || row.ub < -EMPTY_ROW_TOLERANCE {
                    warn!(constraint = %row.key, lb = row.lb, ub = row.ub, "Empty constraint cannot be satisfied");
                    unsatisfiable = true;
                }
                continue;
            }
            let mut expr = Expression::from(0.0);
            for (var, c) in active {
                expr += c * var;
            }
            if row.lb == row.ub {
                constraints.push(constraint!(expr == row.lb));
                continue;
            }
            if row.lb.is_finite() {
                constraints.push(constraint!(expr.clone() >= row.lb));
            }
            if row.ub.is_finite() {
                constraints.push(constraint!(expr <= row.ub));
            }
        }

        if unsatisfiable {
            return Ok(self.record(LinearProblemStatus::Infeasible, None));
        }

        debug!(
            variables = handles.len(),
            constraints = constraints.len(),
            backend = self.solver.backend.display_name(),
            "Solving linear problem"
        );

        let problem = vars.minimise(objective);
        let result = match self.solver.backend {
            #[cfg(feature = "solver-microlp")]
            SolverBackend::Microlp => finish(problem.using(good_lp::solvers::microlp::microlp), constraints, &handles),
            #[cfg(feature = "solver-highs")]
            SolverBackend::Highs => {
                let mut model = problem.using(good_lp::solvers::highs::highs);
                model = model.set_verbose(self.solver.verbose);
                model = model.set_option("mip_rel_gap", self.solver.relative_mip_gap);
                if let Some(limit) = self.solver.time_limit_seconds {
                    model = model.set_time_limit(limit);
                }
                finish(model, constraints, &handles)
            }
        };

        let status = match result {
            Ok(values) => {
                let objective: f64 = self
                    .objective
                    .iter()
                    .map(|(id, c)| c * values[id.0])
                    .sum();
                let status = self.record(
                    LinearProblemStatus::Optimal,
                    Some(SolutionValues { values, objective }),
                );
                debug!(
                    objective,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Linear problem solved"
                );
                status
            }
            Err(ResolutionError::Infeasible) => self.record(LinearProblemStatus::Infeasible, None),
            Err(ResolutionError::Unbounded) => self.record(LinearProblemStatus::Unbounded, None),
            Err(err) => {
                warn!(error = %err, "Solver ended abnormally");
                self.record(LinearProblemStatus::Abnormal, None)
            }
        };
        if !status.is_success() {
            warn!(%status, "Linear problem has no solution");
        }
        Ok(status)
    }

    fn record(&mut self, status: LinearProblemStatus, solution: Option<SolutionValues>) -> LinearProblemStatus {
        self.status = Some(status);
        self.solution = solution;
        status
    }

    fn check_numbers(&self) -> RaoResult<()> {
        if let Some(v) = self.variables.iter().find(|v| v.lb.is_nan() || v.ub.is_nan()) {
            return Err(RaoError::Solver(format!("{} has a NaN bound", v.key)));
        }
        for row in &self.constraints {
            if row.lb.is_nan() || row.ub.is_nan() {
                return Err(RaoError::Solver(format!("{} has a NaN bound", row.key)));
            }
            if let Some((id, _)) = row.coefficients.iter().find(|(_, c)| !c.is_finite()) {
                return Err(RaoError::Solver(format!(
                    "{} has a non finite coefficient on {}",
                    row.key, self.variables[id.0].key
                )));
            }
        }
        if let Some((id, _)) = self.objective.iter().find(|(_, c)| !c.is_finite()) {
            return Err(RaoError::Solver(format!(
                "objective has a non finite coefficient on {}",
                self.variables[id.0].key
            )));
        }
        Ok(())
    }
}

fn definition(data: &VariableData) -> good_lp::VariableDefinition {
    let mut def = variable();
    if matches!(data.kind, VariableKind::Integer | VariableKind::Binary) {
        def = def.integer();
    }
    if data.lb.is_finite() {
        def = def.min(data.lb);
    }
    if data.ub.is_finite() {
        def = def.max(data.ub);
    }
    def
}

fn finish<M>(mut model: M, constraints: Vec<Constraint>, handles: &[Variable]) -> Result<Vec<f64>, ResolutionError>
where
    M: SolverModel<Error = ResolutionError>,
{
    for c in constraints {
        model.add_constraint(c);
    }
    let solution = model.solve()?;
    Ok(handles.iter().map(|v| solution.value(*v)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linear_problem::{ConstraintKey, VariableKey};
    use rao_core::{CnecId, Side};

    fn flow(cnec: &str) -> VariableKey {
        VariableKey::Flow {
            cnec: CnecId::new(cnec),
            side: Side::One,
        }
    }

    #[test]
    fn test_solve_small_lp() {
        // max x + y  s.t.  x + 2y <= 4, x <= 3
        let mut lp = LinearProblem::default();
        let x = lp.add_variable(flow("x"), 0.0, 3.0, VariableKind::Continuous).expect("x");
        let y = lp.add_variable(flow("y"), 0.0, f64::INFINITY, VariableKind::Continuous).expect("y");
        let c = lp
            .add_constraint(
                ConstraintKey::Flow {
                    cnec: CnecId::new("c"),
                    side: Side::One,
                },
                f64::NEG_INFINITY,
                4.0,
            )
            .expect("c");
        lp.set_coefficient(c, x, 1.0);
        lp.set_coefficient(c, y, 2.0);
        lp.set_objective_coefficient(x, -1.0);
        lp.set_objective_coefficient(y, -1.0);

        let status = lp.solve().expect("solve");
        assert_eq!(status, LinearProblemStatus::Optimal);
        assert!((lp.value(x).expect("x") - 3.0).abs() < 1e-6);
        assert!((lp.value(y).expect("y") - 0.5).abs() < 1e-6);
        assert!((lp.objective_value().expect("objective") + 3.5).abs() < 1e-6);
    }

    #[test]
    fn test_integer_variable() {
        // max x  s.t.  2x <= 5, x integer
        let mut lp = LinearProblem::default();
        let x = lp.add_variable(flow("x"), 0.0, 10.0, VariableKind::Integer).expect("x");
        let c = lp.add_constraint(ConstraintKey::MinimumRelMarginSetToZero, f64::NEG_INFINITY, 5.0).expect("c");
        lp.set_coefficient(c, x, 2.0);
        lp.set_objective_coefficient(x, -1.0);
        assert_eq!(lp.solve().expect("solve"), LinearProblemStatus::Optimal);
        assert!((lp.value(x).expect("x") - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_infeasible() {
        let mut lp = LinearProblem::default();
        let x = lp.add_variable(flow("x"), 0.0, 1.0, VariableKind::Continuous).expect("x");
        let c = lp.add_constraint(ConstraintKey::MinimumRelMarginSetToZero, 2.0, f64::INFINITY).expect("c");
        lp.set_coefficient(c, x, 1.0);
        assert_eq!(lp.solve().expect("solve"), LinearProblemStatus::Infeasible);
        assert!(lp.value(x).is_err());
    }

    #[test]
    fn test_empty_row_outside_bounds_is_infeasible() {
        let mut lp = LinearProblem::default();
        let x = lp.add_variable(flow("x"), 0.0, 1.0, VariableKind::Continuous).expect("x");
        let c = lp.add_constraint(ConstraintKey::MinimumRelMarginSetToZero, 1.0, 1.0).expect("c");
        lp.set_coefficient(c, x, 0.0);
        assert_eq!(lp.solve().expect("solve"), LinearProblemStatus::Infeasible);
    }

    #[test]
    fn test_nan_bound_is_an_error() {
        let mut lp = LinearProblem::default();
        lp.add_variable(flow("x"), f64::NAN, 1.0, VariableKind::Continuous).expect("x");
        assert!(matches!(lp.solve(), Err(RaoError::Solver(_))));
    }
}
