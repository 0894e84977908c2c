//! Worst-margin objective.
//!
//! `MM` is bounded by the margin of every optimised CNEC side:
//!
//! ```text
//! MM·conv − F ≤ −minFlow     (below threshold)
//! MM·conv + F ≤  maxFlow     (above threshold)
//! ```
//!
//! with `conv` the MW value of one objective unit on that CNEC. The objective
//! is `−MM`.

use super::ProblemFiller;
use crate::inputs::{FlowResult, RangeActionActivationResult, SensitivityResult};
use crate::linear_problem::{ConstraintKey, LinearProblem, MarginExtension, VariableKey, VariableKind};
use crate::perimeter::OptimizationPerimeter;
use rao_core::{RaoResult, Unit};
use tracing::{debug, warn};

pub struct MaxMinMarginFiller<'a> {
    perimeter: &'a OptimizationPerimeter,
    unit: Unit,
}

impl<'a> MaxMinMarginFiller<'a> {
    pub fn new(perimeter: &'a OptimizationPerimeter, unit: Unit) -> Self {
        Self { perimeter, unit }
    }
}

impl ProblemFiller for MaxMinMarginFiller<'_> {
    fn name(&self) -> &'static str {
        "max min margin"
    }

    fn fill(
        &mut self,
        lp: &mut LinearProblem,
        _flows: &dyn FlowResult,
        _sensitivities: &dyn SensitivityResult,
        _activation: &dyn RangeActionActivationResult,
    ) -> RaoResult<()> {
        build_minimum_margin(lp, self.perimeter, self.unit, f64::INFINITY)
    }
}

/// Create `MM`, its margin constraints and its objective term.
///
/// `MM` is pinned to zero when the perimeter has no optimised CNEC.
pub(super) fn build_minimum_margin(
    lp: &mut LinearProblem,
    perimeter: &OptimizationPerimeter,
    unit: Unit,
    upper_bound: f64,
) -> RaoResult<()> {
    let has_optimized = perimeter.optimized_flow_cnecs().next().is_some();
    let (lb, ub) = if has_optimized {
        (f64::NEG_INFINITY, upper_bound)
    } else {
        warn!("No optimised CNEC in perimeter, minimum margin pinned to 0");
        (0.0, 0.0)
    };
    let minimum_margin = lp.add_variable(VariableKey::MinimumMargin, lb, ub, VariableKind::Continuous)?;

    let mut constraints = 0;
    for cnec in perimeter.optimized_flow_cnecs() {
        let conversion = cnec.flow_unit_multiplier(unit, Unit::Megawatt)?;
        for side in cnec.monitored_sides() {
            let flow = lp.get_variable(&VariableKey::flow(&cnec.id, side))?;
            if let Some(min_flow) = cnec.lower_bound(side, Unit::Megawatt) {
                let constraint = lp.add_constraint(
                    ConstraintKey::minimum_margin(&cnec.id, side, MarginExtension::BelowThreshold),
                    f64::NEG_INFINITY,
                    -min_flow,
                )?;
                lp.set_coefficient(constraint, minimum_margin, conversion);
                lp.set_coefficient(constraint, flow, -1.0);
                constraints += 1;
            }
            if let Some(max_flow) = cnec.upper_bound(side, Unit::Megawatt) {
                let constraint = lp.add_constraint(
                    ConstraintKey::minimum_margin(&cnec.id, side, MarginExtension::AboveThreshold),
                    f64::NEG_INFINITY,
                    max_flow,
                )?;
                lp.set_coefficient(constraint, minimum_margin, conversion);
                lp.set_coefficient(constraint, flow, 1.0);
                constraints += 1;
            }
        }
    }
    lp.set_objective_coefficient(minimum_margin, -1.0);
    debug!(constraints, unit = %unit, "Minimum margin constraints built");
    Ok(())
}
