//! Loop-flow limits.
//!
//! The loop flow of a CNEC is its flow minus the commercial flow. It must stay
//! below `max(threshold, |initial loop flow| + acceptable increase)`, with
//! violations paid in the objective. The commercial flow is taken as constant
//! within one linear problem.

use super::ProblemFiller;
use crate::inputs::{FlowResult, RangeActionActivationResult, SensitivityResult};
use crate::linear_problem::{BoundExtension, ConstraintKey, LinearProblem, VariableKey, VariableKind};
use crate::parameters::LoopFlowParameters;
use crate::perimeter::OptimizationPerimeter;
use rao_core::{FlowCnec, RaoResult, Side};
use tracing::{debug, warn};

/// Slack around the loop-flow bounds, in MW.
const LOOP_FLOW_TOLERANCE: f64 = 0.01;

pub struct MaxLoopFlowFiller<'a> {
    perimeter: &'a OptimizationPerimeter,
    initial_flows: &'a dyn FlowResult,
    parameters: LoopFlowParameters,
}

impl<'a> MaxLoopFlowFiller<'a> {
    pub fn new(
        perimeter: &'a OptimizationPerimeter,
        initial_flows: &'a dyn FlowResult,
        parameters: LoopFlowParameters,
    ) -> Self {
        Self {
            perimeter,
            initial_flows,
            parameters,
        }
    }

    /// Sides with a usable initial loop flow, with their loop-flow bound in MW.
    fn bounded_sides(&self, cnec: &FlowCnec) -> RaoResult<Vec<(Side, f64)>> {
        let Some(threshold) = cnec.loop_flow_threshold_mw() else {
            return Ok(Vec::new());
        };
        let mut sides = Vec::new();
        for side in cnec.monitored_sides() {
            let initial = self.initial_flows.loop_flow(&cnec.id, side)?;
            if initial.is_nan() {
                warn!(cnec = %cnec.id, side = %side, "No initial loop flow, side skipped");
                continue;
            }
            let bound = threshold.max(initial.abs() + self.parameters.acceptable_increase)
                - self.parameters.constraint_adjustment_coefficient;
            sides.push((side, bound));
        }
        Ok(sides)
    }

    fn write_bounds(
        &self,
        lp: &mut LinearProblem,
        cnec: &FlowCnec,
        side: Side,
        bound: f64,
        flows: &dyn FlowResult,
    ) -> RaoResult<()> {
        let commercial = flows.commercial_flow(&cnec.id, side)?;
        let upper = lp.get_constraint(&loop_flow_key(cnec, side, BoundExtension::UpperBound))?;
        lp.set_constraint_bounds(upper, f64::NEG_INFINITY, bound + commercial + LOOP_FLOW_TOLERANCE);
        let lower = lp.get_constraint(&loop_flow_key(cnec, side, BoundExtension::LowerBound))?;
        lp.set_constraint_bounds(lower, -bound + commercial - LOOP_FLOW_TOLERANCE, f64::INFINITY);
        Ok(())
    }
}

fn loop_flow_key(cnec: &FlowCnec, side: Side, bound: BoundExtension) -> ConstraintKey {
    ConstraintKey::MaxLoopFlow {
        cnec: cnec.id.clone(),
        side,
        bound,
    }
}

impl ProblemFiller for MaxLoopFlowFiller<'_> {
    fn name(&self) -> &'static str {
        "max loop flow"
    }

    fn fill(
        &mut self,
        lp: &mut LinearProblem,
        flows: &dyn FlowResult,
        _sensitivities: &dyn SensitivityResult,
        _activation: &dyn RangeActionActivationResult,
    ) -> RaoResult<()> {
        let mut constrained = 0;
        for cnec in self.perimeter.loop_flow_cnecs() {
            let nb_sides = cnec.monitored_sides().len() as f64;
            for (side, bound) in self.bounded_sides(cnec)? {
                let flow = lp.get_variable(&VariableKey::flow(&cnec.id, side))?;
                let violation = lp.add_variable(
                    VariableKey::LoopFlowViolation {
                        cnec: cnec.id.clone(),
                        side,
                    },
                    0.0,
                    f64::INFINITY,
                    VariableKind::Continuous,
                )?;
                let upper = lp.add_constraint(
                    loop_flow_key(cnec, side, BoundExtension::UpperBound),
                    f64::NEG_INFINITY,
                    f64::INFINITY,
                )?;
                lp.set_coefficient(upper, flow, 1.0);
                lp.set_coefficient(upper, violation, -1.0);
                let lower = lp.add_constraint(
                    loop_flow_key(cnec, side, BoundExtension::LowerBound),
                    f64::NEG_INFINITY,
                    f64::INFINITY,
                )?;
                lp.set_coefficient(lower, flow, 1.0);
                lp.set_coefficient(lower, violation, 1.0);
                self.write_bounds(lp, cnec, side, bound, flows)?;

                lp.set_objective_coefficient(violation, self.parameters.violation_cost / nb_sides);
                constrained += 1;
            }
        }
        debug!(sides = constrained, "Loop-flow constraints built");
        Ok(())
    }

    fn update_between_sensi_iteration(
        &mut self,
        lp: &mut LinearProblem,
        flows: &dyn FlowResult,
        _sensitivities: &dyn SensitivityResult,
        _activation: &dyn RangeActionActivationResult,
    ) -> RaoResult<()> {
        if !self.parameters.ptdf_approximation.should_update_ptdf_with_topological_change() {
            return Ok(());
        }
        for cnec in self.perimeter.loop_flow_cnecs() {
            for (side, bound) in self.bounded_sides(cnec)? {
                self.write_bounds(lp, cnec, side, bound, flows)?;
            }
        }
        Ok(())
    }
}
