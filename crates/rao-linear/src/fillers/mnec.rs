//! Monitored-only elements (MNECs).
//!
//! An MNEC may lose at most `acceptable_margin_decrease` MW of margin compared
//! to the initial situation, or stay within its thresholds if it was already
//! inside them. Violations are paid in the objective.

use super::ProblemFiller;
use crate::inputs::{FlowResult, RangeActionActivationResult, SensitivityResult};
use crate::linear_problem::{ConstraintKey, LinearProblem, MarginExtension, VariableKey, VariableKind};
use crate::parameters::MnecParameters;
use crate::perimeter::OptimizationPerimeter;
use rao_core::{FlowCnec, RaoResult, Side, Unit};
use tracing::debug;

pub struct MnecFiller<'a> {
    perimeter: &'a OptimizationPerimeter,
    initial_flows: &'a dyn FlowResult,
    unit: Unit,
    parameters: MnecParameters,
}

impl<'a> MnecFiller<'a> {
    /// `initial_flows` are the flows of the network before any remedial action.
    pub fn new(
        perimeter: &'a OptimizationPerimeter,
        initial_flows: &'a dyn FlowResult,
        unit: Unit,
        parameters: MnecParameters,
    ) -> Self {
        Self {
            perimeter,
            initial_flows,
            unit,
            parameters,
        }
    }

    fn build_side(&self, lp: &mut LinearProblem, cnec: &FlowCnec, side: Side, nb_sides: f64) -> RaoResult<()> {
        let initial_flow = self.initial_flows.flow(&cnec.id, side)?;
        let flow = lp.get_variable(&VariableKey::flow(&cnec.id, side))?;
        let violation = lp.add_variable(
            VariableKey::MnecViolation {
                cnec: cnec.id.clone(),
                side,
            },
            0.0,
            f64::INFINITY,
            VariableKind::Continuous,
        )?;
        let decrease = self.parameters.acceptable_margin_decrease;
        let adjustment = self.parameters.constraint_adjustment_coefficient;

        if let Some(max_flow) = cnec.upper_bound(side, Unit::Megawatt) {
            let bound = max_flow.max(initial_flow + decrease) - adjustment;
            let constraint = lp.add_constraint(
                ConstraintKey::MnecFlow {
                    cnec: cnec.id.clone(),
                    side,
                    margin: MarginExtension::AboveThreshold,
                },
                f64::NEG_INFINITY,
                bound,
            )?;
            lp.set_coefficient(constraint, flow, 1.0);
            lp.set_coefficient(constraint, violation, -1.0);
        }
        if let Some(min_flow) = cnec.lower_bound(side, Unit::Megawatt) {
            let bound = min_flow.min(initial_flow - decrease) + adjustment;
            let constraint = lp.add_constraint(
                ConstraintKey::MnecFlow {
                    cnec: cnec.id.clone(),
                    side,
                    margin: MarginExtension::BelowThreshold,
                },
                bound,
                f64::INFINITY,
            )?;
            lp.set_coefficient(constraint, flow, 1.0);
            lp.set_coefficient(constraint, violation, 1.0);
        }

        let cost = self.parameters.violation_cost * cnec.flow_unit_multiplier(Unit::Megawatt, self.unit)? / nb_sides;
        lp.set_objective_coefficient(violation, cost);
        Ok(())
    }
}

impl ProblemFiller for MnecFiller<'_> {
    fn name(&self) -> &'static str {
        "MNEC"
    }

    fn fill(
        &mut self,
        lp: &mut LinearProblem,
        _flows: &dyn FlowResult,
        _sensitivities: &dyn SensitivityResult,
        _activation: &dyn RangeActionActivationResult,
    ) -> RaoResult<()> {
        let mut mnecs = 0;
        for cnec in self.perimeter.monitored_flow_cnecs() {
            let sides = cnec.monitored_sides();
            let nb_sides = sides.len() as f64;
            for side in sides {
                self.build_side(lp, cnec, side, nb_sides)?;
            }
            mnecs += 1;
        }
        debug!(mnecs, "MNEC constraints built");
        Ok(())
    }
}
