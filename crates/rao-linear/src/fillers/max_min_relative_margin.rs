//! Worst relative-margin objective.
//!
//! Negative margins are compared in absolute terms through `MM ≤ 0`; positive
//! margins are divided by the zonal PTDF sum of each CNEC through `MRM`. The
//! sign binary `b` selects which of the two is active:
//!
//! ```text
//! MRM − maxPos·b ≤ 0
//! −MM + maxNeg·b ≤ maxNeg
//! MRM·conv·ptdf − F + maxPos·b ≤ −minFlow + maxPos
//! MRM·conv·ptdf + F + maxPos·b ≤  maxFlow + maxPos
//! ```

use super::max_min_margin::build_minimum_margin;
use super::ProblemFiller;
use crate::inputs::{FlowResult, RangeActionActivationResult, SensitivityResult};
use crate::linear_problem::{ConstraintKey, LinearProblem, MarginExtension, VariableKey, VariableKind};
use crate::parameters::RelativeMarginParameters;
use crate::perimeter::OptimizationPerimeter;
use rao_core::{FlowCnec, RaoResult, Side, Unit};
use tracing::debug;

/// Ratio between the negative and positive big-Ms of the sign binary.
const NEGATIVE_MARGIN_FACTOR: f64 = 5.0;

pub struct MaxMinRelativeMarginFiller<'a> {
    perimeter: &'a OptimizationPerimeter,
    unit: Unit,
    parameters: RelativeMarginParameters,
}

impl<'a> MaxMinRelativeMarginFiller<'a> {
    pub fn new(perimeter: &'a OptimizationPerimeter, unit: Unit, parameters: RelativeMarginParameters) -> Self {
        Self {
            perimeter,
            unit,
            parameters,
        }
    }

    fn max_positive_relative_margin(&self) -> f64 {
        self.perimeter.largest_cnec_threshold(self.unit) / self.parameters.ptdf_sum_lower_bound
    }

    /// PTDF sum of a side, floored; the floor replaces missing values.
    fn ptdf(&self, flows: &dyn FlowResult, cnec: &FlowCnec, side: Side) -> RaoResult<f64> {
        let floor = self.parameters.ptdf_sum_lower_bound;
        let sum = flows.ptdf_zonal_sum(&cnec.id, side)?;
        Ok(if sum.is_nan() { floor } else { sum.max(floor) })
    }

    fn build_relative_margin_constraints(&self, lp: &mut LinearProblem, flows: &dyn FlowResult) -> RaoResult<()> {
        let max_positive = self.max_positive_relative_margin();
        let relative_margin = lp.get_variable(&VariableKey::MinimumRelativeMargin)?;
        let sign = lp.get_variable(&VariableKey::MinimumRelativeMarginSignBinary)?;

        for cnec in self.perimeter.optimized_flow_cnecs() {
            let conversion = cnec.flow_unit_multiplier(self.unit, Unit::Megawatt)?;
            for side in cnec.monitored_sides() {
                let flow = lp.get_variable(&VariableKey::flow(&cnec.id, side))?;
                let coefficient = conversion * self.ptdf(flows, cnec, side)?;
                let bounds = [
                    (
                        MarginExtension::BelowThreshold,
                        cnec.lower_bound(side, Unit::Megawatt).map(|min| -min),
                        -1.0,
                    ),
                    (
                        MarginExtension::AboveThreshold,
                        cnec.upper_bound(side, Unit::Megawatt),
                        1.0,
                    ),
                ];
                for (margin, bound, flow_coefficient) in bounds {
                    let Some(bound) = bound else {
                        continue;
                    };
                    let constraint = lp.add_constraint(
                        ConstraintKey::minimum_relative_margin(&cnec.id, side, margin),
                        f64::NEG_INFINITY,
                        bound + max_positive,
                    )?;
                    lp.set_coefficient(constraint, relative_margin, coefficient);
                    lp.set_coefficient(constraint, flow, flow_coefficient);
                    lp.set_coefficient(constraint, sign, max_positive);
                }
            }
        }
        Ok(())
    }

    fn update_ptdf_coefficients(&self, lp: &mut LinearProblem, flows: &dyn FlowResult) -> RaoResult<()> {
        let relative_margin = lp.get_variable(&VariableKey::MinimumRelativeMargin)?;
        for cnec in self.perimeter.optimized_flow_cnecs() {
            let conversion = cnec.flow_unit_multiplier(self.unit, Unit::Megawatt)?;
            for side in cnec.monitored_sides() {
                let coefficient = conversion * self.ptdf(flows, cnec, side)?;
                for margin in MarginExtension::ALL {
                    let key = ConstraintKey::minimum_relative_margin(&cnec.id, side, margin);
                    if lp.has_constraint(&key) {
                        let constraint = lp.get_constraint(&key)?;
                        lp.set_coefficient(constraint, relative_margin, coefficient);
                    }
                }
            }
        }
        Ok(())
    }
}

impl ProblemFiller for MaxMinRelativeMarginFiller<'_> {
    fn name(&self) -> &'static str {
        "max min relative margin"
    }

    fn fill(
        &mut self,
        lp: &mut LinearProblem,
        flows: &dyn FlowResult,
        _sensitivities: &dyn SensitivityResult,
        _activation: &dyn RangeActionActivationResult,
    ) -> RaoResult<()> {
        build_minimum_margin(lp, self.perimeter, self.unit, 0.0)?;
        let minimum_margin = lp.get_variable(&VariableKey::MinimumMargin)?;

        let relative_margin = lp.add_variable(
            VariableKey::MinimumRelativeMargin,
            f64::NEG_INFINITY,
            f64::INFINITY,
            VariableKind::Continuous,
        )?;
        let sign = lp.add_variable(
            VariableKey::MinimumRelativeMarginSignBinary,
            0.0,
            1.0,
            VariableKind::Binary,
        )?;

        let max_positive = self.max_positive_relative_margin();
        let max_negative = NEGATIVE_MARGIN_FACTOR * max_positive;

        let set_to_zero = lp.add_constraint(ConstraintKey::MinimumRelMarginSetToZero, f64::NEG_INFINITY, 0.0)?;
        lp.set_coefficient(set_to_zero, relative_margin, 1.0);
        lp.set_coefficient(set_to_zero, sign, -max_positive);

        let sign_definition = lp.add_constraint(
            ConstraintKey::MinimumRelativeMarginSignDefinition,
            f64::NEG_INFINITY,
            max_negative,
        )?;
        lp.set_coefficient(sign_definition, minimum_margin, -1.0);
        lp.set_coefficient(sign_definition, sign, max_negative);

        self.build_relative_margin_constraints(lp, flows)?;
        lp.set_objective_coefficient(relative_margin, -1.0);
        debug!(max_positive, max_negative, "Relative margin constraints built");
        Ok(())
    }

    fn update_between_sensi_iteration(
        &mut self,
        lp: &mut LinearProblem,
        flows: &dyn FlowResult,
        _sensitivities: &dyn SensitivityResult,
        _activation: &dyn RangeActionActivationResult,
    ) -> RaoResult<()> {
        if self.parameters.ptdf_approximation.should_update_ptdf_with_pst_change() {
            self.update_ptdf_coefficients(lp, flows)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fillers::test_utils::*;
    use crate::fillers::CoreProblemFiller;
    use crate::inputs::{FlowResults, SensitivityResults};
    use crate::linear_problem::LinearProblemStatus;
    use crate::parameters::{PtdfApproximation, RangeActionsOptimizationParameters};
    use rao_core::CnecId;

    fn filled(
        perimeter: &OptimizationPerimeter,
        flow: f64,
        parameters: RelativeMarginParameters,
    ) -> (LinearProblem, MaxMinRelativeMarginFiller<'_>) {
        let pre = initial_setpoints(perimeter);
        let (flows, sensi) = simple_inputs(flow, -50.0);
        let mut lp = LinearProblem::default();
        CoreProblemFiller::new(perimeter, &pre, RangeActionsOptimizationParameters::default())
            .fill(&mut lp, &flows, &sensi, &pre)
            .expect("core");
        let mut filler = MaxMinRelativeMarginFiller::new(perimeter, Unit::Megawatt, parameters);
        filler.fill(&mut lp, &flows, &sensi, &pre).expect("relative margin");
        (lp, filler)
    }

    #[test]
    fn test_relative_margin_structure() {
        let perimeter = simple_perimeter();
        let (lp, _) = filled(&perimeter, 500.0, RelativeMarginParameters::default());
        let mm = lp.get_variable(&VariableKey::MinimumMargin).expect("mm");
        let mrm = lp.get_variable(&VariableKey::MinimumRelativeMargin).expect("mrm");
        let sign = lp.get_variable(&VariableKey::MinimumRelativeMarginSignBinary).expect("sign");
        assert_eq!(lp.variable_ub(mm), 0.0);
        assert_eq!(lp.objective_coefficient(mrm), -1.0);

        // 1000 MW / 0.01
        let max_positive = 100_000.0;
        let zero = lp.get_constraint(&ConstraintKey::MinimumRelMarginSetToZero).expect("set to zero");
        assert_eq!(lp.coefficient(zero, sign), -max_positive);
        let definition = lp
            .get_constraint(&ConstraintKey::MinimumRelativeMarginSignDefinition)
            .expect("sign definition");
        assert_eq!(lp.constraint_ub(definition), 5.0 * max_positive);
        assert_eq!(lp.coefficient(definition, mm), -1.0);

        let above = lp
            .get_constraint(&ConstraintKey::minimum_relative_margin(
                &CnecId::new("cnec1"),
                Side::One,
                MarginExtension::AboveThreshold,
            ))
            .expect("above");
        assert_eq!(lp.coefficient(above, mrm), 0.5);
        assert_eq!(lp.constraint_ub(above), 1000.0 + max_positive);
    }

    #[test]
    fn test_negative_margin_forces_relative_margin_to_zero() {
        // 2000 MW cannot be brought under 1000 MW with 5° at -50 MW/°
        let perimeter = simple_perimeter();
        let (mut lp, _) = filled(&perimeter, 2000.0, RelativeMarginParameters::default());
        assert_eq!(lp.solve().expect("solve"), LinearProblemStatus::Optimal);
        let mm = lp.value_of(&VariableKey::MinimumMargin).expect("mm");
        let mrm = lp.value_of(&VariableKey::MinimumRelativeMargin).expect("mrm");
        assert!((mm + 750.0).abs() < 1e-4, "mm {}", mm);
        assert!(mrm.abs() < 1e-4, "mrm {}", mrm);
    }

    #[test]
    fn test_positive_margin_is_divided_by_ptdf() {
        let perimeter = simple_perimeter();
        let (mut lp, _) = filled(&perimeter, 500.0, RelativeMarginParameters::default());
        assert_eq!(lp.solve().expect("solve"), LinearProblemStatus::Optimal);
        let mrm = lp.value_of(&VariableKey::MinimumRelativeMargin).expect("mrm");
        // S = 5 brings the flow to 250 MW: margin 750 MW, relative 750 / 0.5
        assert!((mrm - 1500.0).abs() < 1e-3, "mrm {}", mrm);
    }

    #[test]
    fn test_ptdf_refreshed_only_when_configured() {
        let updated = FlowResults::new()
            .with_flow("cnec1", Side::One, 500.0)
            .with_ptdf_zonal_sum("cnec1", Side::One, 0.25);
        let sensi = SensitivityResults::new();
        let cnec = CnecId::new("cnec1");
        let key = ConstraintKey::minimum_relative_margin(&cnec, Side::One, MarginExtension::BelowThreshold);

        let perimeter = simple_perimeter();
        let pre = initial_setpoints(&perimeter);
        let (mut lp, mut filler) = filled(&perimeter, 500.0, RelativeMarginParameters::default());
        filler
            .update_between_sensi_iteration(&mut lp, &updated, &sensi, &pre)
            .expect("update");
        let mrm = lp.get_variable(&VariableKey::MinimumRelativeMargin).expect("mrm");
        let constraint = lp.get_constraint(&key).expect("below");
        assert_eq!(lp.coefficient(constraint, mrm), 0.5);

        let parameters = RelativeMarginParameters {
            ptdf_approximation: PtdfApproximation::UpdatePtdfWithTopoAndPst,
            ..Default::default()
        };
        let (mut lp, mut filler) = filled(&perimeter, 500.0, parameters);
        filler
            .update_between_sensi_iteration(&mut lp, &updated, &sensi, &pre)
            .expect("update");
        let mrm = lp.get_variable(&VariableKey::MinimumRelativeMargin).expect("mrm");
        let constraint = lp.get_constraint(&key).expect("below");
        assert_eq!(lp.coefficient(constraint, mrm), 0.25);
    }
}
