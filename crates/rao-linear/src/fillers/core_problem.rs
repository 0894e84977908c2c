//! Core filler: flow variables, range action setpoints and the flow
//! linearisation.
//!
//! # Variables
//!
//! - `F[c,side]` free, per monitored side of every CNEC (MW)
//! - `S[r,s]` free, the setpoint of range action `r` in state `s`
//!   (degrees for PSTs, MW otherwise)
//! - `AV[r,s] ≥ 0`, the absolute variation of `S[r,s]`
//!
//! # Flow linearisation
//!
//! ```text
//! F[c] = ref[c] + Σ sens[c,r] · (S[r,s] − current[r,s])
//! ```
//!
//! written as `F − Σ sens·S ∈ [ref − Σ sens·current, ref − Σ sens·current]`.
//! A range action contributes through the latest state, not later than the
//! CNEC state, in which its device is optimised.
//!
//! # Setpoint ranges
//!
//! Without an earlier optimised twin, `S` is bounded by the admissible range
//! around the pre-perimeter setpoint and `AV ≥ |S − pre|`. With one, `S − S'`
//! is bounded by the relative-to-previous-instant range and `AV ≥ |S − S'|`.
//!
//! # Injection balance
//!
//! Injection range actions of a state move as a whole without changing the
//! net injection of the grid:
//!
//! ```text
//! Σ (S[r,s] − ref[r,s]) = 0
//! ```
//!
//! where `ref` is the pre-perimeter setpoint, or `S'` for a twin.

use super::ProblemFiller;
use crate::inputs::{FlowResult, RangeActionActivationResult, RangeActionSetpoints, SensitivityResult};
use crate::linear_problem::{
    AbsExtension, ConstraintId, ConstraintKey, LinearProblem, RaRangeShrinking, VariableKey, VariableKind,
};
use crate::parameters::RangeActionsOptimizationParameters;
use crate::perimeter::OptimizationPerimeter;
use rao_core::{FlowCnec, RangeAction, RangeActionVariant, RaoResult, Side, State};
use tracing::debug;

/// Slack added on both sides of setpoint bounds
pub const RANGE_ACTION_SETPOINT_EPSILON: f64 = 1e-5;

/// Factor applied to setpoint ranges at each shrinking iteration
pub const RANGE_SHRINK_RATE: f64 = 0.667;

pub struct CoreProblemFiller<'a> {
    perimeter: &'a OptimizationPerimeter,
    pre_perimeter: &'a RangeActionSetpoints,
    parameters: RangeActionsOptimizationParameters,
    iteration: i32,
}

impl<'a> CoreProblemFiller<'a> {
    pub fn new(
        perimeter: &'a OptimizationPerimeter,
        pre_perimeter: &'a RangeActionSetpoints,
        parameters: RangeActionsOptimizationParameters,
    ) -> Self {
        Self {
            perimeter,
            pre_perimeter,
            parameters,
            iteration: 0,
        }
    }

    fn build_flow_variables(&self, lp: &mut LinearProblem) -> RaoResult<()> {
        for cnec in self.perimeter.flow_cnecs() {
            for side in cnec.monitored_sides() {
                lp.add_variable(
                    VariableKey::flow(&cnec.id, side),
                    f64::NEG_INFINITY,
                    f64::INFINITY,
                    VariableKind::Continuous,
                )?;
            }
        }
        Ok(())
    }

    fn build_range_action_variables(&self, lp: &mut LinearProblem) -> RaoResult<()> {
        for (state, ra) in self.perimeter.range_actions_per_state() {
            lp.add_variable(
                VariableKey::setpoint(&ra.id, state),
                f64::NEG_INFINITY,
                f64::INFINITY,
                VariableKind::Continuous,
            )?;
            lp.add_variable(
                VariableKey::absolute_variation(&ra.id, state),
                0.0,
                f64::INFINITY,
                VariableKind::Continuous,
            )?;
        }
        Ok(())
    }

    fn build_flow_constraints(
        &self,
        lp: &mut LinearProblem,
        flows: &dyn FlowResult,
        sensitivities: &dyn SensitivityResult,
        activation: &dyn RangeActionActivationResult,
    ) -> RaoResult<()> {
        for cnec in self.perimeter.flow_cnecs() {
            for side in cnec.monitored_sides() {
                let constraint = lp.add_constraint(ConstraintKey::flow(&cnec.id, side), 0.0, 0.0)?;
                let flow = lp.get_variable(&VariableKey::flow(&cnec.id, side))?;
                lp.set_coefficient(constraint, flow, 1.0);
                self.write_flow_linearisation(lp, constraint, cnec, side, flows, sensitivities, activation)?;
            }
        }
        Ok(())
    }

    /// Set bounds and setpoint coefficients of a flow constraint from scratch.
    #[allow(clippy::too_many_arguments)]
    fn write_flow_linearisation(
        &self,
        lp: &mut LinearProblem,
        constraint: ConstraintId,
        cnec: &FlowCnec,
        side: Side,
        flows: &dyn FlowResult,
        sensitivities: &dyn SensitivityResult,
        activation: &dyn RangeActionActivationResult,
    ) -> RaoResult<()> {
        let mut bound = flows.flow(&cnec.id, side)?;
        for (state, ra) in self.impacting_range_actions(cnec) {
            let setpoint = lp.get_variable(&VariableKey::setpoint(&ra.id, state))?;
            let sensitivity = sensitivities.sensitivity(&cnec.id, side, &ra.id);
            if sensitivity.abs() >= self.parameters.sensitivity_threshold(ra.variant()) {
                bound -= sensitivity * activation.optimized_setpoint(ra, state)?;
                lp.set_coefficient(constraint, setpoint, -sensitivity);
            } else {
                lp.set_coefficient(constraint, setpoint, 0.0);
            }
        }
        lp.set_constraint_bounds(constraint, bound, bound);
        Ok(())
    }

    /// Range actions acting on `cnec`, each device through its latest state.
    fn impacting_range_actions(&self, cnec: &FlowCnec) -> Vec<(&'a State, &'a RangeAction)> {
        let perimeter = self.perimeter;
        let mut states: Vec<&State> = perimeter.states().filter(|s| s.applies_to(&cnec.state)).collect();
        states.sort_by(|a, b| b.instant.order.cmp(&a.instant.order));

        let mut impacting: Vec<(&State, &RangeAction)> = Vec::new();
        for state in states {
            for ra in perimeter.range_actions(state) {
                if !impacting.iter().any(|(_, seen)| seen.acts_on_same_device(ra)) {
                    impacting.push((state, ra));
                }
            }
        }
        impacting
    }

    fn build_range_action_constraints(&self, lp: &mut LinearProblem) -> RaoResult<()> {
        for (state, ra) in self.perimeter.range_actions_per_state() {
            let setpoint = lp.get_variable(&VariableKey::setpoint(&ra.id, state))?;
            let variation = lp.get_variable(&VariableKey::absolute_variation(&ra.id, state))?;
            let negative = lp.add_constraint(
                ConstraintKey::AbsoluteRangeActionVariation {
                    ra: ra.id.clone(),
                    state: state.clone(),
                    sign: AbsExtension::Negative,
                },
                0.0,
                f64::INFINITY,
            )?;
            let positive = lp.add_constraint(
                ConstraintKey::AbsoluteRangeActionVariation {
                    ra: ra.id.clone(),
                    state: state.clone(),
                    sign: AbsExtension::Positive,
                },
                0.0,
                f64::INFINITY,
            )?;
            // AV - S >= -ref and AV + S >= ref
            lp.set_coefficient(negative, variation, 1.0);
            lp.set_coefficient(negative, setpoint, -1.0);
            lp.set_coefficient(positive, variation, 1.0);
            lp.set_coefficient(positive, setpoint, 1.0);

            match self.perimeter.last_available_range_action_on_same_device(ra, state) {
                None => {
                    let pre = self.pre_perimeter.setpoint(ra)?;
                    lp.set_variable_bounds(
                        setpoint,
                        ra.min_admissible_setpoint(pre) - RANGE_ACTION_SETPOINT_EPSILON,
                        ra.max_admissible_setpoint(pre) + RANGE_ACTION_SETPOINT_EPSILON,
                    );
                    lp.set_constraint_lb(negative, -pre);
                    lp.set_constraint_lb(positive, pre);
                }
                Some((previous_ra, previous_state)) => {
                    let previous = lp.get_variable(&VariableKey::setpoint(&previous_ra.id, previous_state))?;
                    let bounds = ra.setpoint_bounds();
                    if !(ra.is_pst() && self.parameters.is_discrete_pst()) {
                        let relative = lp.add_constraint(
                            ConstraintKey::RangeActionRelativeSetpoint {
                                ra: ra.id.clone(),
                                state: state.clone(),
                                shrinking: RaRangeShrinking::Disabled,
                            },
                            bounds.min_relative,
                            bounds.max_relative,
                        )?;
                        lp.set_coefficient(relative, setpoint, 1.0);
                        lp.set_coefficient(relative, previous, -1.0);
                    }
                    lp.set_variable_bounds(
                        setpoint,
                        bounds.min_absolute - RANGE_ACTION_SETPOINT_EPSILON,
                        bounds.max_absolute + RANGE_ACTION_SETPOINT_EPSILON,
                    );
                    lp.set_coefficient(negative, previous, 1.0);
                    lp.set_coefficient(positive, previous, -1.0);
                }
            }
        }
        Ok(())
    }

    fn build_injection_balance_constraints(&self, lp: &mut LinearProblem) -> RaoResult<()> {
        for state in self.perimeter.states() {
            let injections: Vec<&RangeAction> = self
                .perimeter
                .range_actions(state)
                .iter()
                .filter(|ra| ra.variant() == RangeActionVariant::Injection)
                .collect();
            if injections.is_empty() {
                continue;
            }
            let mut balance = 0.0;
            let mut terms = Vec::with_capacity(injections.len());
            for ra in injections {
                terms.push((lp.get_variable(&VariableKey::setpoint(&ra.id, state))?, 1.0));
                match self.perimeter.last_available_range_action_on_same_device(ra, state) {
                    None => balance += self.pre_perimeter.setpoint(ra)?,
                    Some((previous_ra, previous_state)) => {
                        terms.push((lp.get_variable(&VariableKey::setpoint(&previous_ra.id, previous_state))?, -1.0));
                    }
                }
            }
            let constraint = lp.add_constraint(
                ConstraintKey::InjectionBalance { state: state.clone() },
                balance,
                balance,
            )?;
            for (variable, coefficient) in terms {
                lp.set_coefficient(constraint, variable, coefficient);
            }
        }
        Ok(())
    }

    fn fill_objective(&self, lp: &mut LinearProblem) -> RaoResult<()> {
        for (state, ra) in self.perimeter.range_actions_per_state() {
            let variation = lp.get_variable(&VariableKey::absolute_variation(&ra.id, state))?;
            lp.set_objective_coefficient(variation, self.parameters.penalty_cost(ra.variant()));
        }
        Ok(())
    }

    /// Narrow every setpoint around its previous value, from the second call on.
    fn check_and_activate_range_shrinking(
        &mut self,
        lp: &mut LinearProblem,
        activation: &dyn RangeActionActivationResult,
    ) -> RaoResult<()> {
        if !self.parameters.ra_range_shrinking {
            return Ok(());
        }
        if self.iteration > 0 {
            let rate = RANGE_SHRINK_RATE.powi(self.iteration);
            for (state, ra) in self.perimeter.range_actions_per_state() {
                let previous = activation.optimized_setpoint(ra, state)?;
                let bounds = ra.setpoint_bounds();
                let range = (bounds.max_absolute - bounds.min_absolute) * rate;
                let key = ConstraintKey::RangeActionRelativeSetpoint {
                    ra: ra.id.clone(),
                    state: state.clone(),
                    shrinking: RaRangeShrinking::Enabled,
                };
                if lp.has_constraint(&key) {
                    let constraint = lp.get_constraint(&key)?;
                    lp.set_constraint_bounds(constraint, previous - range, previous + range);
                } else {
                    let setpoint = lp.get_variable(&VariableKey::setpoint(&ra.id, state))?;
                    let constraint = lp.add_constraint(key, previous - range, previous + range)?;
                    lp.set_coefficient(constraint, setpoint, 1.0);
                }
            }
            debug!(iteration = self.iteration, rate, "Shrunk range action setpoint ranges");
        }
        self.iteration += 1;
        Ok(())
    }
}

impl ProblemFiller for CoreProblemFiller<'_> {
    fn name(&self) -> &'static str {
        "core"
    }

    fn fill(
        &mut self,
        lp: &mut LinearProblem,
        flows: &dyn FlowResult,
        sensitivities: &dyn SensitivityResult,
        activation: &dyn RangeActionActivationResult,
    ) -> RaoResult<()> {
        self.build_flow_variables(lp)?;
        self.build_range_action_variables(lp)?;
        self.build_flow_constraints(lp, flows, sensitivities, activation)?;
        self.build_range_action_constraints(lp)?;
        self.build_injection_balance_constraints(lp)?;
        self.check_and_activate_range_shrinking(lp, activation)?;
        self.fill_objective(lp)?;
        debug!(
            cnecs = self.perimeter.flow_cnecs().len(),
            variables = lp.variable_count(),
            constraints = lp.constraint_count(),
            "Core problem filled"
        );
        Ok(())
    }

    fn update_between_sensi_iteration(
        &mut self,
        lp: &mut LinearProblem,
        flows: &dyn FlowResult,
        sensitivities: &dyn SensitivityResult,
        activation: &dyn RangeActionActivationResult,
    ) -> RaoResult<()> {
        for cnec in self.perimeter.flow_cnecs() {
            for side in cnec.monitored_sides() {
                let constraint = lp.get_constraint(&ConstraintKey::flow(&cnec.id, side))?;
                self.write_flow_linearisation(lp, constraint, cnec, side, flows, sensitivities, activation)?;
            }
        }
        self.check_and_activate_range_shrinking(lp, activation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fillers::test_utils::*;
    use crate::inputs::{FlowResults, RangeActionActivation, SensitivityResults};
    use crate::linear_problem::LinearProblemStatus;
    use rao_core::{CnecId, RangeAction, RangeActionId, RangeType, StandardRange, TapRange};

    #[test]
    fn test_fill_flow_constraint() {
        let perimeter = simple_perimeter();
        let pre = initial_setpoints(&perimeter);
        let (flows, sensi) = simple_inputs(500.0, -50.0);
        let activation = RangeActionActivation::new(pre.clone()).with_setpoint("pst1", &preventive(), 2.0);

        let mut lp = LinearProblem::default();
        let mut filler = CoreProblemFiller::new(&perimeter, &pre, RangeActionsOptimizationParameters::default());
        filler.fill(&mut lp, &flows, &sensi, &activation).expect("fill");

        let cnec = CnecId::new("cnec1");
        let pst = RangeActionId::new("pst1");
        let constraint = lp.get_constraint(&ConstraintKey::flow(&cnec, Side::One)).expect("flow constraint");
        let flow = lp.get_variable(&VariableKey::flow(&cnec, Side::One)).expect("flow");
        let setpoint = lp.get_variable(&VariableKey::setpoint(&pst, &preventive())).expect("setpoint");

        // 500 - (-50 * 2) = 600
        assert_eq!(lp.constraint_lb(constraint), 600.0);
        assert_eq!(lp.constraint_ub(constraint), 600.0);
        assert_eq!(lp.coefficient(constraint, flow), 1.0);
        assert_eq!(lp.coefficient(constraint, setpoint), 50.0);

        // Absolute range [-10, 10] taps = [-5°, 5°]
        assert!((lp.variable_lb(setpoint) + 5.0 + RANGE_ACTION_SETPOINT_EPSILON).abs() < 1e-12);
        assert!((lp.variable_ub(setpoint) - 5.0 - RANGE_ACTION_SETPOINT_EPSILON).abs() < 1e-12);

        let variation = lp.get_variable(&VariableKey::absolute_variation(&pst, &preventive())).expect("av");
        assert_eq!(lp.objective_coefficient(variation), 0.01);
    }

    #[test]
    fn test_sensitivity_below_threshold_is_zero() {
        let perimeter = simple_perimeter();
        let pre = initial_setpoints(&perimeter);
        let (flows, sensi) = simple_inputs(500.0, -50.0);
        let parameters = RangeActionsOptimizationParameters {
            pst_sensitivity_threshold: 60.0,
            ..Default::default()
        };

        let mut lp = LinearProblem::default();
        let mut filler = CoreProblemFiller::new(&perimeter, &pre, parameters);
        filler.fill(&mut lp, &flows, &sensi, &pre).expect("fill");

        let cnec = CnecId::new("cnec1");
        let constraint = lp.get_constraint(&ConstraintKey::flow(&cnec, Side::One)).expect("flow constraint");
        let setpoint = lp
            .get_variable(&VariableKey::setpoint(&RangeActionId::new("pst1"), &preventive()))
            .expect("setpoint");
        assert_eq!(lp.coefficient(constraint, setpoint), 0.0);
        assert_eq!(lp.constraint_lb(constraint), 500.0);
    }

    #[test]
    fn test_update_between_sensi_iteration_refreshes_coefficients() {
        let perimeter = simple_perimeter();
        let pre = initial_setpoints(&perimeter);
        let (flows, sensi) = simple_inputs(500.0, -50.0);

        let mut lp = LinearProblem::default();
        let mut filler = CoreProblemFiller::new(&perimeter, &pre, RangeActionsOptimizationParameters::default());
        filler.fill(&mut lp, &flows, &sensi, &pre).expect("fill");

        let new_flows = FlowResults::new().with_flow("cnec1", Side::One, 300.0);
        let new_sensi = SensitivityResults::new().with_sensitivity("cnec1", Side::One, "pst1", -40.0);
        let activation = RangeActionActivation::new(pre.clone()).with_setpoint("pst1", &preventive(), 3.0);
        filler
            .update_between_sensi_iteration(&mut lp, &new_flows, &new_sensi, &activation)
            .expect("update");

        let cnec = CnecId::new("cnec1");
        let constraint = lp.get_constraint(&ConstraintKey::flow(&cnec, Side::One)).expect("flow constraint");
        let setpoint = lp
            .get_variable(&VariableKey::setpoint(&RangeActionId::new("pst1"), &preventive()))
            .expect("setpoint");
        assert_eq!(lp.constraint_lb(constraint), 420.0);
        assert_eq!(lp.coefficient(constraint, setpoint), 40.0);
    }

    #[test]
    fn test_flow_identity_with_fixed_setpoints() {
        let perimeter = simple_perimeter();
        let pre = initial_setpoints(&perimeter);
        let (flows, sensi) = simple_inputs(742.0, -50.0);

        let mut lp = LinearProblem::default();
        let mut filler = CoreProblemFiller::new(&perimeter, &pre, RangeActionsOptimizationParameters::default());
        filler.fill(&mut lp, &flows, &sensi, &pre).expect("fill");

        let setpoint = lp
            .get_variable(&VariableKey::setpoint(&RangeActionId::new("pst1"), &preventive()))
            .expect("setpoint");
        lp.set_variable_bounds(setpoint, 0.0, 0.0);
        assert_eq!(lp.solve().expect("solve"), LinearProblemStatus::Optimal);
        let flow = lp
            .value_of(&VariableKey::flow(&CnecId::new("cnec1"), Side::One))
            .expect("flow value");
        assert!((flow - 742.0).abs() < 1e-6);
    }

    #[test]
    fn test_curative_twin_uses_relative_constraint_and_latest_state() {
        let curative_pst = pst("pst1-cur")
            .with_network_elements(["pst1-twt"])
            .with_tap_range(TapRange::new(RangeType::RelativeToPreviousInstant, -2, 2));
        let perimeter = OptimizationPerimeter::new(preventive())
            .with_flow_cnec(cnec("cnec1", preventive()))
            .with_flow_cnec(cnec("cnec-cur", curative()))
            .with_range_action(preventive(), pst("pst1"))
            .with_range_action(curative(), curative_pst);
        let pre = initial_setpoints(&perimeter);
        let flows = FlowResults::new()
            .with_flow("cnec1", Side::One, 100.0)
            .with_flow("cnec-cur", Side::One, 200.0);
        let sensi = SensitivityResults::new()
            .with_sensitivity("cnec-cur", Side::One, "pst1", 10.0)
            .with_sensitivity("cnec-cur", Side::One, "pst1-cur", 20.0);

        let mut lp = LinearProblem::default();
        let mut filler = CoreProblemFiller::new(&perimeter, &pre, RangeActionsOptimizationParameters::default());
        filler.fill(&mut lp, &flows, &sensi, &pre).expect("fill");

        let constraint = lp
            .get_constraint(&ConstraintKey::flow(&CnecId::new("cnec-cur"), Side::One))
            .expect("flow constraint");
        let prev_setpoint = lp
            .get_variable(&VariableKey::setpoint(&RangeActionId::new("pst1"), &preventive()))
            .expect("preventive setpoint");
        let cur_setpoint = lp
            .get_variable(&VariableKey::setpoint(&RangeActionId::new("pst1-cur"), &curative()))
            .expect("curative setpoint");
        assert_eq!(lp.coefficient(constraint, cur_setpoint), -20.0);
        assert_eq!(lp.coefficient(constraint, prev_setpoint), 0.0);

        let relative = lp
            .get_constraint(&ConstraintKey::RangeActionRelativeSetpoint {
                ra: RangeActionId::new("pst1-cur"),
                state: curative(),
                shrinking: RaRangeShrinking::Disabled,
            })
            .expect("relative constraint");
        assert_eq!(lp.constraint_lb(relative), -1.0);
        assert_eq!(lp.constraint_ub(relative), 1.0);
        assert_eq!(lp.coefficient(relative, prev_setpoint), -1.0);
    }

    #[test]
    fn test_range_shrinking() {
        let perimeter = simple_perimeter();
        let pre = initial_setpoints(&perimeter);
        let (flows, sensi) = simple_inputs(500.0, -50.0);
        let parameters = RangeActionsOptimizationParameters {
            ra_range_shrinking: true,
            ..Default::default()
        };

        let mut lp = LinearProblem::default();
        let mut filler = CoreProblemFiller::new(&perimeter, &pre, parameters);
        filler.fill(&mut lp, &flows, &sensi, &pre).expect("fill");
        let key = ConstraintKey::RangeActionRelativeSetpoint {
            ra: RangeActionId::new("pst1"),
            state: preventive(),
            shrinking: RaRangeShrinking::Enabled,
        };
        assert!(!lp.has_constraint(&key));

        let activation = RangeActionActivation::new(pre.clone()).with_setpoint("pst1", &preventive(), 1.0);
        filler
            .update_between_sensi_iteration(&mut lp, &flows, &sensi, &activation)
            .expect("update");
        let constraint = lp.get_constraint(&key).expect("shrinking constraint");
        // absolute window [-5°, 5°]
        let range = 10.0 * RANGE_SHRINK_RATE;
        assert!((lp.constraint_lb(constraint) - (1.0 - range)).abs() < 1e-9);
        assert!((lp.constraint_ub(constraint) - (1.0 + range)).abs() < 1e-9);
    }

    fn injection(id: &str, initial_setpoint: f64) -> RangeAction {
        RangeAction::injection(id, initial_setpoint)
            .with_range(StandardRange::new(RangeType::Absolute, -500.0, 500.0))
            .with_operator("FR")
    }

    #[test]
    fn test_injections_keep_net_injection_balanced() {
        let perimeter = OptimizationPerimeter::new(preventive())
            .with_flow_cnec(cnec("cnec1", preventive()))
            .with_range_action(preventive(), pst("pst1"))
            .with_range_action(preventive(), injection("gen1", 100.0))
            .with_range_action(preventive(), injection("load1", -40.0));
        let pre = initial_setpoints(&perimeter);
        let (flows, sensi) = simple_inputs(500.0, -50.0);

        let mut lp = LinearProblem::default();
        CoreProblemFiller::new(&perimeter, &pre, RangeActionsOptimizationParameters::default())
            .fill(&mut lp, &flows, &sensi, &pre)
            .expect("fill");

        let balance = lp
            .get_constraint(&ConstraintKey::InjectionBalance { state: preventive() })
            .expect("balance");
        assert_eq!(lp.constraint_lb(balance), 60.0);
        assert_eq!(lp.constraint_ub(balance), 60.0);
        let setpoint = |id: &str| {
            lp.get_variable(&VariableKey::setpoint(&RangeActionId::new(id), &preventive()))
                .expect("setpoint")
        };
        let (generator, load, pst) = (setpoint("gen1"), setpoint("load1"), setpoint("pst1"));
        assert_eq!(lp.coefficient(balance, generator), 1.0);
        assert_eq!(lp.coefficient(balance, load), 1.0);
        assert_eq!(lp.coefficient(balance, pst), 0.0);

        // pushing the generator up forces the load down by as much
        lp.set_variable_bounds(generator, 250.0, 250.0);
        assert_eq!(lp.solve().expect("solve"), LinearProblemStatus::Optimal);
        let load_value = lp
            .value_of(&VariableKey::setpoint(&RangeActionId::new("load1"), &preventive()))
            .expect("load setpoint");
        assert!((load_value + 190.0).abs() < 1e-6, "load setpoint {}", load_value);
    }

    #[test]
    fn test_injection_twin_balances_against_previous_setpoint() {
        let perimeter = OptimizationPerimeter::new(preventive())
            .with_flow_cnec(cnec("cnec1", preventive()))
            .with_range_action(preventive(), injection("gen1", 0.0))
            .with_range_action(curative(), injection("gen1-cur", 0.0).with_network_elements(["gen1"]));
        let pre = initial_setpoints(&perimeter);
        let (flows, sensi) = simple_inputs(500.0, -50.0);

        let mut lp = LinearProblem::default();
        CoreProblemFiller::new(&perimeter, &pre, RangeActionsOptimizationParameters::default())
            .fill(&mut lp, &flows, &sensi, &pre)
            .expect("fill");

        let balance = lp
            .get_constraint(&ConstraintKey::InjectionBalance { state: curative() })
            .expect("curative balance");
        let previous = lp
            .get_variable(&VariableKey::setpoint(&RangeActionId::new("gen1"), &preventive()))
            .expect("preventive setpoint");
        let current = lp
            .get_variable(&VariableKey::setpoint(&RangeActionId::new("gen1-cur"), &curative()))
            .expect("curative setpoint");
        assert_eq!(lp.constraint_lb(balance), 0.0);
        assert_eq!(lp.coefficient(balance, current), 1.0);
        assert_eq!(lp.coefficient(balance, previous), -1.0);
    }
}
