//! CNECs released from the worst-margin objective.
//!
//! Each released side gets a binary `b`. With `b = 0` the side only has to
//! satisfy a rule-specific condition and its margin constraints are relaxed by
//! `2H`; with `b = 1` it competes in the worst margin like any other CNEC.
//!
//! Two rules exist:
//!
//! - [`UnoptimizedCnecRule::MarginDecrease`]: CNECs of some operators may not
//!   lose margin compared to the pre-perimeter situation.
//! - [`UnoptimizedCnecRule::PstLimitation`]: CNECs in series with a PST are
//!   fine as long as moving that PST to an extreme tap would secure them.

use super::ProblemFiller;
use crate::inputs::{FlowResult, RangeActionActivationResult, RangeActionSetpoints, SensitivityResult};
use crate::linear_problem::{ConstraintKey, LinearProblem, MarginExtension, VariableId, VariableKey, VariableKind};
use crate::parameters::UnoptimizedCnecParameters;
use crate::perimeter::OptimizationPerimeter;
use rao_core::{CnecId, FlowCnec, OperatorId, RangeAction, RangeActionId, RaoError, RaoResult, Side, State, Unit};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Factor applied to the largest threshold in the rule constraints.
const RULE_BIG_M_FACTOR: f64 = 20.0;

/// Factor applied to the largest threshold when relaxing margin constraints.
const MARGIN_BIG_M_FACTOR: f64 = 2.0;

#[derive(Debug, Clone, PartialEq)]
pub enum UnoptimizedCnecRule {
    MarginDecrease { operators: BTreeSet<OperatorId> },
    PstLimitation { cnecs: BTreeMap<CnecId, RangeActionId> },
}

impl UnoptimizedCnecRule {
    /// Rule configured by `parameters`, `None` when neither is set.
    pub fn from_parameters(parameters: &UnoptimizedCnecParameters) -> RaoResult<Option<Self>> {
        match (
            parameters.operators_not_to_optimize.is_empty(),
            parameters.cnecs_secured_by_pst.is_empty(),
        ) {
            (true, true) => Ok(None),
            (false, true) => Ok(Some(UnoptimizedCnecRule::MarginDecrease {
                operators: parameters.operators_not_to_optimize.clone(),
            })),
            (true, false) => Ok(Some(UnoptimizedCnecRule::PstLimitation {
                cnecs: parameters.cnecs_secured_by_pst.clone(),
            })),
            (false, false) => Err(RaoError::Config(
                "operators_not_to_optimize and cnecs_secured_by_pst cannot be used together".into(),
            )),
        }
    }
}

pub struct UnoptimizedCnecFiller<'a> {
    perimeter: &'a OptimizationPerimeter,
    rule: UnoptimizedCnecRule,
    pre_perimeter_flows: &'a dyn FlowResult,
    pre_perimeter: &'a RangeActionSetpoints,
    highest_threshold: f64,
    /// PST sensitivities below this are written as 0
    sensitivity_threshold: f64,
}

impl<'a> UnoptimizedCnecFiller<'a> {
    pub fn new(
        perimeter: &'a OptimizationPerimeter,
        rule: UnoptimizedCnecRule,
        pre_perimeter_flows: &'a dyn FlowResult,
        pre_perimeter: &'a RangeActionSetpoints,
        sensitivity_threshold: f64,
    ) -> Self {
        Self {
            perimeter,
            rule,
            pre_perimeter_flows,
            pre_perimeter,
            highest_threshold: perimeter.largest_cnec_threshold(Unit::Megawatt),
            sensitivity_threshold,
        }
    }

    fn released_by_operator(&self, operators: &BTreeSet<OperatorId>) -> Vec<&'a FlowCnec> {
        self.perimeter
            .optimized_flow_cnecs()
            .filter(|cnec| cnec.operator.as_ref().is_some_and(|op| operators.contains(op)))
            .collect()
    }

    /// Released CNECs with the PST and state securing them.
    fn released_by_pst(
        &self,
        cnecs: &BTreeMap<CnecId, RangeActionId>,
    ) -> RaoResult<Vec<(&'a FlowCnec, &'a RangeAction, &'a State)>> {
        let mut released = Vec::new();
        for (cnec_id, pst_id) in cnecs {
            let Some(cnec) = self.perimeter.optimized_flow_cnecs().find(|c| &c.id == cnec_id) else {
                continue;
            };
            let Some((pst, state)) = self.last_available_pst(cnec, pst_id) else {
                warn!(cnec = %cnec_id, pst = %pst_id, "PST not available before CNEC, CNEC stays optimised");
                continue;
            };
            if !pst.is_pst() {
                return Err(RaoError::UnsupportedRangeAction(format!(
                    "{} secures CNEC {} but is not a PST",
                    pst.id, cnec_id
                )));
            }
            released.push((cnec, pst, state));
        }
        Ok(released)
    }

    fn last_available_pst(&self, cnec: &FlowCnec, pst_id: &RangeActionId) -> Option<(&'a RangeAction, &'a State)> {
        let perimeter = self.perimeter;
        let mut states: Vec<&State> = perimeter.states().filter(|s| s.applies_to(&cnec.state)).collect();
        states.sort_by(|a, b| b.instant.order.cmp(&a.instant.order));
        states.into_iter().find_map(|state| {
            perimeter
                .range_actions(state)
                .iter()
                .find(|ra| &ra.id == pst_id)
                .map(|ra| (ra, state))
        })
    }

    fn add_binary(&self, lp: &mut LinearProblem, cnec: &FlowCnec, side: Side) -> RaoResult<VariableId> {
        lp.add_variable(
            VariableKey::OptimizeCnecBinary {
                cnec: cnec.id.clone(),
                side,
            },
            0.0,
            1.0,
            VariableKind::Binary,
        )
    }

    /// Relax the worst-margin constraints of a side by `2H` when `b = 0`.
    fn relax_margin_constraints(
        &self,
        lp: &mut LinearProblem,
        cnec: &FlowCnec,
        side: Side,
        binary: VariableId,
    ) -> RaoResult<()> {
        let big_m = MARGIN_BIG_M_FACTOR * self.highest_threshold;
        for margin in MarginExtension::ALL {
            for key in [
                ConstraintKey::minimum_margin(&cnec.id, side, margin),
                ConstraintKey::minimum_relative_margin(&cnec.id, side, margin),
            ] {
                if lp.has_constraint(&key) {
                    let constraint = lp.get_constraint(&key)?;
                    lp.set_coefficient(constraint, binary, big_m);
                    let ub = lp.constraint_ub(constraint);
                    lp.set_constraint_ub(constraint, ub + big_m);
                }
            }
        }
        Ok(())
    }

    fn build_margin_decrease(&self, lp: &mut LinearProblem, operators: &BTreeSet<OperatorId>) -> RaoResult<usize> {
        let big_m = RULE_BIG_M_FACTOR * self.highest_threshold;
        let mut released = 0;
        for cnec in self.released_by_operator(operators) {
            for side in cnec.monitored_sides() {
                let binary = self.add_binary(lp, cnec, side)?;
                let flow = lp.get_variable(&VariableKey::flow(&cnec.id, side))?;
                let pre_margin = self.pre_perimeter_flows.margin(cnec, side, Unit::Megawatt)?;
                if let Some(min_flow) = cnec.lower_bound(side, Unit::Megawatt) {
                    let constraint = lp.add_constraint(
                        dont_optimize_key(cnec, side, MarginExtension::BelowThreshold),
                        pre_margin + min_flow,
                        f64::INFINITY,
                    )?;
                    lp.set_coefficient(constraint, flow, 1.0);
                    lp.set_coefficient(constraint, binary, big_m);
                }
                if let Some(max_flow) = cnec.upper_bound(side, Unit::Megawatt) {
                    let constraint = lp.add_constraint(
                        dont_optimize_key(cnec, side, MarginExtension::AboveThreshold),
                        pre_margin - max_flow,
                        f64::INFINITY,
                    )?;
                    lp.set_coefficient(constraint, flow, -1.0);
                    lp.set_coefficient(constraint, binary, big_m);
                }
                self.relax_margin_constraints(lp, cnec, side, binary)?;
                released += 1;
            }
        }
        Ok(released)
    }

    fn build_pst_limitation(
        &self,
        lp: &mut LinearProblem,
        cnecs: &BTreeMap<CnecId, RangeActionId>,
        sensitivities: &dyn SensitivityResult,
    ) -> RaoResult<usize> {
        let big_m = RULE_BIG_M_FACTOR * self.highest_threshold;
        let mut released = 0;
        for (cnec, pst, state) in self.released_by_pst(cnecs)? {
            for side in cnec.monitored_sides() {
                let binary = self.add_binary(lp, cnec, side)?;
                let flow = lp.get_variable(&VariableKey::flow(&cnec.id, side))?;
                if cnec.lower_bound(side, Unit::Megawatt).is_some() {
                    let constraint = lp.add_constraint(
                        dont_optimize_key(cnec, side, MarginExtension::BelowThreshold),
                        f64::NEG_INFINITY,
                        f64::INFINITY,
                    )?;
                    lp.set_coefficient(constraint, flow, 1.0);
                    lp.set_coefficient(constraint, binary, big_m);
                }
                if cnec.upper_bound(side, Unit::Megawatt).is_some() {
                    let constraint = lp.add_constraint(
                        dont_optimize_key(cnec, side, MarginExtension::AboveThreshold),
                        f64::NEG_INFINITY,
                        f64::INFINITY,
                    )?;
                    lp.set_coefficient(constraint, flow, -1.0);
                    lp.set_coefficient(constraint, binary, big_m);
                }
                self.write_pst_limitation(lp, cnec, side, pst, state, sensitivities)?;
                self.relax_margin_constraints(lp, cnec, side, binary)?;
                released += 1;
            }
        }
        Ok(released)
    }

    /// Sensitivity-dependent part of the PST limitation constraints.
    fn write_pst_limitation(
        &self,
        lp: &mut LinearProblem,
        cnec: &FlowCnec,
        side: Side,
        pst: &RangeAction,
        state: &State,
        sensitivities: &dyn SensitivityResult,
    ) -> RaoResult<()> {
        let setpoint = lp.get_variable(&VariableKey::setpoint(&pst.id, state))?;
        let mut sensitivity = sensitivities.sensitivity(&cnec.id, side, &pst.id);
        if sensitivity.abs() < self.sensitivity_threshold {
            sensitivity = 0.0;
        }
        let pre = self.pre_perimeter.setpoint(pst)?;
        let min_setpoint = pst.min_admissible_setpoint(pre);
        let max_setpoint = pst.max_admissible_setpoint(pre);
        let (towards_lower, towards_upper) = if sensitivity >= 0.0 {
            (max_setpoint, min_setpoint)
        } else {
            (min_setpoint, max_setpoint)
        };

        if let Some(min_flow) = cnec.lower_bound(side, Unit::Megawatt) {
            let constraint = lp.get_constraint(&dont_optimize_key(cnec, side, MarginExtension::BelowThreshold))?;
            lp.set_coefficient(constraint, setpoint, -sensitivity);
            lp.set_constraint_bounds(constraint, min_flow - towards_lower * sensitivity, f64::INFINITY);
        }
        if let Some(max_flow) = cnec.upper_bound(side, Unit::Megawatt) {
            let constraint = lp.get_constraint(&dont_optimize_key(cnec, side, MarginExtension::AboveThreshold))?;
            lp.set_coefficient(constraint, setpoint, sensitivity);
            lp.set_constraint_bounds(constraint, -max_flow + towards_upper * sensitivity, f64::INFINITY);
        }
        Ok(())
    }
}

fn dont_optimize_key(cnec: &FlowCnec, side: Side, margin: MarginExtension) -> ConstraintKey {
    ConstraintKey::DontOptimizeCnec {
        cnec: cnec.id.clone(),
        side,
        margin,
    }
}

impl ProblemFiller for UnoptimizedCnecFiller<'_> {
    fn name(&self) -> &'static str {
        "unoptimized CNEC"
    }

    fn fill(
        &mut self,
        lp: &mut LinearProblem,
        _flows: &dyn FlowResult,
        sensitivities: &dyn SensitivityResult,
        _activation: &dyn RangeActionActivationResult,
    ) -> RaoResult<()> {
        let released = match &self.rule {
            UnoptimizedCnecRule::MarginDecrease { operators } => self.build_margin_decrease(lp, operators)?,
            UnoptimizedCnecRule::PstLimitation { cnecs } => self.build_pst_limitation(lp, cnecs, sensitivities)?,
        };
        debug!(sides = released, "Unoptimized CNEC constraints built");
        Ok(())
    }

    fn update_between_sensi_iteration(
        &mut self,
        lp: &mut LinearProblem,
        _flows: &dyn FlowResult,
        sensitivities: &dyn SensitivityResult,
        _activation: &dyn RangeActionActivationResult,
    ) -> RaoResult<()> {
        if let UnoptimizedCnecRule::PstLimitation { cnecs } = &self.rule {
            for (cnec, pst, state) in self.released_by_pst(cnecs)? {
                for side in cnec.monitored_sides() {
                    self.write_pst_limitation(lp, cnec, side, pst, state, sensitivities)?;
                }
            }
        }
        Ok(())
    }
}
