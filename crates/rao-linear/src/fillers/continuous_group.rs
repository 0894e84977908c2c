//! Alignment of grouped range actions on a shared setpoint.

use super::ProblemFiller;
use crate::inputs::{FlowResult, RangeActionActivationResult, SensitivityResult};
use crate::linear_problem::{ConstraintKey, LinearProblem, VariableKey, VariableKind};
use crate::parameters::PstModel;
use crate::perimeter::OptimizationPerimeter;
use rao_core::RaoResult;
use tracing::debug;

/// Forces every member of a group to the group setpoint `G[g,s]`.
///
/// PSTs are skipped under [`PstModel::ApproximatedIntegers`]; their alignment
/// is done on taps by [`DiscretePstGroupFiller`](super::DiscretePstGroupFiller).
pub struct ContinuousRangeActionGroupFiller<'a> {
    perimeter: &'a OptimizationPerimeter,
    pst_model: PstModel,
}

impl<'a> ContinuousRangeActionGroupFiller<'a> {
    pub fn new(perimeter: &'a OptimizationPerimeter, pst_model: PstModel) -> Self {
        Self { perimeter, pst_model }
    }
}

impl ProblemFiller for ContinuousRangeActionGroupFiller<'_> {
    fn name(&self) -> &'static str {
        "continuous range action group"
    }

    fn fill(
        &mut self,
        lp: &mut LinearProblem,
        _flows: &dyn FlowResult,
        _sensitivities: &dyn SensitivityResult,
        _activation: &dyn RangeActionActivationResult,
    ) -> RaoResult<()> {
        let mut aligned = 0;
        for (state, ra) in self.perimeter.range_actions_per_state() {
            let Some(group) = &ra.group_id else {
                continue;
            };
            if ra.is_pst() && self.pst_model == PstModel::ApproximatedIntegers {
                continue;
            }
            let group_setpoint = lp.get_or_add_variable(
                VariableKey::RangeActionGroupSetpoint {
                    group: group.clone(),
                    state: state.clone(),
                },
                f64::NEG_INFINITY,
                f64::INFINITY,
                VariableKind::Continuous,
            )?;
            let setpoint = lp.get_variable(&VariableKey::setpoint(&ra.id, state))?;
            let constraint = lp.add_constraint(
                ConstraintKey::RangeActionGroupSetpoint {
                    ra: ra.id.clone(),
                    group: group.clone(),
                    state: state.clone(),
                },
                0.0,
                0.0,
            )?;
            lp.set_coefficient(constraint, setpoint, 1.0);
            lp.set_coefficient(constraint, group_setpoint, -1.0);
            aligned += 1;
        }
        debug!(aligned, "Grouped range actions aligned");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fillers::test_utils::*;
    use crate::fillers::CoreProblemFiller;
    use crate::parameters::RangeActionsOptimizationParameters;
    use rao_core::{GroupId, RangeActionId, RaoError};

    fn grouped_perimeter() -> OptimizationPerimeter {
        OptimizationPerimeter::new(preventive())
            .with_flow_cnec(cnec("cnec1", preventive()))
            .with_range_action(preventive(), pst("pst1").with_group("g1"))
            .with_range_action(preventive(), pst("pst2").with_group("g1"))
    }

    #[test]
    fn test_group_members_share_one_variable() {
        let perimeter = grouped_perimeter();
        let pre = initial_setpoints(&perimeter);
        let (flows, sensi) = simple_inputs(500.0, -50.0);
        let mut lp = LinearProblem::default();
        CoreProblemFiller::new(&perimeter, &pre, RangeActionsOptimizationParameters::default())
            .fill(&mut lp, &flows, &sensi, &pre)
            .expect("core");
        let before = lp.variable_count();
        ContinuousRangeActionGroupFiller::new(&perimeter, PstModel::Continuous)
            .fill(&mut lp, &flows, &sensi, &pre)
            .expect("group");
        assert_eq!(lp.variable_count(), before + 1);

        let group = lp
            .get_variable(&VariableKey::RangeActionGroupSetpoint {
                group: GroupId::new("g1"),
                state: preventive(),
            })
            .expect("group setpoint");
        for id in ["pst1", "pst2"] {
            let ra = RangeActionId::new(id);
            let constraint = lp
                .get_constraint(&ConstraintKey::RangeActionGroupSetpoint {
                    ra: ra.clone(),
                    group: GroupId::new("g1"),
                    state: preventive(),
                })
                .expect("group constraint");
            let setpoint = lp.get_variable(&VariableKey::setpoint(&ra, &preventive())).expect("setpoint");
            assert_eq!(lp.coefficient(constraint, setpoint), 1.0);
            assert_eq!(lp.coefficient(constraint, group), -1.0);
        }
    }

    #[test]
    fn test_discrete_model_skips_psts() {
        let perimeter = grouped_perimeter();
        let pre = initial_setpoints(&perimeter);
        let (flows, sensi) = simple_inputs(500.0, -50.0);
        let mut lp = LinearProblem::default();
        CoreProblemFiller::new(&perimeter, &pre, RangeActionsOptimizationParameters::default())
            .fill(&mut lp, &flows, &sensi, &pre)
            .expect("core");
        let before = lp.constraint_count();
        ContinuousRangeActionGroupFiller::new(&perimeter, PstModel::ApproximatedIntegers)
            .fill(&mut lp, &flows, &sensi, &pre)
            .expect("group");
        assert_eq!(lp.constraint_count(), before);
    }

    #[test]
    fn test_without_core_is_undefined_handle() {
        let perimeter = grouped_perimeter();
        let pre = initial_setpoints(&perimeter);
        let (flows, sensi) = simple_inputs(500.0, -50.0);
        let mut lp = LinearProblem::default();
        let err = ContinuousRangeActionGroupFiller::new(&perimeter, PstModel::Continuous)
            .fill(&mut lp, &flows, &sensi, &pre)
            .unwrap_err();
        assert!(matches!(err, RaoError::UndefinedHandle(_)));
        assert!(err.is_contract_violation());
    }
}
