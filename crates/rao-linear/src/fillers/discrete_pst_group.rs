//! Alignment of grouped PSTs on a shared tap, for the integer tap model.

use super::ProblemFiller;
use crate::inputs::{FlowResult, RangeActionActivationResult, SensitivityResult};
use crate::linear_problem::{ConstraintKey, LinearProblem, VariableKey, VariableKind, VariationDirection};
use crate::perimeter::OptimizationPerimeter;
use rao_core::{GroupId, RangeAction, RaoResult, State};
use tracing::debug;

/// `tap = currentTap + up − down` equals the group tap `T[g,s]` for every member.
pub struct DiscretePstGroupFiller<'a> {
    perimeter: &'a OptimizationPerimeter,
}

impl<'a> DiscretePstGroupFiller<'a> {
    pub fn new(perimeter: &'a OptimizationPerimeter) -> Self {
        Self { perimeter }
    }

    fn grouped_psts(&self) -> impl Iterator<Item = (&'a State, &'a RangeAction, &'a GroupId)> + 'a {
        self.perimeter
            .range_actions_per_state()
            .filter(|(_, ra)| ra.is_pst())
            .filter_map(|(state, ra)| ra.group_id.as_ref().map(|group| (state, ra, group)))
    }
}

fn group_tap_key(ra: &RangeAction, group: &GroupId, state: &State) -> ConstraintKey {
    ConstraintKey::PstGroupTap {
        ra: ra.id.clone(),
        group: group.clone(),
        state: state.clone(),
    }
}

impl ProblemFiller for DiscretePstGroupFiller<'_> {
    fn name(&self) -> &'static str {
        "discrete PST group"
    }

    fn fill(
        &mut self,
        lp: &mut LinearProblem,
        _flows: &dyn FlowResult,
        _sensitivities: &dyn SensitivityResult,
        activation: &dyn RangeActionActivationResult,
    ) -> RaoResult<()> {
        let mut aligned = 0;
        for (state, ra, group) in self.grouped_psts() {
            let group_tap = lp.get_or_add_variable(
                VariableKey::PstGroupTap {
                    group: group.clone(),
                    state: state.clone(),
                },
                f64::NEG_INFINITY,
                f64::INFINITY,
                VariableKind::Continuous,
            )?;
            let up = lp.get_variable(&VariableKey::tap_variation(&ra.id, state, VariationDirection::Upward))?;
            let down = lp.get_variable(&VariableKey::tap_variation(&ra.id, state, VariationDirection::Downward))?;
            let current_tap = f64::from(activation.optimized_tap(ra, state)?);
            let constraint = lp.add_constraint(group_tap_key(ra, group, state), -current_tap, -current_tap)?;
            lp.set_coefficient(constraint, up, 1.0);
            lp.set_coefficient(constraint, down, -1.0);
            lp.set_coefficient(constraint, group_tap, -1.0);
            aligned += 1;
        }
        debug!(aligned, "Grouped PST taps aligned");
        Ok(())
    }

    fn update_between_mip_iteration(
        &mut self,
        lp: &mut LinearProblem,
        activation: &dyn RangeActionActivationResult,
    ) -> RaoResult<()> {
        for (state, ra, group) in self.grouped_psts() {
            let constraint = lp.get_constraint(&group_tap_key(ra, group, state))?;
            let tap = f64::from(activation.optimized_tap(ra, state)?);
            lp.set_constraint_bounds(constraint, -tap, -tap);
        }
        Ok(())
    }
}
