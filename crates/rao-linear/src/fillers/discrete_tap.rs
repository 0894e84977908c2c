//! Integer tap model of PSTs.
//!
//! The angle setpoint `S` of a PST is tied to integer tap variations around
//! the current tap `t`:
//!
//! ```text
//! S = angle(t) + up·slopeUp − down·slopeDown
//! ```
//!
//! At build time the slopes are secants from `t` to the admissible extremes.
//! After each MIP solve they pivot to the secants towards `t ± 1`, which makes
//! the linearisation exact for one tap step around the new solution.

use super::ProblemFiller;
use crate::inputs::{FlowResult, RangeActionActivationResult, RangeActionSetpoints, SensitivityResult};
use crate::linear_problem::{ConstraintKey, LinearProblem, VariableKey, VariableKind, VariationDirection};
use crate::perimeter::OptimizationPerimeter;
use rao_core::{RangeAction, RaoResult, State};
use tracing::debug;

pub struct DiscretePstTapFiller<'a> {
    perimeter: &'a OptimizationPerimeter,
    pre_perimeter: &'a RangeActionSetpoints,
}

impl<'a> DiscretePstTapFiller<'a> {
    pub fn new(perimeter: &'a OptimizationPerimeter, pre_perimeter: &'a RangeActionSetpoints) -> Self {
        Self {
            perimeter,
            pre_perimeter,
        }
    }

    fn psts(&self) -> impl Iterator<Item = (&'a State, &'a RangeAction)> + 'a {
        self.perimeter.range_actions_per_state().filter(|(_, ra)| ra.is_pst())
    }

    /// Admissible tap window of a PST in a state.
    ///
    /// The whole tap domain when an earlier state optimises the same device:
    /// the core filler then bounds the angle and the relative tap constraint
    /// bounds the move.
    fn tap_window(&self, ra: &RangeAction, state: &State) -> RaoResult<(i32, i32)> {
        let table = ra.tap_to_angle()?;
        let domain = (table.min_tap(), table.max_tap());
        if self
            .perimeter
            .last_available_range_action_on_same_device(ra, state)
            .is_some()
        {
            return Ok(domain);
        }
        let pre = self.pre_perimeter.setpoint(ra)?;
        Ok(ra.admissible_taps(pre).unwrap_or(domain))
    }

    fn build_pst(
        &self,
        lp: &mut LinearProblem,
        ra: &RangeAction,
        state: &State,
        activation: &dyn RangeActionActivationResult,
    ) -> RaoResult<()> {
        let table = ra.tap_to_angle()?;
        let (min_tap, max_tap) = self.tap_window(ra, state)?;
        let current_tap = activation.optimized_tap(ra, state)?;
        let max_down = (current_tap - min_tap).max(0);
        let max_up = (max_tap - current_tap).max(0);
        let total = f64::from(max_down + max_up);

        let setpoint = lp.get_variable(&VariableKey::setpoint(&ra.id, state))?;
        let mut variations = Vec::with_capacity(2);
        for direction in VariationDirection::ALL {
            let variation = lp.add_variable(
                VariableKey::tap_variation(&ra.id, state, direction),
                0.0,
                total,
                VariableKind::Integer,
            )?;
            let binary = lp.add_variable(
                VariableKey::tap_variation_binary(&ra.id, state, direction),
                0.0,
                1.0,
                VariableKind::Binary,
            )?;
            variations.push((direction, variation, binary));
        }

        let current_angle = table.angle_or_err(current_tap)?;
        let conversion = lp.add_constraint(
            ConstraintKey::TapToAngleConversion {
                ra: ra.id.clone(),
                state: state.clone(),
            },
            current_angle,
            current_angle,
        )?;
        lp.set_coefficient(conversion, setpoint, 1.0);

        let up_or_down = lp.add_constraint(
            ConstraintKey::UpOrDownPstVariation {
                ra: ra.id.clone(),
                state: state.clone(),
            },
            f64::NEG_INFINITY,
            1.0,
        )?;

        for (direction, variation, binary) in variations {
            let coefficient = match direction {
                VariationDirection::Downward if max_down > 0 => {
                    (current_angle - table.angle_or_err(min_tap)?) / f64::from(max_down)
                }
                VariationDirection::Upward if max_up > 0 => {
                    -(table.angle_or_err(max_tap)? - current_angle) / f64::from(max_up)
                }
                _ => 0.0,
            };
            lp.set_coefficient(conversion, variation, coefficient);
            lp.set_coefficient(up_or_down, binary, 1.0);

            let is_variation = lp.add_constraint(
                ConstraintKey::IsVariationInDirection {
                    ra: ra.id.clone(),
                    state: state.clone(),
                    direction,
                },
                f64::NEG_INFINITY,
                0.0,
            )?;
            let big_m = match direction {
                VariationDirection::Upward => max_up,
                VariationDirection::Downward => max_down,
            };
            lp.set_coefficient(is_variation, variation, 1.0);
            lp.set_coefficient(is_variation, binary, -f64::from(big_m));
        }

        self.build_relative_tap_constraint(lp, ra, state, current_tap, activation)
    }

    /// `tap(s) − tap(s')` within the relative-to-previous tap range.
    fn build_relative_tap_constraint(
        &self,
        lp: &mut LinearProblem,
        ra: &RangeAction,
        state: &State,
        current_tap: i32,
        activation: &dyn RangeActionActivationResult,
    ) -> RaoResult<()> {
        let Some((previous_ra, previous_state)) = self.perimeter.last_available_range_action_on_same_device(ra, state)
        else {
            return Ok(());
        };
        let Some((min_relative, max_relative)) = relative_taps(ra) else {
            return Ok(());
        };
        let previous_tap = activation.optimized_tap(previous_ra, previous_state)?;
        let offset = f64::from(previous_tap - current_tap);
        let constraint = lp.add_constraint(
            ConstraintKey::PstRelativeTap {
                ra: ra.id.clone(),
                state: state.clone(),
            },
            f64::from(min_relative) + offset,
            f64::from(max_relative) + offset,
        )?;
        for (ra_id, s, sign) in [(&ra.id, state, 1.0), (&previous_ra.id, previous_state, -1.0)] {
            let up = lp.get_variable(&VariableKey::tap_variation(ra_id, s, VariationDirection::Upward))?;
            let down = lp.get_variable(&VariableKey::tap_variation(ra_id, s, VariationDirection::Downward))?;
            lp.set_coefficient(constraint, up, sign);
            lp.set_coefficient(constraint, down, -sign);
        }
        Ok(())
    }

    fn update_pst(
        &self,
        lp: &mut LinearProblem,
        ra: &RangeAction,
        state: &State,
        activation: &dyn RangeActionActivationResult,
    ) -> RaoResult<()> {
        let table = ra.tap_to_angle()?;
        let (min_tap, max_tap) = self.tap_window(ra, state)?;
        let tap = activation.optimized_tap(ra, state)?;
        let angle = table.angle_or_err(tap)?;

        let conversion = lp.get_constraint(&ConstraintKey::TapToAngleConversion {
            ra: ra.id.clone(),
            state: state.clone(),
        })?;
        lp.set_constraint_bounds(conversion, angle, angle);

        let up = lp.get_variable(&VariableKey::tap_variation(&ra.id, state, VariationDirection::Upward))?;
        let down = lp.get_variable(&VariableKey::tap_variation(&ra.id, state, VariationDirection::Downward))?;
        let up_coefficient = table.angle(tap + 1).map_or(0.0, |next| -(next - angle));
        let down_coefficient = table.angle(tap - 1).map_or(0.0, |previous| angle - previous);
        lp.set_coefficient(conversion, up, up_coefficient);
        lp.set_coefficient(conversion, down, down_coefficient);

        for (direction, big_m) in [
            (VariationDirection::Upward, (max_tap - tap).max(0)),
            (VariationDirection::Downward, (tap - min_tap).max(0)),
        ] {
            let constraint = lp.get_constraint(&ConstraintKey::IsVariationInDirection {
                ra: ra.id.clone(),
                state: state.clone(),
                direction,
            })?;
            let binary = lp.get_variable(&VariableKey::tap_variation_binary(&ra.id, state, direction))?;
            lp.set_coefficient(constraint, binary, -f64::from(big_m));
        }

        let relative_key = ConstraintKey::PstRelativeTap {
            ra: ra.id.clone(),
            state: state.clone(),
        };
        if lp.has_constraint(&relative_key) {
            if let (Some((previous_ra, previous_state)), Some((min_relative, max_relative))) = (
                self.perimeter.last_available_range_action_on_same_device(ra, state),
                relative_taps(ra),
            ) {
                let offset = f64::from(activation.optimized_tap(previous_ra, previous_state)? - tap);
                let constraint = lp.get_constraint(&relative_key)?;
                lp.set_constraint_bounds(
                    constraint,
                    f64::from(min_relative) + offset,
                    f64::from(max_relative) + offset,
                );
            }
        }
        Ok(())
    }
}

/// Relative-to-previous tap window, widened to always allow staying put.
fn relative_taps(ra: &RangeAction) -> Option<(i32, i32)> {
    ra.relative_tap_bounds().map(|(min, max)| (min.min(0), max.max(0)))
}

impl ProblemFiller for DiscretePstTapFiller<'_> {
    fn name(&self) -> &'static str {
        "discrete PST tap"
    }

    fn fill(
        &mut self,
        lp: &mut LinearProblem,
        _flows: &dyn FlowResult,
        _sensitivities: &dyn SensitivityResult,
        activation: &dyn RangeActionActivationResult,
    ) -> RaoResult<()> {
        let mut count = 0;
        for (state, ra) in self.psts() {
            self.build_pst(lp, ra, state, activation)?;
            count += 1;
        }
        debug!(psts = count, "Discrete tap model built");
        Ok(())
    }

    fn update_between_mip_iteration(
        &mut self,
        lp: &mut LinearProblem,
        activation: &dyn RangeActionActivationResult,
    ) -> RaoResult<()> {
        for (state, ra) in self.psts() {
            self.update_pst(lp, ra, state, activation)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fillers::test_utils::*;
    use crate::fillers::CoreProblemFiller;
    use crate::inputs::RangeActionActivation;
    use crate::parameters::{PstModel, RangeActionsOptimizationParameters};
    use rao_core::{RangeActionId, RangeType, TapRange};

    fn discrete_parameters() -> RangeActionsOptimizationParameters {
        RangeActionsOptimizationParameters {
            pst_model: PstModel::ApproximatedIntegers,
            ..Default::default()
        }
    }

    fn keys(direction: VariationDirection) -> (VariableKey, VariableKey, ConstraintKey) {
        let ra = RangeActionId::new("pst1");
        (
            VariableKey::tap_variation(&ra, &preventive(), direction),
            VariableKey::tap_variation_binary(&ra, &preventive(), direction),
            ConstraintKey::IsVariationInDirection {
                ra,
                state: preventive(),
                direction,
            },
        )
    }

    fn conversion_key() -> ConstraintKey {
        ConstraintKey::TapToAngleConversion {
            ra: RangeActionId::new("pst1"),
            state: preventive(),
        }
    }

    fn filled(perimeter: &OptimizationPerimeter, pre: &RangeActionSetpoints) -> LinearProblem {
        let (flows, sensi) = simple_inputs(500.0, -50.0);
        let mut lp = LinearProblem::default();
        CoreProblemFiller::new(perimeter, pre, discrete_parameters())
            .fill(&mut lp, &flows, &sensi, pre)
            .expect("core");
        DiscretePstTapFiller::new(perimeter, pre)
            .fill(&mut lp, &flows, &sensi, pre)
            .expect("discrete");
        lp
    }

    #[test]
    fn test_build_secant_slopes() {
        let perimeter = simple_perimeter();
        let pre = initial_setpoints(&perimeter);
        let lp = filled(&perimeter, &pre);

        let conversion = lp.get_constraint(&conversion_key()).expect("conversion");
        assert_eq!(lp.constraint_lb(conversion), 0.0);
        assert_eq!(lp.constraint_ub(conversion), 0.0);

        let (up, up_bin, up_constraint) = keys(VariationDirection::Upward);
        let (down, _, down_constraint) = keys(VariationDirection::Downward);
        let up = lp.get_variable(&up).expect("up");
        let down = lp.get_variable(&down).expect("down");
        let up_bin = lp.get_variable(&up_bin).expect("up binary");
        // window [-10, 10] around tap 0, 0.5° per tap
        assert!((lp.coefficient(conversion, down) - 0.5).abs() < 1e-12);
        assert!((lp.coefficient(conversion, up) + 0.5).abs() < 1e-12);
        assert_eq!(lp.variable_ub(up), 20.0);
        assert_eq!(lp.variable_kind(up), VariableKind::Integer);

        let up_constraint = lp.get_constraint(&up_constraint).expect("is up");
        assert_eq!(lp.coefficient(up_constraint, up_bin), -10.0);
        assert!(lp.has_constraint(&down_constraint));
    }

    #[test]
    fn test_mip_update_pivots_around_new_tap() {
        let perimeter = simple_perimeter();
        let pre = initial_setpoints(&perimeter);
        let mut lp = filled(&perimeter, &pre);
        let mut filler = DiscretePstTapFiller::new(&perimeter, &pre);

        let activation = RangeActionActivation::new(pre.clone()).with_setpoint("pst1", &preventive(), 1.5);
        filler
            .update_between_mip_iteration(&mut lp, &activation)
            .expect("update");

        let conversion = lp.get_constraint(&conversion_key()).expect("conversion");
        assert_eq!(lp.constraint_lb(conversion), 1.5);
        let (up, up_bin, up_constraint) = keys(VariationDirection::Upward);
        let (down, down_bin, down_constraint) = keys(VariationDirection::Downward);
        let up = lp.get_variable(&up).expect("up");
        let down = lp.get_variable(&down).expect("down");
        assert!((lp.coefficient(conversion, up) + 0.5).abs() < 1e-12);
        assert!((lp.coefficient(conversion, down) - 0.5).abs() < 1e-12);

        let up_constraint = lp.get_constraint(&up_constraint).expect("is up");
        let down_constraint = lp.get_constraint(&down_constraint).expect("is down");
        let up_bin = lp.get_variable(&up_bin).expect("up binary");
        let down_bin = lp.get_variable(&down_bin).expect("down binary");
        assert_eq!(lp.coefficient(up_constraint, up_bin), -7.0);
        assert_eq!(lp.coefficient(down_constraint, down_bin), -13.0);
    }

    #[test]
    fn test_mip_update_at_table_edge_drops_direction() {
        let perimeter = simple_perimeter();
        let pre = initial_setpoints(&perimeter);
        let mut lp = filled(&perimeter, &pre);
        let mut filler = DiscretePstTapFiller::new(&perimeter, &pre);

        let activation = RangeActionActivation::new(pre.clone()).with_setpoint("pst1", &preventive(), 8.0);
        filler
            .update_between_mip_iteration(&mut lp, &activation)
            .expect("update");

        let conversion = lp.get_constraint(&conversion_key()).expect("conversion");
        let up = lp.get_variable(&keys(VariationDirection::Upward).0).expect("up");
        assert_eq!(lp.coefficient(conversion, up), 0.0);
        let up_constraint = lp.get_constraint(&keys(VariationDirection::Upward).2).expect("is up");
        let up_bin = lp.get_variable(&keys(VariationDirection::Upward).1).expect("up binary");
        assert_eq!(lp.coefficient(up_constraint, up_bin), 0.0);
    }

    #[test]
    fn test_relative_tap_constraint_with_twin() {
        let curative_pst = pst("pst1-cur")
            .with_network_elements(["pst1-twt"])
            .with_tap_range(TapRange::new(RangeType::RelativeToPreviousInstant, -3, 3));
        let perimeter = OptimizationPerimeter::new(preventive())
            .with_flow_cnec(cnec("cnec1", preventive()))
            .with_range_action(preventive(), pst("pst1"))
            .with_range_action(curative(), curative_pst);
        let pre = initial_setpoints(&perimeter);
        let mut lp = filled(&perimeter, &pre);

        let key = ConstraintKey::PstRelativeTap {
            ra: RangeActionId::new("pst1-cur"),
            state: curative(),
        };
        let constraint = lp.get_constraint(&key).expect("relative tap");
        assert_eq!(lp.constraint_lb(constraint), -3.0);
        assert_eq!(lp.constraint_ub(constraint), 3.0);
        let previous_up = lp
            .get_variable(&VariableKey::tap_variation(
                &RangeActionId::new("pst1"),
                &preventive(),
                VariationDirection::Upward,
            ))
            .expect("preventive up");
        assert_eq!(lp.coefficient(constraint, previous_up), -1.0);

        // window covers the whole table: taps -16..=16
        let cur_up = lp
            .get_variable(&VariableKey::tap_variation(
                &RangeActionId::new("pst1-cur"),
                &curative(),
                VariationDirection::Upward,
            ))
            .expect("curative up");
        assert_eq!(lp.variable_ub(cur_up), 32.0);

        let activation = RangeActionActivation::new(pre.clone())
            .with_setpoint("pst1", &preventive(), 1.0)
            .with_setpoint("pst1-cur", &curative(), 2.0);
        DiscretePstTapFiller::new(&perimeter, &pre)
            .update_between_mip_iteration(&mut lp, &activation)
            .expect("update");
        // previous tap 2, current tap 4
        assert_eq!(lp.constraint_lb(constraint), -5.0);
        assert_eq!(lp.constraint_ub(constraint), 1.0);
    }

    #[test]
    fn test_relative_tap_window_always_contains_previous_tap() {
        let curative_pst = pst("pst1-cur")
            .with_network_elements(["pst1-twt"])
            .with_tap_range(TapRange::new(RangeType::RelativeToPreviousInstant, 2, 4));
        let perimeter = OptimizationPerimeter::new(preventive())
            .with_flow_cnec(cnec("cnec1", preventive()))
            .with_range_action(preventive(), pst("pst1"))
            .with_range_action(curative(), curative_pst);
        let pre = initial_setpoints(&perimeter);
        let lp = filled(&perimeter, &pre);

        let constraint = lp
            .get_constraint(&ConstraintKey::PstRelativeTap {
                ra: RangeActionId::new("pst1-cur"),
                state: curative(),
            })
            .expect("relative tap");
        assert_eq!(lp.constraint_lb(constraint), 0.0);
        assert_eq!(lp.constraint_ub(constraint), 4.0);
    }
}
