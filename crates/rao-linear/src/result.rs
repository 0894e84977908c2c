//! Reading range action setpoints back from a solved problem.

use crate::inputs::{RangeActionActivation, RangeActionActivationResult, RangeActionSetpoints};
use crate::linear_problem::{LinearProblem, VariableKey};
use crate::perimeter::OptimizationPerimeter;
use rao_core::RaoResult;

/// Setpoints of every range action of the perimeter, as solved.
///
/// Fails with [`RaoError::NotSolved`](rao_core::RaoError::NotSolved) when the
/// problem holds no solution.
pub fn activation_from_solution(
    lp: &LinearProblem,
    perimeter: &OptimizationPerimeter,
    pre_perimeter: &RangeActionSetpoints,
) -> RaoResult<RangeActionActivation> {
    let mut activation = RangeActionActivation::new(pre_perimeter.clone());
    for (state, ra) in perimeter.range_actions_per_state() {
        let setpoint = lp.value_of(&VariableKey::setpoint(&ra.id, state))?;
        activation.set_setpoint(&ra.id, state, setpoint);
    }
    Ok(activation)
}

/// Copy of `activation` with every PST moved to the angle of its closest tap.
pub fn round_pst_setpoints(
    activation: &RangeActionActivation,
    perimeter: &OptimizationPerimeter,
) -> RaoResult<RangeActionActivation> {
    let mut rounded = activation.clone();
    for (state, ra) in perimeter.range_actions_per_state() {
        if !ra.is_pst() {
            continue;
        }
        let table = ra.tap_to_angle()?;
        let tap = activation.optimized_tap(ra, state)?;
        rounded.set_setpoint(&ra.id, state, table.angle_or_err(tap)?);
    }
    Ok(rounded)
}

/// Whether any setpoint of the perimeter differs by more than `tolerance`.
pub fn setpoints_differ(
    a: &dyn RangeActionActivationResult,
    b: &dyn RangeActionActivationResult,
    perimeter: &OptimizationPerimeter,
    tolerance: f64,
) -> RaoResult<bool> {
    for (state, ra) in perimeter.range_actions_per_state() {
        if (a.optimized_setpoint(ra, state)? - b.optimized_setpoint(ra, state)?).abs() > tolerance {
            return Ok(true);
        }
    }
    Ok(false)
}
