//! Caps on the number of range actions and operators used per state.
//!
//! A binary `used[r,s]` is set whenever the absolute variation `AV[r,s]` of
//! the core problem exceeds a small tolerance:
//!
//! ```text
//! AV − used·span ≤ ε
//! ```
//!
//! `AV` measures the move from the pre-perimeter setpoint, or from the
//! setpoint of the previous state when the device is also optimised there, so
//! a curative action that keeps the preventive setpoint is not counted.
//!
//! Counting constraints on these binaries then implement the limits of the
//! state's instant. `max_ra` and `max_tso` of a curative state also count the
//! earlier curative states of the same contingency.
//!
//! # Elementary actions
//!
//! With the integer PST model, `max_elementary_actions_per_tso` caps the
//! number of taps an operator moves, counted from the pre-perimeter taps:
//!
//! ```text
//! E[r,s] ≥ |t − t0 + up − down|
//! Σ E[r,s] ≤ max
//! ```

use super::ProblemFiller;
use crate::inputs::{FlowResult, RangeActionActivationResult, RangeActionSetpoints, SensitivityResult};
use crate::linear_problem::{
    AbsExtension, ConstraintKey, LinearProblem, VariableId, VariableKey, VariableKind, VariationDirection,
};
use crate::parameters::{RaUsageLimits, RangeActionsOptimizationParameters};
use crate::perimeter::OptimizationPerimeter;
use rao_core::{OperatorId, RangeAction, RaoError, RaoResult, State};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Tolerance of the variation binaries for continuous setpoints.
const RANGE_ACTION_SETPOINT_EPSILON: f64 = 1e-4;

/// Share of the average tap step tolerated without counting a PST as used.
const PST_TAP_STEP_TOLERANCE: f64 = 0.3;

pub struct RaUsageLimitsFiller<'a> {
    perimeter: &'a OptimizationPerimeter,
    pre_perimeter: &'a RangeActionSetpoints,
    limits: BTreeMap<String, RaUsageLimits>,
    range_actions: RangeActionsOptimizationParameters,
}

impl<'a> RaUsageLimitsFiller<'a> {
    /// `limits` is keyed by instant id.
    pub fn new(
        perimeter: &'a OptimizationPerimeter,
        pre_perimeter: &'a RangeActionSetpoints,
        limits: BTreeMap<String, RaUsageLimits>,
        range_actions: RangeActionsOptimizationParameters,
    ) -> Self {
        Self {
            perimeter,
            pre_perimeter,
            limits,
            range_actions,
        }
    }

    fn limits_of(&self, state: &State) -> Option<&RaUsageLimits> {
        self.limits
            .get(&state.instant.id)
            .filter(|limits| !limits.is_empty())
    }

    /// States whose usage counts towards the caps of `state`.
    ///
    /// Preventive states for a preventive state; for a curative state, the
    /// curative states of the same contingency up to its instant.
    fn counted_states(&self, state: &State) -> Vec<&'a State> {
        let perimeter = self.perimeter;
        if state.is_preventive() {
            perimeter.states().filter(|s| s.is_preventive()).collect()
        } else if state.instant.is_curative() {
            perimeter
                .states()
                .filter(|s| {
                    s.instant.is_curative()
                        && s.instant.order <= state.instant.order
                        && s.contingency == state.contingency
                })
                .collect()
        } else {
            perimeter.states().filter(|s| *s == state).collect()
        }
    }

    fn epsilon(&self, ra: &RangeAction) -> RaoResult<f64> {
        if ra.is_pst() && self.range_actions.is_discrete_pst() {
            Ok(PST_TAP_STEP_TOLERANCE * ra.tap_to_angle()?.average_absolute_step())
        } else {
            Ok(RANGE_ACTION_SETPOINT_EPSILON)
        }
    }

    /// Largest absolute variation `AV` can take in `state`.
    fn variation_span(&self, ra: &RangeAction, state: &State) -> RaoResult<f64> {
        let span = match self.perimeter.last_available_range_action_on_same_device(ra, state) {
            None => {
                let pre = self.pre_perimeter.setpoint(ra)?;
                let min = ra.min_admissible_setpoint(pre).min(pre);
                let max = ra.max_admissible_setpoint(pre).max(pre);
                max - min
            }
            Some(_) => {
                let bounds = ra.setpoint_bounds();
                let absolute = bounds.max_absolute - bounds.min_absolute;
                if ra.is_pst() && self.range_actions.is_discrete_pst() {
                    absolute
                } else {
                    absolute.min(bounds.max_relative.max(-bounds.min_relative))
                }
            }
        };
        if !span.is_finite() {
            return Err(RaoError::Validation(format!(
                "range action {} needs a finite range to be counted in usage limits",
                ra.id
            )));
        }
        Ok(span + RANGE_ACTION_SETPOINT_EPSILON)
    }

    fn build_variation_binary(&self, lp: &mut LinearProblem, ra: &RangeAction, state: &State) -> RaoResult<()> {
        let span = self.variation_span(ra, state)?;
        let epsilon = self.epsilon(ra)?;
        let variation = lp.get_variable(&VariableKey::absolute_variation(&ra.id, state))?;
        let binary = lp.add_variable(VariableKey::variation_binary(&ra.id, state), 0.0, 1.0, VariableKind::Binary)?;
        let constraint = lp.add_constraint(
            ConstraintKey::IsVariation {
                ra: ra.id.clone(),
                state: state.clone(),
            },
            f64::NEG_INFINITY,
            epsilon,
        )?;
        lp.set_coefficient(constraint, variation, 1.0);
        lp.set_coefficient(constraint, binary, -span);
        Ok(())
    }

    fn build_state(
        &self,
        lp: &mut LinearProblem,
        state: &State,
        limits: &RaUsageLimits,
        activation: &dyn RangeActionActivationResult,
    ) -> RaoResult<()> {
        let counted = self.counted_states(state);
        if let Some(max_ra) = limits.max_ra {
            self.build_max_ra(lp, state, &counted, max_ra)?;
        }
        if let Some(max_tso) = limits.max_tso {
            self.build_max_tso(lp, state, &counted, max_tso)?;
        }

        let range_actions = self.perimeter.range_actions(state);
        for (operator, cap) in &limits.max_ra_per_tso {
            let members: Vec<&RangeAction> = range_actions
                .iter()
                .filter(|ra| ra.operator.as_ref() == Some(operator))
                .collect();
            if *cap < members.len() {
                let key = ConstraintKey::MaxRaPerTso {
                    operator: operator.clone(),
                    state: state.clone(),
                };
                self.add_count_constraint(lp, key, &members, state, *cap)?;
            }
        }

        for (operator, cap) in &limits.max_pst_per_tso {
            let members: Vec<&RangeAction> = range_actions
                .iter()
                .filter(|ra| ra.is_pst() && ra.operator.as_ref() == Some(operator))
                .collect();
            if *cap < members.len() {
                let key = ConstraintKey::MaxPstPerTso {
                    operator: operator.clone(),
                    state: state.clone(),
                };
                self.add_count_constraint(lp, key, &members, state, *cap)?;
            }
        }

        if !limits.max_elementary_actions_per_tso.is_empty() {
            if self.range_actions.is_discrete_pst() {
                self.build_max_elementary_actions(lp, state, &limits.max_elementary_actions_per_tso, activation)?;
            } else {
                warn!(state = %state, "Elementary action limits need the integer PST model, ignored");
            }
        }
        Ok(())
    }

    fn build_max_ra(&self, lp: &mut LinearProblem, state: &State, counted: &[&State], max_ra: usize) -> RaoResult<()> {
        let count: usize = counted.iter().map(|s| self.perimeter.range_actions(s).len()).sum();
        if max_ra >= count {
            return Ok(());
        }
        let constraint = lp.add_constraint(
            ConstraintKey::MaxRa { state: state.clone() },
            f64::NEG_INFINITY,
            max_ra as f64,
        )?;
        for counted_state in counted {
            for ra in self.perimeter.range_actions(counted_state) {
                let binary = lp.get_variable(&VariableKey::variation_binary(&ra.id, counted_state))?;
                lp.set_coefficient(constraint, binary, 1.0);
            }
        }
        Ok(())
    }

    fn build_max_tso(
        &self,
        lp: &mut LinearProblem,
        state: &State,
        counted: &[&State],
        max_tso: usize,
    ) -> RaoResult<()> {
        let excluded: BTreeSet<&OperatorId> = counted
            .iter()
            .filter_map(|s| self.limits.get(&s.instant.id))
            .flat_map(|limits| limits.max_tso_exclusion.iter())
            .collect();
        let operators: BTreeSet<&OperatorId> = counted
            .iter()
            .flat_map(|s| self.perimeter.range_actions(s))
            .filter_map(|ra| ra.operator.as_ref())
            .filter(|op| !excluded.contains(*op))
            .collect();
        if max_tso >= operators.len() {
            return Ok(());
        }
        let max_tso_constraint = lp.add_constraint(
            ConstraintKey::MaxTso { state: state.clone() },
            f64::NEG_INFINITY,
            max_tso as f64,
        )?;
        for operator in operators {
            let cumulative = lp.add_variable(
                VariableKey::TsoRaUsedCumulative {
                    operator: operator.clone(),
                    state: state.clone(),
                },
                0.0,
                1.0,
                VariableKind::Binary,
            )?;
            lp.set_coefficient(max_tso_constraint, cumulative, 1.0);
            for counted_state in counted {
                let Some(tso_used) = self.tso_used(lp, operator, counted_state)? else {
                    continue;
                };
                let constraint = lp.add_constraint(
                    ConstraintKey::TsoRaUsedCumulative {
                        operator: operator.clone(),
                        state: state.clone(),
                        used_in: (*counted_state).clone(),
                    },
                    0.0,
                    f64::INFINITY,
                )?;
                lp.set_coefficient(constraint, cumulative, 1.0);
                lp.set_coefficient(constraint, tso_used, -1.0);
            }
        }
        Ok(())
    }

    /// Binary set when `operator` uses a range action in `state`, created on
    /// first use. `None` when the operator has no range action there.
    fn tso_used(
        &self,
        lp: &mut LinearProblem,
        operator: &OperatorId,
        state: &State,
    ) -> RaoResult<Option<VariableId>> {
        let members: Vec<&RangeAction> = self
            .perimeter
            .range_actions(state)
            .iter()
            .filter(|ra| ra.operator.as_ref() == Some(operator))
            .collect();
        if members.is_empty() {
            return Ok(None);
        }
        let key = VariableKey::TsoRaUsed {
            operator: operator.clone(),
            state: state.clone(),
        };
        if lp.has_variable(&key) {
            return lp.get_variable(&key).map(Some);
        }
        let tso_used = lp.add_variable(key, 0.0, 1.0, VariableKind::Binary)?;
        for ra in members {
            let binary = lp.get_variable(&VariableKey::variation_binary(&ra.id, state))?;
            let constraint = lp.add_constraint(
                ConstraintKey::TsoRaUsed {
                    operator: operator.clone(),
                    ra: ra.id.clone(),
                    state: state.clone(),
                },
                0.0,
                f64::INFINITY,
            )?;
            lp.set_coefficient(constraint, tso_used, 1.0);
            lp.set_coefficient(constraint, binary, -1.0);
        }
        Ok(Some(tso_used))
    }

    fn add_count_constraint(
        &self,
        lp: &mut LinearProblem,
        key: ConstraintKey,
        members: &[&RangeAction],
        state: &State,
        cap: usize,
    ) -> RaoResult<()> {
        let constraint = lp.add_constraint(key, f64::NEG_INFINITY, cap as f64)?;
        for ra in members {
            let binary = lp.get_variable(&VariableKey::variation_binary(&ra.id, state))?;
            lp.set_coefficient(constraint, binary, 1.0);
        }
        Ok(())
    }

    /// PSTs of `operator` in `state`.
    fn operator_psts(&self, state: &State, operator: &OperatorId) -> impl Iterator<Item = &'a RangeAction> + '_ {
        let operator = operator.clone();
        self.perimeter
            .range_actions(state)
            .iter()
            .filter(move |ra| ra.is_pst() && ra.operator.as_ref() == Some(&operator))
    }

    fn build_max_elementary_actions(
        &self,
        lp: &mut LinearProblem,
        state: &State,
        caps: &BTreeMap<OperatorId, usize>,
        activation: &dyn RangeActionActivationResult,
    ) -> RaoResult<()> {
        for (operator, cap) in caps {
            let constraint = lp.add_constraint(
                ConstraintKey::MaxElementaryActionsPerTso {
                    operator: operator.clone(),
                    state: state.clone(),
                },
                0.0,
                *cap as f64,
            )?;
            for pst in self.operator_psts(state, operator) {
                let moved = lp.add_variable(
                    VariableKey::PstAbsoluteVariationFromInitialTap {
                        ra: pst.id.clone(),
                        state: state.clone(),
                    },
                    0.0,
                    f64::INFINITY,
                    VariableKind::Continuous,
                )?;
                let up = lp.get_variable(&VariableKey::tap_variation(&pst.id, state, VariationDirection::Upward))?;
                let down = lp.get_variable(&VariableKey::tap_variation(&pst.id, state, VariationDirection::Downward))?;
                for sign in [AbsExtension::Positive, AbsExtension::Negative] {
                    let abs = lp.add_constraint(elementary_key(pst, state, sign), 0.0, f64::INFINITY)?;
                    let direction = match sign {
                        AbsExtension::Positive => 1.0,
                        AbsExtension::Negative => -1.0,
                    };
                    // E − sign·(up − down) ≥ sign·(t − t0)
                    lp.set_coefficient(abs, moved, 1.0);
                    lp.set_coefficient(abs, up, -direction);
                    lp.set_coefficient(abs, down, direction);
                }
                self.write_elementary_bounds(lp, pst, state, activation)?;
                lp.set_coefficient(constraint, moved, 1.0);
            }
        }
        Ok(())
    }

    fn write_elementary_bounds(
        &self,
        lp: &mut LinearProblem,
        pst: &RangeAction,
        state: &State,
        activation: &dyn RangeActionActivationResult,
    ) -> RaoResult<()> {
        let moved = f64::from(activation.optimized_tap(pst, state)? - self.pre_perimeter.tap(pst)?);
        let positive = lp.get_constraint(&elementary_key(pst, state, AbsExtension::Positive))?;
        lp.set_constraint_lb(positive, moved);
        let negative = lp.get_constraint(&elementary_key(pst, state, AbsExtension::Negative))?;
        lp.set_constraint_lb(negative, -moved);
        Ok(())
    }
}

fn elementary_key(pst: &RangeAction, state: &State, sign: AbsExtension) -> ConstraintKey {
    ConstraintKey::PstAbsoluteVariationFromInitialTap {
        ra: pst.id.clone(),
        state: state.clone(),
        sign,
    }
}

impl ProblemFiller for RaUsageLimitsFiller<'_> {
    fn name(&self) -> &'static str {
        "RA usage limits"
    }

    fn fill(
        &mut self,
        lp: &mut LinearProblem,
        _flows: &dyn FlowResult,
        _sensitivities: &dyn SensitivityResult,
        activation: &dyn RangeActionActivationResult,
    ) -> RaoResult<()> {
        let limited: Vec<&State> = self
            .perimeter
            .states()
            .filter(|state| self.limits_of(state).is_some())
            .collect();
        if limited.is_empty() {
            return Ok(());
        }

        // caps of a later curative state reach back to the binaries of earlier ones
        let binaries: BTreeSet<&State> = limited.iter().flat_map(|state| self.counted_states(state)).collect();
        for state in &binaries {
            for ra in self.perimeter.range_actions(state) {
                self.build_variation_binary(lp, ra, state)?;
            }
        }

        // states() is ascending, so earlier instants come first
        for state in &limited {
            if let Some(limits) = self.limits_of(state) {
                self.build_state(lp, state, limits, activation)?;
            }
        }
        debug!(states = limited.len(), binaries = binaries.len(), "Usage limits built");
        Ok(())
    }

    fn update_between_mip_iteration(
        &mut self,
        lp: &mut LinearProblem,
        activation: &dyn RangeActionActivationResult,
    ) -> RaoResult<()> {
        if !self.range_actions.is_discrete_pst() {
            return Ok(());
        }
        for state in self.perimeter.states() {
            let Some(limits) = self.limits_of(state) else {
                continue;
            };
            for operator in limits.max_elementary_actions_per_tso.keys() {
                for pst in self.operator_psts(state, operator) {
                    self.write_elementary_bounds(lp, pst, state, activation)?;
                }
            }
        }
        Ok(())
    }
}
