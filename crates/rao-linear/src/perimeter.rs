//! Optimisation perimeter: the CNECs and range actions one linear problem covers.

use rao_core::{FlowCnec, RangeAction, RaoResult, State, Unit};
use std::collections::BTreeMap;

/// CNECs and range actions of one optimisation perimeter.
///
/// `main_state` is the earliest state of the perimeter (the preventive state
/// for a preventive perimeter). Range actions are listed per state in which
/// they may act.
#[derive(Debug, Clone)]
pub struct OptimizationPerimeter {
    main_state: State,
    flow_cnecs: Vec<FlowCnec>,
    range_actions: BTreeMap<State, Vec<RangeAction>>,
}

impl OptimizationPerimeter {
    pub fn new(main_state: State) -> Self {
        Self {
            main_state,
            flow_cnecs: Vec::new(),
            range_actions: BTreeMap::new(),
        }
    }

    pub fn with_flow_cnec(mut self, cnec: FlowCnec) -> Self {
        self.flow_cnecs.push(cnec);
        self
    }

    pub fn with_range_action(mut self, state: State, range_action: RangeAction) -> Self {
        self.range_actions.entry(state).or_default().push(range_action);
        self
    }

    /// Check every CNEC of the perimeter.
    pub fn validate(&self) -> RaoResult<()> {
        self.flow_cnecs.iter().try_for_each(FlowCnec::validate)
    }

    pub fn main_state(&self) -> &State {
        &self.main_state
    }

    /// States holding range actions, in ascending order.
    pub fn states(&self) -> impl Iterator<Item = &State> + '_ {
        self.range_actions.keys()
    }

    pub fn range_actions(&self, state: &State) -> &[RangeAction] {
        self.range_actions.get(state).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every (state, range action) pair, states ascending.
    pub fn range_actions_per_state(&self) -> impl Iterator<Item = (&State, &RangeAction)> + '_ {
        self.range_actions
            .iter()
            .flat_map(|(state, ras)| ras.iter().map(move |ra| (state, ra)))
    }

    pub fn flow_cnecs(&self) -> &[FlowCnec] {
        &self.flow_cnecs
    }

    pub fn optimized_flow_cnecs(&self) -> impl Iterator<Item = &FlowCnec> + '_ {
        self.flow_cnecs.iter().filter(|c| c.optimized)
    }

    /// MNECs: monitored and not optimised.
    pub fn monitored_flow_cnecs(&self) -> impl Iterator<Item = &FlowCnec> + '_ {
        self.flow_cnecs.iter().filter(|c| c.monitored && !c.optimized)
    }

    pub fn loop_flow_cnecs(&self) -> impl Iterator<Item = &FlowCnec> + '_ {
        self.flow_cnecs.iter().filter(|c| c.loop_flow_threshold.is_some())
    }

    /// Latest earlier state in which the same device is optimised.
    ///
    /// Only states comparable with `state` (preventive, or same contingency)
    /// are searched. `None` for the main state and for preventive states.
    pub fn last_available_range_action_on_same_device(
        &self,
        range_action: &RangeAction,
        state: &State,
    ) -> Option<(&RangeAction, &State)> {
        if state == &self.main_state || state.is_preventive() {
            return None;
        }
        self.range_actions
            .range(..state)
            .rev()
            .filter(|(s, _)| s.is_preventive() || s.contingency == state.contingency)
            .find_map(|(s, ras)| {
                ras.iter()
                    .find(|ra| ra.acts_on_same_device(range_action))
                    .map(|ra| (ra, s))
            })
    }

    /// Largest absolute finite threshold over the optimised CNECs, in `unit`.
    pub fn largest_cnec_threshold(&self, unit: Unit) -> f64 {
        self.optimized_flow_cnecs()
            .map(|c| c.largest_threshold(unit))
            .fold(0.0, f64::max)
    }
}
