//! Read-only inputs of the fillers.
//!
//! Flows and sensitivities come from an external sensitivity computation;
//! setpoints come from the pre-perimeter situation or from the previous solve.
//! Each input is a trait so that callers can plug their own result storage,
//! and a map-backed implementation is provided for each.

use rao_core::{CnecId, FlowCnec, RangeAction, RangeActionId, RaoError, RaoResult, Side, State, Unit};
use std::collections::{BTreeMap, HashMap};

/// Flows on CNEC sides, in MW.
pub trait FlowResult {
    fn flow(&self, cnec: &CnecId, side: Side) -> RaoResult<f64>;

    fn commercial_flow(&self, cnec: &CnecId, side: Side) -> RaoResult<f64>;

    /// Sum of the zonal PTDFs of the CNEC, used by relative margins.
    fn ptdf_zonal_sum(&self, cnec: &CnecId, side: Side) -> RaoResult<f64>;

    fn loop_flow(&self, cnec: &CnecId, side: Side) -> RaoResult<f64> {
        Ok(self.flow(cnec, side)? - self.commercial_flow(cnec, side)?)
    }

    /// Margin of the flow on `side` against the CNEC bounds, in `unit`.
    fn margin(&self, cnec: &FlowCnec, side: Side, unit: Unit) -> RaoResult<f64> {
        Ok(cnec.margin(side, self.flow(&cnec.id, side)?, unit))
    }
}

/// Sensitivities of CNEC flows to range action setpoints, in MW per unit of setpoint.
pub trait SensitivityResult {
    /// `0.0` when no sensitivity is known for the triple.
    fn sensitivity(&self, cnec: &CnecId, side: Side, range_action: &RangeActionId) -> f64;
}

/// Setpoints of range actions, per state.
pub trait RangeActionActivationResult {
    fn optimized_setpoint(&self, range_action: &RangeAction, state: &State) -> RaoResult<f64>;

    fn optimized_tap(&self, range_action: &RangeAction, state: &State) -> RaoResult<i32> {
        let table = range_action.tap_to_angle()?;
        Ok(table.closest_tap(self.optimized_setpoint(range_action, state)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
struct FlowValues {
    flow: f64,
    commercial_flow: f64,
    ptdf_zonal_sum: f64,
}

/// Map-backed [`FlowResult`].
#[derive(Debug, Clone, Default)]
pub struct FlowResults {
    values: HashMap<(CnecId, Side), FlowValues>,
}

impl FlowResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flow of a side, keeping its commercial flow and PTDF sum.
    pub fn with_flow(mut self, cnec: impl Into<CnecId>, side: Side, flow: f64) -> Self {
        self.set_flow(cnec.into(), side, flow);
        self
    }

    pub fn with_commercial_flow(mut self, cnec: impl Into<CnecId>, side: Side, commercial_flow: f64) -> Self {
        self.entry(cnec.into(), side).commercial_flow = commercial_flow;
        self
    }

    pub fn with_ptdf_zonal_sum(mut self, cnec: impl Into<CnecId>, side: Side, ptdf_zonal_sum: f64) -> Self {
        self.entry(cnec.into(), side).ptdf_zonal_sum = ptdf_zonal_sum;
        self
    }

    pub fn set_flow(&mut self, cnec: CnecId, side: Side, flow: f64) {
        self.entry(cnec, side).flow = flow;
    }

    fn entry(&mut self, cnec: CnecId, side: Side) -> &mut FlowValues {
        self.values.entry((cnec, side)).or_default()
    }

    fn get(&self, cnec: &CnecId, side: Side) -> RaoResult<&FlowValues> {
        self.values
            .get(&(cnec.clone(), side))
            .ok_or_else(|| RaoError::MissingInput(format!("no flow for {} (side {})", cnec, side)))
    }
}

impl FlowResult for FlowResults {
    fn flow(&self, cnec: &CnecId, side: Side) -> RaoResult<f64> {
        Ok(self.get(cnec, side)?.flow)
    }

    fn commercial_flow(&self, cnec: &CnecId, side: Side) -> RaoResult<f64> {
        Ok(self.get(cnec, side)?.commercial_flow)
    }

    fn ptdf_zonal_sum(&self, cnec: &CnecId, side: Side) -> RaoResult<f64> {
        Ok(self.get(cnec, side)?.ptdf_zonal_sum)
    }
}

/// Map-backed [`SensitivityResult`].
#[derive(Debug, Clone, Default)]
pub struct SensitivityResults {
    values: HashMap<(CnecId, Side, RangeActionId), f64>,
}

impl SensitivityResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sensitivity(
        mut self,
        cnec: impl Into<CnecId>,
        side: Side,
        range_action: impl Into<RangeActionId>,
        value: f64,
    ) -> Self {
        self.set_sensitivity(cnec.into(), side, range_action.into(), value);
        self
    }

    pub fn set_sensitivity(&mut self, cnec: CnecId, side: Side, range_action: RangeActionId, value: f64) {
        self.values.insert((cnec, side, range_action), value);
    }
}

impl SensitivityResult for SensitivityResults {
    fn sensitivity(&self, cnec: &CnecId, side: Side, range_action: &RangeActionId) -> f64 {
        self.values
            .get(&(cnec.clone(), side, range_action.clone()))
            .copied()
            .unwrap_or(0.0)
    }
}

/// Setpoints of the network at the start of the perimeter, one per range action.
#[derive(Debug, Clone, Default)]
pub struct RangeActionSetpoints {
    setpoints: BTreeMap<RangeActionId, f64>,
}

impl RangeActionSetpoints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initial network setpoints of `range_actions`.
    pub fn initial<'a>(range_actions: impl IntoIterator<Item = &'a RangeAction>) -> Self {
        Self {
            setpoints: range_actions
                .into_iter()
                .map(|ra| (ra.id.clone(), ra.initial_setpoint()))
                .collect(),
        }
    }

    pub fn with_setpoint(mut self, range_action: impl Into<RangeActionId>, setpoint: f64) -> Self {
        self.setpoints.insert(range_action.into(), setpoint);
        self
    }

    pub fn setpoint(&self, range_action: &RangeAction) -> RaoResult<f64> {
        self.setpoints
            .get(&range_action.id)
            .copied()
            .ok_or_else(|| RaoError::MissingInput(format!("no pre-perimeter setpoint for {}", range_action.id)))
    }

    pub fn tap(&self, range_action: &RangeAction) -> RaoResult<i32> {
        Ok(range_action.tap_to_angle()?.closest_tap(self.setpoint(range_action)?))
    }
}

/// Setpoints of range actions per state, falling back to earlier states and
/// then to the pre-perimeter setpoints.
#[derive(Debug, Clone)]
pub struct RangeActionActivation {
    pre_perimeter: RangeActionSetpoints,
    setpoints: BTreeMap<RangeActionId, BTreeMap<State, f64>>,
}

impl RangeActionActivation {
    pub fn new(pre_perimeter: RangeActionSetpoints) -> Self {
        Self {
            pre_perimeter,
            setpoints: BTreeMap::new(),
        }
    }

    pub fn set_setpoint(&mut self, range_action: &RangeActionId, state: &State, setpoint: f64) {
        self.setpoints
            .entry(range_action.clone())
            .or_default()
            .insert(state.clone(), setpoint);
    }

    pub fn with_setpoint(mut self, range_action: impl Into<RangeActionId>, state: &State, setpoint: f64) -> Self {
        self.set_setpoint(&range_action.into(), state, setpoint);
        self
    }

    pub fn pre_perimeter(&self) -> &RangeActionSetpoints {
        &self.pre_perimeter
    }

    /// Every (range action, state, setpoint) explicitly set, in key order.
    pub fn activated(&self) -> impl Iterator<Item = (&RangeActionId, &State, f64)> + '_ {
        self.setpoints
            .iter()
            .flat_map(|(ra, per_state)| per_state.iter().map(move |(state, v)| (ra, state, *v)))
    }
}

impl RangeActionActivationResult for RangeActionActivation {
    fn optimized_setpoint(&self, range_action: &RangeAction, state: &State) -> RaoResult<f64> {
        let latest = self.setpoints.get(&range_action.id).and_then(|per_state| {
            per_state
                .iter()
                .rev()
                .find(|(s, _)| *s == state || (s.applies_to(state) && s.instant < state.instant))
                .map(|(_, v)| *v)
        });
        match latest {
            Some(setpoint) => Ok(setpoint),
            None => self.pre_perimeter.setpoint(range_action),
        }
    }
}

impl RangeActionActivationResult for RangeActionSetpoints {
    fn optimized_setpoint(&self, range_action: &RangeAction, _state: &State) -> RaoResult<f64> {
        self.setpoint(range_action)
    }
}
