//! Flow CNECs: monitored branch sides with flow thresholds.
//!
//! A [`FlowCnec`] is a network element evaluated in a given [`State`]. It is
//! either *optimised* (its margin drives the objective) or *monitored*
//! (MNEC: it only has to not get worse than an acceptable limit), never both.
//!
//! # Bounds
//!
//! Thresholds may be given in MW, A or %Imax on either side. The admissible
//! flow on a side is the intersection of all thresholds of that side,
//! tightened by the reliability margin:
//!
//! ```text
//! lower_bound = max(threshold mins) + reliability_margin
//! upper_bound = min(threshold maxs) - reliability_margin
//! ```
//!
//! A side with no threshold is not monitored and has no flow variable.

use crate::units::{flow_unit_multiplier, Amperes, Kilovolts, Unit};
use crate::{CnecId, NetworkElementId, OperatorId, RaoError, RaoResult, State};
use serde::{Deserialize, Serialize};

/// Side of a branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    One,
    Two,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::One => write!(f, "one"),
            Side::Two => write!(f, "two"),
        }
    }
}

/// Flow limit on one side of a branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchThreshold {
    pub side: Side,
    pub unit: Unit,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl BranchThreshold {
    pub fn new(side: Side, unit: Unit, min: Option<f64>, max: Option<f64>) -> Self {
        Self {
            side,
            unit,
            min,
            max,
        }
    }
}

/// Maximum admissible loop flow on a cross-border element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopFlowThreshold {
    pub value: f64,
    /// `Megawatt` or `PercentImax`
    pub unit: Unit,
}

/// A critical network element monitored for its flow in a given state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowCnec {
    pub id: CnecId,
    pub name: String,
    pub network_element: NetworkElementId,
    pub state: State,
    pub operator: Option<OperatorId>,
    /// Margin of this element is part of the objective
    pub optimized: bool,
    /// Element must not get worse than an acceptable limit (MNEC)
    pub monitored: bool,
    pub thresholds: Vec<BranchThreshold>,
    /// Margin taken on every threshold, in MW
    pub reliability_margin: f64,
    pub nominal_voltage: Kilovolts,
    pub imax: Option<Amperes>,
    pub loop_flow_threshold: Option<LoopFlowThreshold>,
}

impl FlowCnec {
    pub fn new(
        id: impl Into<CnecId>,
        network_element: impl Into<NetworkElementId>,
        state: State,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.to_string(),
            id,
            network_element: network_element.into(),
            state,
            operator: None,
            optimized: false,
            monitored: false,
            thresholds: Vec::new(),
            reliability_margin: 0.0,
            nominal_voltage: Kilovolts(400.0),
            imax: None,
            loop_flow_threshold: None,
        }
    }

    pub fn with_threshold(mut self, threshold: BranchThreshold) -> Self {
        self.thresholds.push(threshold);
        self
    }

    pub fn with_operator(mut self, operator: impl Into<OperatorId>) -> Self {
        self.operator = Some(operator.into());
        self
    }

    pub fn with_optimized(mut self, optimized: bool) -> Self {
        self.optimized = optimized;
        self
    }

    pub fn with_monitored(mut self, monitored: bool) -> Self {
        self.monitored = monitored;
        self
    }

    pub fn with_reliability_margin(mut self, margin: f64) -> Self {
        self.reliability_margin = margin;
        self
    }

    pub fn with_nominal_voltage(mut self, nominal_voltage: Kilovolts) -> Self {
        self.nominal_voltage = nominal_voltage;
        self
    }

    pub fn with_imax(mut self, imax: Amperes) -> Self {
        self.imax = Some(imax);
        self
    }

    pub fn with_loop_flow_threshold(mut self, value: f64, unit: Unit) -> Self {
        self.loop_flow_threshold = Some(LoopFlowThreshold { value, unit });
        self
    }

    /// Check the invariants the optimisation relies on.
    pub fn validate(&self) -> RaoResult<()> {
        if self.optimized && self.monitored {
            return Err(RaoError::Validation(format!(
                "CNEC {} cannot be both optimized and monitored",
                self.id
            )));
        }
        for threshold in &self.thresholds {
            if !threshold.unit.is_flow_unit() {
                return Err(RaoError::Validation(format!(
                    "CNEC {} has a threshold in {}, which is not a flow unit",
                    self.id, threshold.unit
                )));
            }
            if threshold.unit == Unit::PercentImax && self.imax.is_none() {
                return Err(RaoError::Validation(format!(
                    "CNEC {} has a %Imax threshold but no Imax",
                    self.id
                )));
            }
        }
        if let Some(loop_flow) = &self.loop_flow_threshold {
            if !matches!(loop_flow.unit, Unit::Megawatt | Unit::PercentImax) {
                return Err(RaoError::Validation(format!(
                    "CNEC {} has a loop-flow threshold in {}",
                    self.id, loop_flow.unit
                )));
            }
        }
        Ok(())
    }

    /// Sides carrying at least one threshold, in side order.
    pub fn monitored_sides(&self) -> Vec<Side> {
        [Side::One, Side::Two]
            .into_iter()
            .filter(|side| self.thresholds.iter().any(|t| t.side == *side))
            .collect()
    }

    /// Multiplier converting a flow on `side` from `from` into `to`.
    pub fn flow_unit_multiplier(&self, from: Unit, to: Unit) -> RaoResult<f64> {
        flow_unit_multiplier(from, to, self.nominal_voltage, self.imax).ok_or_else(|| {
            RaoError::Validation(format!(
                "cannot convert a flow of CNEC {} from {} to {}",
                self.id, from, to
            ))
        })
    }

    /// Lowest admissible flow on `side`, expressed in `unit`.
    pub fn lower_bound(&self, side: Side, unit: Unit) -> Option<f64> {
        self.thresholds
            .iter()
            .filter(|t| t.side == side)
            .filter_map(|t| Some(t.min? * self.multiplier(t.unit, unit)?))
            .reduce(f64::max)
            .map(|min| min + self.reliability_margin_in(unit))
    }

    /// Highest admissible flow on `side`, expressed in `unit`.
    pub fn upper_bound(&self, side: Side, unit: Unit) -> Option<f64> {
        self.thresholds
            .iter()
            .filter(|t| t.side == side)
            .filter_map(|t| Some(t.max? * self.multiplier(t.unit, unit)?))
            .reduce(f64::min)
            .map(|max| max - self.reliability_margin_in(unit))
    }

    /// Margin of a MW flow on `side` against its bounds, expressed in `unit`.
    ///
    /// Infinite when the side has no bound at all.
    pub fn margin(&self, side: Side, flow_mw: f64, unit: Unit) -> f64 {
        let flow = match self.multiplier(Unit::Megawatt, unit) {
            Some(multiplier) => flow_mw * multiplier,
            None => return f64::NAN,
        };
        let below = self
            .lower_bound(side, unit)
            .map_or(f64::INFINITY, |min| flow - min);
        let above = self
            .upper_bound(side, unit)
            .map_or(f64::INFINITY, |max| max - flow);
        below.min(above)
    }

    /// Loop-flow threshold converted to MW.
    pub fn loop_flow_threshold_mw(&self) -> Option<f64> {
        let threshold = self.loop_flow_threshold.as_ref()?;
        Some(threshold.value * self.multiplier(threshold.unit, Unit::Megawatt)?)
    }

    /// Largest absolute finite bound over all monitored sides, in `unit`.
    pub fn largest_threshold(&self, unit: Unit) -> f64 {
        self.monitored_sides()
            .into_iter()
            .flat_map(|side| [self.lower_bound(side, unit), self.upper_bound(side, unit)])
            .flatten()
            .filter(|bound| bound.is_finite())
            .fold(0.0, |acc, bound| acc.max(bound.abs()))
    }

    fn multiplier(&self, from: Unit, to: Unit) -> Option<f64> {
        flow_unit_multiplier(from, to, self.nominal_voltage, self.imax)
    }

    fn reliability_margin_in(&self, unit: Unit) -> f64 {
        self.multiplier(Unit::Megawatt, unit)
            .map_or(0.0, |m| self.reliability_margin * m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Instant;

    fn state() -> State {
        State::preventive(Instant::preventive("preventive"))
    }

    #[test]
    fn test_bounds_intersect_thresholds() {
        let cnec = FlowCnec::new("cnec1", "line1", state())
            .with_threshold(BranchThreshold::new(Side::One, Unit::Megawatt, Some(-800.0), Some(1000.0)))
            .with_threshold(BranchThreshold::new(Side::One, Unit::Megawatt, Some(-900.0), Some(750.0)))
            .with_reliability_margin(50.0);

        assert_eq!(cnec.lower_bound(Side::One, Unit::Megawatt), Some(-750.0));
        assert_eq!(cnec.upper_bound(Side::One, Unit::Megawatt), Some(700.0));
        assert_eq!(cnec.lower_bound(Side::Two, Unit::Megawatt), None);
        assert_eq!(cnec.monitored_sides(), vec![Side::One]);
    }

    #[test]
    fn test_ampere_threshold_in_megawatt() {
        let cnec = FlowCnec::new("cnec1", "line1", state())
            .with_nominal_voltage(Kilovolts(380.0))
            .with_threshold(BranchThreshold::new(Side::Two, Unit::Ampere, None, Some(1000.0)));

        let ub = cnec.upper_bound(Side::Two, Unit::Megawatt).expect("upper bound");
        assert!((ub - 380.0 * 3f64.sqrt()).abs() < 1e-9, "ub = {}", ub);
        assert_eq!(cnec.lower_bound(Side::Two, Unit::Megawatt), None);
    }

    #[test]
    fn test_percent_imax_threshold() {
        let cnec = FlowCnec::new("cnec1", "line1", state())
            .with_imax(Amperes(2000.0))
            .with_threshold(BranchThreshold::new(Side::One, Unit::PercentImax, Some(-50.0), Some(50.0)));
        assert_eq!(cnec.upper_bound(Side::One, Unit::Ampere), Some(1000.0));
        assert!(cnec.validate().is_ok());
    }

    #[test]
    fn test_margin() {
        let cnec = FlowCnec::new("cnec1", "line1", state())
            .with_threshold(BranchThreshold::new(Side::One, Unit::Megawatt, Some(-1000.0), Some(1000.0)));
        assert_eq!(cnec.margin(Side::One, 1200.0, Unit::Megawatt), -200.0);
        assert_eq!(cnec.margin(Side::One, -400.0, Unit::Megawatt), 600.0);
        assert_eq!(cnec.margin(Side::Two, 0.0, Unit::Megawatt), f64::INFINITY);
    }

    #[test]
    fn test_validate_rejects_optimized_and_monitored() {
        let cnec = FlowCnec::new("cnec1", "line1", state())
            .with_optimized(true)
            .with_monitored(true);
        let err = cnec.validate().unwrap_err();
        assert!(err.to_string().contains("both optimized and monitored"));
    }

    #[test]
    fn test_validate_rejects_percent_imax_without_imax() {
        let cnec = FlowCnec::new("cnec1", "line1", state())
            .with_threshold(BranchThreshold::new(Side::One, Unit::PercentImax, None, Some(100.0)));
        assert!(cnec.validate().is_err());
    }

    #[test]
    fn test_largest_threshold() {
        let cnec = FlowCnec::new("cnec1", "line1", state())
            .with_threshold(BranchThreshold::new(Side::One, Unit::Megawatt, Some(-1500.0), Some(1000.0)))
            .with_threshold(BranchThreshold::new(Side::Two, Unit::Megawatt, None, Some(1200.0)));
        assert_eq!(cnec.largest_threshold(Unit::Megawatt), 1500.0);
    }

    #[test]
    fn test_loop_flow_threshold_in_percent_imax() {
        let cnec = FlowCnec::new("cnec1", "line1", state())
            .with_nominal_voltage(Kilovolts(400.0))
            .with_imax(Amperes(1000.0))
            .with_loop_flow_threshold(10.0, Unit::PercentImax);
        let expected = 100.0 * 400.0 * 3f64.sqrt() / 1000.0;
        let threshold = cnec.loop_flow_threshold_mw().expect("threshold");
        assert!((threshold - expected).abs() < 1e-9);
    }
}
