//! Evaluation of a network situation against the optimisation objective.
//!
//! The cost of a situation is its functional cost (minus the worst margin of
//! the optimised CNECs) plus virtual costs paying for MNEC and loop-flow
//! violations. It is the quantity the iterating optimiser requires to
//! decrease from one sensitivity iteration to the next.

use crate::inputs::FlowResult;
use crate::parameters::{LinearOptimizerParameters, LoopFlowParameters, MnecParameters};
use crate::perimeter::OptimizationPerimeter;
use rao_core::{CnecId, FlowCnec, RaoError, RaoResult, Side, Unit};
use std::collections::BTreeMap;

pub const MNEC_COST_NAME: &str = "mnec-cost";
pub const LOOP_FLOW_COST_NAME: &str = "loop-flow-cost";

/// Cost of one network situation.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectiveFunctionResult {
    /// Minus the worst margin, in the objective unit
    pub functional_cost: f64,
    pub virtual_costs: BTreeMap<&'static str, f64>,
    /// Side holding the worst margin, `None` without optimised CNECs
    pub most_limiting: Option<(CnecId, Side)>,
}

impl ObjectiveFunctionResult {
    pub fn virtual_cost(&self) -> f64 {
        self.virtual_costs.values().sum()
    }

    pub fn cost(&self) -> f64 {
        self.functional_cost + self.virtual_cost()
    }
}

pub struct ObjectiveFunction<'a> {
    perimeter: &'a OptimizationPerimeter,
    parameters: &'a LinearOptimizerParameters,
    initial_flows: Option<&'a dyn FlowResult>,
}

impl<'a> ObjectiveFunction<'a> {
    pub fn new(perimeter: &'a OptimizationPerimeter, parameters: &'a LinearOptimizerParameters) -> Self {
        Self {
            perimeter,
            parameters,
            initial_flows: None,
        }
    }

    /// Flows before any remedial action, reference of the virtual costs.
    pub fn with_initial_flows(mut self, flows: &'a dyn FlowResult) -> Self {
        self.initial_flows = Some(flows);
        self
    }

    pub fn evaluate(&self, flows: &dyn FlowResult) -> RaoResult<ObjectiveFunctionResult> {
        let (functional_cost, most_limiting) = self.functional_cost(flows)?;
        let mut virtual_costs = BTreeMap::new();
        if let Some(mnec) = &self.parameters.mnec {
            if self.perimeter.monitored_flow_cnecs().next().is_some() {
                virtual_costs.insert(MNEC_COST_NAME, self.mnec_cost(mnec, flows)?);
            }
        }
        if let Some(loop_flow) = &self.parameters.loop_flow {
            if self.perimeter.loop_flow_cnecs().next().is_some() {
                virtual_costs.insert(LOOP_FLOW_COST_NAME, self.loop_flow_cost(loop_flow, flows)?);
            }
        }
        Ok(ObjectiveFunctionResult {
            functional_cost,
            virtual_costs,
            most_limiting,
        })
    }

    fn functional_cost(&self, flows: &dyn FlowResult) -> RaoResult<(f64, Option<(CnecId, Side)>)> {
        let objective = &self.parameters.objective_function;
        let mut worst: Option<(f64, CnecId, Side)> = None;
        for cnec in self.perimeter.optimized_flow_cnecs() {
            for side in cnec.monitored_sides() {
                let mut margin = flows.margin(cnec, side, objective.unit)?;
                if objective.is_relative() && margin > 0.0 {
                    margin /= self.relative_divisor(flows, cnec, side)?;
                }
                if worst.as_ref().map_or(true, |(m, _, _)| margin < *m) {
                    worst = Some((margin, cnec.id.clone(), side));
                }
            }
        }
        Ok(match worst {
            Some((margin, cnec, side)) => (-margin, Some((cnec, side))),
            None => (0.0, None),
        })
    }

    fn relative_divisor(&self, flows: &dyn FlowResult, cnec: &FlowCnec, side: Side) -> RaoResult<f64> {
        let floor = self.parameters.relative_margin.ptdf_sum_lower_bound;
        let ptdf = flows.ptdf_zonal_sum(&cnec.id, side)?;
        Ok(if ptdf.is_nan() { floor } else { ptdf.max(floor) })
    }

    fn initial_flows(&self, what: &str) -> RaoResult<&'a dyn FlowResult> {
        self.initial_flows
            .ok_or_else(|| RaoError::MissingInput(format!("initial flows for {}", what)))
    }

    /// Violation beyond `max(threshold, initial ± decrease)`, in MW.
    fn mnec_cost(&self, parameters: &MnecParameters, flows: &dyn FlowResult) -> RaoResult<f64> {
        let initial_flows = self.initial_flows("MNEC costs")?;
        let unit = self.parameters.objective_function.unit;
        let mut cost = 0.0;
        for cnec in self.perimeter.monitored_flow_cnecs() {
            let sides = cnec.monitored_sides();
            let nb_sides = sides.len() as f64;
            for side in sides {
                let initial = initial_flows.flow(&cnec.id, side)?;
                let flow = flows.flow(&cnec.id, side)?;
                let decrease = parameters.acceptable_margin_decrease;
                let mut violation = 0.0;
                if let Some(max_flow) = cnec.upper_bound(side, Unit::Megawatt) {
                    violation += (flow - max_flow.max(initial + decrease)).max(0.0);
                }
                if let Some(min_flow) = cnec.lower_bound(side, Unit::Megawatt) {
                    violation += (min_flow.min(initial - decrease) - flow).max(0.0);
                }
                cost += parameters.violation_cost * violation * cnec.flow_unit_multiplier(Unit::Megawatt, unit)?
                    / nb_sides;
            }
        }
        Ok(cost)
    }

    /// Loop flow beyond `max(threshold, |initial loop flow| + increase)`, in MW.
    fn loop_flow_cost(&self, parameters: &LoopFlowParameters, flows: &dyn FlowResult) -> RaoResult<f64> {
        let initial_flows = self.initial_flows("loop-flow costs")?;
        let mut cost = 0.0;
        for cnec in self.perimeter.loop_flow_cnecs() {
            let Some(threshold) = cnec.loop_flow_threshold_mw() else {
                continue;
            };
            let sides = cnec.monitored_sides();
            let nb_sides = sides.len() as f64;
            for side in sides {
                let initial = initial_flows.loop_flow(&cnec.id, side)?;
                if initial.is_nan() {
                    continue;
                }
                let bound = threshold.max(initial.abs() + parameters.acceptable_increase);
                let excess = (flows.loop_flow(&cnec.id, side)?.abs() - bound).max(0.0);
                cost += parameters.violation_cost * excess / nb_sides;
            }
        }
        Ok(cost)
    }
}
