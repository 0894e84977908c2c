//! Assembly of the filler pipeline from the optimiser parameters.

use crate::fillers::{
    ContinuousRangeActionGroupFiller, CoreProblemFiller, DiscretePstGroupFiller, DiscretePstTapFiller,
    MaxLoopFlowFiller, MaxMinMarginFiller, MaxMinRelativeMarginFiller, MnecFiller, RaUsageLimitsFiller,
    UnoptimizedCnecFiller, UnoptimizedCnecRule,
};
use crate::inputs::{FlowResult, RangeActionSetpoints};
use crate::linear_problem::LinearProblem;
use crate::parameters::LinearOptimizerParameters;
use crate::perimeter::OptimizationPerimeter;
use crate::pipeline::FillerPipeline;
use rao_core::{RaoError, RaoResult};
use tracing::info;

/// Builds the fillers of one perimeter in their fixed order:
///
/// 1. core
/// 2. continuous range action groups
/// 3. discrete PST taps, then discrete PST groups (integer tap model only)
/// 4. max-min margin or max-min relative margin
/// 5. MNEC, loop flow, unoptimized CNECs (when configured)
/// 6. usage limits (when configured)
///
/// # Example
///
/// ```
/// use rao_core::*;
/// use rao_linear::{LinearOptimizerParameters, LinearProblemBuilder, OptimizationPerimeter, RangeActionSetpoints};
///
/// let preventive = State::preventive(Instant::preventive("preventive"));
/// let perimeter = OptimizationPerimeter::new(preventive.clone()).with_flow_cnec(
///     FlowCnec::new("cnec1", "line1", preventive)
///         .with_threshold(BranchThreshold::new(Side::One, Unit::Megawatt, Some(-1000.0), Some(1000.0)))
///         .with_optimized(true),
/// );
/// let parameters = LinearOptimizerParameters::default();
/// let pre = RangeActionSetpoints::new();
///
/// let pipeline = LinearProblemBuilder::new(&perimeter, &pre, &parameters).build().unwrap();
/// assert_eq!(pipeline.names(), vec!["core", "continuous range action group", "max min margin"]);
/// ```
pub struct LinearProblemBuilder<'a> {
    perimeter: &'a OptimizationPerimeter,
    pre_perimeter: &'a RangeActionSetpoints,
    parameters: &'a LinearOptimizerParameters,
    initial_flows: Option<&'a dyn FlowResult>,
    pre_perimeter_flows: Option<&'a dyn FlowResult>,
}

impl<'a> LinearProblemBuilder<'a> {
    pub fn new(
        perimeter: &'a OptimizationPerimeter,
        pre_perimeter: &'a RangeActionSetpoints,
        parameters: &'a LinearOptimizerParameters,
    ) -> Self {
        Self {
            perimeter,
            pre_perimeter,
            parameters,
            initial_flows: None,
            pre_perimeter_flows: None,
        }
    }

    /// Flows before any remedial action, needed by the MNEC and loop-flow fillers.
    pub fn with_initial_flows(mut self, flows: &'a dyn FlowResult) -> Self {
        self.initial_flows = Some(flows);
        self
    }

    /// Flows at the start of the perimeter, needed by the unoptimized CNEC filler.
    pub fn with_pre_perimeter_flows(mut self, flows: &'a dyn FlowResult) -> Self {
        self.pre_perimeter_flows = Some(flows);
        self
    }

    /// Empty model carrying the solver parameters.
    pub fn new_problem(&self) -> LinearProblem {
        LinearProblem::new(self.parameters.solver.clone())
    }

    pub fn build(&self) -> RaoResult<FillerPipeline<'a>> {
        self.parameters.validate()?;
        self.perimeter.validate()?;

        let parameters = self.parameters;
        let perimeter = self.perimeter;
        let range_actions = &parameters.range_actions;
        let objective = &parameters.objective_function;

        let mut pipeline = FillerPipeline::new()
            .with(CoreProblemFiller::new(perimeter, self.pre_perimeter, range_actions.clone()))
            .with(ContinuousRangeActionGroupFiller::new(perimeter, range_actions.pst_model));

        if range_actions.is_discrete_pst() {
            pipeline.push(DiscretePstTapFiller::new(perimeter, self.pre_perimeter));
            pipeline.push(DiscretePstGroupFiller::new(perimeter));
        }

        if objective.is_relative() {
            pipeline.push(MaxMinRelativeMarginFiller::new(
                perimeter,
                objective.unit,
                parameters.relative_margin.clone(),
            ));
        } else {
            pipeline.push(MaxMinMarginFiller::new(perimeter, objective.unit));
        }

        if let Some(mnec) = &parameters.mnec {
            if perimeter.monitored_flow_cnecs().next().is_some() {
                let initial_flows = self.require(self.initial_flows, "initial flows for MNEC constraints")?;
                pipeline.push(MnecFiller::new(perimeter, initial_flows, objective.unit, mnec.clone()));
            }
        }

        if let Some(loop_flow) = &parameters.loop_flow {
            if perimeter.loop_flow_cnecs().next().is_some() {
                let initial_flows = self.require(self.initial_flows, "initial flows for loop-flow constraints")?;
                pipeline.push(MaxLoopFlowFiller::new(perimeter, initial_flows, loop_flow.clone()));
            }
        }

        if let Some(unoptimized) = &parameters.unoptimized_cnec {
            if let Some(rule) = UnoptimizedCnecRule::from_parameters(unoptimized)? {
                let flows = self.require(self.pre_perimeter_flows, "pre-perimeter flows for unoptimized CNECs")?;
                pipeline.push(UnoptimizedCnecFiller::new(
                    perimeter,
                    rule,
                    flows,
                    self.pre_perimeter,
                    parameters.range_actions.pst_sensitivity_threshold,
                ));
            }
        }

        if parameters.ra_usage_limits.values().any(|limits| !limits.is_empty()) {
            pipeline.push(RaUsageLimitsFiller::new(
                perimeter,
                self.pre_perimeter,
                parameters.ra_usage_limits.clone(),
                range_actions.clone(),
            ));
        }

        info!(fillers = ?pipeline.names(), "Linear problem pipeline built");
        Ok(pipeline)
    }

    fn require(&self, flows: Option<&'a dyn FlowResult>, what: &str) -> RaoResult<&'a dyn FlowResult> {
        flows.ok_or_else(|| RaoError::MissingInput(what.to_string()))
    }
}
