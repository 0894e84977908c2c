//! Sensitivity iterations around the linear problem.
//!
//! The linear problem is only valid close to the setpoints its sensitivities
//! were computed at. The iterating optimiser solves it, asks an external
//! [`SensitivityComputer`] for the flows at the new setpoints, and keeps going
//! while the objective improves:
//!
//! 1. solve (and, for integer taps, re-solve around the rounded taps)
//! 2. round PST setpoints to their closest tap
//! 3. stop if the setpoints did not move
//! 4. recompute flows and sensitivities at the new setpoints
//! 5. stop if the cost did not decrease, otherwise refresh the fillers

use crate::builder::LinearProblemBuilder;
use crate::inputs::{FlowResult, FlowResults, RangeActionActivation, RangeActionSetpoints, SensitivityResults};
use crate::linear_problem::{LinearProblem, LinearProblemStatus};
use crate::objective::{ObjectiveFunction, ObjectiveFunctionResult};
use crate::parameters::LinearOptimizerParameters;
use crate::perimeter::OptimizationPerimeter;
use crate::pipeline::FillerPipeline;
use crate::result::{activation_from_solution, round_pst_setpoints, setpoints_differ};
use rao_core::{RaoError, RaoResult};
use tracing::{debug, info, warn};

/// Setpoint change under which two solutions are considered identical.
pub const SETPOINT_CHANGE_TOLERANCE: f64 = 1e-6;

/// Flow and sensitivity computation on the network, outside the linear problem.
pub trait SensitivityComputer {
    fn compute(&mut self, activation: &RangeActionActivation) -> anyhow::Result<(FlowResults, SensitivityResults)>;
}

/// Best situation found by [`IteratingLinearOptimizer::optimize`].
#[derive(Debug, Clone)]
pub struct IteratingLinearOptimizerResult {
    pub status: LinearProblemStatus,
    pub activation: RangeActionActivation,
    pub flows: FlowResults,
    pub objective: ObjectiveFunctionResult,
    /// Linear problem solves performed
    pub iterations: u32,
}

impl IteratingLinearOptimizerResult {
    pub fn cost(&self) -> f64 {
        self.objective.cost()
    }
}

struct BestSolution {
    activation: RangeActionActivation,
    flows: FlowResults,
    sensitivities: SensitivityResults,
    objective: ObjectiveFunctionResult,
}

impl BestSolution {
    fn into_result(self, status: LinearProblemStatus, iterations: u32) -> IteratingLinearOptimizerResult {
        IteratingLinearOptimizerResult {
            status,
            activation: self.activation,
            flows: self.flows,
            objective: self.objective,
            iterations,
        }
    }
}

pub struct IteratingLinearOptimizer<'a> {
    perimeter: &'a OptimizationPerimeter,
    pre_perimeter: &'a RangeActionSetpoints,
    parameters: &'a LinearOptimizerParameters,
    initial_flows: Option<&'a dyn FlowResult>,
    pre_perimeter_flows: Option<&'a dyn FlowResult>,
}

impl<'a> IteratingLinearOptimizer<'a> {
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

    pub fn with_initial_flows(mut self, flows: &'a dyn FlowResult) -> Self {
        self.initial_flows = Some(flows);
        self
    }

    pub fn with_pre_perimeter_flows(mut self, flows: &'a dyn FlowResult) -> Self {
        self.pre_perimeter_flows = Some(flows);
        self
    }

    /// Optimise from the pre-perimeter `flows` and `sensitivities`.
    ///
    /// Solver and sensitivity failures end the iterations with the matching
    /// status; only contract violations and input errors are returned as `Err`.
    pub fn optimize(
        &self,
        flows: FlowResults,
        sensitivities: SensitivityResults,
        computer: &mut dyn SensitivityComputer,
    ) -> RaoResult<IteratingLinearOptimizerResult> {
        let mut builder = LinearProblemBuilder::new(self.perimeter, self.pre_perimeter, self.parameters);
        let mut objective_function = ObjectiveFunction::new(self.perimeter, self.parameters);
        if let Some(initial) = self.initial_flows {
            builder = builder.with_initial_flows(initial);
            objective_function = objective_function.with_initial_flows(initial);
        }
        if let Some(pre_perimeter_flows) = self.pre_perimeter_flows {
            builder = builder.with_pre_perimeter_flows(pre_perimeter_flows);
        }
        let mut pipeline = builder.build()?;
        let mut lp = builder.new_problem();

        let objective = objective_function.evaluate(&flows)?;
        let mut best = BestSolution {
            activation: RangeActionActivation::new(self.pre_perimeter.clone()),
            flows,
            sensitivities,
            objective,
        };
        pipeline.fill(&mut lp, &best.flows, &best.sensitivities, self.pre_perimeter)?;
        info!(
            cost = best.objective.cost(),
            variables = lp.variable_count(),
            constraints = lp.constraint_count(),
            "Linear optimisation started"
        );

        let max_iterations = self.parameters.max_number_of_iterations;
        for iteration in 1..=max_iterations {
            let status = self.solve(&mut lp, &mut pipeline)?;
            if !status.is_success() {
                if iteration == 1 {
                    warn!(%status, "Linear problem could not be solved");
                    return Ok(best.into_result(status, iteration));
                }
                warn!(iteration, %status, "Linear problem failed, keeping the previous solution");
                return Ok(best.into_result(LinearProblemStatus::Feasible, iteration));
            }

            let activation = round_pst_setpoints(
                &activation_from_solution(&lp, self.perimeter, self.pre_perimeter)?,
                self.perimeter,
            )?;
            if !setpoints_differ(&activation, &best.activation, self.perimeter, SETPOINT_CHANGE_TOLERANCE)? {
                info!(iteration, "Setpoints unchanged, linear optimisation converged");
                return Ok(best.into_result(status, iteration));
            }

            let (flows, sensitivities) = match computer.compute(&activation) {
                Ok(results) => results,
                Err(e) => {
                    let err = RaoError::Sensitivity(format!("{:#}", e));
                    warn!(iteration, error = %err, "Keeping the previous solution");
                    return Ok(best.into_result(LinearProblemStatus::SensitivityComputationFailed, iteration));
                }
            };
            let objective = objective_function.evaluate(&flows)?;
            if objective.cost() >= best.objective.cost() {
                info!(
                    iteration,
                    cost = objective.cost(),
                    best = best.objective.cost(),
                    "Cost did not improve, linear optimisation stopped"
                );
                return Ok(best.into_result(status, iteration));
            }
            info!(
                iteration,
                cost = objective.cost(),
                functional = objective.functional_cost,
                "Linear optimisation improved the situation"
            );
            best = BestSolution {
                activation,
                flows,
                sensitivities,
                objective,
            };
            pipeline.update_between_sensi_iteration(&mut lp, &best.flows, &best.sensitivities, &best.activation)?;
        }

        info!(max_iterations, "Maximum number of linear iterations reached");
        Ok(best.into_result(LinearProblemStatus::MaxIterationReached, max_iterations))
    }

    fn solve(&self, lp: &mut LinearProblem, pipeline: &mut FillerPipeline<'_>) -> RaoResult<LinearProblemStatus> {
        let status = lp.solve()?;
        if !status.is_success() || !self.parameters.range_actions.is_discrete_pst() {
            return Ok(status);
        }
        let rounded = round_pst_setpoints(
            &activation_from_solution(lp, self.perimeter, self.pre_perimeter)?,
            self.perimeter,
        )?;
        pipeline.update_between_mip_iteration(lp, &rounded)?;
        debug!("Solving again around the rounded taps");
        lp.solve()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fillers::test_utils::*;
    use crate::inputs::RangeActionActivationResult;
    use crate::parameters::PstModel;
    use rao_core::Side;

    /// Flow on `cnec1` linear in the preventive setpoint of `pst1`.
    struct LinearNetwork {
        reference: f64,
        sensitivity: f64,
        calls: usize,
    }

    impl SensitivityComputer for LinearNetwork {
        fn compute(&mut self, activation: &RangeActionActivation) -> anyhow::Result<(FlowResults, SensitivityResults)> {
            self.calls += 1;
            let perimeter = simple_perimeter();
            let pst = &perimeter.range_actions(&preventive())[0];
            let setpoint = activation.optimized_setpoint(pst, &preventive())?;
            Ok(simple_inputs(self.reference + self.sensitivity * setpoint, self.sensitivity))
        }
    }

    struct FailingNetwork;

    impl SensitivityComputer for FailingNetwork {
        fn compute(&mut self, _activation: &RangeActionActivation) -> anyhow::Result<(FlowResults, SensitivityResults)> {
            anyhow::bail!("load flow diverged")
        }
    }

    fn setpoint(result: &IteratingLinearOptimizerResult) -> f64 {
        let perimeter = simple_perimeter();
        let pst = &perimeter.range_actions(&preventive())[0];
        result.activation.optimized_setpoint(pst, &preventive()).expect("setpoint")
    }

    #[test]
    fn test_converges_on_linear_network() {
        let perimeter = simple_perimeter();
        let pre = initial_setpoints(&perimeter);
        let parameters = LinearOptimizerParameters::default();
        let (flows, sensi) = simple_inputs(1200.0, -50.0);
        let mut network = LinearNetwork {
            reference: 1200.0,
            sensitivity: -50.0,
            calls: 0,
        };

        let result = IteratingLinearOptimizer::new(&perimeter, &pre, &parameters)
            .optimize(flows, sensi, &mut network)
            .expect("optimize");
        assert_eq!(result.status, LinearProblemStatus::Optimal);
        assert_eq!(result.iterations, 2);
        assert_eq!(network.calls, 1);
        assert!((setpoint(&result) - 5.0).abs() < 1e-6);
        assert!((result.cost() + 50.0).abs() < 1e-6);
        assert!((result.flows.flow(&"cnec1".into(), Side::One).expect("flow") - 950.0).abs() < 1e-6);
    }

    #[test]
    fn test_sensitivity_failure_keeps_initial_situation() {
        let perimeter = simple_perimeter();
        let pre = initial_setpoints(&perimeter);
        let parameters = LinearOptimizerParameters::default();
        let (flows, sensi) = simple_inputs(1200.0, -50.0);

        let result = IteratingLinearOptimizer::new(&perimeter, &pre, &parameters)
            .optimize(flows, sensi, &mut FailingNetwork)
            .expect("optimize");
        assert_eq!(result.status, LinearProblemStatus::SensitivityComputationFailed);
        assert_eq!(setpoint(&result), 0.0);
        assert!((result.cost() - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_worse_situation_is_rejected() {
        let perimeter = simple_perimeter();
        let pre = initial_setpoints(&perimeter);
        let parameters = LinearOptimizerParameters::default();
        let (flows, sensi) = simple_inputs(1200.0, -50.0);
        // the real network reacts the other way round
        let mut network = LinearNetwork {
            reference: 1200.0,
            sensitivity: 50.0,
            calls: 0,
        };

        let result = IteratingLinearOptimizer::new(&perimeter, &pre, &parameters)
            .optimize(flows, sensi, &mut network)
            .expect("optimize");
        assert_eq!(result.iterations, 1);
        assert_eq!(setpoint(&result), 0.0);
        assert!((result.cost() - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_iteration_cap() {
        let perimeter = simple_perimeter();
        let pre = initial_setpoints(&perimeter);
        let parameters = LinearOptimizerParameters::default().with_max_number_of_iterations(1);
        let (flows, sensi) = simple_inputs(1200.0, -50.0);
        let mut network = LinearNetwork {
            reference: 1200.0,
            sensitivity: -50.0,
            calls: 0,
        };

        let result = IteratingLinearOptimizer::new(&perimeter, &pre, &parameters)
            .optimize(flows, sensi, &mut network)
            .expect("optimize");
        assert_eq!(result.status, LinearProblemStatus::MaxIterationReached);
        assert!((setpoint(&result) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_integer_taps() {
        let perimeter = simple_perimeter();
        let pre = initial_setpoints(&perimeter);
        let parameters = LinearOptimizerParameters::default().with_pst_model(PstModel::ApproximatedIntegers);
        let (flows, sensi) = simple_inputs(1200.0, -50.0);
        let mut network = LinearNetwork {
            reference: 1200.0,
            sensitivity: -50.0,
            calls: 0,
        };

        let result = IteratingLinearOptimizer::new(&perimeter, &pre, &parameters)
            .optimize(flows, sensi, &mut network)
            .expect("optimize");
        assert!(result.status.is_success());
        let pst = &perimeter.range_actions(&preventive())[0];
        assert_eq!(result.activation.optimized_tap(pst, &preventive()).expect("tap"), 10);
    }
}
