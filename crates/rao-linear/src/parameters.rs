//! Linear optimiser parameters.
//!
//! Parameters are plain structs with defaults, loadable from JSON. Every field
//! is optional in the JSON document; missing fields take their default.
//!
//! ```json
//! {
//!   "objective_function": { "kind": "max_min_relative_margin", "unit": "ampere" },
//!   "range_actions": { "pst_model": "approximated_integers", "pst_penalty_cost": 0.01 },
//!   "mnec": { "acceptable_margin_decrease": 50.0, "violation_cost": 10.0 },
//!   "ra_usage_limits": { "curative": { "max_ra": 3 } },
//!   "solver": { "backend": "microlp" }
//! }
//! ```
//!
//! Optional sections (`mnec`, `loop_flow`, `unoptimized_cnec`) switch the
//! matching filler on when present.

use anyhow::Context;
use rao_core::{CnecId, OperatorId, RangeActionId, RangeActionVariant, RaoError, RaoResult, Unit};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Worst margin the objective maximises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveFunctionType {
    #[default]
    MaxMinMargin,
    /// Positive margins are divided by the zonal PTDF sum of the CNEC
    MaxMinRelativeMargin,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectiveFunctionParameters {
    pub kind: ObjectiveFunctionType,
    /// Unit of the margins in the objective (MW or A)
    pub unit: Unit,
}

impl Default for ObjectiveFunctionParameters {
    fn default() -> Self {
        Self {
            kind: ObjectiveFunctionType::MaxMinMargin,
            unit: Unit::Megawatt,
        }
    }
}

impl ObjectiveFunctionParameters {
    pub fn is_relative(&self) -> bool {
        self.kind == ObjectiveFunctionType::MaxMinRelativeMargin
    }
}

/// How PST setpoints are modelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PstModel {
    /// Angle is a continuous variable, rounded to a tap afterwards
    #[default]
    Continuous,
    /// Taps are integer variables with a linearised tap to angle conversion
    ApproximatedIntegers,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RangeActionsOptimizationParameters {
    pub pst_penalty_cost: f64,
    pub hvdc_penalty_cost: f64,
    pub injection_penalty_cost: f64,
    pub pst_sensitivity_threshold: f64,
    pub hvdc_sensitivity_threshold: f64,
    pub injection_sensitivity_threshold: f64,
    pub pst_model: PstModel,
    /// Shrink setpoint ranges around the previous solution at each iteration
    pub ra_range_shrinking: bool,
}

impl Default for RangeActionsOptimizationParameters {
    fn default() -> Self {
        Self {
            pst_penalty_cost: 0.01,
            hvdc_penalty_cost: 0.001,
            injection_penalty_cost: 0.001,
            pst_sensitivity_threshold: 0.0,
            hvdc_sensitivity_threshold: 0.0,
            injection_sensitivity_threshold: 0.0,
            pst_model: PstModel::Continuous,
            ra_range_shrinking: false,
        }
    }
}

impl RangeActionsOptimizationParameters {
    pub fn penalty_cost(&self, variant: RangeActionVariant) -> f64 {
        match variant {
            RangeActionVariant::Pst => self.pst_penalty_cost,
            RangeActionVariant::Hvdc => self.hvdc_penalty_cost,
            RangeActionVariant::Injection => self.injection_penalty_cost,
        }
    }

    pub fn sensitivity_threshold(&self, variant: RangeActionVariant) -> f64 {
        match variant {
            RangeActionVariant::Pst => self.pst_sensitivity_threshold,
            RangeActionVariant::Hvdc => self.hvdc_sensitivity_threshold,
            RangeActionVariant::Injection => self.injection_sensitivity_threshold,
        }
    }

    pub fn is_discrete_pst(&self) -> bool {
        self.pst_model == PstModel::ApproximatedIntegers
    }
}

/// Which sensitivity iterations refresh PTDF-based values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PtdfApproximation {
    /// Computed once on the initial network
    #[default]
    FixedPtdf,
    /// Recomputed after topological actions
    UpdatePtdfWithTopo,
    /// Recomputed after topological actions and PST moves
    UpdatePtdfWithTopoAndPst,
}

impl PtdfApproximation {
    pub fn should_update_ptdf_with_topological_change(&self) -> bool {
        !matches!(self, PtdfApproximation::FixedPtdf)
    }

    pub fn should_update_ptdf_with_pst_change(&self) -> bool {
        matches!(self, PtdfApproximation::UpdatePtdfWithTopoAndPst)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelativeMarginParameters {
    /// Floor of the zonal PTDF sum dividing relative margins
    pub ptdf_sum_lower_bound: f64,
    pub ptdf_approximation: PtdfApproximation,
}

impl Default for RelativeMarginParameters {
    fn default() -> Self {
        Self {
            ptdf_sum_lower_bound: 0.01,
            ptdf_approximation: PtdfApproximation::FixedPtdf,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MnecParameters {
    /// MW the margin of an MNEC may lose compared to the initial situation
    pub acceptable_margin_decrease: f64,
    /// Cost per MW of violation
    pub violation_cost: f64,
    /// MW subtracted from the MNEC bounds in the linear problem
    pub constraint_adjustment_coefficient: f64,
}

impl Default for MnecParameters {
    fn default() -> Self {
        Self {
            acceptable_margin_decrease: 50.0,
            violation_cost: 10.0,
            constraint_adjustment_coefficient: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopFlowParameters {
    /// MW the loop flow may grow above its initial value
    pub acceptable_increase: f64,
    pub violation_cost: f64,
    pub constraint_adjustment_coefficient: f64,
    pub ptdf_approximation: PtdfApproximation,
}

/// CNECs kept out of the worst margin while they do not get worse.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UnoptimizedCnecParameters {
    /// CNECs of these operators are only checked against their initial margin
    pub operators_not_to_optimize: BTreeSet<OperatorId>,
    /// CNECs secured by a PST in series: the PST alone can bring them back
    pub cnecs_secured_by_pst: BTreeMap<CnecId, RangeActionId>,
}

/// Caps on the number of range actions used in the states of one instant.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RaUsageLimits {
    pub max_ra: Option<usize>,
    pub max_tso: Option<usize>,
    /// Operators not counted by `max_tso`
    pub max_tso_exclusion: BTreeSet<OperatorId>,
    pub max_ra_per_tso: BTreeMap<OperatorId, usize>,
    pub max_pst_per_tso: BTreeMap<OperatorId, usize>,
    /// Tap moves, counted from the pre-perimeter taps, allowed per operator.
    /// Only enforced with the integer PST model.
    pub max_elementary_actions_per_tso: BTreeMap<OperatorId, usize>,
}

impl RaUsageLimits {
    pub fn is_empty(&self) -> bool {
        self.max_ra.is_none()
            && self.max_tso.is_none()
            && self.max_ra_per_tso.is_empty()
            && self.max_pst_per_tso.is_empty()
            && self.max_elementary_actions_per_tso.is_empty()
    }
}

/// LP/MIP backend used by [`LinearProblem::solve`](crate::linear_problem::LinearProblem::solve).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverBackend {
    /// Pure-Rust simplex with branch and bound.
    #[cfg(feature = "solver-microlp")]
    Microlp,
    /// HiGHS LP/MIP solver (native).
    #[cfg(feature = "solver-highs")]
    Highs,
}

impl SolverBackend {
    pub fn is_native(&self) -> bool {
        match self {
            #[cfg(feature = "solver-microlp")]
            SolverBackend::Microlp => false,
            #[cfg(feature = "solver-highs")]
            SolverBackend::Highs => true,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            #[cfg(feature = "solver-microlp")]
            SolverBackend::Microlp => "microlp",
            #[cfg(feature = "solver-highs")]
            SolverBackend::Highs => "HiGHS",
        }
    }
}

impl Default for SolverBackend {
    #[cfg(feature = "solver-microlp")]
    fn default() -> Self {
        SolverBackend::Microlp
    }

    #[cfg(all(not(feature = "solver-microlp"), feature = "solver-highs"))]
    fn default() -> Self {
        SolverBackend::Highs
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverParameters {
    pub backend: SolverBackend,
    /// Wall-clock limit of one solve, for backends supporting it
    pub time_limit_seconds: Option<f64>,
    pub relative_mip_gap: f64,
    pub verbose: bool,
}

impl Default for SolverParameters {
    fn default() -> Self {
        Self {
            backend: SolverBackend::default(),
            time_limit_seconds: None,
            relative_mip_gap: 1e-4,
            verbose: false,
        }
    }
}

/// Complete parameter set of the linear optimisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearOptimizerParameters {
    pub objective_function: ObjectiveFunctionParameters,
    pub range_actions: RangeActionsOptimizationParameters,
    pub relative_margin: RelativeMarginParameters,
    pub mnec: Option<MnecParameters>,
    pub loop_flow: Option<LoopFlowParameters>,
    pub unoptimized_cnec: Option<UnoptimizedCnecParameters>,
    /// Usage limits per instant id
    pub ra_usage_limits: BTreeMap<String, RaUsageLimits>,
    pub solver: SolverParameters,
    pub max_number_of_iterations: u32,
}

impl Default for LinearOptimizerParameters {
    fn default() -> Self {
        Self {
            objective_function: ObjectiveFunctionParameters::default(),
            range_actions: RangeActionsOptimizationParameters::default(),
            relative_margin: RelativeMarginParameters::default(),
            mnec: None,
            loop_flow: None,
            unoptimized_cnec: None,
            ra_usage_limits: BTreeMap::new(),
            solver: SolverParameters::default(),
            max_number_of_iterations: 10,
        }
    }
}

impl LinearOptimizerParameters {
    pub fn with_objective_function(mut self, kind: ObjectiveFunctionType, unit: Unit) -> Self {
        self.objective_function = ObjectiveFunctionParameters { kind, unit };
        self
    }

    pub fn with_range_actions(mut self, range_actions: RangeActionsOptimizationParameters) -> Self {
        self.range_actions = range_actions;
        self
    }

    pub fn with_pst_model(mut self, pst_model: PstModel) -> Self {
        self.range_actions.pst_model = pst_model;
        self
    }

    pub fn with_relative_margin(mut self, relative_margin: RelativeMarginParameters) -> Self {
        self.relative_margin = relative_margin;
        self
    }

    pub fn with_mnec(mut self, mnec: MnecParameters) -> Self {
        self.mnec = Some(mnec);
        self
    }

    pub fn with_loop_flow(mut self, loop_flow: LoopFlowParameters) -> Self {
        self.loop_flow = Some(loop_flow);
        self
    }

    pub fn with_unoptimized_cnec(mut self, unoptimized_cnec: UnoptimizedCnecParameters) -> Self {
        self.unoptimized_cnec = Some(unoptimized_cnec);
        self
    }

    pub fn with_ra_usage_limits(mut self, instant: impl Into<String>, limits: RaUsageLimits) -> Self {
        self.ra_usage_limits.insert(instant.into(), limits);
        self
    }

    pub fn with_solver(mut self, solver: SolverParameters) -> Self {
        self.solver = solver;
        self
    }

    pub fn with_max_number_of_iterations(mut self, max: u32) -> Self {
        self.max_number_of_iterations = max;
        self
    }

    /// Parse parameters from a JSON document and validate them.
    pub fn from_json_str(json: &str) -> RaoResult<Self> {
        let parameters: Self = serde_json::from_str(json)
            .map_err(|e| RaoError::Config(format!("invalid parameters JSON: {}", e)))?;
        parameters.validate()?;
        Ok(parameters)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> RaoResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading parameters '{}'", path.display()))
            .map_err(|e| RaoError::Config(format!("{:#}", e)))?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> RaoResult<()> {
        let unit = self.objective_function.unit;
        if !matches!(unit, Unit::Megawatt | Unit::Ampere) {
            return Err(config(format!("objective function unit must be MW or A, got {}", unit)));
        }
        let ra = &self.range_actions;
        for (name, value) in [
            ("pst_penalty_cost", ra.pst_penalty_cost),
            ("hvdc_penalty_cost", ra.hvdc_penalty_cost),
            ("injection_penalty_cost", ra.injection_penalty_cost),
            ("pst_sensitivity_threshold", ra.pst_sensitivity_threshold),
            ("hvdc_sensitivity_threshold", ra.hvdc_sensitivity_threshold),
            ("injection_sensitivity_threshold", ra.injection_sensitivity_threshold),
        ] {
            non_negative(name, value)?;
        }
        if !(self.relative_margin.ptdf_sum_lower_bound > 0.0) {
            return Err(config(format!(
                "ptdf_sum_lower_bound must be positive, got {}",
                self.relative_margin.ptdf_sum_lower_bound
            )));
        }
        if let Some(mnec) = &self.mnec {
            non_negative("mnec.acceptable_margin_decrease", mnec.acceptable_margin_decrease)?;
            non_negative("mnec.violation_cost", mnec.violation_cost)?;
            finite("mnec.constraint_adjustment_coefficient", mnec.constraint_adjustment_coefficient)?;
        }
        if let Some(loop_flow) = &self.loop_flow {
            non_negative("loop_flow.acceptable_increase", loop_flow.acceptable_increase)?;
            non_negative("loop_flow.violation_cost", loop_flow.violation_cost)?;
            finite("loop_flow.constraint_adjustment_coefficient", loop_flow.constraint_adjustment_coefficient)?;
        }
        if let Some(unoptimized) = &self.unoptimized_cnec {
            if !unoptimized.operators_not_to_optimize.is_empty() && !unoptimized.cnecs_secured_by_pst.is_empty() {
                return Err(config(
                    "unoptimized CNECs are defined either by operator or by PST, not both".to_string(),
                ));
            }
        }
        non_negative("solver.relative_mip_gap", self.solver.relative_mip_gap)?;
        if let Some(limit) = self.solver.time_limit_seconds {
            if !(limit > 0.0) {
                return Err(config(format!("solver time limit must be positive, got {}", limit)));
            }
        }
        if self.max_number_of_iterations == 0 {
            return Err(config("max_number_of_iterations must be at least 1".to_string()));
        }
        Ok(())
    }
}

fn config(message: String) -> RaoError {
    RaoError::Config(message)
}

fn non_negative(name: &str, value: f64) -> RaoResult<()> {
    if value >= 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(config(format!("{} must be a finite non-negative number, got {}", name, value)))
    }
}

fn finite(name: &str, value: f64) -> RaoResult<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(config(format!("{} must be finite, got {}", name, value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let params = LinearOptimizerParameters::default();
        assert_eq!(params.range_actions.pst_penalty_cost, 0.01);
        assert_eq!(params.range_actions.hvdc_penalty_cost, 0.001);
        assert_eq!(params.relative_margin.ptdf_sum_lower_bound, 0.01);
        assert_eq!(params.max_number_of_iterations, 10);
        assert!(params.mnec.is_none());
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let json = r#"{
            "objective_function": {"kind": "max_min_relative_margin"},
            "range_actions": {"pst_model": "approximated_integers"},
            "mnec": {"violation_cost": 5.0},
            "ra_usage_limits": {"curative": {"max_ra": 2, "max_ra_per_tso": {"FR": 1}}}
        }"#;
        let params = LinearOptimizerParameters::from_json_str(json).expect("valid parameters");
        assert!(params.objective_function.is_relative());
        assert_eq!(params.objective_function.unit, Unit::Megawatt);
        assert!(params.range_actions.is_discrete_pst());
        assert_eq!(params.range_actions.pst_penalty_cost, 0.01);
        let mnec = params.mnec.expect("mnec section");
        assert_eq!(mnec.violation_cost, 5.0);
        assert_eq!(mnec.acceptable_margin_decrease, 50.0);
        let limits = &params.ra_usage_limits["curative"];
        assert_eq!(limits.max_ra, Some(2));
        assert_eq!(limits.max_ra_per_tso[&OperatorId::new("FR")], 1);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut params = LinearOptimizerParameters::default();
        params.relative_margin.ptdf_sum_lower_bound = 0.0;
        assert!(matches!(params.validate(), Err(RaoError::Config(_))));

        let params = LinearOptimizerParameters::default()
            .with_objective_function(ObjectiveFunctionType::MaxMinMargin, Unit::Degree);
        assert!(params.validate().is_err());

        let params = LinearOptimizerParameters::default().with_max_number_of_iterations(0);
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_both_unoptimized_rules_rejected() {
        let params = LinearOptimizerParameters::default().with_unoptimized_cnec(UnoptimizedCnecParameters {
            operators_not_to_optimize: BTreeSet::from([OperatorId::new("FR")]),
            cnecs_secured_by_pst: BTreeMap::from([(CnecId::new("cnec"), RangeActionId::new("pst"))]),
        });
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let err = LinearOptimizerParameters::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, RaoError::Config(_)));
    }

    #[test]
    fn test_penalty_per_variant() {
        let ra = RangeActionsOptimizationParameters::default();
        assert_eq!(ra.penalty_cost(RangeActionVariant::Pst), 0.01);
        assert_eq!(ra.penalty_cost(RangeActionVariant::Injection), 0.001);
    }
}
