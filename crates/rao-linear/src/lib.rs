//! # rao-linear: Linear Remedial Action Optimisation
//!
//! Builds and solves the LP/MIP choosing range action setpoints (PST angles,
//! HVDC and injection setpoints) that maximise the worst margin of the
//! critical network elements of one optimisation perimeter.
//!
//! ## Architecture
//!
//! The model is assembled by independent **problem fillers**, each owning one
//! slice of the variables and constraints:
//!
//! | Filler | Adds |
//! |--------|------|
//! | [`fillers::CoreProblemFiller`] | linearised flows, setpoints, ranges, activation penalties |
//! | [`fillers::ContinuousRangeActionGroupFiller`] | aligned setpoints of grouped range actions |
//! | [`fillers::DiscretePstTapFiller`] | integer tap variations of PSTs |
//! | [`fillers::DiscretePstGroupFiller`] | aligned taps of grouped PSTs |
//! | [`fillers::MaxMinMarginFiller`] | worst margin objective |
//! | [`fillers::MaxMinRelativeMarginFiller`] | worst relative margin objective |
//! | [`fillers::MnecFiller`] | monitored elements with violation costs |
//! | [`fillers::MaxLoopFlowFiller`] | loop-flow limits with violation costs |
//! | [`fillers::UnoptimizedCnecFiller`] | CNECs left out of the objective |
//! | [`fillers::RaUsageLimitsFiller`] | caps on the number of activated range actions |
//!
//! - **[`LinearProblem`]**: sparse model addressed by structural keys, solved through `good_lp`
//! - **[`LinearProblemBuilder`]**: picks the fillers from the parameters, in their fixed order
//! - **[`FillerPipeline`]**: runs the fillers on one model
//! - **[`IteratingLinearOptimizer`]**: solves and re-linearises until the cost stops improving
//!
//! ## Solver backends
//!
//! | Feature | Backend | Notes |
//! |---------|---------|-------|
//! | `solver-microlp` (default) | microlp | pure Rust, integer variables supported |
//! | `solver-highs` | HiGHS | native, needs a C++ toolchain |
//!
//! ## Example
//!
//! ```
//! use rao_core::*;
//! use rao_linear::*;
//!
//! let preventive = State::preventive(Instant::preventive("preventive"));
//! let table = TapToAngleConversion::from_pairs((-16..=16).map(|t| (t, 0.5 * t as f64)))?;
//! let pst = RangeAction::pst("pst1", table, 0).with_tap_range(TapRange::new(RangeType::Absolute, -10, 10));
//! let perimeter = OptimizationPerimeter::new(preventive.clone())
//!     .with_flow_cnec(
//!         FlowCnec::new("cnec1", "line1", preventive.clone())
//!             .with_threshold(BranchThreshold::new(Side::One, Unit::Megawatt, Some(-1000.0), Some(1000.0)))
//!             .with_optimized(true),
//!     )
//!     .with_range_action(preventive.clone(), pst);
//! let pre = RangeActionSetpoints::initial(perimeter.range_actions_per_state().map(|(_, ra)| ra));
//! let flows = FlowResults::new().with_flow("cnec1", Side::One, 1200.0);
//! let sensitivities = SensitivityResults::new().with_sensitivity("cnec1", Side::One, "pst1", -50.0);
//! let parameters = LinearOptimizerParameters::default();
//!
//! let builder = LinearProblemBuilder::new(&perimeter, &pre, &parameters);
//! let mut pipeline = builder.build()?;
//! let mut lp = builder.new_problem();
//! pipeline.fill(&mut lp, &flows, &sensitivities, &pre)?;
//! assert_eq!(lp.solve()?, LinearProblemStatus::Optimal);
//!
//! let activation = activation_from_solution(&lp, &perimeter, &pre)?;
//! let setpoint = activation.optimized_setpoint(&perimeter.range_actions(&preventive)[0], &preventive)?;
//! assert!(setpoint >= 4.0);
//! # Ok::<(), RaoError>(())
//! ```

#[cfg(not(any(feature = "solver-microlp", feature = "solver-highs")))]
compile_error!("rao-linear needs a solver backend: enable `solver-microlp` or `solver-highs`");

pub mod builder;
pub mod fillers;
pub mod inputs;
pub mod iterating;
pub mod linear_problem;
pub mod logging;
pub mod objective;
pub mod parameters;
pub mod perimeter;
pub mod pipeline;
pub mod result;

pub use builder::LinearProblemBuilder;
pub use fillers::ProblemFiller;
pub use inputs::{
    FlowResult, FlowResults, RangeActionActivation, RangeActionActivationResult, RangeActionSetpoints,
    SensitivityResult, SensitivityResults,
};
pub use iterating::{IteratingLinearOptimizer, IteratingLinearOptimizerResult, SensitivityComputer};
pub use linear_problem::{ConstraintKey, LinearProblem, LinearProblemStatus, VariableKey, VariableKind};
pub use objective::{ObjectiveFunction, ObjectiveFunctionResult};
pub use parameters::{
    LinearOptimizerParameters, LoopFlowParameters, MnecParameters, ObjectiveFunctionParameters,
    ObjectiveFunctionType, PstModel, PtdfApproximation, RaUsageLimits, RangeActionsOptimizationParameters,
    RelativeMarginParameters, SolverBackend, SolverParameters, UnoptimizedCnecParameters,
};
pub use perimeter::OptimizationPerimeter;
pub use pipeline::FillerPipeline;
pub use result::{activation_from_solution, round_pst_setpoints};
