//! Problem fillers.
//!
//! Each filler owns one slice of the linear problem: it creates its variables
//! and constraints in [`ProblemFiller::fill`] and refreshes them when new
//! flows and sensitivities are available
//! ([`ProblemFiller::update_between_sensi_iteration`]) or after a MIP solve
//! ([`ProblemFiller::update_between_mip_iteration`]).
//!
//! # Dependencies between fillers
//!
//! | Filler | Reads variables of |
//! |--------|--------------------|
//! | [`CoreProblemFiller`] | (none) |
//! | [`ContinuousRangeActionGroupFiller`] | core |
//! | [`DiscretePstTapFiller`] | core |
//! | [`DiscretePstGroupFiller`] | discrete tap |
//! | [`MaxMinMarginFiller`], [`MaxMinRelativeMarginFiller`] | core |
//! | [`MnecFiller`], [`MaxLoopFlowFiller`] | core |
//! | [`UnoptimizedCnecFiller`] | core, max-min margin |
//! | [`RaUsageLimitsFiller`] | core, discrete tap (elementary actions) |
//!
//! A filler reading a variable it did not create gets
//! [`RaoError::UndefinedHandle`](rao_core::RaoError::UndefinedHandle) when
//! run out of order.

mod continuous_group;
mod core_problem;
mod discrete_pst_group;
mod discrete_tap;
mod max_loop_flow;
mod max_min_margin;
mod max_min_relative_margin;
mod mnec;
mod ra_usage_limits;
mod unoptimized_cnec;

pub use continuous_group::ContinuousRangeActionGroupFiller;
pub use core_problem::{CoreProblemFiller, RANGE_ACTION_SETPOINT_EPSILON, RANGE_SHRINK_RATE};
pub use discrete_pst_group::DiscretePstGroupFiller;
pub use discrete_tap::DiscretePstTapFiller;
pub use max_loop_flow::MaxLoopFlowFiller;
pub use max_min_margin::MaxMinMarginFiller;
pub use max_min_relative_margin::MaxMinRelativeMarginFiller;
pub use mnec::MnecFiller;
pub use ra_usage_limits::RaUsageLimitsFiller;
pub use unoptimized_cnec::{UnoptimizedCnecFiller, UnoptimizedCnecRule};

use crate::inputs::{FlowResult, RangeActionActivationResult, SensitivityResult};
use crate::linear_problem::LinearProblem;
use rao_core::RaoResult;

/// One slice of the linear problem.
pub trait ProblemFiller {
    fn name(&self) -> &'static str;

    /// Create the variables, constraints and objective terms of this filler.
    fn fill(
        &mut self,
        lp: &mut LinearProblem,
        flows: &dyn FlowResult,
        sensitivities: &dyn SensitivityResult,
        activation: &dyn RangeActionActivationResult,
    ) -> RaoResult<()>;

    /// Refresh after a new sensitivity computation.
    fn update_between_sensi_iteration(
        &mut self,
        _lp: &mut LinearProblem,
        _flows: &dyn FlowResult,
        _sensitivities: &dyn SensitivityResult,
        _activation: &dyn RangeActionActivationResult,
    ) -> RaoResult<()> {
        Ok(())
    }

    /// Refresh after a MIP solve, around the newly solved setpoints.
    fn update_between_mip_iteration(
        &mut self,
        _lp: &mut LinearProblem,
        _activation: &dyn RangeActionActivationResult,
    ) -> RaoResult<()> {
        Ok(())
    }
}
