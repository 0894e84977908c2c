use serde::{Deserialize, Serialize};

/// Outcome of a linear problem solve, or of a whole iterating optimisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinearProblemStatus {
    /// Proven optimal.
    Optimal,
    /// A feasible, possibly sub-optimal, solution is available.
    Feasible,
    Infeasible,
    Unbounded,
    /// Solver failed for another reason.
    Abnormal,
    /// No solve has been attempted yet.
    NotSolved,
    /// Iterating optimisation stopped on its iteration cap.
    MaxIterationReached,
    /// Iterating optimisation could not recompute sensitivities.
    SensitivityComputationFailed,
}

impl LinearProblemStatus {
    /// Whether solution values can be read.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            LinearProblemStatus::Optimal
                | LinearProblemStatus::Feasible
                | LinearProblemStatus::MaxIterationReached
        )
    }
}

impl std::fmt::Display for LinearProblemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinearProblemStatus::Optimal => write!(f, "optimal"),
            LinearProblemStatus::Feasible => write!(f, "feasible"),
            LinearProblemStatus::Infeasible => write!(f, "infeasible"),
            LinearProblemStatus::Unbounded => write!(f, "unbounded"),
            LinearProblemStatus::Abnormal => write!(f, "abnormal"),
            LinearProblemStatus::NotSolved => write!(f, "not_solved"),
            LinearProblemStatus::MaxIterationReached => write!(f, "max_iteration_reached"),
            LinearProblemStatus::SensitivityComputationFailed => {
                write!(f, "sensitivity_computation_failed")
            }
        }
    }
}
