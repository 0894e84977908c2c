//! Structural keys of variables and constraints.
//!
//! A key names the domain entity a model element is attached to (CNEC side,
//! range action in a state, group in a state, operator in a state) plus an
//! optional extension tag. Keys, not handles, are what fillers hold on to: a
//! filler re-fetches the handle from the [`LinearProblem`](super::LinearProblem)
//! on every call.

use rao_core::{CnecId, GroupId, OperatorId, RangeActionId, Side, State};
use std::fmt;

/// Sign of an absolute-value linearisation constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AbsExtension {
    Positive,
    Negative,
}

/// Direction of a setpoint or tap variation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VariationDirection {
    Upward,
    Downward,
}

impl VariationDirection {
    pub const ALL: [VariationDirection; 2] = [VariationDirection::Upward, VariationDirection::Downward];
}

/// Threshold a margin constraint is written against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MarginExtension {
    BelowThreshold,
    AboveThreshold,
}

impl MarginExtension {
    pub const ALL: [MarginExtension; 2] = [MarginExtension::BelowThreshold, MarginExtension::AboveThreshold];
}

/// Bound a violation constraint is written against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BoundExtension {
    LowerBound,
    UpperBound,
}

/// Whether a relative setpoint constraint comes from range shrinking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RaRangeShrinking {
    Enabled,
    Disabled,
}

impl fmt::Display for AbsExtension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbsExtension::Positive => write!(f, "positive"),
            AbsExtension::Negative => write!(f, "negative"),
        }
    }
}

impl fmt::Display for VariationDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariationDirection::Upward => write!(f, "upward"),
            VariationDirection::Downward => write!(f, "downward"),
        }
    }
}

impl fmt::Display for MarginExtension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarginExtension::BelowThreshold => write!(f, "below threshold"),
            MarginExtension::AboveThreshold => write!(f, "above threshold"),
        }
    }
}

impl fmt::Display for BoundExtension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundExtension::LowerBound => write!(f, "lower bound"),
            BoundExtension::UpperBound => write!(f, "upper bound"),
        }
    }
}

/// Identity of a model variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VariableKey {
    /// Flow on a CNEC side, in MW
    Flow { cnec: CnecId, side: Side },
    /// Setpoint of a range action in a state
    RangeActionSetpoint { ra: RangeActionId, state: State },
    /// Absolute variation of a range action setpoint
    AbsoluteRangeActionVariation { ra: RangeActionId, state: State },
    /// Setpoint shared by an alignment group
    RangeActionGroupSetpoint { group: GroupId, state: State },
    /// Integer tap variation of a PST in one direction
    PstTapVariation {
        ra: RangeActionId,
        state: State,
        direction: VariationDirection,
    },
    /// Whether the PST tap moves in that direction
    PstTapVariationBinary {
        ra: RangeActionId,
        state: State,
        direction: VariationDirection,
    },
    /// Tap shared by a PST alignment group
    PstGroupTap { group: GroupId, state: State },
    MinimumMargin,
    MinimumRelativeMargin,
    /// Whether the minimum margin is positive
    MinimumRelativeMarginSignBinary,
    MnecViolation { cnec: CnecId, side: Side },
    LoopFlowViolation { cnec: CnecId, side: Side },
    /// Whether an unoptimized CNEC side is released from the margin constraints
    OptimizeCnecBinary { cnec: CnecId, side: Side },
    /// Whether a range action moves away from its reference setpoint
    RangeActionVariationBinary { ra: RangeActionId, state: State },
    /// Whether an operator uses at least one range action
    TsoRaUsed { operator: OperatorId, state: State },
    /// Whether an operator uses a range action in this state or an earlier
    /// curative state of the same contingency
    TsoRaUsedCumulative { operator: OperatorId, state: State },
    /// Number of taps between a PST and its pre-perimeter tap
    PstAbsoluteVariationFromInitialTap { ra: RangeActionId, state: State },
}

impl VariableKey {
    pub fn flow(cnec: &CnecId, side: Side) -> Self {
        VariableKey::Flow {
            cnec: cnec.clone(),
            side,
        }
    }

    pub fn setpoint(ra: &RangeActionId, state: &State) -> Self {
        VariableKey::RangeActionSetpoint {
            ra: ra.clone(),
            state: state.clone(),
        }
    }

    pub fn absolute_variation(ra: &RangeActionId, state: &State) -> Self {
        VariableKey::AbsoluteRangeActionVariation {
            ra: ra.clone(),
            state: state.clone(),
        }
    }

    pub fn tap_variation(ra: &RangeActionId, state: &State, direction: VariationDirection) -> Self {
        VariableKey::PstTapVariation {
            ra: ra.clone(),
            state: state.clone(),
            direction,
        }
    }

    pub fn tap_variation_binary(ra: &RangeActionId, state: &State, direction: VariationDirection) -> Self {
        VariableKey::PstTapVariationBinary {
            ra: ra.clone(),
            state: state.clone(),
            direction,
        }
    }

    pub fn variation_binary(ra: &RangeActionId, state: &State) -> Self {
        VariableKey::RangeActionVariationBinary {
            ra: ra.clone(),
            state: state.clone(),
        }
    }
}

impl fmt::Display for VariableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Variable ")?;
        match self {
            VariableKey::Flow { cnec, side } => write!(f, "{} (side {}) flow", cnec, side),
            VariableKey::RangeActionSetpoint { ra, state } => write!(f, "{} {} setpoint", ra, state),
            VariableKey::AbsoluteRangeActionVariation { ra, state } => {
                write!(f, "{} {} absolute variation", ra, state)
            }
            VariableKey::RangeActionGroupSetpoint { group, state } => {
                write!(f, "group {} {} setpoint", group, state)
            }
            VariableKey::PstTapVariation {
                ra,
                state,
                direction,
            } => write!(f, "{} {} {} tap variation", ra, state, direction),
            VariableKey::PstTapVariationBinary {
                ra,
                state,
                direction,
            } => write!(f, "{} {} {} tap variation binary", ra, state, direction),
            VariableKey::PstGroupTap { group, state } => write!(f, "group {} {} tap", group, state),
            VariableKey::MinimumMargin => write!(f, "minimum margin"),
            VariableKey::MinimumRelativeMargin => write!(f, "minimum relative margin"),
            VariableKey::MinimumRelativeMarginSignBinary => write!(f, "minimum relative margin sign binary"),
            VariableKey::MnecViolation { cnec, side } => write!(f, "{} (side {}) MNEC violation", cnec, side),
            VariableKey::LoopFlowViolation { cnec, side } => {
                write!(f, "{} (side {}) loop-flow violation", cnec, side)
            }
            VariableKey::OptimizeCnecBinary { cnec, side } => {
                write!(f, "{} (side {}) optimize cnec binary", cnec, side)
            }
            VariableKey::RangeActionVariationBinary { ra, state } => {
                write!(f, "{} {} variation binary", ra, state)
            }
            VariableKey::TsoRaUsed { operator, state } => write!(f, "{} {} TSO RA used", operator, state),
            VariableKey::TsoRaUsedCumulative { operator, state } => {
                write!(f, "{} {} TSO RA used cumulative", operator, state)
            }
            VariableKey::PstAbsoluteVariationFromInitialTap { ra, state } => {
                write!(f, "{} {} absolute variation from initial tap", ra, state)
            }
        }
    }
}

/// Identity of a model constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConstraintKey {
    /// Sensitivity-based flow linearisation
    Flow { cnec: CnecId, side: Side },
    AbsoluteRangeActionVariation {
        ra: RangeActionId,
        state: State,
        sign: AbsExtension,
    },
    /// Setpoint of a state relative to the same device in an earlier state,
    /// or relative to the previous iteration when shrinking
    RangeActionRelativeSetpoint {
        ra: RangeActionId,
        state: State,
        shrinking: RaRangeShrinking,
    },
    RangeActionGroupSetpoint {
        ra: RangeActionId,
        group: GroupId,
        state: State,
    },
    PstGroupTap {
        ra: RangeActionId,
        group: GroupId,
        state: State,
    },
    TapToAngleConversion { ra: RangeActionId, state: State },
    /// At most one tap variation direction
    UpOrDownPstVariation { ra: RangeActionId, state: State },
    /// Tap variation allowed only when its binary is set
    IsVariationInDirection {
        ra: RangeActionId,
        state: State,
        direction: VariationDirection,
    },
    /// Tap of a state relative to the same PST in an earlier state
    PstRelativeTap { ra: RangeActionId, state: State },
    MinimumMargin {
        cnec: CnecId,
        side: Side,
        margin: MarginExtension,
    },
    MinimumRelativeMargin {
        cnec: CnecId,
        side: Side,
        margin: MarginExtension,
    },
    /// Relative margin forced to zero when the sign binary is off
    MinimumRelMarginSetToZero,
    MinimumRelativeMarginSignDefinition,
    MnecFlow {
        cnec: CnecId,
        side: Side,
        margin: MarginExtension,
    },
    MaxLoopFlow {
        cnec: CnecId,
        side: Side,
        bound: BoundExtension,
    },
    DontOptimizeCnec {
        cnec: CnecId,
        side: Side,
        margin: MarginExtension,
    },
    /// Setpoint may leave its reference value only when the binary is set
    IsVariation { ra: RangeActionId, state: State },
    /// Net injection of the injection range actions of a state is unchanged
    InjectionBalance { state: State },
    MaxRa { state: State },
    MaxTso { state: State },
    TsoRaUsed {
        operator: OperatorId,
        ra: RangeActionId,
        state: State,
    },
    /// Cumulative usage covers the usage in `used_in`
    TsoRaUsedCumulative {
        operator: OperatorId,
        state: State,
        used_in: State,
    },
    MaxRaPerTso { operator: OperatorId, state: State },
    MaxPstPerTso { operator: OperatorId, state: State },
    PstAbsoluteVariationFromInitialTap {
        ra: RangeActionId,
        state: State,
        sign: AbsExtension,
    },
    MaxElementaryActionsPerTso { operator: OperatorId, state: State },
}

impl ConstraintKey {
    pub fn flow(cnec: &CnecId, side: Side) -> Self {
        ConstraintKey::Flow {
            cnec: cnec.clone(),
            side,
        }
    }

    pub fn minimum_margin(cnec: &CnecId, side: Side, margin: MarginExtension) -> Self {
        ConstraintKey::MinimumMargin {
            cnec: cnec.clone(),
            side,
            margin,
        }
    }

    pub fn minimum_relative_margin(cnec: &CnecId, side: Side, margin: MarginExtension) -> Self {
        ConstraintKey::MinimumRelativeMargin {
            cnec: cnec.clone(),
            side,
            margin,
        }
    }
}

impl fmt::Display for ConstraintKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Constraint ")?;
        match self {
            ConstraintKey::Flow { cnec, side } => write!(f, "{} (side {}) flow", cnec, side),
            ConstraintKey::AbsoluteRangeActionVariation { ra, state, sign } => {
                write!(f, "{} {} absolute variation {}", ra, state, sign)
            }
            ConstraintKey::RangeActionRelativeSetpoint {
                ra,
                state,
                shrinking,
            } => match shrinking {
                RaRangeShrinking::Enabled => write!(f, "{} {} iterative relative setpoint", ra, state),
                RaRangeShrinking::Disabled => write!(f, "{} {} relative setpoint", ra, state),
            },
            ConstraintKey::RangeActionGroupSetpoint { ra, group, state } => {
                write!(f, "{} group {} {} setpoint", ra, group, state)
            }
            ConstraintKey::PstGroupTap { ra, group, state } => write!(f, "{} group {} {} tap", ra, group, state),
            ConstraintKey::TapToAngleConversion { ra, state } => {
                write!(f, "{} {} tap to angle conversion", ra, state)
            }
            ConstraintKey::UpOrDownPstVariation { ra, state } => {
                write!(f, "{} {} up or down variation", ra, state)
            }
            ConstraintKey::IsVariationInDirection {
                ra,
                state,
                direction,
            } => write!(f, "{} {} is {} variation", ra, state, direction),
            ConstraintKey::PstRelativeTap { ra, state } => write!(f, "{} {} relative tap", ra, state),
            ConstraintKey::MinimumMargin { cnec, side, margin } => {
                write!(f, "{} (side {}) minimum margin {}", cnec, side, margin)
            }
            ConstraintKey::MinimumRelativeMargin { cnec, side, margin } => {
                write!(f, "{} (side {}) minimum relative margin {}", cnec, side, margin)
            }
            ConstraintKey::MinimumRelMarginSetToZero => write!(f, "minimum relative margin set to zero"),
            ConstraintKey::MinimumRelativeMarginSignDefinition => {
                write!(f, "minimum relative margin sign definition")
            }
            ConstraintKey::MnecFlow { cnec, side, margin } => {
                write!(f, "{} (side {}) MNEC flow {}", cnec, side, margin)
            }
            ConstraintKey::MaxLoopFlow { cnec, side, bound } => {
                write!(f, "{} (side {}) max loop-flow {}", cnec, side, bound)
            }
            ConstraintKey::DontOptimizeCnec { cnec, side, margin } => {
                write!(f, "{} (side {}) dont optimize {}", cnec, side, margin)
            }
            ConstraintKey::IsVariation { ra, state } => write!(f, "{} {} is variation", ra, state),
            ConstraintKey::InjectionBalance { state } => write!(f, "injection balance {}", state),
            ConstraintKey::MaxRa { state } => write!(f, "max RA {}", state),
            ConstraintKey::MaxTso { state } => write!(f, "max TSO {}", state),
            ConstraintKey::TsoRaUsed { operator, ra, state } => {
                write!(f, "{} {} {} TSO RA used", operator, ra, state)
            }
            ConstraintKey::MaxRaPerTso { operator, state } => write!(f, "max RA per TSO {} {}", operator, state),
            ConstraintKey::MaxPstPerTso { operator, state } => write!(f, "max PST per TSO {} {}", operator, state),
            ConstraintKey::TsoRaUsedCumulative {
                operator,
                state,
                used_in,
            } => write!(f, "{} {} TSO RA used cumulative (used in {})", operator, state, used_in),
            ConstraintKey::PstAbsoluteVariationFromInitialTap { ra, state, sign } => {
                write!(f, "{} {} absolute variation from initial tap {}", ra, state, sign)
            }
            ConstraintKey::MaxElementaryActionsPerTso { operator, state } => {
                write!(f, "max elementary actions per TSO {} {}", operator, state)
            }
        }
    }
}
