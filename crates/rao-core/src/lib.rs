//! # rao-core: Remedial Action Optimisation Data Model
//!
//! Provides the read-only domain objects consumed by the linear optimisation
//! crate (`rao-linear`): grid states, monitored elements (CNECs) and range
//! actions (phase-shifting transformers, HVDC links, injections).
//!
//! ## Design Philosophy
//!
//! All entities are created by upstream layers (CRAC import, network model)
//! before the optimisation runs. The optimisation never creates or mutates
//! them; it only reads thresholds, ranges and tap tables to build its model.
//!
//! - **States** order remedial actions and CNECs in time (preventive, outage,
//!   auto, curative instants, with or without a contingency)
//! - **CNECs** carry flow thresholds in MW, A or %Imax and the
//!   optimised/monitored role of the element
//! - **Range actions** are a tagged sum type over their variants, each with
//!   its own ranges and, for PSTs, a tap-to-angle table
//!
//! ## Quick Start
//!
//! ```
//! use rao_core::*;
//!
//! let preventive = State::preventive(Instant::preventive("preventive"));
//!
//! let cnec = FlowCnec::new("cnec-be-fr", "line-be-fr", preventive.clone())
//!     .with_threshold(BranchThreshold::new(Side::One, Unit::Megawatt, Some(-1000.0), Some(1000.0)))
//!     .with_optimized(true);
//! assert_eq!(cnec.upper_bound(Side::One, Unit::Megawatt), Some(1000.0));
//!
//! let table = TapToAngleConversion::from_pairs((-16..=16).map(|t| (t, 0.5 * t as f64))).unwrap();
//! let pst = RangeAction::pst("pst-be", table, 0)
//!     .with_tap_range(TapRange::new(RangeType::Absolute, -10, 10));
//! assert_eq!(pst.max_admissible_setpoint(0.0), 5.0);
//! ```
//!
//! ## Identifiers
//!
//! Every entity is identified by a string newtype ([`CnecId`],
//! [`RangeActionId`], [`NetworkElementId`], [`ContingencyId`], [`OperatorId`],
//! [`GroupId`]) so that ids of different kinds cannot be confused.

use serde::{Deserialize, Serialize};

pub mod cnec;
pub mod error;
pub mod range_action;
pub mod state;
pub mod units;

pub use cnec::{BranchThreshold, FlowCnec, LoopFlowThreshold, Side};
pub use error::{RaoError, RaoResult};
pub use range_action::{
    RangeAction, RangeActionKind, RangeActionVariant, RangeType, SetpointBounds, StandardRange,
    TapRange, TapToAngleConversion,
};
pub use state::{Instant, InstantKind, State};
pub use units::{Amperes, Kilovolts, Megawatts, Unit};

/// Macro to declare a string identifier newtype
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            #[inline]
            pub fn new(value: impl Into<String>) -> Self {
                $name(value.into())
            }
            #[inline]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                $name(value.to_string())
            }
        }
    };
}

string_id!(
    /// Identifier of a flow CNEC (critical network element + state)
    CnecId
);
string_id!(
    /// Identifier of a remedial action
    RangeActionId
);
string_id!(
    /// Identifier of a network element (branch, transformer, HVDC line, generator)
    NetworkElementId
);
string_id!(ContingencyId);
string_id!(
    /// Identifier of a transmission system operator
    OperatorId
);
string_id!(
    /// Identifier of an alignment group of range actions
    GroupId
);
