//! Physical units used by flow thresholds and margins.
//!
//! Flow variables of the linear problem are always expressed in megawatts.
//! Thresholds, margins and penalties may be given in other units, so every
//! conversion goes through this module.
//!
//! # Flow unit conversion
//!
//! | From | To | Multiplier |
//! |------|----|------------|
//! | A | MW | `U_nom · √3 / 1000` |
//! | MW | A | `1000 / (U_nom · √3)` |
//! | %Imax | A | `Imax / 100` |
//!
//! `U_nom` is the nominal voltage of the monitored branch side in kV.
//!
//! # Usage
//!
//! ```
//! use rao_core::units::{Amperes, Kilovolts, Megawatts};
//!
//! let limit = Amperes(1000.0);
//! let mw = limit.to_megawatts(Kilovolts(400.0));
//! assert!((mw.value() - 692.82).abs() < 0.01);
//! ```

use serde::{Deserialize, Serialize};
use std::ops::{Add, Div, Mul, Neg, Sub};

/// Macro to implement common arithmetic operations for unit types
macro_rules! impl_unit_ops {
    ($type:ty, $unit_name:literal) => {
        impl Add for $type {
            type Output = Self;
            fn add(self, rhs: Self) -> Self::Output {
                Self(self.0 + rhs.0)
            }
        }

        impl Sub for $type {
            type Output = Self;
            fn sub(self, rhs: Self) -> Self::Output {
                Self(self.0 - rhs.0)
            }
        }

        impl Neg for $type {
            type Output = Self;
            fn neg(self) -> Self::Output {
                Self(-self.0)
            }
        }

        impl Mul<f64> for $type {
            type Output = Self;
            fn mul(self, rhs: f64) -> Self::Output {
                Self(self.0 * rhs)
            }
        }

        impl Div<f64> for $type {
            type Output = Self;
            fn div(self, rhs: f64) -> Self::Output {
                Self(self.0 / rhs)
            }
        }

        impl std::fmt::Display for $type {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{:.2} {}", self.0, $unit_name)
            }
        }

        impl $type {
            /// Create a new value
            #[inline]
            pub const fn new(value: f64) -> Self {
                Self(value)
            }

            /// Get the raw numeric value
            #[inline]
            pub const fn value(self) -> f64 {
                self.0
            }

            /// Absolute value
            #[inline]
            pub fn abs(self) -> Self {
                Self(self.0.abs())
            }
        }
    };
}

/// Active power flow in megawatts (MW)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Megawatts(pub f64);

impl_unit_ops!(Megawatts, "MW");

/// Current in amperes (A)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Amperes(pub f64);

impl_unit_ops!(Amperes, "A");

/// Voltage in kilovolts (kV)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Kilovolts(pub f64);

impl_unit_ops!(Kilovolts, "kV");

impl Amperes {
    /// Active power carried by this current on a three-phase branch.
    #[inline]
    pub fn to_megawatts(self, nominal_voltage: Kilovolts) -> Megawatts {
        Megawatts(self.0 * ampere_to_megawatt_multiplier(nominal_voltage))
    }
}

impl Megawatts {
    /// Current matching this active power on a three-phase branch.
    #[inline]
    pub fn to_amperes(self, nominal_voltage: Kilovolts) -> Amperes {
        Amperes(self.0 / ampere_to_megawatt_multiplier(nominal_voltage))
    }
}

#[inline]
fn ampere_to_megawatt_multiplier(nominal_voltage: Kilovolts) -> f64 {
    nominal_voltage.0 * 3f64.sqrt() / 1000.0
}

/// Unit in which thresholds, setpoints and objective terms are expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    Megawatt,
    Ampere,
    /// Percentage of the permanent admissible current of the branch
    PercentImax,
    Degree,
    Tap,
}

impl Unit {
    /// Whether this unit can express a branch flow.
    pub fn is_flow_unit(&self) -> bool {
        matches!(self, Unit::Megawatt | Unit::Ampere | Unit::PercentImax)
    }
}

impl std::fmt::Display for Unit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Unit::Megawatt => write!(f, "MW"),
            Unit::Ampere => write!(f, "A"),
            Unit::PercentImax => write!(f, "%Imax"),
            Unit::Degree => write!(f, "°"),
            Unit::Tap => write!(f, "tap"),
        }
    }
}

/// Multiplier turning a flow expressed in `from` into a flow expressed in `to`.
///
/// Returns `None` when one of the units is not a flow unit, or when a
/// `PercentImax` conversion is requested without `imax`.
pub fn flow_unit_multiplier(
    from: Unit,
    to: Unit,
    nominal_voltage: Kilovolts,
    imax: Option<Amperes>,
) -> Option<f64> {
    if !from.is_flow_unit() || !to.is_flow_unit() {
        return None;
    }
    // Everything goes through amperes
    let to_amperes = |unit: Unit| -> Option<f64> {
        match unit {
            Unit::Ampere => Some(1.0),
            Unit::Megawatt => Some(1.0 / ampere_to_megawatt_multiplier(nominal_voltage)),
            Unit::PercentImax => imax.map(|i| i.0 / 100.0),
            _ => None,
        }
    };
    if from == to {
        return Some(1.0);
    }
    Some(to_amperes(from)? / to_amperes(to)?)
}
