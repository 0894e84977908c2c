//! Range actions: remedial actions with a continuous or tap setpoint.
//!
//! # Variants
//!
//! | Variant | Setpoint | Ranges |
//! |---------|----------|--------|
//! | PST | phase angle (°), discrete taps | [`TapRange`] |
//! | HVDC | active power setpoint (MW) | [`StandardRange`] |
//! | Injection | injected power (MW) | [`StandardRange`] |
//!
//! # Range intersection
//!
//! Ranges of every [`RangeType`] intersect: the admissible minimum is the max
//! of all lower bounds, the admissible maximum the min of all upper bounds.
//!
//! - `Absolute` bounds the setpoint directly
//! - `RelativeToInitialNetwork` is shifted by the initial network setpoint
//! - `RelativeToPreviousInstant` is shifted by the setpoint of the previous
//!   instant, and becomes a relative constraint between two states when the
//!   same device is optimised in both
//!
//! PST ranges are expressed in taps and converted to angles through the
//! [`TapToAngleConversion`] table. The table is monotonic in neither
//! direction, so admissible angles are the extremes of the table over the
//! admissible tap window.

use crate::{GroupId, NetworkElementId, OperatorId, RangeActionId, RaoError, RaoResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeType {
    Absolute,
    RelativeToInitialNetwork,
    RelativeToPreviousInstant,
}

/// Continuous range of an HVDC or injection range action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardRange {
    pub range_type: RangeType,
    pub min: f64,
    pub max: f64,
}

impl StandardRange {
    pub fn new(range_type: RangeType, min: f64, max: f64) -> Self {
        Self {
            range_type,
            min,
            max,
        }
    }
}

/// Tap range of a PST range action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TapRange {
    pub range_type: RangeType,
    pub min_tap: i32,
    pub max_tap: i32,
}

impl TapRange {
    pub fn new(range_type: RangeType, min_tap: i32, max_tap: i32) -> Self {
        Self {
            range_type,
            min_tap,
            max_tap,
        }
    }
}

/// Tap to angle lookup table of a phase-shifting transformer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<i32, f64>", into = "BTreeMap<i32, f64>")]
pub struct TapToAngleConversion {
    angles: BTreeMap<i32, f64>,
}

impl TryFrom<BTreeMap<i32, f64>> for TapToAngleConversion {
    type Error = RaoError;

    fn try_from(angles: BTreeMap<i32, f64>) -> RaoResult<Self> {
        if angles.is_empty() {
            return Err(RaoError::Validation(
                "tap to angle conversion table is empty".to_string(),
            ));
        }
        if let Some((tap, angle)) = angles.iter().find(|(_, angle)| !angle.is_finite()) {
            return Err(RaoError::Validation(format!(
                "tap {} has a non finite angle {}",
                tap, angle
            )));
        }
        Ok(Self { angles })
    }
}

impl From<TapToAngleConversion> for BTreeMap<i32, f64> {
    fn from(conversion: TapToAngleConversion) -> Self {
        conversion.angles
    }
}

impl TapToAngleConversion {
    pub fn from_pairs(pairs: impl IntoIterator<Item = (i32, f64)>) -> RaoResult<Self> {
        Self::try_from(pairs.into_iter().collect::<BTreeMap<_, _>>())
    }

    pub fn min_tap(&self) -> i32 {
        self.angles.keys().next().copied().unwrap_or_default()
    }

    pub fn max_tap(&self) -> i32 {
        self.angles.keys().next_back().copied().unwrap_or_default()
    }

    pub fn angle(&self, tap: i32) -> Option<f64> {
        self.angles.get(&tap).copied()
    }

    /// Angle of `tap`, or an error naming the missing tap.
    pub fn angle_or_err(&self, tap: i32) -> RaoResult<f64> {
        self.angle(tap)
            .ok_or_else(|| RaoError::MissingInput(format!("tap {} is not in the conversion table", tap)))
    }

    /// Tap whose angle is the closest to `angle` (lowest tap on ties).
    pub fn closest_tap(&self, angle: f64) -> i32 {
        self.angles
            .iter()
            .min_by(|(_, a), (_, b)| {
                (*a - angle)
                    .abs()
                    .partial_cmp(&(*b - angle).abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(tap, _)| *tap)
            .unwrap_or_default()
    }

    /// Smallest absolute angle difference between two consecutive taps.
    pub fn smallest_angle_step(&self) -> f64 {
        self.steps().fold(f64::INFINITY, f64::min)
    }

    /// Angle amplitude of the table divided by its tap amplitude.
    pub fn average_absolute_step(&self) -> f64 {
        let taps = (self.max_tap() - self.min_tap()) as f64;
        if taps == 0.0 {
            return 0.0;
        }
        let (min, max) = self
            .angles
            .values()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), a| (lo.min(*a), hi.max(*a)));
        ((max - min) / taps).abs()
    }

    /// Min and max angle over taps `[min_tap, max_tap]`.
    pub fn angle_extremes(&self, min_tap: i32, max_tap: i32) -> (f64, f64) {
        let endpoints = [self.angle(min_tap), self.angle(max_tap)];
        endpoints
            .into_iter()
            .flatten()
            .chain(self.angles.range(min_tap..=max_tap.max(min_tap)).map(|(_, a)| *a))
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), a| (lo.min(a), hi.max(a)))
    }

    fn steps(&self) -> impl Iterator<Item = f64> + '_ {
        self.angles
            .iter()
            .zip(self.angles.iter().skip(1))
            .filter(|((t1, _), (t2, _))| *t2 - *t1 == 1)
            .map(|((_, a1), (_, a2))| (a2 - a1).abs())
    }
}

/// Variant of a range action, used to select per-variant parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeActionVariant {
    Pst,
    Hvdc,
    Injection,
}

impl std::fmt::Display for RangeActionVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RangeActionVariant::Pst => write!(f, "PST"),
            RangeActionVariant::Hvdc => write!(f, "HVDC"),
            RangeActionVariant::Injection => write!(f, "injection"),
        }
    }
}

/// Variant-specific data of a range action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RangeActionKind {
    Pst {
        tap_to_angle: TapToAngleConversion,
        initial_tap: i32,
        ranges: Vec<TapRange>,
    },
    Hvdc {
        initial_setpoint: f64,
        ranges: Vec<StandardRange>,
    },
    Injection {
        initial_setpoint: f64,
        ranges: Vec<StandardRange>,
    },
}

/// Absolute and relative-to-previous-instant setpoint bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SetpointBounds {
    pub min_absolute: f64,
    pub max_absolute: f64,
    pub min_relative: f64,
    pub max_relative: f64,
}

/// A remedial action whose setpoint can be moved within ranges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeAction {
    pub id: RangeActionId,
    pub name: String,
    pub operator: Option<OperatorId>,
    /// Range actions sharing a group must have identical setpoints
    pub group_id: Option<GroupId>,
    pub network_elements: BTreeSet<NetworkElementId>,
    pub kind: RangeActionKind,
}

impl RangeAction {
    pub fn new(id: impl Into<RangeActionId>, kind: RangeActionKind) -> Self {
        let id = id.into();
        Self {
            name: id.to_string(),
            network_elements: BTreeSet::from([NetworkElementId::new(id.as_str())]),
            id,
            operator: None,
            group_id: None,
            kind,
        }
    }

    pub fn pst(id: impl Into<RangeActionId>, tap_to_angle: TapToAngleConversion, initial_tap: i32) -> Self {
        Self::new(
            id,
            RangeActionKind::Pst {
                tap_to_angle,
                initial_tap,
                ranges: Vec::new(),
            },
        )
    }

    pub fn hvdc(id: impl Into<RangeActionId>, initial_setpoint: f64) -> Self {
        Self::new(
            id,
            RangeActionKind::Hvdc {
                initial_setpoint,
                ranges: Vec::new(),
            },
        )
    }

    pub fn injection(id: impl Into<RangeActionId>, initial_setpoint: f64) -> Self {
        Self::new(
            id,
            RangeActionKind::Injection {
                initial_setpoint,
                ranges: Vec::new(),
            },
        )
    }

    pub fn with_operator(mut self, operator: impl Into<OperatorId>) -> Self {
        self.operator = Some(operator.into());
        self
    }

    pub fn with_group(mut self, group: impl Into<GroupId>) -> Self {
        self.group_id = Some(group.into());
        self
    }

    pub fn with_network_elements<I, E>(mut self, elements: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<NetworkElementId>,
    {
        self.network_elements = elements.into_iter().map(Into::into).collect();
        self
    }

    /// Add a tap range. Ignored for non-PST range actions.
    pub fn with_tap_range(mut self, range: TapRange) -> Self {
        if let RangeActionKind::Pst { ranges, .. } = &mut self.kind {
            ranges.push(range);
        }
        self
    }

    /// Add a continuous range. Ignored for PST range actions.
    pub fn with_range(mut self, range: StandardRange) -> Self {
        match &mut self.kind {
            RangeActionKind::Hvdc { ranges, .. } | RangeActionKind::Injection { ranges, .. } => {
                ranges.push(range)
            }
            RangeActionKind::Pst { .. } => {}
        }
        self
    }

    pub fn variant(&self) -> RangeActionVariant {
        match self.kind {
            RangeActionKind::Pst { .. } => RangeActionVariant::Pst,
            RangeActionKind::Hvdc { .. } => RangeActionVariant::Hvdc,
            RangeActionKind::Injection { .. } => RangeActionVariant::Injection,
        }
    }

    pub fn is_pst(&self) -> bool {
        self.variant() == RangeActionVariant::Pst
    }

    /// Tap table and initial tap of a PST, or an error for other variants.
    pub fn as_pst(&self) -> RaoResult<(&TapToAngleConversion, i32)> {
        match &self.kind {
            RangeActionKind::Pst {
                tap_to_angle,
                initial_tap,
                ..
            } => Ok((tap_to_angle, *initial_tap)),
            _ => Err(RaoError::UnsupportedRangeAction(format!(
                "{} is a {} range action, a PST was expected",
                self.id,
                self.variant()
            ))),
        }
    }

    pub fn tap_to_angle(&self) -> RaoResult<&TapToAngleConversion> {
        self.as_pst().map(|(table, _)| table)
    }

    /// Setpoint of the initial network (angle of the initial tap for PSTs).
    pub fn initial_setpoint(&self) -> f64 {
        match &self.kind {
            RangeActionKind::Pst {
                tap_to_angle,
                initial_tap,
                ..
            } => tap_to_angle.angle(*initial_tap).unwrap_or(0.0),
            RangeActionKind::Hvdc {
                initial_setpoint, ..
            }
            | RangeActionKind::Injection {
                initial_setpoint, ..
            } => *initial_setpoint,
        }
    }

    /// Whether both range actions move the same physical device.
    pub fn acts_on_same_device(&self, other: &RangeAction) -> bool {
        self.id == other.id || self.network_elements == other.network_elements
    }

    /// Admissible tap window of a PST given the setpoint of the previous instant.
    ///
    /// Returns `None` for non-PST range actions.
    pub fn admissible_taps(&self, previous_setpoint: f64) -> Option<(i32, i32)> {
        let RangeActionKind::Pst {
            tap_to_angle,
            initial_tap,
            ranges,
        } = &self.kind
        else {
            return None;
        };
        let previous_tap = tap_to_angle.closest_tap(previous_setpoint);
        let (min, max) = ranges.iter().fold(
            (tap_to_angle.min_tap(), tap_to_angle.max_tap()),
            |(min, max), range| {
                let offset = match range.range_type {
                    RangeType::Absolute => 0,
                    RangeType::RelativeToInitialNetwork => *initial_tap,
                    RangeType::RelativeToPreviousInstant => previous_tap,
                };
                (min.max(offset + range.min_tap), max.min(offset + range.max_tap))
            },
        );
        Some((min, max))
    }

    pub fn min_admissible_setpoint(&self, previous_setpoint: f64) -> f64 {
        self.admissible_setpoints(previous_setpoint).0
    }

    pub fn max_admissible_setpoint(&self, previous_setpoint: f64) -> f64 {
        self.admissible_setpoints(previous_setpoint).1
    }

    fn admissible_setpoints(&self, previous_setpoint: f64) -> (f64, f64) {
        match &self.kind {
            RangeActionKind::Pst { tap_to_angle, .. } => {
                let (min_tap, max_tap) = self
                    .admissible_taps(previous_setpoint)
                    .unwrap_or((tap_to_angle.min_tap(), tap_to_angle.max_tap()));
                tap_to_angle.angle_extremes(min_tap, max_tap)
            }
            RangeActionKind::Hvdc {
                initial_setpoint,
                ranges,
            }
            | RangeActionKind::Injection {
                initial_setpoint,
                ranges,
            } => ranges.iter().fold(
                (f64::NEG_INFINITY, f64::INFINITY),
                |(min, max), range| {
                    let offset = match range.range_type {
                        RangeType::Absolute => 0.0,
                        RangeType::RelativeToInitialNetwork => *initial_setpoint,
                        RangeType::RelativeToPreviousInstant => previous_setpoint,
                    };
                    (min.max(offset + range.min), max.min(offset + range.max))
                },
            ),
        }
    }

    /// Bounds used when the same device is also optimised in an earlier state.
    ///
    /// Absolute bounds combine `Absolute` and `RelativeToInitialNetwork`
    /// ranges; relative bounds come from `RelativeToPreviousInstant` ranges
    /// (relative taps times the smallest angle step for PSTs).
    pub fn setpoint_bounds(&self) -> SetpointBounds {
        let mut bounds = SetpointBounds {
            min_absolute: f64::NEG_INFINITY,
            max_absolute: f64::INFINITY,
            min_relative: f64::NEG_INFINITY,
            max_relative: f64::INFINITY,
        };
        match &self.kind {
            RangeActionKind::Pst {
                tap_to_angle,
                initial_tap,
                ranges,
            } => {
                let mut min_tap = tap_to_angle.min_tap();
                let mut max_tap = tap_to_angle.max_tap();
                let mut min_relative_tap = f64::NEG_INFINITY;
                let mut max_relative_tap = f64::INFINITY;
                for range in ranges {
                    match range.range_type {
                        RangeType::Absolute => {
                            min_tap = min_tap.max(range.min_tap);
                            max_tap = max_tap.min(range.max_tap);
                        }
                        RangeType::RelativeToInitialNetwork => {
                            min_tap = min_tap.max(initial_tap + range.min_tap);
                            max_tap = max_tap.min(initial_tap + range.max_tap);
                        }
                        RangeType::RelativeToPreviousInstant => {
                            min_relative_tap = min_relative_tap.max(range.min_tap as f64);
                            max_relative_tap = max_relative_tap.min(range.max_tap as f64);
                        }
                    }
                }
                let (min_angle, max_angle) = tap_to_angle.angle_extremes(min_tap, max_tap);
                let step = tap_to_angle.smallest_angle_step();
                bounds.min_absolute = min_angle;
                bounds.max_absolute = max_angle;
                bounds.min_relative = relative_angle(min_relative_tap, step);
                bounds.max_relative = relative_angle(max_relative_tap, step);
            }
            RangeActionKind::Hvdc {
                initial_setpoint,
                ranges,
            }
            | RangeActionKind::Injection {
                initial_setpoint,
                ranges,
            } => {
                for range in ranges {
                    match range.range_type {
                        RangeType::Absolute => {
                            bounds.min_absolute = bounds.min_absolute.max(range.min);
                            bounds.max_absolute = bounds.max_absolute.min(range.max);
                        }
                        RangeType::RelativeToInitialNetwork => {
                            bounds.min_absolute = bounds.min_absolute.max(initial_setpoint + range.min);
                            bounds.max_absolute = bounds.max_absolute.min(initial_setpoint + range.max);
                        }
                        RangeType::RelativeToPreviousInstant => {
                            bounds.min_relative = bounds.min_relative.max(range.min);
                            bounds.max_relative = bounds.max_relative.min(range.max);
                        }
                    }
                }
            }
        }
        bounds
    }

    /// Relative-to-previous-instant tap window of a PST, if any.
    pub fn relative_tap_bounds(&self) -> Option<(i32, i32)> {
        let RangeActionKind::Pst { ranges, .. } = &self.kind else {
            return None;
        };
        ranges
            .iter()
            .filter(|r| r.range_type == RangeType::RelativeToPreviousInstant)
            .map(|r| (r.min_tap, r.max_tap))
            .reduce(|(lo, hi), (min, max)| (lo.max(min), hi.min(max)))
    }
}

/// Relative tap bound converted to degrees.
///
/// Unbounded stays unbounded; a table without consecutive taps cannot move,
/// so a finite bound becomes 0.
fn relative_angle(taps: f64, step: f64) -> f64 {
    if taps.is_infinite() {
        taps
    } else if step.is_finite() {
        taps * step
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_table() -> TapToAngleConversion {
        TapToAngleConversion::from_pairs((1..=33).map(|tap| (tap, (tap - 17) as f64 * 0.4)))
            .expect("valid table")
    }

    #[test]
    fn test_admissible_taps_intersect_ranges() {
        let pst = RangeAction::pst("pst", linear_table(), 10)
            .with_tap_range(TapRange::new(RangeType::Absolute, 1, 33))
            .with_tap_range(TapRange::new(RangeType::RelativeToInitialNetwork, -10, 10));

        let previous = linear_table().angle(10).expect("tap 10");
        assert_eq!(pst.admissible_taps(previous), Some((1, 20)));
        assert!((pst.min_admissible_setpoint(previous) - (-6.4)).abs() < 1e-9);
        assert!((pst.max_admissible_setpoint(previous) - 1.2).abs() < 1e-9);
    }

    #[test]
    fn test_relative_to_previous_uses_previous_tap() {
        let pst = RangeAction::pst("pst", linear_table(), 17)
            .with_tap_range(TapRange::new(RangeType::RelativeToPreviousInstant, -2, 3));
        let previous = linear_table().angle(25).expect("tap 25");
        assert_eq!(pst.admissible_taps(previous), Some((23, 28)));
    }

    #[test]
    fn test_non_monotonic_table_extremes() {
        let table = TapToAngleConversion::from_pairs([(-1, 2.0), (0, 0.0), (1, 3.0), (2, -1.0)])
            .expect("valid table");
        assert_eq!(table.angle_extremes(-1, 1), (0.0, 3.0));
        assert_eq!(table.angle_extremes(-1, 2), (-1.0, 3.0));
        assert_eq!(table.smallest_angle_step(), 2.0);
        assert_eq!(table.closest_tap(2.6), 1);
    }

    #[test]
    fn test_standard_range_intersection() {
        let hvdc = RangeAction::hvdc("hvdc", 100.0)
            .with_range(StandardRange::new(RangeType::Absolute, -500.0, 500.0))
            .with_range(StandardRange::new(RangeType::RelativeToInitialNetwork, -100.0, 450.0))
            .with_range(StandardRange::new(RangeType::RelativeToPreviousInstant, -50.0, 50.0));

        assert_eq!(hvdc.min_admissible_setpoint(120.0), 70.0);
        assert_eq!(hvdc.max_admissible_setpoint(120.0), 170.0);

        let bounds = hvdc.setpoint_bounds();
        assert_eq!(bounds.min_absolute, 0.0);
        assert_eq!(bounds.max_absolute, 500.0);
        assert_eq!(bounds.min_relative, -50.0);
        assert_eq!(bounds.max_relative, 50.0);
    }

    #[test]
    fn test_pst_relative_bounds_use_smallest_step() {
        let pst = RangeAction::pst("pst", linear_table(), 17)
            .with_tap_range(TapRange::new(RangeType::RelativeToPreviousInstant, -3, 2));
        let bounds = pst.setpoint_bounds();
        assert!((bounds.min_relative + 1.2).abs() < 1e-9);
        assert!((bounds.max_relative - 0.8).abs() < 1e-9);
        assert_eq!(pst.relative_tap_bounds(), Some((-3, 2)));
    }

    #[test]
    fn test_single_tap_table_has_finite_relative_bounds() {
        let table = TapToAngleConversion::from_pairs([(0, 1.5)]).expect("valid table");
        assert_eq!(table.smallest_angle_step(), f64::INFINITY);

        let pst = RangeAction::pst("pst", table.clone(), 0)
            .with_tap_range(TapRange::new(RangeType::RelativeToPreviousInstant, 0, 0));
        let bounds = pst.setpoint_bounds();
        assert_eq!(bounds.min_relative, 0.0);
        assert_eq!(bounds.max_relative, 0.0);
        assert_eq!((bounds.min_absolute, bounds.max_absolute), (1.5, 1.5));

        let unbounded = RangeAction::pst("pst", table, 0).setpoint_bounds();
        assert_eq!(unbounded.min_relative, f64::NEG_INFINITY);
        assert_eq!(unbounded.max_relative, f64::INFINITY);
    }

    #[test]
    fn test_same_device() {
        let a = RangeAction::pst("pst-a", linear_table(), 17).with_network_elements(["twt-1"]);
        let b = RangeAction::pst("pst-b", linear_table(), 17).with_network_elements(["twt-1"]);
        let c = RangeAction::pst("pst-c", linear_table(), 17).with_network_elements(["twt-2"]);
        assert!(a.acts_on_same_device(&b));
        assert!(!a.acts_on_same_device(&c));
    }

    #[test]
    fn test_tap_to_angle_rejected_for_hvdc() {
        let hvdc = RangeAction::hvdc("hvdc", 0.0);
        let err = hvdc.as_pst().unwrap_err();
        assert!(matches!(err, RaoError::UnsupportedRangeAction(_)));
    }

    #[test]
    fn test_empty_table_rejected() {
        assert!(TapToAngleConversion::from_pairs(std::iter::empty()).is_err());
    }

    #[test]
    fn test_range_action_json() {
        let json = r#"{
            "id": "hvdc-fr-es",
            "name": "HVDC FR-ES",
            "operator": "RTE",
            "group_id": null,
            "network_elements": ["hvdc-line"],
            "kind": {"type": "hvdc", "initial_setpoint": 0.0,
                     "ranges": [{"range_type": "absolute", "min": -1000.0, "max": 1000.0}]}
        }"#;
        let ra: RangeAction = serde_json::from_str(json).expect("valid range action");
        assert_eq!(ra.variant(), RangeActionVariant::Hvdc);
        assert_eq!(ra.max_admissible_setpoint(0.0), 1000.0);
    }
}
