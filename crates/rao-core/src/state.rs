//! Grid states: an instant, optionally after a contingency.
//!
//! Instants are totally ordered by their `order` field
//! (preventive < outage < auto < curative-1 < curative-2 < ...). A state is
//! comparable with another one only when both share the same contingency or
//! one of them is preventive; [`State::applies_to`] encodes that rule.

use crate::ContingencyId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Kind of an instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstantKind {
    Preventive,
    Outage,
    Auto,
    Curative,
}

/// A point in time of the optimisation timeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instant {
    pub id: String,
    pub kind: InstantKind,
    /// Position in the timeline, 0 being preventive
    pub order: u32,
}

impl Instant {
    pub fn new(id: impl Into<String>, kind: InstantKind, order: u32) -> Self {
        Self {
            id: id.into(),
            kind,
            order,
        }
    }

    pub fn preventive(id: impl Into<String>) -> Self {
        Self::new(id, InstantKind::Preventive, 0)
    }

    pub fn outage(id: impl Into<String>) -> Self {
        Self::new(id, InstantKind::Outage, 1)
    }

    /// Curative instant number `rank` (1 for the first curative instant).
    pub fn curative(id: impl Into<String>, rank: u32) -> Self {
        Self::new(id, InstantKind::Curative, 2 + rank)
    }

    pub fn is_preventive(&self) -> bool {
        self.kind == InstantKind::Preventive
    }

    pub fn is_curative(&self) -> bool {
        self.kind == InstantKind::Curative
    }

    pub fn comes_before(&self, other: &Instant) -> bool {
        self.order < other.order
    }
}

impl PartialOrd for Instant {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Instant {
    fn cmp(&self, other: &Self) -> Ordering {
        self.order
            .cmp(&other.order)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// An (instant, contingency) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct State {
    pub instant: Instant,
    pub contingency: Option<ContingencyId>,
}

impl State {
    pub fn new(instant: Instant, contingency: Option<ContingencyId>) -> Self {
        Self {
            instant,
            contingency,
        }
    }

    pub fn preventive(instant: Instant) -> Self {
        Self::new(instant, None)
    }

    pub fn after(instant: Instant, contingency: impl Into<ContingencyId>) -> Self {
        Self::new(instant, Some(contingency.into()))
    }

    pub fn is_preventive(&self) -> bool {
        self.instant.is_preventive()
    }

    /// Whether remedial actions of this state can act on elements monitored in `other`.
    ///
    /// True when this state is not later than `other` and is either
    /// preventive or shares its contingency.
    pub fn applies_to(&self, other: &State) -> bool {
        self.instant.order <= other.instant.order
            && (self.is_preventive() || self.contingency == other.contingency)
    }

    /// Stable identifier, e.g. `co1 - curative` or `preventive`.
    pub fn id(&self) -> String {
        match &self.contingency {
            Some(contingency) => format!("{} - {}", contingency, self.instant.id),
            None => self.instant.id.clone(),
        }
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        self.instant
            .cmp(&other.instant)
            .then_with(|| self.contingency.cmp(&other.contingency))
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preventive() -> State {
        State::preventive(Instant::preventive("preventive"))
    }

    fn curative(contingency: &str) -> State {
        State::after(Instant::curative("curative", 1), contingency)
    }

    #[test]
    fn test_instant_ordering() {
        let prev = Instant::preventive("preventive");
        let outage = Instant::outage("outage");
        let cur1 = Instant::curative("curative1", 1);
        let cur2 = Instant::curative("curative2", 2);
        assert!(prev < outage);
        assert!(outage < cur1);
        assert!(cur1 < cur2);
        assert!(prev.comes_before(&cur2));
    }

    #[test]
    fn test_applies_to() {
        let prev = preventive();
        let cur_a = curative("co-a");
        let cur_b = curative("co-b");

        assert!(prev.applies_to(&cur_a));
        assert!(prev.applies_to(&prev));
        assert!(cur_a.applies_to(&cur_a));
        assert!(!cur_a.applies_to(&prev));
        assert!(!cur_a.applies_to(&cur_b));
    }

    #[test]
    fn test_state_sorting_puts_preventive_first() {
        let mut states = vec![curative("co-b"), preventive(), curative("co-a")];
        states.sort();
        assert!(states[0].is_preventive());
        assert_eq!(states[1].id(), "co-a - curative");
        assert_eq!(states[2].id(), "co-b - curative");
    }
}
