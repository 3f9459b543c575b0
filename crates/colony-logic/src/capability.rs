//! Capability units and agent bodies.
//!
//! An agent's body is an ordered list of capability units. The set of
//! distinct units decides which task kinds it may take; the order decides
//! how parts are placed at spawn time (damage absorbs front to back).
//!
//! | Unit | Cost | Grants |
//! |------|------|--------|
//! | `Move` | 50 | locomotion |
//! | `Work` | 100 | gather, build, repair, upgrade, dismantle |
//! | `Carry` | 50 | transport, +50 capacity |
//! | `Attack` | 80 | melee attack |
//! | `RangedAttack` | 150 | ranged attack |
//! | `Heal` | 250 | heal |
//! | `Claim` | 600 | claim, reserve |
//! | `Tough` | 10 | padding |

use serde::{Deserialize, Serialize};
use std::fmt;

/// Capacity contributed by each `Carry` unit.
pub const CARRY_CAPACITY: u32 = 50;

/// Hard cap on body length.
pub const MAX_BODY_UNITS: usize = 50;

/// Hit points contributed by each body unit.
pub const HITS_PER_UNIT: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CapabilityUnit {
    Move,
    Work,
    Carry,
    Attack,
    RangedAttack,
    Heal,
    Claim,
    Tough,
}

impl CapabilityUnit {
    pub const ALL: [CapabilityUnit; 8] = [
        CapabilityUnit::Move,
        CapabilityUnit::Work,
        CapabilityUnit::Carry,
        CapabilityUnit::Attack,
        CapabilityUnit::RangedAttack,
        CapabilityUnit::Heal,
        CapabilityUnit::Claim,
        CapabilityUnit::Tough,
    ];

    pub fn cost(self) -> u32 {
        match self {
            CapabilityUnit::Move => 50,
            CapabilityUnit::Work => 100,
            CapabilityUnit::Carry => 50,
            CapabilityUnit::Attack => 80,
            CapabilityUnit::RangedAttack => 150,
            CapabilityUnit::Heal => 250,
            CapabilityUnit::Claim => 600,
            CapabilityUnit::Tough => 10,
        }
    }

    /// Placement rank in a spawned body. Tough parts go first so they
    /// absorb damage; Move and Heal go last so an agent keeps moving and
    /// healing the longest.
    fn spawn_rank(self) -> u8 {
        match self {
            CapabilityUnit::Tough => 0,
            CapabilityUnit::Work => 1,
            CapabilityUnit::Carry => 2,
            CapabilityUnit::Attack => 3,
            CapabilityUnit::RangedAttack => 4,
            CapabilityUnit::Claim => 5,
            CapabilityUnit::Move => 6,
            CapabilityUnit::Heal => 7,
        }
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for CapabilityUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CapabilityUnit::Move => "move",
            CapabilityUnit::Work => "work",
            CapabilityUnit::Carry => "carry",
            CapabilityUnit::Attack => "attack",
            CapabilityUnit::RangedAttack => "ranged_attack",
            CapabilityUnit::Heal => "heal",
            CapabilityUnit::Claim => "claim",
            CapabilityUnit::Tough => "tough",
        };
        f.write_str(name)
    }
}

/// The distinct units present in a body, as a bitmask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CapabilitySet(u8);

impl CapabilitySet {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn of(units: &[CapabilityUnit]) -> Self {
        units.iter().fold(Self::empty(), |set, u| set.with(*u))
    }

    pub fn with(self, unit: CapabilityUnit) -> Self {
        Self(self.0 | unit.bit())
    }

    pub fn contains(&self, unit: CapabilityUnit) -> bool {
        self.0 & unit.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// True when the only unit present is `Move` (or nothing at all).
    pub fn is_move_only(&self) -> bool {
        self.0 & !CapabilityUnit::Move.bit() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = CapabilityUnit> + '_ {
        CapabilityUnit::ALL
            .into_iter()
            .filter(move |u| self.contains(*u))
    }
}

/// An ordered body composition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Body(pub Vec<CapabilityUnit>);

impl Body {
    pub fn new(units: Vec<CapabilityUnit>) -> Self {
        Self(units)
    }

    pub fn units(&self) -> &[CapabilityUnit] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn cost(&self) -> u32 {
        self.0.iter().map(|u| u.cost()).sum()
    }

    pub fn count(&self, unit: CapabilityUnit) -> u32 {
        self.0.iter().filter(|u| **u == unit).count() as u32
    }

    pub fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::of(&self.0)
    }

    pub fn carry_capacity(&self) -> u32 {
        self.count(CapabilityUnit::Carry) * CARRY_CAPACITY
    }

    pub fn hits_max(&self) -> u32 {
        self.0.len() as u32 * HITS_PER_UNIT
    }
}

/// Builds a body from a fixed `prefix` plus as many copies of `pattern` as
/// the budget allows, capped by `max_repeats` and [`MAX_BODY_UNITS`].
///
/// The result never costs more than `budget`. If not even one repeat of the
/// pattern fits, the body is empty: a spawn with only a prefix would be a
/// worker without its defining units. Units are sorted into spawn order.
pub fn scale_pattern(
    prefix: &[CapabilityUnit],
    pattern: &[CapabilityUnit],
    budget: u32,
    max_repeats: u32,
) -> Body {
    let prefix_cost: u32 = prefix.iter().map(|u| u.cost()).sum();
    let pattern_cost: u32 = pattern.iter().map(|u| u.cost()).sum();
    if pattern.is_empty() || pattern_cost == 0 || prefix_cost > budget {
        return Body::default();
    }

    let by_budget = (budget - prefix_cost) / pattern_cost;
    let by_length = MAX_BODY_UNITS.saturating_sub(prefix.len()) / pattern.len();
    let repeats = by_budget.min(by_length as u32).min(max_repeats);
    if repeats == 0 {
        return Body::default();
    }

    let mut units = prefix.to_vec();
    for _ in 0..repeats {
        units.extend_from_slice(pattern);
    }
    units.sort_by_key(|u| u.spawn_rank());
    Body(units)
}
