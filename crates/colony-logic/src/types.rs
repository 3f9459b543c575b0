//! Identifiers, tile positions and resource stores shared by every module.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Side length of a zone's square tile grid.
pub const ZONE_SIZE: u8 = 50;

/// Number of tiles in a zone.
pub const ZONE_AREA: usize = ZONE_SIZE as usize * ZONE_SIZE as usize;

/// Opaque id of anything the world snapshot can resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub u64);

/// Id of a mobile worker agent. Agents are entities, so every agent id is
/// also a valid [`EntityId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AgentId(pub u64);

impl AgentId {
    pub fn entity(self) -> EntityId {
        EntityId(self.0)
    }
}

impl From<AgentId> for EntityId {
    fn from(id: AgentId) -> Self {
        id.entity()
    }
}

/// Task ids are allocated monotonically and never reused, which makes them
/// usable as a deterministic tie-break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "agent-{}", self.0)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Zone coordinates on the world map. Neighboring zones differ by one on a
/// single axis and share a border edge.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ZoneId {
    pub x: i32,
    pub y: i32,
}

impl ZoneId {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Chebyshev distance in zones.
    pub fn distance(self, other: ZoneId) -> u32 {
        (self.x - other.x)
            .unsigned_abs()
            .max((self.y - other.y).unsigned_abs())
    }

    /// The four zones sharing a border with this one (N, E, S, W).
    pub fn neighbors(self) -> [ZoneId; 4] {
        [
            ZoneId::new(self.x, self.y - 1),
            ZoneId::new(self.x + 1, self.y),
            ZoneId::new(self.x, self.y + 1),
            ZoneId::new(self.x - 1, self.y),
        ]
    }

    /// Stable per-zone seed for deterministic sampling.
    pub fn seed(self) -> u64 {
        let x = self.x as u32 as u64;
        let y = self.y as u32 as u64;
        let mut h = (x << 32 | y).wrapping_mul(0x9e37_79b9_7f4a_7c15);
        h ^= h >> 31;
        h
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Z{}:{}", self.x, self.y)
    }
}

/// A tile inside a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Pos {
    pub zone: ZoneId,
    pub x: u8,
    pub y: u8,
}

impl Pos {
    pub fn new(zone: ZoneId, x: u8, y: u8) -> Self {
        let max = ZONE_SIZE - 1;
        Self {
            zone,
            x: x.min(max),
            y: y.min(max),
        }
    }

    /// The middle tile of a zone, used as the default travel goal.
    pub fn center(zone: ZoneId) -> Self {
        Self::new(zone, ZONE_SIZE / 2, ZONE_SIZE / 2)
    }

    /// Chebyshev range. Positions in different zones are measured through
    /// global tile coordinates.
    pub fn range_to(&self, other: &Pos) -> u32 {
        let (ax, ay) = self.global();
        let (bx, by) = other.global();
        (ax - bx).unsigned_abs().max((ay - by).unsigned_abs()) as u32
    }

    pub fn in_range(&self, other: &Pos, range: u32) -> bool {
        self.range_to(other) <= range
    }

    pub fn is_border(&self) -> bool {
        let max = ZONE_SIZE - 1;
        self.x == 0 || self.y == 0 || self.x == max || self.y == max
    }

    /// Row-major tile index inside the zone grid.
    pub fn index(&self) -> usize {
        self.y as usize * ZONE_SIZE as usize + self.x as usize
    }

    /// In-zone neighbors in all eight directions.
    pub fn neighbors(&self) -> impl Iterator<Item = Pos> + '_ {
        const DIRS: [(i16, i16); 8] = [
            (-1, -1),
            (0, -1),
            (1, -1),
            (-1, 0),
            (1, 0),
            (-1, 1),
            (0, 1),
            (1, 1),
        ];
        DIRS.iter().filter_map(move |(dx, dy)| {
            let nx = self.x as i16 + dx;
            let ny = self.y as i16 + dy;
            let limit = ZONE_SIZE as i16;
            if (0..limit).contains(&nx) && (0..limit).contains(&ny) {
                Some(Pos::new(self.zone, nx as u8, ny as u8))
            } else {
                None
            }
        })
    }

    fn global(&self) -> (i64, i64) {
        let size = ZONE_SIZE as i64;
        (
            self.zone.x as i64 * size + self.x as i64,
            self.zone.y as i64 * size + self.y as i64,
        )
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({},{})", self.zone, self.x, self.y)
    }
}

/// Resources agents carry and structures store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Energy,
    Mineral,
}

/// A capacity-bounded resource container shared by agents and structures.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Store {
    pub capacity: u32,
    pub contents: BTreeMap<ResourceKind, u32>,
}

impl Store {
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity,
            contents: BTreeMap::new(),
        }
    }

    pub fn with(mut self, resource: ResourceKind, amount: u32) -> Self {
        self.add(resource, amount);
        self
    }

    pub fn get(&self, resource: ResourceKind) -> u32 {
        self.contents.get(&resource).copied().unwrap_or(0)
    }

    pub fn used(&self) -> u32 {
        self.contents.values().sum()
    }

    pub fn free(&self) -> u32 {
        self.capacity.saturating_sub(self.used())
    }

    pub fn is_full(&self) -> bool {
        self.capacity > 0 && self.free() == 0
    }

    pub fn is_empty(&self) -> bool {
        self.used() == 0
    }

    /// Adds up to the free capacity; returns the amount stored.
    pub fn add(&mut self, resource: ResourceKind, amount: u32) -> u32 {
        let stored = amount.min(self.free());
        if stored > 0 {
            *self.contents.entry(resource).or_insert(0) += stored;
        }
        stored
    }

    /// Removes up to what is held; returns the amount removed.
    pub fn remove(&mut self, resource: ResourceKind, amount: u32) -> u32 {
        let held = self.get(resource);
        let taken = amount.min(held);
        if taken == held {
            self.contents.remove(&resource);
        } else if let Some(v) = self.contents.get_mut(&resource) {
            *v -= taken;
        }
        taken
    }

    /// The resource with the largest held amount, if any.
    pub fn dominant(&self) -> Option<ResourceKind> {
        self.contents
            .iter()
            .filter(|(_, v)| **v > 0)
            .max_by_key(|(_, v)| **v)
            .map(|(k, _)| *k)
    }
}
