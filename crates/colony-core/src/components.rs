//! Component definitions for the reference world.
//!
//! Components are pure data attached to hecs entities. Every entity carries
//! a [`Key`] (the stable id the controller sees) and a [`Placement`]; the
//! remaining component says what it is. Behavior lives in `systems`.

use colony_logic::capability::{Body, CapabilityUnit};
use colony_logic::roles::RoleTag;
use colony_logic::types::{EntityId, Pos, ResourceKind, Store};
use colony_logic::world::{
    AgentInfo, ControllerInfo, DroppedInfo, EntityKind, MineralInfo, Owner, Reservation,
    SiteInfo, SourceInfo, StructureInfo, StructureKind,
};
use hecs::EntityRef;
use serde::{Deserialize, Serialize};

/// Ticks a source waits before refilling.
pub const SOURCE_REGEN_TICKS: u32 = 300;

/// Agent lifetime after spawning completes.
pub const AGENT_LIFETIME: u32 = 1_500;

/// Spawn time per body unit.
pub const SPAWN_TICKS_PER_UNIT: u32 = 3;

/// Controller progress needed per level.
pub const PROGRESS_PER_LEVEL: u32 = 10_000;

/// Ticks an unfed controller lasts before it loses a level.
pub const DOWNGRADE_TICKS: u32 = 20_000;

/// Stable id exposed through snapshots. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Key(pub EntityId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub pos: Pos,
    pub owner: Owner,
}

/// A mobile unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub body: Body,
    pub role: Option<RoleTag>,
    pub hits: u32,
    pub hits_max: u32,
    pub fatigue: u32,
    pub ttl: u32,
    /// Ticks left inside the spawn; zero once active.
    pub spawning: u32,
}

impl Agent {
    pub fn new(body: Body, role: Option<RoleTag>) -> Self {
        let hits = body.hits_max();
        Self {
            body,
            role,
            hits,
            hits_max: hits,
            fatigue: 0,
            ttl: AGENT_LIFETIME,
            spawning: 0,
        }
    }

    pub fn count(&self, unit: CapabilityUnit) -> u32 {
        self.body.count(unit)
    }

    pub fn is_active(&self) -> bool {
        self.spawning == 0
    }
}

/// Resources held by an agent or a storing structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cargo(pub Store);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Building {
    pub kind: StructureKind,
    pub hits: u32,
    pub hits_max: u32,
    /// Spawns: the agent being assembled.
    pub assembling: Option<EntityId>,
}

impl Building {
    pub fn new(kind: StructureKind) -> Self {
        Self {
            kind,
            hits: kind.hits_max(),
            hits_max: kind.hits_max(),
            assembling: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    pub kind: StructureKind,
    pub progress: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub energy: u32,
    pub capacity: u32,
    /// Ticks until refill; counts only while below capacity.
    pub regen_in: u32,
}

impl Source {
    pub fn new(capacity: u32) -> Self {
        Self {
            energy: capacity,
            capacity,
            regen_in: SOURCE_REGEN_TICKS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    pub amount: u32,
}

/// Resources lying on the ground.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pile {
    pub resource: ResourceKind,
    pub amount: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Controller {
    pub level: u8,
    pub progress: u32,
    pub reservation: Option<Reservation>,
    pub downgrade_in: u32,
}

impl Controller {
    pub fn unclaimed() -> Self {
        Self {
            level: 0,
            progress: 0,
            reservation: None,
            downgrade_in: DOWNGRADE_TICKS,
        }
    }

    pub fn owned(level: u8) -> Self {
        Self {
            level,
            ..Self::unclaimed()
        }
    }
}

/// What the controller sees of one world entity.
pub fn entity_kind(e: EntityRef<'_>) -> Option<EntityKind> {
    let cargo = e.get::<&Cargo>().map(|c| c.0.clone());
    if let Some(a) = e.get::<&Agent>() {
        return Some(EntityKind::Agent(AgentInfo {
            body: a.body.clone(),
            store: cargo.unwrap_or_else(|| Store::new(a.body.carry_capacity())),
            hits: a.hits,
            hits_max: a.hits_max,
            fatigue: a.fatigue,
            role: a.role,
            spawning: !a.is_active(),
            ttl: a.ttl,
        }));
    }
    if let Some(b) = e.get::<&Building>() {
        return Some(EntityKind::Structure(StructureInfo {
            kind: b.kind,
            hits: b.hits,
            hits_max: b.hits_max,
            store: cargo,
            traversable: false,
            busy: b.assembling.is_some(),
        }));
    }
    if let Some(s) = e.get::<&Site>() {
        return Some(EntityKind::Site(SiteInfo {
            kind: s.kind,
            progress: s.progress,
            progress_total: s.kind.build_cost(),
        }));
    }
    if let Some(s) = e.get::<&Source>() {
        return Some(EntityKind::Source(SourceInfo {
            energy: s.energy,
            capacity: s.capacity,
        }));
    }
    if let Some(d) = e.get::<&Deposit>() {
        return Some(EntityKind::Mineral(MineralInfo { amount: d.amount }));
    }
    if let Some(p) = e.get::<&Pile>() {
        return Some(EntityKind::Dropped(DroppedInfo {
            resource: p.resource,
            amount: p.amount,
        }));
    }
    let c = e.get::<&Controller>()?;
    Some(EntityKind::Controller(ControllerInfo {
        level: c.level,
        progress: c.progress,
        progress_total: PROGRESS_PER_LEVEL * u32::from(c.level.max(1)),
        reservation: c.reservation,
        downgrade_in: c.downgrade_in,
    }))
}
