//! Task definitions and priorities.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::capability::CapabilityUnit;
use crate::roles::RoleTag;
use crate::types::{AgentId, EntityId, Pos, ResourceKind, TaskId, ZoneId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TaskKind {
    Harvest,
    Upgrade,
    Build,
    Repair,
    Transfer,
    Withdraw,
    Pickup,
    Attack,
    Heal,
    RangedAttack,
    Dismantle,
    ClaimController,
    ReserveController,
}

impl TaskKind {
    pub const ALL: [TaskKind; 13] = [
        TaskKind::Harvest,
        TaskKind::Upgrade,
        TaskKind::Build,
        TaskKind::Repair,
        TaskKind::Transfer,
        TaskKind::Withdraw,
        TaskKind::Pickup,
        TaskKind::Attack,
        TaskKind::Heal,
        TaskKind::RangedAttack,
        TaskKind::Dismantle,
        TaskKind::ClaimController,
        TaskKind::ReserveController,
    ];

    /// The capability unit an agent needs to take this task.
    pub fn required_unit(self) -> CapabilityUnit {
        match self {
            TaskKind::Harvest
            | TaskKind::Build
            | TaskKind::Repair
            | TaskKind::Dismantle
            | TaskKind::Upgrade => CapabilityUnit::Work,
            TaskKind::Transfer | TaskKind::Withdraw | TaskKind::Pickup => CapabilityUnit::Carry,
            TaskKind::Attack => CapabilityUnit::Attack,
            TaskKind::RangedAttack => CapabilityUnit::RangedAttack,
            TaskKind::Heal => CapabilityUnit::Heal,
            TaskKind::ClaimController | TaskKind::ReserveController => CapabilityUnit::Claim,
        }
    }

    /// Kinds that spend carried energy rather than acquire it.
    pub fn consumes_energy(self) -> bool {
        matches!(
            self,
            TaskKind::Build | TaskKind::Repair | TaskKind::Upgrade | TaskKind::Transfer
        )
    }

    /// Range the task's action works at.
    pub fn range(self) -> u32 {
        match self {
            TaskKind::Build | TaskKind::Repair | TaskKind::Upgrade | TaskKind::RangedAttack => 3,
            _ => 1,
        }
    }

    /// Standing assignments survive completion: the agent leaves to unload
    /// and comes back to the same target.
    pub fn is_standing(self) -> bool {
        matches!(self, TaskKind::Harvest)
    }

    /// Kinds that fill the agent's store.
    pub fn fills_store(self) -> bool {
        matches!(
            self,
            TaskKind::Harvest | TaskKind::Withdraw | TaskKind::Pickup | TaskKind::Dismantle
        )
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Why a task exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskOrigin {
    /// Created to cover a population deficit of a role.
    Deficit(RoleTag),
    /// Created from a fresh per-tick planner candidate.
    Opportunity,
    /// Created directly by an agent's handler.
    AdHoc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub kind: TaskKind,
    pub target: EntityId,
    /// Last known target position, for remote targets out of sight.
    pub target_pos: Pos,
    /// Higher is more urgent.
    pub priority: i32,
    pub assigned: Vec<AgentId>,
    /// Colony zone whose pool holds the task.
    pub zone: ZoneId,
    pub created_at: u64,
    pub resource: Option<ResourceKind>,
    pub amount: Option<u32>,
    pub origin: TaskOrigin,
    pub max_assignees: u32,
}

impl Task {
    pub fn age(&self, tick: u64) -> u64 {
        tick.saturating_sub(self.created_at)
    }

    pub fn is_full(&self) -> bool {
        self.assigned.len() as u32 >= self.max_assignees
    }

    pub fn is_remote(&self) -> bool {
        self.target_pos.zone != self.zone
    }
}

/// Outcome of executing one step of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    InProgress,
    Completed,
    Failed,
}

/// Parameters for a task about to be created.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    pub kind: TaskKind,
    pub target: EntityId,
    pub priority: i32,
    pub zone: ZoneId,
    pub resource: Option<ResourceKind>,
    pub amount: Option<u32>,
    pub origin: TaskOrigin,
}

impl NewTask {
    pub fn new(kind: TaskKind, target: EntityId, priority: i32, zone: ZoneId) -> Self {
        Self {
            kind,
            target,
            priority,
            zone,
            resource: None,
            amount: None,
            origin: TaskOrigin::AdHoc,
        }
    }

    pub fn resource(mut self, resource: ResourceKind, amount: Option<u32>) -> Self {
        self.resource = Some(resource);
        self.amount = amount;
        self
    }

    pub fn origin(mut self, origin: TaskOrigin) -> Self {
        self.origin = origin;
        self
    }
}

/// Default priorities per task category.
pub mod priority {
    pub const ATTACK: i32 = 90;
    pub const HEAL: i32 = 85;
    pub const REFILL_SPAWN: i32 = 80;
    pub const UPGRADE_URGENT: i32 = 75;
    pub const REFILL_TOWER: i32 = 70;
    pub const HARVEST: i32 = 60;
    pub const BUILD_CORE: i32 = 55;
    pub const PICKUP: i32 = 50;
    pub const CLAIM: i32 = 45;
    pub const BUILD: i32 = 40;
    pub const RESERVE: i32 = 40;
    pub const WITHDRAW: i32 = 25;
    pub const REPAIR_BASE: i32 = 20;
    pub const DISMANTLE: i32 = 15;
    pub const UPGRADE: i32 = 10;

    /// Repair urgency grows as health drops: 20 at full, 50 at zero.
    pub fn repair(health_fraction: f32) -> i32 {
        let missing = (1.0 - health_fraction).clamp(0.0, 1.0);
        REPAIR_BASE + (missing * 30.0).round() as i32
    }
}
