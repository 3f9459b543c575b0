//! Test fakes for the external collaborators.
//!
//! - [`SnapshotBuilder`] assembles a [`Snapshot`] entity by entity with
//!   sequential ids.
//! - [`RecordingSink`] is an [`ActionSink`] that records every call and
//!   answers from a script (default `Ok`).
//!
//! ```
//! use colony_logic::testing::{RecordingSink, SnapshotBuilder};
//! use colony_logic::capability::CapabilityUnit::*;
//! use colony_logic::types::{Pos, ZoneId};
//! use colony_logic::world::WorldView;
//!
//! let zone = ZoneId::new(0, 0);
//! let mut b = SnapshotBuilder::new(1);
//! let agent = b.agent(Pos::new(zone, 10, 10), &[Work, Carry, Move], None);
//! let snap = b.build();
//! assert!(snap.agent(agent).is_some());
//! let sink = RecordingSink::default();
//! assert!(sink.performed.is_empty());
//! ```

use std::collections::{HashMap, VecDeque};

use crate::action::{ActionResult, ActionSink, PrimitiveAction};
use crate::capability::{Body, CapabilityUnit};
use crate::cost::CostSurface;
use crate::roles::RoleTag;
use crate::types::{AgentId, EntityId, Pos, ResourceKind, Store, ZoneId};
use crate::world::{
    AgentInfo, ControllerInfo, DroppedInfo, Entity, EntityKind, MineralInfo, Owner, SiteInfo,
    Snapshot, SourceInfo, StructureInfo, StructureKind, TerrainGrid,
};

/// Agent lifetime given to built agents.
pub const AGENT_TTL: u32 = 1_500;

pub struct SnapshotBuilder {
    snap: Snapshot,
    next_id: u64,
}

impl SnapshotBuilder {
    pub fn new(tick: u64) -> Self {
        Self {
            snap: Snapshot::new(tick),
            next_id: 1,
        }
    }

    /// Continues numbering after `id`, so ids from an earlier builder stay
    /// unique.
    pub fn starting_at(mut self, id: u64) -> Self {
        self.next_id = id;
        self
    }

    fn next(&mut self) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn terrain(&mut self, zone: ZoneId, grid: TerrainGrid) -> &mut Self {
        self.snap.add_terrain(zone, grid);
        self
    }

    pub fn reveal(&mut self, zone: ZoneId) -> &mut Self {
        self.snap.reveal(zone);
        self
    }

    pub fn entity(&mut self, pos: Pos, owner: Owner, kind: EntityKind) -> EntityId {
        let id = self.next();
        self.snap.insert(Entity {
            id,
            pos,
            owner,
            kind,
        });
        id
    }

    /// An own agent with an empty store.
    pub fn agent(&mut self, pos: Pos, units: &[CapabilityUnit], role: Option<RoleTag>) -> AgentId {
        let body = Body::new(units.to_vec());
        let store = Store::new(body.carry_capacity());
        self.agent_with(pos, body, store, role)
    }

    pub fn agent_with(
        &mut self,
        pos: Pos,
        body: Body,
        store: Store,
        role: Option<RoleTag>,
    ) -> AgentId {
        let hits = body.hits_max();
        let id = self.entity(
            pos,
            Owner::Mine,
            EntityKind::Agent(AgentInfo {
                body,
                store,
                hits,
                hits_max: hits,
                fatigue: 0,
                role,
                spawning: false,
                ttl: AGENT_TTL,
            }),
        );
        AgentId(id.0)
    }

    pub fn hostile(&mut self, pos: Pos, units: &[CapabilityUnit]) -> EntityId {
        let body = Body::new(units.to_vec());
        let hits = body.hits_max();
        self.entity(
            pos,
            Owner::Hostile,
            EntityKind::Agent(AgentInfo {
                store: Store::new(body.carry_capacity()),
                body,
                hits,
                hits_max: hits,
                fatigue: 0,
                role: None,
                spawning: false,
                ttl: AGENT_TTL,
            }),
        )
    }

    pub fn structure(&mut self, pos: Pos, kind: StructureKind, owner: Owner) -> EntityId {
        self.entity(pos, owner, EntityKind::Structure(StructureInfo::new(kind)))
    }

    pub fn structure_with(&mut self, pos: Pos, owner: Owner, info: StructureInfo) -> EntityId {
        self.entity(pos, owner, EntityKind::Structure(info))
    }

    /// An own structure whose store holds `energy`.
    pub fn stocked(&mut self, pos: Pos, kind: StructureKind, energy: u32) -> EntityId {
        let mut info = StructureInfo::new(kind);
        if let Some(store) = info.store.as_mut() {
            store.add(ResourceKind::Energy, energy);
        }
        self.structure_with(pos, Owner::Mine, info)
    }

    pub fn site(&mut self, pos: Pos, kind: StructureKind, progress: u32) -> EntityId {
        self.entity(
            pos,
            Owner::Mine,
            EntityKind::Site(SiteInfo {
                kind,
                progress,
                progress_total: kind.build_cost(),
            }),
        )
    }

    pub fn source(&mut self, pos: Pos, energy: u32) -> EntityId {
        self.entity(
            pos,
            Owner::Neutral,
            EntityKind::Source(SourceInfo {
                energy,
                capacity: 3_000,
            }),
        )
    }

    pub fn mineral(&mut self, pos: Pos, amount: u32) -> EntityId {
        self.entity(pos, Owner::Neutral, EntityKind::Mineral(MineralInfo { amount }))
    }

    pub fn dropped(&mut self, pos: Pos, amount: u32) -> EntityId {
        self.entity(
            pos,
            Owner::Neutral,
            EntityKind::Dropped(DroppedInfo {
                resource: ResourceKind::Energy,
                amount,
            }),
        )
    }

    /// A controller; `level == 0` with `Owner::Neutral` is unclaimed.
    pub fn controller(&mut self, pos: Pos, owner: Owner, level: u8) -> EntityId {
        self.entity(
            pos,
            owner,
            EntityKind::Controller(ControllerInfo {
                level,
                progress: 0,
                progress_total: 10_000,
                reservation: None,
                downgrade_in: 20_000,
            }),
        )
    }

    pub fn snapshot_mut(&mut self) -> &mut Snapshot {
        &mut self.snap
    }

    /// A copy of the snapshot built so far.
    pub fn build(&self) -> Snapshot {
        self.snap.clone()
    }

    /// A copy of the snapshot stamped with another tick.
    pub fn at(&self, tick: u64) -> Snapshot {
        let mut snap = self.snap.clone();
        snap.set_tick(tick);
        snap
    }
}

/// A movement intent recorded by [`RecordingSink`].
#[derive(Debug, Clone, PartialEq)]
pub struct MoveCall {
    pub agent: AgentId,
    pub goal: Pos,
    pub range: u32,
    pub zone: ZoneId,
}

#[derive(Debug, Default)]
pub struct RecordingSink {
    pub performed: Vec<(AgentId, PrimitiveAction)>,
    pub moves: Vec<MoveCall>,
    pub spawns: Vec<(EntityId, RoleTag, Body)>,
    script: VecDeque<ActionResult>,
    per_agent: HashMap<AgentId, VecDeque<ActionResult>>,
    panic_for: Option<AgentId>,
}

impl RecordingSink {
    /// Queues a result for the next `perform` call from any agent.
    pub fn script(&mut self, result: ActionResult) {
        self.script.push_back(result);
    }

    /// Queues a result for the next `perform` call from `agent`.
    pub fn script_for(&mut self, agent: AgentId, result: ActionResult) {
        self.per_agent.entry(agent).or_default().push_back(result);
    }

    /// Makes every `perform` from `agent` panic, to exercise isolation.
    pub fn panic_on(&mut self, agent: AgentId) {
        self.panic_for = Some(agent);
    }

    pub fn actions_of(&self, agent: AgentId) -> Vec<PrimitiveAction> {
        self.performed
            .iter()
            .filter(|(a, _)| *a == agent)
            .map(|(_, action)| *action)
            .collect()
    }

    pub fn clear(&mut self) {
        self.performed.clear();
        self.moves.clear();
        self.spawns.clear();
    }
}

impl ActionSink for RecordingSink {
    fn perform(&mut self, agent: AgentId, action: &PrimitiveAction) -> ActionResult {
        if self.panic_for == Some(agent) {
            panic!("scripted failure for {agent}");
        }
        self.performed.push((agent, *action));
        if let Some(result) = self.per_agent.get_mut(&agent).and_then(|q| q.pop_front()) {
            return result;
        }
        self.script.pop_front().unwrap_or(ActionResult::Ok)
    }

    fn move_intent(
        &mut self,
        agent: AgentId,
        goal: Pos,
        range: u32,
        surface: &CostSurface,
    ) -> ActionResult {
        self.moves.push(MoveCall {
            agent,
            goal,
            range,
            zone: surface.zone,
        });
        ActionResult::Ok
    }

    fn spawn(&mut self, spawn: EntityId, role: RoleTag, body: &Body) -> ActionResult {
        self.spawns.push((spawn, role, body.clone()));
        ActionResult::Ok
    }
}
