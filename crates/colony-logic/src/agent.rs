//! Agent roster.
//!
//! The roster mirrors the own agents of the current snapshot. Each tick it
//! diff-syncs: newly observed agents get their memory loaded from the store
//! (migrated once, here) or a fresh default from their role strategy;
//! agents that vanished are dropped along with their stored memory.

use std::collections::{BTreeMap, BTreeSet};

use crate::action::ActionGuard;
use crate::capability::{Body, CapabilitySet, CapabilityUnit};
use crate::memory::{decode_memory, encode_memory, AgentMemory, Migrations};
use crate::roles::{RoleRegistry, RoleTag};
use crate::store::{Scope, StateStore};
use crate::types::{AgentId, Pos, Store, ZoneId};
use crate::world::{AgentInfo, Category, Entity, WorldView};

/// Controller-side view of one own agent.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentRecord {
    pub id: AgentId,
    pub pos: Pos,
    pub body: Body,
    pub capabilities: CapabilitySet,
    pub store: Store,
    pub hits: u32,
    pub hits_max: u32,
    pub fatigue: u32,
    pub spawning: bool,
    pub ttl: u32,
    pub memory: AgentMemory,
    pub guard: ActionGuard,
}

impl AgentRecord {
    pub fn new(entity: &Entity, info: &AgentInfo, memory: AgentMemory) -> Self {
        Self {
            id: AgentId(entity.id.0),
            pos: entity.pos,
            body: info.body.clone(),
            capabilities: info.body.capabilities(),
            store: info.store.clone(),
            hits: info.hits,
            hits_max: info.hits_max,
            fatigue: info.fatigue,
            spawning: info.spawning,
            ttl: info.ttl,
            memory,
            guard: ActionGuard::default(),
        }
    }

    /// Copies the physical state from this tick's snapshot.
    pub fn refresh(&mut self, entity: &Entity, info: &AgentInfo) {
        self.pos = entity.pos;
        if self.body != info.body {
            self.body = info.body.clone();
            self.capabilities = info.body.capabilities();
        }
        self.store = info.store.clone();
        self.hits = info.hits;
        self.hits_max = info.hits_max;
        self.fatigue = info.fatigue;
        self.spawning = info.spawning;
        self.ttl = info.ttl;
    }

    pub fn role(&self) -> RoleTag {
        self.memory.role
    }

    pub fn home(&self) -> ZoneId {
        self.memory.home
    }

    pub fn has(&self, unit: CapabilityUnit) -> bool {
        self.capabilities.contains(unit)
    }
}

/// What changed in the last sync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RosterChanges {
    pub born: Vec<AgentId>,
    pub died: Vec<AgentId>,
    /// Memory was unreadable and replaced with defaults.
    pub reinitialized: Vec<AgentId>,
    /// Memory was upgraded from an older version.
    pub migrated: Vec<AgentId>,
}

#[derive(Debug, Clone, Default)]
pub struct AgentRoster {
    agents: BTreeMap<AgentId, AgentRecord>,
}

impl AgentRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sync(
        &mut self,
        world: &dyn WorldView,
        roles: &RoleRegistry,
        store: &mut dyn StateStore,
        migrations: &Migrations,
    ) -> RosterChanges {
        let mut changes = RosterChanges::default();
        let mut seen = BTreeSet::new();

        for zone in world.zones() {
            for entity in world.query(zone, Category::MyAgents) {
                let Some(info) = entity.as_agent() else {
                    continue;
                };
                let id = AgentId(entity.id.0);
                seen.insert(id);
                if let Some(record) = self.agents.get_mut(&id) {
                    record.refresh(entity, info);
                    continue;
                }
                let Some(memory) =
                    load_memory(id, entity, info, roles, &*store, migrations, &mut changes)
                else {
                    continue;
                };
                log::info!("{id} born as {} in {}", memory.role, memory.home);
                changes.born.push(id);
                self.agents
                    .insert(id, AgentRecord::new(entity, info, memory));
            }
        }

        let gone: Vec<AgentId> = self
            .agents
            .keys()
            .filter(|id| !seen.contains(id))
            .copied()
            .collect();
        for id in gone {
            if let Some(record) = self.agents.remove(&id) {
                log::info!("{id} ({}) died", record.memory.role);
            }
            store.remove(&Scope::Agent(id));
            changes.died.push(id);
        }
        changes
    }

    /// Writes every agent's memory back to the store.
    pub fn persist(&self, store: &mut dyn StateStore) {
        for (id, record) in &self.agents {
            match encode_memory(&record.memory) {
                Ok(rec) => store.set(Scope::Agent(*id), rec),
                Err(e) => log::warn!("{id}: memory not saved: {e}"),
            }
        }
    }

    pub fn get(&self, id: AgentId) -> Option<&AgentRecord> {
        self.agents.get(&id)
    }

    pub fn get_mut(&mut self, id: AgentId) -> Option<&mut AgentRecord> {
        self.agents.get_mut(&id)
    }

    pub fn contains(&self, id: AgentId) -> bool {
        self.agents.contains_key(&id)
    }

    pub fn ids(&self) -> Vec<AgentId> {
        self.agents.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AgentRecord> {
        self.agents.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut AgentRecord> {
        self.agents.values_mut()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Agents per role, grouped by home zone. Spawning agents count.
    pub fn counts_by_zone(&self) -> BTreeMap<ZoneId, BTreeMap<RoleTag, u32>> {
        let mut counts: BTreeMap<ZoneId, BTreeMap<RoleTag, u32>> = BTreeMap::new();
        for record in self.agents.values() {
            *counts
                .entry(record.home())
                .or_default()
                .entry(record.role())
                .or_insert(0) += 1;
        }
        counts
    }
}

fn load_memory(
    id: AgentId,
    entity: &Entity,
    info: &AgentInfo,
    roles: &RoleRegistry,
    store: &dyn StateStore,
    migrations: &Migrations,
    changes: &mut RosterChanges,
) -> Option<AgentMemory> {
    if let Some(record) = store.get(&Scope::Agent(id)) {
        match decode_memory(&record, migrations) {
            Ok((memory, migrated)) if roles.contains(memory.role) => {
                if migrated {
                    log::info!("{id}: memory migrated from version {}", record.version);
                    changes.migrated.push(id);
                }
                return Some(memory);
            }
            Ok((memory, _)) => {
                log::warn!("{id}: stored role {} has no strategy", memory.role);
                changes.reinitialized.push(id);
            }
            Err(e) => {
                log::warn!("{id}: memory reinitialized: {e}");
                changes.reinitialized.push(id);
            }
        }
    }
    default_memory(id, entity, info, roles)
}

/// Default memory for the agent's stamped role, or for a role inferred from
/// its capabilities.
pub fn default_memory(
    id: AgentId,
    entity: &Entity,
    info: &AgentInfo,
    roles: &RoleRegistry,
) -> Option<AgentMemory> {
    let role = info
        .role
        .filter(|r| roles.contains(*r))
        .unwrap_or_else(|| RoleTag::infer(info.body.capabilities()));
    match roles.lookup(role) {
        Ok(strategy) => Some(strategy.default_memory(entity.pos.zone)),
        Err(e) => {
            log::warn!("{id}: not managed: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::CapabilityUnit::*;
    use crate::memory::{StateTag, MEMORY_VERSION};
    use crate::store::{MemoryStore, Record};
    use crate::testing::SnapshotBuilder;

    fn zone() -> ZoneId {
        ZoneId::new(0, 0)
    }

    #[test]
    fn test_sync_births_and_deaths() {
        let roles = RoleRegistry::standard();
        let migrations = Migrations::standard();
        let mut store = MemoryStore::new();
        let mut roster = AgentRoster::new();

        let mut b = SnapshotBuilder::new(1);
        let a = b.agent(Pos::new(zone(), 5, 5), &[Work, Carry, Move], Some(RoleTag::Builder));
        let c = b.agent(Pos::new(zone(), 6, 6), &[Carry, Move], None);
        let changes = roster.sync(&b.build(), &roles, &mut store, &migrations);
        assert_eq!(changes.born, vec![a, c]);
        assert_eq!(roster.get(a).map(|r| r.role()), Some(RoleTag::Builder));
        assert_eq!(roster.get(c).map(|r| r.role()), Some(RoleTag::Hauler));
        roster.persist(&mut store);
        assert_eq!(store.len(), 2);

        b.snapshot_mut().remove(c.entity());
        let changes = roster.sync(&b.at(2), &roles, &mut store, &migrations);
        assert!(changes.born.is_empty());
        assert_eq!(changes.died, vec![c]);
        assert!(!roster.contains(c));
        assert!(store.get(&Scope::Agent(c)).is_none());
    }

    #[test]
    fn test_stored_memory_is_reused_and_migrated() {
        let roles = RoleRegistry::standard();
        let migrations = Migrations::standard();
        let mut store = MemoryStore::new();
        let mut b = SnapshotBuilder::new(1);
        let a = b.agent(Pos::new(zone(), 5, 5), &[Work, Carry, Move], None);
        let v1 = serde_json::json!({
            "role": "Upgrader",
            "working": true,
            "zone": { "x": 0, "y": 0 }
        });
        store.set(
            Scope::Agent(a),
            Record {
                version: 1,
                data: serde_json::to_vec(&v1).unwrap(),
            },
        );
        let mut roster = AgentRoster::new();
        let changes = roster.sync(&b.build(), &roles, &mut store, &migrations);
        assert_eq!(changes.migrated, vec![a]);
        let record = roster.get(a).unwrap();
        assert_eq!(record.role(), RoleTag::Upgrader);
        assert_eq!(record.memory.state, StateTag::Upgrading);
    }

    #[test]
    fn test_corrupt_memory_is_reinitialized() {
        let roles = RoleRegistry::standard();
        let mut store = MemoryStore::new();
        let mut b = SnapshotBuilder::new(1);
        let a = b.agent(Pos::new(zone(), 5, 5), &[Claim, Move], None);
        store.set(
            Scope::Agent(a),
            Record {
                version: MEMORY_VERSION,
                data: b"garbage".to_vec(),
            },
        );
        let mut roster = AgentRoster::new();
        let changes = roster.sync(&b.build(), &roles, &mut store, &Migrations::standard());
        assert_eq!(changes.reinitialized, vec![a]);
        assert_eq!(roster.get(a).map(|r| r.role()), Some(RoleTag::Claimer));
    }

    #[test]
    fn test_unregistered_role_is_not_managed() {
        let mut roles = RoleRegistry::new();
        roles.register(Box::new(crate::roles::HaulerStrategy));
        let mut b = SnapshotBuilder::new(1);
        let a = b.agent(Pos::new(zone(), 5, 5), &[Heal, Move], None);
        let h = b.agent(Pos::new(zone(), 6, 5), &[Carry, Move], None);
        let mut roster = AgentRoster::new();
        let changes = roster.sync(
            &b.build(),
            &roles,
            &mut MemoryStore::new(),
            &Migrations::standard(),
        );
        assert_eq!(changes.born, vec![h]);
        assert!(!roster.contains(a));
    }

    #[test]
    fn test_counts_by_zone() {
        let roles = RoleRegistry::standard();
        let mut b = SnapshotBuilder::new(1);
        b.agent(Pos::new(zone(), 5, 5), &[Work, Carry, Move], Some(RoleTag::Harvester));
        b.agent(Pos::new(zone(), 6, 5), &[Work, Carry, Move], Some(RoleTag::Harvester));
        b.agent(Pos::new(ZoneId::new(1, 0), 6, 5), &[Move], Some(RoleTag::Scout));
        let mut roster = AgentRoster::new();
        roster.sync(
            &b.build(),
            &roles,
            &mut MemoryStore::new(),
            &Migrations::standard(),
        );
        let counts = roster.counts_by_zone();
        assert_eq!(counts[&zone()][&RoleTag::Harvester], 2);
        assert_eq!(counts[&ZoneId::new(1, 0)][&RoleTag::Scout], 1);
    }
}
