//! The reference world: an hecs `World` plus terrain and a tick counter.
//!
//! Entities are addressed from outside by their [`Key`]; the hecs handle is
//! an internal detail rebuilt on load. [`SimWorld::snapshot`] produces the
//! read-only view the controller consumes.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use colony_logic::capability::Body;
use colony_logic::roles::RoleTag;
use colony_logic::types::{EntityId, Pos, ResourceKind, Store, ZoneId};
use colony_logic::world::{Entity, Owner, Snapshot, StructureKind, TerrainGrid};
use hecs::{DynamicBundle, EntityBuilder, World};

use crate::components::*;

pub struct SimWorld {
    pub ecs: World,
    tick: u64,
    next_id: u64,
    terrain: BTreeMap<ZoneId, TerrainGrid>,
    handles: HashMap<EntityId, hecs::Entity>,
}

impl SimWorld {
    pub fn new() -> Self {
        Self {
            ecs: World::new(),
            tick: 0,
            next_id: 1,
            terrain: BTreeMap::new(),
            handles: HashMap::new(),
        }
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn set_tick(&mut self, tick: u64) {
        self.tick = tick;
    }

    pub(crate) fn next_id(&self) -> u64 {
        self.next_id
    }

    pub(crate) fn set_next_id(&mut self, next_id: u64) {
        self.next_id = self.next_id.max(next_id);
    }

    pub fn add_terrain(&mut self, zone: ZoneId, grid: TerrainGrid) {
        self.terrain.insert(zone, grid);
    }

    pub fn terrain(&self, zone: ZoneId) -> Option<&TerrainGrid> {
        self.terrain.get(&zone)
    }

    pub fn terrains(&self) -> impl Iterator<Item = (&ZoneId, &TerrainGrid)> {
        self.terrain.iter()
    }

    pub fn known_zones(&self) -> BTreeSet<ZoneId> {
        self.terrain.keys().copied().collect()
    }

    /// Spawns `bundle` with a fresh key and placement.
    pub fn insert(&mut self, pos: Pos, owner: Owner, bundle: impl DynamicBundle) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        self.restore(Key(id), Placement { pos, owner }, bundle);
        id
    }

    /// Re-spawns an entity under an existing key.
    pub(crate) fn restore(&mut self, key: Key, place: Placement, bundle: impl DynamicBundle) {
        let mut builder = EntityBuilder::new();
        builder.add(key).add(place).add_bundle(bundle);
        let handle = self.ecs.spawn(builder.build());
        self.handles.insert(key.0, handle);
        self.next_id = self.next_id.max(key.0 .0 + 1);
    }

    pub fn add_agent(&mut self, pos: Pos, owner: Owner, body: Body, role: Option<RoleTag>) -> EntityId {
        let cargo = Cargo(Store::new(body.carry_capacity()));
        self.insert(pos, owner, (Agent::new(body, role), cargo))
    }

    pub fn add_structure(&mut self, pos: Pos, owner: Owner, kind: StructureKind) -> EntityId {
        let building = Building::new(kind);
        match kind.store_capacity() {
            Some(capacity) => self.insert(pos, owner, (building, Cargo(Store::new(capacity)))),
            None => self.insert(pos, owner, (building,)),
        }
    }

    /// A structure holding `energy` from the start.
    pub fn add_stocked(&mut self, pos: Pos, kind: StructureKind, energy: u32) -> EntityId {
        let id = self.add_structure(pos, Owner::Mine, kind);
        self.with_cargo(id, |store| store.add(ResourceKind::Energy, energy));
        id
    }

    pub fn add_site(&mut self, pos: Pos, kind: StructureKind) -> EntityId {
        self.insert(pos, Owner::Mine, (Site { kind, progress: 0 },))
    }

    pub fn add_source(&mut self, pos: Pos, capacity: u32) -> EntityId {
        self.insert(pos, Owner::Neutral, (Source::new(capacity),))
    }

    pub fn add_deposit(&mut self, pos: Pos, amount: u32) -> EntityId {
        self.insert(pos, Owner::Neutral, (Deposit { amount },))
    }

    pub fn add_pile(&mut self, pos: Pos, resource: ResourceKind, amount: u32) -> EntityId {
        self.insert(pos, Owner::Neutral, (Pile { resource, amount },))
    }

    pub fn add_controller(&mut self, pos: Pos, owner: Owner, level: u8) -> EntityId {
        let controller = if level == 0 {
            Controller::unclaimed()
        } else {
            Controller::owned(level)
        };
        self.insert(pos, owner, (controller,))
    }

    pub fn handle(&self, id: EntityId) -> Option<hecs::Entity> {
        self.handles.get(&id).copied()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.handles.contains_key(&id)
    }

    pub fn despawn(&mut self, id: EntityId) -> bool {
        match self.handles.remove(&id) {
            Some(h) => self.ecs.despawn(h).is_ok(),
            None => false,
        }
    }

    pub fn placement(&self, id: EntityId) -> Option<Placement> {
        let h = self.handle(id)?;
        self.ecs.get::<&Placement>(h).ok().map(|p| *p)
    }

    pub fn set_placement(&mut self, id: EntityId, place: Placement) {
        if let Some(h) = self.handle(id) {
            if let Ok(mut p) = self.ecs.get::<&mut Placement>(h) {
                *p = place;
            }
        }
    }

    /// Runs `f` on the entity's store, if it has one.
    pub fn with_cargo<R>(&mut self, id: EntityId, f: impl FnOnce(&mut Store) -> R) -> Option<R> {
        let h = self.handle(id)?;
        let mut cargo = self.ecs.get::<&mut Cargo>(h).ok()?;
        Some(f(&mut cargo.0))
    }

    pub fn cargo(&self, id: EntityId) -> Option<Store> {
        let h = self.handle(id)?;
        self.ecs.get::<&Cargo>(h).ok().map(|c| c.0.clone())
    }

    pub fn agent(&self, id: EntityId) -> Option<Agent> {
        let h = self.handle(id)?;
        self.ecs.get::<&Agent>(h).ok().map(|a| (*a).clone())
    }

    /// Keys of every entity carrying component `T`, ascending.
    pub fn keys_with<T: hecs::Component>(&self) -> Vec<EntityId> {
        let mut keys: Vec<EntityId> = self
            .ecs
            .query::<(&Key, &T)>()
            .iter()
            .map(|(_, (k, _))| k.0)
            .collect();
        keys.sort();
        keys
    }

    /// Zones we can see: any zone holding one of our agents, structures or
    /// controllers.
    pub fn visible_zones(&self) -> BTreeSet<ZoneId> {
        self.ecs
            .query::<&Placement>()
            .iter()
            .filter(|(_, p)| p.owner == Owner::Mine)
            .map(|(_, p)| p.pos.zone)
            .collect()
    }

    pub fn snapshot(&self) -> Snapshot {
        let mut snap = Snapshot::new(self.tick);
        for (zone, grid) in &self.terrain {
            snap.add_terrain(*zone, grid.clone());
        }
        let visible = self.visible_zones();
        let mut entities: Vec<Entity> = Vec::new();
        for (handle, (key, place)) in self.ecs.query::<(&Key, &Placement)>().iter() {
            if !visible.contains(&place.pos.zone) {
                continue;
            }
            let Some(kind) = self.ecs.entity(handle).ok().and_then(entity_kind) else {
                continue;
            };
            entities.push(Entity {
                id: key.0,
                pos: place.pos,
                owner: place.owner,
                kind,
            });
        }
        entities.sort_by_key(|e| e.id);
        for zone in visible {
            snap.reveal(zone);
        }
        for entity in entities {
            snap.insert(entity);
        }
        snap
    }

    pub fn count_agents(&self, owner: Owner) -> usize {
        self.ecs
            .query::<(&Agent, &Placement)>()
            .iter()
            .filter(|(_, (_, p))| p.owner == owner)
            .count()
    }

    pub fn count_structures(&self, kind: StructureKind) -> usize {
        self.ecs
            .query::<(&Building, &Placement)>()
            .iter()
            .filter(|(_, (b, p))| b.kind == kind && p.owner == Owner::Mine)
            .count()
    }

    /// Controllers we own, with their levels.
    pub fn owned_controllers(&self) -> Vec<(ZoneId, u8)> {
        let mut out: Vec<(ZoneId, u8)> = self
            .ecs
            .query::<(&Controller, &Placement)>()
            .iter()
            .filter(|(_, (c, p))| p.owner == Owner::Mine && c.level > 0)
            .map(|(_, (c, p))| (p.pos.zone, c.level))
            .collect();
        out.sort();
        out
    }

    /// Energy a zone's spawns and extensions hold, and can hold.
    pub fn spawn_energy(&self, zone: ZoneId) -> (u32, u32) {
        self.ecs
            .query::<(&Building, &Cargo, &Placement)>()
            .iter()
            .filter(|(_, (b, _, p))| {
                p.pos.zone == zone
                    && p.owner == Owner::Mine
                    && matches!(b.kind, StructureKind::Spawn | StructureKind::Extension)
            })
            .fold((0, 0), |(have, cap), (_, (_, c, _))| {
                (have + c.0.get(ResourceKind::Energy), cap + c.0.capacity)
            })
    }

    /// Whether an agent may stand on `pos`.
    pub fn is_walkable(&self, pos: &Pos) -> bool {
        let Some(grid) = self.terrain(pos.zone) else {
            return false;
        };
        if !grid.at(pos).is_passable() {
            return false;
        }
        !self
            .ecs
            .query::<(&Building, &Placement)>()
            .iter()
            .any(|(_, (b, p))| p.pos == *pos && !b.kind.is_walkable())
    }
}

impl Default for SimWorld {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use colony_logic::capability::CapabilityUnit::*;
    use colony_logic::world::{Category, WorldView};

    fn at(zone: ZoneId, x: u8, y: u8) -> Pos {
        Pos::new(zone, x, y)
    }

    #[test]
    fn test_snapshot_only_shows_owned_zones() {
        let home = ZoneId::new(0, 0);
        let away = ZoneId::new(1, 0);
        let mut world = SimWorld::new();
        world.add_terrain(home, TerrainGrid::open());
        world.add_terrain(away, TerrainGrid::open());
        let harvester = world.add_agent(
            at(home, 10, 10),
            Owner::Mine,
            Body::new(vec![Work, Carry, Move]),
            Some(RoleTag::Harvester),
        );
        world.add_source(at(home, 5, 5), 3_000);
        let hidden = world.add_source(at(away, 5, 5), 3_000);

        let snap = world.snapshot();
        assert_eq!(snap.zones(), vec![home]);
        assert!(snap.resolve(harvester).is_some());
        assert!(snap.resolve(hidden).is_none());
        assert!(snap.terrain(away).is_some());
        assert_eq!(snap.query(home, Category::Sources).len(), 1);
    }

    #[test]
    fn test_keys_are_never_reused() {
        let mut world = SimWorld::new();
        let zone = ZoneId::new(0, 0);
        let a = world.add_source(at(zone, 1, 1), 100);
        assert!(world.despawn(a));
        let b = world.add_source(at(zone, 1, 1), 100);
        assert!(b > a);
        assert!(!world.contains(a));
    }

    #[test]
    fn test_spawn_energy_sums_spawns_and_extensions() {
        let mut world = SimWorld::new();
        let zone = ZoneId::new(0, 0);
        world.add_stocked(at(zone, 10, 10), StructureKind::Spawn, 200);
        world.add_stocked(at(zone, 12, 10), StructureKind::Extension, 50);
        world.add_stocked(at(zone, 14, 10), StructureKind::Container, 900);
        assert_eq!(world.spawn_energy(zone), (250, 350));
    }

    #[test]
    fn test_walls_and_structures_block_tiles() {
        let mut world = SimWorld::new();
        let zone = ZoneId::new(0, 0);
        world.add_terrain(zone, TerrainGrid::from_rows(&["#"]));
        world.add_structure(at(zone, 5, 5), Owner::Mine, StructureKind::Spawn);
        world.add_structure(at(zone, 6, 6), Owner::Mine, StructureKind::Road);
        assert!(!world.is_walkable(&at(zone, 0, 0)));
        assert!(!world.is_walkable(&at(zone, 5, 5)));
        assert!(world.is_walkable(&at(zone, 6, 6)));
        assert!(!world.is_walkable(&at(ZoneId::new(9, 9), 1, 1)));
    }
}
