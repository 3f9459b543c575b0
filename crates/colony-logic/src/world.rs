//! Read-only world snapshot.
//!
//! The controller never mutates the world directly. Each tick it receives a
//! [`WorldView`]: entities grouped by zone, an id index for resolving
//! references, and the static terrain grid of every known zone. [`Snapshot`]
//! is the plain-data implementation used by the reference world and tests.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::capability::Body;
use crate::roles::RoleTag;
use crate::types::{AgentId, EntityId, Pos, Store, ZoneId, ZONE_AREA, ZONE_SIZE};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Terrain {
    #[default]
    Plain,
    Swamp,
    Wall,
}

impl Terrain {
    pub fn is_passable(self) -> bool {
        self != Terrain::Wall
    }
}

/// Static terrain of one zone, row-major.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawTerrainGrid")]
pub struct TerrainGrid {
    tiles: Vec<Terrain>,
}

#[derive(Deserialize)]
struct RawTerrainGrid {
    tiles: Vec<Terrain>,
}

impl TryFrom<RawTerrainGrid> for TerrainGrid {
    type Error = String;

    fn try_from(raw: RawTerrainGrid) -> Result<Self, Self::Error> {
        if raw.tiles.len() != ZONE_AREA {
            return Err(format!(
                "terrain grid has {} tiles, expected {ZONE_AREA}",
                raw.tiles.len()
            ));
        }
        Ok(Self { tiles: raw.tiles })
    }
}

impl Default for TerrainGrid {
    fn default() -> Self {
        Self::open()
    }
}

impl TerrainGrid {
    pub fn open() -> Self {
        Self {
            tiles: vec![Terrain::Plain; ZONE_AREA],
        }
    }

    /// Parses rows of `.` (plain), `~` (swamp) and `#` (wall). Missing rows
    /// and columns are plain; extra ones are ignored.
    pub fn from_rows(rows: &[&str]) -> Self {
        let mut grid = Self::open();
        for (y, row) in rows.iter().take(ZONE_SIZE as usize).enumerate() {
            for (x, c) in row.chars().take(ZONE_SIZE as usize).enumerate() {
                let t = match c {
                    '#' => Terrain::Wall,
                    '~' => Terrain::Swamp,
                    _ => Terrain::Plain,
                };
                grid.set(x as u8, y as u8, t);
            }
        }
        grid
    }

    pub fn get(&self, x: u8, y: u8) -> Terrain {
        if x >= ZONE_SIZE || y >= ZONE_SIZE {
            return Terrain::Wall;
        }
        self.tiles[y as usize * ZONE_SIZE as usize + x as usize]
    }

    pub fn at(&self, pos: &Pos) -> Terrain {
        self.get(pos.x, pos.y)
    }

    pub fn set(&mut self, x: u8, y: u8, terrain: Terrain) {
        if x < ZONE_SIZE && y < ZONE_SIZE {
            self.tiles[y as usize * ZONE_SIZE as usize + x as usize] = terrain;
        }
    }

    pub fn count(&self, terrain: Terrain) -> usize {
        self.tiles.iter().filter(|t| **t == terrain).count()
    }

    pub fn fraction(&self, terrain: Terrain) -> f32 {
        self.count(terrain) as f32 / ZONE_AREA as f32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Owner {
    Mine,
    Hostile,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StructureKind {
    Spawn,
    Extension,
    Tower,
    Storage,
    Container,
    Road,
    Wall,
    Rampart,
    Link,
}

impl StructureKind {
    /// Walls and ramparts carry huge hit pools and are only topped up to a
    /// floor, never to full.
    pub fn is_fortification(self) -> bool {
        matches!(self, StructureKind::Wall | StructureKind::Rampart)
    }

    /// Whether agents can stand on the structure's tile. Ramparts are
    /// walkable only for their owner; callers check ownership.
    pub fn is_walkable(self) -> bool {
        matches!(
            self,
            StructureKind::Road | StructureKind::Container | StructureKind::Rampart
        )
    }

    /// Structures that receive energy from haulers.
    pub fn is_refill_sink(self) -> bool {
        matches!(
            self,
            StructureKind::Spawn | StructureKind::Extension | StructureKind::Tower
        )
    }

    pub fn is_bulk_store(self) -> bool {
        matches!(self, StructureKind::Storage | StructureKind::Container)
    }

    pub fn hits_max(self) -> u32 {
        match self {
            StructureKind::Spawn => 5_000,
            StructureKind::Extension => 1_000,
            StructureKind::Tower => 3_000,
            StructureKind::Storage => 10_000,
            StructureKind::Container => 5_000,
            StructureKind::Road => 5_000,
            StructureKind::Wall | StructureKind::Rampart => 1_000_000,
            StructureKind::Link => 1_000,
        }
    }

    /// Store capacity, or `None` for structures without a store.
    pub fn store_capacity(self) -> Option<u32> {
        match self {
            StructureKind::Spawn => Some(300),
            StructureKind::Extension => Some(50),
            StructureKind::Tower => Some(1_000),
            StructureKind::Storage => Some(1_000_000),
            StructureKind::Container => Some(2_000),
            StructureKind::Link => Some(800),
            StructureKind::Road | StructureKind::Wall | StructureKind::Rampart => None,
        }
    }

    /// Progress needed to finish a construction site of this kind.
    pub fn build_cost(self) -> u32 {
        match self {
            StructureKind::Spawn => 15_000,
            StructureKind::Extension => 3_000,
            StructureKind::Tower => 5_000,
            StructureKind::Storage => 30_000,
            StructureKind::Container => 5_000,
            StructureKind::Road => 300,
            StructureKind::Wall => 1,
            StructureKind::Rampart => 1,
            StructureKind::Link => 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub body: Body,
    pub store: Store,
    pub hits: u32,
    pub hits_max: u32,
    pub fatigue: u32,
    /// Role stamped at spawn time, if the agent was spawned by us.
    pub role: Option<RoleTag>,
    /// Still being assembled inside a spawn.
    pub spawning: bool,
    /// Ticks left before the agent expires.
    pub ttl: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureInfo {
    pub kind: StructureKind,
    pub hits: u32,
    pub hits_max: u32,
    pub store: Option<Store>,
    /// Foreign barriers explicitly marked passable (e.g. public ramparts).
    pub traversable: bool,
    /// Spawns: currently assembling an agent.
    pub busy: bool,
}

impl StructureInfo {
    /// A freshly built structure: full health, empty store.
    pub fn new(kind: StructureKind) -> Self {
        Self {
            kind,
            hits: kind.hits_max(),
            hits_max: kind.hits_max(),
            store: kind.store_capacity().map(Store::new),
            traversable: false,
            busy: false,
        }
    }

    pub fn health_fraction(&self) -> f32 {
        if self.hits_max == 0 {
            return 1.0;
        }
        self.hits as f32 / self.hits_max as f32
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteInfo {
    pub kind: StructureKind,
    pub progress: u32,
    pub progress_total: u32,
}

impl SiteInfo {
    pub fn is_complete(&self) -> bool {
        self.progress >= self.progress_total
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub energy: u32,
    pub capacity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MineralInfo {
    pub amount: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroppedInfo {
    pub resource: crate::types::ResourceKind,
    pub amount: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub owner: Owner,
    pub ticks: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerInfo {
    pub level: u8,
    pub progress: u32,
    pub progress_total: u32,
    pub reservation: Option<Reservation>,
    /// Ticks until the controller loses a level if not upgraded.
    pub downgrade_in: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EntityKind {
    Agent(AgentInfo),
    Structure(StructureInfo),
    Site(SiteInfo),
    Source(SourceInfo),
    Mineral(MineralInfo),
    Dropped(DroppedInfo),
    Controller(ControllerInfo),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub pos: Pos,
    pub owner: Owner,
    pub kind: EntityKind,
}

impl Entity {
    pub fn as_agent(&self) -> Option<&AgentInfo> {
        match &self.kind {
            EntityKind::Agent(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_structure(&self) -> Option<&StructureInfo> {
        match &self.kind {
            EntityKind::Structure(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_site(&self) -> Option<&SiteInfo> {
        match &self.kind {
            EntityKind::Site(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_source(&self) -> Option<&SourceInfo> {
        match &self.kind {
            EntityKind::Source(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_controller(&self) -> Option<&ControllerInfo> {
        match &self.kind {
            EntityKind::Controller(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_dropped(&self) -> Option<&DroppedInfo> {
        match &self.kind {
            EntityKind::Dropped(d) => Some(d),
            _ => None,
        }
    }

    /// The resource store of an agent or storing structure.
    pub fn store(&self) -> Option<&Store> {
        match &self.kind {
            EntityKind::Agent(a) => Some(&a.store),
            EntityKind::Structure(s) => s.store.as_ref(),
            _ => None,
        }
    }

    pub fn is_mine(&self) -> bool {
        self.owner == Owner::Mine
    }

    pub fn is_hostile(&self) -> bool {
        self.owner == Owner::Hostile
    }
}

/// Category predicates for enumerating a zone's entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Any,
    MyAgents,
    HostileAgents,
    MyStructures,
    HostileStructures,
    Structures(StructureKind),
    Sites,
    Sources,
    Minerals,
    Dropped,
    Controllers,
}

impl Category {
    pub fn matches(self, entity: &Entity) -> bool {
        match (self, &entity.kind) {
            (Category::Any, _) => true,
            (Category::MyAgents, EntityKind::Agent(_)) => entity.is_mine(),
            (Category::HostileAgents, EntityKind::Agent(_)) => entity.is_hostile(),
            (Category::MyStructures, EntityKind::Structure(_)) => entity.is_mine(),
            (Category::HostileStructures, EntityKind::Structure(_)) => entity.is_hostile(),
            (Category::Structures(kind), EntityKind::Structure(s)) => s.kind == kind,
            (Category::Sites, EntityKind::Site(_)) => true,
            (Category::Sources, EntityKind::Source(_)) => true,
            (Category::Minerals, EntityKind::Mineral(_)) => true,
            (Category::Dropped, EntityKind::Dropped(_)) => true,
            (Category::Controllers, EntityKind::Controller(_)) => true,
            _ => false,
        }
    }
}

/// Per-tick, read-only view of the world.
pub trait WorldView {
    fn tick(&self) -> u64;

    /// Zones currently visible, in ascending order.
    fn zones(&self) -> Vec<ZoneId>;

    fn is_visible(&self, zone: ZoneId) -> bool;

    /// Every entity in a visible zone. Empty for non-visible zones.
    fn entities(&self, zone: ZoneId) -> &[Entity];

    /// Resolves an opaque id; absent when destroyed, consumed or out of sight.
    fn resolve(&self, id: EntityId) -> Option<&Entity>;

    /// Static terrain; available for every known zone, visible or not.
    fn terrain(&self, zone: ZoneId) -> Option<&TerrainGrid>;

    fn query(&self, zone: ZoneId, category: Category) -> Vec<&Entity> {
        self.entities(zone)
            .iter()
            .filter(|e| category.matches(e))
            .collect()
    }

    /// Nearest entity of a category to `from` in the same zone.
    fn find_nearest(&self, from: &Pos, category: Category) -> Option<&Entity> {
        self.entities(from.zone)
            .iter()
            .filter(|e| category.matches(e))
            .min_by_key(|e| (from.range_to(&e.pos), e.id))
    }

    fn agent(&self, id: AgentId) -> Option<(&Entity, &AgentInfo)> {
        let entity = self.resolve(id.entity())?;
        entity.as_agent().map(|a| (entity, a))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZoneView {
    pub entities: Vec<Entity>,
}

/// Plain-data [`WorldView`].
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    tick: u64,
    visible: BTreeMap<ZoneId, ZoneView>,
    terrain: BTreeMap<ZoneId, TerrainGrid>,
    index: HashMap<EntityId, (ZoneId, usize)>,
}

impl Snapshot {
    pub fn new(tick: u64) -> Self {
        Self {
            tick,
            ..Self::default()
        }
    }

    /// Adds terrain for a zone without making it visible.
    pub fn add_terrain(&mut self, zone: ZoneId, grid: TerrainGrid) {
        self.terrain.insert(zone, grid);
    }

    /// Marks a zone visible (possibly with no entities).
    pub fn reveal(&mut self, zone: ZoneId) {
        self.visible.entry(zone).or_default();
        self.terrain.entry(zone).or_default();
    }

    /// Adds an entity, revealing its zone. A repeated id replaces the
    /// earlier entry.
    pub fn insert(&mut self, entity: Entity) {
        let zone = entity.pos.zone;
        self.remove(entity.id);
        self.reveal(zone);
        let view = self.visible.entry(zone).or_default();
        self.index.insert(entity.id, (zone, view.entities.len()));
        view.entities.push(entity);
    }

    pub fn remove(&mut self, id: EntityId) -> Option<Entity> {
        let (zone, idx) = self.index.remove(&id)?;
        let view = self.visible.get_mut(&zone)?;
        let removed = view.entities.remove(idx);
        for (i, e) in view.entities.iter().enumerate().skip(idx) {
            self.index.insert(e.id, (zone, i));
        }
        Some(removed)
    }

    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        let (zone, idx) = *self.index.get(&id)?;
        self.visible.get_mut(&zone)?.entities.get_mut(idx)
    }

    pub fn set_tick(&mut self, tick: u64) {
        self.tick = tick;
    }

    pub fn known_zones(&self) -> BTreeSet<ZoneId> {
        self.terrain.keys().copied().collect()
    }
}

impl WorldView for Snapshot {
    fn tick(&self) -> u64 {
        self.tick
    }

    fn zones(&self) -> Vec<ZoneId> {
        self.visible.keys().copied().collect()
    }

    fn is_visible(&self, zone: ZoneId) -> bool {
        self.visible.contains_key(&zone)
    }

    fn entities(&self, zone: ZoneId) -> &[Entity] {
        self.visible
            .get(&zone)
            .map(|v| v.entities.as_slice())
            .unwrap_or(&[])
    }

    fn resolve(&self, id: EntityId) -> Option<&Entity> {
        let (zone, idx) = self.index.get(&id)?;
        self.visible.get(zone)?.entities.get(*idx)
    }

    fn terrain(&self, zone: ZoneId) -> Option<&TerrainGrid> {
        self.terrain.get(&zone)
    }
}
