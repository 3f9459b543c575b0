//! Movement cost model.
//!
//! Produces the per-zone cost surface an external path planner searches.
//! The surface is built in two layers:
//!
//! - **Static**: terrain weights chosen by the zone's [`TerrainProfile`].
//!   Classification and the base matrix are cached per zone and rebuilt
//!   once older than `terrain_cache_ttl`.
//! - **Dynamic**: structures, construction, allies, hostiles, exclusion
//!   buffers around resource nodes and zone borders. Rebuilt on every
//!   request and never cached.
//!
//! Per-request tuning then adjusts weights for goal distance, the agent's
//! load and fatigue, and whether the path leaves the zone.

use std::collections::HashMap;

use crate::capability::{Body, CapabilityUnit};
use crate::config::{ColonyConfig, MovementWeights};
use crate::terrain::{classify, ProfileSettings, TerrainProfile, TerrainStats};
use crate::types::{Pos, ZoneId, ZONE_AREA, ZONE_SIZE};
use crate::world::{Entity, EntityKind, Owner, Terrain, TerrainGrid, WorldView};

/// Cost of a tile that must never be entered.
pub const IMPASSABLE: u8 = 255;

/// Highest cost penalties can raise a walkable tile to.
const MAX_WALKABLE: u8 = 254;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CostMatrix {
    costs: Vec<u8>,
}

impl CostMatrix {
    pub fn filled(cost: u8) -> Self {
        Self {
            costs: vec![cost; ZONE_AREA],
        }
    }

    pub fn get(&self, x: u8, y: u8) -> u8 {
        if x >= ZONE_SIZE || y >= ZONE_SIZE {
            return IMPASSABLE;
        }
        self.costs[Self::idx(x, y)]
    }

    pub fn at(&self, pos: &Pos) -> u8 {
        self.get(pos.x, pos.y)
    }

    pub fn set(&mut self, x: u8, y: u8, cost: u8) {
        if x < ZONE_SIZE && y < ZONE_SIZE {
            self.costs[Self::idx(x, y)] = cost;
        }
    }

    pub fn block(&mut self, x: u8, y: u8) {
        self.set(x, y, IMPASSABLE);
    }

    /// Adds a penalty. Impassable tiles stay impassable and walkable tiles
    /// never become impassable through penalties alone.
    pub fn add(&mut self, x: u8, y: u8, penalty: u8) {
        let cur = self.get(x, y);
        if cur != IMPASSABLE {
            self.set(x, y, cur.saturating_add(penalty).min(MAX_WALKABLE));
        }
    }

    pub fn is_blocked(&self, x: u8, y: u8) -> bool {
        self.get(x, y) == IMPASSABLE
    }

    fn idx(x: u8, y: u8) -> usize {
        y as usize * ZONE_SIZE as usize + x as usize
    }
}

/// One path-cost query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathRequest {
    pub origin: Pos,
    pub goal: Pos,
    pub range: u32,
    /// Carried amount over capacity, 0.0..=1.0.
    pub load_fraction: f32,
    /// Fatigue-generating weight per move unit; 1.0 keeps full speed on
    /// plain terrain.
    pub fatigue_ratio: f32,
}

impl PathRequest {
    pub fn new(origin: Pos, goal: Pos, range: u32) -> Self {
        Self {
            origin,
            goal,
            range,
            load_fraction: 0.0,
            fatigue_ratio: 1.0,
        }
    }

    /// Fills load and fatigue from the agent's body and cargo.
    pub fn for_body(mut self, body: &Body, used: u32) -> Self {
        let capacity = body.carry_capacity();
        self.load_fraction = if capacity == 0 {
            0.0
        } else {
            (used as f32 / capacity as f32).min(1.0)
        };
        self.fatigue_ratio = fatigue_ratio(body, self.load_fraction);
        self
    }

    pub fn crosses_zone(&self) -> bool {
        self.origin.zone != self.goal.zone
    }

    pub fn distance(&self) -> u32 {
        self.origin.range_to(&self.goal)
    }
}

/// Weight of fatigue-generating parts per move part. Empty carry parts
/// weigh nothing; loaded ones weigh in proportion to the load.
pub fn fatigue_ratio(body: &Body, load_fraction: f32) -> f32 {
    let moves = body.count(CapabilityUnit::Move);
    let carries = body.count(CapabilityUnit::Carry) as f32;
    let others = body.len() as f32 - moves as f32 - carries;
    let weight = others + carries * load_fraction;
    weight / moves.max(1) as f32
}

/// The cost surface handed to a path planner.
#[derive(Debug, Clone, PartialEq)]
pub struct CostSurface {
    pub zone: ZoneId,
    pub matrix: CostMatrix,
    pub profile: TerrainProfile,
    /// Ticks a planned path may be reused before replanning.
    pub replan_interval: u32,
    /// Search budget.
    pub max_ops: u32,
    pub plain_cost: u8,
    pub swamp_cost: u8,
    pub crosses_zone: bool,
}

impl CostSurface {
    pub fn cost(&self, pos: &Pos) -> u8 {
        if pos.zone != self.zone {
            return self.plain_cost;
        }
        self.matrix.at(pos)
    }
}

struct StaticLayer {
    profile: TerrainProfile,
    stats: TerrainStats,
    settings: ProfileSettings,
    base: CostMatrix,
    built_at: u64,
}

/// Per-zone cache of static layers plus the dynamic overlay builder.
#[derive(Default)]
pub struct CostModel {
    cache: HashMap<ZoneId, StaticLayer>,
    rebuilds: u64,
}

impl CostModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Static layers built since creation.
    pub fn rebuilds(&self) -> u64 {
        self.rebuilds
    }

    /// Tick the zone's static layer was last built.
    pub fn built_at(&self, zone: ZoneId) -> Option<u64> {
        self.cache.get(&zone).map(|l| l.built_at)
    }

    pub fn invalidate(&mut self, zone: ZoneId) {
        self.cache.remove(&zone);
    }

    /// Drops cached layers for zones not in `keep`.
    pub fn retain(&mut self, keep: impl Fn(ZoneId) -> bool) {
        self.cache.retain(|z, _| keep(*z));
    }

    /// Terrain profile of a zone, classifying it if the cache is stale.
    pub fn profile(
        &mut self,
        world: &dyn WorldView,
        zone: ZoneId,
        config: &ColonyConfig,
    ) -> (TerrainProfile, TerrainStats) {
        let layer = self.static_layer(world, zone, config);
        (layer.profile, layer.stats)
    }

    fn static_layer(
        &mut self,
        world: &dyn WorldView,
        zone: ZoneId,
        config: &ColonyConfig,
    ) -> &StaticLayer {
        let tick = world.tick();
        let stale = match self.cache.get(&zone) {
            Some(layer) => tick.saturating_sub(layer.built_at) >= config.terrain_cache_ttl,
            None => true,
        };
        if stale {
            let open = TerrainGrid::open();
            let grid = world.terrain(zone).unwrap_or(&open);
            let (profile, stats) = classify(grid, zone, &config.movement);
            let settings = profile.settings();
            let base = terrain_matrix(grid, settings.plain_cost, settings.swamp_cost);
            log::debug!("{zone}: terrain classified {profile:?} at tick {tick}");
            self.rebuilds += 1;
            self.cache.insert(
                zone,
                StaticLayer {
                    profile,
                    stats,
                    settings,
                    base,
                    built_at: tick,
                },
            );
        }
        // Present: inserted above when stale.
        &self.cache[&zone]
    }

    /// Builds the full surface for the zone of `request.origin`.
    pub fn surface(
        &mut self,
        world: &dyn WorldView,
        request: &PathRequest,
        config: &ColonyConfig,
    ) -> CostSurface {
        let zone = request.origin.zone;
        let weights = &config.movement;
        let crosses = request.crosses_zone();
        let distance = request.distance();
        let far = crosses || distance > weights.far_goal_range;

        let layer = self.static_layer(world, zone, config);
        let settings = layer.settings;
        let profile = layer.profile;

        let plain_cost = settings.plain_cost + u8::from(far);
        let fatigue = request
            .fatigue_ratio
            .clamp(1.0, weights.fatigue_swamp_cap.max(1.0));
        let swamp_cost = ((settings.swamp_cost as f32 * fatigue).round() as u8).min(MAX_WALKABLE);

        let mut matrix = if plain_cost == settings.plain_cost && swamp_cost == settings.swamp_cost
        {
            layer.base.clone()
        } else {
            let open = TerrainGrid::open();
            let grid = world.terrain(zone).unwrap_or(&open);
            terrain_matrix(grid, plain_cost, swamp_cost)
        };

        apply_dynamic(&mut matrix, world.entities(zone), request, weights);
        if !crosses {
            apply_border(&mut matrix, weights.border_penalty);
        }

        let mut replan_interval = settings.replan_interval;
        let mut max_ops = weights.base_ops + weights.ops_per_tile * distance;
        if crosses {
            replan_interval = (replan_interval / 2).max(1);
            max_ops *= 2;
        }

        CostSurface {
            zone,
            matrix,
            profile,
            replan_interval,
            max_ops,
            plain_cost,
            swamp_cost,
            crosses_zone: crosses,
        }
    }
}

fn terrain_matrix(grid: &TerrainGrid, plain: u8, swamp: u8) -> CostMatrix {
    let mut m = CostMatrix::filled(plain);
    for y in 0..ZONE_SIZE {
        for x in 0..ZONE_SIZE {
            match grid.get(x, y) {
                Terrain::Plain => {}
                Terrain::Swamp => m.set(x, y, swamp),
                Terrain::Wall => m.block(x, y),
            }
        }
    }
    m
}

fn apply_dynamic(
    m: &mut CostMatrix,
    entities: &[Entity],
    request: &PathRequest,
    weights: &MovementWeights,
) {
    // Roads first so blocking structures sharing a tile win.
    for e in entities {
        if let EntityKind::Structure(s) = &e.kind {
            if s.kind == crate::world::StructureKind::Road && !m.is_blocked(e.pos.x, e.pos.y) {
                m.set(e.pos.x, e.pos.y, weights.road_cost);
            }
        }
    }

    let near_goal = request.distance() <= weights.near_goal_range;
    let ally_penalty = if near_goal {
        weights.ally_penalty.saturating_mul(2)
    } else {
        weights.ally_penalty
    };

    for e in entities {
        let (x, y) = (e.pos.x, e.pos.y);
        match &e.kind {
            EntityKind::Structure(s) => {
                let barrier = s.kind.is_fortification() && e.owner != Owner::Mine;
                if barrier {
                    if !s.traversable {
                        m.block(x, y);
                    }
                } else if !s.kind.is_walkable() {
                    m.block(x, y);
                }
            }
            EntityKind::Site(_) => {
                if e.is_mine() {
                    m.add(x, y, weights.construction_penalty);
                }
            }
            EntityKind::Agent(_) if e.is_mine() => {
                if e.pos != request.origin {
                    m.add(x, y, ally_penalty);
                }
            }
            EntityKind::Agent(_) if e.is_hostile() => {
                m.block(x, y);
                spread(m, &e.pos, weights.hostile_radius, |d| {
                    let r = u32::from(weights.hostile_radius) + 1;
                    (u32::from(weights.hostile_penalty) * (r - d) / r) as u8
                });
            }
            EntityKind::Source(_) | EntityKind::Mineral(_) => {
                m.block(x, y);
                let heading_here =
                    request.goal.range_to(&e.pos) <= u32::from(weights.exclusion_radius) + request.range;
                if !heading_here {
                    spread(m, &e.pos, weights.exclusion_radius, |_| {
                        weights.exclusion_penalty
                    });
                }
            }
            EntityKind::Controller(_) => m.block(x, y),
            _ => {}
        }
    }
}

/// Adds `penalty(d)` to every tile at Chebyshev distance `1..=radius`.
fn spread(m: &mut CostMatrix, center: &Pos, radius: u8, penalty: impl Fn(u32) -> u8) {
    let r = i16::from(radius);
    for dy in -r..=r {
        for dx in -r..=r {
            if dx == 0 && dy == 0 {
                continue;
            }
            let x = i16::from(center.x) + dx;
            let y = i16::from(center.y) + dy;
            if x < 0 || y < 0 || x >= i16::from(ZONE_SIZE) || y >= i16::from(ZONE_SIZE) {
                continue;
            }
            let d = dx.unsigned_abs().max(dy.unsigned_abs()) as u32;
            m.add(x as u8, y as u8, penalty(d));
        }
    }
}

fn apply_border(m: &mut CostMatrix, penalty: u8) {
    let max = ZONE_SIZE - 1;
    for i in 0..ZONE_SIZE {
        m.add(i, 0, penalty);
        m.add(i, max, penalty);
        if i != 0 && i != max {
            m.add(0, i, penalty);
            m.add(max, i, penalty);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SnapshotBuilder;
    use crate::world::StructureKind;
    use CapabilityUnit::*;

    fn zone() -> ZoneId {
        ZoneId::new(0, 0)
    }

    fn at(x: u8, y: u8) -> Pos {
        Pos::new(zone(), x, y)
    }

    fn config_with_ttl(ttl: u64) -> ColonyConfig {
        ColonyConfig {
            terrain_cache_ttl: ttl,
            ..ColonyConfig::default()
        }
    }

    #[test]
    fn test_terrain_base_layer() {
        let mut b = SnapshotBuilder::new(0);
        b.terrain(zone(), TerrainGrid::from_rows(&["", "", "", "", "", "....#~"]));
        let snap = b.build();
        let mut model = CostModel::new();
        let req = PathRequest::new(at(10, 10), at(12, 12), 1);
        let s = model.surface(&snap, &req, &ColonyConfig::default());
        assert_eq!(s.profile, TerrainProfile::Open);
        assert_eq!(s.matrix.get(4, 5), IMPASSABLE);
        assert_eq!(s.matrix.get(5, 5), 5);
        assert_eq!(s.matrix.get(20, 20), 1);
    }

    #[test]
    fn test_static_layer_cached_until_expiry_but_dynamic_layer_fresh() {
        let config = config_with_ttl(1_000);
        let mut model = CostModel::new();
        let req = PathRequest::new(at(10, 10), at(40, 10), 1);

        let b = SnapshotBuilder::new(0);
        model.surface(&b.build(), &req, &config);
        assert_eq!(model.rebuilds(), 1);

        // Tick 999: cache still valid, but a hostile just appeared.
        let mut b = SnapshotBuilder::new(999);
        b.hostile(at(20, 20), &[Attack, Move]);
        let s = model.surface(&b.build(), &req, &config);
        assert_eq!(model.rebuilds(), 1);
        assert_eq!(s.matrix.get(20, 20), IMPASSABLE);
        assert!(s.matrix.get(21, 20) > s.matrix.get(30, 30));

        // Tick 1000: the 1000-tick-old layer is recomputed.
        let mut b = SnapshotBuilder::new(1_000);
        b.hostile(at(20, 20), &[Attack, Move]);
        let s = model.surface(&b.build(), &req, &config);
        assert_eq!(model.rebuilds(), 2);
        assert_eq!(model.built_at(zone()), Some(1_000));
        assert_eq!(s.matrix.get(20, 20), IMPASSABLE);
    }

    #[test]
    fn test_hostile_penalty_decays_with_distance() {
        let mut b = SnapshotBuilder::new(0);
        b.hostile(at(25, 25), &[Attack, Move]);
        let snap = b.build();
        let mut model = CostModel::new();
        let req = PathRequest::new(at(5, 5), at(45, 45), 1);
        let s = model.surface(&snap, &req, &ColonyConfig::default());
        let d1 = s.matrix.get(26, 25);
        let d2 = s.matrix.get(27, 25);
        let d3 = s.matrix.get(28, 25);
        let d4 = s.matrix.get(29, 25);
        assert!(d1 > d2 && d2 > d3 && d3 > d4);
        assert_eq!(d4, s.plain_cost);
    }

    #[test]
    fn test_ally_penalty_doubles_near_goal() {
        let mut b = SnapshotBuilder::new(0);
        b.agent(at(12, 10), &[Work, Carry, Move], None);
        let snap = b.build();
        let mut model = CostModel::new();
        let config = ColonyConfig::default();
        let near = model.surface(&snap, &PathRequest::new(at(10, 10), at(13, 10), 1), &config);
        let far = model.surface(&snap, &PathRequest::new(at(10, 10), at(30, 10), 1), &config);
        let w = &config.movement;
        assert_eq!(near.matrix.get(12, 10), near.plain_cost + 2 * w.ally_penalty);
        assert_eq!(far.matrix.get(12, 10), far.plain_cost + w.ally_penalty);
    }

    #[test]
    fn test_exclusion_buffer_skipped_when_heading_to_node() {
        let mut b = SnapshotBuilder::new(0);
        b.source(at(30, 30), 3_000);
        let snap = b.build();
        let mut model = CostModel::new();
        let config = ColonyConfig::default();
        let passing = model.surface(&snap, &PathRequest::new(at(10, 30), at(45, 30), 1), &config);
        assert_eq!(passing.matrix.get(30, 30), IMPASSABLE);
        assert!(passing.matrix.get(31, 30) > passing.plain_cost);
        let going = model.surface(&snap, &PathRequest::new(at(10, 30), at(30, 30), 1), &config);
        assert_eq!(going.matrix.get(31, 30), going.plain_cost);
    }

    #[test]
    fn test_foreign_barriers_block_unless_traversable() {
        let mut b = SnapshotBuilder::new(0);
        b.structure(at(5, 5), StructureKind::Rampart, Owner::Mine);
        b.structure(at(6, 5), StructureKind::Rampart, Owner::Hostile);
        let public = b.structure(at(7, 5), StructureKind::Rampart, Owner::Hostile);
        b.structure(at(8, 5), StructureKind::Road, Owner::Mine);
        b.structure(at(9, 5), StructureKind::Spawn, Owner::Mine);
        let mut snap = b.build();
        if let Some(e) = snap.entity_mut(public.into()) {
            if let EntityKind::Structure(s) = &mut e.kind {
                s.traversable = true;
            }
        }
        let mut model = CostModel::new();
        let s = model.surface(
            &snap,
            &PathRequest::new(at(20, 20), at(21, 21), 1),
            &ColonyConfig::default(),
        );
        assert!(!s.matrix.is_blocked(5, 5));
        assert!(s.matrix.is_blocked(6, 5));
        assert!(!s.matrix.is_blocked(7, 5));
        assert_eq!(s.matrix.get(8, 5), 1);
        assert!(s.matrix.is_blocked(9, 5));
    }

    #[test]
    fn test_border_penalty_only_when_staying_in_zone() {
        let snap = SnapshotBuilder::new(0).build();
        let mut model = CostModel::new();
        let config = ColonyConfig::default();
        let inside = model.surface(&snap, &PathRequest::new(at(10, 10), at(20, 10), 1), &config);
        assert_eq!(
            inside.matrix.get(0, 10),
            inside.plain_cost + config.movement.border_penalty
        );
        let leaving = PathRequest::new(at(10, 10), Pos::new(ZoneId::new(1, 0), 10, 10), 1);
        let out = model.surface(&snap, &leaving, &config);
        assert!(out.crosses_zone);
        assert_eq!(out.matrix.get(0, 10), out.plain_cost);
        assert!(out.max_ops > inside.max_ops);
        assert!(out.replan_interval < inside.replan_interval);
    }

    #[test]
    fn test_far_goals_favor_roads_and_heavy_loads_avoid_swamp() {
        let mut b = SnapshotBuilder::new(0);
        b.terrain(zone(), TerrainGrid::from_rows(&["", "", "~~~~~"]));
        let snap = b.build();
        let mut model = CostModel::new();
        let config = ColonyConfig::default();
        let near = model.surface(&snap, &PathRequest::new(at(10, 10), at(15, 10), 1), &config);
        let far = model.surface(&snap, &PathRequest::new(at(2, 2), at(45, 45), 1), &config);
        assert_eq!(far.plain_cost, near.plain_cost + 1);

        let body = Body::new(vec![Work, Work, Work, Carry, Move]);
        let loaded = PathRequest::new(at(10, 10), at(15, 10), 1).for_body(&body, 50);
        let heavy = model.surface(&snap, &loaded, &config);
        assert!(heavy.swamp_cost > near.swamp_cost);
        assert_eq!(heavy.matrix.get(3, 2), heavy.swamp_cost);
    }

    #[test]
    fn test_fatigue_ratio() {
        let balanced = Body::new(vec![Work, Carry, Move, Move]);
        assert_eq!(fatigue_ratio(&balanced, 0.0), 0.5);
        assert_eq!(fatigue_ratio(&balanced, 1.0), 1.0);
        let heavy = Body::new(vec![Work, Work, Work, Move]);
        assert_eq!(fatigue_ratio(&heavy, 0.0), 3.0);
    }
}
