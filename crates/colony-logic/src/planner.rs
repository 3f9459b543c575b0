//! Task demand planner.
//!
//! Runs once per tick after cleanup. For every colony zone (a visible zone
//! whose controller is ours) it computes the role deficits against the
//! desired-count table and scans the snapshot for candidate work. Nothing
//! here is persisted: refill, repair and pickup candidates are recomputed
//! from scratch every tick, while the expansion targets it reads come from
//! the persisted [`ExpansionRegistry`].
//!
//! | Candidate list | Source | Task kind |
//! |----------------|--------|-----------|
//! | `refill` | own spawns, extensions, towers with free capacity | Transfer |
//! | `repair` | own structures below the repair fraction; fortifications below the floor | Repair |
//! | `pickup` | dropped resources of at least the minimum amount | Pickup |
//! | `build` | own unfinished construction sites | Build |
//! | `hostiles` | hostile agents | Attack, RangedAttack |
//! | `hostile_structures` | hostile structures | Dismantle |
//! | `wounded` | damaged own agents | Heal |
//! | `withdraw` | own containers and storage holding energy | Withdraw |
//! | `sources` | energy sources | Harvest |
//! | `controller` | own controller | Upgrade |
//! | `expansions` | expansion targets homed here | ClaimController, ReserveController |

use std::collections::BTreeMap;

use crate::config::ColonyConfig;
use crate::intel::{ExpansionKind, ExpansionRegistry};
use crate::roles::RoleTag;
use crate::task::{priority, NewTask, TaskKind, TaskOrigin};
use crate::types::{EntityId, Pos, ResourceKind, ZoneId};
use crate::world::{Category, Entity, EntityKind, Owner, StructureKind, WorldView};

/// A piece of work the allocator may turn into a task.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub kind: TaskKind,
    pub target: EntityId,
    pub pos: Pos,
    pub priority: i32,
    pub resource: Option<ResourceKind>,
    pub amount: Option<u32>,
}

impl Candidate {
    pub fn new(kind: TaskKind, entity: &Entity, priority: i32) -> Self {
        Self {
            kind,
            target: entity.id,
            pos: entity.pos,
            priority,
            resource: None,
            amount: None,
        }
    }

    pub fn with_resource(mut self, resource: ResourceKind, amount: Option<u32>) -> Self {
        self.resource = Some(resource);
        self.amount = amount;
        self
    }

    pub fn to_task(&self, zone: ZoneId, origin: TaskOrigin) -> NewTask {
        let mut task = NewTask::new(self.kind, self.target, self.priority, zone).origin(origin);
        if let Some(resource) = self.resource {
            task = task.resource(resource, self.amount);
        }
        task
    }
}

/// Everything the allocator and spawner need to know about one zone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ZoneDemand {
    pub zone: ZoneId,
    pub level: u8,
    pub counts: BTreeMap<RoleTag, u32>,
    /// Positive deficits only.
    pub deficits: BTreeMap<RoleTag, u32>,
    pub refill: Vec<Candidate>,
    pub repair: Vec<Candidate>,
    pub pickup: Vec<Candidate>,
    pub build: Vec<Candidate>,
    pub hostiles: Vec<Candidate>,
    pub hostile_structures: Vec<Candidate>,
    pub wounded: Vec<Candidate>,
    pub withdraw: Vec<Candidate>,
    pub sources: Vec<Candidate>,
    pub controller: Option<Candidate>,
    pub expansions: Vec<Candidate>,
    pub energy_available: u32,
    pub energy_capacity: u32,
    /// Own spawns not currently busy.
    pub spawns: Vec<EntityId>,
}

impl ZoneDemand {
    pub fn deficit(&self, role: RoleTag) -> u32 {
        self.deficits.get(&role).copied().unwrap_or(0)
    }

    pub fn count(&self, role: RoleTag) -> u32 {
        self.counts.get(&role).copied().unwrap_or(0)
    }

    /// Candidates turned into opportunity tasks every tick.
    pub fn opportunities(&self) -> impl Iterator<Item = &Candidate> {
        self.refill
            .iter()
            .chain(&self.repair)
            .chain(&self.pickup)
            .chain(&self.build)
            .chain(&self.hostiles)
            .chain(&self.hostile_structures)
            .chain(&self.wounded)
            .chain(&self.withdraw)
            .chain(&self.controller)
            .chain(&self.expansions)
    }

    /// Targets a deficit task of `kind` is spread over.
    pub fn deficit_targets(&self, kind: TaskKind) -> Vec<&Candidate> {
        let list: Vec<&Candidate> = match kind {
            TaskKind::Harvest => self.sources.iter().collect(),
            TaskKind::Upgrade => self.controller.iter().collect(),
            TaskKind::Build => self.build.iter().collect(),
            TaskKind::Repair => self.repair.iter().collect(),
            TaskKind::Withdraw => self.withdraw.iter().collect(),
            TaskKind::Heal => self.wounded.iter().collect(),
            TaskKind::Dismantle => self.hostile_structures.iter().collect(),
            _ => self
                .hostiles
                .iter()
                .chain(&self.expansions)
                .filter(|c| c.kind == kind)
                .collect(),
        };
        list
    }

    pub fn has_threat(&self) -> bool {
        !self.hostiles.is_empty()
    }
}

/// Own controller level of a zone, if it is a colony zone.
pub fn colony_level(world: &dyn WorldView, zone: ZoneId) -> Option<u8> {
    world
        .query(zone, Category::Controllers)
        .into_iter()
        .filter(|e| e.is_mine())
        .find_map(|e| e.as_controller())
        .map(|c| c.level)
        .filter(|level| *level > 0)
}

/// Plans every colony zone of the snapshot.
pub fn plan(
    world: &dyn WorldView,
    counts: &BTreeMap<ZoneId, BTreeMap<RoleTag, u32>>,
    expansion: &ExpansionRegistry,
    config: &ColonyConfig,
) -> Vec<ZoneDemand> {
    world
        .zones()
        .into_iter()
        .filter_map(|zone| {
            let level = colony_level(world, zone)?;
            let counts = counts.get(&zone).cloned().unwrap_or_default();
            Some(plan_zone(world, zone, level, counts, expansion, config))
        })
        .collect()
}

pub fn plan_zone(
    world: &dyn WorldView,
    zone: ZoneId,
    level: u8,
    counts: BTreeMap<RoleTag, u32>,
    expansion: &ExpansionRegistry,
    config: &ColonyConfig,
) -> ZoneDemand {
    let planner = &config.planner;
    let mut d = ZoneDemand {
        zone,
        level,
        counts,
        ..ZoneDemand::default()
    };

    for e in world.entities(zone) {
        match &e.kind {
            EntityKind::Structure(s) if e.is_mine() => {
                if let Some(store) = &s.store {
                    if s.kind.is_refill_sink() && store.free() > 0 {
                        let p = if s.kind == StructureKind::Tower {
                            priority::REFILL_TOWER
                        } else {
                            priority::REFILL_SPAWN
                        };
                        d.refill.push(
                            Candidate::new(TaskKind::Transfer, e, p)
                                .with_resource(ResourceKind::Energy, Some(store.free())),
                        );
                    }
                    if s.kind.is_bulk_store() && store.get(ResourceKind::Energy) > 0 {
                        d.withdraw.push(
                            Candidate::new(TaskKind::Withdraw, e, priority::WITHDRAW)
                                .with_resource(ResourceKind::Energy, None),
                        );
                    }
                    if matches!(s.kind, StructureKind::Spawn | StructureKind::Extension) {
                        d.energy_available += store.get(ResourceKind::Energy);
                        d.energy_capacity += store.capacity;
                    }
                }
                if s.kind == StructureKind::Spawn && !s.busy {
                    d.spawns.push(e.id);
                }
                if let Some(fraction) = repair_fraction(s.kind, s.hits, s.hits_max, config) {
                    d.repair
                        .push(Candidate::new(TaskKind::Repair, e, priority::repair(fraction)));
                }
            }
            EntityKind::Structure(_) if e.is_hostile() => {
                d.hostile_structures
                    .push(Candidate::new(TaskKind::Dismantle, e, priority::DISMANTLE));
            }
            EntityKind::Site(site) if e.is_mine() && !site.is_complete() => {
                let p = match site.kind {
                    StructureKind::Spawn | StructureKind::Extension | StructureKind::Tower => {
                        priority::BUILD_CORE
                    }
                    _ => priority::BUILD,
                };
                d.build.push(Candidate::new(TaskKind::Build, e, p));
            }
            EntityKind::Agent(_) if e.is_hostile() => {
                d.hostiles
                    .push(Candidate::new(TaskKind::Attack, e, priority::ATTACK));
                d.hostiles.push(Candidate::new(
                    TaskKind::RangedAttack,
                    e,
                    priority::ATTACK - 5,
                ));
            }
            EntityKind::Agent(a) if e.is_mine() && !a.spawning && a.hits < a.hits_max => {
                d.wounded.push(Candidate::new(TaskKind::Heal, e, priority::HEAL));
            }
            EntityKind::Dropped(drop) if drop.amount >= planner.min_pickup_amount => {
                d.pickup.push(
                    Candidate::new(TaskKind::Pickup, e, priority::PICKUP)
                        .with_resource(drop.resource, Some(drop.amount)),
                );
            }
            EntityKind::Source(source) if source.energy > 0 => {
                d.sources
                    .push(Candidate::new(TaskKind::Harvest, e, priority::HARVEST));
            }
            EntityKind::Controller(c) if e.is_mine() => {
                let p = if c.downgrade_in < planner.controller_downgrade_alert {
                    priority::UPGRADE_URGENT
                } else {
                    priority::UPGRADE
                };
                d.controller = Some(Candidate::new(TaskKind::Upgrade, e, p));
            }
            _ => {}
        }
    }

    for target in expansion.targets_for(zone) {
        let (kind, p) = match target.kind {
            ExpansionKind::Claim => (TaskKind::ClaimController, priority::CLAIM),
            ExpansionKind::Reserve => (TaskKind::ReserveController, priority::RESERVE),
        };
        // A visible reservation already at the target needs no claimer.
        let reserved = world
            .resolve(target.controller)
            .and_then(|e| match &e.kind {
                EntityKind::Controller(c) => c.reservation,
                _ => None,
            })
            .filter(|r| r.owner == Owner::Mine)
            .map_or(0, |r| r.ticks);
        if kind == TaskKind::ReserveController && reserved >= config.expansion.reserve_target {
            continue;
        }
        d.expansions.push(Candidate {
            kind,
            target: target.controller,
            pos: target.controller_pos,
            priority: p,
            resource: None,
            amount: None,
        });
    }

    for role in RoleTag::ALL {
        let desired = desired_for(role, &d, config);
        let deficit = desired.saturating_sub(d.count(role));
        if deficit > 0 {
            d.deficits.insert(role, deficit);
        }
    }
    log::trace!("{zone}: level {level}, deficits {:?}", d.deficits);
    d
}

/// Health fraction of a structure that needs repair, or `None`.
/// Fortifications are measured against the floor, not their hit pool.
pub(crate) fn repair_fraction(
    kind: StructureKind,
    hits: u32,
    hits_max: u32,
    config: &ColonyConfig,
) -> Option<f32> {
    let planner = &config.planner;
    if kind.is_fortification() {
        let floor = planner.fortification_floor.min(hits_max).max(1);
        return (hits < floor).then(|| hits as f32 / floor as f32);
    }
    if hits_max == 0 {
        return None;
    }
    let fraction = hits as f32 / hits_max as f32;
    (fraction < planner.repair_fraction).then_some(fraction)
}

/// Desired count adjusted for the zone's situation: combat roles only
/// while there is something to fight or heal, claimers only for targets.
fn desired_for(role: RoleTag, d: &ZoneDemand, config: &ColonyConfig) -> u32 {
    let desired = config.population.desired(role, d.level);
    match role {
        RoleTag::Defender if !d.has_threat() => 0,
        RoleTag::Healer if !d.has_threat() && d.wounded.is_empty() => 0,
        RoleTag::Claimer => desired.min(d.expansions.len() as u32),
        RoleTag::Builder if d.build.is_empty() => desired.min(1),
        _ => desired,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::CapabilityUnit::*;
    use crate::config::PopulationTable;
    use crate::testing::SnapshotBuilder;
    use crate::world::{Owner, StructureInfo};

    fn zone() -> ZoneId {
        ZoneId::new(0, 0)
    }

    fn at(x: u8, y: u8) -> Pos {
        Pos::new(zone(), x, y)
    }

    fn colony(level: u8) -> SnapshotBuilder {
        let mut b = SnapshotBuilder::new(100);
        b.controller(at(25, 25), Owner::Mine, level);
        b
    }

    #[test]
    fn test_harvester_deficit_from_table() {
        let mut config = ColonyConfig::default();
        let mut table = PopulationTable::default();
        table.desired.insert(RoleTag::Harvester, vec![0, 0, 3]);
        config.population = table;

        let mut b = colony(2);
        b.source(at(10, 10), 3_000);
        let snap = b.build();
        let mut counts = BTreeMap::new();
        counts.insert(zone(), BTreeMap::from([(RoleTag::Harvester, 1)]));

        let demands = plan(&snap, &counts, &ExpansionRegistry::new(), &config);
        assert_eq!(demands.len(), 1);
        assert_eq!(demands[0].deficit(RoleTag::Harvester), 2);
        assert_eq!(demands[0].deficit_targets(TaskKind::Harvest).len(), 1);
    }

    #[test]
    fn test_zones_without_own_controller_are_skipped() {
        let mut b = SnapshotBuilder::new(1);
        b.controller(at(25, 25), Owner::Neutral, 0);
        b.source(at(10, 10), 3_000);
        let demands = plan(
            &b.build(),
            &BTreeMap::new(),
            &ExpansionRegistry::new(),
            &ColonyConfig::default(),
        );
        assert!(demands.is_empty());
    }

    #[test]
    fn test_candidates_recomputed_from_snapshot() {
        let config = ColonyConfig::default();
        let mut b = colony(3);
        b.stocked(at(20, 20), StructureKind::Spawn, 100);
        b.stocked(at(21, 20), StructureKind::Extension, 50);
        b.stocked(at(22, 20), StructureKind::Container, 400);
        let mut road = StructureInfo::new(StructureKind::Road);
        road.hits = road.hits_max / 2;
        b.structure_with(at(5, 5), Owner::Mine, road);
        let mut wall = StructureInfo::new(StructureKind::Wall);
        wall.hits = 200_000;
        b.structure_with(at(6, 5), Owner::Mine, wall);
        b.dropped(at(30, 30), 20);
        b.dropped(at(31, 30), 80);
        b.site(at(40, 40), StructureKind::Extension, 0);

        let d = plan_zone(
            &b.build(),
            zone(),
            3,
            BTreeMap::new(),
            &ExpansionRegistry::new(),
            &config,
        );
        // The full extension is not a refill target.
        assert_eq!(d.refill.len(), 1);
        assert_eq!(d.refill[0].amount, Some(200));
        assert_eq!(d.energy_available, 150);
        assert_eq!(d.energy_capacity, 350);
        assert_eq!(d.spawns.len(), 1);
        // The wall is above the fortification floor.
        assert_eq!(d.repair.len(), 1);
        assert_eq!(d.pickup.len(), 1);
        assert_eq!(d.withdraw.len(), 1);
        assert_eq!(d.build[0].priority, priority::BUILD_CORE);
        assert!(d.controller.is_some());
    }

    #[test]
    fn test_combat_roles_only_wanted_under_threat() {
        let config = ColonyConfig::default();
        let mut b = colony(4);
        let calm = plan_zone(
            &b.build(),
            zone(),
            4,
            BTreeMap::new(),
            &ExpansionRegistry::new(),
            &config,
        );
        assert_eq!(calm.deficit(RoleTag::Defender), 0);
        assert_eq!(calm.deficit(RoleTag::Healer), 0);

        b.hostile(at(45, 45), &[Attack, Move]);
        let threatened = plan_zone(
            &b.build(),
            zone(),
            4,
            BTreeMap::new(),
            &ExpansionRegistry::new(),
            &config,
        );
        assert_eq!(threatened.deficit(RoleTag::Defender), 2);
        assert_eq!(threatened.deficit(RoleTag::Healer), 1);
        assert_eq!(threatened.deficit_targets(TaskKind::Attack).len(), 1);
    }

    #[test]
    fn test_claimers_capped_by_expansion_targets() {
        let config = ColonyConfig::default();
        let b = colony(4);
        let d = plan_zone(
            &b.build(),
            zone(),
            4,
            BTreeMap::new(),
            &ExpansionRegistry::new(),
            &config,
        );
        assert_eq!(d.deficit(RoleTag::Claimer), 0);
    }
}
