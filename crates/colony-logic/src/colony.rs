//! The per-tick controller.
//!
//! [`Colony`] owns every registry that lives across ticks and runs one tick
//! against a world snapshot, an action sink and a state store. The order is
//! fixed; later steps rely on the earlier ones having run:
//!
//! | Step | What |
//! |------|------|
//! | 1 | roster sync (births, deaths, memory load) |
//! | 2 | zone records and terrain profiles |
//! | 3 | due duties (scouting sweep, expansion review, pruning) |
//! | 4 | task cleanup |
//! | 5 | demand planning |
//! | 6 | allocation |
//! | 7 | spawning |
//! | 8 | per-agent dispatch |
//! | 9 | persistence |
//!
//! Cleanup always precedes planning and allocation, so a stale task is never
//! handed out.

use std::collections::BTreeSet;

use crate::action::ActionSink;
use crate::agent::{AgentRoster, RosterChanges};
use crate::allocation::{AllocationReport, CleanupReport, RemovalReason, TaskBoard, TaskStats};
use crate::config::ColonyConfig;
use crate::cost::CostModel;
use crate::fsm::{dispatch_all, DispatchReport, TickContext};
use crate::intel::{ExpansionRegistry, ScoutRegistry};
use crate::memory::Migrations;
use crate::planner::plan;
use crate::roles::RoleRegistry;
use crate::schedule::{Duty, DutyScheduler};
use crate::spawn::{plan_spawns, SpawnDecision};
use crate::store::{Scope, StateStore};
use crate::types::{AgentId, ZoneId};
use crate::world::WorldView;
use crate::zone::ZoneRegistry;

/// Everything that happened in one tick.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub tick: u64,
    pub roster: RosterChanges,
    pub sighted: Vec<ZoneId>,
    pub duties: Vec<Duty>,
    pub cleanup: CleanupReport,
    pub planned_zones: usize,
    pub allocation: AllocationReport,
    pub spawns: Vec<SpawnDecision>,
    pub dispatch: DispatchReport,
    pub pruned_zones: Vec<ZoneId>,
    pub pruned_records: Vec<AgentId>,
    pub store_errors: Vec<String>,
}

impl TickReport {
    pub fn spawned(&self) -> usize {
        self.spawns
            .iter()
            .filter(|d| matches!(d, SpawnDecision::Spawned(_)))
            .count()
    }

    pub fn removed(&self, reason: RemovalReason) -> usize {
        self.cleanup.count(reason)
    }
}

pub struct Colony {
    config: ColonyConfig,
    roles: RoleRegistry,
    migrations: Migrations,
    roster: AgentRoster,
    board: TaskBoard,
    costs: CostModel,
    zones: ZoneRegistry,
    intel: ScoutRegistry,
    expansion: ExpansionRegistry,
    scheduler: DutyScheduler,
}

impl Colony {
    pub fn new(config: ColonyConfig) -> Self {
        Self::with_roles(config, RoleRegistry::standard())
    }

    pub fn with_roles(config: ColonyConfig, roles: RoleRegistry) -> Self {
        let scheduler = DutyScheduler::from_config(&config.duties);
        Self {
            config,
            roles,
            migrations: Migrations::standard(),
            roster: AgentRoster::new(),
            board: TaskBoard::new(),
            costs: CostModel::new(),
            zones: ZoneRegistry::new(),
            intel: ScoutRegistry::new(),
            expansion: ExpansionRegistry::new(),
            scheduler,
        }
    }

    /// Rebuilds a colony from a store written by earlier ticks. Registries
    /// that fail to decode start empty; agent memory is read lazily on the
    /// first roster sync.
    pub fn restore(config: ColonyConfig, store: &dyn StateStore) -> Self {
        let mut colony = Self::new(config);
        match TaskBoard::load(store) {
            Ok(board) => colony.board = board,
            Err(e) => log::warn!("task table dropped: {e}"),
        }
        match ScoutRegistry::load(store) {
            Ok(intel) => colony.intel = intel,
            Err(e) => log::warn!("scouting intel dropped: {e}"),
        }
        match ExpansionRegistry::load(store) {
            Ok(expansion) => colony.expansion = expansion,
            Err(e) => log::warn!("expansion targets dropped: {e}"),
        }
        colony.zones = ZoneRegistry::load(store);
        log::info!(
            "restored {} tasks, {} zones, {} scouted zones",
            colony.board.len(),
            colony.zones.len(),
            colony.intel.len()
        );
        colony
    }

    pub fn config(&self) -> &ColonyConfig {
        &self.config
    }

    pub fn roles(&self) -> &RoleRegistry {
        &self.roles
    }

    pub fn roster(&self) -> &AgentRoster {
        &self.roster
    }

    pub fn board(&self) -> &TaskBoard {
        &self.board
    }

    pub fn board_mut(&mut self) -> &mut TaskBoard {
        &mut self.board
    }

    pub fn zones(&self) -> &ZoneRegistry {
        &self.zones
    }

    pub fn intel(&self) -> &ScoutRegistry {
        &self.intel
    }

    pub fn expansion(&self) -> &ExpansionRegistry {
        &self.expansion
    }

    pub fn scheduler(&self) -> &DutyScheduler {
        &self.scheduler
    }

    pub fn costs(&self) -> &CostModel {
        &self.costs
    }

    pub fn stats(&self) -> TaskStats {
        self.board.stats()
    }

    pub fn tick(
        &mut self,
        world: &dyn WorldView,
        sink: &mut dyn ActionSink,
        store: &mut dyn StateStore,
    ) -> TickReport {
        let tick = world.tick();
        let mut report = TickReport {
            tick,
            ..TickReport::default()
        };

        report.roster = self
            .roster
            .sync(world, &self.roles, store, &self.migrations);
        self.board.sync_live(self.roster.ids());

        report.sighted = self.zones.observe(world);
        let counts = self.roster.counts_by_zone();
        self.zones.set_counts(&counts);
        self.refresh_profiles(world);

        report.duties = self.scheduler.due(tick);
        for duty in report.duties.clone() {
            self.run_duty(duty, world, store, &mut report);
        }

        report.cleanup = self.board.cleanup(world, &self.config, &self.intel);

        let demands = plan(world, &counts, &self.expansion, &self.config);
        report.planned_zones = demands.len();

        report.allocation =
            self.board
                .allocate(world, &demands, &self.roster, &self.roles, &self.config);

        report.spawns = plan_spawns(&demands, &self.roles, sink);

        let mut tc = TickContext {
            world,
            board: &mut self.board,
            costs: &mut self.costs,
            sink,
            intel: &mut self.intel,
            expansion: &self.expansion,
            roles: &self.roles,
            config: &self.config,
        };
        report.dispatch = dispatch_all(&mut self.roster, &mut tc);

        self.persist(store, &mut report);
        log::debug!(
            "tick {tick}: {} agents, {} tasks, {} actions, {} idle, {} failures",
            self.roster.len(),
            self.board.len(),
            report.dispatch.actions,
            report.dispatch.idle,
            report.dispatch.failures.len()
        );
        report
    }

    /// Reclassifies the terrain of visible zones whose profile went stale.
    fn refresh_profiles(&mut self, world: &dyn WorldView) {
        let tick = world.tick();
        let ttl = self.config.terrain_cache_ttl;
        let stale: Vec<ZoneId> = self
            .zones
            .iter()
            .filter(|r| r.last_seen == tick)
            .filter(|r| r.profile_at.map_or(true, |at| tick.saturating_sub(at) >= ttl))
            .map(|r| r.zone)
            .collect();
        for zone in stale {
            let (profile, _) = self.costs.profile(world, zone, &self.config);
            self.zones.set_profile(zone, profile, tick);
            self.intel.set_profile(zone, profile);
        }
    }

    fn run_duty(
        &mut self,
        duty: Duty,
        world: &dyn WorldView,
        store: &mut dyn StateStore,
        report: &mut TickReport,
    ) {
        let tick = world.tick();
        match duty {
            Duty::ScoutSweep => {
                let refreshed = self.intel.sweep(world);
                for record in self.zones.iter() {
                    if let Some(profile) = record.profile {
                        self.intel.set_profile(record.zone, profile);
                    }
                }
                log::debug!("scouting sweep refreshed {refreshed} zones");
            }
            Duty::ExpansionReview => {
                let homes = self.zones.colonies();
                self.expansion
                    .review(&self.intel, &homes, tick, &self.config);
                log::info!(
                    "expansion review: {} targets",
                    self.expansion.targets().len()
                );
            }
            Duty::ZonePrune => {
                let ttl = self.config.zone_prune_ttl;
                report.pruned_zones = self.zones.prune(tick, ttl, store);
                let zones = &self.zones;
                self.costs.retain(|z| zones.get(z).is_some());
                let forgotten = self.intel.prune(tick, ttl);
                if forgotten > 0 {
                    log::info!("forgot intel on {forgotten} zones");
                }
            }
            Duty::StorePrune => {
                let live: BTreeSet<AgentId> = self.roster.ids().into_iter().collect();
                for scope in store.scopes() {
                    if let Scope::Agent(id) = scope {
                        if !live.contains(&id) {
                            store.remove(&scope);
                            report.pruned_records.push(id);
                        }
                    }
                }
                if !report.pruned_records.is_empty() {
                    log::info!("pruned {} orphaned agent records", report.pruned_records.len());
                }
            }
        }
    }

    fn persist(&self, store: &mut dyn StateStore, report: &mut TickReport) {
        self.roster.persist(store);
        let results = [
            ("task table", self.board.save(store)),
            ("scouting intel", self.intel.save(store)),
            ("expansion targets", self.expansion.save(store)),
            ("zones", self.zones.persist(store)),
        ];
        for (what, result) in results {
            if let Err(e) = result {
                log::warn!("{what} not saved: {e}");
                report.store_errors.push(format!("{what}: {e}"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::CapabilityUnit::*;
    use crate::memory::{encode_memory, AgentMemory, StateTag};
    use crate::roles::RoleTag;
    use crate::store::{MemoryStore, Registry};
    use crate::task::TaskKind;
    use crate::testing::{RecordingSink, SnapshotBuilder};
    use crate::types::Pos;
    use crate::world::{Owner, StructureKind};

    fn at(x: u8, y: u8) -> Pos {
        Pos::new(ZoneId::new(0, 0), x, y)
    }

    fn colony_snapshot() -> SnapshotBuilder {
        let mut b = SnapshotBuilder::new(1);
        b.controller(at(25, 25), Owner::Mine, 2);
        b.stocked(at(20, 20), StructureKind::Spawn, 300);
        b.source(at(5, 5), 3_000);
        b.source(at(40, 40), 3_000);
        b
    }

    #[test]
    fn test_tick_plans_allocates_spawns_and_dispatches() {
        let mut b = colony_snapshot();
        let harvester = b.agent(at(6, 6), &[Work, Work, Carry, Move], Some(RoleTag::Harvester));
        let snap = b.build();
        let mut colony = Colony::new(ColonyConfig::default());
        let mut sink = RecordingSink::default();
        let mut store = MemoryStore::new();

        let report = colony.tick(&snap, &mut sink, &mut store);
        assert_eq!(report.roster.born, vec![harvester]);
        assert_eq!(report.planned_zones, 1);
        assert!(!report.allocation.created.is_empty());
        assert_eq!(
            colony.board().task_of(harvester).map(|t| t.kind),
            Some(TaskKind::Harvest)
        );
        assert_eq!(report.spawned(), 1);
        assert_eq!(sink.spawns.len(), 1);
        assert_eq!(report.dispatch.dispatched, 1);
        assert!(report.dispatch.failures.is_empty());
        assert!(store.get(&Scope::Agent(harvester)).is_some());
        assert!(store.get(&Scope::Global(Registry::TaskTable)).is_some());
        assert!(colony.zones().get(ZoneId::new(0, 0)).unwrap().profile.is_some());
    }

    #[test]
    fn test_restore_keeps_assignments() {
        let mut b = colony_snapshot();
        let harvester = b.agent(at(6, 6), &[Work, Work, Carry, Move], Some(RoleTag::Harvester));
        let snap = b.build();
        let mut colony = Colony::new(ColonyConfig::default());
        let mut store = MemoryStore::new();
        colony.tick(&snap, &mut RecordingSink::default(), &mut store);
        let task = colony.board().task_of(harvester).map(|t| t.id);
        assert!(task.is_some());

        let mut restored = Colony::restore(ColonyConfig::default(), &store);
        assert_eq!(restored.board().task_of(harvester).map(|t| t.id), task);
        let report = restored.tick(&b.at(2), &mut RecordingSink::default(), &mut store);
        assert!(report.roster.reinitialized.is_empty());
        assert_eq!(restored.board().task_of(harvester).map(|t| t.id), task);
    }

    #[test]
    fn test_store_prune_drops_orphaned_records() {
        let mut config = ColonyConfig::default();
        config.duties.store_prune = 1;
        let b = colony_snapshot();
        let mut store = MemoryStore::new();
        let ghost = encode_memory(&AgentMemory::new(
            RoleTag::Hauler,
            StateTag::Collecting,
            ZoneId::new(0, 0),
        ))
        .unwrap();
        store.set(Scope::Agent(AgentId(999)), ghost);
        let mut colony = Colony::new(config);
        let report = colony.tick(&b.build(), &mut RecordingSink::default(), &mut store);
        assert!(report.duties.contains(&Duty::StorePrune));
        assert_eq!(report.pruned_records, vec![AgentId(999)]);
        assert!(store.get(&Scope::Agent(AgentId(999))).is_none());
    }
}
