//! End-to-end scenarios for the colony tick.
//!
//! Exercises: roster sync → cleanup → planning → allocation → spawning
//! → dispatch → persistence, all through [`Colony::tick`] against a
//! built snapshot and a recording sink.

use std::collections::BTreeMap;

use colony_logic::allocation::RemovalReason;
use colony_logic::capability::{Body, CapabilityUnit::*};
use colony_logic::config::ColonyConfig;
use colony_logic::cost::{CostModel, PathRequest};
use colony_logic::memory::StateTag;
use colony_logic::roles::RoleTag;
use colony_logic::store::MemoryStore;
use colony_logic::task::{TaskKind, TaskOrigin};
use colony_logic::testing::{RecordingSink, SnapshotBuilder};
use colony_logic::types::{AgentId, Pos, ResourceKind, Store, ZoneId};
use colony_logic::world::{Owner, StructureKind};
use colony_logic::Colony;

// ── Helpers ────────────────────────────────────────────────────────────

fn home() -> ZoneId {
    ZoneId::new(0, 0)
}

fn at(x: u8, y: u8) -> Pos {
    Pos::new(home(), x, y)
}

/// A level-2 colony with a spawn, two sources and a container.
fn base(tick: u64) -> SnapshotBuilder {
    let mut b = SnapshotBuilder::new(tick);
    b.controller(at(25, 25), Owner::Mine, 2);
    b.stocked(at(20, 20), StructureKind::Spawn, 0);
    b.stocked(at(30, 30), StructureKind::Container, 500);
    b.source(at(5, 5), 3_000);
    b.source(at(44, 44), 3_000);
    b
}

fn harvester_row(desired: u32) -> ColonyConfig {
    let mut config = ColonyConfig::default();
    config
        .population
        .desired
        .insert(RoleTag::Harvester, vec![0, desired, desired]);
    config
}

// ── Action guard ───────────────────────────────────────────────────────

#[test]
fn at_most_one_action_per_agent_per_tick() {
    let mut b = base(1);
    b.site(at(22, 22), StructureKind::Extension, 0);
    b.dropped(at(28, 28), 200);
    b.hostile(at(40, 10), &[Attack, Move]);
    let agents = [
        b.agent(at(6, 6), &[Work, Work, Carry, Move], Some(RoleTag::Harvester)),
        b.agent(at(29, 29), &[Carry, Carry, Move], Some(RoleTag::Hauler)),
        b.agent(at(21, 21), &[Work, Carry, Move], Some(RoleTag::Builder)),
        b.agent(at(24, 24), &[Work, Carry, Move], Some(RoleTag::Upgrader)),
        b.agent(at(39, 10), &[Attack, Move], Some(RoleTag::Defender)),
    ];
    let mut colony = Colony::new(ColonyConfig::default());
    let mut store = MemoryStore::new();

    for tick in 1..=40 {
        let mut sink = RecordingSink::default();
        let report = colony.tick(&b.at(tick), &mut sink, &mut store);
        assert!(report.dispatch.failures.is_empty(), "tick {tick}: {:?}", report.dispatch.failures);
        assert!(report.dispatch.actions <= report.dispatch.dispatched);
        for agent in agents {
            let n = sink.actions_of(agent).len();
            assert!(n <= 1, "{agent} acted {n} times at tick {tick}");
        }
    }
}

// ── Cleanup ────────────────────────────────────────────────────────────

#[test]
fn lost_target_is_removed_within_one_tick() {
    let mut b = base(1);
    let drop = b.dropped(at(12, 12), 300);
    let hauler = b.agent(at(15, 15), &[Carry, Carry, Move], Some(RoleTag::Hauler));
    let mut colony = Colony::new(ColonyConfig::default());
    let mut store = MemoryStore::new();

    colony.tick(&b.build(), &mut RecordingSink::default(), &mut store);
    let pickup = colony
        .board()
        .tasks()
        .find(|t| t.kind == TaskKind::Pickup && t.target == drop)
        .map(|t| t.id)
        .expect("pickup task for the dropped energy");

    b.snapshot_mut().remove(drop);
    let report = colony.tick(&b.at(2), &mut RecordingSink::default(), &mut store);
    assert!(report.cleanup.removed.contains(&(pickup, RemovalReason::TargetLost)));
    assert!(colony.board().get(pickup).is_none());
    assert_ne!(colony.board().task_of(hauler).map(|t| t.id), Some(pickup));
}

#[test]
fn task_age_ceiling_is_a_lease() {
    let mut b = base(1);
    let harvester = b.agent(at(6, 6), &[Work, Work, Carry, Move], Some(RoleTag::Harvester));
    let mut colony = Colony::new(ColonyConfig::default());
    let mut store = MemoryStore::new();

    colony.tick(&b.build(), &mut RecordingSink::default(), &mut store);
    let first = colony.board().task_of(harvester).expect("harvest task");
    assert_eq!(first.created_at, 1);
    let first = first.id;

    for tick in 2..=300 {
        colony.tick(&b.at(tick), &mut RecordingSink::default(), &mut store);
    }
    assert!(colony.board().get(first).is_some(), "alive at age 299");

    let report = colony.tick(&b.at(301), &mut RecordingSink::default(), &mut store);
    assert!(report.cleanup.removed.contains(&(first, RemovalReason::Expired)));
    assert!(colony.board().get(first).is_none());
    assert_ne!(colony.board().task_of(harvester).map(|t| t.id), Some(first));
}

// ── Planning and allocation ────────────────────────────────────────────

#[test]
fn harvester_deficit_creates_that_many_tasks() {
    let mut b = base(1);
    b.agent(at(6, 6), &[Work, Work, Carry, Move], Some(RoleTag::Harvester));
    let mut colony = Colony::new(harvester_row(3));
    let mut store = MemoryStore::new();

    let report = colony.tick(&b.build(), &mut RecordingSink::default(), &mut store);
    let created: Vec<_> = report
        .allocation
        .created
        .iter()
        .filter_map(|id| colony.board().get(*id))
        .filter(|t| t.origin == TaskOrigin::Deficit(RoleTag::Harvester))
        .collect();
    assert_eq!(created.len(), 2);
    assert!(created.iter().all(|t| t.kind == TaskKind::Harvest));

    // The deficit is already covered next tick.
    let again = colony.tick(&b.at(2), &mut RecordingSink::default(), &mut store);
    let harvest_created = again
        .allocation
        .created
        .iter()
        .filter_map(|id| colony.board().get(*id))
        .filter(|t| t.kind == TaskKind::Harvest)
        .count();
    assert_eq!(harvest_created, 0);
}

#[test]
fn full_harvester_delivers_on_the_same_evaluation() {
    let mut b = base(1);
    let body = Body::new(vec![Work, Work, Carry, Move]);
    let full = Store::new(body.carry_capacity()).with(ResourceKind::Energy, body.carry_capacity());
    let harvester = b.agent_with(at(19, 19), body, full, Some(RoleTag::Harvester));
    let mut colony = Colony::new(ColonyConfig::default());
    let mut sink = RecordingSink::default();

    colony.tick(&b.build(), &mut sink, &mut MemoryStore::new());
    let record = colony.roster().get(harvester).expect("in roster");
    assert_eq!(record.memory.state, StateTag::Delivering);
    let actions = sink.actions_of(harvester);
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].name(), "transfer");
}

#[test]
fn spawns_the_missing_harvester_first() {
    let mut b = SnapshotBuilder::new(1);
    b.controller(at(25, 25), Owner::Mine, 1);
    b.stocked(at(20, 20), StructureKind::Spawn, 300);
    b.source(at(5, 5), 3_000);
    let mut colony = Colony::new(ColonyConfig::default());
    let mut sink = RecordingSink::default();

    let report = colony.tick(&b.build(), &mut sink, &mut MemoryStore::new());
    assert_eq!(report.spawned(), 1);
    let (_, role, body) = &sink.spawns[0];
    assert_eq!(*role, RoleTag::Harvester);
    assert!(body.cost() <= 300);
}

// ── Movement costs ─────────────────────────────────────────────────────

#[test]
fn stale_terrain_is_recomputed_and_hostiles_always_count() {
    let config = ColonyConfig::default();
    let mut model = CostModel::new();
    let req = PathRequest::new(at(10, 10), at(40, 40), 1);

    model.surface(&base(0).build(), &req, &config);
    assert_eq!(model.rebuilds(), 1);

    let mut b = base(1);
    b.hostile(at(25, 10), &[RangedAttack, Move]);
    let s = model.surface(&b.build(), &req, &config);
    assert_eq!(model.rebuilds(), 1);
    assert!(s.matrix.get(26, 10) > s.plain_cost);

    let mut b = base(1_000);
    b.hostile(at(25, 10), &[RangedAttack, Move]);
    let s = model.surface(&b.build(), &req, &config);
    assert_eq!(model.rebuilds(), 2);
    assert_eq!(model.built_at(home()), Some(1_000));
    assert!(s.matrix.get(26, 10) > s.plain_cost);
}

// ── Failure isolation and restarts ─────────────────────────────────────

#[test]
fn one_faulty_agent_does_not_stop_the_tick() {
    let mut b = base(1);
    let body = Body::new(vec![Work, Work, Carry, Move]);
    let full = Store::new(body.carry_capacity()).with(ResourceKind::Energy, body.carry_capacity());
    let faulty = b.agent_with(at(19, 19), body.clone(), full.clone(), Some(RoleTag::Harvester));
    let healthy = b.agent_with(at(21, 21), body, full, Some(RoleTag::Harvester));
    let mut colony = Colony::new(ColonyConfig::default());
    let mut sink = RecordingSink::default();
    sink.panic_on(faulty);

    let report = colony.tick(&b.build(), &mut sink, &mut MemoryStore::new());
    assert_eq!(report.dispatch.failures.len(), 1);
    assert_eq!(report.dispatch.failures[0].0, faulty);
    assert_eq!(sink.actions_of(healthy).len(), 1);
    assert_eq!(report.dispatch.dispatched, 2);
}

#[test]
fn restart_keeps_memory_tasks_and_intel() {
    let mut b = base(1);
    let harvester = b.agent(at(6, 6), &[Work, Work, Carry, Move], Some(RoleTag::Harvester));
    let hauler = b.agent(at(29, 29), &[Carry, Carry, Move], Some(RoleTag::Hauler));
    let mut store = MemoryStore::new();
    let mut colony = Colony::new(ColonyConfig::default());
    for tick in 1..=5 {
        colony.tick(&b.at(tick), &mut RecordingSink::default(), &mut store);
    }
    let states: BTreeMap<AgentId, StateTag> = [harvester, hauler]
        .into_iter()
        .filter_map(|id| colony.roster().get(id).map(|r| (id, r.memory.state)))
        .collect();
    let task = colony.board().task_of(harvester).map(|t| t.id);
    let zones = colony.zones().len();

    let mut restored = Colony::restore(ColonyConfig::default(), &store);
    assert_eq!(restored.zones().len(), zones);
    let report = restored.tick(&b.at(6), &mut RecordingSink::default(), &mut store);
    assert!(report.roster.reinitialized.is_empty());
    assert_eq!(report.roster.born.len(), 2);
    assert_eq!(restored.board().task_of(harvester).map(|t| t.id), task);
    for (id, state) in states {
        let record = restored.roster().get(id).expect("restored agent");
        assert_eq!(record.memory.state, state);
    }
}
