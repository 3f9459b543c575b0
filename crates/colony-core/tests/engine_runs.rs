//! Long runs of the controller against the generated reference world.

use std::collections::BTreeSet;

use colony_core::generation::{generate_world, HOME};
use colony_core::intents::IntentSink;
use colony_core::systems::{apply_actions, apply_moves, apply_spawns, upkeep};
use colony_core::prelude::*;
use colony_logic::config::ColonyConfig;
use colony_logic::store::MemoryStore;
use colony_logic::world::{Category, Owner, StructureKind, WorldView};
use colony_logic::Colony;
use rand::rngs::StdRng;
use rand::SeedableRng;

// ── Helpers ────────────────────────────────────────────────────────────

fn engine(seed: u64) -> ColonyEngine {
    let mut engine = ColonyEngine::default();
    engine.generate(&WorldSetup {
        seed,
        ..WorldSetup::default()
    });
    engine
}

fn own_agent_tiles(world: &SimWorld) -> Vec<colony_logic::types::Pos> {
    world
        .ecs
        .query::<(&Agent, &Placement)>()
        .iter()
        .filter(|(_, (_, p))| p.owner == Owner::Mine)
        .map(|(_, (_, p))| p.pos)
        .collect()
}

// ── Economy ────────────────────────────────────────────────────────────

#[test]
fn harvesters_refill_the_spawn() {
    let mut engine = engine(21);
    engine.run(400);
    let (energy, _) = engine.world.spawn_energy(HOME);
    assert!(
        engine.agent_count() >= 2 || energy > 0,
        "no energy came back: {} agents, {energy} energy",
        engine.agent_count()
    );
}

#[test]
fn long_run_has_no_isolated_failures() {
    let mut engine = engine(8);
    for _ in 0..300 {
        let report = engine.step();
        assert!(
            report.colony.dispatch.failures.is_empty(),
            "tick {}: {:?}",
            report.tick,
            report.colony.dispatch.failures
        );
        assert!(report.colony.store_errors.is_empty());
    }
}

// ── Action guard ───────────────────────────────────────────────────────

#[test]
fn one_recorded_action_per_agent_per_tick() {
    let mut world = SimWorld::new();
    generate_world(&mut world, &WorldSetup::default(), &mut StdRng::seed_from_u64(2));
    let mut colony = Colony::new(ColonyConfig::default());
    let mut store = MemoryStore::new();

    for tick in 0..250 {
        world.set_tick(tick);
        let snapshot = world.snapshot();
        let mut sink = IntentSink::new(&snapshot);
        colony.tick(&snapshot, &mut sink, &mut store);
        let orders = sink.into_orders();

        let agents: BTreeSet<_> = orders.actions.iter().map(|(a, _)| *a).collect();
        assert_eq!(agents.len(), orders.actions.len(), "tick {tick}");
        let movers: BTreeSet<_> = orders.moves.iter().map(|(a, _)| *a).collect();
        assert_eq!(movers.len(), orders.moves.len(), "tick {tick}");

        apply_actions(&mut world, &orders.actions);
        apply_moves(&mut world, &orders.moves);
        apply_spawns(&mut world, &orders.spawns);
        upkeep(&mut world);
    }
}

// ── Movement ───────────────────────────────────────────────────────────

#[test]
fn agents_never_stand_on_walls_or_structures() {
    let mut engine = engine(13);
    for _ in 0..300 {
        engine.step();
        for pos in own_agent_tiles(&engine.world) {
            assert!(engine.world.is_walkable(&pos), "agent on {pos}");
        }
    }
}

// ── Visibility ─────────────────────────────────────────────────────────

#[test]
fn snapshot_only_reveals_zones_we_occupy() {
    let mut engine = engine(5);
    engine.run(100);
    let snapshot = engine.world.snapshot();
    let occupied = engine.world.visible_zones();
    assert_eq!(snapshot.zones(), occupied.into_iter().collect::<Vec<_>>());
    assert!(snapshot.is_visible(HOME));
    assert_eq!(snapshot.query(HOME, Category::Structures(StructureKind::Spawn)).len(), 1);
}

// ── Persistence ────────────────────────────────────────────────────────

#[test]
fn save_and_resume_keeps_the_colony_running() {
    let mut engine = engine(17);
    engine.run(120);
    let structures = engine.world.count_structures(StructureKind::Spawn);
    let mut bytes = Vec::new();
    engine.save(&mut bytes).expect("save");

    let mut resumed = ColonyEngine::default();
    resumed.load(&bytes[..]).expect("load");
    assert_eq!(resumed.tick(), 120);
    assert_eq!(resumed.world.count_structures(StructureKind::Spawn), structures);
    for _ in 0..60 {
        let report = resumed.step();
        assert!(report.colony.roster.reinitialized.is_empty());
        assert!(report.colony.dispatch.failures.is_empty());
    }
    assert_eq!(resumed.tick(), 180);
}
