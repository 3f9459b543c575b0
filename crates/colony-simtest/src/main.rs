//! Colony Headless Simulation Harness
//!
//! Runs the controller against scripted snapshots and against a generated
//! reference world, checking the controller's guarantees end to end.
//! Runs entirely in-process: no rendering, no external world.
//!
//! Usage:
//!   cargo run -p colony-simtest
//!   cargo run -p colony-simtest -- --verbose --ticks=2000 --seed=7
//!   cargo run -p colony-simtest -- --config=colony.json --setup=world.json --json

use std::collections::BTreeSet;

use colony_core::components::Agent;
use colony_core::engine::ColonyEngine;
use colony_core::generation::{WorldSetup, HOME};
use colony_core::intents::IntentSink;
use colony_core::systems::{apply_actions, apply_moves, apply_spawns, upkeep};
use colony_logic::allocation::{RemovalReason, TaskBoard};
use colony_logic::agent::AgentRoster;
use colony_logic::capability::{Body, CapabilityUnit::*};
use colony_logic::config::ColonyConfig;
use colony_logic::cost::{CostModel, PathRequest};
use colony_logic::memory::{Migrations, StateTag};
use colony_logic::roles::{RoleRegistry, RoleTag};
use colony_logic::store::MemoryStore;
use colony_logic::task::{NewTask, TaskKind, TaskOrigin};
use colony_logic::testing::{RecordingSink, SnapshotBuilder};
use colony_logic::types::{Pos, ResourceKind, Store, ZoneId};
use colony_logic::world::{Owner, StructureKind};
use colony_logic::Colony;
use serde::Serialize;

// ── Options ─────────────────────────────────────────────────────────────

struct Options {
    verbose: bool,
    json: bool,
    ticks: u64,
    seed: Option<u64>,
    config: Option<String>,
    setup: Option<String>,
}

impl Options {
    fn parse() -> Self {
        let args: Vec<String> = std::env::args().skip(1).collect();
        let value = |name: &str| {
            args.iter()
                .find_map(|a| a.strip_prefix(name).and_then(|v| v.strip_prefix('=')))
                .map(str::to_string)
        };
        Self {
            verbose: args.iter().any(|a| a == "--verbose"),
            json: args.iter().any(|a| a == "--json"),
            ticks: value("--ticks").and_then(|v| v.parse().ok()).unwrap_or(1_500),
            seed: value("--seed").and_then(|v| v.parse().ok()),
            config: value("--config"),
            setup: value("--setup"),
        }
    }
}

// ── Test harness ────────────────────────────────────────────────────────

struct TestResult {
    name: String,
    passed: bool,
    detail: String,
}

fn check(name: &str, passed: bool, detail: impl Into<String>) -> TestResult {
    TestResult {
        name: name.into(),
        passed,
        detail: detail.into(),
    }
}

/// Totals from the long run, printed with `--json`.
#[derive(Debug, Default, Serialize)]
struct RunSummary {
    seed: u64,
    ticks: u64,
    agents_alive: usize,
    agents_born: usize,
    agents_died: usize,
    actions_applied: usize,
    steps_taken: usize,
    dispatch_failures: usize,
    controller_levels: Vec<(ZoneId, u8)>,
    tasks_completed: u64,
    tasks_failed: u64,
    save_bytes: usize,
}

fn main() {
    let opts = Options::parse();
    println!("=== Colony Simulation Harness ===\n");

    let config = match &opts.config {
        Some(path) => match ColonyConfig::from_json_file(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("cannot load {path}: {e}");
                std::process::exit(2);
            }
        },
        None => ColonyConfig::default(),
    };

    let mut setup = WorldSetup::default();
    if let Some(path) = &opts.setup {
        match std::fs::read_to_string(path).map_err(|e| e.to_string()).and_then(|text| {
            WorldSetup::from_json_str(&text).map_err(|e| e.to_string())
        }) {
            Ok(s) => setup = s,
            Err(e) => {
                eprintln!("cannot load {path}: {e}");
                std::process::exit(2);
            }
        }
    }
    // An explicit seed wins over the setup file.
    if let Some(seed) = opts.seed {
        setup.seed = seed;
    }

    let mut results = Vec::new();

    // 1. Task board guarantees
    results.extend(validate_task_board());

    // 2. Controller scenarios on scripted snapshots
    results.extend(validate_scenarios(&config));

    // 3. Movement cost cache
    results.extend(validate_cost_cache(&config));

    // 4. Long run on a generated world
    let (run, summary) = validate_long_run(&config, &setup, &opts);
    results.extend(run);

    // ── Summary ──
    println!();
    let passed = results.iter().filter(|r| r.passed).count();
    let failed = results.len() - passed;

    for r in &results {
        let icon = if r.passed { "✓" } else { "✗" };
        if !r.passed || opts.verbose {
            println!("  {} {}: {}", icon, r.name, r.detail);
        }
    }

    if opts.json {
        match serde_json::to_string_pretty(&summary) {
            Ok(s) => println!("\n{s}"),
            Err(e) => eprintln!("summary not serializable: {e}"),
        }
    }

    println!(
        "\n=== RESULT: {}/{} passed, {} failed ===",
        passed,
        results.len(),
        failed
    );

    if failed > 0 {
        std::process::exit(1);
    }
}

fn at(x: u8, y: u8) -> Pos {
    Pos::new(HOME, x, y)
}

/// A level-2 colony: controller, empty spawn, stocked container, two sources.
fn base(tick: u64) -> SnapshotBuilder {
    let mut b = SnapshotBuilder::new(tick);
    b.controller(at(25, 25), Owner::Mine, 2);
    b.stocked(at(20, 20), StructureKind::Spawn, 0);
    b.stocked(at(30, 30), StructureKind::Container, 500);
    b.source(at(5, 5), 3_000);
    b.source(at(44, 44), 3_000);
    b
}

// ── 1. Task board ───────────────────────────────────────────────────────

fn validate_task_board() -> Vec<TestResult> {
    println!("--- Task Board ---");
    let mut results = Vec::new();
    let limits = ColonyConfig::default().tasks;

    let mut b = SnapshotBuilder::new(1);
    let builder = b.agent(at(5, 5), &[Work, Carry, Move], Some(RoleTag::Builder));
    let hauler = b.agent(at(6, 5), &[Carry, Carry, Move], Some(RoleTag::Hauler));
    let sites: Vec<_> = (0..3)
        .map(|i| b.site(at(10 + i * 2, 10), StructureKind::Road, 0))
        .collect();
    let source = b.source(at(40, 40), 3_000);
    let snap = b.build();

    let mut roster = AgentRoster::new();
    roster.sync(
        &snap,
        &RoleRegistry::standard(),
        &mut MemoryStore::new(),
        &Migrations::standard(),
    );
    let mut board = TaskBoard::new();
    board.sync_live(roster.ids());

    let mut ids = Vec::new();
    for (site, priority) in sites.iter().zip([10, 50, 30]) {
        match board.create_task(&snap, NewTask::new(TaskKind::Build, *site, priority, HOME), &limits) {
            Ok(id) => ids.push(id),
            Err(e) => results.push(check("create_task", false, e.to_string())),
        }
    }
    if ids.len() != 3 {
        return results;
    }

    // Reassignment leaves exactly one holder.
    let reassigned = board.assign(builder, ids[0]).is_ok()
        && board.assign(builder, ids[1]).is_ok()
        && board.task_of(builder).map(|t| t.id) == Some(ids[1])
        && board.get(ids[0]).is_some_and(|t| !t.assigned.contains(&builder));
    results.push(check(
        "reassign_moves_agent",
        reassigned,
        "assign(A, T) then assign(A, T2) leaves A only on T2",
    ));
    board.unassign(builder);

    // Capability gating.
    let harvest = board.create_task(&snap, NewTask::new(TaskKind::Harvest, source, 99, HOME), &limits);
    let gated = match (harvest, roster.get(hauler)) {
        (Ok(_), Some(record)) => board
            .find_best_task(record)
            .map_or(true, |t| record.has(t.kind.required_unit())),
        _ => false,
    };
    results.push(check(
        "find_best_respects_capabilities",
        gated,
        "a Carry-only agent is never offered a Work task",
    ));

    // Priority order 50, 30, 10.
    let mut order = Vec::new();
    if let Some(record) = roster.get(builder) {
        while let Some(task) = board.find_best_matching(record, &[TaskKind::Build]) {
            order.push(task.priority);
            let id = task.id;
            board.remove(id);
        }
    }
    results.push(check(
        "priority_order",
        order == vec![50, 30, 10],
        format!("build tasks came out as {order:?}"),
    ));
    results
}

// ── 2. Controller scenarios ─────────────────────────────────────────────

fn validate_scenarios(config: &ColonyConfig) -> Vec<TestResult> {
    println!("--- Controller Scenarios ---");
    let mut results = Vec::new();

    // Harvester deficit of two creates two tasks in the same tick.
    {
        let mut cfg = config.clone();
        cfg.population.desired.insert(RoleTag::Harvester, vec![0, 3, 3]);
        let mut b = base(1);
        b.agent(at(6, 6), &[Work, Work, Carry, Move], Some(RoleTag::Harvester));
        let mut colony = Colony::new(cfg);
        let report = colony.tick(&b.build(), &mut RecordingSink::default(), &mut MemoryStore::new());
        let created = report
            .allocation
            .created
            .iter()
            .filter_map(|id| colony.board().get(*id))
            .filter(|t| t.origin == TaskOrigin::Deficit(RoleTag::Harvester))
            .count();
        results.push(check(
            "deficit_creates_tasks",
            created == 2,
            format!("deficit 2 created {created} harvest tasks"),
        ));
    }

    // A full harvester delivers on the same evaluation.
    {
        let mut b = base(1);
        let body = Body::new(vec![Work, Work, Carry, Move]);
        let full = Store::new(body.carry_capacity()).with(ResourceKind::Energy, body.carry_capacity());
        let harvester = b.agent_with(at(19, 19), body, full, Some(RoleTag::Harvester));
        let mut colony = Colony::new(config.clone());
        let mut sink = RecordingSink::default();
        colony.tick(&b.build(), &mut sink, &mut MemoryStore::new());
        let state = colony.roster().get(harvester).map(|r| r.memory.state);
        results.push(check(
            "full_harvester_delivers",
            state == Some(StateTag::Delivering) && sink.actions_of(harvester).len() == 1,
            format!("state {state:?}, {} actions", sink.actions_of(harvester).len()),
        ));
    }

    // The age ceiling is a lease.
    {
        let mut b = base(1);
        let harvester = b.agent(at(6, 6), &[Work, Work, Carry, Move], Some(RoleTag::Harvester));
        let mut colony = Colony::new(config.clone());
        let mut store = MemoryStore::new();
        colony.tick(&b.build(), &mut RecordingSink::default(), &mut store);
        let first = colony.board().task_of(harvester).map(|t| (t.id, t.created_at));
        let ceiling = config.task_age_ceiling;
        let mut alive_at_edge = false;
        let mut removed_at_ceiling = false;
        if let Some((id, created)) = first {
            for tick in 2..=created + ceiling {
                let report = colony.tick(&b.at(tick), &mut RecordingSink::default(), &mut store);
                if tick == created + ceiling - 1 {
                    alive_at_edge = colony.board().get(id).is_some();
                }
                if report.cleanup.removed.contains(&(id, RemovalReason::Expired)) {
                    removed_at_ceiling = tick <= created + ceiling
                        && colony.board().task_of(harvester).map(|t| t.id) != Some(id);
                }
            }
        }
        results.push(check(
            "task_lease",
            alive_at_edge && removed_at_ceiling,
            format!("alive at T+{}: {alive_at_edge}, removed by T+{ceiling}: {removed_at_ceiling}", ceiling - 1),
        ));
    }

    // A vanished target is cleaned up within one tick.
    {
        let mut b = base(1);
        let drop = b.dropped(at(12, 12), 300);
        b.agent(at(15, 15), &[Carry, Carry, Move], Some(RoleTag::Hauler));
        let mut colony = Colony::new(config.clone());
        let mut store = MemoryStore::new();
        colony.tick(&b.build(), &mut RecordingSink::default(), &mut store);
        let pickup = colony
            .board()
            .tasks()
            .find(|t| t.kind == TaskKind::Pickup && t.target == drop)
            .map(|t| t.id);
        b.snapshot_mut().remove(drop);
        let report = colony.tick(&b.at(2), &mut RecordingSink::default(), &mut store);
        let cleaned = pickup.is_some_and(|id| {
            report.cleanup.removed.contains(&(id, RemovalReason::TargetLost))
                && colony.board().get(id).is_none()
        });
        results.push(check(
            "lost_target_cleanup",
            cleaned,
            format!("pickup task {pickup:?} removed next tick: {cleaned}"),
        ));
    }

    // One action per agent no matter how often a handler tries.
    {
        let mut b = base(1);
        b.site(at(22, 22), StructureKind::Extension, 0);
        b.dropped(at(28, 28), 200);
        let agents = [
            b.agent(at(6, 6), &[Work, Work, Carry, Move], Some(RoleTag::Harvester)),
            b.agent(at(29, 29), &[Carry, Carry, Move], Some(RoleTag::Hauler)),
            b.agent(at(21, 21), &[Work, Carry, Move], Some(RoleTag::Builder)),
            b.agent(at(24, 24), &[Work, Carry, Move], Some(RoleTag::Upgrader)),
        ];
        let mut colony = Colony::new(config.clone());
        let mut store = MemoryStore::new();
        let mut worst = 0;
        for tick in 1..=50 {
            let mut sink = RecordingSink::default();
            colony.tick(&b.at(tick), &mut sink, &mut store);
            for agent in agents {
                worst = worst.max(sink.actions_of(agent).len());
            }
        }
        results.push(check(
            "action_guard",
            worst <= 1,
            format!("most actions by one agent in one tick: {worst}"),
        ));
    }
    results
}

// ── 3. Movement cost cache ──────────────────────────────────────────────

fn validate_cost_cache(config: &ColonyConfig) -> Vec<TestResult> {
    println!("--- Movement Costs ---");
    let mut model = CostModel::new();
    let req = PathRequest::new(at(10, 10), at(40, 40), 1);
    model.surface(&base(0).build(), &req, config);

    let mut b = base(1);
    b.hostile(at(25, 10), &[RangedAttack, Move]);
    let warm = model.surface(&b.build(), &req, config);
    let dynamic_fresh = warm.matrix.get(26, 10) > warm.plain_cost && model.rebuilds() == 1;

    let stale = config.terrain_cache_ttl * 2;
    let mut b = base(stale);
    b.hostile(at(25, 10), &[RangedAttack, Move]);
    let rebuilt = model.surface(&b.build(), &req, config);
    let recomputed = model.rebuilds() == 2 && model.built_at(HOME) == Some(stale);

    vec![
        check(
            "hostile_penalty_on_cached_layer",
            dynamic_fresh,
            "hostiles count even when the static layer is reused",
        ),
        check(
            "stale_terrain_recomputed",
            recomputed && rebuilt.matrix.get(26, 10) > rebuilt.plain_cost,
            format!("static layer rebuilt at tick {stale}: {recomputed}"),
        ),
    ]
}

// ── 4. Long run ─────────────────────────────────────────────────────────

fn validate_long_run(
    config: &ColonyConfig,
    setup: &WorldSetup,
    opts: &Options,
) -> (Vec<TestResult>, RunSummary) {
    println!("--- Long Run ({} ticks, seed {}) ---", opts.ticks, setup.seed);
    let mut results = Vec::new();
    let mut summary = RunSummary {
        seed: setup.seed,
        ticks: opts.ticks,
        ..RunSummary::default()
    };

    let mut engine = ColonyEngine::new(config.clone());
    engine.generate(setup);

    let mut duplicate_actions = 0;
    let mut misplaced = 0;
    let mut failures = Vec::new();
    for _ in 0..opts.ticks {
        // Drive the engine's parts by hand to inspect the raw orders.
        let tick = engine.world.tick();
        let snapshot = engine.world.snapshot();
        let mut sink = IntentSink::new(&snapshot);
        let report = engine.colony.tick(&snapshot, &mut sink, &mut engine.store);
        let orders = sink.into_orders();
        let unique: BTreeSet<_> = orders.actions.iter().map(|(a, _)| *a).collect();
        if unique.len() != orders.actions.len() {
            duplicate_actions += 1;
        }

        summary.actions_applied += apply_actions(&mut engine.world, &orders.actions);
        summary.steps_taken += apply_moves(&mut engine.world, &orders.moves);
        summary.agents_born += apply_spawns(&mut engine.world, &orders.spawns).len();
        summary.agents_died += upkeep(&mut engine.world).died.len();
        engine.world.set_tick(tick + 1);

        for (agent, error) in &report.dispatch.failures {
            failures.push(format!("tick {tick}: {agent}: {error}"));
        }
        misplaced += engine
            .world
            .keys_with::<Agent>()
            .into_iter()
            .filter_map(|id| engine.world.placement(id))
            .filter(|p| p.owner == Owner::Mine && !engine.world.is_walkable(&p.pos))
            .count();
    }
    summary.agents_alive = engine.agent_count();
    summary.dispatch_failures = failures.len();
    summary.controller_levels = engine.world.owned_controllers();
    let stats = engine.colony.stats();
    summary.tasks_completed = stats.completed;
    summary.tasks_failed = stats.failed;

    results.push(check(
        "one_action_per_agent",
        duplicate_actions == 0,
        format!("{duplicate_actions} ticks recorded two actions for one agent"),
    ));
    results.push(check(
        "failures_isolated",
        failures.is_empty(),
        failures.first().cloned().unwrap_or_else(|| "no dispatch failures".into()),
    ));
    results.push(check(
        "colony_grows",
        summary.agents_born >= 2,
        format!("{} born, {} alive", summary.agents_born, summary.agents_alive),
    ));
    results.push(check(
        "agents_on_open_tiles",
        misplaced == 0,
        format!("{misplaced} agent-ticks on blocked tiles"),
    ));
    results.push(check(
        "home_still_owned",
        summary.controller_levels.iter().any(|(z, _)| *z == HOME),
        format!("owned controllers: {:?}", summary.controller_levels),
    ));

    // Save, load and keep going.
    let mut bytes = Vec::new();
    let resumed = engine.save(&mut bytes).and_then(|_| {
        let mut loaded = ColonyEngine::new(config.clone());
        loaded.load(&bytes[..])?;
        Ok(loaded)
    });
    summary.save_bytes = bytes.len();
    match resumed {
        Ok(mut loaded) => {
            let same_tick = loaded.tick() == engine.tick();
            let same_agents = loaded.agent_count() == engine.agent_count();
            let report = loaded.step();
            let clean = report.colony.roster.reinitialized.is_empty()
                && report.colony.dispatch.failures.is_empty();
            results.push(check(
                "save_load_resume",
                same_tick && same_agents && clean,
                format!("{} bytes, tick kept: {same_tick}, agents kept: {same_agents}", bytes.len()),
            ));
        }
        Err(e) => results.push(check("save_load_resume", false, e.to_string())),
    }

    if opts.verbose {
        println!(
            "  {} ticks: {} born, {} died, {} alive, {} actions, {} steps",
            opts.ticks,
            summary.agents_born,
            summary.agents_died,
            summary.agents_alive,
            summary.actions_applied,
            summary.steps_taken
        );
    }
    (results, summary)
}
