//! Colony engine - runs the controller against the reference world
//!
//! One [`ColonyEngine::step`] is one world tick:
//!
//! | Phase | Where |
//! |-------|-------|
//! | snapshot the visible world | [`SimWorld::snapshot`] |
//! | controller tick, recording intents | [`Colony::tick`] + [`IntentSink`] |
//! | apply actions, then steps, then spawns | `systems` |
//! | upkeep and clock advance | [`upkeep`] |

use std::io::{Read, Write};

use colony_logic::config::ColonyConfig;
use colony_logic::store::MemoryStore;
use colony_logic::types::EntityId;
use colony_logic::world::Owner;
use colony_logic::{Colony, TickReport};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::generation::{generate_world, Layout, WorldSetup};
use crate::intents::IntentSink;
use crate::persistence::{load_world, save_world, SaveError};
use crate::systems::*;
use crate::world::SimWorld;

/// Everything that happened in one engine step.
#[derive(Debug, Clone, Default)]
pub struct StepReport {
    pub tick: u64,
    pub colony: TickReport,
    /// Orders recorded: actions, steps and spawns.
    pub ordered: (usize, usize, usize),
    pub applied: usize,
    pub moved: usize,
    pub born: Vec<EntityId>,
    pub upkeep: Upkeep,
}

pub struct ColonyEngine {
    pub world: SimWorld,
    pub colony: Colony,
    pub store: MemoryStore,
    layout: Option<Layout>,
    last: Option<StepReport>,
}

impl ColonyEngine {
    /// An engine over an empty world.
    pub fn new(config: ColonyConfig) -> Self {
        Self::with_world(config, SimWorld::new())
    }

    pub fn with_world(config: ColonyConfig, world: SimWorld) -> Self {
        Self {
            world,
            colony: Colony::new(config),
            store: MemoryStore::new(),
            layout: None,
            last: None,
        }
    }

    /// Generates a fresh world from the setup's seed.
    pub fn generate(&mut self, setup: &WorldSetup) -> &Layout {
        let mut rng = StdRng::seed_from_u64(setup.seed);
        self.world = SimWorld::new();
        let layout = generate_world(&mut self.world, setup, &mut rng);
        self.layout.insert(layout)
    }

    pub fn layout(&self) -> Option<&Layout> {
        self.layout.as_ref()
    }

    pub fn tick(&self) -> u64 {
        self.world.tick()
    }

    pub fn last_report(&self) -> Option<&StepReport> {
        self.last.as_ref()
    }

    /// Runs one world tick.
    pub fn step(&mut self) -> &StepReport {
        let tick = self.world.tick();
        let snapshot = self.world.snapshot();
        let mut sink = IntentSink::new(&snapshot);
        let colony = self.colony.tick(&snapshot, &mut sink, &mut self.store);
        let orders = sink.into_orders();

        let applied = apply_actions(&mut self.world, &orders.actions);
        let moved = apply_moves(&mut self.world, &orders.moves);
        let born = apply_spawns(&mut self.world, &orders.spawns);
        let upkeep = upkeep(&mut self.world);
        self.world.set_tick(tick + 1);

        if !upkeep.died.is_empty() || !born.is_empty() {
            log::debug!(
                "tick {tick}: {} born, {} died, {} agents",
                born.len(),
                upkeep.died.len(),
                self.world.count_agents(Owner::Mine)
            );
        }
        self.last.insert(StepReport {
            tick,
            ordered: (orders.actions.len(), orders.moves.len(), orders.spawns.len()),
            colony,
            applied,
            moved,
            born,
            upkeep,
        })
    }

    pub fn run(&mut self, ticks: u64) {
        for _ in 0..ticks {
            self.step();
        }
    }

    pub fn agent_count(&self) -> usize {
        self.world.count_agents(Owner::Mine)
    }

    /// Save world and controller state to a writer
    pub fn save<W: Write>(&self, writer: W) -> Result<(), SaveError> {
        save_world(writer, &self.world, &self.store)
    }

    /// Load world and controller state; the controller is rebuilt from the
    /// loaded store.
    pub fn load<R: Read>(&mut self, reader: R) -> Result<(), SaveError> {
        let (world, store) = load_world(reader)?;
        self.world = world;
        self.store = store;
        self.colony = Colony::restore(self.colony.config().clone(), &self.store);
        self.last = None;
        log::info!("loaded save at tick {}", self.world.tick());
        Ok(())
    }
}

impl Default for ColonyEngine {
    fn default() -> Self {
        Self::new(ColonyConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use colony_logic::roles::RoleTag;

    fn generated(seed: u64) -> ColonyEngine {
        let mut engine = ColonyEngine::default();
        engine.generate(&WorldSetup {
            seed,
            ..WorldSetup::default()
        });
        engine
    }

    #[test]
    fn test_engine_creation() {
        let engine = ColonyEngine::default();
        assert_eq!(engine.agent_count(), 0);
        assert_eq!(engine.tick(), 0);
        assert!(engine.last_report().is_none());
    }

    #[test]
    fn test_first_step_spawns_a_harvester() {
        let mut engine = generated(11);
        let report = engine.step();
        assert_eq!(report.tick, 0);
        assert_eq!(report.born.len(), 1);
        let born = report.born[0];
        assert_eq!(engine.tick(), 1);
        assert_eq!(engine.world.agent(born).and_then(|a| a.role), Some(RoleTag::Harvester));
    }

    #[test]
    fn test_engine_update() {
        let mut engine = generated(3);
        engine.run(200);
        assert_eq!(engine.tick(), 200);
        assert!(engine.agent_count() >= 1);
        let report = engine.last_report().unwrap();
        assert!(report.colony.dispatch.failures.is_empty());
    }

    #[test]
    fn test_same_seed_same_run() {
        let mut a = generated(9);
        let mut b = generated(9);
        a.run(60);
        b.run(60);
        let mut left = Vec::new();
        let mut right = Vec::new();
        a.save(&mut left).unwrap();
        b.save(&mut right).unwrap();
        assert_eq!(left, right);
    }

    #[test]
    fn test_save_load_resumes() {
        let mut engine = generated(4);
        engine.run(50);
        let agents = engine.agent_count();
        let mut buffer = Vec::new();
        engine.save(&mut buffer).expect("save failed");

        let mut loaded = ColonyEngine::default();
        loaded.load(&buffer[..]).expect("load failed");
        assert_eq!(loaded.tick(), 50);
        assert_eq!(loaded.agent_count(), agents);
        let report = loaded.step();
        assert!(report.colony.roster.reinitialized.is_empty());
    }
}
