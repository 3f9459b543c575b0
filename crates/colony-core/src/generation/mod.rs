//! Generation - procedural creation of the home zone and its surroundings

mod terrain;

pub use terrain::*;

use colony_logic::capability::{Body, CapabilityUnit::*};
use colony_logic::error::ConfigError;
use colony_logic::types::{Pos, ZoneId};
use colony_logic::world::{Owner, StructureKind};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::world::SimWorld;

/// Knobs for a generated world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldSetup {
    pub seed: u64,
    /// Zones generated around home, in Chebyshev rings.
    pub radius: i32,
    pub wall_density: f32,
    pub swamp_density: f32,
    pub source_capacity: u32,
    pub starting_energy: u32,
    pub extensions: u32,
    /// Zones seeded with hostile agents.
    pub hostile_zones: u32,
    pub hostiles_per_zone: u32,
    pub deposits: bool,
}

impl Default for WorldSetup {
    fn default() -> Self {
        Self {
            seed: 1,
            radius: 1,
            wall_density: 0.06,
            swamp_density: 0.08,
            source_capacity: 3_000,
            starting_energy: 300,
            extensions: 2,
            hostile_zones: 1,
            hostiles_per_zone: 2,
            deposits: true,
        }
    }
}

impl WorldSetup {
    /// Reads a setup from JSON; missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let setup: Self = serde_json::from_str(json)?;
        if setup.radius < 0 || !(0.0..1.0).contains(&setup.wall_density) {
            return Err(ConfigError::Invalid(format!(
                "radius {} / wall density {} out of range",
                setup.radius, setup.wall_density
            )));
        }
        Ok(setup)
    }
}

/// The generated layout, for callers that need to find things again.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Layout {
    pub home: ZoneId,
    pub zones: Vec<ZoneId>,
    pub hostile: Vec<ZoneId>,
}

pub const HOME: ZoneId = ZoneId::new(0, 0);

/// Populates an empty world.
pub fn generate_world(world: &mut SimWorld, setup: &WorldSetup, rng: &mut impl Rng) -> Layout {
    let mut layout = Layout {
        home: HOME,
        ..Layout::default()
    };
    generate_home(world, setup, rng);
    layout.zones.push(HOME);

    let mut others: Vec<ZoneId> = Vec::new();
    for y in -setup.radius..=setup.radius {
        for x in -setup.radius..=setup.radius {
            let zone = ZoneId::new(x, y);
            if zone != HOME {
                others.push(zone);
            }
        }
    }
    // Farthest zones first get the hostiles.
    let mut by_distance = others.clone();
    by_distance.sort_by_key(|z| (std::cmp::Reverse(HOME.distance(*z)), *z));
    let hostile: Vec<ZoneId> = by_distance
        .into_iter()
        .take(setup.hostile_zones as usize)
        .collect();

    for zone in others {
        let hostiles = if hostile.contains(&zone) {
            setup.hostiles_per_zone
        } else {
            0
        };
        generate_outpost(world, zone, setup, hostiles, rng);
        layout.zones.push(zone);
    }
    layout.hostile = hostile;
    log::info!(
        "generated {} zones ({} hostile) from seed {}",
        layout.zones.len(),
        layout.hostile.len(),
        setup.seed
    );
    layout
}

fn generate_home(world: &mut SimWorld, setup: &WorldSetup, rng: &mut impl Rng) {
    let at = |x, y| Pos::new(HOME, x, y);
    let controller = at(25, 25);
    let spawn = at(20, 20);
    let container = at(30, 30);
    let sources = [at(8, 8), interior_tile(rng, HOME, 6)];
    let extensions: Vec<Pos> = (0..setup.extensions.min(10) as u8)
        .map(|i| at(16 + i * 2, 16))
        .collect();

    let mut keep = vec![controller, spawn, container];
    keep.extend(sources);
    keep.extend(extensions.iter().copied());
    let grid = random_terrain(rng, HOME, setup.wall_density, setup.swamp_density, &keep);
    world.add_terrain(HOME, grid);

    world.add_controller(controller, Owner::Mine, 2);
    world.add_stocked(spawn, StructureKind::Spawn, setup.starting_energy);
    world.add_stocked(container, StructureKind::Container, 0);
    for pos in extensions {
        world.add_stocked(pos, StructureKind::Extension, 0);
    }
    for pos in sources {
        world.add_source(pos, setup.source_capacity);
    }
}

fn generate_outpost(
    world: &mut SimWorld,
    zone: ZoneId,
    setup: &WorldSetup,
    hostiles: u32,
    rng: &mut impl Rng,
) {
    let controller = interior_tile(rng, zone, 8);
    let source_count = rng.gen_range(1..=2);
    let sources: Vec<Pos> = (0..source_count)
        .map(|_| interior_tile(rng, zone, 5))
        .collect();
    let deposit = setup.deposits.then(|| interior_tile(rng, zone, 5));
    let raiders: Vec<Pos> = (0..hostiles).map(|_| interior_tile(rng, zone, 5)).collect();

    let mut keep = vec![controller];
    keep.extend(sources.iter().copied());
    keep.extend(deposit);
    keep.extend(raiders.iter().copied());
    let grid = random_terrain(rng, zone, setup.wall_density, setup.swamp_density, &keep);
    world.add_terrain(zone, grid);

    world.add_controller(controller, Owner::Neutral, 0);
    for pos in sources {
        world.add_source(pos, setup.source_capacity);
    }
    if let Some(pos) = deposit {
        world.add_deposit(pos, 20_000);
    }
    for pos in raiders {
        world.add_agent(pos, Owner::Hostile, Body::new(vec![Tough, Attack, Attack, Move]), None);
    }
}
