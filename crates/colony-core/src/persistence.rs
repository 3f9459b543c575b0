//! Save/Load functionality for persisting the reference world
//!
//! Uses bincode for a compact binary image of the whole run: terrain, every
//! entity's components, and the controller's state store. Components are
//! serialized individually and reattached on load; entity keys survive, the
//! hecs handles do not.

use std::collections::BTreeMap;
use std::io::{Read, Write};

use colony_logic::store::MemoryStore;
use colony_logic::types::ZoneId;
use colony_logic::world::TerrainGrid;
use hecs::EntityBuilder;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::components::*;
use crate::world::SimWorld;

/// Version number for save file format (increment when format changes)
pub const SAVE_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
pub struct SaveData {
    pub version: u32,
    pub tick: u64,
    pub next_id: u64,
    pub terrain: BTreeMap<ZoneId, TerrainGrid>,
    pub entities: Vec<SavedEntity>,
    pub store: MemoryStore,
}

/// All possible components for an entity, serialized as optionals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedEntity {
    pub key: Key,
    pub placement: Placement,
    pub agent: Option<Agent>,
    pub cargo: Option<Cargo>,
    pub building: Option<Building>,
    pub site: Option<Site>,
    pub source: Option<Source>,
    pub deposit: Option<Deposit>,
    pub pile: Option<Pile>,
    pub controller: Option<Controller>,
}

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Bincode(#[from] Box<bincode::ErrorKind>),
    #[error("save version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
}

fn serialize_entities(world: &SimWorld) -> Vec<SavedEntity> {
    let mut entities: Vec<SavedEntity> = world
        .ecs
        .query::<(&Key, &Placement)>()
        .iter()
        .filter_map(|(handle, (key, placement))| {
            let e = world.ecs.entity(handle).ok()?;
            Some(SavedEntity {
                key: *key,
                placement: *placement,
                agent: e.get::<&Agent>().map(|c| (*c).clone()),
                cargo: e.get::<&Cargo>().map(|c| (*c).clone()),
                building: e.get::<&Building>().map(|c| (*c).clone()),
                site: e.get::<&Site>().map(|c| *c),
                source: e.get::<&Source>().map(|c| *c),
                deposit: e.get::<&Deposit>().map(|c| *c),
                pile: e.get::<&Pile>().map(|c| *c),
                controller: e.get::<&Controller>().map(|c| *c),
            })
        })
        .collect();
    entities.sort_by_key(|e| e.key.0);
    entities
}

fn spawn_entity(world: &mut SimWorld, se: SavedEntity) {
    let mut builder = EntityBuilder::new();
    if let Some(c) = se.agent {
        builder.add(c);
    }
    if let Some(c) = se.cargo {
        builder.add(c);
    }
    if let Some(c) = se.building {
        builder.add(c);
    }
    if let Some(c) = se.site {
        builder.add(c);
    }
    if let Some(c) = se.source {
        builder.add(c);
    }
    if let Some(c) = se.deposit {
        builder.add(c);
    }
    if let Some(c) = se.pile {
        builder.add(c);
    }
    if let Some(c) = se.controller {
        builder.add(c);
    }
    world.restore(se.key, se.placement, builder.build());
}

/// Save the world and the controller's store to a writer
pub fn save_world<W: Write>(writer: W, world: &SimWorld, store: &MemoryStore) -> Result<(), SaveError> {
    let save_data = SaveData {
        version: SAVE_VERSION,
        tick: world.tick(),
        next_id: world.next_id(),
        terrain: world.terrains().map(|(z, g)| (*z, g.clone())).collect(),
        entities: serialize_entities(world),
        store: store.clone(),
    };
    bincode::serialize_into(writer, &save_data)?;
    Ok(())
}

/// Load a world and store from a reader
pub fn load_world<R: Read>(reader: R) -> Result<(SimWorld, MemoryStore), SaveError> {
    let save_data: SaveData = bincode::deserialize_from(reader)?;
    if save_data.version != SAVE_VERSION {
        return Err(SaveError::VersionMismatch {
            expected: SAVE_VERSION,
            found: save_data.version,
        });
    }

    let mut world = SimWorld::new();
    world.set_tick(save_data.tick);
    for (zone, grid) in save_data.terrain {
        world.add_terrain(zone, grid);
    }
    for se in save_data.entities {
        spawn_entity(&mut world, se);
    }
    world.set_next_id(save_data.next_id);
    Ok((world, save_data.store))
}
