//! Spawn system - turns spawn orders into agents being assembled

use colony_logic::types::{EntityId, Pos, ResourceKind, Store, ZoneId};
use colony_logic::world::{Owner, StructureKind};

use crate::components::{Agent, Building, Cargo, Key, Placement, SPAWN_TICKS_PER_UNIT};
use crate::intents::SpawnOrder;
use crate::world::SimWorld;

/// Applies spawn orders; returns the new agents' keys.
pub fn apply_spawns(world: &mut SimWorld, orders: &[SpawnOrder]) -> Vec<EntityId> {
    let mut born = Vec::new();
    for order in orders {
        match spawn_one(world, order) {
            Some(id) => {
                log::info!(
                    "spawn {}: assembling {} {:?} ({} energy)",
                    order.spawn,
                    id,
                    order.role,
                    order.body.cost()
                );
                born.push(id);
            }
            None => log::debug!("spawn {}: order for {:?} dropped", order.spawn, order.role),
        }
    }
    born
}

fn spawn_one(world: &mut SimWorld, order: &SpawnOrder) -> Option<EntityId> {
    let place = world.placement(order.spawn)?;
    let h = world.handle(order.spawn)?;
    {
        let building = world.ecs.get::<&Building>(h).ok()?;
        if building.kind != StructureKind::Spawn || building.assembling.is_some() {
            return None;
        }
    }
    let zone = place.pos.zone;
    let cost = order.body.cost();
    if world.spawn_energy(zone).0 < cost {
        return None;
    }
    let exit = free_tile_near(world, &place.pos)?;
    drain(world, order.spawn, zone, cost);

    let mut agent = Agent::new(order.body.clone(), Some(order.role));
    agent.spawning = order.body.len() as u32 * SPAWN_TICKS_PER_UNIT;
    let cargo = Cargo(Store::new(order.body.carry_capacity()));
    let id = world.insert(exit, Owner::Mine, (agent, cargo));
    if let Ok(mut building) = world.ecs.get::<&mut Building>(h) {
        building.assembling = Some(id);
    }
    Some(id)
}

/// Takes `cost` energy from the spawn first, then the zone's extensions.
fn drain(world: &mut SimWorld, spawn: EntityId, zone: ZoneId, cost: u32) {
    let mut donors = vec![spawn];
    let mut extensions: Vec<EntityId> = world
        .ecs
        .query::<(&Key, &Building, &Placement)>()
        .iter()
        .filter(|(_, (_, b, p))| {
            b.kind == StructureKind::Extension && p.pos.zone == zone && p.owner == Owner::Mine
        })
        .map(|(_, (k, _, _))| k.0)
        .collect();
    extensions.sort();
    donors.extend(extensions);

    let mut left = cost;
    for donor in donors {
        if left == 0 {
            break;
        }
        left -= world
            .with_cargo(donor, |s| s.remove(ResourceKind::Energy, left))
            .unwrap_or(0);
    }
}

fn free_tile_near(world: &SimWorld, pos: &Pos) -> Option<Pos> {
    let occupied: Vec<Pos> = world
        .ecs
        .query::<(&Agent, &Placement)>()
        .iter()
        .map(|(_, (_, p))| p.pos)
        .collect();
    pos.neighbors()
        .find(|p| world.is_walkable(p) && !occupied.contains(p))
        .or_else(|| pos.neighbors().find(|p| world.is_walkable(p)))
}

/// Counts down assembly; frees the spawn once its agent is active.
pub fn assemble(world: &mut SimWorld) {
    let mut finished = Vec::new();
    for (_, (key, agent)) in world.ecs.query_mut::<(&Key, &mut Agent)>() {
        if agent.spawning > 0 {
            agent.spawning -= 1;
            if agent.spawning == 0 {
                finished.push(key.0);
            }
        }
    }
    if finished.is_empty() {
        return;
    }
    for (_, building) in world.ecs.query_mut::<&mut Building>() {
        if building.assembling.is_some_and(|id| finished.contains(&id)) {
            building.assembling = None;
        }
    }
}

/// Releases spawns whose agent no longer exists.
pub fn release_orphaned_spawns(world: &mut SimWorld) {
    let stale: Vec<hecs::Entity> = world
        .ecs
        .query::<&Building>()
        .iter()
        .filter(|(_, b)| b.assembling.is_some_and(|id| !world.contains(id)))
        .map(|(h, _)| h)
        .collect();
    for h in stale {
        if let Ok(mut b) = world.ecs.get::<&mut Building>(h) {
            b.assembling = None;
        }
    }
}
