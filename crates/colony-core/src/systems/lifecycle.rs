//! Per-tick world upkeep: aging, deaths, construction, regeneration, decay
//! and hostile pressure.

use colony_logic::capability::CapabilityUnit;
use colony_logic::types::{EntityId, Pos, ResourceKind};
use colony_logic::world::Owner;

use crate::components::*;
use crate::systems::actions::{damage, ATTACK_POWER};
use crate::world::SimWorld;

/// What changed during one upkeep pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Upkeep {
    pub died: Vec<EntityId>,
    pub destroyed: Vec<EntityId>,
    pub completed: Vec<EntityId>,
    pub hostile_hits: u32,
}

/// Active agents lose a tick of life.
pub fn age_agents(world: &mut SimWorld) {
    for (_, agent) in world.ecs.query_mut::<&mut Agent>() {
        if agent.is_active() {
            agent.ttl = agent.ttl.saturating_sub(1);
        }
    }
}

/// Hostile agents with attack parts hit our adjacent agents.
pub fn hostile_pressure(world: &mut SimWorld) -> u32 {
    let attackers: Vec<(Pos, u32)> = world
        .ecs
        .query::<(&Agent, &Placement)>()
        .iter()
        .filter(|(_, (a, p))| p.owner == Owner::Hostile && a.count(CapabilityUnit::Attack) > 0)
        .map(|(_, (a, p))| (p.pos, a.count(CapabilityUnit::Attack) * ATTACK_POWER))
        .collect();
    if attackers.is_empty() {
        return 0;
    }
    let victims: Vec<(EntityId, Pos)> = world
        .ecs
        .query::<(&Key, &Agent, &Placement)>()
        .iter()
        .filter(|(_, (_, a, p))| p.owner == Owner::Mine && a.is_active())
        .map(|(_, (k, _, p))| (k.0, p.pos))
        .collect();

    let mut dealt = 0;
    for (from, power) in attackers {
        let target = victims
            .iter()
            .filter(|(_, pos)| from.in_range(pos, 1))
            .min_by_key(|(id, _)| *id);
        if let Some((id, _)) = target {
            if damage(world, *id, power) {
                dealt += power;
            }
        }
    }
    dealt
}

/// Removes dead agents and wrecked structures. Dead agents drop their
/// cargo where they stood.
pub fn reap(world: &mut SimWorld, upkeep: &mut Upkeep) {
    let dead: Vec<(EntityId, Pos)> = world
        .ecs
        .query::<(&Key, &Agent, &Placement)>()
        .iter()
        .filter(|(_, (_, a, _))| a.hits == 0 || (a.is_active() && a.ttl == 0))
        .map(|(_, (k, _, p))| (k.0, p.pos))
        .collect();
    for (id, pos) in dead {
        let dropped = world.cargo(id).map(|s| s.get(ResourceKind::Energy)).unwrap_or(0);
        world.despawn(id);
        if dropped > 0 {
            world.add_pile(pos, ResourceKind::Energy, dropped);
        }
        log::debug!("agent {id} died at {pos}");
        upkeep.died.push(id);
    }

    let wrecked: Vec<EntityId> = world
        .ecs
        .query::<(&Key, &Building)>()
        .iter()
        .filter(|(_, (_, b))| b.hits == 0)
        .map(|(_, (k, _))| k.0)
        .collect();
    for id in wrecked {
        world.despawn(id);
        log::info!("structure {id} destroyed");
        upkeep.destroyed.push(id);
    }
}

/// Finished sites become structures.
pub fn complete_sites(world: &mut SimWorld, upkeep: &mut Upkeep) {
    let done: Vec<(EntityId, Site, Placement)> = world
        .ecs
        .query::<(&Key, &Site, &Placement)>()
        .iter()
        .filter(|(_, (_, s, _))| s.progress >= s.kind.build_cost())
        .map(|(_, (k, s, p))| (k.0, *s, *p))
        .collect();
    for (id, site, place) in done {
        world.despawn(id);
        let built = world.add_structure(place.pos, place.owner, site.kind);
        log::info!("{:?} completed at {} as {built}", site.kind, place.pos);
        upkeep.completed.push(built);
    }
}

pub fn regenerate_sources(world: &mut SimWorld) {
    for (_, source) in world.ecs.query_mut::<&mut Source>() {
        if source.energy >= source.capacity {
            continue;
        }
        source.regen_in = source.regen_in.saturating_sub(1);
        if source.regen_in == 0 {
            source.energy = source.capacity;
            source.regen_in = SOURCE_REGEN_TICKS;
        }
    }
}

/// Dropped resources shrink by a thousandth per tick, at least one.
pub fn decay_piles(world: &mut SimWorld) {
    let mut gone = Vec::new();
    for (_, (key, pile)) in world.ecs.query_mut::<(&Key, &mut Pile)>() {
        pile.amount = pile.amount.saturating_sub((pile.amount / 1_000).max(1));
        if pile.amount == 0 {
            gone.push(key.0);
        }
    }
    for id in gone {
        world.despawn(id);
    }
}

/// Owned controllers count toward a downgrade; reservations run out.
pub fn tick_controllers(world: &mut SimWorld) {
    for (_, controller) in world.ecs.query_mut::<&mut Controller>() {
        if controller.level > 0 {
            controller.downgrade_in = controller.downgrade_in.saturating_sub(1);
            if controller.downgrade_in == 0 {
                controller.level -= 1;
                controller.progress = 0;
                controller.downgrade_in = DOWNGRADE_TICKS;
                log::warn!("controller downgraded to level {}", controller.level);
            }
        }
        if let Some(r) = controller.reservation.as_mut() {
            r.ticks = r.ticks.saturating_sub(1);
            if r.ticks == 0 {
                controller.reservation = None;
            }
        }
    }
}

/// Runs the full upkeep pass in its fixed order.
pub fn upkeep(world: &mut SimWorld) -> Upkeep {
    let mut report = Upkeep {
        hostile_hits: hostile_pressure(world),
        ..Upkeep::default()
    };
    super::spawning::assemble(world);
    age_agents(world);
    super::movement::recover_fatigue(world);
    reap(world, &mut report);
    super::spawning::release_orphaned_spawns(world);
    complete_sites(world, &mut report);
    regenerate_sources(world);
    decay_piles(world);
    tick_controllers(world);
    report
}
