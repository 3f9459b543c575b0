//! Applies recorded primitive actions.
//!
//! Orders were validated against the start-of-tick snapshot; earlier orders
//! in the same tick may have drained a source or filled a store since, so
//! every amount is clamped to what is still there.

use colony_logic::action::PrimitiveAction;
use colony_logic::capability::CapabilityUnit::{self, *};
use colony_logic::types::{AgentId, EntityId, ResourceKind};
use colony_logic::world::{Owner, Reservation};

use crate::components::*;
use crate::world::SimWorld;

/// Energy a work unit gathers per tick.
pub const HARVEST_POWER: u32 = 2;
/// Site progress per work unit per tick; one energy per point.
pub const BUILD_POWER: u32 = 5;
/// Hits restored per work unit per tick.
pub const REPAIR_POWER: u32 = 100;
/// Hits per energy spent on repairs.
pub const REPAIR_HITS_PER_ENERGY: u32 = 100;
pub const DISMANTLE_POWER: u32 = 50;
pub const ATTACK_POWER: u32 = 30;
pub const RANGED_ATTACK_POWER: u32 = 10;
pub const HEAL_POWER: u32 = 12;
/// Reservation ticks added per claim unit per tick.
pub const RESERVE_POWER: u32 = 1;
pub const RESERVATION_MAX: u32 = 5_000;

/// Applies every action in order; returns how many took effect.
pub fn apply_actions(world: &mut SimWorld, actions: &[(AgentId, PrimitiveAction)]) -> usize {
    actions
        .iter()
        .filter(|(agent, action)| {
            let applied = apply_one(world, agent.entity(), action);
            if !applied {
                log::debug!("{agent}: {action} had no effect");
            }
            applied
        })
        .count()
}

fn apply_one(world: &mut SimWorld, agent: EntityId, action: &PrimitiveAction) -> bool {
    if !world.contains(agent) || !world.contains(action.target()) {
        return false;
    }
    let units = |unit: CapabilityUnit| world.agent(agent).map(|a| a.count(unit)).unwrap_or(0);
    let power = units(action.required_unit());
    match *action {
        PrimitiveAction::Gather { target } => gather(world, agent, target, power),
        PrimitiveAction::Build { target } => build(world, agent, target, power),
        PrimitiveAction::Repair { target } => repair(world, agent, target, power),
        PrimitiveAction::Upgrade { target } => upgrade(world, agent, target, power),
        PrimitiveAction::Dismantle { target } => dismantle(world, agent, target, power),
        PrimitiveAction::Transfer {
            target,
            resource,
            amount,
        } => transfer(world, agent, target, resource, amount),
        PrimitiveAction::Withdraw {
            target,
            resource,
            amount,
        } => transfer(world, target, agent, resource, amount),
        PrimitiveAction::Pickup { target } => pickup(world, agent, target),
        PrimitiveAction::MeleeAttack { target } => damage(world, target, power * ATTACK_POWER),
        PrimitiveAction::RangedAttack { target } => {
            damage(world, target, power * RANGED_ATTACK_POWER)
        }
        PrimitiveAction::Heal { target } => heal(world, target, power * HEAL_POWER),
        PrimitiveAction::Claim { target } => claim(world, target),
        PrimitiveAction::Reserve { target } => reserve(world, target, power),
    }
}

fn free_space(world: &SimWorld, id: EntityId) -> u32 {
    world.cargo(id).map(|s| s.free()).unwrap_or(0)
}

fn held(world: &SimWorld, id: EntityId, resource: ResourceKind) -> u32 {
    world.cargo(id).map(|s| s.get(resource)).unwrap_or(0)
}

fn spend_energy(world: &mut SimWorld, id: EntityId, amount: u32) -> u32 {
    world
        .with_cargo(id, |s| s.remove(ResourceKind::Energy, amount))
        .unwrap_or(0)
}

fn gather(world: &mut SimWorld, agent: EntityId, target: EntityId, work: u32) -> bool {
    let room = free_space(world, agent);
    let Some(h) = world.handle(target) else {
        return false;
    };
    let (resource, taken) = if let Ok(mut source) = world.ecs.get::<&mut Source>(h) {
        let n = (work * HARVEST_POWER).min(source.energy).min(room);
        source.energy -= n;
        (ResourceKind::Energy, n)
    } else if let Ok(mut deposit) = world.ecs.get::<&mut Deposit>(h) {
        let n = work.min(deposit.amount).min(room);
        deposit.amount -= n;
        (ResourceKind::Mineral, n)
    } else {
        return false;
    };
    if taken == 0 {
        return false;
    }
    world.with_cargo(agent, |s| s.add(resource, taken));
    true
}

fn build(world: &mut SimWorld, agent: EntityId, target: EntityId, work: u32) -> bool {
    let energy = held(world, agent, ResourceKind::Energy);
    let Some(h) = world.handle(target) else {
        return false;
    };
    let spent = {
        let Ok(mut site) = world.ecs.get::<&mut Site>(h) else {
            return false;
        };
        let remaining = site.kind.build_cost().saturating_sub(site.progress);
        let n = (work * BUILD_POWER).min(energy).min(remaining);
        site.progress += n;
        n
    };
    spend_energy(world, agent, spent) > 0
}

fn repair(world: &mut SimWorld, agent: EntityId, target: EntityId, work: u32) -> bool {
    let energy = held(world, agent, ResourceKind::Energy);
    let Some(h) = world.handle(target) else {
        return false;
    };
    let restored = {
        let Ok(mut building) = world.ecs.get::<&mut Building>(h) else {
            return false;
        };
        let missing = building.hits_max - building.hits.min(building.hits_max);
        let n = (work * REPAIR_POWER)
            .min(energy * REPAIR_HITS_PER_ENERGY)
            .min(missing);
        building.hits += n;
        n
    };
    restored > 0 && spend_energy(world, agent, restored.div_ceil(REPAIR_HITS_PER_ENERGY)) > 0
}

fn upgrade(world: &mut SimWorld, agent: EntityId, target: EntityId, work: u32) -> bool {
    let energy = held(world, agent, ResourceKind::Energy);
    let Some(h) = world.handle(target) else {
        return false;
    };
    let spent = {
        let Ok(mut controller) = world.ecs.get::<&mut Controller>(h) else {
            return false;
        };
        if controller.level == 0 {
            return false;
        }
        let n = work.min(energy);
        controller.progress += n;
        controller.downgrade_in = DOWNGRADE_TICKS;
        let needed = PROGRESS_PER_LEVEL * u32::from(controller.level);
        if controller.level < 8 && controller.progress >= needed {
            controller.progress -= needed;
            controller.level += 1;
            log::info!("controller {target} reached level {}", controller.level);
        }
        n
    };
    spend_energy(world, agent, spent) > 0
}

fn dismantle(world: &mut SimWorld, agent: EntityId, target: EntityId, work: u32) -> bool {
    let Some(h) = world.handle(target) else {
        return false;
    };
    let removed = {
        let Ok(mut building) = world.ecs.get::<&mut Building>(h) else {
            return false;
        };
        let n = (work * DISMANTLE_POWER).min(building.hits);
        building.hits -= n;
        n
    };
    world.with_cargo(agent, |s| s.add(ResourceKind::Energy, removed / 2));
    removed > 0
}

/// Moves `resource` from one store to another. Withdrawals run with the
/// roles swapped.
fn transfer(
    world: &mut SimWorld,
    from: EntityId,
    to: EntityId,
    resource: ResourceKind,
    amount: Option<u32>,
) -> bool {
    let available = held(world, from, resource);
    let room = free_space(world, to);
    let n = amount.unwrap_or(u32::MAX).min(available).min(room);
    if n == 0 {
        return false;
    }
    let taken = world.with_cargo(from, |s| s.remove(resource, n)).unwrap_or(0);
    world.with_cargo(to, |s| s.add(resource, taken));
    taken > 0
}

fn pickup(world: &mut SimWorld, agent: EntityId, target: EntityId) -> bool {
    let room = free_space(world, agent);
    let Some(h) = world.handle(target) else {
        return false;
    };
    let (resource, n, left) = {
        let Ok(mut pile) = world.ecs.get::<&mut Pile>(h) else {
            return false;
        };
        let n = pile.amount.min(room);
        pile.amount -= n;
        (pile.resource, n, pile.amount)
    };
    if left == 0 {
        world.despawn(target);
    }
    world.with_cargo(agent, |s| s.add(resource, n));
    n > 0
}

pub(crate) fn damage(world: &mut SimWorld, target: EntityId, amount: u32) -> bool {
    let Some(h) = world.handle(target) else {
        return false;
    };
    if let Ok(mut agent) = world.ecs.get::<&mut Agent>(h) {
        agent.hits = agent.hits.saturating_sub(amount);
        return amount > 0;
    }
    if let Ok(mut building) = world.ecs.get::<&mut Building>(h) {
        building.hits = building.hits.saturating_sub(amount);
        return amount > 0;
    }
    false
}

fn heal(world: &mut SimWorld, target: EntityId, amount: u32) -> bool {
    let Some(h) = world.handle(target) else {
        return false;
    };
    let Ok(mut agent) = world.ecs.get::<&mut Agent>(h) else {
        return false;
    };
    let before = agent.hits;
    agent.hits = (agent.hits + amount).min(agent.hits_max);
    agent.hits > before
}

fn claim(world: &mut SimWorld, target: EntityId) -> bool {
    let Some(mut place) = world.placement(target) else {
        return false;
    };
    let Some(h) = world.handle(target) else {
        return false;
    };
    {
        let Ok(mut controller) = world.ecs.get::<&mut Controller>(h) else {
            return false;
        };
        if place.owner != Owner::Neutral || controller.level > 0 {
            return false;
        }
        *controller = Controller::owned(1);
    }
    place.owner = Owner::Mine;
    world.set_placement(target, place);
    log::info!("claimed controller {target} in {}", place.pos.zone);
    true
}

fn reserve(world: &mut SimWorld, target: EntityId, claim: u32) -> bool {
    let Some(h) = world.handle(target) else {
        return false;
    };
    let Ok(mut controller) = world.ecs.get::<&mut Controller>(h) else {
        return false;
    };
    if controller.level > 0 {
        return false;
    }
    let ticks = controller
        .reservation
        .filter(|r| r.owner == Owner::Mine)
        .map(|r| r.ticks)
        .unwrap_or(0);
    controller.reservation = Some(Reservation {
        owner: Owner::Mine,
        ticks: (ticks + claim * RESERVE_POWER).min(RESERVATION_MAX),
    });
    true
}
