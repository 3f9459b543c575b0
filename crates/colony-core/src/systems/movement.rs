//! Movement system - applies one recorded step per agent and charges fatigue

use colony_logic::capability::{CapabilityUnit, CARRY_CAPACITY};
use colony_logic::types::{AgentId, Pos};
use colony_logic::world::{StructureKind, Terrain};

use crate::components::{Agent, Building, Placement};
use crate::world::SimWorld;

/// Fatigue per weighted unit for each kind of tile.
pub const ROAD_FATIGUE: u32 = 1;
pub const PLAIN_FATIGUE: u32 = 2;
pub const SWAMP_FATIGUE: u32 = 10;
/// Fatigue each move unit removes per tick.
pub const MOVE_RECOVERY: u32 = 2;

/// Applies recorded steps; returns how many agents moved.
pub fn apply_moves(world: &mut SimWorld, moves: &[(AgentId, Pos)]) -> usize {
    let mut moved = 0;
    for (agent, step) in moves {
        let id = agent.entity();
        let (Some(place), Some(state)) = (world.placement(id), world.agent(id)) else {
            continue;
        };
        if !state.is_active() || state.fatigue > 0 || !is_single_step(&place.pos, step) {
            continue;
        }
        if !world.is_walkable(step) {
            log::trace!("{agent}: step to {step} blocked");
            continue;
        }
        let carried = world.cargo(id).map(|s| s.used()).unwrap_or(0);
        let fatigue = weight(&state, carried) * tile_fatigue(world, step);
        world.set_placement(id, Placement { pos: *step, ..place });
        if let Some(h) = world.handle(id) {
            if let Ok(mut a) = world.ecs.get::<&mut Agent>(h) {
                a.fatigue += fatigue;
            }
        }
        moved += 1;
    }
    moved
}

/// Adjacent tiles, including across a zone border.
fn is_single_step(from: &Pos, to: &Pos) -> bool {
    from.range_to(to) == 1
}

/// Units that weigh an agent down. Carry units count only while loaded.
fn weight(agent: &Agent, carried: u32) -> u32 {
    let loaded = carried.div_ceil(CARRY_CAPACITY).min(agent.count(CapabilityUnit::Carry));
    let fixed = agent
        .body
        .units()
        .iter()
        .filter(|u| !matches!(u, CapabilityUnit::Move | CapabilityUnit::Carry))
        .count() as u32;
    fixed + loaded
}

fn tile_fatigue(world: &SimWorld, pos: &Pos) -> u32 {
    let on_road = world
        .ecs
        .query::<(&Building, &Placement)>()
        .iter()
        .any(|(_, (b, p))| p.pos == *pos && b.kind == StructureKind::Road);
    if on_road {
        return ROAD_FATIGUE;
    }
    match world.terrain(pos.zone).map(|g| g.at(pos)) {
        Some(Terrain::Swamp) => SWAMP_FATIGUE,
        _ => PLAIN_FATIGUE,
    }
}

/// Recovers fatigue on every agent.
pub fn recover_fatigue(world: &mut SimWorld) {
    for (_, agent) in world.ecs.query_mut::<&mut Agent>() {
        let recovery = agent.count(CapabilityUnit::Move) * MOVE_RECOVERY;
        agent.fatigue = agent.fatigue.saturating_sub(recovery);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use colony_logic::capability::{Body, CapabilityUnit::*};
    use colony_logic::types::ZoneId;
    use colony_logic::world::{Owner, TerrainGrid};

    fn home() -> ZoneId {
        ZoneId::new(0, 0)
    }

    fn setup(units: Vec<CapabilityUnit>) -> (SimWorld, AgentId) {
        let mut world = SimWorld::new();
        world.add_terrain(home(), TerrainGrid::from_rows(&["", "", "", "~~~~~"]));
        world.add_terrain(ZoneId::new(1, 0), TerrainGrid::open());
        let id = world.add_agent(Pos::new(home(), 2, 2), Owner::Mine, Body::new(units), None);
        (world, AgentId(id.0))
    }

    #[test]
    fn test_step_onto_swamp_tires_heavy_agents() {
        let (mut world, agent) = setup(vec![Work, Work, Move]);
        let step = Pos::new(home(), 2, 3);
        assert_eq!(apply_moves(&mut world, &[(agent, step)]), 1);
        assert_eq!(world.placement(agent.entity()).map(|p| p.pos), Some(step));
        assert_eq!(world.agent(agent.entity()).map(|a| a.fatigue), Some(20));

        // Tired agents stay put until recovered.
        assert_eq!(apply_moves(&mut world, &[(agent, Pos::new(home(), 2, 4))]), 0);
        for _ in 0..10 {
            recover_fatigue(&mut world);
        }
        assert_eq!(world.agent(agent.entity()).map(|a| a.fatigue), Some(0));
    }

    #[test]
    fn test_empty_carry_units_weigh_nothing() {
        let (mut world, agent) = setup(vec![Carry, Carry, Move]);
        apply_moves(&mut world, &[(agent, Pos::new(home(), 3, 2))]);
        assert_eq!(world.agent(agent.entity()).map(|a| a.fatigue), Some(0));
    }

    #[test]
    fn test_crosses_zone_border() {
        let (mut world, agent) = setup(vec![Move]);
        let edge = Pos::new(home(), 49, 10);
        world.set_placement(agent.entity(), Placement { pos: edge, owner: Owner::Mine });
        let across = Pos::new(ZoneId::new(1, 0), 0, 10);
        assert_eq!(apply_moves(&mut world, &[(agent, across)]), 1);
        assert_eq!(world.placement(agent.entity()).map(|p| p.pos.zone), Some(ZoneId::new(1, 0)));
    }

    #[test]
    fn test_rejects_jumps() {
        let (mut world, agent) = setup(vec![Move]);
        assert_eq!(apply_moves(&mut world, &[(agent, Pos::new(home(), 10, 10))]), 0);
    }
}
