//! Spawn planning.
//!
//! At most one spawn per zone per tick. The role is the highest-ranked one
//! with a positive deficit whose body fits the zone's budget at all; roles
//! that cannot be built at this budget are passed over rather than
//! blocking the queue.
//!
//! The budget is the zone's full energy capacity, except when the zone has
//! no harvesters left: then waiting for full extensions could take forever,
//! so whatever energy is on hand is used.

use crate::action::{ActionResult, ActionSink};
use crate::capability::Body;
use crate::planner::ZoneDemand;
use crate::roles::{RoleRegistry, RoleTag};
use crate::types::{EntityId, ZoneId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnPlan {
    pub zone: ZoneId,
    pub spawn: EntityId,
    pub role: RoleTag,
    pub body: Body,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpawnDecision {
    Spawned(SpawnPlan),
    /// The body costs more than the energy on hand.
    Waiting {
        zone: ZoneId,
        role: RoleTag,
        cost: u32,
        available: u32,
    },
    Rejected {
        plan: SpawnPlan,
        result: ActionResult,
    },
}

/// Spawn budget for a zone.
pub fn spawn_budget(demand: &ZoneDemand) -> u32 {
    if demand.count(RoleTag::Harvester) == 0 {
        demand.energy_available
    } else {
        demand.energy_capacity
    }
}

/// What the zone should spawn next, ignoring whether it is affordable now.
pub fn plan_spawn(demand: &ZoneDemand, roles: &RoleRegistry) -> Option<SpawnPlan> {
    let spawn = *demand.spawns.first()?;
    let budget = spawn_budget(demand);
    let mut short: Vec<RoleTag> = demand
        .deficits
        .iter()
        .filter(|(_, d)| **d > 0)
        .map(|(r, _)| *r)
        .collect();
    short.sort_by_key(|r| r.spawn_rank());
    short.into_iter().find_map(|role| {
        let strategy = roles.lookup(role).ok()?;
        let body = strategy.body(budget, demand.level);
        (!body.is_empty()).then(|| SpawnPlan {
            zone: demand.zone,
            spawn,
            role,
            body,
        })
    })
}

/// Plans and issues spawns for every zone.
pub fn plan_spawns(
    demands: &[ZoneDemand],
    roles: &RoleRegistry,
    sink: &mut dyn ActionSink,
) -> Vec<SpawnDecision> {
    let mut decisions = Vec::new();
    for demand in demands {
        let Some(plan) = plan_spawn(demand, roles) else {
            continue;
        };
        let cost = plan.body.cost();
        if cost > demand.energy_available {
            log::trace!(
                "{}: {} waits for energy ({cost}/{})",
                plan.zone,
                plan.role,
                demand.energy_available
            );
            decisions.push(SpawnDecision::Waiting {
                zone: plan.zone,
                role: plan.role,
                cost,
                available: demand.energy_available,
            });
            continue;
        }
        let result = sink.spawn(plan.spawn, plan.role, &plan.body);
        if result.is_ok() {
            log::info!(
                "{}: spawning {} ({} units, {cost} energy)",
                plan.zone,
                plan.role,
                plan.body.len()
            );
            decisions.push(SpawnDecision::Spawned(plan));
        } else {
            log::warn!("{}: spawn of {} rejected: {result:?}", plan.zone, plan.role);
            decisions.push(SpawnDecision::Rejected { plan, result });
        }
    }
    decisions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::CapabilityUnit;
    use crate::testing::RecordingSink;
    use std::collections::BTreeMap;

    fn demand(deficits: &[(RoleTag, u32)], available: u32, capacity: u32) -> ZoneDemand {
        ZoneDemand {
            zone: ZoneId::new(0, 0),
            level: 2,
            deficits: deficits.iter().copied().collect(),
            energy_available: available,
            energy_capacity: capacity,
            spawns: vec![EntityId(7)],
            ..ZoneDemand::default()
        }
    }

    #[test]
    fn test_highest_ranked_deficit_spawns_first() {
        let roles = RoleRegistry::standard();
        let mut d = demand(&[(RoleTag::Builder, 1), (RoleTag::Hauler, 2)], 550, 550);
        d.counts = BTreeMap::from([(RoleTag::Harvester, 2)]);
        let plan = plan_spawn(&d, &roles).unwrap();
        assert_eq!(plan.role, RoleTag::Hauler);
        assert_eq!(plan.spawn, EntityId(7));
        assert!(plan.body.cost() <= 550);
    }

    #[test]
    fn test_without_harvesters_spend_what_is_on_hand() {
        let roles = RoleRegistry::standard();
        let mut sink = RecordingSink::default();
        let d = demand(&[(RoleTag::Harvester, 2)], 300, 800);
        let decisions = plan_spawns(&[d], &roles, &mut sink);
        let [SpawnDecision::Spawned(plan)] = decisions.as_slice() else {
            panic!("expected a spawn, got {decisions:?}");
        };
        assert!(plan.body.cost() <= 300);
        assert!(plan.body.count(CapabilityUnit::Work) >= 1);
        assert_eq!(sink.spawns.len(), 1);
    }

    #[test]
    fn test_waits_for_full_budget_when_economy_runs() {
        let roles = RoleRegistry::standard();
        let mut sink = RecordingSink::default();
        let mut d = demand(&[(RoleTag::Upgrader, 1)], 300, 800);
        d.counts = BTreeMap::from([(RoleTag::Harvester, 1)]);
        let decisions = plan_spawns(&[d], &roles, &mut sink);
        assert!(matches!(
            decisions.as_slice(),
            [SpawnDecision::Waiting {
                role: RoleTag::Upgrader,
                available: 300,
                ..
            }]
        ));
        assert!(sink.spawns.is_empty());
    }

    #[test]
    fn test_unbuildable_roles_are_passed_over() {
        let roles = RoleRegistry::standard();
        // A claimer needs 650; the zone can hold only 550.
        let mut d = demand(&[(RoleTag::Claimer, 1), (RoleTag::Scout, 1)], 550, 550);
        d.counts = BTreeMap::from([(RoleTag::Harvester, 1)]);
        let plan = plan_spawn(&d, &roles).unwrap();
        assert_eq!(plan.role, RoleTag::Scout);
    }

    #[test]
    fn test_no_idle_spawn_no_plan() {
        let roles = RoleRegistry::standard();
        let mut d = demand(&[(RoleTag::Harvester, 1)], 300, 300);
        d.spawns.clear();
        assert_eq!(plan_spawn(&d, &roles), None);
    }
}
