//! Fallback behaviors shared by the worker roles.
//!
//! Every helper works on the agent's current zone and remembers its pick in
//! `memory.target`, so the next tick resumes the same target as long as it
//! still resolves and is still useful.

use crate::action::{ActionResult, PrimitiveAction};
use crate::capability::CapabilityUnit;
use crate::error::DispatchError;
use crate::fsm::AgentCtx;
use crate::memory::StateTag;
use crate::planner::repair_fraction;
use crate::roles::{Outcome, StateOutcome};
use crate::task::TaskKind;
use crate::types::{Pos, ResourceKind};
use crate::world::{Category, Entity, EntityKind};

/// Range that counts as "inside" a zone when walking to its center.
pub(crate) const ZONE_RANGE: u32 = 20;

pub(crate) fn carried_energy(ctx: &AgentCtx<'_>) -> u32 {
    ctx.agent.store.get(ResourceKind::Energy)
}

/// Walks back to the home zone. `None` when already there.
pub(crate) fn return_home(ctx: &mut AgentCtx<'_>) -> Option<Outcome> {
    let home = ctx.agent.home();
    if ctx.pos().zone == home {
        return None;
    }
    Some(ctx.move_to(Pos::center(home), ZONE_RANGE))
}

/// Energy still obtainable from `e` by this agent.
fn yields_energy(e: &Entity, can_gather: bool) -> bool {
    match &e.kind {
        EntityKind::Structure(s) => {
            e.is_mine()
                && s.kind.is_bulk_store()
                && s.store
                    .as_ref()
                    .is_some_and(|st| st.get(ResourceKind::Energy) > 0)
        }
        EntityKind::Dropped(d) => d.resource == ResourceKind::Energy && d.amount > 0,
        EntityKind::Source(s) => can_gather && s.energy > 0,
        _ => false,
    }
}

fn collect_action(e: &Entity) -> Option<PrimitiveAction> {
    let target = e.id;
    match &e.kind {
        EntityKind::Structure(_) => Some(PrimitiveAction::Withdraw {
            target,
            resource: ResourceKind::Energy,
            amount: None,
        }),
        EntityKind::Dropped(_) => Some(PrimitiveAction::Pickup { target }),
        EntityKind::Source(_) => Some(PrimitiveAction::Gather { target }),
        _ => None,
    }
}

/// Bulk storage first, then loose energy worth picking up, then a source
/// for agents that can gather.
fn pick_energy_source<'a>(ctx: &AgentCtx<'a>) -> Option<&'a Entity> {
    let min_pickup = ctx.config.planner.min_pickup_amount;
    let can_gather = ctx.agent.has(CapabilityUnit::Work);
    ctx.nearest(Category::MyStructures, |e| yields_energy(e, false))
        .or_else(|| {
            ctx.nearest(Category::Dropped, |e| {
                e.as_dropped()
                    .is_some_and(|d| d.resource == ResourceKind::Energy && d.amount >= min_pickup)
            })
        })
        .or_else(|| ctx.nearest(Category::Sources, |e| yields_energy(e, can_gather)))
}

/// Fills the agent's store: a task of `kinds` first, otherwise the nearest
/// energy it can reach. Idles when the zone has nothing to give.
pub(crate) fn collect_energy(
    ctx: &mut AgentCtx<'_>,
    kinds: &[TaskKind],
) -> Result<Outcome, DispatchError> {
    if let Some(run) = ctx.run_task(kinds)? {
        return Ok(run.outcome());
    }
    let can_gather = ctx.agent.has(CapabilityUnit::Work);
    let remembered = ctx.target().filter(|e| yields_energy(*e, can_gather));
    let Some(source) = remembered.or_else(|| pick_energy_source(ctx)) else {
        return Ok(ctx.idle());
    };
    let Some(action) = collect_action(source) else {
        return Ok(ctx.idle());
    };
    ctx.set_target(Some(source.id));
    let outcome = ctx.act_or_approach(action, source.pos);
    forget_on_failure(ctx, outcome);
    Ok(outcome)
}

fn accepts_energy(e: &Entity) -> bool {
    e.is_mine()
        && e.as_structure()
            .and_then(|s| s.store.as_ref())
            .is_some_and(|st| st.free() > 0)
}

fn pick_energy_sink<'a>(ctx: &AgentCtx<'a>) -> Option<&'a Entity> {
    let refill = |e: &Entity| {
        accepts_energy(e) && e.as_structure().is_some_and(|s| s.kind.is_refill_sink())
    };
    let bulk = |e: &Entity| {
        accepts_energy(e) && e.as_structure().is_some_and(|s| s.kind.is_bulk_store())
    };
    ctx.nearest(Category::MyStructures, refill)
        .or_else(|| ctx.nearest(Category::MyStructures, bulk))
}

/// Hands carried energy to the home zone's sinks: refill targets first,
/// then bulk storage. `None` when nothing there takes energy.
pub(crate) fn deliver_energy(ctx: &mut AgentCtx<'_>) -> Option<Outcome> {
    if let Some(outcome) = return_home(ctx) {
        return Some(outcome);
    }
    let remembered = ctx.target().filter(|e| accepts_energy(*e));
    let sink = remembered.or_else(|| pick_energy_sink(ctx))?;
    ctx.set_target(Some(sink.id));
    let action = PrimitiveAction::Transfer {
        target: sink.id,
        resource: ResourceKind::Energy,
        amount: None,
    };
    let outcome = ctx.act_or_approach(action, sink.pos);
    forget_on_failure(ctx, outcome);
    Some(outcome)
}

pub(crate) fn build_nearest(ctx: &mut AgentCtx<'_>) -> Option<Outcome> {
    let open = |e: &Entity| e.is_mine() && e.as_site().is_some_and(|s| !s.is_complete());
    let remembered = ctx.target().filter(|e| open(*e));
    let site = remembered.or_else(|| ctx.nearest(Category::Sites, open))?;
    ctx.set_target(Some(site.id));
    Some(ctx.act_or_approach(PrimitiveAction::Build { target: site.id }, site.pos))
}

/// Repairs the most damaged own structure in the zone.
pub(crate) fn repair_damaged(ctx: &mut AgentCtx<'_>) -> Option<Outcome> {
    let config = ctx.config;
    let damage = |e: &Entity| {
        e.as_structure()
            .filter(|_| e.is_mine())
            .and_then(|s| repair_fraction(s.kind, s.hits, s.hits_max, config))
    };
    let remembered = ctx.target().filter(|e| damage(*e).is_some());
    let target = match remembered {
        Some(e) => e,
        None => {
            let world = ctx.world;
            let from = ctx.pos();
            world
                .query(from.zone, Category::MyStructures)
                .into_iter()
                .filter_map(|e| damage(e).map(|f| (e, f)))
                .min_by(|(a, fa), (b, fb)| {
                    fa.total_cmp(fb)
                        .then(from.range_to(&a.pos).cmp(&from.range_to(&b.pos)))
                })
                .map(|(e, _)| e)?
        }
    };
    ctx.set_target(Some(target.id));
    Some(ctx.act_or_approach(PrimitiveAction::Repair { target: target.id }, target.pos))
}

/// Filler work: upgrade the home controller.
pub(crate) fn upgrade_controller(ctx: &mut AgentCtx<'_>) -> Option<Outcome> {
    let controller = ctx.home_controller()?;
    if let Some(outcome) = return_home(ctx) {
        return Some(outcome);
    }
    Some(ctx.act_or_approach(
        PrimitiveAction::Upgrade {
            target: controller.id,
        },
        controller.pos,
    ))
}

/// Collecting half of the worker cycle: fill up, then switch to `spend`.
/// An agent with some energy and nothing left to collect spends what it
/// has instead of waiting.
pub(crate) fn collect_then(
    ctx: &mut AgentCtx<'_>,
    kinds: &[TaskKind],
    spend: StateTag,
) -> Result<StateOutcome, DispatchError> {
    if ctx.agent.store.is_full() {
        return Ok(StateOutcome::go(spend));
    }
    let outcome = collect_energy(ctx, kinds)?;
    if outcome == Outcome::Idle && carried_energy(ctx) > 0 {
        return Ok(StateOutcome::stay(outcome).then(spend));
    }
    Ok(StateOutcome::stay(outcome))
}

/// A failed action means the remembered target is no longer worth it.
fn forget_on_failure(ctx: &mut AgentCtx<'_>, outcome: Outcome) {
    if let Outcome::Acted(ActionResult::Failed(reason)) = outcome {
        log::debug!("{}: dropping target after {reason:?}", ctx.id());
        ctx.set_target(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentRoster;
    use crate::allocation::TaskBoard;
    use crate::capability::{Body, CapabilityUnit::*};
    use crate::config::ColonyConfig;
    use crate::cost::CostModel;
    use crate::intel::{ExpansionRegistry, ScoutRegistry};
    use crate::memory::Migrations;
    use crate::roles::{RoleRegistry, RoleTag};
    use crate::store::MemoryStore;
    use crate::testing::{RecordingSink, SnapshotBuilder};
    use crate::types::{AgentId, Store, ZoneId};
    use crate::world::{Owner, Snapshot, StructureInfo, StructureKind, WorldView};

    fn at(x: u8, y: u8) -> Pos {
        Pos::new(ZoneId::new(0, 0), x, y)
    }

    /// Runs `f` against a context for agent `id`.
    fn with_ctx<R>(
        snap: &Snapshot,
        id: AgentId,
        f: impl FnOnce(&mut AgentCtx<'_>) -> R,
    ) -> (R, RecordingSink) {
        let roles = RoleRegistry::standard();
        let mut roster = AgentRoster::new();
        roster.sync(snap, &roles, &mut MemoryStore::new(), &Migrations::standard());
        let mut board = TaskBoard::new();
        board.sync_live(roster.ids());
        let mut costs = CostModel::new();
        let mut sink = RecordingSink::default();
        let mut intel = ScoutRegistry::new();
        let expansion = ExpansionRegistry::new();
        let config = ColonyConfig::default();
        let agent = roster.get_mut(id).unwrap();
        let mut ctx = AgentCtx {
            tick: snap.tick(),
            agent,
            world: snap,
            board: &mut board,
            costs: &mut costs,
            sink: &mut sink,
            intel: &mut intel,
            expansion: &expansion,
            config: &config,
        };
        let r = f(&mut ctx);
        (r, sink)
    }

    #[test]
    fn test_collect_prefers_storage_over_source() {
        let mut b = SnapshotBuilder::new(1);
        b.source(at(11, 10), 3_000);
        let storage = b.stocked(at(14, 10), StructureKind::Container, 500);
        let a = b.agent(at(10, 10), &[Work, Carry, Move], Some(RoleTag::Builder));
        let snap = b.build();
        let (outcome, sink) = with_ctx(&snap, a, |ctx| {
            let o = collect_energy(ctx, &[]).unwrap();
            (o, ctx.agent.memory.target)
        });
        assert_eq!(outcome, (Outcome::Moved, Some(storage)));
        assert_eq!(sink.moves[0].goal, at(14, 10));
        assert!(sink.actions_of(a).is_empty());
    }

    #[test]
    fn test_collect_falls_back_to_gathering() {
        let mut b = SnapshotBuilder::new(1);
        let source = b.source(at(11, 10), 3_000);
        let a = b.agent(at(10, 10), &[Work, Carry, Move], Some(RoleTag::Builder));
        let snap = b.build();
        let (outcome, sink) = with_ctx(&snap, a, |ctx| collect_energy(ctx, &[]).unwrap());
        assert_eq!(outcome, Outcome::Acted(ActionResult::Ok));
        assert_eq!(
            sink.actions_of(a),
            vec![PrimitiveAction::Gather { target: source }]
        );
    }

    #[test]
    fn test_haulers_never_gather() {
        let mut b = SnapshotBuilder::new(1);
        b.source(at(11, 10), 3_000);
        let a = b.agent(at(10, 10), &[Carry, Move], Some(RoleTag::Hauler));
        let snap = b.build();
        let (outcome, sink) = with_ctx(&snap, a, |ctx| collect_energy(ctx, &[]).unwrap());
        assert_eq!(outcome, Outcome::Idle);
        assert!(sink.performed.is_empty());
    }

    #[test]
    fn test_deliver_fills_spawn_before_storage() {
        let mut b = SnapshotBuilder::new(1);
        b.stocked(at(11, 11), StructureKind::Storage, 0);
        let spawn = b.stocked(at(12, 12), StructureKind::Spawn, 100);
        let body = Body::new(vec![Carry, Move]);
        let store = Store::new(50).with(ResourceKind::Energy, 50);
        let a = b.agent_with(at(11, 12), body, store, Some(RoleTag::Hauler));
        let snap = b.build();
        let (outcome, sink) = with_ctx(&snap, a, |ctx| deliver_energy(ctx));
        assert_eq!(outcome, Some(Outcome::Acted(ActionResult::Ok)));
        assert_eq!(sink.actions_of(a)[0].target(), spawn);
    }

    #[test]
    fn test_deliver_none_when_everything_full() {
        let mut b = SnapshotBuilder::new(1);
        b.stocked(at(12, 12), StructureKind::Spawn, 300);
        let a = b.agent(at(11, 12), &[Carry, Move], Some(RoleTag::Hauler));
        let snap = b.build();
        let (outcome, _) = with_ctx(&snap, a, |ctx| deliver_energy(ctx));
        assert_eq!(outcome, None);
    }

    #[test]
    fn test_repair_picks_most_damaged() {
        let mut b = SnapshotBuilder::new(1);
        let mut light = StructureInfo::new(StructureKind::Container);
        light.hits = light.hits_max / 2;
        let mut heavy = StructureInfo::new(StructureKind::Road);
        heavy.hits = heavy.hits_max / 10;
        b.structure_with(at(12, 10), Owner::Mine, light);
        let road = b.structure_with(at(20, 20), Owner::Mine, heavy);
        let a = b.agent(at(10, 10), &[Work, Carry, Move], Some(RoleTag::Repairer));
        let snap = b.build();
        let (outcome, sink) = with_ctx(&snap, a, |ctx| {
            let o = repair_damaged(ctx);
            (o, ctx.agent.memory.target)
        });
        assert_eq!(outcome, (Some(Outcome::Moved), Some(road)));
        assert_eq!(sink.moves[0].goal, at(20, 20));
    }

    #[test]
    fn test_upgrade_needs_own_controller() {
        let mut b = SnapshotBuilder::new(1);
        b.controller(at(12, 12), Owner::Neutral, 0);
        let a = b.agent(at(11, 11), &[Work, Carry, Move], Some(RoleTag::Upgrader));
        let snap = b.build();
        let (outcome, _) = with_ctx(&snap, a, |ctx| upgrade_controller(ctx));
        assert_eq!(outcome, None);
    }
}
