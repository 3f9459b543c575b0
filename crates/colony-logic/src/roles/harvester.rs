use crate::action::PrimitiveAction;
use crate::capability::{scale_pattern, Body, CapabilitySet, CapabilityUnit::*};
use crate::error::DispatchError;
use crate::fsm::AgentCtx;
use crate::memory::StateTag;
use crate::roles::common::{
    build_nearest, carried_energy, deliver_energy, return_home, upgrade_controller,
};
use crate::roles::{level_repeats, Outcome, RoleStrategy, RoleTag, StateOutcome};
use crate::task::TaskKind;
use crate::world::Category;

/// Sits on a source and ferries the yield to the nearest sink.
pub struct HarvesterStrategy;

impl RoleStrategy for HarvesterStrategy {
    fn role(&self) -> RoleTag {
        RoleTag::Harvester
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::of(&[Work, Carry])
    }

    fn body(&self, budget: u32, level: u8) -> Body {
        scale_pattern(&[], &[Work, Work, Carry, Move], budget, level_repeats(level, 1, 3))
    }

    fn initial_state(&self) -> StateTag {
        StateTag::Harvesting
    }

    fn states(&self) -> &'static [StateTag] {
        &[StateTag::Harvesting, StateTag::Delivering]
    }

    fn task_kinds(&self, state: StateTag) -> &'static [TaskKind] {
        match state {
            StateTag::Harvesting => &[TaskKind::Harvest],
            _ => &[],
        }
    }

    fn deficit_task(&self) -> Option<TaskKind> {
        Some(TaskKind::Harvest)
    }

    fn on_state(
        &self,
        state: StateTag,
        ctx: &mut AgentCtx<'_>,
    ) -> Result<StateOutcome, DispatchError> {
        match state {
            StateTag::Harvesting => harvest(ctx),
            StateTag::Delivering => Ok(deliver(ctx)),
            other => Err(DispatchError::UnhandledState {
                role: self.role(),
                state: other,
            }),
        }
    }
}

fn harvest(ctx: &mut AgentCtx<'_>) -> Result<StateOutcome, DispatchError> {
    if ctx.agent.store.is_full() {
        return Ok(StateOutcome::go(StateTag::Delivering));
    }
    if let Some(run) = ctx.run_task(&[TaskKind::Harvest])? {
        return Ok(StateOutcome::stay(run.outcome()));
    }
    if let Some(outcome) = return_home(ctx) {
        return Ok(StateOutcome::stay(outcome));
    }
    let remembered = ctx
        .target()
        .filter(|e| e.as_source().is_some_and(|s| s.energy > 0));
    let source = remembered.or_else(|| {
        ctx.nearest(Category::Sources, |e| {
            e.as_source().is_some_and(|s| s.energy > 0)
        })
    });
    let Some(source) = source else {
        if carried_energy(ctx) > 0 {
            return Ok(StateOutcome::go(StateTag::Delivering));
        }
        return Ok(StateOutcome::stay(ctx.idle()));
    };
    ctx.set_target(Some(source.id));
    let outcome = ctx.act_or_approach(PrimitiveAction::Gather { target: source.id }, source.pos);
    Ok(StateOutcome::stay(outcome))
}

/// Sinks first. With every sink full the harvester puts its load into
/// construction, then into the controller.
fn deliver(ctx: &mut AgentCtx<'_>) -> StateOutcome {
    if carried_energy(ctx) == 0 {
        return StateOutcome::go(StateTag::Harvesting);
    }
    let outcome = deliver_energy(ctx)
        .or_else(|| build_nearest(ctx))
        .or_else(|| upgrade_controller(ctx))
        .unwrap_or_else(|| ctx.idle());
    if outcome == Outcome::Idle {
        log::debug!("{}: nowhere to put energy", ctx.id());
    }
    StateOutcome::stay(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentRoster;
    use crate::allocation::TaskBoard;
    use crate::config::ColonyConfig;
    use crate::cost::CostModel;
    use crate::fsm::{dispatch_all, TickContext};
    use crate::intel::{ExpansionRegistry, ScoutRegistry};
    use crate::memory::Migrations;
    use crate::roles::RoleRegistry;
    use crate::store::MemoryStore;
    use crate::task::NewTask;
    use crate::testing::{RecordingSink, SnapshotBuilder};
    use crate::types::{Pos, ResourceKind, Store, ZoneId};
    use crate::world::{Snapshot, StructureKind};

    fn at(x: u8, y: u8) -> Pos {
        Pos::new(ZoneId::new(0, 0), x, y)
    }

    fn run(snap: &Snapshot, roster: &mut AgentRoster, board: &mut TaskBoard) -> RecordingSink {
        let roles = RoleRegistry::standard();
        let config = ColonyConfig::default();
        let mut costs = CostModel::new();
        let mut sink = RecordingSink::default();
        let mut intel = ScoutRegistry::new();
        let expansion = ExpansionRegistry::new();
        let mut tc = TickContext {
            world: snap,
            board,
            costs: &mut costs,
            sink: &mut sink,
            intel: &mut intel,
            expansion: &expansion,
            roles: &roles,
            config: &config,
        };
        dispatch_all(roster, &mut tc);
        sink
    }

    #[test]
    fn test_full_harvester_delivers_same_tick() {
        let mut b = SnapshotBuilder::new(1);
        b.source(at(10, 10), 3_000);
        let spawn = b.stocked(at(12, 12), StructureKind::Spawn, 0);
        let body = Body::new(vec![Work, Work, Carry, Move]);
        let full = Store::new(50).with(ResourceKind::Energy, 50);
        let a = b.agent_with(at(11, 11), body, full, Some(RoleTag::Harvester));
        let snap = b.build();
        let roles = RoleRegistry::standard();
        let mut roster = AgentRoster::new();
        roster.sync(&snap, &roles, &mut MemoryStore::new(), &Migrations::standard());
        let mut board = TaskBoard::new();

        let sink = run(&snap, &mut roster, &mut board);
        assert_eq!(roster.get(a).unwrap().memory.state, StateTag::Delivering);
        assert_eq!(
            sink.actions_of(a),
            vec![PrimitiveAction::Transfer {
                target: spawn,
                resource: ResourceKind::Energy,
                amount: None
            }]
        );
    }

    #[test]
    fn test_harvest_task_survives_delivery() {
        let mut b = SnapshotBuilder::new(1);
        let source = b.source(at(10, 10), 3_000);
        b.stocked(at(12, 12), StructureKind::Spawn, 0);
        let a = b.agent(at(11, 11), &[Work, Work, Carry, Move], Some(RoleTag::Harvester));
        let snap = b.build();
        let roles = RoleRegistry::standard();
        let mut roster = AgentRoster::new();
        roster.sync(&snap, &roles, &mut MemoryStore::new(), &Migrations::standard());
        let mut board = TaskBoard::new();
        board.sync_live(roster.ids());
        let config = ColonyConfig::default();
        let task = board
            .create_task(
                &snap,
                NewTask::new(TaskKind::Harvest, source, 60, ZoneId::new(0, 0)),
                &config.tasks,
            )
            .unwrap();

        let sink = run(&snap, &mut roster, &mut board);
        assert_eq!(sink.actions_of(a), vec![PrimitiveAction::Gather { target: source }]);
        assert_eq!(board.task_of(a).map(|t| t.id), Some(task));

        // Next tick the agent is full and switches to delivering.
        let mut b2 = SnapshotBuilder::new(2);
        let source2 = b2.source(at(10, 10), 3_000);
        let spawn = b2.stocked(at(12, 12), StructureKind::Spawn, 0);
        assert_eq!(source2, source);
        let body = Body::new(vec![Work, Work, Carry, Move]);
        let full = Store::new(50).with(ResourceKind::Energy, 50);
        b2.agent_with(at(11, 11), body, full, Some(RoleTag::Harvester));
        let snap2 = b2.build();
        roster.sync(&snap2, &roles, &mut MemoryStore::new(), &Migrations::standard());
        let sink = run(&snap2, &mut roster, &mut board);
        assert_eq!(sink.actions_of(a)[0].target(), spawn);
        assert_eq!(board.task_of(a).map(|t| t.id), Some(task));
    }

    #[test]
    fn test_harvester_without_sources_idles() {
        let mut b = SnapshotBuilder::new(1);
        let a = b.agent(at(11, 11), &[Work, Carry, Move], Some(RoleTag::Harvester));
        let snap = b.build();
        let roles = RoleRegistry::standard();
        let mut roster = AgentRoster::new();
        roster.sync(&snap, &roles, &mut MemoryStore::new(), &Migrations::standard());
        let sink = run(&snap, &mut roster, &mut TaskBoard::new());
        assert!(sink.performed.is_empty());
        assert_eq!(roster.get(a).unwrap().memory.idle_ticks, 1);
        assert_eq!(sink.moves.len(), 1);
    }
}
