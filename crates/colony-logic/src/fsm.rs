//! Agent state machine engine.
//!
//! Once per tick every managed agent is dispatched to its role strategy's
//! handler for the agent's current [`StateTag`]:
//!
//! 1. The action guard is reset. Spawning agents are skipped.
//! 2. A role without a strategy, or a state the strategy does not list, is
//!    repaired by falling back to the strategy's defaults. This is a
//!    recovery transition, never an error.
//! 3. The handler runs with an [`AgentCtx`]. A requested transition is
//!    applied and the new state dispatched again in the same tick, up to
//!    `max_transitions_per_tick`. The guard keeps mutating actions at one.
//! 4. Errors and panics are caught at the agent boundary, recorded in the
//!    [`DispatchReport`] and the tick moves on to the next agent.

use std::panic::{self, AssertUnwindSafe};

use crate::action::{ActionResult, ActionSink, PrimitiveAction};
use crate::agent::{AgentRecord, AgentRoster};
use crate::allocation::{TaskBoard, TaskExecution};
use crate::config::ColonyConfig;
use crate::cost::{CostModel, PathRequest};
use crate::error::DispatchError;
use crate::intel::{ExpansionRegistry, ScoutRegistry};
use crate::memory::StateTag;
use crate::roles::{Outcome, RoleRegistry, RoleStrategy, RoleTag};
use crate::task::{TaskKind, TaskStatus};
use crate::types::{AgentId, EntityId, Pos, TaskId};
use crate::world::{Category, Entity, WorldView};

/// Range an idle agent keeps to its rally point.
pub const RALLY_RANGE: u32 = 3;

/// Everything a state handler may touch while one agent is dispatched.
pub struct AgentCtx<'a> {
    pub tick: u64,
    pub agent: &'a mut AgentRecord,
    pub world: &'a dyn WorldView,
    pub board: &'a mut TaskBoard,
    pub costs: &'a mut CostModel,
    pub sink: &'a mut dyn ActionSink,
    pub intel: &'a mut ScoutRegistry,
    pub expansion: &'a ExpansionRegistry,
    pub config: &'a ColonyConfig,
}

/// Result of one [`AgentCtx::run_task`] step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskRun {
    pub task: TaskId,
    pub kind: TaskKind,
    pub execution: TaskExecution,
}

impl TaskRun {
    pub fn outcome(&self) -> Outcome {
        match self.execution.result {
            None => Outcome::None,
            Some(ActionResult::NotInRange) => Outcome::Moved,
            Some(r) => Outcome::Acted(r),
        }
    }

    pub fn is_done(&self) -> bool {
        self.execution.status != TaskStatus::InProgress
    }
}

impl<'a> AgentCtx<'a> {
    pub fn id(&self) -> AgentId {
        self.agent.id
    }

    pub fn pos(&self) -> Pos {
        self.agent.pos
    }

    /// Routes one primitive action through the guard. `None` when the
    /// guard already latched this tick.
    pub fn act(&mut self, action: PrimitiveAction) -> Option<ActionResult> {
        let id = self.agent.id;
        self.agent.guard.perform(&mut *self.sink, id, &action)
    }

    /// Issues a movement intent toward `goal`. Free: never touches the
    /// guard.
    pub fn move_to(&mut self, goal: Pos, range: u32) -> Outcome {
        if self.agent.pos.in_range(&goal, range) {
            return Outcome::None;
        }
        let request = PathRequest::new(self.agent.pos, goal, range)
            .for_body(&self.agent.body, self.agent.store.used());
        let surface = self.costs.surface(self.world, &request, self.config);
        self.sink.move_intent(self.agent.id, goal, range, &surface);
        Outcome::Moved
    }

    /// Acts on a target in range, or walks toward it. An action the sink
    /// still reports out of range also triggers the approach.
    pub fn act_or_approach(&mut self, action: PrimitiveAction, target: Pos) -> Outcome {
        if !self.agent.pos.in_range(&target, action.range()) {
            return self.move_to(target, action.range());
        }
        match self.act(action) {
            None => Outcome::None,
            Some(ActionResult::NotInRange) => {
                self.move_to(target, action.range());
                Outcome::Acted(ActionResult::NotInRange)
            }
            Some(result) => {
                self.agent.memory.idle_ticks = 0;
                Outcome::Acted(result)
            }
        }
    }

    /// The recorded target, cleared when it no longer resolves.
    pub fn target(&mut self) -> Option<&'a Entity> {
        let id = self.agent.memory.target?;
        let world = self.world;
        let entity = world.resolve(id);
        if entity.is_none() {
            log::debug!("{}: target {id} gone", self.agent.id);
            self.agent.memory.target = None;
        }
        entity
    }

    /// Like [`target`](Self::target), but a vanished target aborts the
    /// handler with [`DispatchError::MissingTarget`].
    pub fn require_target(&mut self) -> Result<Option<&'a Entity>, DispatchError> {
        let Some(id) = self.agent.memory.target else {
            return Ok(None);
        };
        match self.target() {
            Some(e) => Ok(Some(e)),
            None => Err(DispatchError::MissingTarget {
                agent: self.agent.id,
                target: id,
            }),
        }
    }

    pub fn set_target(&mut self, target: Option<EntityId>) {
        self.agent.memory.target = target;
    }

    /// Nearest entity of `category` in the agent's current zone that passes
    /// `keep`.
    pub fn nearest(
        &self,
        category: Category,
        keep: impl Fn(&Entity) -> bool,
    ) -> Option<&'a Entity> {
        let world = self.world;
        let from = self.agent.pos;
        world
            .entities(from.zone)
            .iter()
            .filter(|e| category.matches(e) && keep(e))
            .min_by_key(|e| (from.range_to(&e.pos), e.id))
    }

    /// The home zone's own controller, if visible.
    pub fn home_controller(&self) -> Option<&'a Entity> {
        let world = self.world;
        world
            .query(self.agent.home(), Category::Controllers)
            .into_iter()
            .find(|e| e.is_mine())
    }

    pub fn current_task(&self) -> Option<TaskId> {
        self.board.task_of(self.agent.id).map(|t| t.id)
    }

    /// Polls the board for the best task of `kinds` and takes it.
    pub fn acquire_task(&mut self, kinds: &[TaskKind]) -> Option<TaskId> {
        let id = self.board.find_best_matching(self.agent, kinds)?.id;
        match self.board.assign(self.agent.id, id) {
            Ok(()) => Some(id),
            Err(e) => {
                log::debug!("{}: cannot take {id}: {e}", self.agent.id);
                None
            }
        }
    }

    /// Executes the agent's task if it is one of `kinds`, acquiring one if
    /// the agent holds none. A held task of another kind is left alone and
    /// `None` returned, as when nothing is available.
    ///
    /// Finished tasks are released, except standing ones.
    pub fn run_task(&mut self, kinds: &[TaskKind]) -> Result<Option<TaskRun>, DispatchError> {
        let held = self
            .board
            .task_of(self.agent.id)
            .map(|t| (t.id, t.kind, t.target_pos));
        let (task, kind, target_pos) = match held {
            Some((id, kind, pos)) if kinds.contains(&kind) => (id, kind, pos),
            Some(_) => return Ok(None),
            None => {
                let Some(id) = self.acquire_task(kinds) else {
                    return Ok(None);
                };
                match self.board.get(id) {
                    Some(t) => (t.id, t.kind, t.target_pos),
                    None => return Ok(None),
                }
            }
        };

        let execution = self
            .board
            .execute_task(self.world, self.agent, &mut *self.sink, task, self.config)?;
        if execution.needs_approach() {
            self.move_to(target_pos, kind.range());
        }
        let run = TaskRun {
            task,
            kind,
            execution,
        };
        if run.is_done() && !(kind.is_standing() && execution.status == TaskStatus::Completed) {
            self.board.unassign(self.agent.id);
        }
        if matches!(execution.result, Some(r) if r != ActionResult::NotInRange) {
            self.agent.memory.idle_ticks = 0;
        }
        Ok(Some(run))
    }

    pub fn release_task(&mut self) -> Option<TaskId> {
        self.board.unassign(self.agent.id)
    }

    /// Fallback when there is nothing to do: wait near the rally point.
    pub fn idle(&mut self) -> Outcome {
        self.agent.memory.idle_ticks = self.agent.memory.idle_ticks.saturating_add(1);
        let rally = self
            .agent
            .memory
            .rally
            .unwrap_or_else(|| Pos::center(self.agent.home()));
        self.move_to(rally, RALLY_RANGE);
        Outcome::Idle
    }
}

/// Collaborators shared by every agent dispatched in one tick.
pub struct TickContext<'a> {
    pub world: &'a dyn WorldView,
    pub board: &'a mut TaskBoard,
    pub costs: &'a mut CostModel,
    pub sink: &'a mut dyn ActionSink,
    pub intel: &'a mut ScoutRegistry,
    pub expansion: &'a ExpansionRegistry,
    pub roles: &'a RoleRegistry,
    pub config: &'a ColonyConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub dispatched: u32,
    pub spawning: u32,
    /// Agents whose guard latched this tick.
    pub actions: u32,
    /// Action calls dropped by a latched guard.
    pub blocked: u32,
    pub moved: u32,
    pub idle: u32,
    pub transitions: u32,
    /// Agents whose role or state was repaired to defaults.
    pub resets: Vec<AgentId>,
    pub failures: Vec<(AgentId, String)>,
}

#[derive(Debug, Clone, Copy, Default)]
struct AgentDispatch {
    acted: bool,
    moved: bool,
    idle: bool,
    transitions: u32,
    reset: bool,
}

/// Dispatches every agent of the roster once.
pub fn dispatch_all(roster: &mut AgentRoster, tc: &mut TickContext<'_>) -> DispatchReport {
    let mut report = DispatchReport::default();
    for agent in roster.iter_mut() {
        agent.guard.reset();
        if agent.spawning {
            report.spawning += 1;
            continue;
        }
        agent.memory.observe_position(agent.pos);
        report.dispatched += 1;

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| dispatch_one(agent, tc)));
        match outcome {
            Ok(Ok(d)) => {
                report.moved += u32::from(d.moved && !d.acted);
                report.idle += u32::from(d.idle);
                report.transitions += d.transitions;
                if d.reset {
                    report.resets.push(agent.id);
                }
            }
            Ok(Err(DispatchError::MissingTarget { target, .. })) => {
                log::debug!("{}: dropped missing target {target}", agent.id);
                agent.memory.target = None;
            }
            Ok(Err(e)) => {
                log::warn!("{}: dispatch failed: {e}", agent.id);
                report.failures.push((agent.id, e.to_string()));
            }
            Err(payload) => {
                let e = DispatchError::Panicked(panic_message(payload.as_ref()));
                log::warn!("{}: {e}", agent.id);
                report.failures.push((agent.id, e.to_string()));
            }
        }
        report.actions += u32::from(agent.guard.is_spent());
        report.blocked += agent.guard.blocked();
    }
    report
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn dispatch_one(
    agent: &mut AgentRecord,
    tc: &mut TickContext<'_>,
) -> Result<AgentDispatch, DispatchError> {
    let mut d = AgentDispatch::default();
    let strategy = resolve_strategy(agent, tc.roles, &mut d)?;

    if !strategy.states().contains(&agent.memory.state) {
        log::debug!(
            "{}: state {:?} unknown to {}, reset to {:?}",
            agent.id,
            agent.memory.state,
            strategy.role(),
            strategy.initial_state()
        );
        agent.memory.transition(strategy.initial_state());
        d.reset = true;
    }

    let tick = tc.world.tick();
    let max = tc.config.max_transitions_per_tick;
    loop {
        let state = agent.memory.state;
        let mut ctx = AgentCtx {
            tick,
            agent: &mut *agent,
            world: tc.world,
            board: &mut *tc.board,
            costs: &mut *tc.costs,
            sink: &mut *tc.sink,
            intel: &mut *tc.intel,
            expansion: tc.expansion,
            config: tc.config,
        };
        let out = strategy.on_state(state, &mut ctx)?;
        match out.outcome {
            Outcome::Acted(_) => d.acted = true,
            Outcome::Moved => d.moved = true,
            Outcome::Idle => d.idle = true,
            Outcome::None => {}
        }
        let Some(next) = out.next.filter(|n| *n != state) else {
            break;
        };
        if !strategy.states().contains(&next) {
            return Err(DispatchError::UnhandledState {
                role: strategy.role(),
                state: next,
            });
        }
        release_unfit_task(agent, tc.board, strategy, next);
        agent.memory.transition(next);
        d.transitions += 1;
        if d.transitions >= max {
            break;
        }
    }
    Ok(d)
}

/// The agent's strategy. A role with no strategy is replaced by the role
/// its capabilities suggest, with fresh default memory.
fn resolve_strategy<'r>(
    agent: &mut AgentRecord,
    roles: &'r RoleRegistry,
    d: &mut AgentDispatch,
) -> Result<&'r dyn RoleStrategy, DispatchError> {
    match roles.lookup(agent.role()) {
        Ok(strategy) => Ok(strategy),
        Err(e) => {
            let role = RoleTag::infer(agent.capabilities);
            let strategy = roles.lookup(role)?;
            log::info!("{}: {e}; reinitialized as {role}", agent.id);
            agent.memory = strategy.default_memory(agent.home());
            d.reset = true;
            Ok(strategy)
        }
    }
}

fn release_unfit_task(
    agent: &AgentRecord,
    board: &mut TaskBoard,
    strategy: &dyn RoleStrategy,
    next: StateTag,
) {
    let Some(kind) = board.task_of(agent.id).map(|t| t.kind) else {
        return;
    };
    if !kind.is_standing() && !strategy.task_kinds(next).contains(&kind) {
        board.unassign(agent.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{Body, CapabilitySet, CapabilityUnit::*};
    use crate::memory::{AgentMemory, Migrations};
    use crate::roles::StateOutcome;
    use crate::store::MemoryStore;
    use crate::testing::{RecordingSink, SnapshotBuilder};
    use crate::types::{ResourceKind, Store, ZoneId};
    use crate::world::{Owner, Snapshot, StructureKind};

    fn zone() -> ZoneId {
        ZoneId::new(0, 0)
    }

    fn at(x: u8, y: u8) -> Pos {
        Pos::new(zone(), x, y)
    }

    struct Harness {
        roles: RoleRegistry,
        roster: AgentRoster,
        board: TaskBoard,
        costs: CostModel,
        sink: RecordingSink,
        intel: ScoutRegistry,
        expansion: ExpansionRegistry,
        config: ColonyConfig,
    }

    impl Harness {
        fn new(roles: RoleRegistry, snap: &Snapshot) -> Self {
            let mut roster = AgentRoster::new();
            roster.sync(snap, &roles, &mut MemoryStore::new(), &Migrations::standard());
            let mut board = TaskBoard::new();
            board.sync_live(roster.ids());
            Self {
                roles,
                roster,
                board,
                costs: CostModel::new(),
                sink: RecordingSink::default(),
                intel: ScoutRegistry::new(),
                expansion: ExpansionRegistry::new(),
                config: ColonyConfig::default(),
            }
        }

        fn tick(&mut self, snap: &Snapshot) -> DispatchReport {
            let mut tc = TickContext {
                world: snap,
                board: &mut self.board,
                costs: &mut self.costs,
                sink: &mut self.sink,
                intel: &mut self.intel,
                expansion: &self.expansion,
                roles: &self.roles,
                config: &self.config,
            };
            dispatch_all(&mut self.roster, &mut tc)
        }
    }

    /// Calls every action it can think of; only the first may land.
    struct Greedy;

    impl RoleStrategy for Greedy {
        fn role(&self) -> RoleTag {
            RoleTag::Builder
        }
        fn capabilities(&self) -> CapabilitySet {
            CapabilitySet::of(&[Work, Carry])
        }
        fn body(&self, _budget: u32, _level: u8) -> Body {
            Body::default()
        }
        fn initial_state(&self) -> StateTag {
            StateTag::Building
        }
        fn states(&self) -> &'static [StateTag] {
            &[StateTag::Building, StateTag::Collecting]
        }
        fn task_kinds(&self, _state: StateTag) -> &'static [TaskKind] {
            &[]
        }
        fn on_state(
            &self,
            state: StateTag,
            ctx: &mut AgentCtx<'_>,
        ) -> Result<StateOutcome, DispatchError> {
            let target = EntityId(1);
            for _ in 0..3 {
                ctx.act(PrimitiveAction::Build { target });
                ctx.act(PrimitiveAction::Repair { target });
            }
            ctx.move_to(Pos::new(ctx.pos().zone, 40, 40), 1);
            Ok(match state {
                StateTag::Building => StateOutcome::go(StateTag::Collecting),
                _ => StateOutcome::go(StateTag::Building),
            })
        }
    }

    struct Faulty;

    impl RoleStrategy for Faulty {
        fn role(&self) -> RoleTag {
            RoleTag::Repairer
        }
        fn capabilities(&self) -> CapabilitySet {
            CapabilitySet::of(&[Work])
        }
        fn body(&self, _budget: u32, _level: u8) -> Body {
            Body::default()
        }
        fn initial_state(&self) -> StateTag {
            StateTag::Repairing
        }
        fn states(&self) -> &'static [StateTag] {
            &[StateTag::Repairing, StateTag::Collecting]
        }
        fn task_kinds(&self, _state: StateTag) -> &'static [TaskKind] {
            &[]
        }
        fn on_state(
            &self,
            _state: StateTag,
            ctx: &mut AgentCtx<'_>,
        ) -> Result<StateOutcome, DispatchError> {
            if ctx.agent.memory.idle_ticks > 0 {
                panic!("repairer exploded");
            }
            Ok(StateOutcome::go(StateTag::Healing))
        }
    }

    #[test]
    fn test_guard_holds_across_chained_transitions() {
        let mut roles = RoleRegistry::new();
        roles.register(Box::new(Greedy));
        let mut b = SnapshotBuilder::new(1);
        b.site(at(10, 10), StructureKind::Road, 0);
        let a = b.agent(at(10, 11), &[Work, Carry, Move], Some(RoleTag::Builder));
        let snap = b.build();
        let mut h = Harness::new(roles, &snap);

        let report = h.tick(&snap);
        assert_eq!(h.sink.actions_of(a).len(), 1);
        assert_eq!(report.actions, 1);
        // Two handler runs, six calls each, one accepted.
        assert_eq!(report.blocked, 11);
        assert_eq!(report.transitions, 2);
        assert_eq!(h.sink.moves.len(), 2);

        h.sink.clear();
        h.tick(&snap.clone());
        assert_eq!(h.sink.actions_of(a).len(), 1);
    }

    #[test]
    fn test_unknown_state_resets_to_initial() {
        let roles = RoleRegistry::standard();
        let mut b = SnapshotBuilder::new(1);
        let a = b.agent(at(10, 10), &[Work, Carry, Move], Some(RoleTag::Upgrader));
        let snap = b.build();
        let mut h = Harness::new(roles, &snap);
        h.roster.get_mut(a).unwrap().memory.state = StateTag::Unknown;

        let report = h.tick(&snap);
        assert_eq!(report.resets, vec![a]);
        assert!(report.failures.is_empty());
        let state = h.roster.get(a).unwrap().memory.state;
        assert!(matches!(state, StateTag::Collecting | StateTag::Upgrading));
    }

    #[test]
    fn test_missing_strategy_reinitializes_from_capabilities() {
        let mut roles = RoleRegistry::new();
        roles.register(Box::new(crate::roles::HaulerStrategy));
        let mut b = SnapshotBuilder::new(1);
        let a = b.agent(at(10, 10), &[Carry, Move], Some(RoleTag::Hauler));
        let snap = b.build();
        let mut h = Harness::new(roles, &snap);
        h.roster.get_mut(a).unwrap().memory =
            AgentMemory::new(RoleTag::Builder, StateTag::Building, zone());

        let report = h.tick(&snap);
        assert_eq!(report.resets, vec![a]);
        assert_eq!(h.roster.get(a).unwrap().role(), RoleTag::Hauler);
    }

    #[test]
    fn test_failures_are_isolated() {
        let mut roles = RoleRegistry::standard();
        roles.register(Box::new(Faulty));
        let mut b = SnapshotBuilder::new(1);
        let body = Body::new(vec![Work, Carry, Move]);
        let full = Store::new(50).with(ResourceKind::Energy, 50);
        let bad = b.agent(at(10, 10), &[Work, Move], Some(RoleTag::Repairer));
        let panicky = b.agent(at(12, 10), &[Work, Move], Some(RoleTag::Repairer));
        let good = b.agent_with(at(20, 20), body, full, Some(RoleTag::Upgrader));
        b.controller(at(21, 21), Owner::Mine, 2);
        let snap = b.build();
        let mut h = Harness::new(roles, &snap);
        h.roster.get_mut(panicky).unwrap().memory.idle_ticks = 1;

        let report = h.tick(&snap);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[0].0, bad);
        assert!(report.failures[0].1.contains("Healing"));
        assert_eq!(report.failures[1].0, panicky);
        assert!(report.failures[1].1.contains("repairer exploded"));
        assert_eq!(h.sink.actions_of(good).len(), 1);
    }

    #[test]
    fn test_spawning_agents_are_skipped() {
        let roles = RoleRegistry::standard();
        let mut b = SnapshotBuilder::new(1);
        let a = b.agent(at(10, 10), &[Work, Carry, Move], Some(RoleTag::Harvester));
        if let Some(crate::world::EntityKind::Agent(info)) =
            b.snapshot_mut().entity_mut(a.entity()).map(|e| &mut e.kind)
        {
            info.spawning = true;
        }
        let snap = b.build();
        let mut h = Harness::new(roles, &snap);
        let report = h.tick(&snap);
        assert_eq!(report.spawning, 1);
        assert_eq!(report.dispatched, 0);
    }

    #[test]
    fn test_missing_target_is_cleared_softly() {
        let roles = RoleRegistry::standard();
        let mut b = SnapshotBuilder::new(1);
        let a = b.agent(at(10, 10), &[Attack, Move], Some(RoleTag::Defender));
        let snap = b.build();
        let mut h = Harness::new(roles, &snap);
        {
            let memory = &mut h.roster.get_mut(a).unwrap().memory;
            memory.state = StateTag::Engaging;
            memory.target = Some(EntityId(404));
        }
        let report = h.tick(&snap);
        assert!(report.failures.is_empty());
        assert_eq!(h.roster.get(a).unwrap().memory.target, None);
    }
}
